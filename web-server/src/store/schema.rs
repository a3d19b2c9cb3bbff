// web-server/src/store/schema.rs
//! Schema DDL.

/// Initial schema.
///
/// `verified_addresses` is the exclusive-ownership backstop: its primary key
/// guarantees that at most one user holds a verified claim on an address,
/// whatever the application-level checks decide.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    nonce           TEXT,
    default_address TEXT,
    reward_address  TEXT,
    wallet_type     TEXT,
    status          TEXT NOT NULL CHECK (status IN ('pending', 'active')),
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_status_created ON users (status, created_at);

CREATE TABLE IF NOT EXISTS wallets (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id          TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    type             TEXT NOT NULL,
    reward_address   TEXT NOT NULL,
    change_address   TEXT,
    used_addresses   TEXT NOT NULL DEFAULT '[]',
    unused_addresses TEXT NOT NULL DEFAULT '[]',
    created_at       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wallets_user ON wallets (user_id);
CREATE INDEX IF NOT EXISTS idx_wallets_reward ON wallets (reward_address);

CREATE TABLE IF NOT EXISTS accounts (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id             TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    type                TEXT NOT NULL,
    provider            TEXT NOT NULL,
    provider_account_id TEXT NOT NULL,
    UNIQUE (provider, provider_account_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY,
    session_token TEXT NOT NULL UNIQUE,
    user_id       TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    wallet_type   TEXT,
    expires       INTEGER NOT NULL,
    created_at    INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id);

CREATE TABLE IF NOT EXISTS ergo_proofs (
    verification_id TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    nonce           TEXT NOT NULL,
    addresses       TEXT NOT NULL DEFAULT '[]',
    default_address TEXT,
    wallet_type     TEXT,
    status          TEXT NOT NULL CHECK (status IN ('INITIATED', 'PENDING', 'SIGNED', 'VERIFIED')),
    signed_message  TEXT,
    proof           TEXT,
    transaction_id  TEXT,
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_proofs_user ON ergo_proofs (user_id);
CREATE INDEX IF NOT EXISTS idx_proofs_status_created ON ergo_proofs (status, created_at);

CREATE TABLE IF NOT EXISTS verified_addresses (
    address         TEXT PRIMARY KEY,
    verification_id TEXT NOT NULL REFERENCES ergo_proofs (verification_id) ON DELETE CASCADE,
    user_id         TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE
);
"#;
