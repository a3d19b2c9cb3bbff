// web-server/src/verifier/cip30.rs
//! CIP-30 `signData` verification.
//!
//! The wallet returns a COSE_Sign1 envelope and a COSE_Key. We check that
//! the key hashes to the credential inside the claimed address, that the
//! envelope's payload is exactly the challenge, and that the Ed25519
//! signature covers the COSE `Sig_structure`.

use ciborium::value::Value;
use ed25519_dalek::{Signature, VerifyingKey};

/// COSE algorithm id for EdDSA
const ALG_EDDSA: i128 = -8;
/// COSE_Sign1 CBOR tag
const COSE_SIGN1_TAG: u64 = 18;
/// Blake2b-224 credential hash length
const KEY_HASH_LEN: usize = 28;

#[derive(Debug, thiserror::Error)]
enum Cip30Error {
    #[error("malformed {0}")]
    Malformed(&'static str),

    #[error("cbor: {0}")]
    Cbor(String),

    #[error("address is not backed by a key-hash credential")]
    ScriptCredential,

    #[error("public key does not match the claimed address")]
    AddressMismatch,

    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(i128),

    #[error("payload does not match the challenge")]
    PayloadMismatch,

    #[error("bad signature")]
    BadSignature,
}

/// Decoded COSE_Sign1 envelope
struct CoseSign1 {
    protected: Vec<u8>,
    hashed: bool,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

/// Verify a CIP-30 signature over `message` for `address`.
///
/// `signature_hex` is the hex COSE_Sign1, `key_hex` the hex COSE_Key.
pub fn verify(message: &[u8], address: &str, signature_hex: &str, key_hex: &str) -> bool {
    match verify_inner(message, address, signature_hex, key_hex) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("CIP-30 verification failed: {}", e);
            false
        }
    }
}

fn verify_inner(message: &[u8], address: &str, signature_hex: &str, key_hex: &str) -> Result<(), Cip30Error> {
    let claimed = decode_address(address)?;
    let key_hash = key_hash_credential(&claimed)?;

    let key_bytes = hex::decode(key_hex.trim()).map_err(|_| Cip30Error::Malformed("COSE_Key hex"))?;
    let public_key = parse_cose_key(&key_bytes)?;
    if blake2b_224(&public_key) != key_hash {
        return Err(Cip30Error::AddressMismatch);
    }

    let sign1_bytes = hex::decode(signature_hex.trim()).map_err(|_| Cip30Error::Malformed("COSE_Sign1 hex"))?;
    let sign1 = parse_cose_sign1(&sign1_bytes)?;

    check_protected_headers(&sign1.protected, &claimed)?;

    let expected_payload = if sign1.hashed {
        blake2b_224(message).to_vec()
    } else {
        message.to_vec()
    };
    if sign1.payload != expected_payload {
        return Err(Cip30Error::PayloadMismatch);
    }

    let to_verify = sig_structure(&sign1.protected, &sign1.payload)?;
    let verifying_key = VerifyingKey::from_bytes(&public_key).map_err(|_| Cip30Error::Malformed("public key"))?;
    let signature = Signature::from_slice(&sign1.signature).map_err(|_| Cip30Error::Malformed("signature"))?;
    verifying_key
        .verify_strict(&to_verify, &signature)
        .map_err(|_| Cip30Error::BadSignature)
}

/// Decode a Cardano address given in bech32 (`addr…`/`stake…`) or hex.
fn decode_address(address: &str) -> Result<Vec<u8>, Cip30Error> {
    let address = address.trim();
    if address.starts_with("addr") || address.starts_with("stake") {
        let (hrp, data) = bech32::decode(address).map_err(|_| Cip30Error::Malformed("bech32 address"))?;
        match hrp.to_lowercase().as_str() {
            "addr" | "addr_test" | "stake" | "stake_test" => Ok(data),
            _ => Err(Cip30Error::Malformed("address prefix")),
        }
    } else {
        hex::decode(address).map_err(|_| Cip30Error::Malformed("hex address"))
    }
}

/// Extract the first credential of a Shelley address, which must be a key hash.
fn key_hash_credential(address: &[u8]) -> Result<[u8; KEY_HASH_LEN], Cip30Error> {
    let header = *address.first().ok_or(Cip30Error::Malformed("empty address"))?;
    match header >> 4 {
        // base, pointer, enterprise and reward addresses with a key-hash first credential
        0x0 | 0x2 | 0x4 | 0x6 | 0xe => {}
        0x1 | 0x3 | 0x5 | 0x7 | 0xf => return Err(Cip30Error::ScriptCredential),
        _ => return Err(Cip30Error::Malformed("address type")),
    }
    address
        .get(1..1 + KEY_HASH_LEN)
        .and_then(|slice| <[u8; KEY_HASH_LEN]>::try_from(slice).ok())
        .ok_or(Cip30Error::Malformed("address length"))
}

fn parse_cose_key(bytes: &[u8]) -> Result<[u8; 32], Cip30Error> {
    let entries = match decode_cbor(bytes)? {
        Value::Map(entries) => entries,
        _ => return Err(Cip30Error::Malformed("COSE_Key")),
    };

    let mut x = None;
    for (label, value) in entries {
        match (int_label(&label), value) {
            // kty must be OKP when present
            (Some(1), Value::Integer(kty)) if i128::from(kty) != 1 => {
                return Err(Cip30Error::Malformed("COSE_Key kty"));
            }
            (Some(3), Value::Integer(alg)) if i128::from(alg) != ALG_EDDSA => {
                return Err(Cip30Error::UnsupportedAlgorithm(i128::from(alg)));
            }
            (Some(-2), Value::Bytes(bytes)) => x = Some(bytes),
            _ => {}
        }
    }

    let x = x.ok_or(Cip30Error::Malformed("COSE_Key x coordinate"))?;
    <[u8; 32]>::try_from(x.as_slice()).map_err(|_| Cip30Error::Malformed("public key length"))
}

fn parse_cose_sign1(bytes: &[u8]) -> Result<CoseSign1, Cip30Error> {
    let value = match decode_cbor(bytes)? {
        Value::Tag(COSE_SIGN1_TAG, inner) => *inner,
        other => other,
    };
    let items = match value {
        Value::Array(items) if items.len() == 4 => items,
        _ => return Err(Cip30Error::Malformed("COSE_Sign1 structure")),
    };

    let mut items = items.into_iter();
    let protected = match items.next() {
        Some(Value::Bytes(b)) => b,
        _ => return Err(Cip30Error::Malformed("protected header")),
    };
    let hashed = match items.next() {
        Some(Value::Map(entries)) => entries.iter().any(|(k, v)| {
            matches!(k, Value::Text(t) if t == "hashed") && matches!(v, Value::Bool(true))
        }),
        _ => return Err(Cip30Error::Malformed("unprotected header")),
    };
    // Detached payloads are not accepted; the challenge must travel inside
    let payload = match items.next() {
        Some(Value::Bytes(b)) => b,
        _ => return Err(Cip30Error::Malformed("payload")),
    };
    let signature = match items.next() {
        Some(Value::Bytes(b)) => b,
        _ => return Err(Cip30Error::Malformed("signature")),
    };

    Ok(CoseSign1 {
        protected,
        hashed,
        payload,
        signature,
    })
}

fn check_protected_headers(protected: &[u8], claimed: &[u8]) -> Result<(), Cip30Error> {
    if protected.is_empty() {
        return Ok(());
    }
    let entries = match decode_cbor(protected)? {
        Value::Map(entries) => entries,
        _ => return Err(Cip30Error::Malformed("protected header map")),
    };
    for (label, value) in entries {
        match (&label, value) {
            (Value::Integer(l), Value::Integer(alg)) if i128::from(*l) == 1 => {
                if i128::from(alg) != ALG_EDDSA {
                    return Err(Cip30Error::UnsupportedAlgorithm(i128::from(alg)));
                }
            }
            (Value::Text(name), Value::Bytes(address)) if name == "address" => {
                if address != claimed {
                    return Err(Cip30Error::AddressMismatch);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// COSE `Sig_structure` for a Sign1 with no external AAD
fn sig_structure(protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, Cip30Error> {
    let structure = Value::Array(vec![
        Value::Text("Signature1".to_string()),
        Value::Bytes(protected.to_vec()),
        Value::Bytes(Vec::new()),
        Value::Bytes(payload.to_vec()),
    ]);
    let mut buf = Vec::new();
    ciborium::into_writer(&structure, &mut buf).map_err(|e| Cip30Error::Cbor(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor(bytes: &[u8]) -> Result<Value, Cip30Error> {
    ciborium::from_reader(bytes).map_err(|e| Cip30Error::Cbor(e.to_string()))
}

fn int_label(value: &Value) -> Option<i128> {
    match value {
        Value::Integer(i) => Some(i128::from(*i)),
        _ => None,
    }
}

fn blake2b_224(data: &[u8]) -> [u8; KEY_HASH_LEN] {
    let hash = blake2b_simd::Params::new().hash_length(KEY_HASH_LEN).hash(data);
    let mut out = [0u8; KEY_HASH_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}
