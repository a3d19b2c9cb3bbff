// web-server/src/verifier/sigma.rs
//! Sigma-protocol (ProveDlog) proof verification for Ergo P2PK addresses.
//!
//! A proof is a non-interactive Schnorr proof of knowledge of the secret
//! key behind the address, made non-interactive with Fiat-Shamir over the
//! serialized proof leaf and the signed message. Verification recomputes
//! the prover's commitment `a = g^z * pk^-e` from the transcript and checks
//! that hashing it reproduces the challenge `e`.

use k256::elliptic_curve::group::Group;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, ProjectivePoint, PublicKey, Scalar};

/// Fiat-Shamir challenge length in bytes
pub const CHALLENGE_LEN: usize = 24;
/// Response scalar length in bytes
pub const RESPONSE_LEN: usize = 32;
/// Compressed secp256k1 point length
pub const PUBLIC_KEY_LEN: usize = 33;

const ADDRESS_CHECKSUM_LEN: usize = 4;
const P2PK_ADDRESS_TYPE: u8 = 0x01;
/// ErgoTree v0 header, SigmaProp constant type, ProveDlog opcode
const P2PK_TREE_PREFIX: [u8; 3] = [0x00, 0x08, 0xcd];
const LEAF_PREFIX: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
enum SigmaError {
    #[error("address is not valid base58")]
    Base58,

    #[error("address checksum mismatch")]
    Checksum,

    #[error("address is not a P2PK address")]
    NotP2pk,

    #[error("invalid public key")]
    PublicKey,

    #[error("proof has invalid length {0}")]
    ProofLength(usize),

    #[error("response scalar out of range")]
    Response,

    #[error("challenge mismatch")]
    Challenge,
}

/// Verify a wallet `auth` response against the expected `nonce`.
///
/// The wallet may append its own bytes to the message before proving, so
/// the signed message must start with the nonce byte-for-byte.
pub fn verify_auth(nonce: &[u8], address: &str, signed_message: &str, proof_hex: &str) -> bool {
    if nonce.is_empty() || !signed_message.as_bytes().starts_with(nonce) {
        tracing::debug!("Signed message does not carry the expected nonce");
        return false;
    }
    let proof = match hex::decode(proof_hex.trim()) {
        Ok(proof) => proof,
        Err(_) => {
            tracing::debug!("Sigma proof is not valid hex");
            return false;
        }
    };
    verify_signature(address, signed_message.as_bytes(), &proof)
}

/// Verify `proof` over `message` for the P2PK `address`
pub fn verify_signature(address: &str, message: &[u8], proof: &[u8]) -> bool {
    match verify_inner(address, message, proof) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Sigma verification failed: {}", e);
            false
        }
    }
}

fn verify_inner(address: &str, message: &[u8], proof: &[u8]) -> Result<(), SigmaError> {
    let pk_bytes = decode_p2pk_address(address)?;
    let pk = PublicKey::from_sec1_bytes(&pk_bytes).map_err(|_| SigmaError::PublicKey)?;

    // Responses with leading zero bytes may be serialized short
    if proof.len() <= CHALLENGE_LEN || proof.len() > CHALLENGE_LEN + RESPONSE_LEN {
        return Err(SigmaError::ProofLength(proof.len()));
    }
    let (challenge, response) = proof.split_at(CHALLENGE_LEN);

    let e = scalar_from_be(challenge).ok_or(SigmaError::Response)?;
    let z = scalar_from_be(response).ok_or(SigmaError::Response)?;

    let commitment = ProjectivePoint::GENERATOR * z - pk.to_projective() * e;
    if bool::from(commitment.is_identity()) {
        return Err(SigmaError::Challenge);
    }
    let commitment = commitment.to_affine().to_encoded_point(true);

    let expected = fiat_shamir_challenge(&pk_bytes, commitment.as_bytes(), message);
    if expected[..] != challenge[..] {
        return Err(SigmaError::Challenge);
    }
    Ok(())
}

/// Decode a base58 P2PK address into its compressed public key.
///
/// Layout: `prefix(1) ‖ pk(33) ‖ checksum(4)` where the prefix is
/// network + address type and the checksum is the first four bytes of
/// Blake2b-256 over the rest.
fn decode_p2pk_address(address: &str) -> Result<[u8; PUBLIC_KEY_LEN], SigmaError> {
    let bytes = bs58::decode(address.trim()).into_vec().map_err(|_| SigmaError::Base58)?;
    if bytes.len() != 1 + PUBLIC_KEY_LEN + ADDRESS_CHECKSUM_LEN {
        return Err(SigmaError::NotP2pk);
    }
    let (body, checksum) = bytes.split_at(bytes.len() - ADDRESS_CHECKSUM_LEN);
    if blake2b_256(body)[..ADDRESS_CHECKSUM_LEN] != *checksum {
        return Err(SigmaError::Checksum);
    }
    if body[0] & 0x0f != P2PK_ADDRESS_TYPE {
        return Err(SigmaError::NotP2pk);
    }
    let mut pk = [0u8; PUBLIC_KEY_LEN];
    pk.copy_from_slice(&body[1..]);
    Ok(pk)
}

/// Serialized P2PK ErgoTree for `pk`
pub fn p2pk_tree_bytes(pk: &[u8; PUBLIC_KEY_LEN]) -> Vec<u8> {
    let mut tree = Vec::with_capacity(P2PK_TREE_PREFIX.len() + PUBLIC_KEY_LEN);
    tree.extend_from_slice(&P2PK_TREE_PREFIX);
    tree.extend_from_slice(pk);
    tree
}

/// Fiat-Shamir challenge for a single ProveDlog leaf.
///
/// The leaf is `0x01 ‖ len16(tree) ‖ tree ‖ len16(commitment) ‖ commitment`
/// with big-endian 16-bit lengths; the challenge is the first 24 bytes of
/// Blake2b-256 over the leaf followed by the message.
pub fn fiat_shamir_challenge(pk: &[u8; PUBLIC_KEY_LEN], commitment: &[u8], message: &[u8]) -> [u8; CHALLENGE_LEN] {
    let tree = p2pk_tree_bytes(pk);
    let mut input = Vec::with_capacity(1 + 2 + tree.len() + 2 + commitment.len() + message.len());
    input.push(LEAF_PREFIX);
    input.extend_from_slice(&(tree.len() as u16).to_be_bytes());
    input.extend_from_slice(&tree);
    input.extend_from_slice(&(commitment.len() as u16).to_be_bytes());
    input.extend_from_slice(commitment);
    input.extend_from_slice(message);

    let mut challenge = [0u8; CHALLENGE_LEN];
    challenge.copy_from_slice(&blake2b_256(&input)[..CHALLENGE_LEN]);
    challenge
}

/// Build the base58 P2PK address for `pk` (`mainnet` selects the network prefix).
pub fn encode_p2pk_address(pk: &[u8; PUBLIC_KEY_LEN], mainnet: bool) -> String {
    let network: u8 = if mainnet { 0x00 } else { 0x10 };
    let mut bytes = Vec::with_capacity(1 + PUBLIC_KEY_LEN + ADDRESS_CHECKSUM_LEN);
    bytes.push(network | P2PK_ADDRESS_TYPE);
    bytes.extend_from_slice(pk);
    let checksum = blake2b_256(&bytes);
    bytes.extend_from_slice(&checksum[..ADDRESS_CHECKSUM_LEN]);
    bs58::encode(bytes).into_string()
}

/// Interpret up to 32 big-endian bytes as a scalar; `None` if not below the group order
fn scalar_from_be(bytes: &[u8]) -> Option<Scalar> {
    if bytes.len() > RESPONSE_LEN {
        return None;
    }
    let mut repr = [0u8; RESPONSE_LEN];
    repr[RESPONSE_LEN - bytes.len()..].copy_from_slice(bytes);
    Option::from(Scalar::from_repr(*FieldBytes::from_slice(&repr)))
}

fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let hash = blake2b_simd::Params::new().hash_length(32).hash(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn secret(seed: u8) -> Scalar {
        scalar_from_be(&[seed; 32]).unwrap()
    }

    pub(crate) fn public_key(x: &Scalar) -> [u8; PUBLIC_KEY_LEN] {
        let point = (ProjectivePoint::GENERATOR * x).to_affine().to_encoded_point(true);
        let mut pk = [0u8; PUBLIC_KEY_LEN];
        pk.copy_from_slice(point.as_bytes());
        pk
    }

    /// Prover side: a = g^r, e = H(leaf(a) ‖ m), z = r + e·x
    pub(crate) fn prove(x: &Scalar, nonce_seed: u8, message: &[u8]) -> Vec<u8> {
        let pk = public_key(x);
        let r = secret(nonce_seed);
        let a = (ProjectivePoint::GENERATOR * r).to_affine().to_encoded_point(true);
        let e_bytes = fiat_shamir_challenge(&pk, a.as_bytes(), message);
        let e = scalar_from_be(&e_bytes).unwrap();
        let z = r + e * x;
        let mut proof = e_bytes.to_vec();
        proof.extend_from_slice(&z.to_repr());
        proof
    }

    #[test]
    fn test_valid_proof() {
        let x = secret(11);
        let address = encode_p2pk_address(&public_key(&x), true);
        let proof = prove(&x, 42, b"1700000000-nonce");
        assert!(verify_signature(&address, b"1700000000-nonce", &proof));
    }

    #[test]
    fn test_testnet_address_accepted() {
        let x = secret(12);
        let address = encode_p2pk_address(&public_key(&x), false);
        let proof = prove(&x, 43, b"msg");
        assert!(verify_signature(&address, b"msg", &proof));
    }

    #[test]
    fn test_wrong_address_rejected() {
        let x = secret(13);
        let other = encode_p2pk_address(&public_key(&secret(14)), true);
        let proof = prove(&x, 44, b"msg");
        assert!(!verify_signature(&other, b"msg", &proof));
    }

    #[test]
    fn test_wrong_message_rejected() {
        let x = secret(15);
        let address = encode_p2pk_address(&public_key(&x), true);
        let proof = prove(&x, 45, b"msg-a");
        assert!(!verify_signature(&address, b"msg-b", &proof));
    }

    #[test]
    fn test_truncated_and_tampered_proofs_rejected() {
        let x = secret(16);
        let address = encode_p2pk_address(&public_key(&x), true);
        let proof = prove(&x, 46, b"msg");
        assert!(!verify_signature(&address, b"msg", &proof[..CHALLENGE_LEN]));
        assert!(!verify_signature(&address, b"msg", &[]));

        let mut tampered = proof.clone();
        tampered[CHALLENGE_LEN + 3] ^= 0x80;
        assert!(!verify_signature(&address, b"msg", &tampered));

        let mut oversized = proof;
        oversized.push(0);
        assert!(!verify_signature(&address, b"msg", &oversized));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let x = secret(17);
        let mut raw = bs58::decode(encode_p2pk_address(&public_key(&x), true)).into_vec().unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let corrupted = bs58::encode(raw).into_string();
        let proof = prove(&x, 47, b"msg");
        assert!(!verify_signature(&corrupted, b"msg", &proof));
        assert!(!verify_signature("not-base58-0OIl", b"msg", &proof));
    }

    #[test]
    fn test_verify_auth_requires_nonce_prefix() {
        let x = secret(18);
        let address = encode_p2pk_address(&public_key(&x), true);
        let signed = "nonce-123:wallet-suffix";
        let proof = hex::encode(prove(&x, 48, signed.as_bytes()));
        assert!(verify_auth(b"nonce-123", &address, signed, &proof));
        assert!(!verify_auth(b"nonce-124", &address, signed, &proof));
        assert!(!verify_auth(b"", &address, signed, &proof));
        assert!(!verify_auth(b"nonce-123", &address, signed, "not hex"));
    }
}
