//! ECDSA (secp256k1) and SHA-256 seams used by the consensus core.
//!
//! Signatures are 64-byte r||s with RFC 6979 deterministic nonces. An
//! address is the signer's compressed SEC1 public key, so verification
//! needs no key directory lookup.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::types::{Address, Hash256, Signature, ADDRESS_SIZE, SIGNATURE_SIZE};

/// SHA-256 over arbitrary bytes; the protocol's only digest.
pub fn devv_hash(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// Sign `msg` with a node or wallet key.
pub fn sign_bytes(key: &SigningKey, msg: &[u8]) -> Signature {
    let sig: EcdsaSignature = key.sign(msg);
    let mut out = [0u8; SIGNATURE_SIZE];
    out.copy_from_slice(&sig.to_bytes());
    Signature::new(out)
}

/// Verify `sig` over `msg` under the public key packed into `addr`.
///
/// Malformed keys or signatures verify as false rather than erroring; the
/// callers treat all three cases the same way.
pub fn verify_bytes(addr: &Address, msg: &[u8], sig: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(addr.as_bytes()) else {
        return false;
    };
    let Ok(sig) = EcdsaSignature::from_slice(sig.as_bytes()) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

/// Derive the compressed-key address for a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(true);
    let mut out = [0u8; ADDRESS_SIZE];
    out.copy_from_slice(point.as_bytes());
    Address::new(out)
}

/// Generate a fresh signing key (demo nodes and tests).
pub fn generate_key() -> SigningKey {
    SigningKey::random(&mut rand::rngs::OsRng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let key = generate_key();
        let addr = address_of(&key);
        let sig = sign_bytes(&key, b"devv shard message");
        assert!(verify_bytes(&addr, b"devv shard message", &sig));
        assert!(!verify_bytes(&addr, b"devv shard MESSAGE", &sig));
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let key = generate_key();
        let other = address_of(&generate_key());
        let sig = sign_bytes(&key, b"payload");
        assert!(!verify_bytes(&other, b"payload", &sig));
    }

    #[test]
    fn address_is_compressed_point() {
        let addr = address_of(&generate_key());
        assert!(addr.as_bytes()[0] == 0x02 || addr.as_bytes()[0] == 0x03);
    }
}
