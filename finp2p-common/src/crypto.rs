use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;

use crate::error::{FinP2PError, Result};

/// Canonicalizes `value` into the exact byte sequence that gets signed.
///
/// A single serialization format is used everywhere a signature is
/// produced or verified (spec §9 design note: "pick a single,
/// deterministic, keyed MAC or asymmetric signature and canonicalize the
/// signed bytes"). `bincode` is the teacher's choice for signing bytes
/// (`atlas_common::transactions::signing_bytes`).
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| FinP2PError::Other(format!("failed to canonicalize signed payload: {e}")))
}

/// Thin wrapper over an Ed25519 keypair used to sign router messages and
/// confirmation records (spec §4.4, §6.3).
#[derive(Clone)]
pub struct RouterSigner {
    signing_key: SigningKey,
}

impl RouterSigner {
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Raw 32-byte seed, for persisting a generated key to disk.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Signs the canonical serialization of `value`.
    pub fn sign<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = canonical_bytes(value)?;
        Ok(self.signing_key.sign(&bytes).to_bytes().to_vec())
    }
}

/// Verifies `signature` was produced by `verifying_key` over the canonical
/// serialization of `value`.
pub fn verify<T: Serialize>(verifying_key: &VerifyingKey, value: &T, signature: &[u8]) -> Result<()> {
    let bytes = canonical_bytes(value)?;
    let sig = Signature::from_slice(signature).map_err(|e| FinP2PError::Other(format!("invalid signature bytes: {e}")))?;
    verifying_key
        .verify(&bytes, &sig)
        .map_err(|e| FinP2PError::Other(format!("signature verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        a: u64,
        b: String,
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let signer = RouterSigner::generate();
        let payload = Payload { a: 42, b: "hello".into() };
        let sig = signer.sign(&payload).unwrap();
        verify(&signer.verifying_key(), &payload, &sig).unwrap();
    }

    #[test]
    fn from_bytes_round_trips_through_to_bytes() {
        let seed = [7u8; 32];
        let signer = RouterSigner::from_bytes(&seed);
        assert_eq!(signer.to_bytes(), seed);
    }

    #[test]
    fn verify_rejects_tampered_payload() {
        let signer = RouterSigner::generate();
        let payload = Payload { a: 42, b: "hello".into() };
        let sig = signer.sign(&payload).unwrap();
        let tampered = Payload { a: 43, b: "hello".into() };
        assert!(verify(&signer.verifying_key(), &tampered, &sig).is_err());
    }
}
