//! Signer/Verifier capability (spec.md §4.2).
//!
//! Ed25519 signing and verification are exposed behind a small capability so
//! the rest of the crate never depends on a particular crypto backend. The
//! concrete backend here is `ed25519-dalek`.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::fmt;

/// A node's fixed 32-byte Ed25519 public key. Also the cryptographic
/// verification key and the handle used to index the [`crate::keystore::KeyStore`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_verifying_key(self) -> Result<VerifyingKey, ed25519_dalek::SignatureError> {
        VerifyingKey::from_bytes(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 64-byte Ed25519 signature.
pub type SignatureBytes = [u8; 64];

/// The node's long-term identity: a secret key plus the capability to sign
/// and verify with it.
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    /// Generates a fresh identity using the OS random number generator.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generates a fresh identity from an arbitrary CSPRNG. Exposed for tests
    /// that need deterministic identities.
    ///
    /// Draws the seed bytes directly from `rng` rather than handing the RNG
    /// to `SigningKey::generate`: this crate's `rand` and `ed25519-dalek`'s
    /// `rand_core` are different major versions with incompatible trait
    /// definitions, so a rand-0.9 RNG doesn't satisfy dalek's bound. Filling a
    /// seed and going through `from_bytes` sidesteps the mismatch entirely.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Restores an identity from a fixed 32-byte seed. Test-only convenience;
    /// production callers should load a securely generated and stored key.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs `msg` with the node's secret key.
    pub fn sign(&self, msg: &[u8]) -> SignatureBytes {
        self.signing_key.sign(msg).to_bytes()
    }
}

/// Verifies that `sig` is a valid Ed25519 signature by `pk` over `msg`.
///
/// Returns `false` (never panics) on a malformed public key or signature, so
/// callers can treat verification uniformly as a predicate, matching spec.md's
/// "verification failures are silently ignored" failure semantics.
pub fn verify(pk: &PublicKey, msg: &[u8], sig: &SignatureBytes) -> bool {
    let Ok(verifying_key) = pk.to_verifying_key() else {
        return false;
    };
    let signature = Signature::from_bytes(sig);
    verifying_key.verify(msg, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let identity = Identity::from_seed([9; 32]);
        let msg = b"hello overlay";
        let sig = identity.sign(msg);
        assert!(verify(&identity.public_key(), msg, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let a = Identity::from_seed([1; 32]);
        let b = Identity::from_seed([2; 32]);
        let msg = b"hello overlay";
        let sig = a.sign(msg);
        assert!(!verify(&b.public_key(), msg, &sig));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let identity = Identity::from_seed([3; 32]);
        let sig = identity.sign(b"original");
        assert!(!verify(&identity.public_key(), b"tampered", &sig));
    }

    #[test]
    fn verify_does_not_panic_on_garbage_key() {
        let garbage = PublicKey::from_bytes([0xff; 32]);
        assert!(!verify(&garbage, b"msg", &[0u8; 64]));
    }
}
