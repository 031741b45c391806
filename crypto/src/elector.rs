//! Elector identity keys (secp256k1 ECDSA).
//!
//! Electors sign their vote packages with a key pair that is unrelated to
//! any node identity, so a voter can cast a ballot through any node.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::CryptoError;

/// An elector's signing key pair.
pub struct ElectorKeypair {
    signing: SigningKey,
}

impl ElectorKeypair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuild from a hex-encoded 32-byte secret scalar.
    pub fn from_secret_hex(secret: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(secret)?);
        let signing = SigningKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { signing })
    }

    /// Compressed SEC1 public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        let point = self.signing.verifying_key().to_encoded_point(true);
        hex::encode(point.as_bytes())
    }

    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing.to_bytes()))
    }

    /// Sign a message, returning the hex-encoded 64-byte `r || s` signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing.sign(message);
        hex::encode(signature.to_bytes())
    }
}

/// Verify an elector signature. Malformed keys or signatures verify as `false`.
pub fn verify_elector_signature(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}
