//! Ed25519 node identity keys.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::CryptoError;

/// A node's signing identity.
///
/// Intentionally not `Clone` or `Debug`; the secret half is zeroized on drop
/// by `ed25519-dalek`.
pub struct NodeKeypair {
    signing: SigningKey,
}

impl NodeKeypair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Rebuild a key pair from a hex-encoded 32-byte secret.
    pub fn from_secret_hex(secret: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(hex::decode(secret)?);
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex-encoded public key, as published in the peer directory.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing.to_bytes()))
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = NodeKeypair::from_seed(&[7u8; 32]);
        let b = NodeKeypair::from_seed(&[7u8; 32]);
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = NodeKeypair::generate();
        let restored = NodeKeypair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(kp.public_key_hex(), restored.public_key_hex());
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(matches!(
            NodeKeypair::from_secret_hex("abcd"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            NodeKeypair::from_secret_hex("zz"),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn public_key_is_64_hex_chars() {
        assert_eq!(NodeKeypair::generate().public_key_hex().len(), 64);
    }
}
