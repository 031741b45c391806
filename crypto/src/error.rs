use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("sealed payload too short: {0} bytes")]
    SealedTooShort(usize),

    #[error("decryption failed: authentication check failed")]
    DecryptionFailed,
}

impl From<hex::FromHexError> for CryptoError {
    fn from(e: hex::FromHexError) -> Self {
        Self::InvalidHex(e.to_string())
    }
}
