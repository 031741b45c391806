use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown message code: {0}")]
    UnknownCode(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] ballot_crypto::CryptoError),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
