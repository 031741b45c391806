use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("block hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: String, computed: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
