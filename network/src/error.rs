use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("peer {0} not found")]
    PeerNotFound(String),

    #[error("connection capacity reached ({max})")]
    CapacityReached { max: usize },

    #[error("protocol error: {0}")]
    Protocol(#[from] ballot_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
