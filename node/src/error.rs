use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ballot_ledger::LedgerError),

    #[error("network error: {0}")]
    Network(#[from] ballot_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ballot_protocol::ProtocolError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ballot_consensus::ConsensusError),

    #[error("crypto error: {0}")]
    Crypto(#[from] ballot_crypto::CryptoError),

    #[error("vote rejected: {0}")]
    Vote(#[from] ballot_consensus::VoteRejection),

    #[error("no elector credentials loaded")]
    MissingCredentials,

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("node is not running")]
    NotStarted,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
