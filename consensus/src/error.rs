use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("only the lead validator may do this")]
    NotLeadValidator,

    #[error("no lead validator is known")]
    NoLeadValidator,

    #[error("a full chain load is in progress")]
    ChainLoadInProgress,

    #[error("chain linkage is broken")]
    BrokenChain,

    #[error("malformed {operation} transaction: {reason}")]
    MalformedTransaction { operation: String, reason: String },

    #[error("ledger error: {0}")]
    Ledger(#[from] ballot_ledger::LedgerError),
}
