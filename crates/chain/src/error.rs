//! Error types for the node boundary.

use alloy::primitives::{Address, B256};

/// A read against the node failed.
///
/// Always carries the identity of the failing call so the caller can log
/// which getter broke and decide whether to skip the pool.
#[derive(Debug, thiserror::Error)]
pub enum ChainReadError {
    /// A contract view call failed (transport error, revert, or decode failure).
    #[error("{call} on {target} failed: {source}")]
    Call {
        target: Address,
        call: &'static str,
        #[source]
        source: alloy::contract::Error,
    },

    /// A raw JSON-RPC request failed.
    #[error("{call} failed: {source}")]
    Rpc {
        call: &'static str,
        #[source]
        source: alloy::transports::TransportError,
    },

    /// The node answered, but the answer makes no sense.
    #[error("{call} returned malformed data: {reason}")]
    Malformed { call: &'static str, reason: String },
}

impl ChainReadError {
    pub fn call(target: Address, call: &'static str, source: alloy::contract::Error) -> Self {
        Self::Call { target, call, source }
    }

    pub fn rpc(call: &'static str, source: alloy::transports::TransportError) -> Self {
        Self::Rpc { call, source }
    }

    pub fn malformed(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            call,
            reason: reason.into(),
        }
    }

    /// Name of the call that failed.
    pub fn call_name(&self) -> &'static str {
        match self {
            Self::Call { call, .. } | Self::Rpc { call, .. } | Self::Malformed { call, .. } => call,
        }
    }
}

/// A transaction submission failed.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The transaction was mined and reverted, or the node rejected it as
    /// reverting. Terminal for the candidate in this pass.
    #[error("transaction reverted ({context})")]
    Reverted { tx_hash: Option<B256>, context: String },

    /// Transport or node failure before the transaction was broadcast.
    /// Retryable.
    #[error("submission failed: {0}")]
    Transport(String),

    /// Broadcast, but the receipt never arrived. The transaction may still
    /// be mined, so resubmitting would race it.
    #[error("transaction {tx_hash} unconfirmed: {reason}")]
    Unconfirmed { tx_hash: B256, reason: String },

    /// A read needed to build or measure the transaction failed.
    #[error(transparent)]
    Read(#[from] ChainReadError),

    /// No keeper contract is configured for the requested strategy.
    #[error("no keeper contract configured for {0}")]
    KeeperNotConfigured(&'static str),
}

impl ExecutionError {
    /// Only failures before broadcast may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reverted { .. } | Self::Unconfirmed { .. } | Self::KeeperNotConfigured(_) => {
                false
            }
            Self::Transport(_) | Self::Read(_) => true,
        }
    }

    /// Classify a raw submission error message.
    ///
    /// Nodes report simulation failures as JSON-RPC errors whose message
    /// mentions the revert; those must not be retried.
    pub fn from_submission(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("revert") || lower.contains("execution reverted") {
            Self::Reverted {
                tx_hash: None,
                context: message,
            }
        } else {
            Self::Transport(message)
        }
    }
}
