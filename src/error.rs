// src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GaslessError {
    #[error("No injected wallet provider available")]
    ProviderUnavailable,

    #[error("User rejected the request: {0}")]
    UserRejected(String),

    #[error("Wallet provider error: {0}")]
    WalletProviderError(String),

    #[error("Sponsor API key is not configured")]
    MissingSponsorCredential,

    #[error("Smart account binding failed: {0}")]
    SmartAccountBindingFailed(#[source] Box<GaslessError>),

    #[error("Invalid transaction request: {0}")]
    InvalidTransaction(String),

    #[error("Bundler rejected the user operation: {0}")]
    SubmissionFailed(String),

    #[error("Paymaster error: {0}")]
    PaymasterError(String),

    #[error("Bundler error: {0}")]
    BundlerError(String),

    #[error("Ethereum provider error: {0}")]
    EthereumProviderError(String),

    #[error("Chain id mismatch: expected {expected}, endpoint reports {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("Timed out waiting for {0}")]
    WaitTimedOut(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl GaslessError {
    /// Wraps a failure raised while binding a smart account.
    pub fn binding(cause: GaslessError) -> Self {
        match cause {
            already @ GaslessError::SmartAccountBindingFailed(_) => already,
            other => GaslessError::SmartAccountBindingFailed(Box::new(other)),
        }
    }
}

pub type Result<T, E = GaslessError> = std::result::Result<T, E>;
