// src/error.rs

use thiserror::Error;

/// Error taxonomy for chain, explorer and dispatch failures.
///
/// Every variant carries a human-readable message; callers either
/// propagate (aborting the batch) or, when continue-on-fail is set,
/// downgrade to an `{error}` result for the current item.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("RPC URL required for custom network")]
    MissingRpcUrl,

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Explorer API error: {message}")]
    ExplorerApi { message: String, detail: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("{0}")]
    Permission(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Provider(#[from] ethers::providers::ProviderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ChainError::Validation(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        ChainError::Permission(msg.into())
    }
}

pub type Result<T, E = ChainError> = std::result::Result<T, E>;
