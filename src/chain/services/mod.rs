// src/chain/services/mod.rs
//
// One module per resource. Each exposes an operation enum plus an
// `execute` entry point taking the connection and raw JSON parameters.

pub mod account;
pub mod attestation;
pub mod basename;
pub mod block;
pub mod bridge;
pub mod coinbase_wallet;
pub mod contract;
pub mod dex;
pub mod events;
pub mod farcaster;
pub mod fee;
pub mod nft;
pub mod safe;
pub mod token;
pub mod transaction;
pub mod utility;

use ethers::providers::Middleware;
use ethers_core::types::{TransactionReceipt, TransactionRequest, H256};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::chain::provider::Connection;
use crate::error::{ChainError, Result};

/// Sign, submit and wait for one transaction. Fails with a permission
/// error before any I/O when no signing key is configured.
pub(crate) async fn send_tx(
    conn: &Connection,
    tx: TransactionRequest,
) -> Result<(H256, Option<TransactionReceipt>)> {
    let client = conn.signer()?;
    let pending = client
        .send_transaction(tx, None)
        .await
        .map_err(|e| ChainError::Rpc(format!("Failed to send transaction: {e}")))?;
    let hash = *pending;
    let receipt = pending.await?;
    Ok((hash, receipt))
}

pub(crate) fn receipt_status(receipt: &Option<TransactionReceipt>) -> &'static str {
    match receipt {
        Some(r) if r.status == Some(1u64.into()) => "success",
        _ => "failed",
    }
}

/// Deserialize an operation's parameters into its typed struct.
pub(crate) fn from_params<T: DeserializeOwned>(params: &Value) -> Result<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| ChainError::validation(format!("Invalid parameters: {e}")))
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

fn default_sort() -> String {
    "desc".to_string()
}

/// Shared pagination knobs for explorer-backed history operations.
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct Pagination {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default = "default_sort")]
    pub sort: String,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page: 1,
            limit: 10,
            sort: "desc".to_string(),
        }
    }
}
