// src/chain/services/transaction.rs

use std::str::FromStr;
use std::time::Duration;

use ethers::providers::Middleware;
use ethers_core::types::{TransactionRequest, H256, U256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum, checksum_addr, ether_to_wei, is_valid_tx_hash, parse_address, wei_to_ether};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionOp {
    SendEth,
    GetTransaction,
    GetReceipt,
    EstimateGas,
    WaitForTransaction,
}

#[derive(Debug, Deserialize)]
struct SendEthParams {
    to: String,
    /// Amount in ether.
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxHashParams {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct EstimateGasParams {
    to: String,
}

fn default_confirmations() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WaitParams {
    tx_hash: String,
    #[serde(default = "default_confirmations")]
    confirmations: u64,
}

fn parse_tx_hash(s: &str) -> Result<H256> {
    if !is_valid_tx_hash(s) {
        return Err(ChainError::validation(format!(
            "Invalid transaction hash: {s}"
        )));
    }
    H256::from_str(s).map_err(|_| ChainError::validation(format!("Invalid transaction hash: {s}")))
}

pub async fn execute(conn: &Connection, op: TransactionOp, params: &Value) -> Result<Value> {
    match op {
        TransactionOp::SendEth => {
            let p: SendEthParams = from_params(params)?;
            let to = parse_address(&p.to)?;
            let from = conn.signer_address()?;
            let value = ether_to_wei(&p.amount)?;
            let tx = TransactionRequest::new().to(to).value(value);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "from": checksum_addr(&from),
                "to": checksum(&p.to)?,
                "amount": p.amount,
                "amountWei": value.to_string(),
                "blockNumber": receipt.as_ref().and_then(|r| r.block_number).map(|n| n.as_u64()),
                "status": receipt_status(&receipt),
            }))
        }
        TransactionOp::GetTransaction => {
            let p: TxHashParams = from_params(params)?;
            let hash = parse_tx_hash(&p.tx_hash)?;
            let tx = conn
                .provider
                .get_transaction(hash)
                .await?
                .ok_or_else(|| {
                    ChainError::validation(format!("Transaction not found: {}", p.tx_hash))
                })?;
            Ok(json!({
                "hash": format!("{:#x}", tx.hash),
                "from": checksum_addr(&tx.from),
                "to": tx.to.map(|a| checksum_addr(&a)),
                "value": wei_to_ether(tx.value),
                "gasPrice": tx.gas_price.map(|g| g.to_string()),
                "gasLimit": tx.gas.to_string(),
                "nonce": tx.nonce.as_u64(),
                "blockNumber": tx.block_number.map(|n| n.as_u64()),
            }))
        }
        TransactionOp::GetReceipt => {
            let p: TxHashParams = from_params(params)?;
            let hash = parse_tx_hash(&p.tx_hash)?;
            let receipt = conn
                .provider
                .get_transaction_receipt(hash)
                .await?
                .ok_or_else(|| {
                    ChainError::validation(format!("Receipt not found: {}", p.tx_hash))
                })?;
            let status = if receipt.status == Some(1u64.into()) {
                "success"
            } else {
                "failed"
            };
            Ok(json!({
                "hash": format!("{:#x}", receipt.transaction_hash),
                "from": checksum_addr(&receipt.from),
                "to": receipt.to.map(|a| checksum_addr(&a)),
                "status": status,
                "blockNumber": receipt.block_number.map(|n| n.as_u64()),
                "gasUsed": receipt.gas_used.map(|g| g.to_string()),
            }))
        }
        TransactionOp::EstimateGas => {
            let p: EstimateGasParams = from_params(params)?;
            let to = parse_address(&p.to)?;
            // A nominal 0.01 ETH transfer, same baseline the UI quotes
            let value = ether_to_wei("0.01")?;
            let tx = TransactionRequest::new().to(to).value(value).into();
            let gas = conn.provider.estimate_gas(&tx, None).await?;
            let gas_price = conn.provider.get_gas_price().await?;
            let cost = gas
                .checked_mul(gas_price)
                .unwrap_or_else(U256::max_value);
            Ok(json!({
                "gasEstimate": gas.to_string(),
                "gasPrice": gas_price.to_string(),
                "estimatedCostWei": cost.to_string(),
                "estimatedCostEth": wei_to_ether(cost),
            }))
        }
        TransactionOp::WaitForTransaction => {
            let p: WaitParams = from_params(params)?;
            let hash = parse_tx_hash(&p.tx_hash)?;
            let receipt = wait_for_confirmations(conn, hash, p.confirmations).await?;
            Ok(json!({
                "hash": p.tx_hash,
                "confirmed": true,
                "confirmations": p.confirmations,
                "blockNumber": receipt.block_number.map(|n| n.as_u64()),
                "status": if receipt.status == Some(1u64.into()) { "success" } else { "failed" },
            }))
        }
    }
}

/// Poll until the transaction is mined and buried under the requested
/// number of confirmations.
async fn wait_for_confirmations(
    conn: &Connection,
    hash: H256,
    confirmations: u64,
) -> Result<ethers_core::types::TransactionReceipt> {
    loop {
        if let Some(receipt) = conn.provider.get_transaction_receipt(hash).await? {
            if let Some(mined_at) = receipt.block_number {
                let head = conn.provider.get_block_number().await?;
                if head.as_u64() + 1 >= mined_at.as_u64() + confirmations {
                    return Ok(receipt);
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn tx_hash_validation() {
        assert!(parse_tx_hash(&format!("0x{}", "ab".repeat(32))).is_ok());
        assert!(parse_tx_hash("0xabc").is_err());
        assert!(parse_tx_hash("not-a-hash").is_err());
    }

    #[tokio::test]
    async fn send_eth_without_key_is_permission_error() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            TransactionOp::SendEth,
            &json!({"to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", "amount": "0.1"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }
}
