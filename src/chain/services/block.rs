// src/chain/services/block.rs

use ethers::providers::Middleware;
use ethers_core::types::{BlockId, BlockNumber, H256};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::chain::explorer::ExplorerClient;
use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockOp {
    GetBlock,
    GetLatestBlock,
    GetBlockNumber,
    GetBlockByTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetBlockParams {
    block_identifier: String,
}

fn default_closest() -> String {
    "before".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByTimeParams {
    timestamp: u64,
    #[serde(default = "default_closest")]
    closest: String,
}

/// "latest"/"pending"/"earliest", a 0x block hash, or a decimal height.
fn parse_block_id(s: &str) -> Result<BlockId> {
    match s {
        "latest" => return Ok(BlockNumber::Latest.into()),
        "pending" => return Ok(BlockNumber::Pending.into()),
        "earliest" => return Ok(BlockNumber::Earliest.into()),
        _ => {}
    }
    if s.starts_with("0x") && s.len() == 66 {
        let hash = H256::from_str(s)
            .map_err(|_| ChainError::validation(format!("Invalid block hash: {s}")))?;
        return Ok(BlockId::Hash(hash));
    }
    let number: u64 = s
        .parse()
        .map_err(|_| ChainError::validation(format!("Invalid block identifier: {s}")))?;
    Ok(BlockNumber::Number(number.into()).into())
}

pub async fn execute(conn: &Connection, op: BlockOp, params: &Value) -> Result<Value> {
    match op {
        BlockOp::GetBlock => {
            let p: GetBlockParams = from_params(params)?;
            let id = parse_block_id(&p.block_identifier)?;
            let block = conn.provider.get_block(id).await?.ok_or_else(|| {
                ChainError::validation(format!("Block not found: {}", p.block_identifier))
            })?;
            Ok(json!({
                "number": block.number.map(|n| n.as_u64()),
                "hash": block.hash.map(|h| format!("{h:#x}")),
                "timestamp": block.timestamp.as_u64(),
                "gasUsed": block.gas_used.to_string(),
                "transactionCount": block.transactions.len(),
            }))
        }
        BlockOp::GetLatestBlock => {
            let block = conn
                .provider
                .get_block(BlockNumber::Latest)
                .await?
                .ok_or_else(|| ChainError::Rpc("Latest block not found".into()))?;
            Ok(json!({
                "number": block.number.map(|n| n.as_u64()),
                "hash": block.hash.map(|h| format!("{h:#x}")),
                "timestamp": block.timestamp.as_u64(),
                "gasUsed": block.gas_used.to_string(),
            }))
        }
        BlockOp::GetBlockNumber => {
            let number = conn.provider.get_block_number().await?;
            Ok(json!({"blockNumber": number.as_u64()}))
        }
        BlockOp::GetBlockByTime => {
            let p: ByTimeParams = from_params(params)?;
            let explorer = ExplorerClient::from_connection(conn)?;
            let result = explorer.get_block_by_timestamp(p.timestamp, &p.closest).await?;
            Ok(json!({
                "timestamp": p.timestamp,
                "closest": p.closest,
                "blockNumber": result,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_identifier_forms() {
        assert!(matches!(
            parse_block_id("latest"),
            Ok(BlockId::Number(BlockNumber::Latest))
        ));
        assert!(matches!(parse_block_id("12345"), Ok(BlockId::Number(_))));
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(matches!(parse_block_id(&hash), Ok(BlockId::Hash(_))));
        assert!(parse_block_id("not-a-block").is_err());
    }
}
