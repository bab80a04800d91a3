// src/chain/services/fee.rs

use std::str::FromStr;

use ethers::providers::Middleware;
use ethers_core::abi::Token;
use ethers_core::types::{BlockNumber, Bytes, TransactionRequest, U256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{decode_u256, encode_call, eth_call};
use crate::chain::explorer::ExplorerClient;
use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::chain::units::{ether_to_wei, format_units, parse_address, wei_to_ether};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeOp {
    GetGasPrice,
    GetFeeData,
    EstimateGas,
    GetL1DataFee,
    GetBaseFee,
    CalculateTotalFee,
    GetGasOracle,
}

fn default_value() -> String {
    "0".to_string()
}

fn default_data() -> String {
    "0x".to_string()
}

#[derive(Debug, Deserialize)]
struct EstimateParams {
    to: String,
    #[serde(default = "default_value")]
    value: String,
    #[serde(default = "default_data")]
    data: String,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataParams {
    data: String,
}

fn gwei(value: U256) -> String {
    format_units(value, 9)
}

fn parse_data(s: &str) -> Result<Bytes> {
    Bytes::from_str(s).map_err(|_| ChainError::validation(format!("Invalid calldata hex: {s}")))
}

fn build_request(p: &EstimateParams) -> Result<TransactionRequest> {
    let mut tx = TransactionRequest::new()
        .to(parse_address(&p.to)?)
        .value(ether_to_wei(&p.value)?)
        .data(parse_data(&p.data)?);
    if let Some(from) = &p.from {
        if !from.is_empty() {
            tx = tx.from(parse_address(from)?);
        }
    }
    Ok(tx)
}

async fn oracle_u256(conn: &Connection, sig: &str, tokens: &[Token]) -> Result<U256> {
    let oracle = parse_address(conn.network.contracts().gas_price_oracle)?;
    let raw = eth_call(&conn.provider, oracle, encode_call(sig, tokens)).await?;
    decode_u256(&raw)
        .ok_or_else(|| ChainError::Rpc(format!("Gas price oracle returned no value for {sig}")))
}

async fn l1_fee(conn: &Connection, data: &Bytes) -> Result<U256> {
    oracle_u256(
        conn,
        "getL1Fee(bytes)",
        &[Token::Bytes(data.to_vec())],
    )
    .await
}

pub async fn execute(conn: &Connection, op: FeeOp, params: &Value) -> Result<Value> {
    match op {
        FeeOp::GetGasPrice => {
            let gas_price = conn.provider.get_gas_price().await?;
            Ok(json!({
                "gasPrice": gas_price.to_string(),
                "gasPriceGwei": gwei(gas_price),
            }))
        }
        FeeOp::GetFeeData => {
            let gas_price = conn.provider.get_gas_price().await?;
            let (max_fee, max_priority) = conn.provider.estimate_eip1559_fees(None).await?;
            Ok(json!({
                "gasPrice": gas_price.to_string(),
                "maxFeePerGas": max_fee.to_string(),
                "maxPriorityFeePerGas": max_priority.to_string(),
                "gasPriceGwei": gwei(gas_price),
                "maxFeePerGasGwei": gwei(max_fee),
                "maxPriorityFeePerGasGwei": gwei(max_priority),
            }))
        }
        FeeOp::EstimateGas => {
            let p: EstimateParams = from_params(params)?;
            let tx = build_request(&p)?.into();
            let gas = conn.provider.estimate_gas(&tx, None).await?;
            let gas_price = conn.provider.get_gas_price().await?;
            let cost = gas.checked_mul(gas_price).unwrap_or_else(U256::max_value);
            Ok(json!({
                "gasEstimate": gas.to_string(),
                "gasPrice": gas_price.to_string(),
                "estimatedCostWei": cost.to_string(),
                "estimatedCostEth": wei_to_ether(cost),
            }))
        }
        FeeOp::GetL1DataFee => {
            let p: DataParams = from_params(params)?;
            let data = parse_data(&p.data)?;
            let fee = l1_fee(conn, &data).await?;
            let l1_gas_used = oracle_u256(
                conn,
                "getL1GasUsed(bytes)",
                &[Token::Bytes(data.to_vec())],
            )
            .await?;
            let l1_base_fee = oracle_u256(conn, "l1BaseFee()", &[]).await?;
            Ok(json!({
                "l1Fee": fee.to_string(),
                "l1FeeEth": wei_to_ether(fee),
                "l1GasUsed": l1_gas_used.to_string(),
                "l1BaseFee": l1_base_fee.to_string(),
                "l1BaseFeeGwei": gwei(l1_base_fee),
            }))
        }
        FeeOp::GetBaseFee => {
            let block = conn
                .provider
                .get_block(BlockNumber::Latest)
                .await?
                .ok_or_else(|| ChainError::Rpc("Latest block unavailable".to_string()))?;
            Ok(json!({
                "baseFee": block.base_fee_per_gas.map(|f| f.to_string()),
                "baseFeeGwei": block.base_fee_per_gas.map(gwei),
                "blockNumber": block.number.map(|n| n.as_u64()),
            }))
        }
        FeeOp::CalculateTotalFee => {
            let p: EstimateParams = from_params(params)?;
            let data = parse_data(&p.data)?;
            let tx = build_request(&p)?.into();
            let gas = conn.provider.estimate_gas(&tx, None).await?;
            let gas_price = conn.provider.get_gas_price().await?;
            let l1 = l1_fee(conn, &data).await?;
            let l2 = gas.checked_mul(gas_price).unwrap_or_else(U256::max_value);
            let total = l2.checked_add(l1).unwrap_or_else(U256::max_value);
            let pct = |part: U256| {
                if total.is_zero() {
                    0.0
                } else {
                    (part * U256::from(10_000u64) / total).as_u64() as f64 / 100.0
                }
            };
            Ok(json!({
                "l2Gas": gas.to_string(),
                "l2Fee": l2.to_string(),
                "l2FeeEth": wei_to_ether(l2),
                "l1Fee": l1.to_string(),
                "l1FeeEth": wei_to_ether(l1),
                "totalFee": total.to_string(),
                "totalFeeEth": wei_to_ether(total),
                "breakdown": {
                    "l2Percentage": pct(l2),
                    "l1Percentage": pct(l1),
                },
            }))
        }
        FeeOp::GetGasOracle => {
            // Prefer the explorer's gas tracker when a key is configured;
            // fall back to tiers derived from local fee data.
            if conn.explorer_api_key.is_some() {
                if let Ok(explorer) = ExplorerClient::from_connection(conn) {
                    if let Ok(oracle) = explorer.get_gas_oracle().await {
                        return Ok(json!({"source": "explorer", "oracle": oracle}));
                    }
                }
            }
            let (_, priority) = conn.provider.estimate_eip1559_fees(None).await?;
            let block = conn
                .provider
                .get_block(BlockNumber::Latest)
                .await?
                .ok_or_else(|| ChainError::Rpc("Latest block unavailable".to_string()))?;
            let base = block.base_fee_per_gas.unwrap_or_default();
            let tier = |max_fee: U256, max_priority: U256| {
                json!({
                    "maxFeePerGas": max_fee.to_string(),
                    "maxPriorityFeePerGas": max_priority.to_string(),
                    "maxFeePerGasGwei": gwei(max_fee),
                })
            };
            let standard_base = base * U256::from(125u64) / U256::from(100u64);
            let fast_base = base * U256::from(150u64) / U256::from(100u64);
            Ok(json!({
                "baseFee": base.to_string(),
                "baseFeeGwei": gwei(base),
                "recommendations": {
                    "slow": tier(base + priority, priority),
                    "standard": tier(standard_base + priority, priority * U256::from(125u64) / U256::from(100u64)),
                    "fast": tier(fast_base + priority * U256::from(2u64), priority * U256::from(2u64)),
                },
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gwei_formatting() {
        assert_eq!(gwei(U256::from(1_000_000_000u64)), "1.0");
        assert_eq!(gwei(U256::from(1_500_000_000u64)), "1.5");
    }

    #[test]
    fn calldata_parsing() {
        assert!(parse_data("0x").is_ok());
        assert!(parse_data("0xdeadbeef").is_ok());
        assert!(parse_data("zz").is_err());
    }

    #[test]
    fn request_includes_optional_from() {
        let p = EstimateParams {
            to: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".to_string(),
            value: "0.5".to_string(),
            data: "0x".to_string(),
            from: Some("0x4200000000000000000000000000000000000006".to_string()),
        };
        let tx = build_request(&p).unwrap();
        assert!(tx.from.is_some());
        assert_eq!(tx.value, Some(ether_to_wei("0.5").unwrap()));
    }
}
