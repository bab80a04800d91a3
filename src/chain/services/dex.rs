// src/chain/services/dex.rs

use std::time::{SystemTime, UNIX_EPOCH};

use ethers_core::abi::{decode, ParamType, Token};
use ethers_core::types::{TransactionRequest, U256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{decode_address, decode_u256, encode_call, eth_call};
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum, checksum_addr, format_units, parse_address, parse_units};
use crate::error::{ChainError, Result};

/// Uniswap V3 default fee tier, 0.3%.
const DEFAULT_FEE_TIER: u64 = 3000;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DexOp {
    GetSwapQuote,
    GetPoolInfo,
    GetTokenPrice,
    ExecuteSwap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteParams {
    token_in: String,
    token_out: String,
    /// Amount in, scaled at 18 decimals.
    amount_in: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolParams {
    pool_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceParams {
    token_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapParams {
    token_in: String,
    token_out: String,
    amount_in: String,
    #[serde(default)]
    #[allow(dead_code)]
    slippage: Option<f64>,
}

pub async fn execute(conn: &Connection, op: DexOp, params: &Value) -> Result<Value> {
    let contracts = conn.network.contracts();
    match op {
        DexOp::GetSwapQuote => {
            let p: QuoteParams = from_params(params)?;
            let token_in = parse_address(&p.token_in)?;
            let token_out = parse_address(&p.token_out)?;
            let amount_in = parse_units(&p.amount_in, 18)?;
            let quoter = parse_address(contracts.uniswap_quoter)?;

            let data = encode_call(
                "quoteExactInputSingle(address,address,uint24,uint256,uint160)",
                &[
                    Token::Address(token_in),
                    Token::Address(token_out),
                    Token::Uint(U256::from(DEFAULT_FEE_TIER)),
                    Token::Uint(amount_in),
                    Token::Uint(U256::zero()),
                ],
            );
            match eth_call(&conn.provider, quoter, data).await {
                Ok(raw) => {
                    let amount_out = decode_u256(&raw)
                        .ok_or_else(|| ChainError::Rpc("Failed to decode quote".into()))?;
                    Ok(json!({
                        "tokenIn": p.token_in,
                        "tokenOut": p.token_out,
                        "amountIn": p.amount_in,
                        "amountOut": format_units(amount_out, 18),
                        "feeTier": DEFAULT_FEE_TIER,
                        "priceImpact": "N/A",
                    }))
                }
                Err(_) => Ok(json!({
                    "tokenIn": p.token_in,
                    "tokenOut": p.token_out,
                    "amountIn": p.amount_in,
                    "error": "Unable to get quote - pool may not exist or have liquidity",
                })),
            }
        }
        DexOp::GetPoolInfo => {
            let p: PoolParams = from_params(params)?;
            let pool = parse_address(&p.pool_address)?;

            let token0_raw = eth_call(&conn.provider, pool, encode_call("token0()", &[])).await?;
            let token1_raw = eth_call(&conn.provider, pool, encode_call("token1()", &[])).await?;
            let fee_raw = eth_call(&conn.provider, pool, encode_call("fee()", &[])).await?;
            let liquidity_raw =
                eth_call(&conn.provider, pool, encode_call("liquidity()", &[])).await?;
            let slot0_raw = eth_call(&conn.provider, pool, encode_call("slot0()", &[])).await?;

            let token0 = decode_address(&token0_raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode token0".into()))?;
            let token1 = decode_address(&token1_raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode token1".into()))?;
            let fee = decode_u256(&fee_raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode fee".into()))?;
            let liquidity = decode_u256(&liquidity_raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode liquidity".into()))?;

            let slot0_types = vec![
                ParamType::Uint(160), // sqrtPriceX96
                ParamType::Int(24),   // tick
                ParamType::Uint(16),
                ParamType::Uint(16),
                ParamType::Uint(16),
                ParamType::Uint(8),
                ParamType::Bool,
            ];
            let slot0 = decode(&slot0_types, &slot0_raw)
                .map_err(|e| ChainError::Rpc(format!("Failed to decode slot0: {e}")))?;
            let sqrt_price = match slot0.first() {
                Some(Token::Uint(n)) => n.to_string(),
                _ => "0".to_string(),
            };
            // int24 arrives sign-extended, so the low 32 bits carry the sign
            let tick = match slot0.get(1) {
                Some(Token::Int(n)) => n.low_u32() as i32,
                _ => 0,
            };

            Ok(json!({
                "address": checksum(&p.pool_address)?,
                "token0": checksum_addr(&token0),
                "token1": checksum_addr(&token1),
                "fee": fee.as_u64(),
                "liquidity": liquidity.to_string(),
                "sqrtPriceX96": sqrt_price,
                "tick": tick,
            }))
        }
        DexOp::GetTokenPrice => {
            let p: PriceParams = from_params(params)?;
            parse_address(&p.token_address)?;
            Ok(json!({
                "token": checksum(&p.token_address)?,
                "price": "Price oracle integration required",
                "source": "Chainlink or DEX TWAP recommended",
            }))
        }
        DexOp::ExecuteSwap => {
            let p: SwapParams = from_params(params)?;
            let token_in = parse_address(&p.token_in)?;
            let token_out = parse_address(&p.token_out)?;
            let recipient = conn.signer_address()?;
            let amount_in = parse_units(&p.amount_in, 18)?;
            let router = parse_address(contracts.uniswap_v3_router)?;

            let deadline = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() + 20 * 60)
                .unwrap_or_default();

            // TODO: derive amountOutMinimum from a quote plus the slippage
            // parameter instead of accepting any execution price
            let swap_request = Token::Tuple(vec![
                Token::Address(token_in),
                Token::Address(token_out),
                Token::Uint(U256::from(DEFAULT_FEE_TIER)),
                Token::Address(recipient),
                Token::Uint(U256::from(deadline)),
                Token::Uint(amount_in),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
            ]);
            let data = encode_call(
                "exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))",
                &[swap_request],
            );
            let tx = TransactionRequest::new().to(router).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "transactionHash": format!("{hash:#x}"),
                "blockNumber": receipt.as_ref().and_then(|r| r.block_number).map(|n| n.as_u64()),
                "gasUsed": receipt.as_ref().and_then(|r| r.gas_used).map(|g| g.to_string()),
                "status": receipt_status(&receipt),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn swap_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            DexOp::ExecuteSwap,
            &json!({
                "tokenIn": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "tokenOut": "0x4200000000000000000000000000000000000006",
                "amountIn": "1",
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }

    #[tokio::test]
    async fn token_price_is_a_stub() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let result = execute(
            &conn,
            DexOp::GetTokenPrice,
            &json!({"tokenAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"}),
        )
        .await
        .unwrap();
        assert_eq!(result["source"], "Chainlink or DEX TWAP recommended");
    }
}
