// src/chain/services/token.rs

use ethers::providers::Middleware;
use ethers_core::abi::Token;
use ethers_core::types::{Address, TransactionRequest, U256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{decode_string, decode_u256, encode_call, eth_call};
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum, format_units, parse_address, parse_units};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenOp {
    GetTokenInfo,
    GetBalance,
    Transfer,
    Approve,
    GetAllowance,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenParams {
    token_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceParams {
    token_address: String,
    holder_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferParams {
    token_address: String,
    to: String,
    /// Human-readable amount, scaled by the token's own decimals.
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApproveParams {
    token_address: String,
    spender: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowanceParams {
    token_address: String,
    holder_address: String,
    spender: String,
}

/// ERC-20 name/symbol/decimals, fetched with raw calls so tokens with
/// bytes32 names still resolve.
pub struct Erc20Metadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: u32,
}

pub async fn erc20_metadata<M: Middleware>(provider: &M, token: Address) -> Result<Erc20Metadata> {
    // The three reads are independent, so fan them out together.
    // name/symbol are optional on chain; only decimals is required.
    let (name_raw, symbol_raw, decimals_raw) = futures::join!(
        eth_call(provider, token, encode_call("name()", &[])),
        eth_call(provider, token, encode_call("symbol()", &[])),
        eth_call(provider, token, encode_call("decimals()", &[])),
    );
    let name = name_raw.ok().and_then(|raw| decode_string(&raw));
    let symbol = symbol_raw.ok().and_then(|raw| decode_string(&raw));
    let decimals = decode_u256(&decimals_raw?)
        .ok_or_else(|| ChainError::Rpc("Failed to decode token decimals".into()))?
        .as_u32();
    Ok(Erc20Metadata {
        name,
        symbol,
        decimals,
    })
}

pub async fn erc20_balance<M: Middleware>(
    provider: &M,
    token: Address,
    owner: Address,
) -> Result<U256> {
    let data = encode_call("balanceOf(address)", &[Token::Address(owner)]);
    let raw = eth_call(provider, token, data).await?;
    decode_u256(&raw).ok_or_else(|| ChainError::Rpc("Failed to decode token balance".into()))
}

pub async fn erc20_total_supply<M: Middleware>(provider: &M, token: Address) -> Result<U256> {
    let raw = eth_call(provider, token, encode_call("totalSupply()", &[])).await?;
    decode_u256(&raw).ok_or_else(|| ChainError::Rpc("Failed to decode total supply".into()))
}

pub async fn erc20_allowance<M: Middleware>(
    provider: &M,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256> {
    let data = encode_call(
        "allowance(address,address)",
        &[Token::Address(owner), Token::Address(spender)],
    );
    let raw = eth_call(provider, token, data).await?;
    decode_u256(&raw).ok_or_else(|| ChainError::Rpc("Failed to decode allowance".into()))
}

pub async fn execute(conn: &Connection, op: TokenOp, params: &Value) -> Result<Value> {
    match op {
        TokenOp::GetTokenInfo => {
            let p: TokenParams = from_params(params)?;
            let token = parse_address(&p.token_address)?;
            let meta = erc20_metadata(&conn.provider, token).await?;
            let total_supply = erc20_total_supply(&conn.provider, token).await?;
            Ok(json!({
                "address": checksum(&p.token_address)?,
                "name": meta.name,
                "symbol": meta.symbol,
                "decimals": meta.decimals,
                "totalSupply": total_supply.to_string(),
            }))
        }
        TokenOp::GetBalance => {
            let p: BalanceParams = from_params(params)?;
            let token = parse_address(&p.token_address)?;
            let holder = parse_address(&p.holder_address)?;
            let meta = erc20_metadata(&conn.provider, token).await?;
            let balance = erc20_balance(&conn.provider, token, holder).await?;
            Ok(json!({
                "tokenAddress": checksum(&p.token_address)?,
                "holder": checksum(&p.holder_address)?,
                "balance": balance.to_string(),
                "formatted": format_units(balance, meta.decimals),
                "symbol": meta.symbol,
            }))
        }
        TokenOp::Transfer => {
            let p: TransferParams = from_params(params)?;
            let token = parse_address(&p.token_address)?;
            let to = parse_address(&p.to)?;
            conn.signer()?;
            let meta = erc20_metadata(&conn.provider, token).await?;
            let amount = parse_units(&p.amount, meta.decimals)?;
            let data = encode_call(
                "transfer(address,uint256)",
                &[Token::Address(to), Token::Uint(amount)],
            );
            let tx = TransactionRequest::new().to(token).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "to": checksum(&p.to)?,
                "amount": p.amount,
                "status": receipt_status(&receipt),
            }))
        }
        TokenOp::Approve => {
            let p: ApproveParams = from_params(params)?;
            let token = parse_address(&p.token_address)?;
            let spender = parse_address(&p.spender)?;
            conn.signer()?;
            let meta = erc20_metadata(&conn.provider, token).await?;
            let amount = parse_units(&p.amount, meta.decimals)?;
            let data = encode_call(
                "approve(address,uint256)",
                &[Token::Address(spender), Token::Uint(amount)],
            );
            let tx = TransactionRequest::new().to(token).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "spender": checksum(&p.spender)?,
                "amount": p.amount,
                "status": receipt_status(&receipt),
            }))
        }
        TokenOp::GetAllowance => {
            let p: AllowanceParams = from_params(params)?;
            let token = parse_address(&p.token_address)?;
            let owner = parse_address(&p.holder_address)?;
            let spender = parse_address(&p.spender)?;
            let meta = erc20_metadata(&conn.provider, token).await?;
            let allowance = erc20_allowance(&conn.provider, token, owner, spender).await?;
            Ok(json!({
                "owner": checksum(&p.holder_address)?,
                "spender": checksum(&p.spender)?,
                "allowance": allowance.to_string(),
                "formatted": format_units(allowance, meta.decimals),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ChainError;

    #[tokio::test]
    async fn transfer_without_key_fails_before_network() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            TokenOp::Transfer,
            &json!({
                "tokenAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "amount": "1",
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }
}
