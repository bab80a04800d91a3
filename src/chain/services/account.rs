// src/chain/services/account.rs

use ethers::providers::Middleware;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::explorer::ExplorerClient;
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, Pagination};
use crate::chain::units::{checksum, format_units, parse_address, wei_to_ether};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountOp {
    GetBalance,
    GetTokenBalance,
    GetTransactions,
    GetTokenTransfers,
    GetNftHoldings,
    GetNonce,
    IsContract,
    GetCode,
}

#[derive(Debug, Deserialize)]
struct AddressParams {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalanceParams {
    address: String,
    token_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    address: String,
    #[serde(default)]
    token_address: Option<String>,
    #[serde(flatten)]
    pagination: Pagination,
}

pub async fn execute(conn: &Connection, op: AccountOp, params: &Value) -> Result<Value> {
    match op {
        AccountOp::GetBalance => {
            let p: AddressParams = from_params(params)?;
            let addr = parse_address(&p.address)?;
            let balance = conn.provider.get_balance(addr, None).await?;
            Ok(json!({
                "address": checksum(&p.address)?,
                "balanceWei": balance.to_string(),
                "balanceEth": wei_to_ether(balance),
            }))
        }
        AccountOp::GetTokenBalance => {
            let p: TokenBalanceParams = from_params(params)?;
            let owner = parse_address(&p.address)?;
            let token = parse_address(&p.token_address)?;
            let meta = super::token::erc20_metadata(&conn.provider, token).await?;
            let balance = super::token::erc20_balance(&conn.provider, token, owner).await?;
            Ok(json!({
                "address": checksum(&p.address)?,
                "tokenAddress": checksum(&p.token_address)?,
                "tokenName": meta.name,
                "tokenSymbol": meta.symbol,
                "balance": balance.to_string(),
                "formattedBalance": format_units(balance, meta.decimals),
                "decimals": meta.decimals,
            }))
        }
        AccountOp::GetTransactions => {
            let p: HistoryParams = from_params(params)?;
            parse_address(&p.address)?;
            let checksummed = checksum(&p.address)?;
            match fetch_transactions(conn, &p).await {
                Ok(txs) => {
                    let count = txs.as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({
                        "address": checksummed,
                        "transactions": txs,
                        "count": count,
                    }))
                }
                Err(e) => {
                    tracing::warn!("transaction history lookup failed: {e}");
                    Ok(json!({
                        "address": checksummed,
                        "transactions": [],
                        "count": 0,
                        "note": "Basescan API credentials required for transaction history",
                    }))
                }
            }
        }
        AccountOp::GetTokenTransfers => {
            let p: HistoryParams = from_params(params)?;
            parse_address(&p.address)?;
            let checksummed = checksum(&p.address)?;
            let token_label = match &p.token_address {
                Some(t) if !t.is_empty() => checksum(t)?,
                _ => "all".to_string(),
            };
            match fetch_token_transfers(conn, &p).await {
                Ok(transfers) => {
                    let count = transfers.as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({
                        "address": checksummed,
                        "tokenAddress": token_label,
                        "transfers": transfers,
                        "count": count,
                    }))
                }
                Err(e) => {
                    tracing::warn!("token transfer lookup failed: {e}");
                    Ok(json!({
                        "address": checksummed,
                        "transfers": [],
                        "count": 0,
                        "note": "Basescan API credentials required for token transfers",
                    }))
                }
            }
        }
        AccountOp::GetNftHoldings => {
            let p: HistoryParams = from_params(params)?;
            parse_address(&p.address)?;
            let checksummed = checksum(&p.address)?;
            match fetch_nft_transfers(conn, &p).await {
                Ok(nfts) => {
                    let count = nfts.as_array().map(|a| a.len()).unwrap_or(0);
                    Ok(json!({
                        "address": checksummed,
                        "nfts": nfts,
                        "count": count,
                    }))
                }
                Err(e) => {
                    tracing::warn!("nft holdings lookup failed: {e}");
                    Ok(json!({
                        "address": checksummed,
                        "nfts": [],
                        "count": 0,
                        "note": "Basescan API credentials required for NFT holdings",
                    }))
                }
            }
        }
        AccountOp::GetNonce => {
            let p: AddressParams = from_params(params)?;
            let addr = parse_address(&p.address)?;
            let nonce = conn.provider.get_transaction_count(addr, None).await?;
            Ok(json!({
                "address": checksum(&p.address)?,
                "nonce": nonce.as_u64(),
            }))
        }
        AccountOp::IsContract => {
            let p: AddressParams = from_params(params)?;
            let addr = parse_address(&p.address)?;
            let code = conn.provider.get_code(addr, None).await?;
            let code_hex = format!("0x{}", hex::encode(&code));
            Ok(json!({
                "address": checksum(&p.address)?,
                "isContract": !code.is_empty(),
                "codeLength": code_hex.len(),
            }))
        }
        AccountOp::GetCode => {
            let p: AddressParams = from_params(params)?;
            let addr = parse_address(&p.address)?;
            let code = conn.provider.get_code(addr, None).await?;
            let code_hex = format!("0x{}", hex::encode(&code));
            Ok(json!({
                "address": checksum(&p.address)?,
                "code": code_hex,
                "isEmpty": code.is_empty(),
                "length": code_hex.len(),
            }))
        }
    }
}

async fn fetch_transactions(conn: &Connection, p: &HistoryParams) -> Result<Value> {
    let explorer = ExplorerClient::from_connection(conn)?;
    explorer
        .get_transactions(&p.address, p.pagination.page, p.pagination.limit, &p.pagination.sort)
        .await
}

async fn fetch_token_transfers(conn: &Connection, p: &HistoryParams) -> Result<Value> {
    let explorer = ExplorerClient::from_connection(conn)?;
    let contract = p.token_address.as_deref().filter(|s| !s.is_empty());
    explorer
        .get_token_transfers(
            &p.address,
            contract,
            p.pagination.page,
            p.pagination.limit,
            &p.pagination.sort,
        )
        .await
}

async fn fetch_nft_transfers(conn: &Connection, p: &HistoryParams) -> Result<Value> {
    let explorer = ExplorerClient::from_connection(conn)?;
    explorer
        .get_nft_transfers(
            &p.address,
            None,
            p.pagination.page,
            p.pagination.limit,
            &p.pagination.sort,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_deserialize() {
        let op: AccountOp = serde_json::from_value(json!("getBalance")).unwrap();
        assert!(matches!(op, AccountOp::GetBalance));
        let op: AccountOp = serde_json::from_value(json!("getNftHoldings")).unwrap();
        assert!(matches!(op, AccountOp::GetNftHoldings));
        assert!(serde_json::from_value::<AccountOp>(json!("selfDestruct")).is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_address_before_any_request() {
        let conn = Connection::connect(&crate::config::Config::default()).unwrap();
        let err = execute(&conn, AccountOp::GetBalance, &json!({"address": "nope"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid address"));
    }
}
