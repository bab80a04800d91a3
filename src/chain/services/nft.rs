// src/chain/services/nft.rs

use ethers_core::abi::Token;
use ethers_core::types::TransactionRequest;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{decode_address, decode_string, decode_u256, encode_call, eth_call, parse_u256};
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum, checksum_addr, parse_address};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NftOp {
    GetNftInfo,
    GetTokenUri,
    GetOwner,
    GetBalance,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NftStandard {
    Erc721,
    Erc1155,
}

impl Default for NftStandard {
    fn default() -> Self {
        NftStandard::Erc721
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoParams {
    contract_address: String,
    #[serde(default)]
    standard: NftStandard,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenIdParams {
    contract_address: String,
    token_id: String,
    #[serde(default)]
    standard: NftStandard,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceParams {
    contract_address: String,
    owner_address: String,
    #[serde(default)]
    standard: NftStandard,
    /// Required for ERC-1155 balance lookups.
    #[serde(default)]
    token_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferParams {
    contract_address: String,
    to: String,
    token_id: String,
}

pub async fn execute(conn: &Connection, op: NftOp, params: &Value) -> Result<Value> {
    match op {
        NftOp::GetNftInfo => {
            let p: InfoParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            match p.standard {
                NftStandard::Erc721 => {
                    let name_raw = eth_call(&conn.provider, contract, encode_call("name()", &[])).await?;
                    let symbol_raw =
                        eth_call(&conn.provider, contract, encode_call("symbol()", &[])).await?;
                    Ok(json!({
                        "address": checksum(&p.contract_address)?,
                        "name": decode_string(&name_raw),
                        "symbol": decode_string(&symbol_raw),
                        "standard": "ERC-721",
                    }))
                }
                NftStandard::Erc1155 => Ok(json!({
                    "address": checksum(&p.contract_address)?,
                    "standard": "ERC-1155",
                })),
            }
        }
        NftOp::GetTokenUri => {
            let p: TokenIdParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            let id = parse_u256(&p.token_id)?;
            let sig = match p.standard {
                NftStandard::Erc1155 => "uri(uint256)",
                NftStandard::Erc721 => "tokenURI(uint256)",
            };
            let raw = eth_call(&conn.provider, contract, encode_call(sig, &[Token::Uint(id)])).await?;
            Ok(json!({
                "contractAddress": checksum(&p.contract_address)?,
                "tokenId": p.token_id,
                "uri": decode_string(&raw),
            }))
        }
        NftOp::GetOwner => {
            let p: TokenIdParams = from_params(params)?;
            if p.standard == NftStandard::Erc1155 {
                return Err(ChainError::validation("ERC-1155 does not have single owner"));
            }
            let contract = parse_address(&p.contract_address)?;
            let id = parse_u256(&p.token_id)?;
            let raw = eth_call(
                &conn.provider,
                contract,
                encode_call("ownerOf(uint256)", &[Token::Uint(id)]),
            )
            .await?;
            let owner = decode_address(&raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode owner".into()))?;
            Ok(json!({
                "contractAddress": checksum(&p.contract_address)?,
                "tokenId": p.token_id,
                "owner": checksum_addr(&owner),
            }))
        }
        NftOp::GetBalance => {
            let p: BalanceParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            let owner = parse_address(&p.owner_address)?;
            let data = match p.standard {
                NftStandard::Erc1155 => {
                    let id = p.token_id.as_deref().ok_or_else(|| {
                        ChainError::validation("tokenId is required for ERC-1155 balance")
                    })?;
                    encode_call(
                        "balanceOf(address,uint256)",
                        &[Token::Address(owner), Token::Uint(parse_u256(id)?)],
                    )
                }
                NftStandard::Erc721 => encode_call("balanceOf(address)", &[Token::Address(owner)]),
            };
            let raw = eth_call(&conn.provider, contract, data).await?;
            let balance = decode_u256(&raw)
                .ok_or_else(|| ChainError::Rpc("Failed to decode NFT balance".into()))?;
            Ok(json!({
                "contractAddress": checksum(&p.contract_address)?,
                "owner": checksum(&p.owner_address)?,
                "balance": balance.to_string(),
            }))
        }
        NftOp::Transfer => {
            let p: TransferParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            let to = parse_address(&p.to)?;
            let from = conn.signer_address()?;
            let id = parse_u256(&p.token_id)?;
            let data = encode_call(
                "transferFrom(address,address,uint256)",
                &[Token::Address(from), Token::Address(to), Token::Uint(id)],
            );
            let tx = TransactionRequest::new().to(contract).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "from": checksum_addr(&from),
                "to": checksum(&p.to)?,
                "tokenId": p.token_id,
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
    async fn erc1155_has_no_single_owner() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            NftOp::GetOwner,
            &json!({
                "contractAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "tokenId": "1",
                "standard": "erc1155",
            }),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("single owner"));
    }

    #[tokio::test]
    async fn transfer_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            NftOp::Transfer,
            &json!({
                "contractAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "tokenId": "1",
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }
}
