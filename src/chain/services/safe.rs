// src/chain/services/safe.rs

use ethers::signers::Signer;
use ethers_core::abi::Token;
use ethers_core::types::{Address, TransactionRequest, U256};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{encode_call, eth_call, parse_u256};
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, send_tx};
use crate::chain::units::{checksum_addr, ether_to_wei, parse_address};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SafeOp {
    GetSafeInfo,
    GetOwners,
    GetPendingTransactions,
    GetTransactionHistory,
    ProposeTransaction,
    GetTransaction,
    ConfirmTransaction,
    ExecuteTransaction,
    GetBalances,
    GetCollectibles,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafeParams {
    safe_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposeParams {
    safe_address: String,
    to: String,
    /// Value in ether.
    value: String,
    #[serde(default = "default_data")]
    data: String,
}

fn default_data() -> String {
    "0x".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxHashParams {
    #[serde(default)]
    safe_address: Option<String>,
    safe_tx_hash: String,
}

const GET_TX_HASH_SIG: &str =
    "getTransactionHash(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,uint256)";
const EXEC_TX_SIG: &str =
    "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)";

/// Client for the Safe Transaction Service REST API.
struct SafeServiceClient {
    http: Client,
    base_url: &'static str,
}

impl SafeServiceClient {
    fn new(conn: &Connection) -> Self {
        SafeServiceClient {
            http: Client::new(),
            base_url: conn.network.safe_service_url(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let body: Value = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

fn value_to_u256(v: &Value) -> Result<U256> {
    match v {
        Value::Null => Ok(U256::zero()),
        Value::Number(n) => Ok(U256::from(n.as_u64().unwrap_or(0))),
        Value::String(s) => parse_u256(s),
        _ => Err(ChainError::validation("expected a numeric field")),
    }
}

fn value_to_address(v: &Value) -> Result<Address> {
    match v.as_str() {
        Some(s) if !s.is_empty() => parse_address(s),
        _ => Ok(Address::zero()),
    }
}

fn hex_field(v: &Value) -> Result<Vec<u8>> {
    let s = v.as_str().unwrap_or("0x");
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|_| ChainError::validation("Invalid hex field in Safe transaction"))
}

pub async fn execute(conn: &Connection, op: SafeOp, params: &Value) -> Result<Value> {
    let service = SafeServiceClient::new(conn);
    match op {
        SafeOp::GetSafeInfo => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            service.get(&format!("/safes/{}/", p.safe_address)).await
        }
        SafeOp::GetOwners => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            let info = service.get(&format!("/safes/{}/", p.safe_address)).await?;
            Ok(json!({
                "owners": info["owners"],
                "threshold": info["threshold"],
                "nonce": info["nonce"],
            }))
        }
        SafeOp::GetPendingTransactions => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            let body = service
                .get(&format!(
                    "/safes/{}/multisig-transactions/?executed=false",
                    p.safe_address
                ))
                .await?;
            Ok(json!({"count": body["count"], "transactions": body["results"]}))
        }
        SafeOp::GetTransactionHistory => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            let body = service
                .get(&format!(
                    "/safes/{}/multisig-transactions/?executed=true",
                    p.safe_address
                ))
                .await?;
            Ok(json!({"count": body["count"], "transactions": body["results"]}))
        }
        SafeOp::ProposeTransaction => {
            let p: ProposeParams = from_params(params)?;
            let safe = parse_address(&p.safe_address)?;
            let to = parse_address(&p.to)?;
            let client = conn.signer()?;
            let wallet = client.signer().clone();

            let info = service.get(&format!("/safes/{}/", p.safe_address)).await?;
            let nonce = value_to_u256(&info["nonce"])?;
            let value = ether_to_wei(&p.value)?;
            let data_bytes = hex::decode(p.data.trim_start_matches("0x"))
                .map_err(|_| ChainError::validation("Invalid data hex"))?;

            // The Safe contract computes the EIP-712 digest for us
            let call = encode_call(
                GET_TX_HASH_SIG,
                &[
                    Token::Address(to),
                    Token::Uint(value),
                    Token::Bytes(data_bytes.clone()),
                    Token::Uint(U256::zero()), // CALL
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::Uint(U256::zero()),
                    Token::Address(Address::zero()),
                    Token::Address(Address::zero()),
                    Token::Uint(nonce),
                ],
            );
            let raw = eth_call(&conn.provider, safe, call).await?;
            if raw.len() < 32 {
                return Err(ChainError::Rpc("Malformed Safe transaction hash".into()));
            }
            let safe_tx_hash = format!("0x{}", hex::encode(&raw[0..32]));

            let signature = wallet
                .sign_message(&raw[0..32])
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to sign: {e}")))?;

            let body = json!({
                "to": checksum_addr(&to),
                "value": value.to_string(),
                "data": p.data,
                "operation": 0,
                "safeTxGas": 0,
                "baseGas": 0,
                "gasPrice": 0,
                "gasToken": format!("{:#x}", Address::zero()),
                "refundReceiver": format!("{:#x}", Address::zero()),
                "nonce": nonce.as_u64(),
                "contractTransactionHash": safe_tx_hash,
                "sender": checksum_addr(&wallet.address()),
                "signature": format!("0x{signature}"),
            });
            let response = service
                .post(
                    &format!("/safes/{}/multisig-transactions/", p.safe_address),
                    &body,
                )
                .await?;
            Ok(json!({
                "safeTxHash": safe_tx_hash,
                "proposed": true,
                "response": response,
            }))
        }
        SafeOp::GetTransaction => {
            let p: TxHashParams = from_params(params)?;
            service
                .get(&format!("/multisig-transactions/{}/", p.safe_tx_hash))
                .await
        }
        SafeOp::ConfirmTransaction => {
            let p: TxHashParams = from_params(params)?;
            let client = conn.signer()?;
            let wallet = client.signer().clone();
            let hash_bytes = hex::decode(p.safe_tx_hash.trim_start_matches("0x"))
                .map_err(|_| ChainError::validation("Invalid safeTxHash"))?;
            let signature = wallet
                .sign_message(&hash_bytes)
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to sign: {e}")))?;
            let response = service
                .post(
                    &format!("/multisig-transactions/{}/confirmations/", p.safe_tx_hash),
                    &json!({"signature": format!("0x{signature}")}),
                )
                .await?;
            Ok(json!({
                "safeTxHash": p.safe_tx_hash,
                "confirmed": true,
                "response": response,
            }))
        }
        SafeOp::ExecuteTransaction => {
            let p: TxHashParams = from_params(params)?;
            let safe_address = p.safe_address.as_deref().ok_or_else(|| {
                ChainError::validation("safeAddress is required to execute a transaction")
            })?;
            let safe = parse_address(safe_address)?;
            conn.signer()?;

            let tx_data = service
                .get(&format!("/multisig-transactions/{}/", p.safe_tx_hash))
                .await?;

            // Owners must be in ascending order for on-chain verification
            let mut confirmations: Vec<Value> = tx_data["confirmations"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            confirmations.sort_by_key(|c| {
                c["owner"].as_str().unwrap_or_default().to_lowercase()
            });
            let mut signatures = Vec::new();
            for c in &confirmations {
                signatures.extend(hex_field(&c["signature"])?);
            }

            let call = encode_call(
                EXEC_TX_SIG,
                &[
                    Token::Address(value_to_address(&tx_data["to"])?),
                    Token::Uint(value_to_u256(&tx_data["value"])?),
                    Token::Bytes(hex_field(&tx_data["data"])?),
                    Token::Uint(value_to_u256(&tx_data["operation"])?),
                    Token::Uint(value_to_u256(&tx_data["safeTxGas"])?),
                    Token::Uint(value_to_u256(&tx_data["baseGas"])?),
                    Token::Uint(value_to_u256(&tx_data["gasPrice"])?),
                    Token::Address(value_to_address(&tx_data["gasToken"])?),
                    Token::Address(value_to_address(&tx_data["refundReceiver"])?),
                    Token::Bytes(signatures),
                ],
            );
            let tx = TransactionRequest::new().to(safe).data(call);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "transactionHash": format!("{hash:#x}"),
                "blockNumber": receipt.as_ref().and_then(|r| r.block_number).map(|n| n.as_u64()),
                "executed": true,
            }))
        }
        SafeOp::GetBalances => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            let body = service
                .get(&format!("/safes/{}/balances/", p.safe_address))
                .await?;
            Ok(json!({"balances": body}))
        }
        SafeOp::GetCollectibles => {
            let p: SafeParams = from_params(params)?;
            parse_address(&p.safe_address)?;
            let body = service
                .get(&format!("/safes/{}/collectibles/", p.safe_address))
                .await?;
            Ok(json!({"collectibles": body}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn numeric_fields_accept_string_or_number() {
        assert_eq!(value_to_u256(&json!(7)).unwrap(), U256::from(7u64));
        assert_eq!(value_to_u256(&json!("7")).unwrap(), U256::from(7u64));
        assert_eq!(value_to_u256(&Value::Null).unwrap(), U256::zero());
        assert!(value_to_u256(&json!([1])).is_err());
    }

    #[tokio::test]
    async fn propose_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            SafeOp::ProposeTransaction,
            &json!({
                "safeAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "to": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "value": "0.1",
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }
}
