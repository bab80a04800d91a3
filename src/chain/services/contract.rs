// src/chain/services/contract.rs

use ethers_core::abi::{decode, Abi, ParamType, Token};
use ethers_core::types::{Bytes, TransactionRequest};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{
    coerce_token, coerce_tokens, encode_call, eth_call, find_function, function_signature,
    token_to_json,
};
use crate::chain::explorer::ExplorerClient;
use crate::chain::networks::MULTICALL3_ADDRESS;
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum, checksum_addr, parse_address};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractOp {
    ReadContract,
    WriteContract,
    DeployContract,
    GetContractAbi,
    Multicall,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallParams {
    contract_address: String,
    /// ABI document, either a JSON array or a string containing one.
    contract_abi: Value,
    function_name: String,
    #[serde(default)]
    function_args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployParams {
    contract_abi: Value,
    bytecode: String,
    #[serde(default)]
    constructor_args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbiParams {
    contract_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MulticallParams {
    multicall_calls: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MulticallCall {
    target: String,
    call_data: String,
    #[serde(default = "default_allow_failure")]
    allow_failure: bool,
}

fn default_allow_failure() -> bool {
    true
}

/// Accept either embedded JSON or a string holding JSON, the way the
/// parameters arrive from workflow expressions.
fn json_or_string(v: &Value) -> Result<Value> {
    match v {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| ChainError::validation(format!("Invalid JSON parameter: {e}"))),
        other => Ok(other.clone()),
    }
}

fn parse_abi(v: &Value) -> Result<Abi> {
    let doc = json_or_string(v)?;
    serde_json::from_value(doc).map_err(|e| ChainError::validation(format!("Invalid ABI: {e}")))
}

fn parse_args(v: Option<&Value>) -> Result<Vec<Value>> {
    match v {
        None => Ok(Vec::new()),
        Some(v) => {
            let doc = json_or_string(v)?;
            doc.as_array()
                .cloned()
                .ok_or_else(|| ChainError::validation("function args must be a JSON array"))
        }
    }
}

pub async fn execute(conn: &Connection, op: ContractOp, params: &Value) -> Result<Value> {
    match op {
        ContractOp::ReadContract => {
            let p: CallParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            let abi = parse_abi(&p.contract_abi)?;
            let func = find_function(&abi, &p.function_name)?;
            let tokens = coerce_tokens(func, &parse_args(p.function_args.as_ref())?)?;
            let data = encode_call(&function_signature(func), &tokens);
            let raw = eth_call(&conn.provider, contract, data).await?;

            let output_types: Vec<ParamType> =
                func.outputs.iter().map(|o| o.kind.clone()).collect();
            let result = if output_types.is_empty() {
                Value::Null
            } else {
                let decoded = decode(&output_types, &raw).map_err(|e| {
                    ChainError::Rpc(format!("Failed to decode call result: {e}"))
                })?;
                if decoded.len() == 1 {
                    token_to_json(&decoded[0])
                } else {
                    Value::Array(decoded.iter().map(token_to_json).collect())
                }
            };
            Ok(json!({
                "contractAddress": checksum(&p.contract_address)?,
                "functionName": p.function_name,
                "result": result,
            }))
        }
        ContractOp::WriteContract => {
            let p: CallParams = from_params(params)?;
            let contract = parse_address(&p.contract_address)?;
            conn.signer()?;
            let abi = parse_abi(&p.contract_abi)?;
            let func = find_function(&abi, &p.function_name)?;
            let tokens = coerce_tokens(func, &parse_args(p.function_args.as_ref())?)?;
            let data = encode_call(&function_signature(func), &tokens);
            let tx = TransactionRequest::new().to(contract).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "contractAddress": checksum(&p.contract_address)?,
                "functionName": p.function_name,
                "status": receipt_status(&receipt),
            }))
        }
        ContractOp::DeployContract => {
            let p: DeployParams = from_params(params)?;
            let from = conn.signer_address()?;
            let abi = parse_abi(&p.contract_abi)?;
            let args = parse_args(p.constructor_args.as_ref())?;

            let bytecode_hex = p.bytecode.trim_start_matches("0x");
            let mut data = hex::decode(bytecode_hex)
                .map_err(|_| ChainError::validation("Invalid bytecode hex"))?;

            // Constructor arguments are appended raw after the bytecode
            match &abi.constructor {
                Some(ctor) => {
                    if ctor.inputs.len() != args.len() {
                        return Err(ChainError::validation(format!(
                            "constructor arg count mismatch: expected {}, got {}",
                            ctor.inputs.len(),
                            args.len()
                        )));
                    }
                    let tokens: Result<Vec<Token>> = ctor
                        .inputs
                        .iter()
                        .zip(&args)
                        .map(|(p, v)| coerce_token(&p.kind, v))
                        .collect();
                    data.extend(ethers_core::abi::encode(&tokens?));
                }
                None if !args.is_empty() => {
                    return Err(ChainError::validation(
                        "constructor args given but ABI has no constructor",
                    ));
                }
                None => {}
            }

            let tx = TransactionRequest::new().data(Bytes::from(data));
            let (hash, receipt) = send_tx(conn, tx).await?;
            let deployed = receipt
                .as_ref()
                .and_then(|r| r.contract_address)
                .ok_or_else(|| ChainError::Rpc("Deployment receipt has no contract address".into()))?;
            Ok(json!({
                "contractAddress": checksum_addr(&deployed),
                "from": checksum_addr(&from),
                "hash": format!("{hash:#x}"),
            }))
        }
        ContractOp::GetContractAbi => {
            let p: AbiParams = from_params(params)?;
            parse_address(&p.contract_address)?;
            let explorer = ExplorerClient::from_connection(conn)?;
            let abi = explorer.get_contract_abi(&p.contract_address).await?;
            Ok(json!({
                "contractAddress": checksum(&p.contract_address)?,
                "abi": abi,
                "verified": true,
            }))
        }
        ContractOp::Multicall => {
            let p: MulticallParams = from_params(params)?;
            let calls_doc = json_or_string(&p.multicall_calls)?;
            let calls: Vec<MulticallCall> = serde_json::from_value(calls_doc.clone())
                .map_err(|e| ChainError::validation(format!("Invalid multicall calls: {e}")))?;
            if calls.is_empty() {
                return Err(ChainError::validation("multicall requires at least one call"));
            }

            let mut call_tokens = Vec::with_capacity(calls.len());
            for call in &calls {
                let target = parse_address(&call.target)?;
                let data = hex::decode(call.call_data.trim_start_matches("0x"))
                    .map_err(|_| ChainError::validation("Invalid callData hex"))?;
                call_tokens.push(Token::Tuple(vec![
                    Token::Address(target),
                    Token::Bool(call.allow_failure),
                    Token::Bytes(data),
                ]));
            }

            let data = encode_call(
                "aggregate3((address,bool,bytes)[])",
                &[Token::Array(call_tokens)],
            );
            let multicall = parse_address(MULTICALL3_ADDRESS)?;
            let raw = eth_call(&conn.provider, multicall, data).await?;

            let result_type = ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ])));
            let decoded = decode(&[result_type], &raw)
                .map_err(|e| ChainError::Rpc(format!("Failed to decode multicall result: {e}")))?;
            let items = match decoded.into_iter().next() {
                Some(Token::Array(items)) => items,
                _ => return Err(ChainError::Rpc("Malformed multicall result".into())),
            };

            let results: Vec<Value> = items
                .iter()
                .zip(calls_doc.as_array().into_iter().flatten())
                .map(|(item, call)| match item {
                    Token::Tuple(fields) if fields.len() == 2 => json!({
                        "call": call,
                        "success": matches!(&fields[0], Token::Bool(true)),
                        "returnData": token_to_json(&fields[1]),
                    }),
                    _ => json!({"call": call, "success": false, "returnData": "0x"}),
                })
                .collect();
            Ok(json!({
                "multicallAddress": MULTICALL3_ADDRESS,
                "count": results.len(),
                "results": results,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const ERC20_ABI: &str = r#"[
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"owner","type":"address"}],
         "outputs":[{"name":"","type":"uint256"}]}
    ]"#;

    #[test]
    fn abi_accepts_string_or_array() {
        assert!(parse_abi(&json!(ERC20_ABI)).is_ok());
        let as_array: Value = serde_json::from_str(ERC20_ABI).unwrap();
        assert!(parse_abi(&as_array).is_ok());
        assert!(parse_abi(&json!("not json")).is_err());
    }

    #[tokio::test]
    async fn write_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            ContractOp::WriteContract,
            &json!({
                "contractAddress": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "contractAbi": ERC20_ABI,
                "functionName": "balanceOf",
                "functionArgs": ["0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"],
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }

    #[tokio::test]
    async fn multicall_rejects_empty_batch() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(&conn, ContractOp::Multicall, &json!({"multicallCalls": []}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at least one call"));
    }
}
