// src/chain/services/utility.rs
//
// Stateless helpers around ABI coding, message signatures, units and
// key material. Only signMessage touches the configured signer.

use std::str::FromStr;

use ethers::signers::{LocalWallet, Signer};
use ethers_core::abi::{decode, encode_packed};
use ethers_core::types::{Bytes, Signature};
use ethers_core::utils::{hash_message, keccak256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::{
    coerce_token, coerce_tokens, encode_call, find_function, function_signature, parse_param_type,
    selector, token_to_json,
};
use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::chain::units::{checksum, checksum_addr, convert, Unit};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UtilityOp {
    EncodeAbi,
    DecodeAbi,
    HashMessage,
    SignMessage,
    VerifySignature,
    ConvertUnits,
    ChecksumAddress,
    GenerateWallet,
    ComputeAddress,
    EncodePacked,
}

fn default_args() -> String {
    "[]".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodeAbiParams {
    abi: String,
    function_name: String,
    #[serde(default = "default_args")]
    args: String,
}

#[derive(Debug, Deserialize)]
struct DecodeAbiParams {
    abi: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyParams {
    message: String,
    signature: String,
    expected_signer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertParams {
    value: String,
    from_unit: String,
    to_unit: String,
}

#[derive(Debug, Deserialize)]
struct AddressParams {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateKeyParams {
    private_key: String,
}

#[derive(Debug, Deserialize)]
struct EncodePackedParams {
    types: String,
    values: String,
}

fn parse_abi(raw: &str) -> Result<ethers_core::abi::Abi> {
    serde_json::from_str(raw).map_err(|e| ChainError::validation(format!("Invalid ABI JSON: {e}")))
}

fn parse_json_array(raw: &str, what: &str) -> Result<Vec<Value>> {
    let v: Value = serde_json::from_str(raw)
        .map_err(|e| ChainError::validation(format!("Invalid {what} JSON: {e}")))?;
    v.as_array()
        .cloned()
        .ok_or_else(|| ChainError::validation(format!("Expected a JSON array of {what}")))
}

fn parse_hex(s: &str, what: &str) -> Result<Bytes> {
    Bytes::from_str(s).map_err(|_| ChainError::validation(format!("Invalid {what} hex: {s}")))
}

fn public_key_hex(wallet: &LocalWallet) -> String {
    let point = wallet.signer().verifying_key().to_encoded_point(false);
    format!("0x{}", hex::encode(point.as_bytes()))
}

pub async fn execute(conn: &Connection, op: UtilityOp, params: &Value) -> Result<Value> {
    match op {
        UtilityOp::EncodeAbi => {
            let p: EncodeAbiParams = from_params(params)?;
            let abi = parse_abi(&p.abi)?;
            let func = find_function(&abi, &p.function_name)?;
            let args = parse_json_array(&p.args, "arguments")?;
            let tokens = coerce_tokens(func, &args)?;
            let calldata = encode_call(&function_signature(func), &tokens);
            Ok(json!({
                "encoded": format!("{calldata}"),
                "functionName": p.function_name,
                "args": args,
            }))
        }
        UtilityOp::DecodeAbi => {
            let p: DecodeAbiParams = from_params(params)?;
            let abi = parse_abi(&p.abi)?;
            let data = parse_hex(&p.data, "calldata")?;
            if data.len() < 4 {
                return Err(ChainError::validation(
                    "Calldata is shorter than a function selector".to_string(),
                ));
            }
            let func = abi
                .functions()
                .find(|f| selector(&function_signature(f)) == data[0..4])
                .ok_or_else(|| {
                    ChainError::validation("No ABI function matches the calldata selector".to_string())
                })?;
            let param_types: Vec<_> = func.inputs.iter().map(|p| p.kind.clone()).collect();
            let tokens = decode(&param_types, &data[4..])
                .map_err(|e| ChainError::validation(format!("Failed to decode arguments: {e}")))?;
            Ok(json!({
                "functionName": func.name,
                "args": tokens.iter().map(token_to_json).collect::<Vec<_>>(),
                "signature": function_signature(func),
            }))
        }
        UtilityOp::HashMessage => {
            let p: MessageParams = from_params(params)?;
            Ok(json!({
                "message": p.message,
                "keccak256": format!("0x{}", hex::encode(keccak256(p.message.as_bytes()))),
                "hashMessage": format!("{:#x}", hash_message(&p.message)),
            }))
        }
        UtilityOp::SignMessage => {
            let p: MessageParams = from_params(params)?;
            let client = conn.signer()?;
            let signature = client
                .signer()
                .sign_message(&p.message)
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to sign message: {e}")))?;
            Ok(json!({
                "message": p.message,
                "signature": format!("0x{signature}"),
                "signer": checksum_addr(&client.signer().address()),
            }))
        }
        UtilityOp::VerifySignature => {
            let p: VerifyParams = from_params(params)?;
            let signature = Signature::from_str(&p.signature)
                .map_err(|_| ChainError::validation(format!("Invalid signature: {}", p.signature)))?;
            let recovered = signature
                .recover(p.message.as_str())
                .map_err(|e| ChainError::validation(format!("Failed to recover signer: {e}")))?;
            let is_valid = format!("{recovered:#x}") == p.expected_signer.to_lowercase();
            Ok(json!({
                "message": p.message,
                "signature": p.signature,
                "expectedSigner": p.expected_signer,
                "recoveredAddress": checksum_addr(&recovered),
                "isValid": is_valid,
            }))
        }
        UtilityOp::ConvertUnits => {
            let p: ConvertParams = from_params(params)?;
            let from = Unit::parse(&p.from_unit)?;
            let to = Unit::parse(&p.to_unit)?;
            Ok(json!({
                "value": p.value,
                "fromUnit": p.from_unit,
                "toUnit": p.to_unit,
                "converted": convert(&p.value, from, to)?,
            }))
        }
        UtilityOp::ChecksumAddress => {
            let p: AddressParams = from_params(params)?;
            Ok(json!({
                "input": p.address,
                "checksummed": checksum(&p.address)?,
            }))
        }
        UtilityOp::GenerateWallet => {
            let wallet = LocalWallet::new(&mut rand::thread_rng());
            Ok(json!({
                "address": checksum_addr(&wallet.address()),
                "privateKey": format!("0x{}", hex::encode(wallet.signer().to_bytes())),
                "publicKey": public_key_hex(&wallet),
                "warning": "Store private key securely!",
            }))
        }
        UtilityOp::ComputeAddress => {
            let p: PrivateKeyParams = from_params(params)?;
            let wallet = LocalWallet::from_str(p.private_key.trim_start_matches("0x"))
                .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
            Ok(json!({
                "address": checksum_addr(&wallet.address()),
                "publicKey": public_key_hex(&wallet),
            }))
        }
        UtilityOp::EncodePacked => {
            let p: EncodePackedParams = from_params(params)?;
            let types = parse_json_array(&p.types, "types")?;
            let values = parse_json_array(&p.values, "values")?;
            if types.len() != values.len() {
                return Err(ChainError::validation(format!(
                    "Got {} types but {} values",
                    types.len(),
                    values.len()
                )));
            }
            let mut tokens = Vec::with_capacity(types.len());
            for (ty, val) in types.iter().zip(&values) {
                let name = ty
                    .as_str()
                    .ok_or_else(|| ChainError::validation("Types must be strings".to_string()))?;
                tokens.push(coerce_token(&parse_param_type(name)?, val)?);
            }
            let packed = encode_packed(&tokens)
                .map_err(|e| ChainError::validation(format!("Cannot pack these types: {e}")))?;
            Ok(json!({
                "types": types,
                "values": values,
                "encoded": format!("0x{}", hex::encode(&packed)),
                "keccak256": format!("0x{}", hex::encode(keccak256(&packed))),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const ERC20_ABI: &str = r#"[{"name":"transfer","type":"function","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}]"#;

    #[tokio::test]
    async fn encode_then_decode_transfer() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let encoded = execute(
            &conn,
            UtilityOp::EncodeAbi,
            &json!({
                "abi": ERC20_ABI,
                "functionName": "transfer",
                "args": r#"["0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", "1000"]"#,
            }),
        )
        .await
        .unwrap();
        let calldata = encoded["encoded"].as_str().unwrap();
        assert!(calldata.starts_with("0xa9059cbb"));

        let decoded = execute(
            &conn,
            UtilityOp::DecodeAbi,
            &json!({"abi": ERC20_ABI, "data": calldata}),
        )
        .await
        .unwrap();
        assert_eq!(decoded["functionName"], "transfer");
        assert_eq!(decoded["signature"], "transfer(address,uint256)");
        assert_eq!(decoded["args"][1], "1000");
    }

    #[tokio::test]
    async fn convert_units_matches_reference_values() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let out = execute(
            &conn,
            UtilityOp::ConvertUnits,
            &json!({"value": "1000000000000000000", "fromUnit": "wei", "toUnit": "ether"}),
        )
        .await
        .unwrap();
        assert_eq!(out["converted"], "1.0");

        let out = execute(
            &conn,
            UtilityOp::ConvertUnits,
            &json!({"value": "0.5", "fromUnit": "ether", "toUnit": "wei"}),
        )
        .await
        .unwrap();
        assert_eq!(out["converted"], "500000000000000000");
    }

    #[tokio::test]
    async fn sign_without_key_is_permission_error() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(&conn, UtilityOp::SignMessage, &json!({"message": "hello"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }

    #[tokio::test]
    async fn sign_and_verify_round_trip() {
        let mut config = Config::default();
        config.private_key =
            Some("0x0000000000000000000000000000000000000000000000000000000000000001".to_string());
        let conn = Connection::connect(&config).unwrap();
        let signed = execute(&conn, UtilityOp::SignMessage, &json!({"message": "hello"}))
            .await
            .unwrap();
        let verified = execute(
            &conn,
            UtilityOp::VerifySignature,
            &json!({
                "message": "hello",
                "signature": signed["signature"],
                "expectedSigner": signed["signer"],
            }),
        )
        .await
        .unwrap();
        assert_eq!(verified["isValid"], true);
    }

    #[tokio::test]
    async fn packed_encoding_hashes_concatenated_bytes() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let out = execute(
            &conn,
            UtilityOp::EncodePacked,
            &json!({"types": r#"["string", "string"]"#, "values": r#"["ab", "cd"]"#}),
        )
        .await
        .unwrap();
        assert_eq!(out["encoded"], "0x61626364");
    }

    #[tokio::test]
    async fn compute_address_from_well_known_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let out = execute(
            &conn,
            UtilityOp::ComputeAddress,
            &json!({"privateKey": "0x0000000000000000000000000000000000000000000000000000000000000001"}),
        )
        .await
        .unwrap();
        assert_eq!(
            out["address"],
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }
}
