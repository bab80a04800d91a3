// src/chain/eas.rs

use ethers::providers::Middleware;
use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{Address, Bytes, U256};
use serde_json::{json, Value};

use crate::chain::abi::{encode_call, eth_call};
use crate::chain::units::checksum_addr;
use crate::error::{ChainError, Result};

// Ethereum Attestation Service entry points. Requests are structs, so
// the selectors are computed over their tuple encodings.
const ATTEST_SIG: &str = "attest((bytes32,(address,uint64,bool,bytes32,bytes,uint256)))";
const REVOKE_SIG: &str = "revoke((bytes32,(bytes32,uint256)))";
const GET_ATTESTATION_SIG: &str = "getAttestation(bytes32)";
const IS_VALID_SIG: &str = "isAttestationValid(bytes32)";

pub fn parse_bytes32(s: &str) -> Result<[u8; 32]> {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_part)
        .map_err(|_| ChainError::validation(format!("Invalid bytes32 value: {s}")))?;
    bytes
        .try_into()
        .map_err(|_| ChainError::validation(format!("Invalid bytes32 value: {s}")))
}

/// Calldata for `attest`. The attestation payload is the JSON document
/// ABI-encoded as a single string, never expiring and revocable.
pub fn attest_calldata(schema_uid: [u8; 32], recipient: Address, data: &Value) -> Bytes {
    let encoded_data = encode(&[Token::String(data.to_string())]);
    let request = Token::Tuple(vec![
        Token::FixedBytes(schema_uid.to_vec()),
        Token::Tuple(vec![
            Token::Address(recipient),
            Token::Uint(U256::zero()),
            Token::Bool(true),
            Token::FixedBytes(vec![0u8; 32]),
            Token::Bytes(encoded_data),
            Token::Uint(U256::zero()),
        ]),
    ]);
    encode_call(ATTEST_SIG, &[request])
}

/// Calldata for `revoke` of one attestation under its schema.
pub fn revoke_calldata(schema_uid: [u8; 32], uid: [u8; 32]) -> Bytes {
    let request = Token::Tuple(vec![
        Token::FixedBytes(schema_uid.to_vec()),
        Token::Tuple(vec![
            Token::FixedBytes(uid.to_vec()),
            Token::Uint(U256::zero()),
        ]),
    ]);
    encode_call(REVOKE_SIG, &[request])
}

fn attestation_param_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::FixedBytes(32), // uid
        ParamType::FixedBytes(32), // schema
        ParamType::Uint(64),       // time
        ParamType::Uint(64),       // expirationTime
        ParamType::Uint(64),       // revocationTime
        ParamType::FixedBytes(32), // refUID
        ParamType::Address,        // recipient
        ParamType::Address,        // attester
        ParamType::Bool,           // revocable
        ParamType::Bytes,          // data
    ])
}

/// Fetch and decode one attestation record by UID.
pub async fn get_attestation<M: Middleware>(
    provider: &M,
    eas: Address,
    uid: [u8; 32],
) -> Result<Value> {
    let data = encode_call(GET_ATTESTATION_SIG, &[Token::FixedBytes(uid.to_vec())]);
    let raw = eth_call(provider, eas, data).await?;
    let tokens = decode(&[attestation_param_type()], &raw)
        .map_err(|e| ChainError::Rpc(format!("Failed to decode attestation: {e}")))?;

    let fields = match tokens.into_iter().next() {
        Some(Token::Tuple(fields)) if fields.len() == 10 => fields,
        _ => return Err(ChainError::Rpc("Malformed attestation record".into())),
    };

    let bytes32_hex = |t: &Token| match t {
        Token::FixedBytes(b) => format!("0x{}", hex::encode(b)),
        _ => String::new(),
    };
    let uint_str = |t: &Token| match t {
        Token::Uint(n) => n.to_string(),
        _ => "0".to_string(),
    };
    let addr_str = |t: &Token| match t {
        Token::Address(a) => checksum_addr(a),
        _ => String::new(),
    };

    Ok(json!({
        "uid": bytes32_hex(&fields[0]),
        "schema": bytes32_hex(&fields[1]),
        "time": uint_str(&fields[2]),
        "expirationTime": uint_str(&fields[3]),
        "revocationTime": uint_str(&fields[4]),
        "refUID": bytes32_hex(&fields[5]),
        "recipient": addr_str(&fields[6]),
        "attester": addr_str(&fields[7]),
        "revocable": matches!(&fields[8], Token::Bool(true)),
        "data": match &fields[9] {
            Token::Bytes(b) => format!("0x{}", hex::encode(b)),
            _ => String::new(),
        },
    }))
}

/// Schema hash of an existing attestation, needed to revoke it.
pub async fn attestation_schema<M: Middleware>(
    provider: &M,
    eas: Address,
    uid: [u8; 32],
) -> Result<[u8; 32]> {
    let record = get_attestation(provider, eas, uid).await?;
    parse_bytes32(record["schema"].as_str().unwrap_or_default())
}

pub async fn is_attestation_valid<M: Middleware>(
    provider: &M,
    eas: Address,
    uid: [u8; 32],
) -> Result<bool> {
    let data = encode_call(IS_VALID_SIG, &[Token::FixedBytes(uid.to_vec())]);
    let raw = eth_call(provider, eas, data).await?;
    let tokens = decode(&[ParamType::Bool], &raw)
        .map_err(|e| ChainError::Rpc(format!("Failed to decode validity flag: {e}")))?;
    Ok(matches!(tokens.first(), Some(Token::Bool(true))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::abi::selector;

    #[test]
    fn parses_bytes32() {
        let uid = parse_bytes32(&format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(uid[0], 0xab);
        assert!(parse_bytes32("0x1234").is_err());
    }

    #[test]
    fn attest_calldata_uses_struct_selector() {
        let data = attest_calldata([0u8; 32], Address::zero(), &json!({"k": "v"}));
        assert_eq!(&data[0..4], &selector(ATTEST_SIG));
    }

    #[test]
    fn revoke_calldata_layout() {
        let data = revoke_calldata([1u8; 32], [2u8; 32]);
        assert_eq!(&data[0..4], &selector(REVOKE_SIG));
        // schema + (uid, value) are all static, encoded in place
        assert_eq!(data.len(), 4 + 32 * 3);
    }
}
