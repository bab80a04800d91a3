// src/chain/abi.rs

use std::str::FromStr;

use ethers::providers::Middleware;
use ethers_core::abi::{decode, encode, Abi, Function, ParamType, Token};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, TransactionRequest, U256};
use ethers_core::utils::keccak256;
use serde_json::{json, Value};

use crate::error::{ChainError, Result};

pub fn selector(sig: &str) -> [u8; 4] {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(sig.as_bytes())[0..4]);
    sel
}

/// Calldata for `sig` with the given arguments: 4-byte selector
/// followed by the ABI-encoded tokens.
pub fn encode_call(sig: &str, tokens: &[Token]) -> Bytes {
    let mut out = selector(sig).to_vec();
    let mut tail = encode(tokens);
    out.append(&mut tail);
    Bytes::from(out)
}

/// One read-only `eth_call` against `to`.
pub async fn eth_call<M: Middleware>(provider: &M, to: Address, data: Bytes) -> Result<Bytes> {
    let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
    provider
        .call(&tx, None)
        .await
        .map_err(|e| ChainError::Rpc(format!("eth_call failed: {e}")))
}

pub fn decode_string(raw: &[u8]) -> Option<String> {
    if let Ok(tokens) = decode(&[ParamType::String], raw) {
        if let Some(Token::String(s)) = tokens.first() {
            return Some(s.clone());
        }
    }
    // Some older tokens return name/symbol as bytes32
    if let Ok(tokens) = decode(&[ParamType::FixedBytes(32)], raw) {
        if let Some(Token::FixedBytes(b)) = tokens.first() {
            let trimmed: Vec<u8> = b.iter().copied().take_while(|c| *c != 0).collect();
            return String::from_utf8(trimmed).ok();
        }
    }
    None
}

pub fn decode_u256(raw: &[u8]) -> Option<U256> {
    match decode(&[ParamType::Uint(256)], raw).ok()?.first() {
        Some(Token::Uint(n)) => Some(*n),
        _ => None,
    }
}

pub fn decode_address(raw: &[u8]) -> Option<Address> {
    match decode(&[ParamType::Address], raw).ok()?.first() {
        Some(Token::Address(a)) => Some(*a),
        _ => None,
    }
}

/// Parse a Solidity type name into a `ParamType`. Handles elementary
/// types, `T[]`, `T[n]` and `(a,b,...)` tuples.
pub fn parse_param_type(s: &str) -> Result<ParamType> {
    let s = s.trim();

    if let Some(base) = s.strip_suffix("[]") {
        return Ok(ParamType::Array(Box::new(parse_param_type(base)?)));
    }
    if s.ends_with(']') {
        let open = s
            .rfind('[')
            .ok_or_else(|| ChainError::validation(format!("Invalid ABI type: {s}")))?;
        let n: usize = s[open + 1..s.len() - 1]
            .parse()
            .map_err(|_| ChainError::validation(format!("Invalid ABI type: {s}")))?;
        return Ok(ParamType::FixedArray(Box::new(parse_param_type(&s[..open])?), n));
    }
    if s.starts_with('(') && s.ends_with(')') {
        let inner = &s[1..s.len() - 1];
        let mut components = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in inner.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                ',' if depth == 0 => {
                    components.push(parse_param_type(&inner[start..i])?);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if !inner.is_empty() {
            components.push(parse_param_type(&inner[start..])?);
        }
        return Ok(ParamType::Tuple(components));
    }

    match s {
        "address" => Ok(ParamType::Address),
        "bool" => Ok(ParamType::Bool),
        "string" => Ok(ParamType::String),
        "bytes" => Ok(ParamType::Bytes),
        "uint" => Ok(ParamType::Uint(256)),
        "int" => Ok(ParamType::Int(256)),
        _ => {
            if let Some(n) = s.strip_prefix("uint") {
                let bits: usize = n
                    .parse()
                    .map_err(|_| ChainError::validation(format!("Invalid ABI type: {s}")))?;
                Ok(ParamType::Uint(bits))
            } else if let Some(n) = s.strip_prefix("int") {
                let bits: usize = n
                    .parse()
                    .map_err(|_| ChainError::validation(format!("Invalid ABI type: {s}")))?;
                Ok(ParamType::Int(bits))
            } else if let Some(n) = s.strip_prefix("bytes") {
                let len: usize = n
                    .parse()
                    .map_err(|_| ChainError::validation(format!("Invalid ABI type: {s}")))?;
                Ok(ParamType::FixedBytes(len))
            } else {
                Err(ChainError::validation(format!("Invalid ABI type: {s}")))
            }
        }
    }
}

pub fn parse_u256(s: &str) -> Result<U256> {
    let parsed = if let Some(hex_part) = s.strip_prefix("0x") {
        U256::from_str_radix(hex_part, 16).ok()
    } else {
        U256::from_dec_str(s).ok()
    };
    parsed.ok_or_else(|| ChainError::validation(format!("Invalid numeric value: {s}")))
}

/// Coerce one JSON argument into an ABI token of the expected type.
pub fn coerce_token(ty: &ParamType, val: &Value) -> Result<Token> {
    let tok = match ty {
        ParamType::Address => {
            let s = val
                .as_str()
                .ok_or_else(|| ChainError::validation("address arg must be a string"))?;
            Token::Address(
                Address::from_str(s)
                    .map_err(|_| ChainError::validation(format!("Invalid address: {s}")))?,
            )
        }
        ParamType::Uint(_) => match val {
            Value::String(s) => Token::Uint(parse_u256(s)?),
            Value::Number(n) => Token::Uint(U256::from(
                n.as_u64()
                    .ok_or_else(|| ChainError::validation("uint arg out of range"))?,
            )),
            _ => return Err(ChainError::validation("uint arg must be a string or number")),
        },
        ParamType::Int(_) => match val {
            Value::String(s) => Token::Int(parse_u256(s)?),
            Value::Number(n) => Token::Int(U256::from(
                n.as_u64()
                    .ok_or_else(|| ChainError::validation("int arg out of range"))?,
            )),
            _ => return Err(ChainError::validation("int arg must be a string or number")),
        },
        ParamType::Bool => Token::Bool(
            val.as_bool()
                .ok_or_else(|| ChainError::validation("bool arg must be a boolean"))?,
        ),
        ParamType::String => Token::String(val.as_str().unwrap_or_default().to_string()),
        ParamType::Bytes => Token::Bytes(json_to_bytes(val)?),
        ParamType::FixedBytes(len) => {
            let bytes = json_to_bytes(val)?;
            if bytes.len() != *len {
                return Err(ChainError::validation(format!(
                    "expected {len} bytes, got {}",
                    bytes.len()
                )));
            }
            Token::FixedBytes(bytes)
        }
        ParamType::Array(inner) => {
            let items = val
                .as_array()
                .ok_or_else(|| ChainError::validation("array arg must be an array"))?;
            let tokens: Result<Vec<Token>> =
                items.iter().map(|v| coerce_token(inner, v)).collect();
            Token::Array(tokens?)
        }
        ParamType::FixedArray(inner, n) => {
            let items = val
                .as_array()
                .ok_or_else(|| ChainError::validation("array arg must be an array"))?;
            if items.len() != *n {
                return Err(ChainError::validation(format!(
                    "expected {n} elements, got {}",
                    items.len()
                )));
            }
            let tokens: Result<Vec<Token>> =
                items.iter().map(|v| coerce_token(inner, v)).collect();
            Token::FixedArray(tokens?)
        }
        ParamType::Tuple(components) => {
            let items = val
                .as_array()
                .ok_or_else(|| ChainError::validation("tuple arg must be an array"))?;
            if items.len() != components.len() {
                return Err(ChainError::validation(format!(
                    "expected {} tuple elements, got {}",
                    components.len(),
                    items.len()
                )));
            }
            let tokens: Result<Vec<Token>> = components
                .iter()
                .zip(items)
                .map(|(t, v)| coerce_token(t, v))
                .collect();
            Token::Tuple(tokens?)
        }
    };
    Ok(tok)
}

fn json_to_bytes(val: &Value) -> Result<Vec<u8>> {
    let s = val
        .as_str()
        .ok_or_else(|| ChainError::validation("bytes arg must be a string"))?;
    if let Some(hex_part) = s.strip_prefix("0x") {
        hex::decode(hex_part)
            .map_err(|_| ChainError::validation(format!("Invalid hex string: {s}")))
    } else {
        Ok(s.as_bytes().to_vec())
    }
}

pub fn coerce_tokens(func: &Function, args: &[Value]) -> Result<Vec<Token>> {
    if func.inputs.len() != args.len() {
        return Err(ChainError::validation(format!(
            "arg count mismatch: expected {}, got {}",
            func.inputs.len(),
            args.len()
        )));
    }
    func.inputs
        .iter()
        .zip(args)
        .map(|(p, v)| coerce_token(&p.kind, v))
        .collect()
}

/// Turn a decoded token back into JSON for the response payload.
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(a) => json!(format!("{a:#x}")),
        Token::Uint(n) | Token::Int(n) => json!(n.to_string()),
        Token::Bool(b) => json!(b),
        Token::String(s) => json!(s),
        Token::Bytes(b) | Token::FixedBytes(b) => json!(format!("0x{}", hex::encode(b))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

pub fn find_function<'a>(abi: &'a Abi, name: &str) -> Result<&'a Function> {
    abi.functions()
        .find(|f| f.name == name)
        .ok_or_else(|| ChainError::validation(format!("Function {name} not found in ABI")))
}

pub fn function_signature(func: &Function) -> String {
    let types: Vec<String> = func
        .inputs
        .iter()
        .map(|p| param_type_to_string(&p.kind))
        .collect();
    format!("{}({})", func.name, types.join(","))
}

pub fn param_type_to_string(p: &ParamType) -> String {
    match p {
        ParamType::Address => "address".to_string(),
        ParamType::Bytes => "bytes".to_string(),
        ParamType::FixedBytes(n) => format!("bytes{n}"),
        ParamType::Int(n) => format!("int{n}"),
        ParamType::Uint(n) => format!("uint{n}"),
        ParamType::Bool => "bool".to_string(),
        ParamType::String => "string".to_string(),
        ParamType::Array(inner) => format!("{}[]", param_type_to_string(inner)),
        ParamType::FixedArray(inner, n) => format!("{}[{}]", param_type_to_string(inner), n),
        ParamType::Tuple(components) => {
            let inner: Vec<String> = components.iter().map(param_type_to_string).collect();
            format!("({})", inner.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn parses_elementary_types() {
        assert_eq!(parse_param_type("address").unwrap(), ParamType::Address);
        assert_eq!(parse_param_type("uint256").unwrap(), ParamType::Uint(256));
        assert_eq!(parse_param_type("uint").unwrap(), ParamType::Uint(256));
        assert_eq!(parse_param_type("bytes32").unwrap(), ParamType::FixedBytes(32));
        assert!(parse_param_type("uint257x").is_err());
    }

    #[test]
    fn parses_compound_types() {
        assert_eq!(
            parse_param_type("uint256[]").unwrap(),
            ParamType::Array(Box::new(ParamType::Uint(256)))
        );
        assert_eq!(
            parse_param_type("bytes32[4]").unwrap(),
            ParamType::FixedArray(Box::new(ParamType::FixedBytes(32)), 4)
        );
        assert_eq!(
            parse_param_type("(address,uint256)").unwrap(),
            ParamType::Tuple(vec![ParamType::Address, ParamType::Uint(256)])
        );
    }

    #[test]
    fn coerces_and_round_trips_tokens() {
        let ty = parse_param_type("uint256").unwrap();
        let tok = coerce_token(&ty, &json!("1000")).unwrap();
        assert_eq!(tok, Token::Uint(U256::from(1000u64)));
        assert_eq!(token_to_json(&tok), json!("1000"));

        let ty = parse_param_type("address[]").unwrap();
        let tok = coerce_token(
            &ty,
            &json!(["0x833589fcd6edb6e08f4c7c32d4f71b54bda02913"]),
        )
        .unwrap();
        assert!(matches!(tok, Token::Array(_)));
    }

    #[test]
    fn hex_and_decimal_uints() {
        assert_eq!(parse_u256("0x10").unwrap(), U256::from(16u64));
        assert_eq!(parse_u256("16").unwrap(), U256::from(16u64));
        assert!(parse_u256("zzz").is_err());
    }

    #[test]
    fn encode_call_layout() {
        let data = encode_call(
            "transfer(address,uint256)",
            &[
                Token::Address(Address::zero()),
                Token::Uint(U256::from(1u64)),
            ],
        );
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[0..4], &selector("transfer(address,uint256)"));
    }
}
