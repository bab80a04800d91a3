// src/chain/services/basename.rs

use ethers::providers::Middleware;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::chain::units::{checksum_addr, parse_address};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BasenameOp {
    ResolveName,
    LookupAddress,
    CheckAvailability,
}

#[derive(Debug, Deserialize)]
struct NameParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AddressParams {
    address: String,
}

/// Basenames resolve through ENS-compatible records under `.base`.
fn qualify(name: &str) -> String {
    if name.ends_with(".base") {
        name.to_string()
    } else {
        format!("{name}.base")
    }
}

pub async fn execute(conn: &Connection, op: BasenameOp, params: &Value) -> Result<Value> {
    match op {
        BasenameOp::ResolveName => {
            let p: NameParams = from_params(params)?;
            // Resolution failures mean "no record", not an operation error
            match conn.provider.resolve_name(&qualify(&p.name)).await {
                Ok(address) => Ok(json!({
                    "name": p.name,
                    "address": checksum_addr(&address),
                    "resolved": true,
                })),
                Err(_) => Ok(json!({
                    "name": p.name,
                    "address": Value::Null,
                    "resolved": false,
                })),
            }
        }
        BasenameOp::LookupAddress => {
            let p: AddressParams = from_params(params)?;
            let addr = parse_address(&p.address)?;
            match conn.provider.lookup_address(addr).await {
                Ok(name) => Ok(json!({
                    "address": p.address,
                    "name": name,
                    "found": true,
                })),
                Err(_) => Ok(json!({
                    "address": p.address,
                    "name": Value::Null,
                    "found": false,
                })),
            }
        }
        BasenameOp::CheckAvailability => {
            let p: NameParams = from_params(params)?;
            let taken = conn.provider.resolve_name(&qualify(&p.name)).await.is_ok();
            Ok(json!({"name": p.name, "available": !taken}))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_suffix_is_appended_once() {
        assert_eq!(qualify("alice"), "alice.base");
        assert_eq!(qualify("alice.base"), "alice.base");
    }
}
