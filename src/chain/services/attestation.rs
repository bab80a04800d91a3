// src/chain/services/attestation.rs

use ethers_core::types::TransactionRequest;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::eas;
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::parse_address;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttestationOp {
    CreateAttestation,
    GetAttestation,
    VerifyAttestation,
    RevokeAttestation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    schema_uid: String,
    recipient: String,
    /// Attestation payload, a JSON document or a string containing one.
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct UidParams {
    uid: String,
}

pub async fn execute(conn: &Connection, op: AttestationOp, params: &Value) -> Result<Value> {
    let eas_address = parse_address(conn.network.contracts().eas)?;
    match op {
        AttestationOp::CreateAttestation => {
            let p: CreateParams = from_params(params)?;
            conn.signer()?;
            let schema = eas::parse_bytes32(&p.schema_uid)?;
            let recipient = parse_address(&p.recipient)?;
            let payload = match &p.data {
                Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| p.data.clone()),
                other => other.clone(),
            };
            let data = eas::attest_calldata(schema, recipient, &payload);
            let tx = TransactionRequest::new().to(eas_address).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "hash": format!("{hash:#x}"),
                "status": receipt_status(&receipt),
            }))
        }
        AttestationOp::GetAttestation => {
            let p: UidParams = from_params(params)?;
            let uid = eas::parse_bytes32(&p.uid)?;
            eas::get_attestation(&conn.provider, eas_address, uid).await
        }
        AttestationOp::VerifyAttestation => {
            let p: UidParams = from_params(params)?;
            let uid = eas::parse_bytes32(&p.uid)?;
            let valid = eas::is_attestation_valid(&conn.provider, eas_address, uid).await?;
            Ok(json!({"uid": p.uid, "valid": valid}))
        }
        AttestationOp::RevokeAttestation => {
            let p: UidParams = from_params(params)?;
            conn.signer()?;
            let uid = eas::parse_bytes32(&p.uid)?;
            // The revocation request carries the schema of the original
            let schema = eas::attestation_schema(&conn.provider, eas_address, uid).await?;
            let data = eas::revoke_calldata(schema, uid);
            let tx = TransactionRequest::new().to(eas_address).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "uid": p.uid,
                "hash": format!("{hash:#x}"),
                "status": receipt_status(&receipt),
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
    async fn create_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            AttestationOp::CreateAttestation,
            &json!({
                "schemaUid": format!("0x{}", "00".repeat(32)),
                "recipient": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "data": {"score": 1},
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_uid() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(&conn, AttestationOp::GetAttestation, &json!({"uid": "0x123"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bytes32"));
    }
}
