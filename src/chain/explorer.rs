// src/chain/explorer.rs

use reqwest::Client;
use serde_json::Value;

use crate::chain::provider::Connection;
use crate::error::{ChainError, Result};

/// Client for the Basescan REST API. All endpoints share one envelope:
/// `{status, message, result}` where status "0" is an error, except the
/// benign "No transactions found" which just means an empty result.
#[derive(Clone)]
pub struct ExplorerClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        ExplorerClient {
            http: Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let url = conn.explorer_api_url.clone().ok_or_else(|| {
            ChainError::validation("No explorer API available for this network")
        })?;
        Ok(ExplorerClient::new(url, conn.explorer_api_key.clone()))
    }

    /// One GET against the explorer, unwrapping the response envelope.
    pub async fn call(&self, params: &[(&str, String)]) -> Result<Value> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.clone()));
        }

        let body: Value = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .json()
            .await?;

        let status = body["status"].as_str().unwrap_or("1");
        let message = body["message"].as_str().unwrap_or("").to_string();
        if status == "0" && message != "No transactions found" {
            let detail = match &body["result"] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(ChainError::ExplorerApi { message, detail });
        }
        Ok(body["result"].clone())
    }

    pub async fn get_transactions(
        &self,
        address: &str,
        page: u64,
        offset: u64,
        sort: &str,
    ) -> Result<Value> {
        self.call(&[
            ("module", "account".into()),
            ("action", "txlist".into()),
            ("address", address.into()),
            ("startblock", "0".into()),
            ("endblock", "99999999".into()),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
            ("sort", sort.into()),
        ])
        .await
    }

    pub async fn get_token_transfers(
        &self,
        address: &str,
        contract: Option<&str>,
        page: u64,
        offset: u64,
        sort: &str,
    ) -> Result<Value> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "tokentx".to_string()),
            ("address", address.to_string()),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
            ("sort", sort.to_string()),
        ];
        if let Some(c) = contract {
            params.push(("contractaddress", c.to_string()));
        }
        self.call(&params).await
    }

    pub async fn get_nft_transfers(
        &self,
        address: &str,
        contract: Option<&str>,
        page: u64,
        offset: u64,
        sort: &str,
    ) -> Result<Value> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "tokennfttx".to_string()),
            ("address", address.to_string()),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
            ("sort", sort.to_string()),
        ];
        if let Some(c) = contract {
            params.push(("contractaddress", c.to_string()));
        }
        self.call(&params).await
    }

    /// Verified contract ABI. The explorer returns it as a JSON string
    /// inside the envelope; parse it through to a real array.
    pub async fn get_contract_abi(&self, address: &str) -> Result<Value> {
        let raw = self
            .call(&[
                ("module", "contract".into()),
                ("action", "getabi".into()),
                ("address", address.into()),
            ])
            .await?;
        match raw {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|e| ChainError::Rpc(format!("Invalid ABI JSON from explorer: {e}"))),
            other => Ok(other),
        }
    }

    pub async fn get_gas_oracle(&self) -> Result<Value> {
        self.call(&[
            ("module", "gastracker".into()),
            ("action", "gasoracle".into()),
        ])
        .await
    }

    pub async fn get_block_by_timestamp(&self, timestamp: u64, closest: &str) -> Result<Value> {
        self.call(&[
            ("module", "block".into()),
            ("action", "getblocknobytime".into()),
            ("timestamp", timestamp.to_string()),
            ("closest", closest.into()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> ExplorerClient {
        ExplorerClient::new(format!("{}/api", mockito::server_url()), None)
    }

    #[tokio::test]
    async fn unwraps_successful_envelope() {
        let _m = mockito::mock("GET", "/api")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"1","message":"OK","result":[{"hash":"0xabc"}]}"#)
            .create();

        let result = test_client().get_transactions("0xdead", 1, 10, "desc").await.unwrap();
        assert_eq!(result[0]["hash"], "0xabc");
    }

    #[tokio::test]
    async fn error_status_raises() {
        let _m = mockito::mock("GET", "/api")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#)
            .create();

        let err = test_client().get_gas_oracle().await.unwrap_err();
        match err {
            ChainError::ExplorerApi { message, detail } => {
                assert_eq!(message, "NOTOK");
                assert_eq!(detail, "Max rate limit reached");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_transaction_list_is_not_an_error() {
        let _m = mockito::mock("GET", "/api")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"0","message":"No transactions found","result":[]}"#)
            .create();

        let result = test_client().get_transactions("0xdead", 1, 10, "desc").await.unwrap();
        assert_eq!(result, serde_json::json!([]));
    }

    #[tokio::test]
    async fn contract_abi_string_is_parsed() {
        let _m = mockito::mock("GET", "/api")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"1","message":"OK","result":"[{\"type\":\"function\",\"name\":\"transfer\"}]"}"#,
            )
            .create();

        let abi = test_client().get_contract_abi("0xdead").await.unwrap();
        assert_eq!(abi[0]["name"], "transfer");
    }
}
