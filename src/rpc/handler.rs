// src/rpc/handler.rs
//
// JSON-RPC surface. `execute` carries a (resource, operation) pair
// plus either one parameter object or an array of them; array inputs
// are processed item by item, and with continueOnFail set a failing
// item becomes an `{error}` slot instead of aborting the batch.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::chain::networks::Network;
use crate::chain::provider::Connection;
use crate::chain::services;
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::rpc::protocol::{error_codes, Request, Response};
use crate::trigger::{self, BlockWatcher, TriggerConfig};
use crate::AppState;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Account,
    Transaction,
    Token,
    Nft,
    Contract,
    Bridge,
    Block,
    Events,
    Attestation,
    Basename,
    CoinbaseWallet,
    Dex,
    Farcaster,
    Safe,
    Fee,
    Utility,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteParams {
    resource: Resource,
    operation: Value,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    continue_on_fail: bool,
    #[serde(default)]
    credentials: Option<CredentialOverrides>,
}

/// Per-request overrides for the server's configured credentials,
/// mirroring the fields a caller would otherwise set via environment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialOverrides {
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    rpc_url: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    basescan_api_key: Option<String>,
    #[serde(default)]
    neynar_api_key: Option<String>,
}

fn apply_overrides(base: &Config, overrides: &Option<CredentialOverrides>) -> Result<Config> {
    let mut config = base.clone();
    if let Some(o) = overrides {
        if let Some(network) = &o.network {
            config.network = Network::parse(network)?;
        }
        if o.rpc_url.is_some() {
            config.rpc_url = o.rpc_url.clone();
        }
        if o.chain_id.is_some() {
            config.chain_id = o.chain_id;
        }
        if o.private_key.is_some() {
            config.private_key = o.private_key.clone();
        }
        if o.basescan_api_key.is_some() {
            config.basescan_api_key = o.basescan_api_key.clone();
        }
        if o.neynar_api_key.is_some() {
            config.neynar_api_key = o.neynar_api_key.clone();
        }
    }
    Ok(config)
}

fn parse_op<T: serde::de::DeserializeOwned>(op: &Value) -> Result<T> {
    serde_json::from_value(op.clone())
        .map_err(|_| ChainError::validation(format!("Unknown operation: {op}")))
}

async fn dispatch(
    conn: &Connection,
    resource: Resource,
    operation: &Value,
    params: &Value,
) -> Result<Value> {
    match resource {
        Resource::Account => services::account::execute(conn, parse_op(operation)?, params).await,
        Resource::Transaction => {
            services::transaction::execute(conn, parse_op(operation)?, params).await
        }
        Resource::Token => services::token::execute(conn, parse_op(operation)?, params).await,
        Resource::Nft => services::nft::execute(conn, parse_op(operation)?, params).await,
        Resource::Contract => services::contract::execute(conn, parse_op(operation)?, params).await,
        Resource::Bridge => services::bridge::execute(conn, parse_op(operation)?, params).await,
        Resource::Block => services::block::execute(conn, parse_op(operation)?, params).await,
        Resource::Events => services::events::execute(conn, parse_op(operation)?, params).await,
        Resource::Attestation => {
            services::attestation::execute(conn, parse_op(operation)?, params).await
        }
        Resource::Basename => services::basename::execute(conn, parse_op(operation)?, params).await,
        Resource::CoinbaseWallet => {
            services::coinbase_wallet::execute(conn, parse_op(operation)?, params).await
        }
        Resource::Dex => services::dex::execute(conn, parse_op(operation)?, params).await,
        Resource::Farcaster => {
            services::farcaster::execute(conn, parse_op(operation)?, params).await
        }
        Resource::Safe => services::safe::execute(conn, parse_op(operation)?, params).await,
        Resource::Fee => services::fee::execute(conn, parse_op(operation)?, params).await,
        Resource::Utility => services::utility::execute(conn, parse_op(operation)?, params).await,
    }
}

pub async fn handle_rpc_request(req: Request, state: AppState) -> Option<Response> {
    info!(method = %req.method, "handling request");

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "resources/list" => handle_resources_list(&req),
        "execute" => handle_execute(req, &state).await,
        "trigger/start" => handle_trigger_start(req, &state).await,
        "trigger/stop" => handle_trigger_stop(req, &state).await,
        "trigger/poll" => handle_trigger_poll(req, &state).await,
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

async fn handle_execute(req: Request, state: &AppState) -> Response {
    let params = req.params.unwrap_or(Value::Null);
    let p: ExecuteParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                format!("Invalid execute params: {e}"),
            )
        }
    };

    let config = match apply_overrides(&state.config, &p.credentials) {
        Ok(c) => c,
        Err(e) => return Response::from_chain_error(req.id, &e),
    };
    let conn = match Connection::connect(&config) {
        Ok(c) => c,
        Err(e) => return Response::from_chain_error(req.id, &e),
    };

    match &p.parameters {
        // Batch input: items run sequentially; continueOnFail turns a
        // failing item into an error slot at its position.
        Value::Array(items) => {
            let mut results = Vec::with_capacity(items.len());
            for item in items {
                match dispatch(&conn, p.resource, &p.operation, item).await {
                    Ok(result) => results.push(result),
                    Err(e) if p.continue_on_fail => {
                        warn!(error = %e, "item failed, continuing");
                        results.push(json!({ "error": e.to_string() }));
                    }
                    Err(e) => return Response::from_chain_error(req.id, &e),
                }
            }
            Response::success(req.id, Value::Array(results))
        }
        single => {
            let empty = json!({});
            let item = if single.is_null() { &empty } else { single };
            match dispatch(&conn, p.resource, &p.operation, item).await {
                Ok(result) => Response::success(req.id, result),
                Err(e) => Response::from_chain_error(req.id, &e),
            }
        }
    }
}

async fn handle_trigger_start(req: Request, state: &AppState) -> Response {
    let params = req.params.unwrap_or(Value::Null);
    let config: TriggerConfig = match serde_json::from_value(params) {
        Ok(c) => c,
        Err(e) => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                format!("Invalid trigger params: {e}"),
            )
        }
    };

    let mut slot = state.trigger.lock().await;
    if slot.is_some() {
        return Response::error(
            req.id,
            error_codes::TRIGGER_ERROR,
            "Trigger is already running".to_string(),
        );
    }

    let conn = match Connection::connect(&state.config) {
        Ok(c) => c,
        Err(e) => return Response::from_chain_error(req.id, &e),
    };
    let poll_secs = config
        .poll_interval_secs
        .unwrap_or(state.config.trigger_poll_secs)
        .max(1);
    let watcher = match BlockWatcher::start(Arc::new(conn.provider.clone()), config).await {
        Ok(w) => w,
        Err(e) => return Response::from_chain_error(req.id, &e),
    };
    let cursor = watcher.cursor();
    *slot = Some(trigger::spawn(watcher, Duration::from_secs(poll_secs)));

    Response::success(
        req.id,
        json!({
            "started": true,
            "cursor": cursor,
            "pollIntervalSecs": poll_secs,
        }),
    )
}

async fn handle_trigger_stop(req: Request, state: &AppState) -> Response {
    let mut slot = state.trigger.lock().await;
    match slot.take() {
        Some(task) => {
            task.stop();
            Response::success(req.id, json!({ "stopped": true }))
        }
        None => Response::error(
            req.id,
            error_codes::TRIGGER_ERROR,
            "Trigger is not running".to_string(),
        ),
    }
}

async fn handle_trigger_poll(req: Request, state: &AppState) -> Response {
    let slot = state.trigger.lock().await;
    match slot.as_ref() {
        Some(task) => {
            let events = task.drain().await;
            Response::success(req.id, Value::Array(events))
        }
        None => Response::error(
            req.id,
            error_codes::TRIGGER_ERROR,
            "Trigger is not running".to_string(),
        ),
    }
}

fn handle_initialize(req: &Request) -> Response {
    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": {
                "name": "base-mcp-server",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "protocolVersion": "2025-06-18",
            "capabilities": { "resources": { "listChanged": false } },
            "instructions": "Base blockchain server: account, token, NFT, contract, bridge, attestation, DEX, Safe and Farcaster operations plus a block-polling trigger.",
        }),
    )
}

fn handle_resources_list(req: &Request) -> Response {
    let resources = json!([
        { "name": "account", "operations": ["getBalance", "getTokenBalance", "getTransactions", "getTokenTransfers", "getNftHoldings", "getNonce", "isContract", "getCode"] },
        { "name": "transaction", "operations": ["sendEth", "getTransaction", "getReceipt", "estimateGas", "waitForTransaction"] },
        { "name": "token", "operations": ["getTokenInfo", "getBalance", "transfer", "approve", "getAllowance"] },
        { "name": "nft", "operations": ["getNftInfo", "getTokenUri", "getOwner", "getBalance", "transfer"] },
        { "name": "contract", "operations": ["readContract", "writeContract", "deployContract", "getContractAbi", "multicall"] },
        { "name": "bridge", "operations": ["depositEth", "withdrawEth", "getBridgeContracts", "estimateBridgeGas", "getWithdrawalStatus"] },
        { "name": "block", "operations": ["getBlock", "getLatestBlock", "getBlockNumber", "getBlockByTime"] },
        { "name": "events", "operations": ["getLogs", "getTransferEvents"] },
        { "name": "attestation", "operations": ["createAttestation", "getAttestation", "verifyAttestation", "revokeAttestation"] },
        { "name": "basename", "operations": ["resolveName", "lookupAddress", "checkAvailability"] },
        { "name": "coinbaseWallet", "operations": ["getWalletInfo", "predictAddress"] },
        { "name": "dex", "operations": ["getSwapQuote", "getPoolInfo", "getTokenPrice", "executeSwap"] },
        { "name": "farcaster", "operations": ["getCast", "getUser", "getUserByUsername", "validateFrameMessage", "getCastsByFid", "getChannel", "getFollowers", "getFollowing"] },
        { "name": "safe", "operations": ["getSafeInfo", "getOwners", "getPendingTransactions", "getTransactionHistory", "proposeTransaction", "getTransaction", "confirmTransaction", "executeTransaction", "getBalances", "getCollectibles"] },
        { "name": "fee", "operations": ["getGasPrice", "getFeeData", "estimateGas", "getL1DataFee", "getBaseFee", "calculateTotalFee", "getGasOracle"] },
        { "name": "utility", "operations": ["encodeAbi", "decodeAbi", "hashMessage", "signMessage", "verifySignature", "convertUnits", "checksumAddress", "generateWallet", "computeAddress", "encodePacked"] },
    ]);
    Response::success(req.id.clone(), json!({ "resources": resources }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState::new(Config::default())
    }

    fn request(method: &str, params: Value) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            id: json!(1),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let resp = handle_rpc_request(request("initialize", json!({})), test_state())
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "base-mcp-server");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let resp = handle_rpc_request(request("no/such/method", json!({})), test_state())
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let req = Request {
            jsonrpc: "2.0".to_string(),
            id: Value::Null,
            method: "execute".to_string(),
            params: None,
        };
        assert!(handle_rpc_request(req, test_state()).await.is_none());
    }

    #[tokio::test]
    async fn resources_list_covers_all_categories() {
        let resp = handle_rpc_request(request("resources/list", json!({})), test_state())
            .await
            .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["resources"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn batch_isolates_failing_item_with_continue_on_fail() {
        // checksumAddress is network-free: item 2 has a malformed
        // address and must become an error slot without stopping 1 and 3
        let resp = handle_rpc_request(
            request(
                "execute",
                json!({
                    "resource": "utility",
                    "operation": "checksumAddress",
                    "continueOnFail": true,
                    "parameters": [
                        { "address": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913" },
                        { "address": "not-an-address" },
                        { "address": "0x4200000000000000000000000000000000000006" },
                    ],
                }),
            ),
            test_state(),
        )
        .await
        .unwrap();
        let results = resp.result.unwrap();
        let items = results.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0]["checksummed"].is_string());
        assert!(items[1]["error"].is_string());
        assert!(items[2]["checksummed"].is_string());
    }

    #[tokio::test]
    async fn batch_without_continue_on_fail_aborts() {
        let resp = handle_rpc_request(
            request(
                "execute",
                json!({
                    "resource": "utility",
                    "operation": "checksumAddress",
                    "parameters": [
                        { "address": "not-an-address" },
                        { "address": "0x4200000000000000000000000000000000000006" },
                    ],
                }),
            ),
            test_state(),
        )
        .await
        .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_operation_is_invalid_params() {
        let resp = handle_rpc_request(
            request(
                "execute",
                json!({
                    "resource": "utility",
                    "operation": "doTheThing",
                    "parameters": {},
                }),
            ),
            test_state(),
        )
        .await
        .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn trigger_poll_without_start_is_an_error() {
        let resp = handle_rpc_request(request("trigger/poll", json!({})), test_state())
            .await
            .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::TRIGGER_ERROR);
    }
}
