// src/chain/services/bridge.rs

use std::str::FromStr;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::Signer;
use ethers_core::abi::Token;
use ethers_core::types::{TransactionRequest, H256, U256};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::abi::encode_call;
use crate::chain::networks::{CHALLENGE_PERIOD_BLOCKS, L2_ETH_ADDRESS};
use crate::chain::provider::Connection;
use crate::chain::services::{from_params, receipt_status, send_tx};
use crate::chain::units::{checksum_addr, ether_to_wei, format_units, parse_address};
use crate::error::{ChainError, Result};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeOp {
    DepositEth,
    WithdrawEth,
    GetBridgeContracts,
    EstimateBridgeGas,
    GetWithdrawalStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositParams {
    l1_rpc_url: String,
    /// Amount in ether.
    amount: String,
    #[serde(default)]
    recipient_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawParams {
    amount: String,
    #[serde(default)]
    recipient_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BridgeDirection {
    Deposit,
    Withdraw,
}

impl Default for BridgeDirection {
    fn default() -> Self {
        BridgeDirection::Deposit
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateParams {
    #[serde(default)]
    bridge_direction: BridgeDirection,
    #[serde(default)]
    l1_rpc_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusParams {
    transaction_hash: String,
}

pub async fn execute(conn: &Connection, op: BridgeOp, params: &Value) -> Result<Value> {
    let bridge = conn.network.bridge_contracts();
    match op {
        BridgeOp::DepositEth => {
            let p: DepositParams = from_params(params)?;
            // Deposits are sent on L1, so a fresh signer is bound to the
            // caller-supplied L1 endpoint.
            let wallet = conn.signer()?.signer().clone();
            let l1_provider = Provider::<Http>::try_from(p.l1_rpc_url.as_str())
                .map_err(|e| ChainError::Rpc(format!("Failed to create L1 provider: {e}")))?;
            let l1_chain_id = l1_provider.get_chainid().await?.as_u64();
            let l1_client =
                SignerMiddleware::new(l1_provider, wallet.clone().with_chain_id(l1_chain_id));

            let sender = wallet.address();
            let recipient = match p.recipient_address.as_deref().filter(|s| !s.is_empty()) {
                Some(r) => parse_address(r)?,
                None => sender,
            };
            let amount = ether_to_wei(&p.amount)?;
            let data = encode_call(
                "depositETHTo(address,uint32,bytes)",
                &[
                    Token::Address(recipient),
                    Token::Uint(U256::from(200_000u64)),
                    Token::Bytes(Vec::new()),
                ],
            );
            let l1_bridge = parse_address(bridge.l1_standard_bridge)?;
            let tx = TransactionRequest::new().to(l1_bridge).value(amount).data(data);
            let pending = l1_client
                .send_transaction(tx, None)
                .await
                .map_err(|e| ChainError::Rpc(format!("Failed to send deposit: {e}")))?;
            let hash = *pending;
            let receipt = pending.await?;
            Ok(json!({
                "operation": "depositEth",
                "hash": format!("{hash:#x}"),
                "from": checksum_addr(&sender),
                "to": checksum_addr(&recipient),
                "amount": p.amount,
                "status": receipt_status(&receipt),
                "note": "Deposit will be available on L2 within ~1-3 minutes",
            }))
        }
        BridgeOp::WithdrawEth => {
            let p: WithdrawParams = from_params(params)?;
            let sender = conn.signer_address()?;
            let recipient = match p.recipient_address.as_deref().filter(|s| !s.is_empty()) {
                Some(r) => parse_address(r)?,
                None => sender,
            };
            let amount = ether_to_wei(&p.amount)?;
            let data = encode_call(
                "withdrawTo(address,address,uint256,uint32,bytes)",
                &[
                    Token::Address(parse_address(L2_ETH_ADDRESS)?),
                    Token::Address(recipient),
                    Token::Uint(amount),
                    Token::Uint(U256::zero()),
                    Token::Bytes(Vec::new()),
                ],
            );
            let l2_bridge = parse_address(bridge.l2_standard_bridge)?;
            let tx = TransactionRequest::new().to(l2_bridge).data(data);
            let (hash, receipt) = send_tx(conn, tx).await?;
            Ok(json!({
                "operation": "withdrawEth",
                "hash": format!("{hash:#x}"),
                "from": checksum_addr(&sender),
                "to": checksum_addr(&recipient),
                "amount": p.amount,
                "status": receipt_status(&receipt),
                "note": "7-day challenge period required",
            }))
        }
        BridgeOp::GetBridgeContracts => Ok(json!({
            "network": conn.network.as_str(),
            "contracts": {
                "l1StandardBridge": bridge.l1_standard_bridge,
                "l2StandardBridge": bridge.l2_standard_bridge,
                "optimismPortal": bridge.optimism_portal,
                "l2ToL1MessagePasser": bridge.l2_to_l1_message_passer,
                "l1CrossDomainMessenger": bridge.l1_cross_domain_messenger,
                "l2CrossDomainMessenger": bridge.l2_cross_domain_messenger,
            },
        })),
        BridgeOp::EstimateBridgeGas => {
            let p: EstimateParams = from_params(params)?;
            let (gas_price, estimated_gas, direction) = match p.bridge_direction {
                BridgeDirection::Deposit => {
                    let url = p.l1_rpc_url.as_deref().ok_or_else(|| {
                        ChainError::validation("l1RpcUrl is required for deposit estimates")
                    })?;
                    let l1_provider = Provider::<Http>::try_from(url).map_err(|e| {
                        ChainError::Rpc(format!("Failed to create L1 provider: {e}"))
                    })?;
                    (
                        l1_provider.get_gas_price().await?,
                        U256::from(150_000u64),
                        "L1 to L2",
                    )
                }
                BridgeDirection::Withdraw => (
                    conn.provider.get_gas_price().await?,
                    U256::from(200_000u64),
                    "L2 to L1",
                ),
            };
            let cost = estimated_gas * gas_price;
            Ok(json!({
                "direction": direction,
                "estimatedGas": estimated_gas.to_string(),
                "estimatedCostEth": format_units(cost, 18),
            }))
        }
        BridgeOp::GetWithdrawalStatus => {
            let p: StatusParams = from_params(params)?;
            let hash = H256::from_str(&p.transaction_hash).map_err(|_| {
                ChainError::validation(format!("Invalid transaction hash: {}", p.transaction_hash))
            })?;
            let receipt = conn.provider.get_transaction_receipt(hash).await?;
            let receipt = match receipt {
                Some(r) => r,
                None => {
                    return Ok(json!({
                        "hash": p.transaction_hash,
                        "status": "not_found",
                    }))
                }
            };
            let current = conn.provider.get_block_number().await?.as_u64();
            let mined_at = receipt.block_number.map(|n| n.as_u64()).unwrap_or(current);
            let confirmations = current.saturating_sub(mined_at);
            let status = if confirmations < CHALLENGE_PERIOD_BLOCKS {
                "in_challenge_period"
            } else {
                "ready_to_prove"
            };
            Ok(json!({
                "hash": p.transaction_hash,
                "blockNumber": mined_at,
                "confirmations": confirmations,
                "status": status,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn bridge_contracts_need_no_network_call() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let result = execute(&conn, BridgeOp::GetBridgeContracts, &json!({}))
            .await
            .unwrap();
        assert_eq!(result["network"], "mainnet");
        assert_eq!(
            result["contracts"]["l1StandardBridge"],
            "0x3154Cf16ccdb4C6d922629664174b904d80F2C35"
        );
    }

    #[tokio::test]
    async fn deposit_requires_key() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            BridgeOp::DepositEth,
            &json!({"l1RpcUrl": "http://localhost:8545", "amount": "0.1"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChainError::Permission(_)));
    }
}
