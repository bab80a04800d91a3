// src/trigger/mod.rs
//
// Block-polling trigger. A watcher owns a cursor at the last scanned
// block height; each tick scans every block produced since, emitting
// JSON events for the configured event kind. The watcher is generic
// over the middleware so ticks can be driven against a mock provider.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ethers::providers::Middleware;
use ethers_core::abi::Event;
use ethers_core::types::{Filter, Log, H256};
use ethers_core::utils::keccak256;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::units::{checksum_addr, wei_to_ether};
use crate::error::{ChainError, Result};

const TRANSFER_SIG: &str = "Transfer(address,address,uint256)";

/// Buffered events are capped so a stalled consumer cannot grow the
/// queue without bound; oldest events are dropped first.
const MAX_BUFFERED_EVENTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    NewBlock,
    NewTransaction,
    EthTransfer,
    TokenTransfer,
    NftTransfer,
    ContractEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub event: EventKind,
    /// Address filter for transaction and transfer events.
    #[serde(default)]
    pub address: Option<String>,
    /// Contract filter for log-based events.
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Event name for contractEvent, hashed as `Name()` when no ABI
    /// fragment is supplied.
    #[serde(default)]
    pub event_name: Option<String>,
    /// Optional ABI fragment JSON for the watched event.
    #[serde(default)]
    pub event_abi: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

fn topic_hex(topic: Option<&H256>) -> String {
    match topic {
        // Indexed addresses occupy the low 20 bytes of the topic word
        Some(t) => format!("0x{}", hex::encode(&t.as_bytes()[12..])),
        None => String::new(),
    }
}

fn matches_filter(filter: &Option<String>, candidate: &str) -> bool {
    match filter {
        Some(f) if !f.is_empty() => f.eq_ignore_ascii_case(candidate),
        _ => true,
    }
}

pub struct BlockWatcher<M: Middleware> {
    provider: Arc<M>,
    config: TriggerConfig,
    cursor: u64,
}

impl<M: Middleware> BlockWatcher<M> {
    /// Starts the cursor at the current chain height, so only blocks
    /// produced after this call are ever scanned.
    pub async fn start(provider: Arc<M>, config: TriggerConfig) -> Result<Self> {
        let cursor = provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to read chain height: {e}")))?
            .as_u64();
        Ok(BlockWatcher {
            provider,
            config,
            cursor,
        })
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// One poll: scans every block above the cursor, in order, and
    /// advances the cursor to the observed head. A failing block is
    /// logged and skipped rather than stalling the loop.
    pub async fn tick(&mut self) -> Result<Vec<Value>> {
        let current = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to read chain height: {e}")))?
            .as_u64();
        if current <= self.cursor {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        for number in (self.cursor + 1)..=current {
            match self.scan_block(number).await {
                Ok(mut found) => events.append(&mut found),
                Err(e) => warn!(block = number, error = %e, "skipping block after scan error"),
            }
        }
        self.cursor = current;
        Ok(events)
    }

    async fn scan_block(&self, number: u64) -> Result<Vec<Value>> {
        match self.config.event {
            EventKind::NewBlock => self.scan_header(number).await,
            EventKind::NewTransaction | EventKind::EthTransfer => {
                self.scan_transactions(number).await
            }
            EventKind::TokenTransfer => self.scan_transfers(number, false).await,
            EventKind::NftTransfer => self.scan_transfers(number, true).await,
            EventKind::ContractEvent => self.scan_contract_logs(number).await,
        }
    }

    async fn scan_header(&self, number: u64) -> Result<Vec<Value>> {
        let block = self
            .provider
            .get_block(number)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to fetch block {number}: {e}")))?
            .ok_or_else(|| ChainError::Rpc(format!("Block {number} unavailable")))?;
        Ok(vec![json!({
            "event": "newBlock",
            "blockNumber": block.number.map(|n| n.as_u64()).unwrap_or(number),
            "blockHash": block.hash.map(|h| format!("{h:#x}")),
            "timestamp": block.timestamp.as_u64(),
            "gasUsed": block.gas_used.to_string(),
            "gasLimit": block.gas_limit.to_string(),
            "baseFeePerGas": block.base_fee_per_gas.map(|f| f.to_string()),
            "transactionCount": block.transactions.len(),
        })])
    }

    async fn scan_transactions(&self, number: u64) -> Result<Vec<Value>> {
        let block = self
            .provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to fetch block {number}: {e}")))?
            .ok_or_else(|| ChainError::Rpc(format!("Block {number} unavailable")))?;
        let mut out = Vec::new();
        for tx in &block.transactions {
            let from = format!("{:#x}", tx.from);
            let to = tx.to.map(|a| format!("{a:#x}")).unwrap_or_default();
            let relevant = matches_filter(&self.config.address, &from)
                || matches_filter(&self.config.address, &to);
            if !relevant {
                continue;
            }
            if self.config.event == EventKind::EthTransfer && tx.value.is_zero() {
                continue;
            }
            out.push(json!({
                "event": if self.config.event == EventKind::EthTransfer { "ethTransfer" } else { "newTransaction" },
                "hash": format!("{:#x}", tx.hash),
                "from": checksum_addr(&tx.from),
                "to": tx.to.map(|a| checksum_addr(&a)),
                "value": wei_to_ether(tx.value),
                "blockNumber": tx.block_number.map(|n| n.as_u64()).unwrap_or(number),
                "gasPrice": tx.gas_price.map(|g| g.to_string()),
            }));
        }
        Ok(out)
    }

    async fn scan_transfers(&self, number: u64, nft: bool) -> Result<Vec<Value>> {
        let mut filter = Filter::new()
            .from_block(number)
            .to_block(number)
            .topic0(H256::from(keccak256(TRANSFER_SIG)));
        if let Some(contract) = &self.config.contract_address {
            if !contract.is_empty() {
                filter = filter.address(crate::chain::units::parse_address(contract)?);
            }
        }
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to fetch logs for block {number}: {e}")))?;
        let mut out = Vec::new();
        for log in &logs {
            // ERC-20 Transfer carries the amount in data (3 topics);
            // ERC-721 indexes the token id as a 4th topic
            if nft != (log.topics.len() == 4) {
                continue;
            }
            let from = topic_hex(log.topics.get(1));
            let to = topic_hex(log.topics.get(2));
            if !(matches_filter(&self.config.address, &from)
                || matches_filter(&self.config.address, &to))
            {
                continue;
            }
            let mut event = json!({
                "event": if nft { "nftTransfer" } else { "tokenTransfer" },
                "contract": format!("{:#x}", log.address),
                "from": from,
                "to": to,
                "blockNumber": log.block_number.map(|n| n.as_u64()).unwrap_or(number),
                "transactionHash": log.transaction_hash.map(|h| format!("{h:#x}")),
            });
            if nft {
                let token_id = log
                    .topics
                    .get(3)
                    .map(|t| ethers_core::types::U256::from_big_endian(t.as_bytes()))
                    .unwrap_or_default();
                event["tokenId"] = json!(token_id.to_string());
            } else {
                let value = ethers_core::types::U256::from_big_endian(&log.data);
                event["value"] = json!(value.to_string());
            }
            out.push(event);
        }
        Ok(out)
    }

    async fn scan_contract_logs(&self, number: u64) -> Result<Vec<Value>> {
        let contract = self
            .config
            .contract_address
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ChainError::validation("contractAddress is required for contractEvent".to_string())
            })?;
        let mut filter = Filter::new()
            .from_block(number)
            .to_block(number)
            .address(crate::chain::units::parse_address(contract)?);
        if let Some(topic) = self.event_topic()? {
            filter = filter.topic0(topic);
        }
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to fetch logs for block {number}: {e}")))?;
        Ok(logs.iter().map(|log| contract_log_json(log, number)).collect())
    }

    fn event_topic(&self) -> Result<Option<H256>> {
        if let Some(abi) = self.config.event_abi.as_deref().filter(|s| !s.is_empty()) {
            let event: Event = serde_json::from_str(abi)
                .map_err(|e| ChainError::validation(format!("Invalid event ABI: {e}")))?;
            return Ok(Some(event.signature()));
        }
        if let Some(name) = self.config.event_name.as_deref().filter(|s| !s.is_empty()) {
            return Ok(Some(H256::from(keccak256(format!("{name}()")))));
        }
        Ok(None)
    }
}

fn contract_log_json(log: &Log, number: u64) -> Value {
    json!({
        "event": "contractEvent",
        "address": format!("{:#x}", log.address),
        "topics": log.topics.iter().map(|t| format!("{t:#x}")).collect::<Vec<_>>(),
        "data": format!("{}", log.data),
        "blockNumber": log.block_number.map(|n| n.as_u64()).unwrap_or(number),
        "transactionHash": log.transaction_hash.map(|h| format!("{h:#x}")),
        "logIndex": log.log_index.map(|i| i.as_u64()),
    })
}

/// A running poll loop plus the buffer its events drain into.
pub struct TriggerTask {
    cancel: CancellationToken,
    pub events: Arc<Mutex<VecDeque<Value>>>,
}

impl TriggerTask {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn drain(&self) -> Vec<Value> {
        let mut buffer = self.events.lock().await;
        buffer.drain(..).collect()
    }
}

/// Spawns the poll loop: one immediate tick, then one per interval
/// until cancelled. Tick errors are logged and the loop keeps going.
pub fn spawn<M: Middleware + 'static>(
    mut watcher: BlockWatcher<M>,
    poll_interval: Duration,
) -> TriggerTask {
    let cancel = CancellationToken::new();
    let events: Arc<Mutex<VecDeque<Value>>> = Arc::new(Mutex::new(VecDeque::new()));

    let loop_cancel = cancel.clone();
    let loop_events = events.clone();
    tokio::spawn(async move {
        info!(cursor = watcher.cursor(), "trigger started");
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = loop_cancel.cancelled() => break,
                _ = interval.tick() => {
                    match watcher.tick().await {
                        Ok(found) => {
                            if !found.is_empty() {
                                let mut buffer = loop_events.lock().await;
                                for event in found {
                                    if buffer.len() >= MAX_BUFFERED_EVENTS {
                                        buffer.pop_front();
                                    }
                                    buffer.push_back(event);
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "trigger tick failed"),
                    }
                }
            }
        }
        info!("trigger stopped");
    });

    TriggerTask { cancel, events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::Provider;
    use ethers_core::types::{Block, H256, U64};

    fn header(number: u64) -> Block<H256> {
        Block {
            number: Some(U64::from(number)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn tick_at_same_height_scans_nothing() {
        let (provider, mock) = Provider::mocked();
        mock.push(U64::from(100)).unwrap();
        let mut watcher = BlockWatcher::start(
            Arc::new(provider),
            TriggerConfig {
                event: EventKind::NewBlock,
                address: None,
                contract_address: None,
                event_name: None,
                event_abi: None,
                poll_interval_secs: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(watcher.cursor(), 100);

        mock.push(U64::from(100)).unwrap();
        let events = watcher.tick().await.unwrap();
        assert!(events.is_empty());
        assert_eq!(watcher.cursor(), 100);
    }

    #[tokio::test]
    async fn tick_scans_each_new_block_once_in_order() {
        let (provider, mock) = Provider::mocked();
        mock.push(U64::from(100)).unwrap();
        let mut watcher = BlockWatcher::start(
            Arc::new(provider),
            TriggerConfig {
                event: EventKind::NewBlock,
                address: None,
                contract_address: None,
                event_name: None,
                event_abi: None,
                poll_interval_secs: None,
            },
        )
        .await
        .unwrap();

        // Mock responses pop in reverse push order: the height read
        // comes last, then blocks 101, 102, 103.
        mock.push(header(103)).unwrap();
        mock.push(header(102)).unwrap();
        mock.push(header(101)).unwrap();
        mock.push(U64::from(103)).unwrap();

        let events = watcher.tick().await.unwrap();
        let numbers: Vec<u64> = events
            .iter()
            .map(|e| e["blockNumber"].as_u64().unwrap())
            .collect();
        assert_eq!(numbers, vec![101, 102, 103]);
        assert_eq!(watcher.cursor(), 103);
    }

    #[tokio::test]
    async fn failing_block_is_skipped_and_cursor_still_advances() {
        let (provider, mock) = Provider::mocked();
        mock.push(U64::from(200)).unwrap();
        let mut watcher = BlockWatcher::start(
            Arc::new(provider),
            TriggerConfig {
                event: EventKind::NewBlock,
                address: None,
                contract_address: None,
                event_name: None,
                event_abi: None,
                poll_interval_secs: None,
            },
        )
        .await
        .unwrap();

        // Block 201 yields null, which scan_header treats as an error;
        // block 202 succeeds.
        mock.push(header(202)).unwrap();
        mock.push(serde_json::Value::Null).unwrap();
        mock.push(U64::from(202)).unwrap();

        let events = watcher.tick().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["blockNumber"], 202);
        assert_eq!(watcher.cursor(), 202);
    }

    #[test]
    fn event_topic_from_name_and_abi_fragment() {
        let config = TriggerConfig {
            event: EventKind::ContractEvent,
            address: None,
            contract_address: Some("0x4200000000000000000000000000000000000006".to_string()),
            event_name: Some("Paused".to_string()),
            event_abi: None,
            poll_interval_secs: None,
        };
        let (provider, _mock) = Provider::mocked();
        let watcher = BlockWatcher {
            provider: Arc::new(provider),
            config,
            cursor: 0,
        };
        let topic = watcher.event_topic().unwrap().unwrap();
        assert_eq!(topic, H256::from(keccak256("Paused()")));
    }
}
