// src/config.rs

use std::env;

use anyhow::{Context, Result};

use crate::chain::networks::Network;

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    /// Which Base network to target: "mainnet", "sepolia", or "custom".
    pub network: Network,
    /// RPC endpoint override. Required when `network` is custom.
    pub rpc_url: Option<String>,
    /// Chain id override. Required when `network` is custom.
    pub chain_id: Option<u64>,

    // Wallet settings
    pub private_key: Option<String>,

    // External services
    pub basescan_api_key: Option<String>,
    pub neynar_api_key: Option<String>,

    // Trigger settings
    pub trigger_poll_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let network_str = env::var("BASE_NETWORK").unwrap_or_else(|_| "mainnet".to_string());
        let network = Network::parse(&network_str)
            .with_context(|| format!("BASE_NETWORK must be mainnet, sepolia or custom, got {network_str}"))?;

        let rpc_url = env::var("BASE_RPC_URL").ok().filter(|s| !s.is_empty());

        let chain_id = match env::var("BASE_CHAIN_ID") {
            Ok(s) if !s.is_empty() => Some(
                s.parse::<u64>()
                    .context("BASE_CHAIN_ID must be a valid number")?,
            ),
            _ => None,
        };

        let private_key = env::var("BASE_PRIVATE_KEY").ok().filter(|s| !s.is_empty());

        let trigger_poll_secs = env::var("TRIGGER_POLL_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .context("TRIGGER_POLL_SECS must be a valid number of seconds")?;

        Ok(Config {
            port,
            network,
            rpc_url,
            chain_id,
            private_key,
            basescan_api_key: env::var("BASESCAN_API_KEY").ok().filter(|s| !s.is_empty()),
            neynar_api_key: env::var("NEYNAR_API_KEY").ok().filter(|s| !s.is_empty()),
            trigger_poll_secs,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            network: Network::Mainnet,
            rpc_url: None,
            chain_id: None,
            private_key: None,
            basescan_api_key: None,
            neynar_api_key: None,
            trigger_poll_secs: 10,
        }
    }
}
