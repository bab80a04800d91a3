// src/chain/provider.rs

use std::str::FromStr;
use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers_core::types::Address;

use crate::chain::networks::Network;
use crate::config::Config;
use crate::error::{ChainError, Result};

/// Provider wrapped with a local signing key, for write operations.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// A resolved connection to one Base network: read-side provider,
/// optional signer, and the explorer endpoint that goes with it.
#[derive(Clone, Debug)]
pub struct Connection {
    pub network: Network,
    pub chain_id: Option<u64>,
    pub rpc_url: String,
    pub provider: Provider<Http>,
    signer: Option<Arc<SignerClient>>,
    pub explorer_api_url: Option<String>,
    pub explorer_api_key: Option<String>,
    pub neynar_api_key: Option<String>,
}

impl Connection {
    /// Resolve the network, RPC endpoint and signing key from config.
    /// A bad private key fails here, before any request is made.
    pub fn connect(config: &Config) -> Result<Connection> {
        let network = config.network;

        let (rpc_url, chain_id, explorer_api_url) = match network {
            Network::Custom => {
                let url = config.rpc_url.clone().ok_or(ChainError::MissingRpcUrl)?;
                url::Url::parse(&url)
                    .map_err(|e| ChainError::validation(format!("Invalid RPC URL {url}: {e}")))?;
                (url, config.chain_id, None)
            }
            // Known networks always use the registry endpoint; the RPC
            // and chain-id overrides only apply to custom.
            _ => {
                let net = network.config()?;
                (
                    net.rpc_url.to_string(),
                    Some(net.chain_id),
                    Some(net.explorer_api_url.to_string()),
                )
            }
        };

        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .map_err(|e| ChainError::Rpc(format!("Failed to create provider: {e}")))?;

        let signer = match &config.private_key {
            Some(key) => {
                let id = chain_id.ok_or_else(|| {
                    ChainError::validation(
                        "BASE_CHAIN_ID is required to sign on a custom network",
                    )
                })?;
                let wallet = LocalWallet::from_str(key.trim_start_matches("0x"))
                    .map_err(|e| ChainError::InvalidKey(e.to_string()))?
                    .with_chain_id(id);
                Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet)))
            }
            None => None,
        };

        Ok(Connection {
            network,
            chain_id,
            rpc_url,
            provider,
            signer,
            explorer_api_url,
            explorer_api_key: config.basescan_api_key.clone(),
            neynar_api_key: config.neynar_api_key.clone(),
        })
    }

    /// Signing client for write operations. Fails with a permission
    /// error when no private key is configured, before any I/O.
    pub fn signer(&self) -> Result<Arc<SignerClient>> {
        self.signer.clone().ok_or_else(|| {
            ChainError::permission(
                "No private key configured; write operations are unavailable",
            )
        })
    }

    /// Address of the configured signing key, if any.
    pub fn signer_address(&self) -> Result<Address> {
        Ok(self.signer()?.signer().address())
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::networks::Network;

    #[test]
    fn mainnet_defaults_resolve() {
        let conn = Connection::connect(&Config::default()).unwrap();
        assert_eq!(conn.chain_id, Some(8453));
        assert_eq!(conn.rpc_url, "https://mainnet.base.org");
        assert!(conn.explorer_api_url.is_some());
        assert!(!conn.has_signer());
    }

    #[test]
    fn known_network_ignores_endpoint_overrides() {
        let config = Config {
            rpc_url: Some("http://localhost:9999".to_string()),
            chain_id: Some(1),
            ..Config::default()
        };
        let conn = Connection::connect(&config).unwrap();
        assert_eq!(conn.rpc_url, "https://mainnet.base.org");
        assert_eq!(conn.chain_id, Some(8453));
    }

    #[test]
    fn custom_network_chain_id_is_optional_for_reads() {
        let config = Config {
            network: Network::Custom,
            rpc_url: Some("http://localhost:8545".to_string()),
            ..Config::default()
        };
        let conn = Connection::connect(&config).unwrap();
        assert_eq!(conn.chain_id, None);
        assert!(!conn.has_signer());
    }

    #[test]
    fn custom_network_signing_needs_chain_id() {
        let config = Config {
            network: Network::Custom,
            rpc_url: Some("http://localhost:8545".to_string()),
            private_key: Some(
                "0x0000000000000000000000000000000000000000000000000000000000000001"
                    .to_string(),
            ),
            ..Config::default()
        };
        let err = Connection::connect(&config).unwrap_err();
        assert!(err.to_string().contains("BASE_CHAIN_ID"));
    }

    #[test]
    fn custom_network_requires_rpc_url() {
        let config = Config {
            network: Network::Custom,
            ..Config::default()
        };
        assert!(matches!(
            Connection::connect(&config),
            Err(ChainError::MissingRpcUrl)
        ));
    }

    #[test]
    fn write_without_key_is_a_permission_error() {
        let conn = Connection::connect(&Config::default()).unwrap();
        assert!(matches!(conn.signer(), Err(ChainError::Permission(_))));
    }

    #[test]
    fn bad_key_fails_at_connect() {
        let config = Config {
            private_key: Some("0xnothex".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            Connection::connect(&config),
            Err(ChainError::InvalidKey(_))
        ));
    }

    #[test]
    fn good_key_yields_signer() {
        let config = Config {
            private_key: Some(
                "0x0000000000000000000000000000000000000000000000000000000000000001"
                    .to_string(),
            ),
            ..Config::default()
        };
        let conn = Connection::connect(&config).unwrap();
        assert!(conn.has_signer());
        assert!(conn.signer_address().is_ok());
    }
}
