// src/chain/networks.rs

use serde::Deserialize;

use crate::error::{ChainError, Result};

/// Static registry of the networks this server knows how to talk to.
/// `custom` is resolved by the connection factory from an explicit RPC
/// URL and never hits this registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Sepolia,
    Custom,
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub name: &'static str,
    pub chain_id: u64,
    pub rpc_url: &'static str,
    pub explorer_api_url: &'static str,
}

pub const MAINNET: NetworkConfig = NetworkConfig {
    name: "Base Mainnet",
    chain_id: 8453,
    rpc_url: "https://mainnet.base.org",
    explorer_api_url: "https://api.basescan.org/api",
};

pub const SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Base Sepolia",
    chain_id: 84532,
    rpc_url: "https://sepolia.base.org",
    explorer_api_url: "https://api-sepolia.basescan.org/api",
};

impl Network {
    pub fn parse(name: &str) -> Result<Network> {
        match name {
            "mainnet" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "custom" => Ok(Network::Custom),
            other => Err(ChainError::UnknownNetwork(other.to_string())),
        }
    }

    /// Registry lookup. Fails for `custom`, which has no static config.
    pub fn config(&self) -> Result<&'static NetworkConfig> {
        match self {
            Network::Mainnet => Ok(&MAINNET),
            Network::Sepolia => Ok(&SEPOLIA),
            Network::Custom => Err(ChainError::UnknownNetwork("custom".to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Custom => "custom",
        }
    }

    /// Sepolia shares the mainnet deployment for the contracts below
    /// except where noted, so anything custom falls back to mainnet.
    pub fn contracts(&self) -> &'static BaseContracts {
        match self {
            Network::Sepolia => &SEPOLIA_CONTRACTS,
            _ => &MAINNET_CONTRACTS,
        }
    }

    pub fn bridge_contracts(&self) -> &'static BridgeContracts {
        match self {
            Network::Sepolia => &SEPOLIA_BRIDGE,
            _ => &MAINNET_BRIDGE,
        }
    }

    pub fn safe_service_url(&self) -> &'static str {
        match self {
            Network::Sepolia => "https://safe-transaction-base-sepolia.safe.global/api/v1",
            _ => "https://safe-transaction-base.safe.global/api/v1",
        }
    }
}

/// Fixed Base system and protocol contract addresses.
#[derive(Debug)]
pub struct BaseContracts {
    pub gas_price_oracle: &'static str,
    pub l2_standard_bridge: &'static str,
    pub eas: &'static str,
    pub eas_schema_registry: &'static str,
    pub uniswap_v3_router: &'static str,
    pub uniswap_quoter: &'static str,
}

pub const MAINNET_CONTRACTS: BaseContracts = BaseContracts {
    gas_price_oracle: "0x420000000000000000000000000000000000000F",
    l2_standard_bridge: "0x4200000000000000000000000000000000000010",
    eas: "0x4200000000000000000000000000000000000021",
    eas_schema_registry: "0x4200000000000000000000000000000000000020",
    uniswap_v3_router: "0x2626664c2603336E57B271c5C0b26F421741e481",
    uniswap_quoter: "0x3d4e44Eb1374240CE5F1B871ab261CD16335B76a",
};

pub const SEPOLIA_CONTRACTS: BaseContracts = BaseContracts {
    gas_price_oracle: "0x420000000000000000000000000000000000000F",
    l2_standard_bridge: "0x4200000000000000000000000000000000000010",
    eas: "0x4200000000000000000000000000000000000021",
    eas_schema_registry: "0x4200000000000000000000000000000000000020",
    uniswap_v3_router: "0x2626664c2603336E57B271c5C0b26F421741e481",
    uniswap_quoter: "0x3d4e44Eb1374240CE5F1B871ab261CD16335B76a",
};

/// L1 <-> L2 standard bridge deployment per network.
#[derive(Debug)]
pub struct BridgeContracts {
    pub l1_standard_bridge: &'static str,
    pub l2_standard_bridge: &'static str,
    pub optimism_portal: &'static str,
    pub l2_to_l1_message_passer: &'static str,
    pub l1_cross_domain_messenger: &'static str,
    pub l2_cross_domain_messenger: &'static str,
}

pub const MAINNET_BRIDGE: BridgeContracts = BridgeContracts {
    l1_standard_bridge: "0x3154Cf16ccdb4C6d922629664174b904d80F2C35",
    l2_standard_bridge: "0x4200000000000000000000000000000000000010",
    optimism_portal: "0x49048044D57e1C92A77f79988d21Fa8fAF74E97e",
    l2_to_l1_message_passer: "0x4200000000000000000000000000000000000016",
    l1_cross_domain_messenger: "0x866E82a600A1414e583f7F13623F1aC5d58b0Afa",
    l2_cross_domain_messenger: "0x4200000000000000000000000000000000000007",
};

pub const SEPOLIA_BRIDGE: BridgeContracts = BridgeContracts {
    l1_standard_bridge: "0xfd0Bf71F60660E2f608ed56e1659C450eB113120",
    l2_standard_bridge: "0x4200000000000000000000000000000000000010",
    optimism_portal: "0x49f53e41452C74589E85cA1677426Ba426459e85",
    l2_to_l1_message_passer: "0x4200000000000000000000000000000000000016",
    l1_cross_domain_messenger: "0xC34855F4De64F1840e5686e64278da901e261f20",
    l2_cross_domain_messenger: "0x4200000000000000000000000000000000000007",
};

/// Multicall3 is deployed at the same address on every EVM chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Sentinel the L2 bridge uses to represent native ETH.
pub const L2_ETH_ADDRESS: &str = "0xDeadDeAddeAddEAddeadDEaDDEAdDeaDDeAD0000";

/// Withdrawal challenge period in L2 blocks (roughly 7 days).
pub const CHALLENGE_PERIOD_BLOCKS: u64 = 302_400;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_networks() {
        assert_eq!(Network::parse("mainnet").unwrap(), Network::Mainnet);
        assert_eq!(Network::Mainnet.config().unwrap().chain_id, 8453);
        assert_eq!(Network::Sepolia.config().unwrap().chain_id, 84532);
    }

    #[test]
    fn rejects_unknown_network() {
        let err = Network::parse("goerli").unwrap_err();
        assert!(err.to_string().contains("Unknown network"));
    }

    #[test]
    fn custom_has_no_registry_entry() {
        assert!(Network::Custom.config().is_err());
    }
}
