// src/chain/services/coinbase_wallet.rs

use ethers::providers::Middleware;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chain::provider::Connection;
use crate::chain::services::from_params;
use crate::chain::units::{checksum, parse_address, wei_to_ether};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoinbaseWalletOp {
    GetWalletInfo,
    PredictAddress,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletParams {
    wallet_address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerParams {
    owner_address: String,
}

pub async fn execute(conn: &Connection, op: CoinbaseWalletOp, params: &Value) -> Result<Value> {
    match op {
        CoinbaseWalletOp::GetWalletInfo => {
            let p: WalletParams = from_params(params)?;
            let addr = parse_address(&p.wallet_address)?;
            let balance = conn.provider.get_balance(addr, None).await?;
            let code = conn.provider.get_code(addr, None).await?;
            Ok(json!({
                "address": checksum(&p.wallet_address)?,
                "balance": wei_to_ether(balance),
                "isDeployed": !code.is_empty(),
                "type": "Smart Wallet",
            }))
        }
        CoinbaseWalletOp::PredictAddress => {
            let p: OwnerParams = from_params(params)?;
            parse_address(&p.owner_address)?;
            Ok(json!({
                "owner": checksum(&p.owner_address)?,
                "note": "Address prediction requires Coinbase Smart Wallet factory",
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn predict_address_validates_owner() {
        let conn = Connection::connect(&Config::default()).unwrap();
        let err = execute(
            &conn,
            CoinbaseWalletOp::PredictAddress,
            &json!({"ownerAddress": "bogus"}),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Invalid address"));
    }
}
