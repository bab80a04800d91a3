// src/chain/mod.rs

pub mod abi;
pub mod eas;
pub mod explorer;
pub mod networks;
pub mod provider;
pub mod services;
pub mod units;
