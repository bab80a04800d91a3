// src/rpc/mod.rs

pub mod handler;
pub mod http;
pub mod protocol;
