// src/lib.rs

use std::sync::Arc;

use tokio::sync::Mutex;

pub mod chain;
pub mod config;
pub mod error;
pub mod rpc;
pub mod trigger;

/// Application state shared across request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration, resolved from the environment at startup.
    pub config: config::Config,
    /// The running block-polling trigger, if any.
    pub trigger: Arc<Mutex<Option<trigger::TriggerTask>>>,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        AppState {
            config,
            trigger: Arc::new(Mutex::new(None)),
        }
    }
}
