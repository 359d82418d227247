//! Engine configuration.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    DEFAULT_MAX_SUBMIT_ATTEMPTS, DEFAULT_RECEIPT_TIMEOUT_SECS, EXPIRY_WINDOW_SECS,
};

/// Configuration for a [`ScrobbleEngine`](crate::engine::ScrobbleEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// JSON-RPC endpoint of the chain.
    pub rpc_url: Url,
    /// JSON-RPC endpoint of the sponsoring relay.
    pub sponsor_url: Url,
    /// Chain id the engine is willing to submit to. Submissions fail fast
    /// if the connected node reports anything else.
    pub chain_id: u64,
    /// Address of the deployed play-event registry.
    pub registry: Address,
    /// Optional funding endpoint used before the self-paid fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funder_url: Option<Url>,
    /// Validity window attached to every transaction, in seconds.
    #[serde(default = "default_expiry_window_secs")]
    pub expiry_window_secs: u64,
    /// Overall receipt polling timeout, in seconds.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Total submission attempts per call (first attempt plus
    /// underpriced-replacement retries).
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: u32,
}

fn default_expiry_window_secs() -> u64 {
    EXPIRY_WINDOW_SECS
}

fn default_receipt_timeout_secs() -> u64 {
    DEFAULT_RECEIPT_TIMEOUT_SECS
}

fn default_max_submit_attempts() -> u32 {
    DEFAULT_MAX_SUBMIT_ATTEMPTS
}

impl EngineConfig {
    /// Creates a configuration with default tuning.
    pub fn new(rpc_url: Url, sponsor_url: Url, chain_id: u64, registry: Address) -> Self {
        Self {
            rpc_url,
            sponsor_url,
            chain_id,
            registry,
            funder_url: None,
            expiry_window_secs: default_expiry_window_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            max_submit_attempts: default_max_submit_attempts(),
        }
    }

    /// Sets the funding endpoint.
    pub fn with_funder_url(mut self, funder_url: Url) -> Self {
        self.funder_url = Some(funder_url);
        self
    }

    /// Sets the per-transaction validity window.
    pub fn with_expiry_window_secs(mut self, secs: u64) -> Self {
        self.expiry_window_secs = secs;
        self
    }

    /// Sets the receipt polling timeout.
    pub fn with_receipt_timeout_secs(mut self, secs: u64) -> Self {
        self.receipt_timeout_secs = secs;
        self
    }

    /// Sets the total submission attempt cap.
    pub fn with_max_submit_attempts(mut self, attempts: u32) -> Self {
        self.max_submit_attempts = attempts;
        self
    }
}
