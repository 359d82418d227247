use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// Metrics for the submission engine.
///
/// Recorded against whatever global recorder the embedding process
/// installs; without one these are no-ops.
#[derive(Metrics)]
#[metrics(scope = "scrobble_engine")]
pub struct EngineMetrics {
    /// Number of transactions accepted by the network.
    pub submitted: Counter,
    /// Number of transactions confirmed on chain.
    pub confirmed: Counter,
    /// Number of submissions that ended in a failure.
    pub failed: Counter,
    /// Number of underpriced-replacement retries.
    pub underpriced_retries: Counter,
    /// Number of times the self-paid fallback path was taken.
    pub self_pay_fallbacks: Counter,
    /// Number of session key refreshes triggered by authorization failures.
    pub session_key_refreshes: Counter,
    /// Time from first submission attempt to confirmation, in milliseconds.
    pub confirmation_time: Histogram,
}
