//! Receipt monitoring for expiring transactions.

use alloy::primitives::B256;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    constants::{RECEIPT_GRACE_SECS, RECEIPT_POLL_INTERVAL},
    error::EngineError,
    provider::{ChainApi, ReceiptSummary},
    utils::unix_now_secs,
};

/// Polls for the receipt of an accepted transaction.
///
/// The wait is bounded by the transaction's own expiry plus a small grace
/// period (and a configurable overall timeout as a backstop against clock
/// trouble). Three outcomes: a successful receipt, a revert carrying the
/// hash for diagnosis, or no receipt; in that case "the network dropped
/// it" and "it is still pending past its window" are distinguished by
/// asking whether the transaction is known at all, with one brief re-check
/// before giving up on a still-known transaction.
pub(crate) async fn await_receipt(
    chain: &dyn ChainApi,
    tx_hash: B256,
    valid_before_secs: u64,
    config: &EngineConfig,
) -> Result<ReceiptSummary, EngineError> {
    let expiry_deadline = valid_before_secs.saturating_add(RECEIPT_GRACE_SECS);
    let poll_timeout = std::time::Duration::from_secs(config.receipt_timeout_secs);
    let started = Instant::now();
    let mut logged_poll_error = false;
    let mut rechecked_after_expiry = false;

    loop {
        match chain.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.status_ok => {
                info!(
                    %tx_hash,
                    block_number = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "transaction confirmed"
                );
                return Ok(receipt);
            }
            Ok(Some(receipt)) => {
                warn!(%tx_hash, block_number = receipt.block_number, "transaction reverted");
                return Err(EngineError::OnChainRevert { tx_hash });
            }
            Ok(None) => {
                let expired =
                    unix_now_secs() > expiry_deadline || started.elapsed() >= poll_timeout;
                if expired {
                    if !chain.has_transaction(tx_hash).await? {
                        warn!(%tx_hash, "transaction no longer known to the network");
                        return Err(EngineError::DroppedBeforeInclusion { tx_hash });
                    }
                    if rechecked_after_expiry {
                        return Err(EngineError::NotConfirmedBeforeExpiry { tx_hash });
                    }
                    // Still in the pool: give propagation one more beat.
                    debug!(%tx_hash, "expired but still pending, re-checking once");
                    rechecked_after_expiry = true;
                }
            }
            Err(failure) => {
                if !logged_poll_error {
                    warn!(%tx_hash, %failure, "transient receipt poll failure");
                    logged_poll_error = true;
                }
                if started.elapsed() >= poll_timeout {
                    return Err(failure.into());
                }
            }
        }

        tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        provider::ReceiptSummary,
        test_util::{MockChain, fatal_rejection},
        utils::unix_now_secs,
    };
    use alloy::primitives::Address;
    use url::Url;

    fn test_config() -> EngineConfig {
        EngineConfig::new(
            Url::parse("http://localhost:1").unwrap(),
            Url::parse("http://localhost:2").unwrap(),
            42_431,
            Address::repeat_byte(0x05),
        )
        .with_receipt_timeout_secs(10)
    }

    #[tokio::test(start_paused = true)]
    async fn successful_receipt_confirms() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x01);
        chain.push_receipt(Ok(None));
        chain.push_receipt(Ok(Some(ReceiptSummary::success(tx_hash))));

        let receipt = await_receipt(&chain, tx_hash, unix_now_secs() + 25, &test_config())
            .await
            .unwrap();
        assert!(receipt.status_ok);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_receipt_is_fatal_and_carries_the_hash() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x02);
        chain.push_receipt(Ok(Some(ReceiptSummary::reverted(tx_hash))));

        let err = await_receipt(&chain, tx_hash, unix_now_secs() + 25, &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OnChainRevert { tx_hash: hash } if hash == tx_hash));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_after_expiry_is_dropped() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x03);
        // Expiry already behind us; the pool does not know the hash.
        chain.push_known(false);

        let err = await_receipt(&chain, tx_hash, unix_now_secs().saturating_sub(60), &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DroppedBeforeInclusion { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn still_known_after_expiry_gets_one_recheck() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x04);
        chain.push_known(true);
        chain.push_known(true);

        let err = await_receipt(&chain, tx_hash, unix_now_secs().saturating_sub(60), &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotConfirmedBeforeExpiry { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn recheck_can_still_confirm() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x05);
        chain.push_receipt(Ok(None));
        chain.push_receipt(Ok(Some(ReceiptSummary::success(tx_hash))));
        chain.push_known(true);

        let receipt = await_receipt(&chain, tx_hash, unix_now_secs().saturating_sub(60), &test_config())
            .await
            .unwrap();
        assert!(receipt.status_ok);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_poll_failures_surface_after_the_timeout() {
        let chain = MockChain::new(42_431);
        let tx_hash = alloy::primitives::B256::repeat_byte(0x06);
        for _ in 0..16 {
            chain.push_receipt(Err(fatal_rejection("node under maintenance")));
        }

        let err = await_receipt(&chain, tx_hash, unix_now_secs() + 25, &test_config())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rpc(_)));
    }
}
