//! The bounded submission retry loop.
//!
//! Per call: build a fee- and expiry-stamped transaction, sign it, submit
//! it through the relay or directly, and retry only on the one rejection
//! that means "bid higher"; everything else propagates immediately.

use alloy::primitives::{Address, Bytes};
use tracing::{debug, warn};

use crate::{
    config::EngineConfig,
    constants::UNDERPRICED_RETRY_DELAY,
    error::EngineError,
    fees::{BidMemory, Eip1559Fees},
    metrics::EngineMetrics,
    provider::{ChainApi, SponsorApi},
    signers::SigningKey,
    types::transaction::{
        Call, EXPIRING_NONCE_KEY, FeeMode, UnsignedTransaction, with_sender_hint,
    },
    utils::unix_now_secs,
};

/// Everything fixed across the retry attempts of one submission.
#[derive(Debug, Clone)]
pub(crate) struct TransactionPlan {
    /// The wallet the signing key acts for.
    pub wallet: Address,
    /// Calls to execute.
    pub calls: Vec<Call>,
    /// Gas limit (already buffered and floored).
    pub gas_limit: u64,
    /// Who pays.
    pub fee_mode: FeeMode,
    /// Key-authorization blob, when the signing key is freshly authorized.
    pub key_authorization: Option<Bytes>,
    /// Chain id to stamp.
    pub chain_id: u64,
}

/// A transaction the network accepted.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SentTransaction {
    /// Hash under which the network knows the transaction.
    pub tx_hash: alloy::primitives::B256,
    /// The expiry stamped into the accepted transaction.
    pub valid_before_secs: u64,
    /// The fee bid the accepted transaction carries.
    pub fees: Eip1559Fees,
    /// How many attempts it took.
    pub attempts: u32,
}

pub(crate) struct SubmitContext<'a> {
    pub chain: &'a dyn ChainApi,
    pub sponsor: &'a dyn SponsorApi,
    pub bids: &'a BidMemory,
    pub metrics: &'a EngineMetrics,
    pub config: &'a EngineConfig,
}

/// Submits `plan`, re-bidding and re-signing on underpriced-replacement
/// rejections up to the configured attempt cap.
///
/// Each attempt stamps a fresh expiry and re-signs, so the signed
/// transaction always reflects the latest fee bid; a stale signature cannot
/// be replayed because fees and expiry are part of the digest. The bid
/// memory is written on every attempt, accepted or not.
pub(crate) async fn submit_with_retries(
    ctx: &SubmitContext<'_>,
    plan: &TransactionPlan,
    signer: &dyn SigningKey,
    mut fees: Eip1559Fees,
) -> Result<SentTransaction, EngineError> {
    let max_attempts = ctx.config.max_submit_attempts.max(1);

    for attempt in 1..=max_attempts {
        let valid_before_secs = unix_now_secs().saturating_add(ctx.config.expiry_window_secs);
        let tx = UnsignedTransaction {
            chain_id: plan.chain_id,
            nonce_key: EXPIRING_NONCE_KEY,
            nonce: 0,
            valid_before_secs,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            fee_mode: plan.fee_mode,
            gas_limit: plan.gas_limit,
            calls: plan.calls.clone(),
            key_authorization: plan.key_authorization.clone(),
        };

        let signature = signer.sign_digest(tx.signature_hash()).await?;
        let raw = tx.encode_signed(plan.wallet, &signature);
        ctx.bids.remember(plan.wallet, fees);

        debug!(
            attempt,
            max_attempts,
            valid_before_secs,
            max_fee_per_gas = fees.max_fee_per_gas,
            max_priority_fee_per_gas = fees.max_priority_fee_per_gas,
            fee_mode = ?plan.fee_mode,
            "submitting transaction"
        );

        let sent = match plan.fee_mode {
            FeeMode::RelaySponsored => {
                match ctx.sponsor.cosign_raw_transaction(with_sender_hint(&raw, plan.wallet)).await
                {
                    Ok(sponsored) => ctx.chain.send_raw_transaction(sponsored).await,
                    Err(err) => Err(err),
                }
            }
            FeeMode::SelfPaid => ctx.chain.send_raw_transaction(raw).await,
        };

        match sent {
            Ok(tx_hash) => {
                ctx.metrics.submitted.increment(1);
                debug!(%tx_hash, attempt, "transaction accepted");
                return Ok(SentTransaction { tx_hash, valid_before_secs, fees, attempts: attempt });
            }
            Err(failure) if failure.is_underpriced_replacement() && attempt < max_attempts => {
                ctx.metrics.underpriced_retries.increment(1);
                let bumped = ctx.bids.floor(plan.wallet, fees.aggressively_bumped());
                warn!(
                    attempt,
                    max_fee_per_gas = bumped.max_fee_per_gas,
                    max_priority_fee_per_gas = bumped.max_priority_fee_per_gas,
                    "replacement underpriced, re-bidding"
                );
                fees = bumped;
                ctx.bids.remember(plan.wallet, fees);
                tokio::time::sleep(UNDERPRICED_RETRY_DELAY).await;
            }
            Err(failure) if failure.is_underpriced_replacement() => {
                return Err(EngineError::ReplacementRejected { attempts: attempt, last_fees: fees });
            }
            Err(failure) => return Err(failure.into()),
        }
    }

    Err(EngineError::ReplacementRejected { attempts: max_attempts, last_fees: fees })
}
