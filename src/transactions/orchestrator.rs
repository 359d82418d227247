//! Relay-first submission with a self-paid fallback.

use alloy::primitives::{Address, B256, Bytes};
use tracing::{debug, instrument, warn};

use super::{
    monitor::await_receipt,
    submit::{SubmitContext, TransactionPlan, submit_with_retries},
};
use crate::{
    config::EngineConfig,
    constants::GAS_LIMIT_BUFFER,
    error::EngineError,
    fees::{BidMemory, Eip1559Fees},
    metrics::EngineMetrics,
    provider::{ChainApi, Funder, ReceiptSummary, SponsorApi},
    signers::SigningKey,
    types::transaction::{Call, FeeMode},
};

/// The outcome of one fallback-aware submission cycle.
#[derive(Debug, Clone)]
pub struct SessionCallSubmission {
    /// Hash of the finally-accepted transaction.
    pub tx_hash: B256,
    /// Whether the self-paid fallback was used.
    pub used_self_pay: bool,
    /// The confirming receipt.
    pub receipt: ReceiptSummary,
}

/// Runs one submission cycle: sponsored first, self-paid on relay failure.
pub(crate) struct Orchestrator<'a> {
    pub chain: &'a dyn ChainApi,
    pub sponsor: &'a dyn SponsorApi,
    pub funder: Option<&'a dyn Funder>,
    pub bids: &'a BidMemory,
    pub metrics: &'a EngineMetrics,
    pub config: &'a EngineConfig,
}

impl Orchestrator<'_> {
    /// Submits `calls` for `wallet`, trying the zero-cost sponsored path
    /// first. When the relay path itself fails (a co-signing error, a
    /// non-underpriced rejection, or retry exhaustion), the wallet is
    /// funded best-effort and the submission repeats self-paid with
    /// aggressively bumped fees, since the relay fee floor no longer
    /// applies and the clock has already been burning.
    #[instrument(skip_all, fields(%wallet, calls = calls.len()))]
    pub(crate) async fn execute(
        &self,
        wallet: Address,
        calls: Vec<Call>,
        gas_floor: u64,
        signer: &dyn SigningKey,
        key_authorization: Option<Bytes>,
    ) -> Result<SessionCallSubmission, EngineError> {
        let gas_limit = self.buffered_gas_limit(wallet, &calls, gas_floor).await;
        let suggested = Eip1559Fees::from_gas_price(self.chain.gas_price().await?);

        let ctx = SubmitContext {
            chain: self.chain,
            sponsor: self.sponsor,
            bids: self.bids,
            metrics: self.metrics,
            config: self.config,
        };

        let plan = TransactionPlan {
            wallet,
            calls,
            gas_limit,
            fee_mode: FeeMode::RelaySponsored,
            key_authorization,
            chain_id: self.config.chain_id,
        };

        let relay_fees = self.bids.floor(wallet, suggested.with_relay_minimum_floor());
        let relay_error = match submit_with_retries(&ctx, &plan, signer, relay_fees).await {
            Ok(sent) => {
                let receipt =
                    await_receipt(self.chain, sent.tx_hash, sent.valid_before_secs, self.config)
                        .await?;
                return Ok(SessionCallSubmission {
                    tx_hash: sent.tx_hash,
                    used_self_pay: false,
                    receipt,
                });
            }
            Err(err) => err,
        };

        if !is_relay_submission_failure(&relay_error) {
            return Err(relay_error);
        }

        warn!(error = %relay_error, "sponsored path failed, falling back to self-paid");
        self.metrics.self_pay_fallbacks.increment(1);

        if let Some(funder) = self.funder {
            match funder.fund(wallet).await {
                Ok(funding_tx) => debug!(?funding_tx, "wallet funded"),
                Err(err) => {
                    warn!(%err, "self-funding failed, attempting self-paid submission anyway")
                }
            }
        }

        let plan = TransactionPlan { fee_mode: FeeMode::SelfPaid, ..plan };
        let self_paid_fees = self.bids.floor(wallet, suggested.aggressively_bumped());
        let sent = submit_with_retries(&ctx, &plan, signer, self_paid_fees).await?;
        let receipt =
            await_receipt(self.chain, sent.tx_hash, sent.valid_before_secs, self.config).await?;

        Ok(SessionCallSubmission { tx_hash: sent.tx_hash, used_self_pay: true, receipt })
    }

    /// Buffered gas estimate, never below the per-path floor. Estimation
    /// failure falls back to the floor rather than aborting: the floors are
    /// sized to cover the registry's worst case.
    async fn buffered_gas_limit(&self, wallet: Address, calls: &[Call], floor: u64) -> u64 {
        let Some(call) = calls.first() else {
            return floor;
        };
        match self.chain.estimate_gas(wallet, call.to, call.input.clone()).await {
            Ok(estimate) => estimate.saturating_add(GAS_LIMIT_BUFFER).max(floor),
            Err(err) => {
                warn!(%err, "gas estimation failed, using path minimum");
                floor
            }
        }
    }
}

/// Whether an error means the sponsored submission path itself failed.
///
/// Post-acceptance outcomes (revert, drop, expiry) happened to a
/// transaction the relay accepted; resubmitting self-paid would not have
/// changed them. Authorization rejections are signer trouble, handled a
/// layer up. Everything else RPC-shaped, including retry exhaustion, is a
/// relay-path failure worth a self-paid attempt.
fn is_relay_submission_failure(err: &EngineError) -> bool {
    match err {
        EngineError::Rpc(failure) => !failure.is_unauthorized(),
        EngineError::ReplacementRejected { .. } => true,
        _ => false,
    }
}
