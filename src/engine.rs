//! Public entry points of the submission engine.

use std::sync::{Arc, OnceLock};

use alloy::{
    primitives::{Address, B256, U256},
    sol_types::SolCall,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::{
    config::EngineConfig,
    constants::{
        GAS_LIMIT_RECORD_MIN, GAS_LIMIT_REGISTER_AND_RECORD_MIN, GAS_LIMIT_SET_COVER_MIN,
        GAS_LIMIT_SET_LYRICS_MIN, MAX_CONTENT_REF_BYTES,
    },
    error::{EngineError, ErrorKind, FailureClass},
    fees::BidMemory,
    metrics::EngineMetrics,
    probe::CapabilityProbe,
    provider::{ChainApi, Funder, RpcChainReader, RpcFunder, SponsorApi, SponsorClient},
    signers::{SessionKeyRefresher, SessionKeySigner, SigningKey},
    transactions::{Orchestrator, SessionCallSubmission},
    types::{
        registry::{
            decode_cover_ref, decode_is_registered, decode_lyrics_ref, getTrackCall,
            getTrackLyricsCall, isRegisteredCall, registerAndScrobbleBatchCall,
            scrobbleBatchCall, setTrackCoverForCall, setTrackLyricsForCall,
        },
        track::PlayEvent,
        transaction::Call,
    },
};

/// The signers available for one submitting account, in fallback order.
///
/// The session key is the silent default; the interactive signer (passkey
/// or custodial threshold) is authoritative but costs user-facing latency,
/// so it is only reached when the session path is unusable or rejected.
#[derive(Debug, Clone)]
pub struct SubmitterAccount {
    /// The wallet address play events are recorded for.
    pub wallet: Address,
    /// Silent session key, if one is provisioned.
    pub session: Option<Arc<SessionKeySigner>>,
    /// Interactive signer of last resort.
    pub interactive: Option<Arc<dyn SigningKey>>,
    /// Port for minting a replacement session key after an authorization
    /// failure.
    pub refresher: Option<Arc<dyn SessionKeyRefresher>>,
}

impl SubmitterAccount {
    /// An account with no signers attached yet.
    pub fn new(wallet: Address) -> Self {
        Self { wallet, session: None, interactive: None, refresher: None }
    }

    /// Attaches a session key.
    pub fn with_session(mut self, session: SessionKeySigner) -> Self {
        self.session = Some(Arc::new(session));
        self
    }

    /// Attaches an interactive signer.
    pub fn with_interactive(mut self, signer: Arc<dyn SigningKey>) -> Self {
        self.interactive = Some(signer);
        self
    }

    /// Attaches a session key refresher.
    pub fn with_refresher(mut self, refresher: Arc<dyn SessionKeyRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }
}

/// The caller-facing outcome of a play-event submission.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    /// Whether the event was recorded and confirmed.
    pub success: bool,
    /// Hash of the transaction this submission ended on, when it got as far
    /// as a broadcast.
    pub tx_hash: Option<B256>,
    /// What went wrong, when it did.
    pub error: Option<ErrorKind>,
    /// Whether the self-paid fallback was used.
    pub used_self_pay_fallback: bool,
    /// Whether the register-and-record path was selected (first play of an
    /// unregistered track).
    pub used_register_path: bool,
    /// Whether a confirming receipt was observed.
    pub confirmed: bool,
    /// The track id the event resolved to.
    pub track_id: Option<B256>,
}

impl SubmissionResult {
    fn failure(error: &EngineError, track_id: Option<B256>, used_register_path: bool) -> Self {
        Self {
            success: false,
            tx_hash: error.tx_hash(),
            error: Some(error.kind()),
            used_self_pay_fallback: false,
            used_register_path,
            confirmed: false,
            track_id,
        }
    }
}

/// The sponsored play-event submission engine.
///
/// One engine instance per target chain. All cross-call state is the
/// per-address bid memory and the capability-probe memo; both live for the
/// process only. The whole build→sign→submit→confirm sequence runs under a
/// single lock, so concurrent submissions for the same engine queue up
/// instead of racing on fee state.
pub struct ScrobbleEngine {
    config: EngineConfig,
    chain: Arc<dyn ChainApi>,
    sponsor: Arc<dyn SponsorApi>,
    funder: Option<Arc<dyn Funder>>,
    bids: BidMemory,
    probe: CapabilityProbe,
    metrics: EngineMetrics,
    submit_lock: Mutex<()>,
    verified_chain: OnceLock<u64>,
}

impl std::fmt::Debug for ScrobbleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrobbleEngine")
            .field("chain_id", &self.config.chain_id)
            .field("registry", &self.config.registry)
            .finish_non_exhaustive()
    }
}

impl ScrobbleEngine {
    /// Connects an engine to the configured HTTP endpoints.
    pub fn new(config: EngineConfig) -> Self {
        let chain: Arc<dyn ChainApi> =
            Arc::new(RpcChainReader::connect_http(config.rpc_url.clone()));
        let sponsor: Arc<dyn SponsorApi> =
            Arc::new(SponsorClient::connect_http(config.sponsor_url.clone()));
        let funder = config
            .funder_url
            .clone()
            .map(|url| Arc::new(RpcFunder::connect_http(url)) as Arc<dyn Funder>);
        Self::with_parts(config, chain, sponsor, funder)
    }

    /// Builds an engine over injected ports.
    pub fn with_parts(
        config: EngineConfig,
        chain: Arc<dyn ChainApi>,
        sponsor: Arc<dyn SponsorApi>,
        funder: Option<Arc<dyn Funder>>,
    ) -> Self {
        Self {
            probe: CapabilityProbe::new(chain.clone()),
            config,
            chain,
            sponsor,
            funder,
            bids: BidMemory::new(),
            metrics: EngineMetrics::default(),
            submit_lock: Mutex::new(()),
            verified_chain: OnceLock::new(),
        }
    }

    /// Records a play event on chain.
    ///
    /// Selects the register-and-record call for tracks the registry does
    /// not know yet and the plain record call otherwise, then submits
    /// through the sponsored path with self-paid fallback, rotating signers
    /// per the account's fallback ladder. The returned result is explicit
    /// about success or failure either way.
    #[instrument(skip_all, fields(wallet = %account.wallet, title = %event.title))]
    pub async fn submit_play(
        &self,
        event: &PlayEvent,
        account: &SubmitterAccount,
    ) -> SubmissionResult {
        let started = tokio::time::Instant::now();
        let _guard = self.submit_lock.lock().await;

        let identity = match event.identity() {
            Ok(identity) => identity,
            Err(err) => {
                warn!(%err, "rejected play event");
                return SubmissionResult::failure(&err, None, false);
            }
        };
        let track_id = identity.id;

        if let Err(err) = self.ensure_expected_chain().await {
            return SubmissionResult::failure(&err, Some(track_id), false);
        }

        let registered = match self.is_registered(track_id).await {
            Ok(registered) => registered,
            Err(err) => {
                warn!(%err, "registration check failed");
                return SubmissionResult::failure(&err, Some(track_id), false);
            }
        };
        let used_register_path = !registered;

        let input = if registered {
            scrobbleBatchCall {
                user: account.wallet,
                trackIds: vec![track_id],
                timestamps: vec![event.played_at_sec],
            }
            .abi_encode()
        } else {
            registerAndScrobbleBatchCall {
                user: account.wallet,
                regKinds: vec![identity.kind],
                regPayloads: vec![identity.payload],
                titles: vec![identity.title.clone()],
                artists: vec![identity.artist.clone()],
                albums: vec![identity.album.clone()],
                durations: vec![event.duration_sec],
                trackIds: vec![track_id],
                timestamps: vec![event.played_at_sec],
            }
            .abi_encode()
        };
        let calls =
            vec![Call { to: self.config.registry, value: U256::ZERO, input: input.into() }];
        let gas_floor =
            if registered { GAS_LIMIT_RECORD_MIN } else { GAS_LIMIT_REGISTER_AND_RECORD_MIN };

        info!(%track_id, used_register_path, "submitting play event");

        match self.execute_with_signer_policy(account, calls, gas_floor).await {
            Ok(submission) => {
                self.metrics.confirmed.increment(1);
                self.metrics.confirmation_time.record(started.elapsed().as_millis() as f64);
                info!(tx_hash = %submission.tx_hash, "play event confirmed");
                SubmissionResult {
                    success: true,
                    tx_hash: Some(submission.tx_hash),
                    error: None,
                    used_self_pay_fallback: submission.used_self_pay,
                    used_register_path,
                    confirmed: true,
                    track_id: Some(track_id),
                }
            }
            Err(err) => {
                self.metrics.failed.increment(1);
                warn!(%err, "play event submission failed");
                SubmissionResult::failure(&err, Some(track_id), used_register_path)
            }
        }
    }

    /// Records a cover-art content reference for a track, returning the
    /// reference that ended up resolved on chain.
    ///
    /// The optional setter's presence is probed before use; a reference
    /// already on chain wins over the one supplied.
    pub async fn sync_track_cover(
        &self,
        track_id: B256,
        cover_ref: &str,
        account: &SubmitterAccount,
    ) -> Result<String, EngineError> {
        let cover_ref = validate_content_ref(cover_ref, "cover reference")?;
        let _guard = self.submit_lock.lock().await;
        self.ensure_expected_chain().await?;

        if !self.probe.supports(self.config.registry, setTrackCoverForCall::SELECTOR).await? {
            return Err(EngineError::MissingCapability {
                contract: self.config.registry,
                function: "setTrackCoverFor(address,bytes32,string)",
            });
        }

        if let Some(existing) = self.read_cover_ref(track_id).await? {
            info!(%track_id, existing, "cover reference already on chain");
            return Ok(existing);
        }

        let input = setTrackCoverForCall {
            user: account.wallet,
            trackId: track_id,
            coverRef: cover_ref.clone(),
        }
        .abi_encode();
        let calls =
            vec![Call { to: self.config.registry, value: U256::ZERO, input: input.into() }];

        let submission =
            self.execute_with_signer_policy(account, calls, GAS_LIMIT_SET_COVER_MIN).await?;
        info!(tx_hash = %submission.tx_hash, %track_id, "cover reference recorded");

        // Read-back is diagnostic only; the submitted reference stands if
        // it fails.
        match self.read_cover_ref(track_id).await {
            Ok(Some(resolved)) => Ok(resolved),
            Ok(None) => Ok(cover_ref),
            Err(err) => {
                warn!(%err, "post-confirmation cover read-back failed");
                Ok(cover_ref)
            }
        }
    }

    /// Records a lyrics content reference for a track, returning the
    /// reference that ended up resolved on chain.
    pub async fn sync_track_lyrics(
        &self,
        track_id: B256,
        lyrics_ref: &str,
        account: &SubmitterAccount,
    ) -> Result<String, EngineError> {
        let lyrics_ref = validate_content_ref(lyrics_ref, "lyrics reference")?;
        let _guard = self.submit_lock.lock().await;
        self.ensure_expected_chain().await?;

        if !self.probe.supports(self.config.registry, setTrackLyricsForCall::SELECTOR).await? {
            return Err(EngineError::MissingCapability {
                contract: self.config.registry,
                function: "setTrackLyricsFor(address,bytes32,string)",
            });
        }

        if let Some(existing) = self.read_lyrics_ref(track_id).await? {
            info!(%track_id, existing, "lyrics reference already on chain");
            return Ok(existing);
        }

        let input = setTrackLyricsForCall {
            user: account.wallet,
            trackId: track_id,
            lyricsRef: lyrics_ref.clone(),
        }
        .abi_encode();
        let calls =
            vec![Call { to: self.config.registry, value: U256::ZERO, input: input.into() }];

        let submission =
            self.execute_with_signer_policy(account, calls, GAS_LIMIT_SET_LYRICS_MIN).await?;
        info!(tx_hash = %submission.tx_hash, %track_id, "lyrics reference recorded");

        match self.read_lyrics_ref(track_id).await {
            Ok(Some(resolved)) => Ok(resolved),
            Ok(None) => Ok(lyrics_ref),
            Err(err) => {
                warn!(%err, "post-confirmation lyrics read-back failed");
                Ok(lyrics_ref)
            }
        }
    }

    /// Runs one submission through the account's signer fallback ladder:
    /// session key first, one retry on transient failures, a session-key
    /// refresh on authorization failures, and the interactive signer when
    /// the session path stays rejected.
    async fn execute_with_signer_policy(
        &self,
        account: &SubmitterAccount,
        calls: Vec<Call>,
        gas_floor: u64,
    ) -> Result<SessionCallSubmission, EngineError> {
        let orchestrator = self.orchestrator();
        let session = account.session.as_ref().filter(|session| !session.is_expired());

        if let Some(session) = session {
            let mut last_error = match orchestrator
                .execute(
                    account.wallet,
                    calls.clone(),
                    gas_floor,
                    session.as_ref(),
                    session.key_authorization(),
                )
                .await
            {
                Ok(done) => return Ok(done),
                Err(err) => err,
            };

            match last_error.class() {
                FailureClass::Fatal => return Err(last_error),
                FailureClass::Transient => {
                    warn!(error = %last_error, "transient failure, retrying with the same signer");
                    return orchestrator
                        .execute(
                            account.wallet,
                            calls,
                            gas_floor,
                            session.as_ref(),
                            session.key_authorization(),
                        )
                        .await;
                }
                FailureClass::Authorization => {
                    if let Some(refresher) = &account.refresher {
                        warn!(error = %last_error, "authorization failure, refreshing session key");
                        self.metrics.session_key_refreshes.increment(1);
                        match refresher.refresh().await {
                            Ok(fresh) => {
                                match orchestrator
                                    .execute(
                                        account.wallet,
                                        calls.clone(),
                                        gas_floor,
                                        &fresh,
                                        fresh.key_authorization(),
                                    )
                                    .await
                                {
                                    Ok(done) => return Ok(done),
                                    Err(err) if matches!(err.class(), FailureClass::Fatal) => {
                                        return Err(err);
                                    }
                                    Err(err) => last_error = err,
                                }
                            }
                            Err(err) => warn!(%err, "session key refresh failed"),
                        }
                    }

                    let Some(interactive) = account.interactive.as_ref() else {
                        return Err(last_error);
                    };
                    warn!("session path exhausted, falling back to the interactive signer");
                    return orchestrator
                        .execute(
                            account.wallet,
                            calls,
                            gas_floor,
                            interactive.as_ref(),
                            interactive.key_authorization(),
                        )
                        .await;
                }
            }
        }

        let Some(interactive) = account.interactive.as_ref() else {
            return Err(EngineError::InvalidInput(
                "account has no usable signing key".to_string(),
            ));
        };
        orchestrator
            .execute(
                account.wallet,
                calls,
                gas_floor,
                interactive.as_ref(),
                interactive.key_authorization(),
            )
            .await
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator {
            chain: self.chain.as_ref(),
            sponsor: self.sponsor.as_ref(),
            funder: self.funder.as_deref(),
            bids: &self.bids,
            metrics: &self.metrics,
            config: &self.config,
        }
    }

    /// Verifies once that the connected node serves the configured chain.
    async fn ensure_expected_chain(&self) -> Result<(), EngineError> {
        if self.verified_chain.get().is_some() {
            return Ok(());
        }
        let actual = self.chain.chain_id().await?;
        if actual != self.config.chain_id {
            return Err(EngineError::WrongChain { expected: self.config.chain_id, actual });
        }
        let _ = self.verified_chain.set(actual);
        Ok(())
    }

    async fn is_registered(&self, track_id: B256) -> Result<bool, EngineError> {
        let data = isRegisteredCall { trackId: track_id }.abi_encode();
        let answer = self.chain.call(self.config.registry, data.into()).await?;
        decode_is_registered(&answer)
    }

    async fn read_cover_ref(&self, track_id: B256) -> Result<Option<String>, EngineError> {
        let data = getTrackCall { trackId: track_id }.abi_encode();
        let answer = self.chain.call(self.config.registry, data.into()).await?;
        decode_cover_ref(&answer)
    }

    async fn read_lyrics_ref(&self, track_id: B256) -> Result<Option<String>, EngineError> {
        let data = getTrackLyricsCall { trackId: track_id }.abi_encode();
        let answer = self.chain.call(self.config.registry, data.into()).await?;
        decode_lyrics_ref(&answer)
    }
}

/// Trims and length-checks a caller-supplied content reference.
fn validate_content_ref(reference: &str, label: &str) -> Result<String, EngineError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(EngineError::InvalidInput(format!("{label} is empty")));
    }
    if reference.len() > MAX_CONTENT_REF_BYTES {
        return Err(EngineError::InvalidInput(format!(
            "{label} exceeds {MAX_CONTENT_REF_BYTES} bytes ({})",
            reference.len()
        )));
    }
    Ok(reference.to_string())
}
