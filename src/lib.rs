//! # Scrobble Engine
//!
//! Client-side engine that turns "record this play event" into a confirmed
//! on-chain transaction, despite fee markets, dropped transactions,
//! expiring validity windows and relay failures.
//!
//! The sponsored relay path is tried first (zero cost to the sender); on
//! relay failure the engine funds the sender best-effort and resubmits
//! self-paid. Transactions carry an expiring nonce: a short validity window
//! replaces the sequential counter, so stuck-nonce recovery is structurally
//! unnecessary. Signing is polymorphic over a silent session key, a
//! platform passkey and a remote threshold-custody service, with a fallback
//! ladder that refreshes or rotates signers on authorization failures.

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fees;
pub mod metrics;
pub mod probe;
pub mod provider;
pub mod signature;
pub mod signers;
pub mod transactions;
pub mod types;

mod utils;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::EngineConfig;
pub use engine::{ScrobbleEngine, SubmissionResult, SubmitterAccount};
pub use error::{EngineError, ErrorKind, FailureClass, RpcFailure};
pub use fees::{BidMemory, Eip1559Fees};
pub use provider::{ChainApi, Funder, ReceiptSummary, SponsorApi};
pub use signature::RecoverableSignature;
pub use signers::{
    CustodialSigner, PasskeyAuthenticator, PasskeySigner, SessionKeyRefresher, SessionKeySigner,
    SignerKind, SigningKey,
};
pub use transactions::SessionCallSubmission;
pub use types::{Call, FeeMode, PlayEvent, UnsignedTransaction};
