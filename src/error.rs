//! Engine error taxonomy.
//!
//! Provider error text is inspected in exactly one place here
//! ([`Rejection::from_message`]); the rest of the engine only ever looks at
//! typed variants.

use alloy::{
    primitives::{Address, B256},
    transports::{RpcError, TransportErrorKind},
};

use crate::{
    fees::Eip1559Fees,
    signature::SignatureError,
    signers::SignerError,
};

/// What an RPC-level error object means for the submission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A competing transaction with the same identity occupies the
    /// fee-priority slot and the bid was not high enough to replace it.
    /// The only rejection the submit loop retries.
    UnderpricedReplacement,
    /// The key that signed the transaction is not (or no longer) authorized
    /// for the account.
    Unauthorized,
    /// Anything else. Fatal to the attempt.
    Other,
}

impl Rejection {
    /// Classifies an RPC error message.
    ///
    /// Providers phrase rejections differently; these substrings are the
    /// union observed across the endpoints we submit to. All string matching
    /// against provider errors lives in this function.
    fn from_message(message: &str) -> Self {
        let message = message.to_ascii_lowercase();
        if message.contains("replacement transaction underpriced") {
            return Self::UnderpricedReplacement;
        }
        const UNAUTHORIZED_MARKERS: [&str; 5] = [
            "unauthorized",
            "invalid signature",
            "key authorization",
            "unknown key",
            "expired key",
        ];
        if UNAUTHORIZED_MARKERS.iter().any(|marker| message.contains(marker)) {
            return Self::Unauthorized;
        }
        Self::Other
    }
}

/// A classified RPC failure.
///
/// Distinguishes "the endpoint could not be reached" from "the endpoint
/// answered with an RPC-level error object" from "the answer did not parse".
#[derive(Debug, thiserror::Error)]
pub enum RpcFailure {
    /// The endpoint was unreachable or the transport failed mid-request.
    #[error("rpc endpoint unreachable: {0}")]
    Unreachable(String),
    /// The endpoint returned an RPC-level error object.
    #[error("rpc error {code}: {message}")]
    ErrorResponse {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
        /// What the message means for the pipeline.
        rejection: Rejection,
    },
    /// The endpoint's answer was missing or failed to deserialize.
    #[error("rpc response malformed: {0}")]
    Malformed(String),
}

impl RpcFailure {
    /// Classifies a transport-layer error at the RPC boundary.
    pub fn from_transport(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => {
                let message = payload.message.to_string();
                Self::ErrorResponse {
                    code: payload.code,
                    rejection: Rejection::from_message(&message),
                    message,
                }
            }
            RpcError::Transport(kind) => Self::Unreachable(kind.to_string()),
            RpcError::DeserError { err, text } => {
                Self::Malformed(format!("{err}; response text: {text}"))
            }
            RpcError::NullResp => Self::Malformed("unexpected null response".to_string()),
            other => Self::Unreachable(other.to_string()),
        }
    }

    /// Whether this is the one rejection the submit loop is allowed to
    /// retry.
    pub fn is_underpriced_replacement(&self) -> bool {
        matches!(
            self,
            Self::ErrorResponse { rejection: Rejection::UnderpricedReplacement, .. }
        )
    }

    /// Whether this is an authorization-flavored rejection.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::ErrorResponse { rejection: Rejection::Unauthorized, .. })
    }
}

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The connected node serves a different chain than configured.
    #[error("connected node reports chain id {actual}, expected {expected}")]
    WrongChain {
        /// Configured chain id.
        expected: u64,
        /// Chain id reported by the node.
        actual: u64,
    },
    /// The caller handed us unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A classified RPC failure.
    #[error(transparent)]
    Rpc(#[from] RpcFailure),
    /// Returned contract data did not decode.
    #[error("return data decode failed: {0}")]
    Decode(#[from] alloy::sol_types::Error),
    /// Signing failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The transaction was included but reverted. Carries the hash for
    /// operator diagnosis.
    #[error("transaction {tx_hash} reverted on chain")]
    OnChainRevert {
        /// Hash of the reverted transaction.
        tx_hash: B256,
    },
    /// The network no longer knows the transaction at all. The caller must
    /// resubmit from scratch with a fresh expiry.
    #[error("transaction {tx_hash} was dropped before inclusion")]
    DroppedBeforeInclusion {
        /// Hash of the dropped transaction.
        tx_hash: B256,
    },
    /// The transaction is still pending but its validity window lapsed.
    #[error("transaction {tx_hash} not confirmed before expiry")]
    NotConfirmedBeforeExpiry {
        /// Hash of the expired transaction.
        tx_hash: B256,
    },
    /// Every bounded replacement attempt was rejected as underpriced.
    #[error(
        "replacement rejected after {attempts} attempts, last bid was priority {} / max {}",
        last_fees.max_priority_fee_per_gas,
        last_fees.max_fee_per_gas
    )]
    ReplacementRejected {
        /// Total attempts made.
        attempts: u32,
        /// The fee tier of the final rejected attempt.
        last_fees: Eip1559Fees,
    },
    /// The deployed contract does not expose the requested optional
    /// function.
    #[error("contract {contract} does not expose {function}")]
    MissingCapability {
        /// Address of the probed contract.
        contract: Address,
        /// Human-readable function signature.
        function: &'static str,
    },
    /// Anything else.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}

/// Coarse error identity carried in submission results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network mismatch.
    WrongChain,
    /// Caller error.
    InvalidInput,
    /// RPC failure.
    Rpc,
    /// Return data decode failure.
    Decode,
    /// No recovery id candidate matched the expected signer.
    SignatureRecoveryFailed,
    /// The signing key was rejected or is no longer authorized.
    KeyAuthorization,
    /// Included but reverted.
    OnChainRevert,
    /// Dropped before inclusion.
    DroppedBeforeInclusion,
    /// Still pending past its own expiry.
    NotConfirmedBeforeExpiry,
    /// Bounded replacement retries exhausted.
    ReplacementRejected,
    /// Optional contract function not deployed.
    MissingCapability,
    /// Anything else.
    Internal,
}

/// Which recovery policy a failure calls for at the caller-facing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient inclusion problem: retry with the same signer.
    Transient,
    /// Authorization or signature problem: refresh the session key, then
    /// fall back to the interactive signer.
    Authorization,
    /// No retry will help.
    Fatal,
}

impl EngineError {
    /// The coarse identity of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongChain { .. } => ErrorKind::WrongChain,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Rpc(failure) if failure.is_unauthorized() => ErrorKind::KeyAuthorization,
            Self::Rpc(_) => ErrorKind::Rpc,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Signer(SignerError::Signature(SignatureError::RecoveryFailed { .. })) => {
                ErrorKind::SignatureRecoveryFailed
            }
            Self::Signer(SignerError::SessionExpired { .. }) => ErrorKind::KeyAuthorization,
            Self::Signer(_) => ErrorKind::SignatureRecoveryFailed,
            Self::OnChainRevert { .. } => ErrorKind::OnChainRevert,
            Self::DroppedBeforeInclusion { .. } => ErrorKind::DroppedBeforeInclusion,
            Self::NotConfirmedBeforeExpiry { .. } => ErrorKind::NotConfirmedBeforeExpiry,
            Self::ReplacementRejected { .. } => ErrorKind::ReplacementRejected,
            Self::MissingCapability { .. } => ErrorKind::MissingCapability,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Which recovery policy this failure calls for.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::DroppedBeforeInclusion { .. }
            | Self::NotConfirmedBeforeExpiry { .. }
            | Self::ReplacementRejected { .. }
            | Self::Rpc(RpcFailure::Unreachable(_)) => FailureClass::Transient,

            Self::Rpc(failure) if failure.is_unauthorized() => FailureClass::Authorization,
            Self::Signer(SignerError::SessionExpired { .. })
            | Self::Signer(SignerError::Signature(_)) => FailureClass::Authorization,
            Self::Signer(SignerError::Backend(_)) => FailureClass::Transient,

            _ => FailureClass::Fatal,
        }
    }

    /// The transaction hash this error is about, if it got that far.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::OnChainRevert { tx_hash }
            | Self::DroppedBeforeInclusion { tx_hash }
            | Self::NotConfirmedBeforeExpiry { tx_hash } => Some(*tx_hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underpriced_rejection_is_the_only_retryable_one() {
        let underpriced = Rejection::from_message("replacement transaction underpriced");
        assert_eq!(underpriced, Rejection::UnderpricedReplacement);

        for message in ["nonce too low", "txpool is full", "insufficient funds for gas"] {
            assert_eq!(Rejection::from_message(message), Rejection::Other);
        }
    }

    #[test]
    fn authorization_markers_classify_as_unauthorized() {
        for message in [
            "unauthorized key",
            "Invalid signature for sender",
            "bad key authorization blob",
        ] {
            assert_eq!(Rejection::from_message(message), Rejection::Unauthorized);
        }
    }

    #[test]
    fn failure_classes_drive_the_fallback_ladder() {
        let dropped = EngineError::DroppedBeforeInclusion { tx_hash: B256::ZERO };
        assert_eq!(dropped.class(), FailureClass::Transient);

        let unauthorized = EngineError::Rpc(RpcFailure::ErrorResponse {
            code: -32000,
            message: "unauthorized key".into(),
            rejection: Rejection::Unauthorized,
        });
        assert_eq!(unauthorized.class(), FailureClass::Authorization);
        assert_eq!(unauthorized.kind(), ErrorKind::KeyAuthorization);

        let reverted = EngineError::OnChainRevert { tx_hash: B256::ZERO };
        assert_eq!(reverted.class(), FailureClass::Fatal);
        assert_eq!(reverted.tx_hash(), Some(B256::ZERO));
    }
}
