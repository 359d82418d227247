//! Transaction digest signers.
//!
//! Three backends produce signatures over the same digest contract: a local
//! session key (silent, cannot fail on network), a platform passkey
//! authenticator (interactive), and a remote threshold-custody service. All
//! of them resolve to a low-S secp256k1 signature verifiable against the
//! signer's own address.

mod session;
pub use session::{SessionKeyRefresher, SessionKeySigner};

mod passkey;
pub use passkey::{PasskeyAuthenticator, PasskeySigner};

mod custodial;
pub use custodial::CustodialSigner;

use alloy::primitives::{Address, B256, Bytes};

use crate::signature::{RecoverableSignature, SignatureError};

/// Where a signer's private operation happens. Drives logging and the
/// caller-facing fallback policy, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    /// Local short-lived session key.
    SessionKey,
    /// Platform passkey authenticator.
    Passkey,
    /// Remote threshold-custody service.
    CustodialThreshold,
}

/// Errors produced while signing a digest.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The session key's validity window has lapsed.
    #[error("session key expired at {expires_at}")]
    SessionExpired {
        /// Unix timestamp after which the key is no longer authorized.
        expires_at: u64,
    },
    /// The signing backend could not be reached or answered garbage.
    #[error("signing backend failed: {0}")]
    Backend(String),
    /// The returned signature could not be parsed or resolved.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// A local signing operation failed.
    #[error(transparent)]
    Local(#[from] alloy::signers::Error),
}

/// A signer that produces recoverable signatures over 32-byte digests.
#[async_trait::async_trait]
pub trait SigningKey: std::fmt::Debug + Send + Sync {
    /// Signs the digest. The result is always low-S canonical and its
    /// recovery id recovers [`Self::public_identity`].
    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, SignerError>;

    /// The address this signer's signatures recover to.
    fn public_identity(&self) -> Address;

    /// Which backend this is.
    fn kind(&self) -> SignerKind;

    /// Opaque key-authorization blob to attach to the next transaction, if
    /// the key needs to introduce itself to the account's keychain.
    fn key_authorization(&self) -> Option<Bytes> {
        None
    }
}
