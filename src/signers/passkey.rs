//! Passkey-backed signer.

use alloy::primitives::{Address, B256};
use std::sync::Arc;

use super::{SignerError, SignerKind, SigningKey};
use crate::signature::RecoverableSignature;

/// Bridge to the platform authenticator holding the wallet credential.
///
/// The authenticator prompts the user, signs the digest, and returns the
/// provider-shaped JSON it got from the platform; parsing and recovery-id
/// resolution happen on our side. Expect interactive latency.
#[async_trait::async_trait]
pub trait PasskeyAuthenticator: std::fmt::Debug + Send + Sync {
    /// Prompts the authenticator to sign `digest`.
    async fn sign_digest(&self, digest: B256) -> eyre::Result<serde_json::Value>;
}

/// Signer backed by a platform passkey.
#[derive(Debug, Clone)]
pub struct PasskeySigner {
    authenticator: Arc<dyn PasskeyAuthenticator>,
    address: Address,
}

impl PasskeySigner {
    /// Creates a signer for the credential controlling `address`.
    pub fn new(authenticator: Arc<dyn PasskeyAuthenticator>, address: Address) -> Self {
        Self { authenticator, address }
    }
}

#[async_trait::async_trait]
impl SigningKey for PasskeySigner {
    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, SignerError> {
        let response = self
            .authenticator
            .sign_digest(digest)
            .await
            .map_err(|err| SignerError::Backend(err.to_string()))?;
        let signature = RecoverableSignature::from_provider_json(&response)?;
        Ok(signature.canonicalized().resolved_for(&digest, self.address)?)
    }

    fn public_identity(&self) -> Address {
        self.address
    }

    fn kind(&self) -> SignerKind {
        SignerKind::Passkey
    }
}
