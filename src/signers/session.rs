//! Local session-key signer.

use alloy::{
    primitives::{Address, B256, Bytes},
    signers::{SignerSync, local::PrivateKeySigner},
};
use std::str::FromStr;

use super::{SignerError, SignerKind, SigningKey};
use crate::{signature::RecoverableSignature, utils::unix_now_secs};

/// A short-lived secp256k1 key delegated by the wallet for silent background
/// signing. Key material lives in-process; signing never touches the
/// network.
#[derive(Debug)]
pub struct SessionKeySigner {
    key: PrivateKeySigner,
    expires_at: u64,
    key_authorization: Option<Bytes>,
}

impl SessionKeySigner {
    /// Loads a session key from a hex-encoded private key.
    ///
    /// `key_authorization` is the wallet-signed blob authorizing this key on
    /// the account's keychain; it is attached to the first transaction the
    /// key signs after a refresh and omitted otherwise.
    pub fn from_hex(
        secret: &str,
        expires_at: u64,
        key_authorization: Option<Bytes>,
    ) -> eyre::Result<Self> {
        Ok(Self { key: PrivateKeySigner::from_str(secret.trim())?, expires_at, key_authorization })
    }

    /// Builds a signer around an existing local key.
    pub fn from_signer(
        key: PrivateKeySigner,
        expires_at: u64,
        key_authorization: Option<Bytes>,
    ) -> Self {
        Self { key, expires_at, key_authorization }
    }

    /// Whether the key's validity window has lapsed.
    pub fn is_expired(&self) -> bool {
        unix_now_secs() >= self.expires_at
    }

    /// Unix timestamp after which the key is no longer authorized.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

#[async_trait::async_trait]
impl SigningKey for SessionKeySigner {
    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, SignerError> {
        if self.is_expired() {
            return Err(SignerError::SessionExpired { expires_at: self.expires_at });
        }
        let signature = self.key.sign_hash_sync(&digest)?;
        Ok(RecoverableSignature::new(
            B256::from(signature.r()),
            B256::from(signature.s()),
            signature.v() as u8,
        ))
    }

    fn public_identity(&self) -> Address {
        self.key.address()
    }

    fn kind(&self) -> SignerKind {
        SignerKind::SessionKey
    }

    fn key_authorization(&self) -> Option<Bytes> {
        self.key_authorization.clone()
    }
}

/// Mints a replacement session key once the current one is rejected.
///
/// Implementations typically round-trip through the wallet's interactive
/// signer to authorize the fresh key, so a refresh may take user-facing
/// time.
#[async_trait::async_trait]
pub trait SessionKeyRefresher: std::fmt::Debug + Send + Sync {
    /// Produces a freshly-authorized session key.
    async fn refresh(&self) -> eyre::Result<SessionKeySigner>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_signer(expires_at: u64) -> SessionKeySigner {
        SessionKeySigner::from_signer(PrivateKeySigner::random(), expires_at, None)
    }

    #[tokio::test]
    async fn signs_and_recovers_its_own_identity() {
        let signer = fresh_signer(u64::MAX);
        let digest = B256::repeat_byte(0xab);

        let signature = signer.sign_digest(digest).await.unwrap();
        assert_eq!(signature.canonicalized(), signature);
        assert_eq!(signature.recover_address(&digest), Some(signer.public_identity()));
    }

    #[tokio::test]
    async fn refuses_to_sign_after_expiry() {
        let signer = fresh_signer(1);
        let err = signer.sign_digest(B256::ZERO).await.unwrap_err();
        assert!(matches!(err, SignerError::SessionExpired { expires_at: 1 }));
    }
}
