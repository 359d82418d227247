//! Remote threshold-custody signer.

use alloy::{
    primitives::{Address, B256},
    rpc::client::{ClientBuilder, RpcClient},
};
use serde::Serialize;
use url::Url;

use super::{SignerError, SignerKind, SigningKey};
use crate::signature::RecoverableSignature;

/// Default JSON-RPC method exposed by the custody service for prehash
/// signing.
const DEFAULT_SIGN_METHOD: &str = "custody_signDigest";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignDigestRequest<'a> {
    key_ref: &'a str,
    digest: B256,
}

/// Signer whose private operation runs as a threshold-signing action on a
/// remote custody service.
///
/// The service's response schema is not trusted: whatever combination of
/// `signature`/`r`/`s`/`recid`/`v` comes back is parsed, canonicalized and
/// recovery-resolved locally. Unlike the session key, every signature here
/// is a network round-trip and can fail accordingly.
#[derive(Debug, Clone)]
pub struct CustodialSigner {
    client: RpcClient,
    method: String,
    key_ref: String,
    address: Address,
}

impl CustodialSigner {
    /// Connects to a custody service over HTTP.
    pub fn connect_http(endpoint: Url, key_ref: impl Into<String>, address: Address) -> Self {
        Self {
            client: ClientBuilder::default().http(endpoint),
            method: DEFAULT_SIGN_METHOD.to_string(),
            key_ref: key_ref.into(),
            address,
        }
    }

    /// Overrides the signing method name for non-standard deployments.
    pub fn with_sign_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

#[async_trait::async_trait]
impl SigningKey for CustodialSigner {
    async fn sign_digest(&self, digest: B256) -> Result<RecoverableSignature, SignerError> {
        let request = SignDigestRequest { key_ref: &self.key_ref, digest };
        let response: serde_json::Value = self
            .client
            .request(self.method.clone(), (request,))
            .await
            .map_err(|err| SignerError::Backend(err.to_string()))?;

        let signature = RecoverableSignature::from_provider_json(&response)?;
        Ok(signature.canonicalized().resolved_for(&digest, self.address)?)
    }

    fn public_identity(&self) -> Address {
        self.address
    }

    fn kind(&self) -> SignerKind {
        SignerKind::CustodialThreshold
    }
}
