//! Network ports: chain reads, sponsor co-signing, and best-effort funding.
//!
//! The chain is an opaque JSON-RPC endpoint and the sponsor a JSON-RPC
//! relay next to it. Everything network-shaped is a trait here so tests can
//! script it; the production implementations ride on an alloy [`RpcClient`]
//! with the same retry layer on every connection.

use alloy::{
    primitives::{Address, B256, Bytes, U64, U128},
    rpc::client::{ClientBuilder, RpcClient},
    transports::layers::RetryBackoffLayer,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::RpcFailure;

/// Retry layer used for every outbound connection: up to 10 retries with an
/// 800ms backoff, no compute-unit throttling.
const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// A mined transaction receipt, reduced to what the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// Hash of the mined transaction.
    pub transaction_hash: B256,
    /// Whether execution succeeded.
    pub status_ok: bool,
    /// Block the transaction landed in.
    pub block_number: Option<u64>,
    /// Gas consumed.
    pub gas_used: Option<u64>,
}

impl ReceiptSummary {
    /// A successful receipt for `tx_hash`.
    pub fn success(tx_hash: B256) -> Self {
        Self { transaction_hash: tx_hash, status_ok: true, block_number: None, gas_used: None }
    }

    /// A reverted receipt for `tx_hash`.
    pub fn reverted(tx_hash: B256) -> Self {
        Self { status_ok: false, ..Self::success(tx_hash) }
    }
}

/// Read and submission operations against the chain's JSON-RPC endpoint.
///
/// Every operation fails with a classified [`RpcFailure`]; no raw transport
/// errors or error strings escape this boundary.
#[async_trait::async_trait]
pub trait ChainApi: std::fmt::Debug + Send + Sync {
    /// `eth_chainId`.
    async fn chain_id(&self) -> Result<u64, RpcFailure>;
    /// `eth_call` against `to` with `data`.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcFailure>;
    /// `eth_estimateGas` for a call from `from` to `to`.
    async fn estimate_gas(&self, from: Address, to: Address, data: Bytes)
    -> Result<u64, RpcFailure>;
    /// `eth_getCode` at the latest block.
    async fn get_code(&self, address: Address) -> Result<Bytes, RpcFailure>;
    /// `eth_gasPrice`.
    async fn gas_price(&self) -> Result<u128, RpcFailure>;
    /// `eth_getTransactionReceipt`; `None` while the transaction is
    /// pending (or unknown).
    async fn transaction_receipt(&self, tx_hash: B256)
    -> Result<Option<ReceiptSummary>, RpcFailure>;
    /// Whether the network still knows the transaction at all
    /// (`eth_getTransactionByHash` existence check).
    async fn has_transaction(&self, tx_hash: B256) -> Result<bool, RpcFailure>;
    /// `eth_sendRawTransaction`.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcFailure>;
}

/// The sponsoring relay's co-signing endpoint.
#[async_trait::async_trait]
pub trait SponsorApi: std::fmt::Debug + Send + Sync {
    /// Hands a sender-signed envelope (with its sender hint) to the relay
    /// and returns the fee-payer-signed envelope ready for broadcast.
    async fn cosign_raw_transaction(&self, raw_with_hint: Bytes) -> Result<Bytes, RpcFailure>;
}

/// Best-effort funding of a sender address, used before falling back to
/// self-paid submission.
#[async_trait::async_trait]
pub trait Funder: std::fmt::Debug + Send + Sync {
    /// Requests funds for `beneficiary`. Returns the funding transaction
    /// hash when the backend reports one.
    async fn fund(&self, beneficiary: Address) -> eyre::Result<Option<B256>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    data: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    block_number: Option<U64>,
    gas_used: Option<U64>,
}

impl From<RawReceipt> for ReceiptSummary {
    fn from(raw: RawReceipt) -> Self {
        Self {
            transaction_hash: raw.transaction_hash,
            // Pre-Byzantium receipts have no status field; absence means
            // the node could not tell us it failed.
            status_ok: raw.status.is_none_or(|status| status != U64::ZERO),
            block_number: raw.block_number.map(|n| n.to::<u64>()),
            gas_used: raw.gas_used.map(|n| n.to::<u64>()),
        }
    }
}

/// [`ChainApi`] over a JSON-RPC HTTP endpoint.
#[derive(Debug, Clone)]
pub struct RpcChainReader {
    client: RpcClient,
}

impl RpcChainReader {
    /// Connects to a JSON-RPC endpoint over HTTP.
    pub fn connect_http(endpoint: Url) -> Self {
        Self { client: ClientBuilder::default().layer(RETRY_LAYER).http(endpoint) }
    }
}

#[async_trait::async_trait]
impl ChainApi for RpcChainReader {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        let id: U64 = self
            .client
            .request_noparams("eth_chainId")
            .await
            .map_err(RpcFailure::from_transport)?;
        Ok(id.to::<u64>())
    }

    #[instrument(skip_all, fields(%to))]
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcFailure> {
        self.client
            .request("eth_call", (CallRequest { from: None, to, data }, "latest"))
            .await
            .map_err(RpcFailure::from_transport)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<u64, RpcFailure> {
        let estimate: U64 = self
            .client
            .request("eth_estimateGas", (CallRequest { from: Some(from), to, data },))
            .await
            .map_err(RpcFailure::from_transport)?;
        Ok(estimate.to::<u64>())
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, RpcFailure> {
        self.client
            .request("eth_getCode", (address, "latest"))
            .await
            .map_err(RpcFailure::from_transport)
    }

    async fn gas_price(&self) -> Result<u128, RpcFailure> {
        let price: U128 = self
            .client
            .request_noparams("eth_gasPrice")
            .await
            .map_err(RpcFailure::from_transport)?;
        Ok(price.to::<u128>())
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, RpcFailure> {
        let receipt: Option<RawReceipt> = self
            .client
            .request("eth_getTransactionReceipt", (tx_hash,))
            .await
            .map_err(RpcFailure::from_transport)?;
        Ok(receipt.map(Into::into))
    }

    async fn has_transaction(&self, tx_hash: B256) -> Result<bool, RpcFailure> {
        let tx: Option<serde_json::Value> = self
            .client
            .request("eth_getTransactionByHash", (tx_hash,))
            .await
            .map_err(RpcFailure::from_transport)?;
        Ok(tx.is_some())
    }

    #[instrument(skip_all)]
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcFailure> {
        let tx_hash = self
            .client
            .request("eth_sendRawTransaction", (raw,))
            .await
            .map_err(RpcFailure::from_transport)?;
        debug!(%tx_hash, "raw transaction accepted");
        Ok(tx_hash)
    }
}

/// [`SponsorApi`] over the relay's JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct SponsorClient {
    client: RpcClient,
}

impl SponsorClient {
    /// Connects to the sponsoring relay over HTTP.
    pub fn connect_http(endpoint: Url) -> Self {
        Self { client: ClientBuilder::default().layer(RETRY_LAYER).http(endpoint) }
    }
}

#[async_trait::async_trait]
impl SponsorApi for SponsorClient {
    #[instrument(skip_all)]
    async fn cosign_raw_transaction(&self, raw_with_hint: Bytes) -> Result<Bytes, RpcFailure> {
        self.client
            .request("eth_signRawTransaction", (raw_with_hint,))
            .await
            .map_err(RpcFailure::from_transport)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct FundRequest {
    address: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundResponse {
    #[serde(default)]
    transaction_hash: Option<B256>,
}

/// [`Funder`] backed by a faucet-style JSON-RPC method.
#[derive(Debug, Clone)]
pub struct RpcFunder {
    client: RpcClient,
    method: String,
}

impl RpcFunder {
    /// Connects to a funding endpoint over HTTP.
    pub fn connect_http(endpoint: Url) -> Self {
        Self {
            client: ClientBuilder::default().layer(RETRY_LAYER).http(endpoint),
            method: "wallet_addFaucetFunds".to_string(),
        }
    }

    /// Overrides the funding method name.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

#[async_trait::async_trait]
impl Funder for RpcFunder {
    async fn fund(&self, beneficiary: Address) -> eyre::Result<Option<B256>> {
        let response: FundResponse = self
            .client
            .request(self.method.clone(), (FundRequest { address: beneficiary },))
            .await?;
        Ok(response.transaction_hash)
    }
}
