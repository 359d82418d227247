//! Scripted mock ports for unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy::primitives::{Address, B256, Bytes};

use crate::{
    error::{Rejection, RpcFailure},
    provider::{ChainApi, Funder, ReceiptSummary, SponsorApi},
};

/// Scripted [`ChainApi`] implementation.
///
/// Per-method response queues are consumed front to back; queues with a
/// sensible "steady state" (pending receipt, unknown transaction, accepted
/// send) fall back to it when empty so long-polling loops do not need
/// endless scripting. `eth_call` has no safe default and panics when
/// unscripted.
#[derive(Debug)]
pub(crate) struct MockChain {
    pub chain_id: u64,
    pub gas_price: u128,
    pub estimate: Mutex<Result<u64, RpcFailure>>,
    code: Mutex<HashMap<Address, Bytes>>,
    call_results: Mutex<VecDeque<Result<Bytes, RpcFailure>>>,
    send_results: Mutex<VecDeque<Result<B256, RpcFailure>>>,
    receipts: Mutex<VecDeque<Result<Option<ReceiptSummary>, RpcFailure>>>,
    known: Mutex<VecDeque<bool>>,
    sent_raw: Mutex<Vec<Bytes>>,
    code_reads: AtomicUsize,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: 5_000_000,
            estimate: Mutex::new(Ok(100_000)),
            code: Mutex::new(HashMap::new()),
            call_results: Mutex::new(VecDeque::new()),
            send_results: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(VecDeque::new()),
            known: Mutex::new(VecDeque::new()),
            sent_raw: Mutex::new(Vec::new()),
            code_reads: AtomicUsize::new(0),
        }
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.code.lock().unwrap().insert(address, code);
    }

    pub fn push_call(&self, result: Result<Bytes, RpcFailure>) {
        self.call_results.lock().unwrap().push_back(result);
    }

    pub fn push_send(&self, result: Result<B256, RpcFailure>) {
        self.send_results.lock().unwrap().push_back(result);
    }

    pub fn push_receipt(&self, result: Result<Option<ReceiptSummary>, RpcFailure>) {
        self.receipts.lock().unwrap().push_back(result);
    }

    pub fn push_known(&self, known: bool) {
        self.known.lock().unwrap().push_back(known);
    }

    pub fn sent_count(&self) -> usize {
        self.sent_raw.lock().unwrap().len()
    }

    pub fn sent_raw(&self) -> Vec<Bytes> {
        self.sent_raw.lock().unwrap().clone()
    }

    pub fn code_reads(&self) -> usize {
        self.code_reads.load(Ordering::SeqCst)
    }
}

/// An underpriced-replacement rejection, as a provider would phrase it.
pub(crate) fn underpriced_rejection() -> RpcFailure {
    RpcFailure::ErrorResponse {
        code: -32000,
        message: "replacement transaction underpriced".into(),
        rejection: Rejection::UnderpricedReplacement,
    }
}

/// A generic fatal RPC rejection.
pub(crate) fn fatal_rejection(message: &str) -> RpcFailure {
    RpcFailure::ErrorResponse {
        code: -32000,
        message: message.into(),
        rejection: Rejection::Other,
    }
}

/// An authorization-flavored rejection.
pub(crate) fn unauthorized_rejection() -> RpcFailure {
    RpcFailure::ErrorResponse {
        code: -32000,
        message: "unauthorized key".into(),
        rejection: Rejection::Unauthorized,
    }
}

#[async_trait::async_trait]
impl ChainApi for MockChain {
    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(self.chain_id)
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes, RpcFailure> {
        self.call_results.lock().unwrap().pop_front().expect("unscripted eth_call")
    }

    async fn estimate_gas(
        &self,
        _from: Address,
        _to: Address,
        _data: Bytes,
    ) -> Result<u64, RpcFailure> {
        match &*self.estimate.lock().unwrap() {
            Ok(estimate) => Ok(*estimate),
            Err(_) => Err(fatal_rejection("execution reverted during estimation")),
        }
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, RpcFailure> {
        self.code_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.code.lock().unwrap().get(&address).cloned().unwrap_or_default())
    }

    async fn gas_price(&self) -> Result<u128, RpcFailure> {
        Ok(self.gas_price)
    }

    async fn transaction_receipt(
        &self,
        _tx_hash: B256,
    ) -> Result<Option<ReceiptSummary>, RpcFailure> {
        self.receipts.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn has_transaction(&self, _tx_hash: B256) -> Result<bool, RpcFailure> {
        Ok(self.known.lock().unwrap().pop_front().unwrap_or(false))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256, RpcFailure> {
        self.sent_raw.lock().unwrap().push(raw);
        self.send_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(B256::repeat_byte(0xf0)))
    }
}

/// Scripted [`SponsorApi`]: co-signs by passing the envelope through, or
/// fails every request with the scripted error.
#[derive(Debug, Default)]
pub(crate) struct MockSponsor {
    failure: Mutex<Option<String>>,
    cosigned: AtomicUsize,
}

impl MockSponsor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self { failure: Mutex::new(Some(message.to_string())), cosigned: AtomicUsize::new(0) }
    }

    pub fn cosigned(&self) -> usize {
        self.cosigned.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SponsorApi for MockSponsor {
    async fn cosign_raw_transaction(&self, raw_with_hint: Bytes) -> Result<Bytes, RpcFailure> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(fatal_rejection(&message));
        }
        self.cosigned.fetch_add(1, Ordering::SeqCst);
        Ok(raw_with_hint)
    }
}

/// Counting [`Funder`].
#[derive(Debug, Default)]
pub(crate) struct MockFunder {
    calls: AtomicUsize,
}

impl MockFunder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Funder for MockFunder {
    async fn fund(&self, _beneficiary: Address) -> eyre::Result<Option<B256>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(B256::repeat_byte(0xfa)))
    }
}
