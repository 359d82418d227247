//! Runtime capability probing for optional contract functions.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tracing::debug;

use crate::{error::RpcFailure, provider::ChainApi};

/// Checks whether a deployed contract exposes an optional function by
/// scanning its runtime bytecode for the function selector, so a caller
/// never invokes a function the deployed contract does not support.
///
/// A selector scan can false-positive on matching constant bytes, but the
/// deployed registry family is known to keep selectors in its dispatch
/// table. Results are memoized per contract/selector for the process
/// lifetime; re-deployments at the same address require a restart to be
/// picked up.
#[derive(Debug)]
pub struct CapabilityProbe {
    chain: Arc<dyn ChainApi>,
    memo: DashMap<(Address, [u8; 4]), bool>,
}

impl CapabilityProbe {
    /// Creates a probe reading code through `chain`.
    pub fn new(chain: Arc<dyn ChainApi>) -> Self {
        Self { chain, memo: DashMap::new() }
    }

    /// Whether `contract` exposes the function with `selector`.
    pub async fn supports(
        &self,
        contract: Address,
        selector: [u8; 4],
    ) -> Result<bool, RpcFailure> {
        if let Some(memoized) = self.memo.get(&(contract, selector)) {
            return Ok(*memoized);
        }

        let code = self.chain.get_code(contract).await?;
        let supports =
            !code.is_empty() && code.windows(4).any(|window| window == selector.as_slice());
        debug!(%contract, selector = ?selector, supports, "capability probe");

        self.memo.insert((contract, selector), supports);
        Ok(supports)
    }
}
