//! EIP-1559 fee bidding.
//!
//! Fee pairs start from the network-suggested gas price, are raised to the
//! relay minimum floor when the relay pays, and are raised again to the
//! highest bid this process has ever made for the sending address, so a
//! second transaction for the same address never under-bids an in-flight one.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::constants::{ONE_GWEI, RELAY_MIN_MAX_FEE_PER_GAS, RELAY_MIN_PRIORITY_FEE_PER_GAS};

/// Multiplies `value` by `numerator / denominator`, saturating at
/// [`u128::MAX`] instead of overflowing.
pub const fn saturating_scale(value: u128, numerator: u128, denominator: u128) -> u128 {
    match value.checked_mul(numerator) {
        Some(scaled) => scaled / denominator,
        None => u128::MAX,
    }
}

/// A priority fee / max fee pair.
///
/// Invariant: `max_fee_per_gas >= max_priority_fee_per_gas + 1`. Every
/// constructor and combinator below re-establishes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip1559Fees {
    /// Maximum priority fee per gas, in wei.
    pub max_priority_fee_per_gas: u128,
    /// Maximum total fee per gas, in wei.
    pub max_fee_per_gas: u128,
}

impl Eip1559Fees {
    /// Shapes a suggested fee pair out of the node's `eth_gasPrice` answer.
    ///
    /// The priority fee is a fifth of the gas price, floored to the relay
    /// minimum; the max fee is quadruple the gas price so that short base fee
    /// spikes within the validity window do not price the transaction out.
    pub fn from_gas_price(gas_price: u128) -> Self {
        let priority = (gas_price / 5).max(RELAY_MIN_PRIORITY_FEE_PER_GAS);
        let max_fee = saturating_scale(gas_price, 4, 1).max(gas_price.saturating_add(priority));
        Self { max_priority_fee_per_gas: priority, max_fee_per_gas: max_fee }.ensure_spread()
    }

    /// Raises the max fee so it exceeds the priority fee by at least one wei.
    pub fn ensure_spread(mut self) -> Self {
        self.max_fee_per_gas =
            self.max_fee_per_gas.max(self.max_priority_fee_per_gas.saturating_add(1));
        self
    }

    /// Field-wise maximum of `self` and `floor`.
    pub fn with_floor(self, floor: Self) -> Self {
        Self {
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .max(floor.max_priority_fee_per_gas),
            max_fee_per_gas: self.max_fee_per_gas.max(floor.max_fee_per_gas),
        }
        .ensure_spread()
    }

    /// Raises both fields to the hard-coded minimums the sponsoring relay
    /// accepts. Only applies to relay-sponsored submissions; self-paid
    /// transactions bid whatever the open fee market asks.
    pub fn with_relay_minimum_floor(self) -> Self {
        self.with_floor(Self {
            max_priority_fee_per_gas: RELAY_MIN_PRIORITY_FEE_PER_GAS,
            max_fee_per_gas: RELAY_MIN_MAX_FEE_PER_GAS,
        })
    }

    /// Doubles both fees (or raises them by 25%, whichever is larger).
    ///
    /// The transaction only lives for tens of seconds, so a gentle linear
    /// bump risks expiring before the replacement is ever accepted. The max
    /// fee is additionally re-floored to `priority + 1 gwei`.
    pub fn aggressively_bumped(self) -> Self {
        let bump = |value: u128| {
            saturating_scale(value, 5, 4)
                .max(value.saturating_mul(2))
                .max(value.saturating_add(1))
        };

        let max_priority_fee_per_gas = bump(self.max_priority_fee_per_gas);
        let max_fee_per_gas = bump(self.max_fee_per_gas)
            .max(max_priority_fee_per_gas.saturating_add(ONE_GWEI));

        Self { max_priority_fee_per_gas, max_fee_per_gas }
    }
}

/// Process-wide memory of the highest fees ever bid per sending address.
///
/// Read before every bid and written after every submission attempt and
/// every bump, so replacements never regress below an in-flight bid. Owned
/// by the engine instance and injected where needed; lives for the process
/// lifetime and is never persisted.
#[derive(Debug, Clone, Default)]
pub struct BidMemory {
    bids: Arc<DashMap<Address, Eip1559Fees>>,
}

impl BidMemory {
    /// Creates an empty bid memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises `fees` to the highest bid remembered for `sender`, if any.
    pub fn floor(&self, sender: Address, fees: Eip1559Fees) -> Eip1559Fees {
        match self.bids.get(&sender) {
            Some(prev) => fees.with_floor(*prev),
            None => fees,
        }
    }

    /// Remembers `fees` for `sender`. Monotonic per field: an entry never
    /// decreases.
    pub fn remember(&self, sender: Address, fees: Eip1559Fees) {
        self.bids
            .entry(sender)
            .and_modify(|prev| *prev = prev.with_floor(fees))
            .or_insert(fees);
    }

    /// Returns the highest bid remembered for `sender`.
    pub fn last_bid(&self, sender: Address) -> Option<Eip1559Fees> {
        self.bids.get(&sender).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn relay_floor_dominates_both_fields() {
        let low = Eip1559Fees { max_priority_fee_per_gas: 7, max_fee_per_gas: 9 };
        let floored = low.with_relay_minimum_floor();

        assert_eq!(floored.max_priority_fee_per_gas, RELAY_MIN_PRIORITY_FEE_PER_GAS);
        assert_eq!(floored.max_fee_per_gas, RELAY_MIN_MAX_FEE_PER_GAS);
        assert!(floored.max_fee_per_gas >= floored.max_priority_fee_per_gas + 1);
    }

    #[test]
    fn relay_floor_keeps_higher_market_fees() {
        let high = Eip1559Fees {
            max_priority_fee_per_gas: 40 * ONE_GWEI,
            max_fee_per_gas: 90 * ONE_GWEI,
        };
        assert_eq!(high.with_relay_minimum_floor(), high);
    }

    #[test]
    fn floor_restores_spread_when_priority_wins() {
        let fees = Eip1559Fees { max_priority_fee_per_gas: 10, max_fee_per_gas: 11 };
        let floor = Eip1559Fees { max_priority_fee_per_gas: 50, max_fee_per_gas: 11 };
        let combined = fees.with_floor(floor);

        assert_eq!(combined.max_priority_fee_per_gas, 50);
        assert!(combined.max_fee_per_gas >= 51);
    }

    #[test]
    fn aggressive_bump_is_strictly_increasing() {
        let fees = Eip1559Fees {
            max_priority_fee_per_gas: 3 * ONE_GWEI,
            max_fee_per_gas: 8 * ONE_GWEI,
        };
        let bumped = fees.aggressively_bumped();

        assert_eq!(bumped.max_priority_fee_per_gas, 6 * ONE_GWEI);
        assert!(bumped.max_fee_per_gas >= 16 * ONE_GWEI);
        assert!(bumped.max_priority_fee_per_gas > fees.max_priority_fee_per_gas);
        assert!(bumped.max_fee_per_gas > fees.max_fee_per_gas);
    }

    #[test]
    fn aggressive_bump_refloors_max_fee_against_priority() {
        let fees = Eip1559Fees { max_priority_fee_per_gas: 5 * ONE_GWEI, max_fee_per_gas: 1 };
        let bumped = fees.aggressively_bumped();

        assert!(bumped.max_fee_per_gas >= bumped.max_priority_fee_per_gas + ONE_GWEI);
    }

    #[test]
    fn suggested_fees_respect_relay_priority_floor() {
        let fees = Eip1559Fees::from_gas_price(10);

        assert_eq!(fees.max_priority_fee_per_gas, RELAY_MIN_PRIORITY_FEE_PER_GAS);
        assert!(fees.max_fee_per_gas > fees.max_priority_fee_per_gas);
    }

    #[test]
    fn suggested_fees_track_market_price() {
        let gas_price = 20 * ONE_GWEI;
        let fees = Eip1559Fees::from_gas_price(gas_price);

        assert_eq!(fees.max_priority_fee_per_gas, 4 * ONE_GWEI);
        assert_eq!(fees.max_fee_per_gas, 80 * ONE_GWEI);
    }

    #[test]
    fn saturating_scale_saturates() {
        assert_eq!(saturating_scale(u128::MAX, 2, 1), u128::MAX);
        assert_eq!(saturating_scale(100, 5, 4), 125);
    }

    #[test]
    fn bid_memory_never_regresses() {
        let bids = BidMemory::new();
        let sender = address!("00000000000000000000000000000000000000aa");
        let first = Eip1559Fees { max_priority_fee_per_gas: 500, max_fee_per_gas: 900 };

        bids.remember(sender, first);

        // A later, lower market suggestion is floored back up.
        let lower = Eip1559Fees { max_priority_fee_per_gas: 100, max_fee_per_gas: 200 };
        assert_eq!(bids.floor(sender, lower), first);

        // Remembering a mixed bid keeps the field-wise maximum.
        let mixed = Eip1559Fees { max_priority_fee_per_gas: 800, max_fee_per_gas: 700 };
        bids.remember(sender, mixed);
        let last = bids.last_bid(sender).unwrap();
        assert_eq!(last.max_priority_fee_per_gas, 800);
        assert_eq!(last.max_fee_per_gas, 900);
    }

    #[test]
    fn bid_memory_is_per_address() {
        let bids = BidMemory::new();
        let a = address!("00000000000000000000000000000000000000aa");
        let b = address!("00000000000000000000000000000000000000bb");
        let fees = Eip1559Fees { max_priority_fee_per_gas: 500, max_fee_per_gas: 900 };

        bids.remember(a, fees);
        assert!(bids.last_bid(b).is_none());

        let low = Eip1559Fees { max_priority_fee_per_gas: 1, max_fee_per_gas: 2 };
        assert_eq!(bids.floor(b, low), low);
    }
}
