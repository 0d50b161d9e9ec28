//! Reservation lifecycle vocabulary and the single status-derivation rule.

use serde::{Deserialize, Serialize};

use crate::ledger::QuantityLedger;

/// Reservation lifecycle status.
///
/// `Active → PartiallyAllocated → FullyAllocated → PartiallyConsumed → Completed`
/// are derived from quantities; `Completed`, `Cancelled` and `Expired` are
/// terminal and only entered through explicit commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    PartiallyAllocated,
    FullyAllocated,
    PartiallyConsumed,
    Completed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// Status implied by quantities alone.
    ///
    /// Any consumed stock puts the reservation in `PartiallyConsumed`, including
    /// the fully-issued case that still awaits an explicit `Complete`.
    pub fn derive(ledger: &QuantityLedger) -> Self {
        let zero = rust_decimal::Decimal::ZERO;
        if ledger.net_issued() > zero {
            ReservationStatus::PartiallyConsumed
        } else if ledger.allocated() > zero && ledger.is_fully_allocated() {
            ReservationStatus::FullyAllocated
        } else if ledger.allocated() > zero {
            ReservationStatus::PartiallyAllocated
        } else {
            ReservationStatus::Active
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled | ReservationStatus::Expired
        )
    }

    /// Position along the forward path; terminal escapes rank after `Completed`.
    pub fn rank(self) -> u8 {
        match self {
            ReservationStatus::Active => 0,
            ReservationStatus::PartiallyAllocated => 1,
            ReservationStatus::FullyAllocated => 2,
            ReservationStatus::PartiallyConsumed => 3,
            ReservationStatus::Completed => 4,
            ReservationStatus::Cancelled | ReservationStatus::Expired => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::PartiallyAllocated => "partially_allocated",
            ReservationStatus::FullyAllocated => "fully_allocated",
            ReservationStatus::PartiallyConsumed => "partially_consumed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What raised the demand. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationType {
    ProductionOrder,
    SalesOrder,
    Project,
    Subcontract,
    Transfer,
    Manual,
}

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReservationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn qty(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn fresh_ledger_is_active() {
        assert_eq!(
            ReservationStatus::derive(&QuantityLedger::new(qty(10))),
            ReservationStatus::Active
        );
    }

    #[test]
    fn allocation_moves_through_partial_to_full() {
        let partial = QuantityLedger::new(qty(10)).with_allocated(qty(7));
        assert_eq!(ReservationStatus::derive(&partial), ReservationStatus::PartiallyAllocated);

        let full = partial.with_allocated(qty(3));
        assert_eq!(ReservationStatus::derive(&full), ReservationStatus::FullyAllocated);
    }

    #[test]
    fn any_net_consumption_is_partially_consumed() {
        let ledger = QuantityLedger::new(qty(10)).with_allocated(qty(10)).with_issued(qty(6));
        assert_eq!(ReservationStatus::derive(&ledger), ReservationStatus::PartiallyConsumed);

        let fully_issued = ledger.with_issued(qty(4));
        assert_eq!(
            ReservationStatus::derive(&fully_issued),
            ReservationStatus::PartiallyConsumed
        );
    }

    #[test]
    fn consumption_outranks_partial_allocation() {
        let drained = QuantityLedger::new(qty(10)).with_allocated(qty(4)).with_issued(qty(4));
        assert_eq!(ReservationStatus::derive(&drained), ReservationStatus::PartiallyConsumed);

        let partly_returned = drained.with_returned(qty(1));
        assert_eq!(
            ReservationStatus::derive(&partly_returned),
            ReservationStatus::PartiallyConsumed
        );
    }

    #[test]
    fn full_return_moves_back_to_allocation_states() {
        let full = QuantityLedger::new(qty(10))
            .with_allocated(qty(10))
            .with_issued(qty(6))
            .with_returned(qty(6));
        assert_eq!(ReservationStatus::derive(&full), ReservationStatus::FullyAllocated);

        let partial = QuantityLedger::new(qty(10))
            .with_allocated(qty(5))
            .with_issued(qty(2))
            .with_returned(qty(2));
        assert_eq!(ReservationStatus::derive(&partial), ReservationStatus::PartiallyAllocated);
    }

    #[test]
    fn derived_states_are_never_terminal() {
        let ledgers = [
            QuantityLedger::new(qty(3)),
            QuantityLedger::new(qty(3)).with_allocated(qty(1)),
            QuantityLedger::new(qty(3)).with_allocated(qty(3)),
            QuantityLedger::new(qty(3)).with_allocated(qty(3)).with_issued(qty(3)),
        ];
        for ledger in ledgers {
            assert!(!ReservationStatus::derive(&ledger).is_terminal());
        }
    }
}
