//! Quantity ledger: the four quantities of a reservation and the gaps between them.
//!
//! Pure arithmetic, no IO. All quantities share the reservation's unit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgeerp_core::{DomainError, DomainResult, ValueObject};

/// Snapshot of a reservation's quantities.
///
/// `issued` and `returned` are gross totals; what is still consumed is
/// `net_issued() = issued - returned`. Returned stock goes back to the
/// committed-but-unissued pool, so issue capacity is measured against net.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityLedger {
    required: Decimal,
    allocated: Decimal,
    issued: Decimal,
    returned: Decimal,
}

impl ValueObject for QuantityLedger {}

impl Default for QuantityLedger {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl QuantityLedger {
    pub fn new(required: Decimal) -> Self {
        Self {
            required,
            allocated: Decimal::ZERO,
            issued: Decimal::ZERO,
            returned: Decimal::ZERO,
        }
    }

    /// Rebuild a ledger from already-summed parts (used by the defensive check).
    pub fn from_parts(
        required: Decimal,
        allocated: Decimal,
        issued: Decimal,
        returned: Decimal,
    ) -> Self {
        Self {
            required,
            allocated,
            issued,
            returned,
        }
    }

    pub fn required(&self) -> Decimal {
        self.required
    }

    pub fn allocated(&self) -> Decimal {
        self.allocated
    }

    pub fn issued(&self) -> Decimal {
        self.issued
    }

    pub fn returned(&self) -> Decimal {
        self.returned
    }

    pub fn net_issued(&self) -> Decimal {
        self.issued - self.returned
    }

    /// `required - allocated`: how much more stock may still be committed.
    pub fn remaining_to_allocate(&self) -> Decimal {
        self.required - self.allocated
    }

    /// `allocated - net_issued`: committed stock not yet consumed.
    pub fn remaining_to_issue(&self) -> Decimal {
        self.allocated - self.net_issued()
    }

    /// `required - net_issued`: how much of the requirement is still unmet.
    pub fn remaining_requirement(&self) -> Decimal {
        self.required - self.net_issued()
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.allocated == self.required
    }

    pub fn is_fully_consumed(&self) -> bool {
        self.is_fully_allocated() && self.net_issued() == self.allocated && !self.allocated.is_zero()
    }

    pub fn with_allocated(self, quantity: Decimal) -> Self {
        Self {
            allocated: self.allocated + quantity,
            ..self
        }
    }

    pub fn with_released(self, quantity: Decimal) -> Self {
        Self {
            allocated: self.allocated - quantity,
            ..self
        }
    }

    pub fn with_issued(self, quantity: Decimal) -> Self {
        Self {
            issued: self.issued + quantity,
            ..self
        }
    }

    pub fn with_returned(self, quantity: Decimal) -> Self {
        Self {
            returned: self.returned + quantity,
            ..self
        }
    }

    /// Verify the ordering bounds between the four quantities.
    ///
    /// A failure here means the ledger was corrupted by a bug; it is reported as
    /// `InvariantViolation`, never corrected.
    pub fn check(&self) -> DomainResult<()> {
        let zero = Decimal::ZERO;
        if self.required <= zero {
            return Err(DomainError::invariant(format!(
                "required quantity must be positive (required={})",
                self.required
            )));
        }
        if self.allocated < zero || self.allocated > self.required {
            return Err(DomainError::invariant(format!(
                "allocated out of bounds (allocated={}, required={})",
                self.allocated, self.required
            )));
        }
        if self.returned < zero || self.returned > self.issued {
            return Err(DomainError::invariant(format!(
                "returned out of bounds (returned={}, issued={})",
                self.returned, self.issued
            )));
        }
        let net = self.net_issued();
        if net < zero || net > self.allocated {
            return Err(DomainError::invariant(format!(
                "net issued out of bounds (net_issued={net}, allocated={})",
                self.allocated
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn remaining_quantities_follow_the_ledger() {
        let ledger = QuantityLedger::new(qty(10))
            .with_allocated(qty(7))
            .with_issued(qty(5))
            .with_returned(qty(1));

        assert_eq!(ledger.net_issued(), qty(4));
        assert_eq!(ledger.remaining_to_allocate(), qty(3));
        assert_eq!(ledger.remaining_to_issue(), qty(3));
        assert_eq!(ledger.remaining_requirement(), qty(6));
        assert!(ledger.check().is_ok());
    }

    #[test]
    fn fractional_quantities_are_exact() {
        let ledger = QuantityLedger::new(Decimal::new(25, 1))
            .with_allocated(Decimal::new(12, 1))
            .with_allocated(Decimal::new(13, 1));

        assert!(ledger.is_fully_allocated());
        assert!(ledger.remaining_to_allocate().is_zero());
    }

    #[test]
    fn over_allocation_is_reported_not_clamped() {
        let ledger = QuantityLedger::new(qty(10)).with_allocated(qty(11));
        let err = ledger.check().unwrap_err();
        assert!(err.is_fatal());
        assert!(ledger.remaining_to_allocate() < Decimal::ZERO);
    }

    #[test]
    fn over_return_is_reported() {
        let ledger = QuantityLedger::new(qty(10))
            .with_allocated(qty(5))
            .with_issued(qty(2))
            .with_returned(qty(3));
        assert!(matches!(ledger.check(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn fully_consumed_needs_full_allocation_and_full_net_issue() {
        let partly = QuantityLedger::new(qty(4)).with_allocated(qty(4)).with_issued(qty(4));
        assert!(partly.is_fully_consumed());

        let returned = partly.with_returned(qty(1));
        assert!(!returned.is_fully_consumed());
        assert_eq!(returned.remaining_to_issue(), qty(1));
    }
}
