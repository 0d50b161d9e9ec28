//! Allocation: stock earmarked against a reservation at a specific place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgeerp_core::{Entity, LocationId, StockId, UserId, WarehouseId};

use crate::reservation::ReservationId;

/// Allocation line number, assigned by the owning reservation (1, 2, 3, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub u32);

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCancellation {
    pub reason: String,
    pub cancelled_by: UserId,
    pub cancelled_date: DateTime<Utc>,
}

/// Physical stock committed to a reservation.
///
/// Owned by [`crate::Reservation`]; callers only ever see shared references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub reservation_id: ReservationId,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub stock_id: Option<StockId>,
    pub allocation_date: DateTime<Utc>,
    pub allocated_by: UserId,
    pub cancellation: Option<AllocationCancellation>,
}

impl Allocation {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }

    /// Quantity counted towards the reservation's allocated total.
    pub fn effective_quantity(&self) -> Decimal {
        if self.is_cancelled() {
            Decimal::ZERO
        } else {
            self.quantity
        }
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancellation.as_ref().map(|c| c.reason.as_str())
    }

    /// Whether stock from this allocation can satisfy an issue with the given
    /// warehouse / lot / serial constraints.
    pub fn matches_source(
        &self,
        warehouse_id: WarehouseId,
        lot_number: Option<&str>,
        serial_number: Option<&str>,
    ) -> bool {
        if self.warehouse_id != warehouse_id {
            return false;
        }
        if let Some(lot) = lot_number {
            if self.lot_number.as_deref() != Some(lot) {
                return false;
            }
        }
        if let Some(serial) = serial_number {
            if self.serial_number.as_deref() != Some(serial) {
                return false;
            }
        }
        true
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
