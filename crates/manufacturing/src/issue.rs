//! Issue: physical consumption drawn from one allocation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgeerp_core::{Entity, LocationId, StockMovementId, UserId, WarehouseId};

use crate::allocation::AllocationId;
use crate::reservation::ReservationId;

/// Issue line number, assigned by the owning reservation (1, 2, 3, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(pub u32);

impl core::fmt::Display for IssueId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "I{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub reservation_id: ReservationId,
    pub allocation_id: AllocationId,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub stock_movement_id: Option<StockMovementId>,
    pub issue_date: DateTime<Utc>,
    pub issued_by: UserId,

    /// Cumulative; `0 <= returned_quantity <= quantity`.
    pub returned_quantity: Decimal,
    /// Audit fields of the most recent return.
    pub return_reason: Option<String>,
    pub returned_by: Option<UserId>,
    pub return_date: Option<DateTime<Utc>>,
}

impl Issue {
    /// Quantity still consumed: `quantity - returned_quantity`.
    pub fn net_quantity(&self) -> Decimal {
        self.quantity - self.returned_quantity
    }
}

impl Entity for Issue {
    type Id = IssueId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
