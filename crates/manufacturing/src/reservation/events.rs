use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgeerp_core::{
    LocationId, ProductId, StockId, StockMovementId, TenantId, UserId, WarehouseId,
};
use forgeerp_events::Event;

use super::aggregate::ReservationId;
use super::commands::ReservationOptions;
use crate::allocation::AllocationId;
use crate::issue::IssueId;
use crate::status::{ReservationPriority, ReservationType};

/// Event: ReservationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCreated {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub reservation_number: String,
    pub product_id: ProductId,
    pub unit: String,
    pub required_quantity: Decimal,
    pub required_date: NaiveDate,
    pub reservation_type: ReservationType,
    pub options: ReservationOptions,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationDetailsUpdated. Only `Some` fields changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetailsUpdated {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub required_date: Option<NaiveDate>,
    pub priority: Option<ReservationPriority>,
    pub is_urgent: Option<bool>,
    pub notes: Option<String>,
    pub updated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationApproved {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialAllocated {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub allocation_id: AllocationId,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub stock_id: Option<StockId>,
    pub allocated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCancelled {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub allocation_id: AllocationId,
    /// Quantity released from the allocated total.
    pub quantity: Decimal,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialIssued {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub issue_id: IssueId,
    pub allocation_id: AllocationId,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub stock_movement_id: Option<StockMovementId>,
    pub issued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MaterialReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialReturned {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub issue_id: IssueId,
    pub allocation_id: AllocationId,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub returned_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCompleted {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub completed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCancelled {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationExpired {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEvent {
    ReservationCreated(ReservationCreated),
    ReservationDetailsUpdated(ReservationDetailsUpdated),
    ReservationApproved(ReservationApproved),
    MaterialAllocated(MaterialAllocated),
    AllocationCancelled(AllocationCancelled),
    MaterialIssued(MaterialIssued),
    MaterialReturned(MaterialReturned),
    ReservationCompleted(ReservationCompleted),
    ReservationCancelled(ReservationCancelled),
    ReservationExpired(ReservationExpired),
}

impl ReservationEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ReservationEvent::ReservationCreated(e) => e.tenant_id,
            ReservationEvent::ReservationDetailsUpdated(e) => e.tenant_id,
            ReservationEvent::ReservationApproved(e) => e.tenant_id,
            ReservationEvent::MaterialAllocated(e) => e.tenant_id,
            ReservationEvent::AllocationCancelled(e) => e.tenant_id,
            ReservationEvent::MaterialIssued(e) => e.tenant_id,
            ReservationEvent::MaterialReturned(e) => e.tenant_id,
            ReservationEvent::ReservationCompleted(e) => e.tenant_id,
            ReservationEvent::ReservationCancelled(e) => e.tenant_id,
            ReservationEvent::ReservationExpired(e) => e.tenant_id,
        }
    }

    pub fn reservation_id(&self) -> ReservationId {
        match self {
            ReservationEvent::ReservationCreated(e) => e.reservation_id,
            ReservationEvent::ReservationDetailsUpdated(e) => e.reservation_id,
            ReservationEvent::ReservationApproved(e) => e.reservation_id,
            ReservationEvent::MaterialAllocated(e) => e.reservation_id,
            ReservationEvent::AllocationCancelled(e) => e.reservation_id,
            ReservationEvent::MaterialIssued(e) => e.reservation_id,
            ReservationEvent::MaterialReturned(e) => e.reservation_id,
            ReservationEvent::ReservationCompleted(e) => e.reservation_id,
            ReservationEvent::ReservationCancelled(e) => e.reservation_id,
            ReservationEvent::ReservationExpired(e) => e.reservation_id,
        }
    }
}

impl Event for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::ReservationCreated(_) => "manufacturing.reservation.created",
            ReservationEvent::ReservationDetailsUpdated(_) => {
                "manufacturing.reservation.details_updated"
            }
            ReservationEvent::ReservationApproved(_) => "manufacturing.reservation.approved",
            ReservationEvent::MaterialAllocated(_) => "manufacturing.reservation.allocated",
            ReservationEvent::AllocationCancelled(_) => {
                "manufacturing.reservation.allocation_cancelled"
            }
            ReservationEvent::MaterialIssued(_) => "manufacturing.reservation.issued",
            ReservationEvent::MaterialReturned(_) => "manufacturing.reservation.returned",
            ReservationEvent::ReservationCompleted(_) => "manufacturing.reservation.completed",
            ReservationEvent::ReservationCancelled(_) => "manufacturing.reservation.cancelled",
            ReservationEvent::ReservationExpired(_) => "manufacturing.reservation.expired",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReservationEvent::ReservationCreated(e) => e.occurred_at,
            ReservationEvent::ReservationDetailsUpdated(e) => e.occurred_at,
            ReservationEvent::ReservationApproved(e) => e.occurred_at,
            ReservationEvent::MaterialAllocated(e) => e.occurred_at,
            ReservationEvent::AllocationCancelled(e) => e.occurred_at,
            ReservationEvent::MaterialIssued(e) => e.occurred_at,
            ReservationEvent::MaterialReturned(e) => e.occurred_at,
            ReservationEvent::ReservationCompleted(e) => e.occurred_at,
            ReservationEvent::ReservationCancelled(e) => e.occurred_at,
            ReservationEvent::ReservationExpired(e) => e.occurred_at,
        }
    }
}
