use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use forgeerp_core::{
    AggregateId, LocationId, ProductId, StockId, StockMovementId, TenantId, UserId, WarehouseId,
};

use super::aggregate::ReservationId;
use crate::allocation::AllocationId;
use crate::issue::IssueId;
use crate::status::{ReservationPriority, ReservationType};

/// Upstream document that raised the demand. At most one per reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReservationReference {
    ProductionOrder {
        order_id: AggregateId,
        line_id: Option<AggregateId>,
        bom_line_id: Option<AggregateId>,
    },
    SalesOrder {
        order_id: AggregateId,
    },
    Project {
        project_id: AggregateId,
    },
    Subcontract {
        order_id: AggregateId,
    },
    MrpPlan {
        plan_id: AggregateId,
    },
}

impl ReservationReference {
    /// Whether this reference can back a reservation of the given type.
    ///
    /// MRP plans may raise any planned demand; manual reservations carry no
    /// upstream document.
    pub fn fits(&self, reservation_type: ReservationType) -> bool {
        match (self, reservation_type) {
            (_, ReservationType::Manual) => false,
            (ReservationReference::MrpPlan { .. }, _) => true,
            (ReservationReference::ProductionOrder { .. }, ReservationType::ProductionOrder) => true,
            (ReservationReference::SalesOrder { .. }, ReservationType::SalesOrder) => true,
            (ReservationReference::Project { .. }, ReservationType::Project) => true,
            (ReservationReference::Subcontract { .. }, ReservationType::Subcontract) => true,
            _ => false,
        }
    }

    pub fn production_order_id(&self) -> Option<AggregateId> {
        match self {
            ReservationReference::ProductionOrder { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

/// Optional settings fixed when the reservation is first recorded.
///
/// None of these affect quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationOptions {
    /// Preferred warehouse; allocations may still come from elsewhere.
    pub warehouse_id: Option<WarehouseId>,
    pub priority: ReservationPriority,
    pub is_urgent: bool,
    pub auto_allocate: bool,
    pub requires_approval: bool,
    pub is_lot_controlled: bool,
    pub is_serial_controlled: bool,
    /// Pinned lot; every allocation must carry exactly this lot.
    pub lot_number: Option<String>,
    /// Pinned serial; every allocation must carry exactly this serial.
    pub serial_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub reference: Option<ReservationReference>,
    pub notes: Option<String>,
}

/// Command: CreateReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    /// Generated by the numbering collaborator; immutable afterwards.
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

/// Command: UpdateReservationDetails. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReservationDetails {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub required_date: Option<NaiveDate>,
    pub priority: Option<ReservationPriority>,
    pub is_urgent: Option<bool>,
    pub notes: Option<String>,
    pub updated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AllocateMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateMaterial {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub location_id: Option<LocationId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub stock_id: Option<StockId>,
    pub allocated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueMaterial.
///
/// With `allocation_id` the whole quantity is drawn from that allocation.
/// Without it, open allocations at `warehouse_id` are drawn oldest-first and
/// one issue is recorded per allocation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueMaterial {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub allocation_id: Option<AllocationId>,
    pub quantity: Decimal,
    pub warehouse_id: WarehouseId,
    pub stock_movement_id: Option<StockMovementId>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub issued_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Which issue(s) a return is booked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnTarget {
    Issue(IssueId),
    /// Spread over issues, most recent first.
    MostRecentFirst,
}

/// Command: ReturnMaterial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnMaterial {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub target: ReturnTarget,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub returned_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelAllocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllocation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub allocation_id: AllocationId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub completed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub reason: String,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireReservation. `occurred_at` is the sweep's "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireReservation {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationCommand {
    Create(CreateReservation),
    UpdateDetails(UpdateReservationDetails),
    Approve(ApproveReservation),
    Allocate(AllocateMaterial),
    Issue(IssueMaterial),
    Return(ReturnMaterial),
    CancelAllocation(CancelAllocation),
    Complete(CompleteReservation),
    Cancel(CancelReservation),
    Expire(ExpireReservation),
}

impl ReservationCommand {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ReservationCommand::Create(c) => c.tenant_id,
            ReservationCommand::UpdateDetails(c) => c.tenant_id,
            ReservationCommand::Approve(c) => c.tenant_id,
            ReservationCommand::Allocate(c) => c.tenant_id,
            ReservationCommand::Issue(c) => c.tenant_id,
            ReservationCommand::Return(c) => c.tenant_id,
            ReservationCommand::CancelAllocation(c) => c.tenant_id,
            ReservationCommand::Complete(c) => c.tenant_id,
            ReservationCommand::Cancel(c) => c.tenant_id,
            ReservationCommand::Expire(c) => c.tenant_id,
        }
    }

    pub fn reservation_id(&self) -> ReservationId {
        match self {
            ReservationCommand::Create(c) => c.reservation_id,
            ReservationCommand::UpdateDetails(c) => c.reservation_id,
            ReservationCommand::Approve(c) => c.reservation_id,
            ReservationCommand::Allocate(c) => c.reservation_id,
            ReservationCommand::Issue(c) => c.reservation_id,
            ReservationCommand::Return(c) => c.reservation_id,
            ReservationCommand::CancelAllocation(c) => c.reservation_id,
            ReservationCommand::Complete(c) => c.reservation_id,
            ReservationCommand::Cancel(c) => c.reservation_id,
            ReservationCommand::Expire(c) => c.reservation_id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReservationCommand::Create(_) => "create",
            ReservationCommand::UpdateDetails(_) => "update_details",
            ReservationCommand::Approve(_) => "approve",
            ReservationCommand::Allocate(_) => "allocate",
            ReservationCommand::Issue(_) => "issue",
            ReservationCommand::Return(_) => "return",
            ReservationCommand::CancelAllocation(_) => "cancel_allocation",
            ReservationCommand::Complete(_) => "complete",
            ReservationCommand::Cancel(_) => "cancel",
            ReservationCommand::Expire(_) => "expire",
        }
    }
}
