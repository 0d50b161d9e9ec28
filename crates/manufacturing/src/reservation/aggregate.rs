use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forgeerp_core::{
    find_by_id, Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, ProductId,
    TenantId, UserId, WarehouseId,
};

use super::commands::{
    AllocateMaterial, ApproveReservation, CancelAllocation, CancelReservation,
    CompleteReservation, CreateReservation, ExpireReservation, IssueMaterial, ReservationCommand,
    ReservationOptions, ReservationReference, ReturnMaterial, ReturnTarget,
    UpdateReservationDetails,
};
use super::events::{
    AllocationCancelled, MaterialAllocated, MaterialIssued, MaterialReturned,
    ReservationApproved, ReservationCancelled, ReservationCompleted, ReservationCreated,
    ReservationDetailsUpdated, ReservationEvent, ReservationExpired,
};
use crate::allocation::{Allocation, AllocationCancellation, AllocationId};
use crate::issue::{Issue, IssueId};
use crate::ledger::QuantityLedger;
use crate::status::{ReservationPriority, ReservationStatus, ReservationType};

/// Material reservation identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub AggregateId);

impl ReservationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_by: UserId,
    pub approved_date: DateTime<Utc>,
}

/// How a reservation left the quantity-driven lifecycle. Absorbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Closure {
    Completed {
        completed_by: UserId,
        completed_at: DateTime<Utc>,
    },
    Cancelled {
        reason: String,
        cancelled_by: UserId,
        cancelled_at: DateTime<Utc>,
    },
    Expired {
        expired_at: DateTime<Utc>,
    },
}

impl Closure {
    pub fn status(&self) -> ReservationStatus {
        match self {
            Closure::Completed { .. } => ReservationStatus::Completed,
            Closure::Cancelled { .. } => ReservationStatus::Cancelled,
            Closure::Expired { .. } => ReservationStatus::Expired,
        }
    }
}

/// Aggregate root: material Reservation.
///
/// Owns its allocations and issues. They change only through `apply`, and
/// callers only ever receive shared slices of them. Status is never stored: it
/// is the closure (if any) or [`ReservationStatus::derive`] over the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: ReservationId,
    tenant_id: Option<TenantId>,
    reservation_number: String,
    product_id: ProductId,
    unit: String,
    reservation_type: ReservationType,
    options: ReservationOptions,
    required_date: NaiveDate,
    requested_date: Option<DateTime<Utc>>,
    requested_by: Option<UserId>,
    allocation_date: Option<DateTime<Utc>>,
    approval: Option<Approval>,
    ledger: QuantityLedger,
    allocations: Vec<Allocation>,
    issues: Vec<Issue>,
    closure: Option<Closure>,
    version: u64,
    created: bool,
}

impl Reservation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReservationId) -> Self {
        Self {
            id,
            tenant_id: None,
            reservation_number: String::new(),
            product_id: ProductId::from_uuid(Uuid::nil()),
            unit: String::new(),
            reservation_type: ReservationType::Manual,
            options: ReservationOptions::default(),
            required_date: NaiveDate::default(),
            requested_date: None,
            requested_by: None,
            allocation_date: None,
            approval: None,
            ledger: QuantityLedger::default(),
            allocations: Vec::new(),
            issues: Vec::new(),
            closure: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn reservation_number(&self) -> &str {
        &self.reservation_number
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn reservation_type(&self) -> ReservationType {
        self.reservation_type
    }

    pub fn options(&self) -> &ReservationOptions {
        &self.options
    }

    pub fn priority(&self) -> ReservationPriority {
        self.options.priority
    }

    pub fn is_urgent(&self) -> bool {
        self.options.is_urgent
    }

    pub fn requires_approval(&self) -> bool {
        self.options.requires_approval
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.options.warehouse_id
    }

    pub fn reference(&self) -> Option<&ReservationReference> {
        self.options.reference.as_ref()
    }

    pub fn required_date(&self) -> NaiveDate {
        self.required_date
    }

    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.options.expiry_date
    }

    pub fn requested_date(&self) -> Option<DateTime<Utc>> {
        self.requested_date
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn allocation_date(&self) -> Option<DateTime<Utc>> {
        self.allocation_date
    }

    pub fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    pub fn is_approved(&self) -> bool {
        self.approval.is_some()
    }

    pub fn closure(&self) -> Option<&Closure> {
        self.closure.as_ref()
    }

    pub fn status(&self) -> ReservationStatus {
        match &self.closure {
            Some(closure) => closure.status(),
            None => ReservationStatus::derive(&self.ledger),
        }
    }

    pub fn ledger(&self) -> &QuantityLedger {
        &self.ledger
    }

    pub fn required_quantity(&self) -> Decimal {
        self.ledger.required()
    }

    pub fn allocated_quantity(&self) -> Decimal {
        self.ledger.allocated()
    }

    pub fn issued_quantity(&self) -> Decimal {
        self.ledger.issued()
    }

    pub fn returned_quantity(&self) -> Decimal {
        self.ledger.returned()
    }

    pub fn remaining_to_allocate(&self) -> Decimal {
        self.ledger.remaining_to_allocate()
    }

    pub fn remaining_to_issue(&self) -> Decimal {
        self.ledger.remaining_to_issue()
    }

    pub fn remaining_requirement(&self) -> Decimal {
        self.ledger.remaining_requirement()
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn allocation(&self, id: AllocationId) -> Option<&Allocation> {
        find_by_id(&self.allocations, &id)
    }

    pub fn issue(&self, id: IssueId) -> Option<&Issue> {
        find_by_id(&self.issues, &id)
    }

    /// Net quantity currently consumed out of one allocation.
    pub fn consumed_from(&self, allocation_id: AllocationId) -> Decimal {
        self.issues
            .iter()
            .filter(|i| i.allocation_id == allocation_id)
            .map(Issue::net_quantity)
            .sum()
    }

    /// Committed-but-unissued quantity of one allocation.
    pub fn open_quantity(&self, allocation_id: AllocationId) -> Option<Decimal> {
        self.allocation(allocation_id).map(|a| self.open_of(a))
    }

    fn open_of(&self, allocation: &Allocation) -> Decimal {
        allocation.effective_quantity() - self.consumed_from(allocation.id)
    }

    /// Date after which an under-allocated reservation may be expired: the later
    /// of the required date and the expiry date.
    pub fn expiry_deadline(&self) -> NaiveDate {
        match self.options.expiry_date {
            Some(expiry) => expiry.max(self.required_date),
            None => self.required_date,
        }
    }

    /// Defensive consistency check of the cached ledger against its parts.
    ///
    /// Any failure is an `InvariantViolation` (a bug), never a business error.
    pub fn verify_ledger(&self) -> DomainResult<()> {
        let allocated: Decimal = self
            .allocations
            .iter()
            .map(Allocation::effective_quantity)
            .sum();
        let issued: Decimal = self.issues.iter().map(|i| i.quantity).sum();
        let returned: Decimal = self.issues.iter().map(|i| i.returned_quantity).sum();

        let summed = QuantityLedger::from_parts(self.ledger.required(), allocated, issued, returned);
        if summed != self.ledger {
            return Err(DomainError::invariant(format!(
                "ledger {:?} disagrees with sum of parts {:?}",
                self.ledger, summed
            )));
        }

        for issue in &self.issues {
            if issue.returned_quantity < Decimal::ZERO || issue.returned_quantity > issue.quantity {
                return Err(DomainError::invariant(format!(
                    "issue {} returned {} of {}",
                    issue.id, issue.returned_quantity, issue.quantity
                )));
            }
        }

        for allocation in &self.allocations {
            if self.open_of(allocation) < Decimal::ZERO {
                return Err(DomainError::invariant(format!(
                    "allocation {} consumed {} beyond its effective quantity {}",
                    allocation.id,
                    self.consumed_from(allocation.id),
                    allocation.effective_quantity()
                )));
            }
        }

        self.ledger.check()
    }
}

impl AggregateRoot for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Reservation {
    type Command = ReservationCommand;
    type Event = ReservationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservationEvent::ReservationCreated(e) => {
                self.id = e.reservation_id;
                self.tenant_id = Some(e.tenant_id);
                self.reservation_number = e.reservation_number.clone();
                self.product_id = e.product_id;
                self.unit = e.unit.clone();
                self.reservation_type = e.reservation_type;
                self.options = e.options.clone();
                self.required_date = e.required_date;
                self.requested_date = Some(e.occurred_at);
                self.requested_by = Some(e.requested_by);
                self.allocation_date = None;
                self.approval = None;
                self.ledger = QuantityLedger::new(e.required_quantity);
                self.allocations.clear();
                self.issues.clear();
                self.closure = None;
                self.created = true;
            }
            ReservationEvent::ReservationDetailsUpdated(e) => {
                if let Some(date) = e.required_date {
                    self.required_date = date;
                }
                if let Some(priority) = e.priority {
                    self.options.priority = priority;
                }
                if let Some(is_urgent) = e.is_urgent {
                    self.options.is_urgent = is_urgent;
                }
                if let Some(notes) = &e.notes {
                    self.options.notes = Some(notes.clone());
                }
            }
            ReservationEvent::ReservationApproved(e) => {
                self.approval = Some(Approval {
                    approved_by: e.approved_by,
                    approved_date: e.occurred_at,
                });
            }
            ReservationEvent::MaterialAllocated(e) => {
                self.allocations.push(Allocation {
                    id: e.allocation_id,
                    reservation_id: e.reservation_id,
                    quantity: e.quantity,
                    warehouse_id: e.warehouse_id,
                    location_id: e.location_id,
                    lot_number: e.lot_number.clone(),
                    serial_number: e.serial_number.clone(),
                    stock_id: e.stock_id,
                    allocation_date: e.occurred_at,
                    allocated_by: e.allocated_by,
                    cancellation: None,
                });
                self.ledger = self.ledger.with_allocated(e.quantity);
                if self.allocation_date.is_none() {
                    self.allocation_date = Some(e.occurred_at);
                }
            }
            ReservationEvent::AllocationCancelled(e) => {
                if let Some(allocation) = self
                    .allocations
                    .iter_mut()
                    .find(|a| a.id == e.allocation_id)
                {
                    allocation.cancellation = Some(AllocationCancellation {
                        reason: e.reason.clone(),
                        cancelled_by: e.cancelled_by,
                        cancelled_date: e.occurred_at,
                    });
                }
                self.ledger = self.ledger.with_released(e.quantity);
            }
            ReservationEvent::MaterialIssued(e) => {
                self.issues.push(Issue {
                    id: e.issue_id,
                    reservation_id: e.reservation_id,
                    allocation_id: e.allocation_id,
                    quantity: e.quantity,
                    warehouse_id: e.warehouse_id,
                    location_id: e.location_id,
                    lot_number: e.lot_number.clone(),
                    serial_number: e.serial_number.clone(),
                    stock_movement_id: e.stock_movement_id,
                    issue_date: e.occurred_at,
                    issued_by: e.issued_by,
                    returned_quantity: Decimal::ZERO,
                    return_reason: None,
                    returned_by: None,
                    return_date: None,
                });
                self.ledger = self.ledger.with_issued(e.quantity);
            }
            ReservationEvent::MaterialReturned(e) => {
                if let Some(issue) = self.issues.iter_mut().find(|i| i.id == e.issue_id) {
                    issue.returned_quantity += e.quantity;
                    issue.return_reason = e.reason.clone();
                    issue.returned_by = Some(e.returned_by);
                    issue.return_date = Some(e.occurred_at);
                }
                self.ledger = self.ledger.with_returned(e.quantity);
            }
            ReservationEvent::ReservationCompleted(e) => {
                self.closure = Some(Closure::Completed {
                    completed_by: e.completed_by,
                    completed_at: e.occurred_at,
                });
            }
            ReservationEvent::ReservationCancelled(e) => {
                self.closure = Some(Closure::Cancelled {
                    reason: e.reason.clone(),
                    cancelled_by: e.cancelled_by,
                    cancelled_at: e.occurred_at,
                });
            }
            ReservationEvent::ReservationExpired(e) => {
                self.closure = Some(Closure::Expired {
                    expired_at: e.occurred_at,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if !matches!(command, ReservationCommand::Create(_)) {
            self.ensure_target(command.tenant_id(), command.reservation_id())?;
            self.verify_ledger()?;
        }

        let events = match command {
            ReservationCommand::Create(cmd) => self.handle_create(cmd)?,
            ReservationCommand::UpdateDetails(cmd) => self.handle_update_details(cmd)?,
            ReservationCommand::Approve(cmd) => self.handle_approve(cmd)?,
            ReservationCommand::Allocate(cmd) => self.handle_allocate(cmd)?,
            ReservationCommand::Issue(cmd) => self.handle_issue(cmd)?,
            ReservationCommand::Return(cmd) => self.handle_return(cmd)?,
            ReservationCommand::CancelAllocation(cmd) => self.handle_cancel_allocation(cmd)?,
            ReservationCommand::Complete(cmd) => self.handle_complete(cmd)?,
            ReservationCommand::Cancel(cmd) => self.handle_cancel(cmd)?,
            ReservationCommand::Expire(cmd) => self.handle_expire(cmd)?,
        };

        self.ensure_preserves_invariants(&events)?;
        Ok(events)
    }
}

fn ensure_positive(quantity: Decimal, what: &str) -> DomainResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{what} must be positive (got {quantity})"
        )));
    }
    Ok(())
}

fn ensure_not_blank(value: &str, what: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    Ok(())
}

impl Reservation {
    fn ensure_target(&self, tenant_id: TenantId, reservation_id: ReservationId) -> DomainResult<()> {
        // A reservation of another tenant is indistinguishable from a missing one.
        if !self.created || self.tenant_id != Some(tenant_id) {
            return Err(DomainError::not_found(format!("reservation {reservation_id}")));
        }
        if self.id != reservation_id {
            return Err(DomainError::validation("reservation_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> DomainResult<()> {
        if self.closure.is_some() {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} a {} reservation",
                self.status()
            )));
        }
        Ok(())
    }

    /// Replays the decided events on a copy and re-runs the ledger check.
    fn ensure_preserves_invariants(&self, events: &[ReservationEvent]) -> DomainResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut next = self.clone();
        for event in events {
            next.apply(event);
        }
        next.verify_ledger()
    }

    fn check_tracking(
        &self,
        quantity: Decimal,
        lot_number: Option<&str>,
        serial_number: Option<&str>,
    ) -> DomainResult<()> {
        if self.options.is_lot_controlled {
            let lot = lot_number
                .filter(|l| !l.trim().is_empty())
                .ok_or_else(|| DomainError::validation("lot number is required for a lot-controlled product"))?;
            if let Some(pinned) = &self.options.lot_number {
                if pinned != lot {
                    return Err(DomainError::validation(format!(
                        "lot {lot} does not match reserved lot {pinned}"
                    )));
                }
            }
        }
        if self.options.is_serial_controlled {
            let serial = serial_number
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| DomainError::validation("serial number is required for a serial-controlled product"))?;
            if let Some(pinned) = &self.options.serial_number {
                if pinned != serial {
                    return Err(DomainError::validation(format!(
                        "serial {serial} does not match reserved serial {pinned}"
                    )));
                }
            }
        }
        // A serial number identifies a single unit.
        let has_serial = serial_number.is_some_and(|s| !s.trim().is_empty());
        if (self.options.is_serial_controlled || has_serial) && quantity != Decimal::ONE {
            return Err(DomainError::validation(format!(
                "a serial-numbered allocation covers exactly one unit, got {quantity}"
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReservation) -> DomainResult<Vec<ReservationEvent>> {
        if self.created {
            return Err(DomainError::conflict("reservation already exists"));
        }
        if cmd.reservation_id != self.id {
            return Err(DomainError::validation("reservation_id mismatch"));
        }
        ensure_not_blank(&cmd.reservation_number, "reservation number")?;
        ensure_not_blank(&cmd.unit, "unit")?;
        ensure_positive(cmd.required_quantity, "required quantity")?;

        let today = cmd.occurred_at.date_naive();
        if cmd.required_date < today {
            return Err(DomainError::validation(format!(
                "required date {} is before {today}",
                cmd.required_date
            )));
        }

        let options = &cmd.options;
        if let Some(expiry) = options.expiry_date {
            if expiry < today {
                return Err(DomainError::validation(format!(
                    "expiry date {expiry} is before {today}"
                )));
            }
        }
        if options.lot_number.is_some() && !options.is_lot_controlled {
            return Err(DomainError::validation(
                "a pinned lot number requires lot control",
            ));
        }
        if options.serial_number.is_some() && !options.is_serial_controlled {
            return Err(DomainError::validation(
                "a pinned serial number requires serial control",
            ));
        }
        if let Some(reference) = &options.reference {
            if !reference.fits(cmd.reservation_type) {
                return Err(DomainError::validation(format!(
                    "{reference:?} cannot back a {:?} reservation",
                    cmd.reservation_type
                )));
            }
        }

        Ok(vec![ReservationEvent::ReservationCreated(ReservationCreated {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            reservation_number: cmd.reservation_number.trim().to_string(),
            product_id: cmd.product_id,
            unit: cmd.unit.trim().to_string(),
            required_quantity: cmd.required_quantity,
            required_date: cmd.required_date,
            reservation_type: cmd.reservation_type,
            options: options.clone(),
            requested_by: cmd.requested_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(
        &self,
        cmd: &UpdateReservationDetails,
    ) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("update")?;

        if cmd.required_date.is_none()
            && cmd.priority.is_none()
            && cmd.is_urgent.is_none()
            && cmd.notes.is_none()
        {
            return Err(DomainError::validation("nothing to update"));
        }
        if let Some(date) = cmd.required_date {
            let today = cmd.occurred_at.date_naive();
            if date < today {
                return Err(DomainError::validation(format!(
                    "required date {date} is before {today}"
                )));
            }
        }

        Ok(vec![ReservationEvent::ReservationDetailsUpdated(
            ReservationDetailsUpdated {
                tenant_id: cmd.tenant_id,
                reservation_id: cmd.reservation_id,
                required_date: cmd.required_date,
                priority: cmd.priority,
                is_urgent: cmd.is_urgent,
                notes: cmd.notes.clone(),
                updated_by: cmd.updated_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(&self, cmd: &ApproveReservation) -> DomainResult<Vec<ReservationEvent>> {
        if matches!(
            self.status(),
            ReservationStatus::Cancelled | ReservationStatus::Expired
        ) {
            return Err(DomainError::invalid_state(format!(
                "cannot approve a {} reservation",
                self.status()
            )));
        }
        if !self.options.requires_approval {
            return Err(DomainError::invalid_operation(
                "reservation does not require approval",
            ));
        }
        if self.approval.is_some() {
            return Ok(vec![]);
        }

        Ok(vec![ReservationEvent::ReservationApproved(ReservationApproved {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_allocate(&self, cmd: &AllocateMaterial) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("allocate to")?;
        if self.options.requires_approval && self.approval.is_none() {
            return Err(DomainError::invalid_state(
                "reservation must be approved before allocation",
            ));
        }
        ensure_positive(cmd.quantity, "allocation quantity")?;
        self.check_tracking(cmd.quantity, cmd.lot_number.as_deref(), cmd.serial_number.as_deref())?;

        let remaining = self.ledger.remaining_to_allocate();
        if cmd.quantity > remaining {
            return Err(DomainError::quantity_exceeded(
                format!(
                    "allocation would exceed required quantity {} (allocated {})",
                    self.ledger.required(),
                    self.ledger.allocated()
                ),
                cmd.quantity,
                remaining,
            ));
        }

        let allocation_id = AllocationId(self.allocations.len() as u32 + 1);

        Ok(vec![ReservationEvent::MaterialAllocated(MaterialAllocated {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            allocation_id,
            quantity: cmd.quantity,
            warehouse_id: cmd.warehouse_id,
            location_id: cmd.location_id,
            lot_number: cmd.lot_number.clone(),
            serial_number: cmd.serial_number.clone(),
            stock_id: cmd.stock_id,
            allocated_by: cmd.allocated_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueMaterial) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("issue from")?;
        if self.ledger.allocated().is_zero() {
            return Err(DomainError::invalid_state(
                "reservation has no allocated stock to issue",
            ));
        }
        ensure_positive(cmd.quantity, "issue quantity")?;

        let remaining = self.ledger.remaining_to_issue();
        if cmd.quantity > remaining {
            return Err(DomainError::quantity_exceeded(
                format!(
                    "issue would exceed allocated quantity {} (net issued {})",
                    self.ledger.allocated(),
                    self.ledger.net_issued()
                ),
                cmd.quantity,
                remaining,
            ));
        }

        let draws = self.plan_issue(cmd)?;
        let first = self.issues.len() as u32 + 1;

        Ok(draws
            .into_iter()
            .enumerate()
            .map(|(n, (allocation, quantity))| {
                ReservationEvent::MaterialIssued(MaterialIssued {
                    tenant_id: cmd.tenant_id,
                    reservation_id: cmd.reservation_id,
                    issue_id: IssueId(first + n as u32),
                    allocation_id: allocation.id,
                    quantity,
                    warehouse_id: cmd.warehouse_id,
                    location_id: allocation.location_id,
                    lot_number: cmd
                        .lot_number
                        .clone()
                        .or_else(|| allocation.lot_number.clone()),
                    serial_number: cmd
                        .serial_number
                        .clone()
                        .or_else(|| allocation.serial_number.clone()),
                    stock_movement_id: cmd.stock_movement_id,
                    issued_by: cmd.issued_by,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    /// Pick the allocation(s) an issue draws from.
    fn plan_issue(&self, cmd: &IssueMaterial) -> DomainResult<Vec<(&Allocation, Decimal)>> {
        let lot = cmd.lot_number.as_deref();
        let serial = cmd.serial_number.as_deref();

        if let Some(id) = cmd.allocation_id {
            let allocation = self
                .allocation(id)
                .ok_or_else(|| DomainError::not_found(format!("allocation {id}")))?;
            if allocation.is_cancelled() {
                return Err(DomainError::invalid_operation(format!(
                    "allocation {id} is cancelled"
                )));
            }
            if !allocation.matches_source(cmd.warehouse_id, lot, serial) {
                return Err(DomainError::validation(format!(
                    "allocation {id} holds no matching stock at warehouse {}",
                    cmd.warehouse_id
                )));
            }
            let open = self.open_of(allocation);
            if cmd.quantity > open {
                return Err(DomainError::quantity_exceeded(
                    format!("issue exceeds open quantity of allocation {id}"),
                    cmd.quantity,
                    open,
                ));
            }
            return Ok(vec![(allocation, cmd.quantity)]);
        }

        let mut left = cmd.quantity;
        let mut draws = Vec::new();
        for allocation in self
            .allocations
            .iter()
            .filter(|a| !a.is_cancelled() && a.matches_source(cmd.warehouse_id, lot, serial))
        {
            if left.is_zero() {
                break;
            }
            let open = self.open_of(allocation);
            if open <= Decimal::ZERO {
                continue;
            }
            let take = open.min(left);
            draws.push((allocation, take));
            left -= take;
        }

        if !left.is_zero() {
            return Err(DomainError::quantity_exceeded(
                format!(
                    "not enough open allocated stock at warehouse {}",
                    cmd.warehouse_id
                ),
                cmd.quantity,
                cmd.quantity - left,
            ));
        }
        Ok(draws)
    }

    fn handle_return(&self, cmd: &ReturnMaterial) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("return to")?;
        ensure_positive(cmd.quantity, "return quantity")?;

        let draws: Vec<(&Issue, Decimal)> = match cmd.target {
            ReturnTarget::Issue(id) => {
                let issue = self
                    .issue(id)
                    .ok_or_else(|| DomainError::not_found(format!("issue {id}")))?;
                let net = issue.net_quantity();
                if cmd.quantity > net {
                    return Err(DomainError::quantity_exceeded(
                        format!("return exceeds net issued quantity of issue {id}"),
                        cmd.quantity,
                        net,
                    ));
                }
                vec![(issue, cmd.quantity)]
            }
            ReturnTarget::MostRecentFirst => {
                let net = self.ledger.net_issued();
                if cmd.quantity > net {
                    return Err(DomainError::quantity_exceeded(
                        "return exceeds net issued quantity",
                        cmd.quantity,
                        net,
                    ));
                }
                let mut left = cmd.quantity;
                let mut draws = Vec::new();
                for issue in self.issues.iter().rev() {
                    if left.is_zero() {
                        break;
                    }
                    let net = issue.net_quantity();
                    if net <= Decimal::ZERO {
                        continue;
                    }
                    let take = net.min(left);
                    draws.push((issue, take));
                    left -= take;
                }
                draws
            }
        };

        Ok(draws
            .into_iter()
            .map(|(issue, quantity)| {
                ReservationEvent::MaterialReturned(MaterialReturned {
                    tenant_id: cmd.tenant_id,
                    reservation_id: cmd.reservation_id,
                    issue_id: issue.id,
                    allocation_id: issue.allocation_id,
                    quantity,
                    reason: cmd.reason.clone(),
                    returned_by: cmd.returned_by,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect())
    }

    fn handle_cancel_allocation(
        &self,
        cmd: &CancelAllocation,
    ) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("cancel an allocation of")?;
        ensure_not_blank(&cmd.reason, "cancellation reason")?;

        let id = cmd.allocation_id;
        let allocation = self
            .allocation(id)
            .ok_or_else(|| DomainError::not_found(format!("allocation {id}")))?;
        if allocation.is_cancelled() {
            return Err(DomainError::invalid_operation(format!(
                "allocation {id} is already cancelled"
            )));
        }
        let consumed = self.consumed_from(id);
        if consumed > Decimal::ZERO {
            return Err(DomainError::invalid_operation(format!(
                "allocation {id} has {consumed} issued; return the issued stock first"
            )));
        }

        Ok(vec![ReservationEvent::AllocationCancelled(AllocationCancelled {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            allocation_id: id,
            quantity: allocation.quantity,
            reason: cmd.reason.trim().to_string(),
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteReservation) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("complete")?;
        if !self.ledger.is_fully_consumed() {
            return Err(DomainError::invalid_state(format!(
                "reservation is not fully consumed (required {}, allocated {}, net issued {})",
                self.ledger.required(),
                self.ledger.allocated(),
                self.ledger.net_issued()
            )));
        }

        Ok(vec![ReservationEvent::ReservationCompleted(ReservationCompleted {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            completed_by: cmd.completed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelReservation) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("cancel")?;
        ensure_not_blank(&cmd.reason, "cancellation reason")?;

        Ok(vec![ReservationEvent::ReservationCancelled(ReservationCancelled {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            reason: cmd.reason.trim().to_string(),
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_expire(&self, cmd: &ExpireReservation) -> DomainResult<Vec<ReservationEvent>> {
        self.ensure_open("expire")?;
        if self.ledger.is_fully_allocated() {
            return Err(DomainError::invalid_state(
                "a fully allocated reservation cannot expire",
            ));
        }
        let deadline = self.expiry_deadline();
        let today = cmd.occurred_at.date_naive();
        if deadline >= today {
            return Err(DomainError::invalid_state(format!(
                "reservation deadline {deadline} has not passed on {today}"
            )));
        }

        Ok(vec![ReservationEvent::ReservationExpired(ReservationExpired {
            tenant_id: cmd.tenant_id,
            reservation_id: cmd.reservation_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
