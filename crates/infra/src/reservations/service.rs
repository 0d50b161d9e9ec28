//! Application service over the Reservation aggregate.
//!
//! Every mutating call is one load-decide-append cycle through the
//! [`CommandDispatcher`]. Conflicts come back as
//! [`ReservationServiceError::is_retryable`] errors; wrap calls in
//! [`super::retry_on_conflict`] to re-run them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use forgeerp_core::{AggregateId, ProductId, TenantId, UserId};
use forgeerp_events::{EventBus, EventEnvelope};
use forgeerp_manufacturing::{
    AllocateMaterial, Allocation, ApproveReservation, CancelAllocation, CancelReservation,
    CompleteReservation, CreateReservation, ExpireReservation, Issue, IssueMaterial, Reservation,
    ReservationCommand, ReservationEvent, ReservationId, ReservationOptions, ReservationType,
    ReturnMaterial, UpdateReservationDetails,
};

use super::numbering::{NumberingError, ReservationNumberGenerator};
use super::retry::Retryable;
use super::AGGREGATE_TYPE;
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::event_store::EventStore;

#[derive(Debug, Error)]
pub enum ReservationServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("reservation number generation failed: {0}")]
    Numbering(#[from] NumberingError),
    #[error("reservation {0} not found")]
    NotFound(ReservationId),
    /// The aggregate committed but its events did not describe the expected record.
    #[error("committed events are missing the {0}")]
    MissingRecord(&'static str),
}

impl ReservationServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReservationServiceError::Dispatch(e) if e.is_retryable())
    }
}

impl Retryable for ReservationServiceError {
    fn is_retryable(&self) -> bool {
        ReservationServiceError::is_retryable(self)
    }
}

/// Input of [`ReservationService::create`]: everything but the id and number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub unit: String,
    pub required_quantity: Decimal,
    pub required_date: NaiveDate,
    pub reservation_type: ReservationType,
    pub options: ReservationOptions,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Result of an allocation: the updated reservation and the allocation it created.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub reservation: Reservation,
    pub allocation: Allocation,
}

/// Result of an issue: the updated reservation and the issue(s) it recorded.
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub reservation: Reservation,
    pub issues: Vec<Issue>,
}

type Result<T> = core::result::Result<T, ReservationServiceError>;

pub struct ReservationService<S, B, N> {
    dispatcher: CommandDispatcher<S, B>,
    numbers: N,
}

impl<S, B, N> ReservationService<S, B, N>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    N: ReservationNumberGenerator,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>, numbers: N) -> Self {
        Self {
            dispatcher,
            numbers,
        }
    }

    /// Record a new reservation with a freshly generated id and number.
    pub fn create(&self, request: NewReservation) -> Result<Reservation> {
        let reservation_id = ReservationId::new(AggregateId::new());
        let reservation_number = self
            .numbers
            .next_number(request.tenant_id, request.occurred_at.date_naive())?;

        let command = ReservationCommand::Create(CreateReservation {
            tenant_id: request.tenant_id,
            reservation_id,
            reservation_number,
            product_id: request.product_id,
            unit: request.unit,
            required_quantity: request.required_quantity,
            required_date: request.required_date,
            reservation_type: request.reservation_type,
            options: request.options,
            requested_by: request.requested_by,
            occurred_at: request.occurred_at,
        });

        let reservation = self.run(command)?.aggregate;
        info!(
            tenant_id = %request.tenant_id,
            reservation_id = %reservation_id,
            number = reservation.reservation_number(),
            "reservation created"
        );
        Ok(reservation)
    }

    /// Current state of a reservation, rebuilt from its stream.
    pub fn get(&self, tenant_id: TenantId, reservation_id: ReservationId) -> Result<Reservation> {
        let reservation = self.dispatcher.load(tenant_id, reservation_id.0, |_, id| {
            Reservation::empty(ReservationId::new(id))
        })?;
        if !reservation.is_created() {
            return Err(ReservationServiceError::NotFound(reservation_id));
        }
        Ok(reservation)
    }

    pub fn update_details(&self, command: UpdateReservationDetails) -> Result<Reservation> {
        self.run(ReservationCommand::UpdateDetails(command))
            .map(|d| d.aggregate)
    }

    pub fn approve(&self, command: ApproveReservation) -> Result<Reservation> {
        self.run(ReservationCommand::Approve(command))
            .map(|d| d.aggregate)
    }

    pub fn allocate(&self, command: AllocateMaterial) -> Result<AllocationOutcome> {
        let dispatched = self.run(ReservationCommand::Allocate(command))?;

        let allocation_id = dispatched
            .events
            .iter()
            .find_map(|e| match e {
                ReservationEvent::MaterialAllocated(a) => Some(a.allocation_id),
                _ => None,
            })
            .ok_or(ReservationServiceError::MissingRecord("allocation"))?;
        let allocation = dispatched
            .aggregate
            .allocation(allocation_id)
            .cloned()
            .ok_or(ReservationServiceError::MissingRecord("allocation"))?;

        Ok(AllocationOutcome {
            reservation: dispatched.aggregate,
            allocation,
        })
    }

    pub fn issue(&self, command: IssueMaterial) -> Result<IssueOutcome> {
        let dispatched = self.run(ReservationCommand::Issue(command))?;

        let issues = dispatched
            .events
            .iter()
            .filter_map(|e| match e {
                ReservationEvent::MaterialIssued(i) => dispatched.aggregate.issue(i.issue_id).cloned(),
                _ => None,
            })
            .collect::<Vec<_>>();
        if issues.is_empty() {
            return Err(ReservationServiceError::MissingRecord("issue"));
        }

        Ok(IssueOutcome {
            reservation: dispatched.aggregate,
            issues,
        })
    }

    pub fn return_material(&self, command: ReturnMaterial) -> Result<Reservation> {
        self.run(ReservationCommand::Return(command))
            .map(|d| d.aggregate)
    }

    pub fn cancel_allocation(&self, command: CancelAllocation) -> Result<Reservation> {
        self.run(ReservationCommand::CancelAllocation(command))
            .map(|d| d.aggregate)
    }

    pub fn complete(&self, command: CompleteReservation) -> Result<Reservation> {
        self.run(ReservationCommand::Complete(command))
            .map(|d| d.aggregate)
    }

    pub fn cancel(&self, command: CancelReservation) -> Result<Reservation> {
        self.run(ReservationCommand::Cancel(command))
            .map(|d| d.aggregate)
    }

    pub fn expire(&self, command: ExpireReservation) -> Result<Reservation> {
        self.run(ReservationCommand::Expire(command))
            .map(|d| d.aggregate)
    }

    /// Periodic sweep: expire every candidate whose deadline has passed.
    ///
    /// Candidates that are not (or no longer) expirable are skipped. Returns the
    /// ids that were expired; stops at the first error that is not a rejection.
    pub fn expire_overdue(
        &self,
        tenant_id: TenantId,
        candidates: impl IntoIterator<Item = ReservationId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>> {
        let mut expired = Vec::new();
        for reservation_id in candidates {
            let command = ExpireReservation {
                tenant_id,
                reservation_id,
                occurred_at: now,
            };
            match self.expire(command) {
                Ok(_) => expired.push(reservation_id),
                Err(ReservationServiceError::Dispatch(
                    DispatchError::InvalidState(_) | DispatchError::NotFound(_),
                )) => continue,
                Err(err) => return Err(err),
            }
        }
        if !expired.is_empty() {
            info!(%tenant_id, count = expired.len(), "expired overdue reservations");
        }
        Ok(expired)
    }

    fn run(&self, command: ReservationCommand) -> Result<Dispatched<Reservation>> {
        let tenant_id = command.tenant_id();
        let reservation_id = command.reservation_id();

        let dispatched = self.dispatcher.execute(
            tenant_id,
            reservation_id.0,
            AGGREGATE_TYPE,
            &command,
            |_, id| Reservation::empty(ReservationId::new(id)),
        )?;

        Ok(dispatched)
    }
}
