//! Reservation application layer: numbering, the service and conflict retry.

pub mod numbering;
pub mod retry;
pub mod service;

pub use numbering::{NumberingError, ReservationNumberGenerator, SequentialNumberGenerator};
pub use retry::{retry_on_conflict, RetryPolicy, Retryable};
pub use service::{
    AllocationOutcome, IssueOutcome, NewReservation, ReservationService, ReservationServiceError,
};

/// Aggregate type of reservation streams in the event store.
pub const AGGREGATE_TYPE: &str = "manufacturing.reservation";
