//! Manufacturing material reservations (event-sourced).
//!
//! A reservation earmarks a quantity of one product for a demand (production
//! order, sales order, project...). Stock is committed to it through
//! allocations and physically consumed through issues; returns move consumed
//! stock back into the committed pool.
//!
//! This crate is pure deterministic domain logic (no IO, no HTTP, no storage).

pub mod allocation;
pub mod issue;
pub mod ledger;
pub mod reservation;
pub mod status;

pub use allocation::{Allocation, AllocationCancellation, AllocationId};
pub use issue::{Issue, IssueId};
pub use ledger::QuantityLedger;
pub use reservation::{
    AllocateMaterial, AllocationCancelled, ApproveReservation, Approval, CancelAllocation,
    CancelReservation, Closure, CompleteReservation, CreateReservation, ExpireReservation,
    IssueMaterial, MaterialAllocated, MaterialIssued, MaterialReturned, Reservation,
    ReservationApproved, ReservationCancelled, ReservationCommand, ReservationCompleted,
    ReservationCreated, ReservationDetailsUpdated, ReservationEvent, ReservationExpired,
    ReservationId, ReservationOptions, ReservationReference, ReturnMaterial, ReturnTarget,
    UpdateReservationDetails,
};
pub use status::{ReservationPriority, ReservationStatus, ReservationType};
