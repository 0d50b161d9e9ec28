//! The Reservation aggregate: commands, events and the decide/apply logic.

mod aggregate;
mod commands;
mod events;

pub use aggregate::{Approval, Closure, Reservation, ReservationId};
pub use commands::{
    AllocateMaterial, ApproveReservation, CancelAllocation, CancelReservation,
    CompleteReservation, CreateReservation, ExpireReservation, IssueMaterial, ReservationCommand,
    ReservationOptions, ReservationReference, ReturnMaterial, ReturnTarget,
    UpdateReservationDetails,
};
pub use events::{
    AllocationCancelled, MaterialAllocated, MaterialIssued, MaterialReturned,
    ReservationApproved, ReservationCancelled, ReservationCompleted, ReservationCreated,
    ReservationDetailsUpdated, ReservationEvent, ReservationExpired,
};
