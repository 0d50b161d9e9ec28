//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: Can be reconstructed from the event stream
//! - **Tenant-isolated**: Data is partitioned by tenant
//! - **Idempotent**: Safe for at-least-once delivery

pub mod cursor_store;
pub mod reservations;

pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
pub use reservations::{
    ProductReservationSummary, ReservationProjectionError, ReservationQuery,
    ReservationReadModel, ReservationSummary, ReservationsProjection,
};
