//! Background workers (thread-based; the domain layer stays synchronous).

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerHandle};
