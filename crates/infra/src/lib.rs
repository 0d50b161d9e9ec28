//! Infrastructure layer for material reservations.
//!
//! Event store, command dispatch, read-model projections, background workers
//! and the reservation application service. Everything here is in-memory and
//! synchronous; durable backends plug in behind the same traits.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod reservations;
pub mod workers;
