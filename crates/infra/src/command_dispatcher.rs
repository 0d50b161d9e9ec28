//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, `ExpectedVersion::Exact(loaded version)`)
//!   ↓
//! 5. Publish events to bus (for projections)
//! ```
//!
//! Each dispatch is one atomic read-modify-write of a single aggregate. Two
//! dispatches racing on the same stream load the same version; the store lets
//! only the first append through and the second gets
//! [`DispatchError::Concurrency`]. The dispatcher never retries by itself.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use forgeerp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use forgeerp_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version). The only retryable error.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    /// Domain validation failure (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),
    /// Operation not accepted from the aggregate's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Operation structurally not allowed.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// A quantity bound would be broken.
    #[error("quantity exceeded: {context} (requested: {requested}, available: {available})")]
    QuantityExceeded {
        context: String,
        requested: Decimal,
        available: Decimal,
    },
    /// Domain-level not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The aggregate already exists or otherwise conflicts with the command.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Aggregate state disagrees with itself. A bug, never retried.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// Persisting to the event store failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl DispatchError {
    /// Whether re-running the command against a freshly loaded aggregate may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }

    /// Whether the error signals corrupted state rather than a rejected command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::InvariantViolation(_)
                | DispatchError::TenantIsolation(_)
                | DispatchError::Deserialize(_)
        )
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidState(msg) => DispatchError::InvalidState(msg),
            DomainError::InvalidOperation(msg) => DispatchError::InvalidOperation(msg),
            DomainError::QuantityExceeded {
                context,
                requested,
                available,
            } => DispatchError::QuantityExceeded {
                context,
                requested,
                available,
            },
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound(msg) => DispatchError::NotFound(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
        }
    }
}

/// Outcome of a successful dispatch.
pub struct Dispatched<A: Aggregate> {
    /// Aggregate state after the decided events were applied.
    pub aggregate: A,
    /// Typed events, in the order they were appended.
    pub events: Vec<A::Event>,
    /// Committed events with their assigned sequence numbers.
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication: if append fails nothing is
/// published. If publication fails after a successful append the error is
/// returned but the events stay committed (at-least-once delivery).
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate without handling a command.
    ///
    /// An aggregate with no history comes back exactly as `make_aggregate` built it.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command and return the committed events.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: forgeerp_events::Event + Serialize + DeserializeOwned,
    {
        self.execute(tenant_id, aggregate_id, aggregate_type, &command, make_aggregate)
            .map(|dispatched| dispatched.committed)
    }

    /// Dispatch a command and return the updated aggregate alongside its new events.
    ///
    /// A command that decides no events (an idempotent no-op) appends nothing
    /// and publishes nothing.
    pub fn execute<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: forgeerp_events::Event + Serialize + DeserializeOwned,
    {
        let aggregate_type = aggregate_type.into();

        // 1) + 2) Load history and rehydrate
        let mut aggregate = self.load(tenant_id, aggregate_id, make_aggregate)?;
        let expected = ExpectedVersion::Exact(aggregate.version());

        // 3) Decide events (no mutation)
        let decided = match aggregate.handle(command) {
            Ok(events) => events,
            Err(err) => {
                let err = DispatchError::from(err);
                if err.is_fatal() {
                    error!(%tenant_id, %aggregate_id, %aggregate_type, error = %err, "aggregate state is inconsistent");
                } else {
                    debug!(%tenant_id, %aggregate_id, %aggregate_type, error = %err, "command rejected");
                }
                return Err(err);
            }
        };
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events: decided,
                committed: vec![],
            });
        }

        // 4) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = match self.store.append(uncommitted, expected) {
            Ok(committed) => committed,
            Err(err) => {
                let err = DispatchError::from(err);
                if err.is_retryable() {
                    warn!(%tenant_id, %aggregate_id, expected = ?expected, "concurrency conflict on append");
                } else {
                    warn!(%tenant_id, %aggregate_id, error = %err, "append failed");
                }
                return Err(err);
            }
        };

        for event in &decided {
            aggregate.apply(event);
        }
        info!(
            %tenant_id,
            %aggregate_id,
            %aggregate_type,
            events = committed.len(),
            version = aggregate.version(),
            "command committed"
        );

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus.publish(stored.to_envelope()).map_err(|e| {
                warn!(%tenant_id, %aggregate_id, error = ?e, "publication failed after append");
                DispatchError::Publish(format!("{e:?}"))
            })?;
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
        })
    }
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant data.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "sequence gap in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type, stored.sequence_number)))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
