//! Reservation list read model: filters and summaries for planners.
//!
//! Built from published `manufacturing.reservation` envelopes. Reads are
//! advisory snapshots; decisions are always taken on the aggregate.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use forgeerp_core::{AggregateId, ProductId, TenantId, WarehouseId};
use forgeerp_events::EventEnvelope;
use forgeerp_manufacturing::{
    QuantityLedger, ReservationEvent, ReservationId, ReservationPriority, ReservationStatus,
    ReservationType,
};

use crate::projections::cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
use crate::read_model::TenantStore;
use crate::reservations::AGGREGATE_TYPE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationReadModel {
    pub reservation_id: ReservationId,
    pub reservation_number: String,
    pub product_id: ProductId,
    pub unit: String,
    pub reservation_type: ReservationType,
    pub production_order_id: Option<AggregateId>,
    /// Warehouse hint plus every warehouse stock was allocated from.
    pub warehouse_ids: Vec<WarehouseId>,
    /// Pinned lot plus every allocated lot.
    pub lot_numbers: Vec<String>,
    pub status: ReservationStatus,
    pub priority: ReservationPriority,
    pub is_urgent: bool,
    pub requires_approval: bool,
    pub is_approved: bool,
    pub required_quantity: Decimal,
    pub allocated_quantity: Decimal,
    pub issued_quantity: Decimal,
    pub returned_quantity: Decimal,
    pub required_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub requested_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl ReservationReadModel {
    pub fn net_issued_quantity(&self) -> Decimal {
        self.issued_quantity - self.returned_quantity
    }

    pub fn remaining_to_allocate(&self) -> Decimal {
        self.required_quantity - self.allocated_quantity
    }

    pub fn is_pending_approval(&self) -> bool {
        self.requires_approval && !self.is_approved && !self.status.is_terminal()
    }

    fn rederive_status(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        let ledger = QuantityLedger::from_parts(
            self.required_quantity,
            self.allocated_quantity,
            self.issued_quantity,
            self.returned_quantity,
        );
        self.status = ReservationStatus::derive(&ledger);
    }
}

/// Conjunctive filter over the list read model. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Only non-terminal reservations.
    pub active_only: bool,
    pub status: Option<ReservationStatus>,
    pub product_id: Option<ProductId>,
    pub production_order_id: Option<AggregateId>,
    pub warehouse_id: Option<WarehouseId>,
    pub urgent_only: bool,
    pub pending_approval_only: bool,
    /// Inclusive required-date range.
    pub required_from: Option<NaiveDate>,
    pub required_to: Option<NaiveDate>,
    pub lot_number: Option<String>,
}

impl ReservationQuery {
    pub fn matches(&self, rm: &ReservationReadModel) -> bool {
        if self.active_only && rm.status.is_terminal() {
            return false;
        }
        if self.status.is_some_and(|s| s != rm.status) {
            return false;
        }
        if self.product_id.is_some_and(|p| p != rm.product_id) {
            return false;
        }
        if self
            .production_order_id
            .is_some_and(|o| rm.production_order_id != Some(o))
        {
            return false;
        }
        if self
            .warehouse_id
            .is_some_and(|w| !rm.warehouse_ids.contains(&w))
        {
            return false;
        }
        if self.urgent_only && !(rm.is_urgent || rm.priority == ReservationPriority::Urgent) {
            return false;
        }
        if self.pending_approval_only && !rm.is_pending_approval() {
            return false;
        }
        if self.required_from.is_some_and(|from| rm.required_date < from) {
            return false;
        }
        if self.required_to.is_some_and(|to| rm.required_date > to) {
            return false;
        }
        if let Some(lot) = &self.lot_number {
            if !rm.lot_numbers.iter().any(|l| l == lot) {
                return false;
            }
        }
        true
    }
}

/// Tenant-wide counts and totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReservationSummary {
    pub total_reservations: usize,
    pub pending_approval: usize,
    pub approved: usize,
    pub active: usize,
    pub fully_allocated: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub expired: usize,
    pub total_required_quantity: Decimal,
    pub total_allocated_quantity: Decimal,
    /// Net of returns.
    pub total_issued_quantity: Decimal,
}

/// Totals of one product across its reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductReservationSummary {
    pub product_id: ProductId,
    pub reservations: usize,
    pub pending_reservations: usize,
    pub total_required: Decimal,
    pub total_allocated: Decimal,
    /// Net of returns.
    pub total_issued: Decimal,
}

#[derive(Debug, Error)]
pub enum ReservationProjectionError {
    #[error("failed to deserialize reservation event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
    #[error("event for unknown reservation {0}")]
    UnknownReservation(ReservationId),
}

pub const PROJECTION_NAME: &str = "manufacturing.reservations";

#[derive(Debug)]
pub struct ReservationsProjection<S, C = InMemoryCursorStore>
where
    S: TenantStore<ReservationId, ReservationReadModel>,
{
    store: S,
    cursors: Arc<C>,
    projection_name: String,
    /// Envelopes that arrived ahead of their predecessors, per stream.
    pending: Mutex<HashMap<(TenantId, AggregateId), BTreeMap<u64, EventEnvelope<JsonValue>>>>,
}

impl<S> ReservationsProjection<S>
where
    S: TenantStore<ReservationId, ReservationReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Arc::new(InMemoryCursorStore::new()),
            projection_name: PROJECTION_NAME.to_string(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_persistent_cursors<C: ProjectionCursorStore + 'static>(
        self,
        cursor_store: Arc<C>,
        projection_name: impl Into<String>,
    ) -> ReservationsProjection<S, C> {
        ReservationsProjection {
            store: self.store,
            cursors: cursor_store,
            projection_name: projection_name.into(),
            pending: self.pending,
        }
    }
}

impl<S, C> ReservationsProjection<S, C>
where
    S: TenantStore<ReservationId, ReservationReadModel>,
    C: ProjectionCursorStore + 'static,
{
    fn get_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.cursors
            .get_cursor(tenant_id, aggregate_id, &self.projection_name)
            .unwrap_or(0)
    }

    fn pending(
        &self,
    ) -> MutexGuard<'_, HashMap<(TenantId, AggregateId), BTreeMap<u64, EventEnvelope<JsonValue>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of envelopes held back waiting for a missing predecessor.
    pub fn pending_count(&self, tenant_id: TenantId) -> usize {
        self.pending()
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, buffered)| buffered.len())
            .sum()
    }

    pub fn get(&self, tenant_id: TenantId, reservation_id: &ReservationId) -> Option<ReservationReadModel> {
        self.store.get(tenant_id, reservation_id)
    }

    /// Matching reservations, ordered by required date then number.
    pub fn find(&self, tenant_id: TenantId, query: &ReservationQuery) -> Vec<ReservationReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|rm| query.matches(rm))
            .collect();
        rows.sort_by(|a, b| {
            (a.required_date, &a.reservation_number).cmp(&(b.required_date, &b.reservation_number))
        });
        rows
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<ReservationReadModel> {
        self.find(tenant_id, &ReservationQuery::default())
    }

    pub fn active(&self, tenant_id: TenantId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                active_only: true,
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_status(&self, tenant_id: TenantId, status: ReservationStatus) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                status: Some(status),
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_product(&self, tenant_id: TenantId, product_id: ProductId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                product_id: Some(product_id),
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_production_order(&self, tenant_id: TenantId, order_id: AggregateId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                production_order_id: Some(order_id),
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_warehouse(&self, tenant_id: TenantId, warehouse_id: WarehouseId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                warehouse_id: Some(warehouse_id),
                ..ReservationQuery::default()
            },
        )
    }

    pub fn urgent(&self, tenant_id: TenantId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                active_only: true,
                urgent_only: true,
                ..ReservationQuery::default()
            },
        )
    }

    pub fn pending_approval(&self, tenant_id: TenantId) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                pending_approval_only: true,
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_required_date(&self, tenant_id: TenantId, from: NaiveDate, to: NaiveDate) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                required_from: Some(from),
                required_to: Some(to),
                ..ReservationQuery::default()
            },
        )
    }

    pub fn by_lot(&self, tenant_id: TenantId, lot_number: impl Into<String>) -> Vec<ReservationReadModel> {
        self.find(
            tenant_id,
            &ReservationQuery {
                lot_number: Some(lot_number.into()),
                ..ReservationQuery::default()
            },
        )
    }

    /// Non-terminal, under-allocated reservations whose deadline lies before `today`.
    ///
    /// Candidates for the expiry sweep; the aggregate re-checks each one.
    pub fn overdue(&self, tenant_id: TenantId, today: NaiveDate) -> Vec<ReservationId> {
        self.active(tenant_id)
            .into_iter()
            .filter(|rm| rm.allocated_quantity < rm.required_quantity)
            .filter(|rm| {
                let deadline = rm
                    .expiry_date
                    .map_or(rm.required_date, |e| e.max(rm.required_date));
                deadline < today
            })
            .map(|rm| rm.reservation_id)
            .collect()
    }

    pub fn summary(&self, tenant_id: TenantId) -> ReservationSummary {
        self.store
            .list(tenant_id)
            .iter()
            .fold(ReservationSummary::default(), |mut s, rm| {
                s.total_reservations += 1;
                if rm.is_pending_approval() {
                    s.pending_approval += 1;
                }
                if rm.is_approved {
                    s.approved += 1;
                }
                match rm.status {
                    ReservationStatus::FullyAllocated => s.fully_allocated += 1,
                    ReservationStatus::Completed => s.completed += 1,
                    ReservationStatus::Cancelled => s.cancelled += 1,
                    ReservationStatus::Expired => s.expired += 1,
                    _ => {}
                }
                if !rm.status.is_terminal() {
                    s.active += 1;
                }
                s.total_required_quantity += rm.required_quantity;
                s.total_allocated_quantity += rm.allocated_quantity;
                s.total_issued_quantity += rm.net_issued_quantity();
                s
            })
    }

    /// Per-product totals, ordered by product id.
    pub fn summary_by_product(&self, tenant_id: TenantId) -> Vec<ProductReservationSummary> {
        let mut by_product: BTreeMap<ProductId, ProductReservationSummary> = BTreeMap::new();
        for rm in self.store.list(tenant_id) {
            let entry = by_product
                .entry(rm.product_id)
                .or_insert_with(|| ProductReservationSummary {
                    product_id: rm.product_id,
                    reservations: 0,
                    pending_reservations: 0,
                    total_required: Decimal::ZERO,
                    total_allocated: Decimal::ZERO,
                    total_issued: Decimal::ZERO,
                });
            entry.reservations += 1;
            if rm.is_pending_approval() {
                entry.pending_reservations += 1;
            }
            entry.total_required += rm.required_quantity;
            entry.total_allocated += rm.allocated_quantity;
            entry.total_issued += rm.net_issued_quantity();
        }
        by_product.into_values().collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ReservationProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ReservationProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            self.pending()
                .entry((tenant_id, aggregate_id))
                .or_default()
                .entry(seq)
                .or_insert_with(|| envelope.clone());
            return Ok(());
        }

        self.apply_next(envelope)?;
        self.drain_pending(tenant_id, aggregate_id, seq)
    }

    /// Applies buffered envelopes for one stream while they follow on from `last`.
    fn drain_pending(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        mut last: u64,
    ) -> Result<(), ReservationProjectionError> {
        loop {
            let next = {
                let mut pending = self.pending();
                let key = (tenant_id, aggregate_id);
                let Some(buffered) = pending.get_mut(&key) else {
                    return Ok(());
                };
                *buffered = buffered.split_off(&(last + 1));
                let next = buffered.remove(&(last + 1));
                if buffered.is_empty() {
                    pending.remove(&key);
                }
                next
            };
            let Some(envelope) = next else {
                return Ok(());
            };
            self.apply_next(&envelope)?;
            last = envelope.sequence_number();
        }
    }

    /// Applies an envelope already known to be the stream's next sequence number.
    fn apply_next(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ReservationProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let ev: ReservationEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ReservationProjectionError::Deserialize(e.to_string()))?;

        if ev.tenant_id() != tenant_id {
            return Err(ReservationProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        let reservation_id = ev.reservation_id();
        if reservation_id.0 != aggregate_id {
            return Err(ReservationProjectionError::TenantIsolation(
                "event reservation_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let rm = match ev {
            ReservationEvent::ReservationCreated(e) => {
                let mut warehouse_ids = Vec::new();
                warehouse_ids.extend(e.options.warehouse_id);
                let mut lot_numbers = Vec::new();
                lot_numbers.extend(e.options.lot_number.clone());

                ReservationReadModel {
                    reservation_id: e.reservation_id,
                    reservation_number: e.reservation_number,
                    product_id: e.product_id,
                    unit: e.unit,
                    reservation_type: e.reservation_type,
                    production_order_id: e
                        .options
                        .reference
                        .as_ref()
                        .and_then(|r| r.production_order_id()),
                    warehouse_ids,
                    lot_numbers,
                    status: ReservationStatus::Active,
                    priority: e.options.priority,
                    is_urgent: e.options.is_urgent,
                    requires_approval: e.options.requires_approval,
                    is_approved: false,
                    required_quantity: e.required_quantity,
                    allocated_quantity: Decimal::ZERO,
                    issued_quantity: Decimal::ZERO,
                    returned_quantity: Decimal::ZERO,
                    required_date: e.required_date,
                    expiry_date: e.options.expiry_date,
                    requested_date: e.occurred_at,
                    notes: e.options.notes,
                }
            }
            other => {
                let mut rm = self
                    .store
                    .get(tenant_id, &reservation_id)
                    .ok_or(ReservationProjectionError::UnknownReservation(reservation_id))?;
                apply_to_read_model(&mut rm, other);
                rm
            }
        };

        self.store.upsert(tenant_id, reservation_id, rm);
        self.cursors
            .update_cursor(tenant_id, aggregate_id, &self.projection_name, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ReservationProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort();
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
            self.cursors.clear_cursors(t, &self.projection_name);
            self.pending().retain(|(tenant, _), _| *tenant != t);
        }

        envs.sort_by_key(|e| (e.tenant_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn apply_to_read_model(rm: &mut ReservationReadModel, event: ReservationEvent) {
    match event {
        ReservationEvent::ReservationCreated(_) => {}
        ReservationEvent::ReservationDetailsUpdated(e) => {
            if let Some(date) = e.required_date {
                rm.required_date = date;
            }
            if let Some(priority) = e.priority {
                rm.priority = priority;
            }
            if let Some(is_urgent) = e.is_urgent {
                rm.is_urgent = is_urgent;
            }
            if e.notes.is_some() {
                rm.notes = e.notes;
            }
        }
        ReservationEvent::ReservationApproved(_) => {
            rm.is_approved = true;
        }
        ReservationEvent::MaterialAllocated(e) => {
            rm.allocated_quantity += e.quantity;
            if !rm.warehouse_ids.contains(&e.warehouse_id) {
                rm.warehouse_ids.push(e.warehouse_id);
            }
            if let Some(lot) = e.lot_number {
                if !rm.lot_numbers.contains(&lot) {
                    rm.lot_numbers.push(lot);
                }
            }
            rm.rederive_status();
        }
        ReservationEvent::AllocationCancelled(e) => {
            rm.allocated_quantity -= e.quantity;
            rm.rederive_status();
        }
        ReservationEvent::MaterialIssued(e) => {
            rm.issued_quantity += e.quantity;
            rm.rederive_status();
        }
        ReservationEvent::MaterialReturned(e) => {
            rm.returned_quantity += e.quantity;
            rm.rederive_status();
        }
        ReservationEvent::ReservationCompleted(_) => rm.status = ReservationStatus::Completed,
        ReservationEvent::ReservationCancelled(_) => rm.status = ReservationStatus::Cancelled,
        ReservationEvent::ReservationExpired(_) => rm.status = ReservationStatus::Expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use forgeerp_core::UserId;
    use forgeerp_events::Event;
    use forgeerp_manufacturing::{
        AllocationId, IssueId, MaterialAllocated, MaterialIssued, MaterialReturned,
        ReservationCancelled, ReservationCreated, ReservationOptions, ReservationReference,
    };
    use uuid::Uuid;

    use crate::read_model::InMemoryTenantStore;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn qty(v: i64) -> Decimal {
        Decimal::from(v)
    }

    /// One reservation stream; hands out envelopes with consecutive sequence numbers.
    struct Stream {
        tenant_id: TenantId,
        reservation_id: ReservationId,
        user: UserId,
        seq: u64,
    }

    impl Stream {
        fn new(tenant_id: TenantId) -> Self {
            Self {
                tenant_id,
                reservation_id: ReservationId::new(AggregateId::new()),
                user: UserId::new(),
                seq: 0,
            }
        }

        fn envelope(&mut self, event: ReservationEvent) -> EventEnvelope<JsonValue> {
            self.seq += 1;
            EventEnvelope::new(
                Uuid::now_v7(),
                self.tenant_id,
                self.reservation_id.0,
                AGGREGATE_TYPE,
                event.event_type(),
                self.seq,
                serde_json::to_value(&event).unwrap(),
            )
        }

        fn created(
            &mut self,
            number: &str,
            product_id: ProductId,
            required: i64,
            required_date: NaiveDate,
            options: ReservationOptions,
        ) -> EventEnvelope<JsonValue> {
            let event = ReservationEvent::ReservationCreated(ReservationCreated {
                tenant_id: self.tenant_id,
                reservation_id: self.reservation_id,
                reservation_number: number.to_string(),
                product_id,
                unit: "pcs".to_string(),
                required_quantity: qty(required),
                required_date,
                reservation_type: ReservationType::ProductionOrder,
                options,
                requested_by: self.user,
                occurred_at: at(),
            });
            self.envelope(event)
        }

        fn allocated(&mut self, id: u32, quantity: i64, warehouse_id: WarehouseId, lot: Option<&str>) -> EventEnvelope<JsonValue> {
            let event = ReservationEvent::MaterialAllocated(MaterialAllocated {
                tenant_id: self.tenant_id,
                reservation_id: self.reservation_id,
                allocation_id: AllocationId(id),
                quantity: qty(quantity),
                warehouse_id,
                location_id: None,
                lot_number: lot.map(str::to_string),
                serial_number: None,
                stock_id: None,
                allocated_by: self.user,
                occurred_at: at(),
            });
            self.envelope(event)
        }

        fn issued(&mut self, id: u32, allocation: u32, quantity: i64, warehouse_id: WarehouseId) -> EventEnvelope<JsonValue> {
            let event = ReservationEvent::MaterialIssued(MaterialIssued {
                tenant_id: self.tenant_id,
                reservation_id: self.reservation_id,
                issue_id: IssueId(id),
                allocation_id: AllocationId(allocation),
                quantity: qty(quantity),
                warehouse_id,
                location_id: None,
                lot_number: None,
                serial_number: None,
                stock_movement_id: None,
                issued_by: self.user,
                occurred_at: at(),
            });
            self.envelope(event)
        }

        fn returned(&mut self, issue: u32, allocation: u32, quantity: i64) -> EventEnvelope<JsonValue> {
            let event = ReservationEvent::MaterialReturned(MaterialReturned {
                tenant_id: self.tenant_id,
                reservation_id: self.reservation_id,
                issue_id: IssueId(issue),
                allocation_id: AllocationId(allocation),
                quantity: qty(quantity),
                reason: None,
                returned_by: self.user,
                occurred_at: at(),
            });
            self.envelope(event)
        }

        fn cancelled(&mut self) -> EventEnvelope<JsonValue> {
            let event = ReservationEvent::ReservationCancelled(ReservationCancelled {
                tenant_id: self.tenant_id,
                reservation_id: self.reservation_id,
                reason: "order withdrawn".to_string(),
                cancelled_by: self.user,
                occurred_at: at(),
            });
            self.envelope(event)
        }
    }

    fn projection() -> ReservationsProjection<InMemoryTenantStore<ReservationId, ReservationReadModel>> {
        ReservationsProjection::new(InMemoryTenantStore::new())
    }

    #[test]
    fn builds_read_model_and_derives_status() {
        let p = projection();
        let tenant = TenantId::new();
        let product = ProductId::new();
        let warehouse = WarehouseId::new();
        let mut s = Stream::new(tenant);

        p.apply_envelope(&s.created("MR-1", product, 10, date(10), ReservationOptions::default())).unwrap();
        p.apply_envelope(&s.allocated(1, 10, warehouse, Some("LOT-7"))).unwrap();
        p.apply_envelope(&s.issued(1, 1, 4, warehouse)).unwrap();
        p.apply_envelope(&s.returned(1, 1, 1)).unwrap();

        let rm = p.get(tenant, &s.reservation_id).unwrap();
        assert_eq!(rm.allocated_quantity, qty(10));
        assert_eq!(rm.issued_quantity, qty(4));
        assert_eq!(rm.returned_quantity, qty(1));
        assert_eq!(rm.net_issued_quantity(), qty(3));
        assert_eq!(rm.status, ReservationStatus::PartiallyConsumed);
        assert_eq!(rm.warehouse_ids, vec![warehouse]);
        assert_eq!(rm.lot_numbers, vec!["LOT-7".to_string()]);
        assert_eq!(p.by_lot(tenant, "LOT-7").len(), 1);
        assert_eq!(p.by_warehouse(tenant, warehouse).len(), 1);
    }

    #[test]
    fn replayed_envelopes_are_ignored_and_sequence_zero_rejected() {
        let p = projection();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let mut s = Stream::new(tenant);

        let created = s.created("MR-1", ProductId::new(), 10, date(10), ReservationOptions::default());
        let allocated = s.allocated(1, 5, warehouse, None);
        p.apply_envelope(&created).unwrap();
        p.apply_envelope(&allocated).unwrap();
        p.apply_envelope(&allocated).unwrap();
        assert_eq!(p.get(tenant, &s.reservation_id).unwrap().allocated_quantity, qty(5));

        let zero = EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            s.reservation_id.0,
            AGGREGATE_TYPE,
            allocated.event_type(),
            0,
            allocated.payload().clone(),
        );
        assert!(matches!(
            p.apply_envelope(&zero),
            Err(ReservationProjectionError::NonMonotonicSequence { last: 2, found: 0 })
        ));
    }

    #[test]
    fn early_envelopes_wait_for_the_gap_to_close() {
        let p = projection();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let mut s = Stream::new(tenant);

        let created = s.created("MR-1", ProductId::new(), 10, date(10), ReservationOptions::default());
        let first = s.allocated(1, 4, warehouse, None);
        let second = s.allocated(2, 3, warehouse, None);

        p.apply_envelope(&created).unwrap();
        p.apply_envelope(&second).unwrap();
        assert_eq!(p.get(tenant, &s.reservation_id).unwrap().allocated_quantity, qty(0));
        assert_eq!(p.pending_count(tenant), 1);

        p.apply_envelope(&first).unwrap();
        let rm = p.get(tenant, &s.reservation_id).unwrap();
        assert_eq!(rm.allocated_quantity, qty(7));
        assert_eq!(rm.status, ReservationStatus::PartiallyAllocated);
        assert_eq!(p.pending_count(tenant), 0);

        // Late duplicates of either are still ignored.
        p.apply_envelope(&second).unwrap();
        p.apply_envelope(&first).unwrap();
        assert_eq!(p.get(tenant, &s.reservation_id).unwrap().allocated_quantity, qty(7));
    }

    #[test]
    fn stream_arriving_fully_reversed_still_converges() {
        let p = projection();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let mut s = Stream::new(tenant);

        let envelopes = vec![
            s.created("MR-1", ProductId::new(), 10, date(10), ReservationOptions::default()),
            s.allocated(1, 10, warehouse, None),
            s.issued(1, 1, 6, warehouse),
            s.returned(1, 1, 2),
        ];
        for env in envelopes.iter().rev() {
            p.apply_envelope(env).unwrap();
        }

        let rm = p.get(tenant, &s.reservation_id).unwrap();
        assert_eq!(rm.allocated_quantity, qty(10));
        assert_eq!(rm.net_issued_quantity(), qty(4));
        assert_eq!(rm.status, ReservationStatus::PartiallyConsumed);
        assert_eq!(p.pending_count(tenant), 0);
    }

    #[test]
    fn envelope_tenant_must_match_payload() {
        let p = projection();
        let mut s = Stream::new(TenantId::new());
        let env = s.created("MR-1", ProductId::new(), 10, date(10), ReservationOptions::default());

        let forged = EventEnvelope::new(
            env.event_id(),
            TenantId::new(),
            env.aggregate_id(),
            env.aggregate_type(),
            env.event_type(),
            env.sequence_number(),
            env.payload().clone(),
        );
        assert!(matches!(
            p.apply_envelope(&forged),
            Err(ReservationProjectionError::TenantIsolation(_))
        ));
    }

    #[test]
    fn other_aggregate_types_are_skipped() {
        let p = projection();
        let tenant = TenantId::new();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            tenant,
            AggregateId::new(),
            "manufacturing.production_order",
            "manufacturing.production_order.released",
            1,
            serde_json::json!({ "anything": true }),
        );
        p.apply_envelope(&env).unwrap();
        assert!(p.list(tenant).is_empty());
    }

    #[test]
    fn filters_and_summaries() {
        let p = projection();
        let tenant = TenantId::new();
        let bolts = ProductId::new();
        let nuts = ProductId::new();
        let warehouse = WarehouseId::new();
        let order = AggregateId::new();

        let mut urgent = Stream::new(tenant);
        p.apply_envelope(&urgent.created(
            "MR-1",
            bolts,
            10,
            date(5),
            ReservationOptions {
                is_urgent: true,
                reference: Some(ReservationReference::ProductionOrder {
                    order_id: order,
                    line_id: None,
                    bom_line_id: None,
                }),
                ..ReservationOptions::default()
            },
        ))
        .unwrap();
        p.apply_envelope(&urgent.allocated(1, 10, warehouse, None)).unwrap();

        let mut gated = Stream::new(tenant);
        p.apply_envelope(&gated.created(
            "MR-2",
            bolts,
            4,
            date(20),
            ReservationOptions {
                requires_approval: true,
                ..ReservationOptions::default()
            },
        ))
        .unwrap();

        let mut dropped = Stream::new(tenant);
        p.apply_envelope(&dropped.created("MR-3", nuts, 7, date(12), ReservationOptions::default())).unwrap();
        p.apply_envelope(&dropped.cancelled()).unwrap();

        assert_eq!(p.list(tenant).len(), 3);
        assert_eq!(p.active(tenant).len(), 2);
        assert_eq!(p.urgent(tenant)[0].reservation_number, "MR-1");
        assert_eq!(p.pending_approval(tenant)[0].reservation_number, "MR-2");
        assert_eq!(p.by_production_order(tenant, order).len(), 1);
        assert_eq!(p.by_status(tenant, ReservationStatus::FullyAllocated).len(), 1);
        assert_eq!(p.by_product(tenant, bolts).len(), 2);
        let window = p.by_required_date(tenant, date(1), date(12));
        assert_eq!(
            window.iter().map(|r| r.reservation_number.as_str()).collect::<Vec<_>>(),
            vec!["MR-1", "MR-3"]
        );

        let summary = p.summary(tenant);
        assert_eq!(summary.total_reservations, 3);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.pending_approval, 1);
        assert_eq!(summary.fully_allocated, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.total_required_quantity, qty(21));
        assert_eq!(summary.total_allocated_quantity, qty(10));

        let per_product = p.summary_by_product(tenant);
        let bolt_totals = per_product.iter().find(|s| s.product_id == bolts).unwrap();
        assert_eq!(bolt_totals.reservations, 2);
        assert_eq!(bolt_totals.pending_reservations, 1);
        assert_eq!(bolt_totals.total_required, qty(14));

        assert!(p.list(TenantId::new()).is_empty());
    }

    #[test]
    fn overdue_lists_only_under_allocated_open_reservations() {
        let p = projection();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();

        let mut late = Stream::new(tenant);
        p.apply_envelope(&late.created("MR-1", ProductId::new(), 10, date(3), ReservationOptions::default())).unwrap();

        let mut covered = Stream::new(tenant);
        p.apply_envelope(&covered.created("MR-2", ProductId::new(), 5, date(3), ReservationOptions::default())).unwrap();
        p.apply_envelope(&covered.allocated(1, 5, warehouse, None)).unwrap();

        let mut extended = Stream::new(tenant);
        p.apply_envelope(&extended.created(
            "MR-3",
            ProductId::new(),
            5,
            date(3),
            ReservationOptions {
                expiry_date: Some(date(20)),
                ..ReservationOptions::default()
            },
        ))
        .unwrap();

        assert_eq!(p.overdue(tenant, date(10)), vec![late.reservation_id]);
        assert!(p.overdue(tenant, date(3)).is_empty());
    }

    #[test]
    fn rebuild_from_scratch_is_deterministic() {
        let p = projection();
        let tenant = TenantId::new();
        let warehouse = WarehouseId::new();
        let mut s = Stream::new(tenant);

        let envs = vec![
            s.created("MR-1", ProductId::new(), 10, date(10), ReservationOptions::default()),
            s.allocated(1, 6, warehouse, None),
            s.issued(1, 1, 2, warehouse),
        ];
        for env in &envs {
            p.apply_envelope(env).unwrap();
        }
        let before = p.get(tenant, &s.reservation_id).unwrap();

        let mut shuffled = envs.clone();
        shuffled.reverse();
        p.rebuild_from_scratch(shuffled).unwrap();

        assert_eq!(p.get(tenant, &s.reservation_id).unwrap(), before);
    }
}
