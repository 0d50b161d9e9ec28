//! Reservation number generation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use thiserror::Error;

use forgeerp_core::TenantId;

use crate::config::ReservationConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NumberingError {
    #[error("number sequence unavailable: {0}")]
    Unavailable(String),
    #[error("number sequence exhausted for {date} (width {width})")]
    Exhausted { date: NaiveDate, width: usize },
    #[error("cannot number {date}: the sequence has already moved on to {current}")]
    DateBehindSequence { date: NaiveDate, current: NaiveDate },
}

/// Source of unique, human-readable reservation numbers.
///
/// Called exactly once per reservation, before the creation command is decided.
pub trait ReservationNumberGenerator: Send + Sync {
    fn next_number(&self, tenant_id: TenantId, date: NaiveDate) -> Result<String, NumberingError>;
}

impl<G> ReservationNumberGenerator for std::sync::Arc<G>
where
    G: ReservationNumberGenerator + ?Sized,
{
    fn next_number(&self, tenant_id: TenantId, date: NaiveDate) -> Result<String, NumberingError> {
        (**self).next_number(tenant_id, date)
    }
}

/// Per-tenant, per-day counter: `<PREFIX>-<YYYYMMDD>-<seq>`.
///
/// Only the current day is kept per tenant. A request dated before it is
/// refused, since its earlier numbers are no longer known.
#[derive(Debug)]
pub struct SequentialNumberGenerator {
    prefix: String,
    width: usize,
    counters: Mutex<HashMap<TenantId, DayCounter>>,
}

#[derive(Debug, Clone, Copy)]
struct DayCounter {
    date: NaiveDate,
    last: u64,
}

impl SequentialNumberGenerator {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ReservationConfig) -> Self {
        Self::new(config.number_prefix.clone(), config.number_width)
    }
}

impl ReservationNumberGenerator for SequentialNumberGenerator {
    fn next_number(&self, tenant_id: TenantId, date: NaiveDate) -> Result<String, NumberingError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| NumberingError::Unavailable("lock poisoned".to_string()))?;

        let counter = counters
            .entry(tenant_id)
            .or_insert(DayCounter { date, last: 0 });
        if date < counter.date {
            return Err(NumberingError::DateBehindSequence {
                date,
                current: counter.date,
            });
        }
        if date > counter.date {
            *counter = DayCounter { date, last: 0 };
        }

        let next = counter.last + 1;
        if next.to_string().len() > self.width {
            return Err(NumberingError::Exhausted {
                date,
                width: self.width,
            });
        }
        counter.last = next;

        Ok(format!(
            "{}-{}-{:0width$}",
            self.prefix,
            date.format("%Y%m%d"),
            next,
            width = self.width
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn numbers_are_sequential_per_tenant_and_day() {
        let numbers = SequentialNumberGenerator::new("MR", 6);
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        assert_eq!(numbers.next_number(tenant_a, date(2)).unwrap(), "MR-20260302-000001");
        assert_eq!(numbers.next_number(tenant_a, date(2)).unwrap(), "MR-20260302-000002");
        assert_eq!(numbers.next_number(tenant_a, date(3)).unwrap(), "MR-20260303-000001");
        assert_eq!(numbers.next_number(tenant_b, date(2)).unwrap(), "MR-20260302-000001");
    }

    #[test]
    fn sequence_stops_at_its_width() {
        let numbers = SequentialNumberGenerator::new("R", 1);
        let tenant_id = TenantId::new();

        for _ in 0..9 {
            numbers.next_number(tenant_id, date(2)).unwrap();
        }
        assert!(matches!(
            numbers.next_number(tenant_id, date(2)),
            Err(NumberingError::Exhausted { width: 1, .. })
        ));
    }

    #[test]
    fn only_the_current_day_is_retained_per_tenant() {
        let numbers = SequentialNumberGenerator::new("MR", 6);
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        for day in 1..=20 {
            numbers.next_number(tenant_a, date(day)).unwrap();
            numbers.next_number(tenant_a, date(day)).unwrap();
        }
        numbers.next_number(tenant_b, date(5)).unwrap();
        assert_eq!(numbers.counters.lock().unwrap().len(), 2);

        assert_eq!(numbers.next_number(tenant_a, date(20)).unwrap(), "MR-20260320-000003");
        assert_eq!(numbers.next_number(tenant_a, date(21)).unwrap(), "MR-20260321-000001");
        assert_eq!(
            numbers.next_number(tenant_a, date(19)),
            Err(NumberingError::DateBehindSequence {
                date: date(19),
                current: date(21),
            })
        );
        assert_eq!(numbers.next_number(tenant_b, date(5)).unwrap(), "MR-20260305-000002");
    }
}
