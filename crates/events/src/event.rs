use chrono::{DateTime, Utc};

/// A committed fact about one aggregate.
///
/// The store persists events as JSON. `event_type` and `version` travel in the
/// stored record beside the payload, so consumers can route or skip a payload
/// before deserializing it.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Schema version used when a type does not override [`Event::version`].
    const SCHEMA_VERSION: u32 = 1;

    /// Stable dotted name, e.g. `manufacturing.reservation.allocated`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32 {
        Self::SCHEMA_VERSION
    }

    /// Business time supplied by the command, never the wall clock.
    fn occurred_at(&self) -> DateTime<Utc>;
}
