//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values.
/// To "modify" one, build a new value. A quantity ledger snapshot is a value
/// object; an allocation with an id is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
