//! Entities: objects with identity that lives inside an aggregate.

/// An object identified by `id` rather than by its attribute values.
///
/// Entities inside an aggregate (allocation lines, issue lines) are reached
/// only through their root; their ids only need to be unique within it.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}

/// Look up an entity by id in the collection an aggregate owns.
pub fn find_by_id<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}
