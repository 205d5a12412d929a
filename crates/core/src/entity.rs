//! Entity trait: identity + continuity across state changes.
//!
//! Order lines and receipts are entities local to their purchase order: their
//! totals and quality figures change over time but their numbers stay the same.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Identifier, unique within the owning aggregate.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Look up a child entity by identifier.
pub fn find<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}

/// Mutable counterpart of [`find`].
pub fn find_mut<'a, E: Entity>(entities: &'a mut [E], id: &E::Id) -> Option<&'a mut E> {
    entities.iter_mut().find(|e| e.id() == id)
}
