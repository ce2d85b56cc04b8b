//! Aggregate traits for event-sourced domain models.

/// Aggregate root marker + minimal interface.
///
/// This is intentionally small so domain modules can decide how they model
/// state transitions without bringing in any infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// For event-sourced aggregates, this corresponds to the number of
    /// events applied (the stream revision).
    fn version(&self) -> u64;
}

/// Event-sourced aggregate: decide (pure) + apply (infallible).
///
/// `handle` inspects current state and decides zero or more events without
/// mutating anything; `apply` folds a single event into state. Replaying a
/// stream through `apply` must reconstruct the state exactly.
pub trait Aggregate: AggregateRoot {
    type Command;
    type Event;
    type Error;

    /// Fold one event into state. Must be deterministic and total.
    fn apply(&mut self, event: &Self::Event);

    /// Decide events for a command against current state. No mutation.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
