//! Domain-agnostic event contract.

use serde::{de::DeserializeOwned, Serialize};

/// A domain event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - designed to be **append-only**
pub trait Event: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "billing.bill.opened").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time, UTC).
    fn occurred_at(&self) -> chrono::DateTime<chrono::Utc>;
}
