//! Append-only, per-bill event streams.
//!
//! Every state transition a machine makes is appended here before it is
//! applied, so a crashed process can rebuild any machine by replaying its
//! stream in sequence order.

mod in_memory;

pub use in_memory::InMemoryEventStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use billflow_core::{BillId, Event, ExpectedVersion};

/// An event ready to be appended to a stream (not yet assigned a sequence
/// number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub bill_id: BillId,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub bill_id: BillId,

    /// Monotonically increasing position in the bill's stream, starting at 1.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only event store keyed by bill id.
///
/// Implementations must:
/// - enforce optimistic concurrency against the current stream version
/// - assign monotonically increasing `sequence_number`s starting at
///   `current_version + 1`
pub trait EventStore: Send + Sync {
    /// Append events to a bill's stream (append-only).
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a bill, in sequence order.
    fn load_stream(&self, bill_id: BillId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every bill id with at least one stored event (for crash recovery).
    fn list_streams(&self) -> Result<Vec<BillId>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn load_stream(&self, bill_id: BillId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(bill_id)
    }

    fn list_streams(&self) -> Result<Vec<BillId>, EventStoreError> {
        (**self).list_streams()
    }
}

impl UncommittedEvent {
    /// Build from a typed domain event, capturing the metadata needed for
    /// later deserialization.
    pub fn from_typed<E>(bill_id: BillId, event_id: Uuid, event: &E) -> Result<Self, EventStoreError>
    where
        E: Event,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            bill_id,
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
