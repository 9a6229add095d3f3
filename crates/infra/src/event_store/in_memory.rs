use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use stockroute_core::ExpectedVersion;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Streams {
    by_id: HashMap<Uuid, Vec<StoredEvent>>,
    /// Stream ids in creation order.
    order: Vec<Uuid>,
}

/// In-memory append-only event store.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<Streams>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::InvalidAppend("lock poisoned".to_string())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };

        // All events must target the same stream.
        let stream_id = first.stream_id;
        let stream_type = first.stream_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.stream_id != stream_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple stream ids (index {idx})"
                )));
            }
            if e.stream_type != stream_type {
                return Err(EventStoreError::StreamTypeMismatch(format!(
                    "batch contains multiple stream types (index {idx})"
                )));
            }
        }

        let mut streams = self.streams.write().map_err(|_| poisoned())?;

        let current = streams
            .by_id
            .get(&stream_id)
            .map(|s| Self::current_version(s))
            .unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = streams.by_id.get(&stream_id).and_then(|s| s.first()) {
            if existing.stream_type != stream_type {
                return Err(EventStoreError::StreamTypeMismatch(format!(
                    "stream type is '{}', attempted append with '{}'",
                    existing.stream_type, stream_type
                )));
            }
        }

        if !streams.by_id.contains_key(&stream_id) {
            streams.order.push(stream_id);
        }
        let stream = streams.by_id.entry(stream_id).or_default();

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                stream_id: e.stream_id,
                stream_type: e.stream_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.by_id.get(&stream_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self, stream_type: &str) -> Result<Vec<Uuid>, EventStoreError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams
            .order
            .iter()
            .filter(|id| {
                streams
                    .by_id
                    .get(id)
                    .and_then(|s| s.first())
                    .is_some_and(|e| e.stream_type == stream_type)
            })
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn event(stream_id: Uuid, stream_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            stream_id,
            stream_type: stream_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn sequence_numbers_continue_per_stream() {
        let store = InMemoryEventStore::new();
        let id = Uuid::now_v7();

        let first = store
            .append(vec![event(id, "route"), event(id, "route")], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store
            .append(vec![event(id, "route")], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!(first[1].sequence_number, 2);
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let id = Uuid::now_v7();
        store
            .append(vec![event(id, "route")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, "route")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn stream_type_is_stable() {
        let store = InMemoryEventStore::new();
        let id = Uuid::now_v7();
        store
            .append(vec![event(id, "route")], ExpectedVersion::Any)
            .unwrap();
        assert!(matches!(
            store.append(vec![event(id, "request")], ExpectedVersion::Any),
            Err(EventStoreError::StreamTypeMismatch(_))
        ));
    }

    #[test]
    fn stream_ids_filter_by_type_in_creation_order() {
        let store = InMemoryEventStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let c = Uuid::now_v7();
        for (id, ty) in [(a, "route"), (b, "request"), (c, "route")] {
            store.append(vec![event(id, ty)], ExpectedVersion::Any).unwrap();
        }
        assert_eq!(store.stream_ids("route").unwrap(), vec![a, c]);
    }
}
