//! Command execution pipeline for the event-sourced workflow aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream from the store
//!   ↓
//! 2. Rehydrate the aggregate (apply history)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(loaded version)
//!   ↓
//! 5. Publish committed events to the bus
//! ```
//!
//! A version conflict at step 4 means another writer got in between; the
//! dispatcher reloads and decides again, up to `max_attempts` times, then
//! surfaces `DomainError::Conflict`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use stockroute_auth::{Actor, AuthzError, Capability, authorize};
use stockroute_core::{Aggregate, DomainError, ExpectedVersion};
use stockroute_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected by the domain (validation, state machine, authorization, conflict).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The event store failed for a reason other than a version conflict.
    #[error("event store error: {0}")]
    Store(EventStoreError),

    /// A historical payload no longer deserializes into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Publication failed after a successful append (events are persisted).
    #[error("failed to publish committed event: {0}")]
    Publish(String),
}

impl DispatchError {
    /// The domain error behind this failure, if any.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Domain(DomainError::Conflict(msg)),
            other => DispatchError::Store(other),
        }
    }
}

impl From<AuthzError> for DispatchError {
    fn from(value: AuthzError) -> Self {
        DispatchError::Domain(value.into())
    }
}

/// Capability gate used by the service layer before dispatching.
pub fn require(actor: &Actor, capability: &Capability) -> Result<(), DispatchError> {
    authorize(actor, capability).map_err(DispatchError::from)
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before publication; if the append fails nothing is
/// published. A publish failure after a successful append is reported to the
/// caller, which gives at-least-once delivery on retry.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    max_attempts: u32,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            max_attempts: 3,
        }
    }

    /// Number of load-decide-append rounds before a conflict is surfaced.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without handling anything.
    pub fn load<A>(&self, stream_id: Uuid, make_aggregate: impl FnOnce() -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(stream_id)?;
        validate_loaded_stream(stream_id, &history)?;
        let mut aggregate = make_aggregate();
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Run `command` against the aggregate stored under `stream_id`.
    ///
    /// Returns the aggregate state after the committed events and the events
    /// themselves with their assigned sequence numbers.
    pub fn dispatch<A>(
        &self,
        stream_id: Uuid,
        stream_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn() -> A,
    ) -> Result<(A, Vec<StoredEvent>), DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let mut attempt = 1;
        loop {
            // 1-2) Load and rehydrate
            let history = self.store.load_stream(stream_id)?;
            validate_loaded_stream(stream_id, &history)?;
            let expected = ExpectedVersion::Exact(stream_version(&history));

            let mut aggregate = make_aggregate();
            apply_history(&mut aggregate, &history)?;

            // 3) Decide
            let decided = aggregate.handle(command)?;
            if decided.is_empty() {
                return Ok((aggregate, vec![]));
            }

            // 4) Persist
            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(stream_id, stream_type, Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()?;

            let committed = match self.store.append(uncommitted, expected) {
                Ok(committed) => committed,
                Err(EventStoreError::Concurrency(msg)) if attempt < self.max_attempts => {
                    warn!(%stream_id, stream_type, attempt, reason = %msg, "version conflict, retrying command");
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for ev in &decided {
                aggregate.apply(ev);
            }

            // 5) Publish
            for stored in &committed {
                self.bus
                    .publish(stored.to_envelope())
                    .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
            }

            debug!(%stream_id, stream_type, events = committed.len(), "command committed");
            return Ok((aggregate, committed));
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(stream_id: Uuid, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    // A stream must hold only its own events in strictly increasing order.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.stream_id != stream_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains foreign stream_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Utc;
    use stockroute_core::{AggregateRoot, DepartmentId, RequestId, UserId};
    use stockroute_events::InMemoryEventBus;
    use stockroute_logistics::{
        ApproveRequest, CreateRequest, FulfillRequest, Request, RequestCommand, RequestStatus,
    };

    use crate::event_store::InMemoryEventStore;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(id: RequestId) -> RequestCommand {
        RequestCommand::CreateRequest(CreateRequest {
            request_id: id,
            requester: UserId::new(),
            department_id: DepartmentId::new(),
            planned_date: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let id = RequestId::new();

        let (request, committed) = d
            .dispatch(*id.as_uuid(), "logistics.request", &create(id), || Request::empty(id))
            .unwrap();

        assert_eq!(request.status(), RequestStatus::Pending);
        assert_eq!(request.version(), 1);
        assert_eq!(committed.len(), 1);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "logistics.request.created");
        assert_eq!(env.sequence_number(), 1);
    }

    #[test]
    fn domain_rejection_appends_nothing() {
        let d = dispatcher();
        let id = RequestId::new();
        d.dispatch(*id.as_uuid(), "logistics.request", &create(id), || Request::empty(id))
            .unwrap();

        let fulfill = RequestCommand::FulfillRequest(FulfillRequest {
            request_id: id,
            fulfilled_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        let err = d
            .dispatch(*id.as_uuid(), "logistics.request", &fulfill, || Request::empty(id))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidTransition(_))));
        assert_eq!(d.store().load_stream(*id.as_uuid()).unwrap().len(), 1);
    }

    /// Store that reports a conflict on the first append it sees.
    struct ConflictOnce {
        inner: InMemoryEventStore,
        tripped: AtomicBool,
    }

    impl EventStore for ConflictOnce {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Err(EventStoreError::Concurrency("simulated".into()));
            }
            self.inner.append(events, expected_version)
        }

        fn load_stream(&self, stream_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_stream(stream_id)
        }

        fn stream_ids(&self, stream_type: &str) -> Result<Vec<Uuid>, EventStoreError> {
            self.inner.stream_ids(stream_type)
        }
    }

    #[test]
    fn conflict_is_retried_then_surfaced() {
        let store = ConflictOnce {
            inner: InMemoryEventStore::new(),
            tripped: AtomicBool::new(false),
        };
        let d = CommandDispatcher::new(store, InMemoryEventBus::new());
        let id = RequestId::new();
        let (request, _) = d
            .dispatch(*id.as_uuid(), "logistics.request", &create(id), || Request::empty(id))
            .unwrap();
        assert!(request.exists());

        let store = ConflictOnce {
            inner: InMemoryEventStore::new(),
            tripped: AtomicBool::new(false),
        };
        let d = CommandDispatcher::new(store, InMemoryEventBus::new()).with_max_attempts(1);
        let err = d
            .dispatch(*id.as_uuid(), "logistics.request", &create(id), || Request::empty(id))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn load_rehydrates_state() {
        let d = dispatcher();
        let id = RequestId::new();
        d.dispatch(*id.as_uuid(), "logistics.request", &create(id), || Request::empty(id))
            .unwrap();
        let approve = RequestCommand::ApproveRequest(ApproveRequest {
            request_id: id,
            approved_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        d.dispatch(*id.as_uuid(), "logistics.request", &approve, || Request::empty(id))
            .unwrap();

        let loaded = d.load(*id.as_uuid(), || Request::empty(id)).unwrap();
        assert_eq!(loaded.status(), RequestStatus::Approved);
        assert_eq!(loaded.version(), 2);
    }
}
