use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stockroute_core::{DepartmentId, RequestId, UserId};
use stockroute_events::EventEnvelope;
use stockroute_logistics::{RequestEvent, RequestStatus};

use crate::read_model::KeyValueStore;

/// Stream type under which request aggregates are stored.
pub const REQUEST_STREAM: &str = "logistics.request";

/// One row of the request board: where a request stands and how much it asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBoardEntry {
    pub request_id: RequestId,
    pub requester: UserId,
    pub department_id: DepartmentId,
    pub status: RequestStatus,
    pub line_count: u32,
    pub total_units: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum RequestProjectionError {
    #[error("failed to deserialize request event: {0}")]
    Deserialize(String),

    #[error("event for request {0} arrived before it was created")]
    UnknownRequest(RequestId),

    #[error("event request id does not match envelope stream id")]
    StreamMismatch,

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Request board projection.
///
/// Consumes published request envelopes and keeps one row per request.
/// Envelopes of other stream types are ignored, so it can sit directly on the
/// shared bus. Replays at or below the per-stream cursor are no-ops.
#[derive(Debug)]
pub struct RequestBoardProjection<S>
where
    S: KeyValueStore<RequestId, RequestBoardEntry>,
{
    store: S,
    cursors: RwLock<HashMap<Uuid, u64>>,
}

impl<S> RequestBoardProjection<S>
where
    S: KeyValueStore<RequestId, RequestBoardEntry>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, request_id: RequestId) -> Option<RequestBoardEntry> {
        self.store.get(&request_id)
    }

    /// Requests still waiting for a decision, oldest update first.
    pub fn pending_for(&self, department_id: DepartmentId) -> Vec<RequestBoardEntry> {
        let mut rows: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| r.department_id == department_id && r.status == RequestStatus::Pending)
            .collect();
        rows.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        rows
    }

    pub fn with_status(&self, status: RequestStatus) -> Vec<RequestBoardEntry> {
        self.store.list().into_iter().filter(|r| r.status == status).collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), RequestProjectionError> {
        if envelope.stream_type() != REQUEST_STREAM {
            return Ok(());
        }

        let stream_id = envelope.stream_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let last = *cursors.get(&stream_id).unwrap_or(&0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: RequestEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| RequestProjectionError::Deserialize(e.to_string()))?;

        let request_id = match &event {
            RequestEvent::RequestCreated(e) => e.request_id,
            RequestEvent::ItemAdded(e) => e.request_id,
            RequestEvent::RequestApproved(e) => e.request_id,
            RequestEvent::RequestRejected(e) => e.request_id,
            RequestEvent::RequestFulfilled(e) => e.request_id,
        };
        if *request_id.as_uuid() != stream_id {
            return Err(RequestProjectionError::StreamMismatch);
        }

        let row = match event {
            RequestEvent::RequestCreated(e) => RequestBoardEntry {
                request_id: e.request_id,
                requester: e.requester,
                department_id: e.department_id,
                status: RequestStatus::Pending,
                line_count: 0,
                total_units: 0,
                updated_at: e.occurred_at,
            },
            other => {
                let mut row = self
                    .store
                    .get(&request_id)
                    .ok_or(RequestProjectionError::UnknownRequest(request_id))?;
                match other {
                    RequestEvent::ItemAdded(e) => {
                        row.line_count += 1;
                        row.total_units += e.quantity;
                        row.updated_at = e.occurred_at;
                    }
                    RequestEvent::RequestApproved(e) => {
                        row.status = RequestStatus::Approved;
                        row.updated_at = e.occurred_at;
                    }
                    RequestEvent::RequestRejected(e) => {
                        row.status = RequestStatus::Rejected;
                        row.updated_at = e.occurred_at;
                    }
                    RequestEvent::RequestFulfilled(e) => {
                        row.status = RequestStatus::Fulfilled;
                        row.updated_at = e.occurred_at;
                    }
                    RequestEvent::RequestCreated(_) => {}
                }
                row
            }
        };

        self.store.upsert(request_id, row);
        cursors.insert(stream_id, seq);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes in stream order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), RequestProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.stream_id().as_bytes(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
