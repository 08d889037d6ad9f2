//! Change tracking.
//!
//! Each resource keeps a bounded FIFO of change events ordered by an
//! assigned timestamp. Assignment is linearizable per tracker: the state
//! sits behind one mutex and a colliding wall-clock timestamp is coerced to
//! `previous + 1`, so event order is always strict.

pub mod store;
pub mod token;

pub use store::DeltaStore;
pub use token::{format_timestamp, generate_delta_link, parse_delta_token, DeltaToken};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Kind of mutation an event records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One recorded mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub resource: String,
    pub entity_id: i64,
    pub op: ChangeOp,
    /// Assigned timestamp (milliseconds, strictly increasing per tracker).
    pub timestamp: i64,
    /// Row data for creates and updates.
    pub data: Option<JsonValue>,
}

#[derive(Debug, Default)]
struct TrackerState {
    logs: HashMap<String, VecDeque<ChangeEvent>>,
    last_timestamp: i64,
}

/// In-memory change log, bounded per resource.
#[derive(Debug)]
pub struct DeltaTracker {
    state: Mutex<TrackerState>,
    max_changes: usize,
}

impl DeltaTracker {
    pub fn new(max_changes: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            max_changes: max_changes.max(1),
        }
    }

    /// Current wall-clock time in milliseconds.
    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Record a change and return its assigned timestamp.
    ///
    /// The requested timestamp is coerced forward past the last assigned
    /// one, so two events never share a timestamp.
    pub fn track_change(
        &self,
        resource: &str,
        entity_id: i64,
        op: ChangeOp,
        timestamp: i64,
        data: Option<JsonValue>,
    ) -> Result<i64> {
        if resource.is_empty() {
            return Err(Error::InvalidChange("empty resource name".into()));
        }
        if entity_id <= 0 {
            return Err(Error::InvalidChange(format!(
                "invalid entity id: {}",
                entity_id
            )));
        }
        if timestamp <= 0 {
            return Err(Error::InvalidChange(format!(
                "invalid timestamp: {}",
                timestamp
            )));
        }

        let mut state = self.state.lock().expect("delta tracker poisoned");

        let assigned = timestamp.max(state.last_timestamp + 1);
        state.last_timestamp = assigned;

        let log = state.logs.entry(resource.to_string()).or_default();
        log.push_back(ChangeEvent {
            resource: resource.to_string(),
            entity_id,
            op,
            timestamp: assigned,
            data,
        });
        if log.len() > self.max_changes {
            log.pop_front();
        }

        Ok(assigned)
    }

    /// Events for a resource strictly after `since`, timestamp-ascending.
    pub fn get_changes(&self, resource: &str, since: i64) -> Vec<ChangeEvent> {
        let state = self.state.lock().expect("delta tracker poisoned");
        state
            .logs
            .get(resource)
            .map(|log| {
                log.iter()
                    .filter(|event| event.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop events with `timestamp <= now - max_age_ms`. Returns how many
    /// were removed.
    pub fn cleanup_old_changes(&self, max_age_ms: i64) -> usize {
        let cutoff = Self::now_ms() - max_age_ms;
        let mut state = self.state.lock().expect("delta tracker poisoned");

        let mut removed = 0;
        for log in state.logs.values_mut() {
            while log.front().is_some_and(|event| event.timestamp <= cutoff) {
                log.pop_front();
                removed += 1;
            }
        }
        removed
    }

    /// Re-seed the tracker from persisted events (startup recovery).
    pub fn restore(&self, events: Vec<ChangeEvent>) {
        let mut state = self.state.lock().expect("delta tracker poisoned");
        for event in events {
            state.last_timestamp = state.last_timestamp.max(event.timestamp);
            let log = state.logs.entry(event.resource.clone()).or_default();
            log.push_back(event);
            if log.len() > self.max_changes {
                log.pop_front();
            }
        }
    }
}

/// Build the delta feed body for a resource.
pub fn generate_delta_response(
    resource: &str,
    base_url: &str,
    events: &[ChangeEvent],
    now: i64,
) -> JsonValue {
    let value: Vec<JsonValue> = events.iter().map(|e| delta_entry(base_url, e)).collect();

    serde_json::json!({
        "@odata.context": format!("{}/$metadata#{}/$delta", base_url, resource),
        "@odata.deltaLink": generate_delta_link(base_url, resource, now, None, None),
        "value": value,
    })
}

fn delta_entry(base_url: &str, event: &ChangeEvent) -> JsonValue {
    let mut entry = serde_json::Map::new();
    entry.insert(
        "@odata.id".into(),
        JsonValue::String(format!(
            "{}/{}({})",
            base_url, event.resource, event.entity_id
        )),
    );
    entry.insert("@odata.etag".into(), JsonValue::from(event.timestamp));
    entry.insert(
        "@odata.operation".into(),
        JsonValue::String(event.op.as_str().to_string()),
    );

    if let Some(JsonValue::Object(data)) = &event.data {
        for (key, value) in data {
            entry.insert(key.clone(), value.clone());
        }
    }

    JsonValue::Object(entry)
}
