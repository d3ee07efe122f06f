//! Boundary to the remote task/annotation server.
//!
//! Every call is asynchronous from the surface's point of view: it hands over
//! a JSON payload and a completion callback, and the client invokes the
//! callback whenever the server answers. The surface never waits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use crate::error::RemoteSyncError;
use crate::geometry::Point;
use crate::model::{ActorId, Marker, RemoteId};
use crate::scoring::ScoreTally;
use crate::workspace::WorkspaceName;

pub type RemoteResult<T> = std::result::Result<T, RemoteSyncError>;

/// Completion callback for a remote call.
pub type Callback<T> = Box<dyn FnOnce(RemoteResult<T>)>;

/// Remote entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Annotation,
    Response,
    Event,
    TaskMember,
    TaskSession,
}

impl EntityType {
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Annotation => "annotation",
            EntityType::Response => "response",
            EntityType::Event => "event",
            EntityType::TaskMember => "taskmember",
            EntityType::TaskSession => "tasksession",
        }
    }
}

/// A task handed out by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: RemoteId,
    /// Name used to look up ground truth (`P.Oxy.1234-practice`).
    pub name: String,
    /// Image location.
    pub url: String,
}

/// The remote task/annotation client.
///
/// Implementations are shared handles; methods take `&self`.
pub trait RemoteClient {
    fn create(&self, entity: EntityType, payload: Value, done: Callback<Value>);
    fn update(&self, entity: EntityType, payload: Value, done: Callback<Value>);
    fn delete(&self, entity: EntityType, payload: Value, done: Callback<Value>);
    fn get_next_task(&self, queue: &str, done: Callback<Task>);
    fn list_all(&self, entity: EntityType, filter: Value, done: Callback<Vec<Value>>);
}

// ============================================================================
// Payloads
// ============================================================================

/// An annotation as exchanged with the server. Unset fields are omitted so
/// the same shape serves creates, partial updates and deletes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RemoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<ActorId>,
}

impl AnnotationRecord {
    /// Payload for creating a marker's annotation.
    pub fn for_marker(marker: &Marker) -> Self {
        Self {
            id: None,
            label: Some(marker.label.clone()),
            position: Some(marker.position),
            updated_by: None,
        }
    }

    pub fn with_id(mut self, id: RemoteId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_value(&self) -> RemoteResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> RemoteResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// A change to an annotation that must be sent once its remote id is known.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationPatch {
    Label(String),
    Position(Point),
}

impl AnnotationPatch {
    pub fn to_record(&self, id: RemoteId) -> AnnotationRecord {
        let record = AnnotationRecord::default().with_id(id);
        match self {
            AnnotationPatch::Label(label) => AnnotationRecord {
                label: Some(label.clone()),
                ..record
            },
            AnnotationPatch::Position(position) => AnnotationRecord {
                position: Some(*position),
                ..record
            },
        }
    }
}

/// Telemetry recorded as `event` entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    StateSwitch {
        destination: WorkspaceName,
    },
    PracticePerformance {
        #[serde(flatten)]
        tally: ScoreTally,
    },
    RequiredPerformance {
        #[serde(flatten)]
        tally: ScoreTally,
    },
}

impl TelemetryEvent {
    /// Event entity payload: `{"content": {...}}`.
    pub fn to_payload(&self) -> RemoteResult<Value> {
        Ok(json!({ "content": serde_json::to_value(self)? }))
    }
}

/// Submitted (or draft) markers, stored as a `response` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub content: Vec<Marker>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub draft: bool,
}

impl ResponseRecord {
    pub fn to_value(&self) -> RemoteResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The `id` field of a server record, if present.
pub fn record_id(value: &Value) -> Option<RemoteId> {
    value.get("id").and_then(Value::as_u64).map(RemoteId)
}

// ============================================================================
// In-memory client
// ============================================================================

/// One call received by an [`InMemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub entity: Option<EntityType>,
    pub payload: Value,
}

#[derive(Default)]
struct InMemoryState {
    next_id: u64,
    records: BTreeMap<EntityType, BTreeMap<RemoteId, Value>>,
    queues: HashMap<String, VecDeque<Task>>,
    calls: Vec<RecordedCall>,
    /// Completions held back until `deliver` when `deferred` is set.
    held: VecDeque<Box<dyn FnOnce()>>,
    deferred: bool,
    fail_next: Option<RemoteSyncError>,
}

/// A remote client that keeps everything in memory.
///
/// Cloning yields another handle to the same server. In deferred mode
/// completions are held until [`InMemoryClient::deliver`] is called, which
/// lets callers observe the window before a create is acknowledged.
#[derive(Clone, Default)]
pub struct InMemoryClient {
    state: Rc<RefCell<InMemoryState>>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        let client = Self::new();
        client.state.borrow_mut().deferred = true;
        client
    }

    /// Add a task to the end of a queue.
    pub fn enqueue_task(&self, queue: &str, task: Task) {
        self.state
            .borrow_mut()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(task);
    }

    /// Store a record created elsewhere (task memberships, sessions).
    /// Records without an `id` are refused.
    pub fn insert_record(&self, entity: EntityType, record: Value) -> Option<RemoteId> {
        let id = record_id(&record)?;
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(id.0);
        state.records.entry(entity).or_default().insert(id, record);
        Some(id)
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: RemoteSyncError) {
        self.state.borrow_mut().fail_next = Some(error);
    }

    /// Run held completions, including any queued while delivering.
    /// Returns how many ran.
    pub fn deliver(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.state.borrow_mut().held.pop_front();
            let Some(completion) = next else {
                break;
            };
            completion();
            delivered += 1;
        }
        delivered
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    /// Telemetry events created so far, in order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.operation == "create" && c.entity == Some(EntityType::Event))
            .filter_map(|c| c.payload.get("content").cloned())
            .filter_map(|content| serde_json::from_value(content).ok())
            .collect()
    }

    /// Stored records of one entity type.
    pub fn records(&self, entity: EntityType) -> Vec<Value> {
        self.state
            .borrow()
            .records
            .get(&entity)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    fn record_call(&self, operation: &'static str, entity: Option<EntityType>, payload: &Value) {
        self.state.borrow_mut().calls.push(RecordedCall {
            operation,
            entity,
            payload: payload.clone(),
        });
    }

    fn take_failure(&self) -> Option<RemoteSyncError> {
        self.state.borrow_mut().fail_next.take()
    }

    /// Invoke or hold a completion. The state borrow is released first so
    /// the callback may call back into the client.
    fn complete<T: 'static>(&self, done: Callback<T>, result: RemoteResult<T>) {
        let deferred = self.state.borrow().deferred;
        if deferred {
            self.state
                .borrow_mut()
                .held
                .push_back(Box::new(move || done(result)));
        } else {
            done(result);
        }
    }

    fn apply_create(&self, entity: EntityType, payload: Value) -> RemoteResult<Value> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = RemoteId(state.next_id);
        let mut record = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("content".to_string(), other);
                map
            }
        };
        record.insert("id".to_string(), json!(id.0));
        let record = Value::Object(record);
        state
            .records
            .entry(entity)
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    fn apply_update(&self, entity: EntityType, payload: Value) -> RemoteResult<Value> {
        let id = record_id(&payload)
            .ok_or_else(|| RemoteSyncError::Rejected(format!("{} update without id", entity.name())))?;
        let mut state = self.state.borrow_mut();
        let record = state
            .records
            .get_mut(&entity)
            .and_then(|r| r.get_mut(&id))
            .ok_or_else(|| RemoteSyncError::NotFound(format!("{} {}", entity.name(), id)))?;
        if let (Value::Object(target), Value::Object(fields)) = (&mut *record, payload) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        Ok(record.clone())
    }

    fn apply_delete(&self, entity: EntityType, payload: &Value) -> RemoteResult<Value> {
        let id = record_id(payload)
            .ok_or_else(|| RemoteSyncError::Rejected(format!("{} delete without id", entity.name())))?;
        self.state
            .borrow_mut()
            .records
            .get_mut(&entity)
            .and_then(|r| r.remove(&id))
            .ok_or_else(|| RemoteSyncError::NotFound(format!("{} {}", entity.name(), id)))
    }
}

impl RemoteClient for InMemoryClient {
    fn create(&self, entity: EntityType, payload: Value, done: Callback<Value>) {
        self.record_call("create", Some(entity), &payload);
        let result = match self.take_failure() {
            Some(e) => Err(e),
            None => self.apply_create(entity, payload),
        };
        self.complete(done, result);
    }

    fn update(&self, entity: EntityType, payload: Value, done: Callback<Value>) {
        self.record_call("update", Some(entity), &payload);
        let result = match self.take_failure() {
            Some(e) => Err(e),
            None => self.apply_update(entity, payload),
        };
        self.complete(done, result);
    }

    fn delete(&self, entity: EntityType, payload: Value, done: Callback<Value>) {
        self.record_call("delete", Some(entity), &payload);
        let result = match self.take_failure() {
            Some(e) => Err(e),
            None => self.apply_delete(entity, &payload),
        };
        self.complete(done, result);
    }

    fn get_next_task(&self, queue: &str, done: Callback<Task>) {
        self.record_call("get_next_task", None, &json!({ "queue": queue }));
        let result = match self.take_failure() {
            Some(e) => Err(e),
            None => self
                .state
                .borrow_mut()
                .queues
                .get_mut(queue)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| RemoteSyncError::NotFound(format!("no task in queue '{queue}'"))),
        };
        self.complete(done, result);
    }

    fn list_all(&self, entity: EntityType, filter: Value, done: Callback<Vec<Value>>) {
        self.record_call("list_all", Some(entity), &filter);
        let result = match self.take_failure() {
            Some(e) => Err(e),
            None => Ok(self
                .records(entity)
                .into_iter()
                .filter(|record| matches_filter(record, &filter))
                .collect()),
        };
        self.complete(done, result);
    }
}

/// Every field of `filter` must be present with the same value.
fn matches_filter(record: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields.iter().all(|(k, v)| record.get(k) == Some(v)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Slot<T> = Rc<RefCell<Option<RemoteResult<T>>>>;

    fn capture<T: 'static>() -> (Slot<T>, Callback<T>) {
        let slot = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        (slot, Box::new(move |r| *sink.borrow_mut() = Some(r)))
    }

    #[test]
    fn test_create_assigns_ids() {
        let client = InMemoryClient::new();
        let (slot, done) = capture();
        let payload = AnnotationRecord {
            label: Some("tau".into()),
            position: Some(Point::new(1.0, 2.0)),
            ..Default::default()
        };
        client.create(EntityType::Annotation, payload.to_value().unwrap(), done);
        let record = slot.borrow_mut().take().unwrap().unwrap();
        assert_eq!(record_id(&record), Some(RemoteId(1)));
        assert_eq!(record["label"], "tau");
    }

    #[test]
    fn test_update_merges_fields() {
        let client = InMemoryClient::new();
        client.create(
            EntityType::Annotation,
            json!({"label": "", "position": {"x": 1.0, "y": 1.0}}),
            Box::new(|_| {}),
        );
        let patch = AnnotationPatch::Label("α".into()).to_record(RemoteId(1));
        let (slot, done) = capture();
        client.update(EntityType::Annotation, patch.to_value().unwrap(), done);
        let record = slot.borrow_mut().take().unwrap().unwrap();
        assert_eq!(record["label"], "α");
        assert_eq!(record["position"]["x"], 1.0);
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let client = InMemoryClient::new();
        let (slot, done) = capture();
        client.delete(EntityType::Annotation, json!({"id": 9}), done);
        assert!(matches!(
            slot.borrow_mut().take(),
            Some(Err(RemoteSyncError::NotFound(_)))
        ));
    }

    #[test]
    fn test_inserted_records_accept_updates() {
        let client = InMemoryClient::new();
        assert_eq!(client.insert_record(EntityType::TaskMember, json!({"seen_all": false})), None);
        assert_eq!(
            client.insert_record(EntityType::TaskMember, json!({"id": 4, "seen_all": false})),
            Some(RemoteId(4))
        );
        let (slot, done) = capture();
        client.update(EntityType::TaskMember, json!({"id": 4, "seen_all": true}), done);
        assert_eq!(slot.borrow_mut().take().unwrap().unwrap()["seen_all"], true);
    }

    #[test]
    fn test_deferred_completions_wait_for_deliver() {
        let client = InMemoryClient::deferred();
        let (slot, done) = capture();
        client.create(EntityType::Event, json!({"content": {}}), done);
        assert!(slot.borrow().is_none());
        assert_eq!(client.deliver(), 1);
        assert!(slot.borrow().is_some());
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let client = InMemoryClient::new();
        client.fail_next(RemoteSyncError::Transport("offline".into()));
        let (first, done) = capture::<Value>();
        client.create(EntityType::Event, json!({}), done);
        assert!(matches!(first.borrow_mut().take(), Some(Err(_))));
        let (second, done) = capture::<Value>();
        client.create(EntityType::Event, json!({}), done);
        assert!(matches!(second.borrow_mut().take(), Some(Ok(_))));
    }

    #[test]
    fn test_task_queue_and_listing() {
        let client = InMemoryClient::new();
        client.enqueue_task(
            "practice",
            Task {
                id: RemoteId(5),
                name: "P.Oxy.1-practice".into(),
                url: "p1.jpg".into(),
            },
        );
        let (slot, done) = capture();
        client.get_next_task("practice", done);
        assert_eq!(slot.borrow_mut().take().unwrap().unwrap().id, RemoteId(5));

        let (empty, done) = capture();
        client.get_next_task("practice", done);
        assert!(empty.borrow_mut().take().unwrap().is_err());

        client.create(EntityType::Annotation, json!({"label": "a", "data": 1}), Box::new(|_| {}));
        client.create(EntityType::Annotation, json!({"label": "b", "data": 2}), Box::new(|_| {}));
        let (listed, done) = capture();
        client.list_all(EntityType::Annotation, json!({"data": 2}), done);
        let listed = listed.borrow_mut().take().unwrap().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["label"], "b");
    }

    #[test]
    fn test_telemetry_wire_shape() {
        let event = TelemetryEvent::PracticePerformance {
            tally: ScoreTally {
                true_positive: 1,
                false_positive: 2,
                false_negative: 3,
            },
        };
        assert_eq!(
            event.to_payload().unwrap(),
            json!({"content": {"type": "practice-performance", "tp": 1, "fp": 2, "fn": 3}})
        );

        let switch = TelemetryEvent::StateSwitch {
            destination: WorkspaceName::Practice,
        };
        assert_eq!(
            serde_json::to_value(&switch).unwrap(),
            json!({"type": "state-switch", "destination": "practice"})
        );
    }

    #[test]
    fn test_events_are_decoded_back() {
        let client = InMemoryClient::new();
        let event = TelemetryEvent::StateSwitch {
            destination: WorkspaceName::Required,
        };
        client.create(EntityType::Event, event.to_payload().unwrap(), Box::new(|_| {}));
        assert_eq!(client.events(), vec![event]);
    }
}
