//! Optimistic synchronisation of local edits with the remote client.
//!
//! Local stores are updated first; the remote call is fired afterwards and
//! its completion lands in an inbox that the surface drains on its own
//! thread with [`RemoteSync::poll`]. Nothing here mutates the stores.
//!
//! A marker's remote id is only known once its create call is acknowledged.
//! Edits made before that are queued on the marker's link and flushed when
//! the acknowledgement is polled. Failed calls are logged and counted; local
//! state is never rolled back.

use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::error::RemoteSyncError;
use crate::model::{Marker, MarkerId, RemoteId};
use crate::remote::{
    AnnotationPatch, AnnotationRecord, Callback, EntityType, RemoteClient, RemoteResult, ResponseRecord, Task,
    TelemetryEvent, record_id,
};
use crate::workspace::WorkspaceName;

/// A finished remote call waiting to be processed.
enum Completion {
    Created {
        marker: MarkerId,
        result: RemoteResult<Value>,
    },
    Ack {
        operation: &'static str,
        entity: EntityType,
        result: RemoteResult<Value>,
    },
    NextTask {
        workspace: WorkspaceName,
        result: RemoteResult<Task>,
    },
    Listed {
        result: RemoteResult<Vec<Value>>,
    },
}

type Inbox = Rc<RefCell<VecDeque<Completion>>>;

/// Remote state of a local marker.
#[derive(Debug, Clone, PartialEq)]
enum Link {
    /// Create sent, id unknown. Holds edits to replay once it is.
    Pending {
        patches: Vec<AnnotationPatch>,
        deleted: bool,
    },
    Linked(RemoteId),
}

/// Something the surface should apply after polling.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    /// A marker's create was acknowledged.
    Linked { marker: MarkerId, remote: RemoteId },
    /// A queue handed out a task.
    TaskReady { workspace: WorkspaceName, task: Task },
    /// Annotation records listed for state load.
    StateListed(Vec<AnnotationRecord>),
    /// A `response` entity was stored.
    ResponseSaved(RemoteId),
    /// A queue had no task left.
    QueueExhausted(WorkspaceName),
}

pub struct RemoteSync {
    client: Box<dyn RemoteClient>,
    inbox: Inbox,
    links: HashMap<MarkerId, Link>,
    failures: usize,
}

impl RemoteSync {
    pub fn new(client: Box<dyn RemoteClient>) -> Self {
        Self {
            client,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            links: HashMap::new(),
            failures: 0,
        }
    }

    fn post(&self) -> impl Fn(Completion) + 'static {
        let inbox = Rc::clone(&self.inbox);
        move |completion| inbox.borrow_mut().push_back(completion)
    }

    fn ack(&self, operation: &'static str, entity: EntityType) -> Callback<Value> {
        let post = self.post();
        Box::new(move |result| {
            post(Completion::Ack {
                operation,
                entity,
                result,
            })
        })
    }

    // ========================================================================
    // Markers
    // ========================================================================

    /// Send the create for a freshly placed marker.
    pub fn marker_created(&mut self, marker: &Marker) {
        let payload = match AnnotationRecord::for_marker(marker).to_value() {
            Ok(p) => p,
            Err(e) => return self.failed("annotation encoding", &e),
        };
        self.links.insert(
            marker.id,
            Link::Pending {
                patches: Vec::new(),
                deleted: false,
            },
        );
        let post = self.post();
        let id = marker.id;
        self.client.create(
            EntityType::Annotation,
            payload,
            Box::new(move |result| post(Completion::Created { marker: id, result })),
        );
    }

    /// Associate a marker with an existing remote annotation.
    pub fn marker_linked(&mut self, marker: MarkerId, remote: RemoteId) {
        self.links.insert(marker, Link::Linked(remote));
    }

    /// Send (or queue) an update for a marker.
    pub fn marker_changed(&mut self, marker: MarkerId, patch: AnnotationPatch) {
        match self.links.get_mut(&marker) {
            Some(Link::Linked(remote)) => {
                let remote = *remote;
                self.send_patch(remote, &patch);
            }
            Some(Link::Pending { patches, .. }) => {
                log::debug!("⏳ Update for {} queued until its create is acknowledged", marker);
                patches.push(patch);
            }
            None => log::warn!("Marker {} has no remote counterpart, update not sent", marker),
        }
    }

    /// Send (or queue) the delete for a marker.
    pub fn marker_deleted(&mut self, marker: MarkerId) {
        match self.links.get_mut(&marker) {
            Some(Link::Linked(remote)) => {
                let remote = *remote;
                self.links.remove(&marker);
                self.send_delete(remote);
            }
            Some(Link::Pending { deleted, .. }) => *deleted = true,
            None => {}
        }
    }

    /// Drop a marker's link without telling the server (the deletion came
    /// from the server).
    pub fn forget(&mut self, marker: MarkerId) {
        self.links.remove(&marker);
    }

    pub fn remote_id(&self, marker: MarkerId) -> Option<RemoteId> {
        match self.links.get(&marker) {
            Some(Link::Linked(remote)) => Some(*remote),
            _ => None,
        }
    }

    pub fn is_pending(&self, marker: MarkerId) -> bool {
        matches!(self.links.get(&marker), Some(Link::Pending { .. }))
    }

    fn send_patch(&mut self, remote: RemoteId, patch: &AnnotationPatch) {
        match patch.to_record(remote).to_value() {
            Ok(payload) => {
                let done = self.ack("update", EntityType::Annotation);
                self.client.update(EntityType::Annotation, payload, done);
            }
            Err(e) => self.failed("annotation update encoding", &e),
        }
    }

    fn send_delete(&mut self, remote: RemoteId) {
        match AnnotationRecord::default().with_id(remote).to_value() {
            Ok(payload) => {
                let done = self.ack("delete", EntityType::Annotation);
                self.client.delete(EntityType::Annotation, payload, done);
            }
            Err(e) => self.failed("annotation delete encoding", &e),
        }
    }

    // ========================================================================
    // Other entities
    // ========================================================================

    pub fn emit(&mut self, event: &TelemetryEvent) {
        match event.to_payload() {
            Ok(payload) => {
                let done = self.ack("create", EntityType::Event);
                self.client.create(EntityType::Event, payload, done);
            }
            Err(e) => self.failed("event encoding", &e),
        }
    }

    pub fn save_response(&mut self, response: &ResponseRecord) {
        match response.to_value() {
            Ok(payload) => {
                let done = self.ack("create", EntityType::Response);
                self.client.create(EntityType::Response, payload, done);
            }
            Err(e) => self.failed("response encoding", &e),
        }
    }

    pub fn fetch_task(&mut self, workspace: WorkspaceName) {
        let post = self.post();
        self.client.get_next_task(
            workspace.name(),
            Box::new(move |result| post(Completion::NextTask { workspace, result })),
        );
    }

    /// Record on the participant's task membership that every task was seen.
    pub fn mark_seen_all(&mut self, member: RemoteId) {
        let done = self.ack("update", EntityType::TaskMember);
        self.client
            .update(EntityType::TaskMember, json!({ "id": member, "seen_all": true }), done);
    }

    /// Point the shared task session at a newly assigned task.
    pub fn task_session_changed(&mut self, session: RemoteId, task: RemoteId) {
        let payload = json!({ "id": session, "data": { "type": "Data", "id": task } });
        let done = self.ack("update", EntityType::TaskSession);
        self.client.update(EntityType::TaskSession, payload, done);
    }

    pub fn list_annotations(&mut self, filter: Value) {
        let post = self.post();
        self.client.list_all(
            EntityType::Annotation,
            filter,
            Box::new(move |result| post(Completion::Listed { result })),
        );
    }

    // ========================================================================
    // Completions
    // ========================================================================

    /// Process every completion that has arrived.
    ///
    /// Completions triggered while polling (flushed updates acknowledged
    /// synchronously) are processed in the same call.
    pub fn poll(&mut self) -> Vec<SyncUpdate> {
        let mut updates = Vec::new();
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some(completion) = next else {
                break;
            };
            if let Some(update) = self.process(completion) {
                updates.push(update);
            }
        }
        updates
    }

    fn process(&mut self, completion: Completion) -> Option<SyncUpdate> {
        match completion {
            Completion::Created { marker, result } => self.on_created(marker, result),
            Completion::Ack {
                operation,
                entity,
                result,
            } => match result {
                Ok(record) => {
                    log::debug!("✅ {} {} acknowledged", entity.name(), operation);
                    match (entity, record_id(&record)) {
                        (EntityType::Response, Some(id)) if operation == "create" => {
                            Some(SyncUpdate::ResponseSaved(id))
                        }
                        _ => None,
                    }
                }
                Err(e) => {
                    self.failed(&format!("{} {}", entity.name(), operation), &e);
                    None
                }
            },
            Completion::NextTask { workspace, result } => match result {
                Ok(task) => Some(SyncUpdate::TaskReady { workspace, task }),
                Err(RemoteSyncError::NotFound(_)) => Some(SyncUpdate::QueueExhausted(workspace)),
                Err(e) => {
                    self.failed(&format!("next {} task", workspace), &e);
                    None
                }
            },
            Completion::Listed { result } => match result {
                Ok(records) => {
                    let parsed = records
                        .into_iter()
                        .filter_map(|r| match AnnotationRecord::from_value(r) {
                            Ok(record) => Some(record),
                            Err(e) => {
                                log::warn!("Skipping unreadable annotation record: {}", e);
                                None
                            }
                        })
                        .collect();
                    Some(SyncUpdate::StateListed(parsed))
                }
                Err(e) => {
                    self.failed("annotation listing", &e);
                    None
                }
            },
        }
    }

    fn on_created(&mut self, marker: MarkerId, result: RemoteResult<Value>) -> Option<SyncUpdate> {
        let link = self.links.remove(&marker);
        let remote = match result.map(|r| record_id(&r)) {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                self.failed(
                    "annotation create",
                    &RemoteSyncError::Malformed("response without id".into()),
                );
                return None;
            }
            Err(e) => {
                self.failed("annotation create", &e);
                return None;
            }
        };

        match link {
            Some(Link::Pending { deleted: true, .. }) => {
                log::debug!("Marker {} was deleted before its create landed", marker);
                self.send_delete(remote);
                None
            }
            Some(Link::Pending { patches, .. }) => {
                self.links.insert(marker, Link::Linked(remote));
                for patch in &patches {
                    self.send_patch(remote, patch);
                }
                Some(SyncUpdate::Linked { marker, remote })
            }
            // Forgotten or relinked meanwhile; keep whatever is there.
            other => {
                if let Some(link) = other {
                    self.links.insert(marker, link);
                }
                None
            }
        }
    }

    fn failed(&mut self, what: &str, error: &RemoteSyncError) {
        log::warn!("⚠ Remote {} failed: {}", what, error);
        self.failures += 1;
    }

    /// Number of remote calls that failed so far.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rotation};
    use crate::remote::InMemoryClient;

    fn marker(id: u64) -> Marker {
        Marker::new(MarkerId::new(id), Point::new(10.0, 20.0), "", Rotation::Deg0)
    }

    fn annotation_calls(client: &InMemoryClient, operation: &str) -> Vec<Value> {
        client
            .calls()
            .into_iter()
            .filter(|c| c.operation == operation && c.entity == Some(EntityType::Annotation))
            .map(|c| c.payload)
            .collect()
    }

    #[test]
    fn test_create_links_after_poll() {
        let client = InMemoryClient::new();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_created(&marker(1));
        assert!(sync.is_pending(MarkerId::new(1)));

        let updates = sync.poll();
        assert_eq!(
            updates,
            vec![SyncUpdate::Linked {
                marker: MarkerId::new(1),
                remote: RemoteId(1)
            }]
        );
        assert_eq!(sync.remote_id(MarkerId::new(1)), Some(RemoteId(1)));
    }

    #[test]
    fn test_updates_wait_for_remote_id() {
        let client = InMemoryClient::deferred();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_created(&marker(1));
        sync.marker_changed(MarkerId::new(1), AnnotationPatch::Label("tau".into()));
        assert!(annotation_calls(&client, "update").is_empty());

        client.deliver();
        sync.poll();
        let updates = annotation_calls(&client, "update");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["label"], "tau");
        assert_eq!(updates[0]["id"], 1);

        client.deliver();
        assert!(sync.poll().is_empty());
        assert_eq!(client.records(EntityType::Annotation)[0]["label"], "tau");
    }

    #[test]
    fn test_delete_before_ack_is_sent_after() {
        let client = InMemoryClient::deferred();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_created(&marker(1));
        sync.marker_deleted(MarkerId::new(1));

        client.deliver();
        assert!(sync.poll().is_empty());
        client.deliver();
        sync.poll();
        assert!(client.records(EntityType::Annotation).is_empty());
        assert_eq!(sync.remote_id(MarkerId::new(1)), None);
    }

    #[test]
    fn test_linked_marker_updates_immediately() {
        let client = InMemoryClient::new();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_linked(MarkerId::new(4), RemoteId(40));
        sync.marker_changed(MarkerId::new(4), AnnotationPatch::Position(Point::new(1.0, 2.0)));
        let updates = annotation_calls(&client, "update");
        assert_eq!(updates[0]["id"], 40);
        assert_eq!(updates[0]["position"]["y"], 2.0);

        // The server has no record 40, so the update fails but nothing rolls back.
        sync.poll();
        assert_eq!(sync.failures(), 1);
        assert_eq!(sync.remote_id(MarkerId::new(4)), Some(RemoteId(40)));
    }

    #[test]
    fn test_failed_create_is_counted() {
        let client = InMemoryClient::new();
        client.fail_next(RemoteSyncError::Transport("offline".into()));
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_created(&marker(1));
        assert!(sync.poll().is_empty());
        assert_eq!(sync.failures(), 1);
        assert!(!sync.is_pending(MarkerId::new(1)));
    }

    #[test]
    fn test_task_and_response_updates() {
        let client = InMemoryClient::new();
        client.enqueue_task(
            "practice",
            Task {
                id: RemoteId(3),
                name: "P.Oxy.3-practice".into(),
                url: "p3.jpg".into(),
            },
        );
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.fetch_task(WorkspaceName::Practice);
        sync.save_response(&ResponseRecord {
            content: vec![marker(1)],
            draft: false,
        });
        let updates = sync.poll();
        assert!(matches!(
            &updates[0],
            SyncUpdate::TaskReady { workspace: WorkspaceName::Practice, task } if task.id == RemoteId(3)
        ));
        assert!(matches!(updates[1], SyncUpdate::ResponseSaved(_)));
    }

    #[test]
    fn test_empty_queue_is_not_a_failure() {
        let client = InMemoryClient::new();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.fetch_task(WorkspaceName::Required);
        assert_eq!(sync.poll(), vec![SyncUpdate::QueueExhausted(WorkspaceName::Required)]);
        assert_eq!(sync.failures(), 0);

        client.fail_next(RemoteSyncError::Transport("offline".into()));
        sync.fetch_task(WorkspaceName::Required);
        assert!(sync.poll().is_empty());
        assert_eq!(sync.failures(), 1);
    }

    #[test]
    fn test_task_member_and_session_updates() {
        let client = InMemoryClient::new();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.mark_seen_all(RemoteId(7));
        sync.task_session_changed(RemoteId(3), RemoteId(12));
        let calls = client.calls();
        assert_eq!(calls[0].entity, Some(EntityType::TaskMember));
        assert_eq!(calls[0].payload, json!({"id": 7, "seen_all": true}));
        assert_eq!(calls[1].entity, Some(EntityType::TaskSession));
        assert_eq!(calls[1].payload["data"], json!({"type": "Data", "id": 12}));
    }

    #[test]
    fn test_listing_parses_records() {
        let client = InMemoryClient::new();
        let mut sync = RemoteSync::new(Box::new(client.clone()));
        sync.marker_created(&marker(1));
        sync.poll();
        sync.list_annotations(serde_json::json!({}));
        let updates = sync.poll();
        let SyncUpdate::StateListed(records) = &updates[0] else {
            panic!("expected listing, got {updates:?}");
        };
        assert_eq!(records[0].id, Some(RemoteId(1)));
        assert_eq!(records[0].position, Some(Point::new(10.0, 20.0)));
    }
}
