//! Annotation events broadcast by other participants of a shared session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::Point;
use crate::model::{ActorId, RemoteId};
use crate::remote::{AnnotationRecord, RemoteResult};

/// An event from the collaboration transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum CollabEvent {
    Save(AnnotationEnvelope),
    Delete(AnnotationEnvelope),
}

/// `{"annotation": {...}}`, the payload shape of both event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEnvelope {
    pub annotation: AnnotationRecord,
}

impl CollabEvent {
    pub fn save(annotation: AnnotationRecord) -> Self {
        CollabEvent::Save(AnnotationEnvelope { annotation })
    }

    pub fn delete(id: RemoteId) -> Self {
        CollabEvent::Delete(AnnotationEnvelope {
            annotation: AnnotationRecord::default().with_id(id),
        })
    }

    pub fn from_value(value: Value) -> RemoteResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// What the surface should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum CollabAction {
    /// Update the marker linked to `remote`, or create one.
    Upsert {
        remote: RemoteId,
        label: String,
        position: Point,
    },
    /// Remove the marker linked to `remote`, if any.
    Remove(RemoteId),
    Ignore,
}

/// Decides which events apply locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollabFilter {
    pub active: bool,
    /// The local participant; its own saves echo back and are dropped.
    pub local: ActorId,
}

impl CollabFilter {
    pub fn new(active: bool, local: ActorId) -> Self {
        Self { active, local }
    }

    pub fn plan(&self, event: &CollabEvent) -> CollabAction {
        if !self.active {
            return CollabAction::Ignore;
        }
        match event {
            CollabEvent::Save(AnnotationEnvelope { annotation }) => {
                if annotation.updated_by == Some(self.local) {
                    log::trace!("Ignoring echo of own save");
                    return CollabAction::Ignore;
                }
                match (annotation.id, annotation.position) {
                    (Some(remote), Some(position)) => CollabAction::Upsert {
                        remote,
                        label: annotation.label.clone().unwrap_or_default(),
                        position,
                    },
                    _ => {
                        log::warn!("Save event without id or position ignored");
                        CollabAction::Ignore
                    }
                }
            }
            CollabEvent::Delete(AnnotationEnvelope { annotation }) => match annotation.id {
                Some(remote) => CollabAction::Remove(remote),
                None => CollabAction::Ignore,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ME: ActorId = ActorId(7);

    #[test]
    fn test_save_from_other_actor_upserts() {
        let event = CollabEvent::from_value(json!({
            "kind": "save",
            "payload": {"annotation": {"id": 3, "label": "tau", "position": {"x": 4.0, "y": 5.0}, "updated_by": 2}}
        }))
        .unwrap();
        assert_eq!(
            CollabFilter::new(true, ME).plan(&event),
            CollabAction::Upsert {
                remote: RemoteId(3),
                label: "tau".into(),
                position: Point::new(4.0, 5.0)
            }
        );
    }

    #[test]
    fn test_own_save_is_ignored() {
        let event = CollabEvent::save(AnnotationRecord {
            id: Some(RemoteId(3)),
            label: Some(String::new()),
            position: Some(Point::ORIGIN),
            updated_by: Some(ME),
        });
        assert_eq!(CollabFilter::new(true, ME).plan(&event), CollabAction::Ignore);
    }

    #[test]
    fn test_inactive_filter_ignores_everything() {
        let event = CollabEvent::delete(RemoteId(1));
        assert_eq!(CollabFilter::new(false, ME).plan(&event), CollabAction::Ignore);
        assert_eq!(
            CollabFilter::new(true, ME).plan(&event),
            CollabAction::Remove(RemoteId(1))
        );
    }

    #[test]
    fn test_incomplete_save_is_ignored() {
        let event = CollabEvent::save(AnnotationRecord::default().with_id(RemoteId(1)));
        assert_eq!(CollabFilter::new(true, ME).plan(&event), CollabAction::Ignore);
    }
}
