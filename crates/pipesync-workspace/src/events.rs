//! Session event system.
//!
//! Emits [`WorkspaceEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! other steps (pickers, previews, loggers) can follow parameter changes and
//! registry updates without holding a reference to the workspace that made them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pipesync_codec::StepParams;
use pipesync_types::StepKind;

/// Events emitted by workspaces and the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkspaceEvent {
    ParamsChanged {
        workspace: Uuid,
        kind: StepKind,
        params: StepParams,
    },
    SourceDiverged {
        workspace: Uuid,
        kind: StepKind,
    },
    ExecutionStarted {
        workspace: Uuid,
        kind: StepKind,
    },
    ExecutionSucceeded {
        workspace: Uuid,
        kind: StepKind,
        result_names: Vec<String>,
    },
    ExecutionFailed {
        workspace: Uuid,
        kind: StepKind,
        message: String,
    },
    ArtifactRegistered {
        name: String,
        parent: Option<String>,
    },
    ArtifactsRemoved {
        names: Vec<String>,
    },
    StaleArtifactsPruned {
        names: Vec<String>,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<WorkspaceEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: WorkspaceEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(WorkspaceEvent::ArtifactsRemoved {
            names: vec!["df".into(), "train_df".into()],
        });

        match rx.recv().await.unwrap() {
            WorkspaceEvent::ArtifactsRemoved { names } => {
                assert_eq!(names, vec!["df", "train_df"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let emitter = EventEmitter::new(16);
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();

        emitter.emit(WorkspaceEvent::StaleArtifactsPruned {
            names: vec!["X".into()],
        });

        let json1 = serde_json::to_string(&rx1.recv().await.unwrap()).unwrap();
        let json2 = serde_json::to_string(&rx2.recv().await.unwrap()).unwrap();
        assert_eq!(json1, json2);
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(WorkspaceEvent::ArtifactRegistered {
            name: "df".into(),
            parent: None,
        });
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let emitter = EventEmitter::new(0);
        let _rx = emitter.subscribe();
        emitter.emit(WorkspaceEvent::ArtifactsRemoved { names: Vec::new() });
    }
}
