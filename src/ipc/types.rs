use crate::api::LmsClient;
use crate::model::CourseSnapshot;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Explicit lifecycle of the course snapshot, surfaced verbatim to the
/// front end instead of separate loading/error flags.
pub enum SnapshotState {
    Idle,
    Loading,
    Ready(CourseSnapshot),
    Failed { error: String },
}

impl SnapshotState {
    pub fn label(&self) -> &'static str {
        match self {
            SnapshotState::Idle => "idle",
            SnapshotState::Loading => "loading",
            SnapshotState::Ready(_) => "ready",
            SnapshotState::Failed { .. } => "failed",
        }
    }
}

pub struct AppState {
    pub client: Option<Arc<LmsClient>>,
    pub snapshot: SnapshotState,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            client: None,
            snapshot: SnapshotState::Idle,
        }
    }

    pub fn snapshot_ready(&self) -> Option<&CourseSnapshot> {
        match &self.snapshot {
            SnapshotState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}
