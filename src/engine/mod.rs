pub mod aria2;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{EngineTaskId, TaskMetadata, TaskState, TransferProgress};

pub use aria2::{Aria2Config, Aria2Engine};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("download engine is unreachable")]
    Unreachable,

    #[error("engine RPC failed: {0}")]
    Rpc(String),

    #[error("engine returned an invalid reply: {0}")]
    InvalidReply(String),
}

/// Job status as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Waiting,
    Active,
    Paused,
    Complete,
    Error(String),
    Removed,
}

impl EngineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineStatus::Complete | EngineStatus::Error(_) | EngineStatus::Removed
        )
    }

    /// Task state this status acknowledges. `Waiting` acknowledges nothing.
    pub fn task_state(&self) -> Option<TaskState> {
        match self {
            EngineStatus::Waiting => None,
            EngineStatus::Active => Some(TaskState::Active),
            EngineStatus::Paused => Some(TaskState::Paused),
            EngineStatus::Complete => Some(TaskState::Completed),
            EngineStatus::Error(_) => Some(TaskState::Failed),
            EngineStatus::Removed => Some(TaskState::Canceled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub id: EngineTaskId,
    pub status: EngineStatus,
    pub progress: TransferProgress,
}

/// Receives progress and terminal notifications for watched jobs.
pub type EngineEventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub uri: String,
    pub file_name: String,
    pub directory: PathBuf,
    pub watch: bool,
    pub poll_interval: Duration,
    pub metadata: TaskMetadata,
}

/// External download service.
#[async_trait::async_trait]
pub trait DownloadEngine: Send + Sync {
    async fn test_reachable(&self) -> bool;

    /// Try to (re)start the engine. Returns whether it came up.
    async fn start(&self) -> bool;

    async fn download(
        &self,
        request: EngineRequest,
        on_event: EngineEventSink,
    ) -> Result<EngineTaskId, EngineError>;

    async fn pause(&self, id: &EngineTaskId) -> Result<(), EngineError>;

    async fn resume(&self, id: &EngineTaskId) -> Result<(), EngineError>;

    async fn cancel(&self, id: &EngineTaskId) -> Result<(), EngineError>;
}
