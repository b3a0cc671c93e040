use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    AppError, DownloadTask, EngineTaskId, TaskId, TaskMetadata, TaskState, TransferProgress,
};
use crate::engine::{DownloadEngine, EngineError, EngineEvent, EngineEventSink, EngineRequest, EngineStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    Pause,
    Resume,
    Cancel,
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskCommand::Pause => "pause",
            TaskCommand::Resume => "resume",
            TaskCommand::Cancel => "cancel",
        })
    }
}

/// Results of background engine work, fed back into [`TaskController::handle`].
#[derive(Debug)]
pub enum TaskEvent {
    Submitted {
        task: TaskId,
        outcome: Result<EngineTaskId, EngineError>,
    },
    Engine(EngineEvent),
    CommandFailed {
        task: TaskId,
        command: TaskCommand,
        error: EngineError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("no download {0}")]
    NotFound(TaskId),

    #[error("download {0} has not reached the engine yet")]
    NotSubmitted(TaskId),

    #[error("download {0} has already finished")]
    Finished(TaskId),

    #[error("download {0} is still running")]
    Running(TaskId),
}

/// Observable consequence of handling a [`TaskEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    StateChanged { task: TaskId, state: TaskState },
    Progress { task: TaskId, progress: TransferProgress },
    Failed { task: TaskId, error: AppError },
    Rejected { task: TaskId, reason: String },
}

/// Download task table.
///
/// Local state only moves on engine notifications; commands are forwarded
/// and never applied optimistically.
pub struct TaskController {
    engine: Arc<dyn DownloadEngine>,
    events: mpsc::UnboundedSender<TaskEvent>,
    download_dir: PathBuf,
    poll_interval: Duration,
    tasks: BTreeMap<TaskId, DownloadTask>,
    by_engine: HashMap<EngineTaskId, TaskId>,
    orphans: HashMap<EngineTaskId, Vec<EngineEvent>>,
    next_id: u64,
}

impl TaskController {
    pub fn new(
        engine: Arc<dyn DownloadEngine>,
        events: mpsc::UnboundedSender<TaskEvent>,
        download_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            events,
            download_dir,
            poll_interval,
            tasks: BTreeMap::new(),
            by_engine: HashMap::new(),
            orphans: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&DownloadTask> {
        self.tasks.get(&id)
    }

    /// Record a queued task and hand it to the engine in the background.
    pub fn submit(&mut self, uri: &str, display_name: &str, metadata: TaskMetadata) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);

        let request = EngineRequest {
            uri: uri.to_string(),
            file_name: metadata.file_name.clone(),
            directory: self.download_dir.clone(),
            watch: true,
            poll_interval: self.poll_interval,
            metadata: metadata.clone(),
        };
        let task = DownloadTask::new(id, uri.to_string(), display_name.to_string(), metadata);
        self.tasks.insert(id, task);
        info!(task = %id, %uri, "download queued");

        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        let sink_events = self.events.clone();
        let sink: EngineEventSink = Arc::new(move |event| {
            let _ = sink_events.send(TaskEvent::Engine(event));
        });

        tokio::spawn(async move {
            let outcome = submit_to_engine(engine.as_ref(), request, sink).await;
            let _ = events.send(TaskEvent::Submitted { task: id, outcome });
        });

        id
    }

    pub fn pause(&self, id: TaskId) -> Result<(), TaskError> {
        self.forward(id, TaskCommand::Pause)
    }

    pub fn resume(&self, id: TaskId) -> Result<(), TaskError> {
        self.forward(id, TaskCommand::Resume)
    }

    pub fn cancel(&self, id: TaskId) -> Result<(), TaskError> {
        self.forward(id, TaskCommand::Cancel)
    }

    /// Drop a finished task from the table.
    pub fn acknowledge(&mut self, id: TaskId) -> Result<DownloadTask, TaskError> {
        let task = self.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        if !task.state.is_terminal() {
            return Err(TaskError::Running(id));
        }
        let task = self.tasks.remove(&id).ok_or(TaskError::NotFound(id))?;
        if let Some(engine_id) = &task.engine_id {
            self.by_engine.remove(engine_id);
        }
        Ok(task)
    }

    fn forward(&self, id: TaskId, command: TaskCommand) -> Result<(), TaskError> {
        let task = self.tasks.get(&id).ok_or(TaskError::NotFound(id))?;
        if task.state.is_terminal() {
            return Err(TaskError::Finished(id));
        }
        let engine_id = task.engine_id.clone().ok_or(TaskError::NotSubmitted(id))?;

        debug!(task = %id, gid = %engine_id, %command, "forwarding to engine");
        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match command {
                TaskCommand::Pause => engine.pause(&engine_id).await,
                TaskCommand::Resume => engine.resume(&engine_id).await,
                TaskCommand::Cancel => engine.cancel(&engine_id).await,
            };
            if let Err(error) = result {
                let _ = events.send(TaskEvent::CommandFailed {
                    task: id,
                    command,
                    error,
                });
            }
        });
        Ok(())
    }

    pub fn handle(&mut self, event: TaskEvent) -> Vec<TaskUpdate> {
        match event {
            TaskEvent::Submitted { task, outcome } => self.on_submitted(task, outcome),
            TaskEvent::Engine(event) => match self.by_engine.get(&event.id).copied() {
                Some(task) => self.apply_engine(task, event),
                None => {
                    debug!(gid = %event.id, "buffering event for a job not yet attached");
                    self.orphans.entry(event.id.clone()).or_default().push(event);
                    Vec::new()
                }
            },
            TaskEvent::CommandFailed { task, command, error } => {
                warn!(task = %task, %command, error = %error, "engine refused command");
                vec![TaskUpdate::Rejected {
                    task,
                    reason: format!("could not {} download: {}", command, error),
                }]
            }
        }
    }

    fn on_submitted(&mut self, id: TaskId, outcome: Result<EngineTaskId, EngineError>) -> Vec<TaskUpdate> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Vec::new();
        };

        match outcome {
            Ok(engine_id) => {
                info!(task = %id, gid = %engine_id, "download handed to engine");
                task.engine_id = Some(engine_id.clone());
                self.by_engine.insert(engine_id.clone(), id);
                self.orphans
                    .remove(&engine_id)
                    .unwrap_or_default()
                    .into_iter()
                    .flat_map(|event| self.apply_engine(id, event))
                    .collect()
            }
            Err(e) => {
                let error = match e {
                    EngineError::Unreachable => AppError::EngineUnreachable,
                    other => AppError::Rejected(other.to_string()),
                };
                warn!(task = %id, error = %error, "download could not be submitted");
                task.state = TaskState::Failed;
                task.failure = Some(error.to_string());
                vec![
                    TaskUpdate::StateChanged {
                        task: id,
                        state: TaskState::Failed,
                    },
                    TaskUpdate::Failed { task: id, error },
                ]
            }
        }
    }

    fn apply_engine(&mut self, id: TaskId, event: EngineEvent) -> Vec<TaskUpdate> {
        let Some(task) = self.tasks.get_mut(&id) else {
            return Vec::new();
        };
        if task.state.is_terminal() {
            debug!(task = %id, status = ?event.status, "ignoring event for finished download");
            return Vec::new();
        }

        task.progress = event.progress;
        let mut updates = vec![TaskUpdate::Progress {
            task: id,
            progress: event.progress,
        }];

        let Some(next) = event.status.task_state() else {
            return updates;
        };
        if next == task.state {
            return updates;
        }
        if !task.state.can_transition_to(next) {
            debug!(task = %id, from = %task.state, to = %next, "ignoring out-of-order transition");
            return updates;
        }

        info!(task = %id, from = %task.state, to = %next, "download state changed");
        task.state = next;
        updates.push(TaskUpdate::StateChanged { task: id, state: next });

        if let EngineStatus::Error(message) = event.status {
            task.failure = Some(message.clone());
            updates.push(TaskUpdate::Failed {
                task: id,
                error: AppError::Rejected(message),
            });
        }
        updates
    }
}

/// Hand a request to the engine, restarting it at most once.
async fn submit_to_engine(
    engine: &dyn DownloadEngine,
    request: EngineRequest,
    sink: EngineEventSink,
) -> Result<EngineTaskId, EngineError> {
    let mut restarted = false;
    loop {
        if engine.test_reachable().await {
            match engine.download(request.clone(), Arc::clone(&sink)).await {
                Err(EngineError::Unreachable) if !restarted => {}
                other => return other,
            }
        }
        if restarted {
            return Err(EngineError::Unreachable);
        }
        restarted = true;
        warn!("download engine unreachable, restarting it");
        if !engine.start().await {
            warn!("engine restart failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeEngine;

    fn setup(engine: Arc<FakeEngine>) -> (TaskController, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = TaskController::new(
            engine,
            tx,
            PathBuf::from("downloads"),
            Duration::from_millis(200),
        );
        (controller, rx)
    }

    fn metadata() -> TaskMetadata {
        TaskMetadata {
            file_name: "paper-1.20.1-196.jar".to_string(),
            core_name: Some("Paper".to_string()),
            mc_version: Some("1.20.1".to_string()),
            build: Some("196".to_string()),
        }
    }

    /// Submit one task and let the engine accept it.
    async fn submitted(
        engine: &Arc<FakeEngine>,
    ) -> (TaskController, mpsc::UnboundedReceiver<TaskEvent>, TaskId) {
        let (mut controller, mut rx) = setup(Arc::clone(engine));
        let id = controller.submit("https://dl.example/paper.jar", "Paper 196", metadata());
        let event = rx.recv().await.unwrap();
        assert!(controller.handle(event).is_empty());
        (controller, rx, id)
    }

    #[tokio::test]
    async fn test_state_follows_engine_and_stays_terminal() {
        let engine = Arc::new(FakeEngine::new(true, true));
        let (mut controller, mut rx, id) = submitted(&engine).await;
        assert_eq!(controller.get(id).unwrap().state, TaskState::Queued);
        assert_eq!(engine.requests()[0].metadata.mc_version.as_deref(), Some("1.20.1"));

        engine.emit("gid1", EngineStatus::Active, 10);
        let updates = controller.handle(rx.recv().await.unwrap());
        assert!(updates.contains(&TaskUpdate::StateChanged {
            task: id,
            state: TaskState::Active
        }));

        engine.emit("gid1", EngineStatus::Complete, 100);
        controller.handle(rx.recv().await.unwrap());
        assert_eq!(controller.get(id).unwrap().state, TaskState::Completed);

        engine.emit("gid1", EngineStatus::Active, 100);
        assert!(controller.handle(rx.recv().await.unwrap()).is_empty());
        assert_eq!(controller.get(id).unwrap().state, TaskState::Completed);
    }

    #[tokio::test]
    async fn test_commands_wait_for_engine_acknowledgement() {
        let engine = Arc::new(FakeEngine::new(true, true));
        let (mut controller, mut rx, id) = submitted(&engine).await;
        engine.emit("gid1", EngineStatus::Active, 5);
        controller.handle(rx.recv().await.unwrap());

        controller.pause(id).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(engine.commands(), vec!["pause gid1".to_string()]);
        assert_eq!(controller.get(id).unwrap().state, TaskState::Active);

        engine.emit("gid1", EngineStatus::Paused, 5);
        controller.handle(rx.recv().await.unwrap());
        assert_eq!(controller.get(id).unwrap().state, TaskState::Paused);

        // Paused -> Completed is not a legal step.
        engine.emit("gid1", EngineStatus::Complete, 100);
        controller.handle(rx.recv().await.unwrap());
        assert_eq!(controller.get(id).unwrap().state, TaskState::Paused);

        engine.emit("gid1", EngineStatus::Removed, 5);
        controller.handle(rx.recv().await.unwrap());
        assert_eq!(controller.get(id).unwrap().state, TaskState::Canceled);
        assert_eq!(controller.cancel(id), Err(TaskError::Finished(id)));

        let task = controller.acknowledge(id).unwrap();
        assert_eq!(task.state, TaskState::Canceled);
        assert_eq!(controller.pause(id), Err(TaskError::NotFound(id)));
    }

    #[tokio::test]
    async fn test_early_engine_events_are_replayed() {
        let engine = Arc::new(FakeEngine::new(true, true));
        let (mut controller, mut rx) = setup(Arc::clone(&engine));
        let id = controller.submit("https://dl.example/paper.jar", "Paper 196", metadata());
        assert_eq!(controller.pause(id), Err(TaskError::NotSubmitted(id)));

        let submitted = rx.recv().await.unwrap();
        engine.emit("gid1", EngineStatus::Active, 40);
        let early = rx.recv().await.unwrap();

        assert!(controller.handle(early).is_empty());
        let updates = controller.handle(submitted);
        assert!(updates.contains(&TaskUpdate::StateChanged {
            task: id,
            state: TaskState::Active
        }));
        assert_eq!(controller.get(id).unwrap().progress.completed, 40);
    }

    #[tokio::test]
    async fn test_unreachable_engine_restarts_once() {
        let engine = Arc::new(FakeEngine::new(false, true));
        let (controller, _rx, id) = submitted(&engine).await;
        assert_eq!(engine.starts(), 1);
        assert_eq!(controller.get(id).unwrap().engine_id, Some(EngineTaskId("gid1".to_string())));
    }

    #[tokio::test]
    async fn test_second_unreachability_fails_submission() {
        let engine = Arc::new(FakeEngine::new(false, false));
        let (mut controller, mut rx) = setup(Arc::clone(&engine));
        let id = controller.submit("https://dl.example/paper.jar", "Paper 196", metadata());

        let updates = controller.handle(rx.recv().await.unwrap());
        assert_eq!(engine.starts(), 1);
        assert!(engine.requests().is_empty());
        assert!(updates.contains(&TaskUpdate::Failed {
            task: id,
            error: AppError::EngineUnreachable
        }));
        assert_eq!(controller.get(id).unwrap().state, TaskState::Failed);
    }

    #[tokio::test]
    async fn test_engine_error_status_records_failure() {
        let engine = Arc::new(FakeEngine::new(true, true));
        let (mut controller, mut rx, id) = submitted(&engine).await;

        engine.emit("gid1", EngineStatus::Error("404 Not Found".to_string()), 0);
        let updates = controller.handle(rx.recv().await.unwrap());
        assert!(updates.contains(&TaskUpdate::StateChanged {
            task: id,
            state: TaskState::Failed
        }));
        assert_eq!(controller.get(id).unwrap().failure.as_deref(), Some("404 Not Found"));
        assert_eq!(controller.acknowledge(id).unwrap().id, id);
    }
}
