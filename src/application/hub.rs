use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::conflict::{ConflictPolicy, ConflictResolver, Decision, PendingConflict, Resolution};
use super::fetch_coordinator::{Completed, FetchCompletion, FetchCoordinator, FetchKey};
use super::selection::{Applied, LevelState, SelectOutcome, SelectionError, SelectionState};
use super::task_controller::{TaskController, TaskError, TaskEvent, TaskUpdate};
use crate::api::CatalogSource;
use crate::config::AppConfig;
use crate::domain::{
    AppError, CatalogEntry, DownloadTask, EntryRef, SourceId, SourceResult, TaskId, TaskMetadata,
    TaskState, TransferProgress,
};
use crate::engine::DownloadEngine;
use crate::utils::absolute_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConflictTicket(u64);

#[derive(Debug, Clone)]
pub enum Command {
    Refresh { source: SourceId, level: usize },
    Select { source: SourceId, level: usize, key: String },
    Download(EntryRef),
    ResolveConflict { ticket: ConflictTicket, overwrite: bool },
    Pause(TaskId),
    Resume(TaskId),
    Cancel(TaskId),
    Acknowledge(TaskId),
}

#[derive(Debug, Clone)]
pub enum Notification {
    CatalogLoading {
        source: SourceId,
        level: usize,
    },
    /// `cleared` means the key chosen at `level` and all deeper levels were reset.
    CatalogUpdated {
        source: SourceId,
        level: usize,
        result: Arc<SourceResult>,
        cleared: bool,
    },
    TaskAdded(DownloadTask),
    TaskStateChanged {
        task: TaskId,
        state: TaskState,
    },
    TaskProgress {
        task: TaskId,
        progress: TransferProgress,
    },
    TaskRemoved(TaskId),
    ConflictPrompt {
        ticket: ConflictTicket,
        file_name: String,
    },
    ConflictBlocked {
        file_name: String,
    },
    Overwrote {
        file_name: String,
    },
    DownloadFailed {
        task: Option<TaskId>,
        error: AppError,
    },
    CommandRejected {
        reason: String,
    },
}

/// Cloneable front door to a running [`DownloadHub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("download hub has stopped, command dropped");
        }
    }

    pub fn refresh(&self, source: SourceId, level: usize) {
        self.send(Command::Refresh { source, level });
    }

    pub fn select(&self, source: SourceId, level: usize, key: impl Into<String>) {
        self.send(Command::Select {
            source,
            level,
            key: key.into(),
        });
    }

    pub fn download(&self, entry: EntryRef) {
        self.send(Command::Download(entry));
    }

    pub fn resolve_conflict(&self, ticket: ConflictTicket, overwrite: bool) {
        self.send(Command::ResolveConflict { ticket, overwrite });
    }

    pub fn pause(&self, task: TaskId) {
        self.send(Command::Pause(task));
    }

    pub fn resume(&self, task: TaskId) {
        self.send(Command::Resume(task));
    }

    pub fn cancel(&self, task: TaskId) {
        self.send(Command::Cancel(task));
    }

    pub fn acknowledge(&self, task: TaskId) {
        self.send(Command::Acknowledge(task));
    }
}

/// Why a fetch was requested.
#[derive(Debug, Clone, Copy)]
enum Waiter {
    Refresh,
    Drill,
}

struct PendingDownload {
    conflict: PendingConflict,
    entry: CatalogEntry,
    metadata: TaskMetadata,
}

/// Owns every piece of mutable state: fetch slots, per-source selections,
/// pending conflicts and the task table. Runs as a single task.
pub struct DownloadHub {
    fetches: FetchCoordinator<Waiter>,
    selections: HashMap<SourceId, SelectionState>,
    resolver: ConflictResolver,
    policy: ConflictPolicy,
    tasks: TaskController,
    pending: HashMap<ConflictTicket, PendingDownload>,
    next_ticket: u64,
    notifications: mpsc::UnboundedSender<Notification>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<FetchCompletion>,
    task_events: mpsc::UnboundedReceiver<TaskEvent>,
}

impl DownloadHub {
    pub fn new(
        sources: Vec<Arc<dyn CatalogSource>>,
        engine: Arc<dyn DownloadEngine>,
        config: &AppConfig,
    ) -> (Self, HubHandle, mpsc::UnboundedReceiver<Notification>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let selections = sources
            .iter()
            .map(|s| (s.id(), SelectionState::new(s.id())))
            .collect();
        // The conflict check and the engine must agree on the directory.
        let download_dir = absolute_dir(&config.download_dir);

        let hub = Self {
            fetches: FetchCoordinator::new(sources, completion_tx),
            selections,
            resolver: ConflictResolver::new(&download_dir, config.partial_suffix.clone()),
            policy: config.conflict_policy,
            tasks: TaskController::new(
                engine,
                task_tx,
                download_dir,
                config.poll_interval,
            ),
            pending: HashMap::new(),
            next_ticket: 0,
            notifications: notify_tx,
            commands: command_rx,
            completions: completion_rx,
            task_events: task_rx,
        };
        (hub, HubHandle { commands: command_tx }, notify_rx)
    }

    /// Start the hub on the current tokio runtime.
    pub fn spawn(
        sources: Vec<Arc<dyn CatalogSource>>,
        engine: Arc<dyn DownloadEngine>,
        config: &AppConfig,
    ) -> (HubHandle, mpsc::UnboundedReceiver<Notification>) {
        let (hub, handle, notifications) = Self::new(sources, engine, config);
        tokio::spawn(hub.run());
        (handle, notifications)
    }

    /// Process commands and background results until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            sources = self.selections.len(),
            policy = %self.policy,
            dir = %self.resolver.download_dir().display(),
            "download hub started"
        );
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(done) = self.completions.recv() => self.on_fetch_complete(done),
                Some(event) = self.task_events.recv() => self.on_task_event(event),
            }
        }
        info!("download hub stopped");
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("no one is listening for notifications");
        }
    }

    fn reject(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "command rejected");
        self.notify(Notification::CommandRejected { reason });
    }

    fn on_command(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::Refresh { source, level } => self.refresh(source, level),
            Command::Select { source, level, key } => self.select(source, level, &key),
            Command::Download(entry) => self.download(entry),
            Command::ResolveConflict { ticket, overwrite } => self.resolve_conflict(ticket, overwrite),
            Command::Pause(task) => {
                let result = self.tasks.pause(task);
                self.task_command(result);
            }
            Command::Resume(task) => {
                let result = self.tasks.resume(task);
                self.task_command(result);
            }
            Command::Cancel(task) => {
                let result = self.tasks.cancel(task);
                self.task_command(result);
            }
            Command::Acknowledge(task) => match self.tasks.acknowledge(task) {
                Ok(_) => self.notify(Notification::TaskRemoved(task)),
                Err(e) => self.reject(e.to_string()),
            },
        }
    }

    fn task_command(&self, result: Result<(), TaskError>) {
        if let Err(e) = result {
            self.reject(e.to_string());
        }
    }

    fn refresh(&mut self, source: SourceId, level: usize) {
        let Some(selection) = self.selections.get_mut(&source) else {
            self.reject(format!("unknown source {}", source));
            return;
        };
        match selection.begin_refresh(level) {
            Ok(key) => self.fetch(key, Waiter::Refresh),
            Err(e) => self.reject(e.to_string()),
        }
    }

    fn select(&mut self, source: SourceId, level: usize, key: &str) {
        let Some(selection) = self.selections.get_mut(&source) else {
            self.reject(format!("unknown source {}", source));
            return;
        };
        let outcome = selection.select(level, key);
        self.selected(source, outcome);
    }

    fn selected(&mut self, source: SourceId, outcome: Result<SelectOutcome, SelectionError>) {
        match outcome {
            Ok(SelectOutcome::Fetch(key)) => self.fetch(key, Waiter::Drill),
            Ok(SelectOutcome::Leaf(entry)) => self.start_download(source, entry),
            Err(e) => self.reject(e.to_string()),
        }
    }

    /// Download the leaf entry `entry` points at.
    fn download(&mut self, entry: EntryRef) {
        if entry.level != entry.source.leaf_level() {
            self.reject(format!("level {} of {} is not downloadable", entry.level, entry.source));
            return;
        }
        let Some(selection) = self.selections.get_mut(&entry.source) else {
            self.reject(format!("unknown source {}", entry.source));
            return;
        };
        let outcome = selection.select_at(entry.level, entry.index);
        self.selected(entry.source, outcome);
    }

    fn fetch(&mut self, key: FetchKey, waiter: Waiter) {
        let (source, level) = (key.source, key.level);
        match self.fetches.request(key, waiter) {
            Ok(handle) => {
                debug!(%source, level, ?handle, ?waiter, "fetch requested");
                self.notify(Notification::CatalogLoading { source, level });
            }
            Err(e) => {
                error!(error = %e, "fetch could not be started");
                self.reject(e.to_string());
            }
        }
    }

    fn on_fetch_complete(&mut self, done: FetchCompletion) {
        let Some(Completed { key, result, waiters }) = self.fetches.complete(done) else {
            return;
        };
        let Some(selection) = self.selections.get_mut(&key.source) else {
            return;
        };

        for waiter in waiters {
            match selection.apply(&key, Arc::clone(&result)) {
                Applied::Updated { cleared } => {
                    if let Some(LevelState::Failed { kind, message }) = selection.level(key.level) {
                        warn!(source = %key.source, level = key.level, ?kind, %message, "catalog level failed");
                    } else {
                        info!(
                            source = %key.source,
                            level = key.level,
                            entries = result.entries().len(),
                            cleared,
                            "catalog level updated"
                        );
                    }
                    if self
                        .notifications
                        .send(Notification::CatalogUpdated {
                            source: key.source,
                            level: key.level,
                            result: Arc::clone(&result),
                            cleared,
                        })
                        .is_err()
                    {
                        debug!("no one is listening for notifications");
                    }
                }
                Applied::Stale => {
                    debug!(source = %key.source, level = key.level, ?waiter, "result no longer wanted");
                }
            }
        }
    }

    fn start_download(&mut self, source: SourceId, entry: CatalogEntry) {
        let Some(selection) = self.selections.get(&source) else {
            return;
        };
        let metadata = task_metadata(selection, &entry);
        let file_name = metadata.file_name.clone();
        debug!(%source, path = ?selection.path(), file = %file_name, "download requested");

        match self.resolver.resolve(&file_name, self.policy) {
            Ok(Resolution::Decided(decision)) => self.decided(decision, entry, metadata),
            Ok(Resolution::AskUser(conflict)) => {
                self.next_ticket += 1;
                let ticket = ConflictTicket(self.next_ticket);
                info!(file = %file_name, ?ticket, "asking before replacing existing file");
                self.pending.insert(
                    ticket,
                    PendingDownload {
                        conflict,
                        entry,
                        metadata,
                    },
                );
                self.notify(Notification::ConflictPrompt { ticket, file_name });
            }
            Err(e) => {
                error!(file = %file_name, error = %e, "conflict check failed");
                self.notify(Notification::DownloadFailed {
                    task: None,
                    error: e.into(),
                });
            }
        }
    }

    fn resolve_conflict(&mut self, ticket: ConflictTicket, overwrite: bool) {
        let Some(pending) = self.pending.remove(&ticket) else {
            self.reject(format!("conflict {:?} is not pending", ticket));
            return;
        };
        let path = pending.conflict.path().to_path_buf();
        match pending.conflict.answer(overwrite) {
            Ok(decision) => self.decided(decision, pending.entry, pending.metadata),
            Err(e) => {
                error!(path = %path.display(), error = %e, "could not replace file");
                self.notify(Notification::DownloadFailed {
                    task: None,
                    error: e.into(),
                });
            }
        }
    }

    fn decided(&mut self, decision: Decision, entry: CatalogEntry, metadata: TaskMetadata) {
        match decision {
            Decision::Block => {
                let file_name = metadata.file_name;
                self.notify(Notification::ConflictBlocked { file_name });
            }
            Decision::ProceedAfterDelete => {
                self.notify(Notification::Overwrote {
                    file_name: metadata.file_name.clone(),
                });
                self.submit(entry, metadata);
            }
            Decision::Proceed => self.submit(entry, metadata),
        }
    }

    fn submit(&mut self, entry: CatalogEntry, metadata: TaskMetadata) {
        let id = self.tasks.submit(entry.url(), entry.title(), metadata);
        if let Some(task) = self.tasks.get(id) {
            self.notify(Notification::TaskAdded(task.clone()));
        }
    }

    fn on_task_event(&mut self, event: TaskEvent) {
        for update in self.tasks.handle(event) {
            let notification = match update {
                TaskUpdate::StateChanged { task, state } => {
                    Notification::TaskStateChanged { task, state }
                }
                TaskUpdate::Progress { task, progress } => {
                    Notification::TaskProgress { task, progress }
                }
                TaskUpdate::Failed { task, error } => Notification::DownloadFailed {
                    task: Some(task),
                    error,
                },
                TaskUpdate::Rejected { reason, .. } => Notification::CommandRejected { reason },
            };
            self.notify(notification);
        }
    }
}

/// Describe the job from the entry and the path that led to it.
fn task_metadata(selection: &SelectionState, entry: &CatalogEntry) -> TaskMetadata {
    let ancestor = |level: usize| selection.selected_entry(level).map(|e| e.title().to_string());
    let mut metadata = TaskMetadata {
        file_name: entry.disk_name(),
        ..TaskMetadata::default()
    };

    match selection.source() {
        SourceId::Mcsl(category) => metadata.core_name = Some(category.document().to_string()),
        SourceId::FastMirror => {
            metadata.core_name = ancestor(0);
            metadata.mc_version = ancestor(1);
            metadata.build = Some(entry.key().to_string());
        }
        SourceId::Polars | SourceId::Akira => metadata.core_name = ancestor(0),
    }
    metadata
}
