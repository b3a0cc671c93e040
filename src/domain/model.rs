use std::fmt;

use thiserror::Error;
use url::Url;

use super::error::AppError;
use crate::utils::sanitize_filename;

/// Categories served by the MCSL flat-list API, one JSON document each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum McslCategory {
    Java,
    Spigot,
    Paper,
    BungeeCord,
    OfficialCore,
}

impl McslCategory {
    pub const ALL: [McslCategory; 5] = [
        McslCategory::Java,
        McslCategory::Spigot,
        McslCategory::Paper,
        McslCategory::BungeeCord,
        McslCategory::OfficialCore,
    ];

    /// Path segment used by the upstream document name.
    pub fn document(self) -> &'static str {
        match self {
            McslCategory::Java => "Java",
            McslCategory::Spigot => "Spigot",
            McslCategory::Paper => "Paper",
            McslCategory::BungeeCord => "BungeeCord",
            McslCategory::OfficialCore => "OfficialCore",
        }
    }
}

/// Identifies one catalog source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    Mcsl(McslCategory),
    FastMirror,
    Polars,
    Akira,
}

impl SourceId {
    pub fn all() -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = McslCategory::ALL.iter().map(|c| SourceId::Mcsl(*c)).collect();
        ids.extend([SourceId::FastMirror, SourceId::Polars, SourceId::Akira]);
        ids
    }

    /// Drill-down level names, root first. The last one is the leaf level.
    pub fn levels(self) -> &'static [&'static str] {
        match self {
            SourceId::Mcsl(_) => &["file"],
            SourceId::FastMirror => &["type", "mcVersion", "build"],
            SourceId::Polars => &["type", "core"],
            SourceId::Akira => &["type", "file"],
        }
    }

    pub fn depth(self) -> usize {
        self.levels().len()
    }

    pub fn leaf_level(self) -> usize {
        self.depth() - 1
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Mcsl(category) => write!(f, "MCSL {}", category.document()),
            SourceId::FastMirror => f.write_str("FastMirror"),
            SourceId::Polars => f.write_str("Polars"),
            SourceId::Akira => f.write_str("Akira Cloud"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("invalid entry url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("entry '{0}' has no usable file name")]
    EmptyFilename(String),
}

/// One downloadable (or drill-down) item, normalized across sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    title: String,
    url: String,
    filename: String,
    format: String,
    key: String,
    label: Option<String>,
}

impl CatalogEntry {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        filename: impl AsRef<str>,
        format: impl AsRef<str>,
    ) -> Result<Self, EntryError> {
        let title = title.into().trim().to_string();
        let url = url.into().trim().to_string();

        let url = match Url::parse(&url) {
            Ok(parsed) => parsed.to_string(),
            Err(e) => {
                return Err(EntryError::InvalidUrl {
                    url,
                    reason: e.to_string(),
                })
            }
        };

        let filename = sanitize_filename(filename.as_ref());
        if filename.is_empty() || filename.chars().all(|c| c == '.') {
            return Err(EntryError::EmptyFilename(title));
        }
        let format = sanitize_filename(format.as_ref().trim_start_matches('.'));

        Ok(Self {
            key: title.clone(),
            title,
            url,
            filename,
            format,
            label: None,
        })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = (!label.trim().is_empty()).then_some(label);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Name of the file on disk.
    pub fn disk_name(&self) -> String {
        if self.format.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, self.format)
        }
    }
}

/// Outcome of one adapter fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceResult {
    Ok(Vec<CatalogEntry>),
    NetworkError(String),
    ParseError(String),
    Empty,
}

impl SourceResult {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        if entries.is_empty() {
            SourceResult::Empty
        } else {
            SourceResult::Ok(entries)
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        match self {
            SourceResult::Ok(entries) => entries,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<AppError> {
        match self {
            SourceResult::NetworkError(e) => Some(AppError::Network(e.clone())),
            SourceResult::ParseError(e) => Some(AppError::Parse(e.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Parse,
}

/// Points at one entry of a loaded level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryRef {
    pub source: SourceId,
    pub level: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier the download engine assigned to a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineTaskId(pub String);

impl fmt::Display for EngineTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Active,
    Paused,
    Canceled,
    Failed,
    Completed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Canceled | TaskState::Failed | TaskState::Completed
        )
    }

    /// Queued → Active → {Paused ↔ Active} → {Canceled | Failed | Completed}.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Active | Canceled | Failed | Completed)
                | (Active, Paused | Canceled | Failed | Completed)
                | (Paused, Active | Canceled | Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Queued => "Queued",
            TaskState::Active => "Downloading",
            TaskState::Paused => "Paused",
            TaskState::Canceled => "Canceled",
            TaskState::Failed => "Failed",
            TaskState::Completed => "Completed",
        };
        f.write_str(name)
    }
}

/// Extra data handed to the engine with every job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskMetadata {
    pub file_name: String,
    pub core_name: Option<String>,
    pub mc_version: Option<String>,
    pub build: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub completed: u64,
    pub total: u64,
    /// Bytes per second.
    pub speed: u64,
}

impl TransferProgress {
    /// Fraction in 0.0..=1.0, zero while the size is unknown.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f32 / self.total as f32).min(1.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: TaskId,
    pub source_uri: String,
    pub display_name: String,
    pub state: TaskState,
    pub metadata: TaskMetadata,
    pub engine_id: Option<EngineTaskId>,
    pub progress: TransferProgress,
    pub failure: Option<String>,
}

impl DownloadTask {
    pub fn new(id: TaskId, source_uri: String, display_name: String, metadata: TaskMetadata) -> Self {
        Self {
            id,
            source_uri,
            display_name,
            state: TaskState::Queued,
            metadata,
            engine_id: None,
            progress: TransferProgress::default(),
            failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rejects_relative_url() {
        let err = CatalogEntry::new("Paper", "/download/paper", "paper", "jar").unwrap_err();
        assert!(matches!(err, EntryError::InvalidUrl { .. }));
    }

    #[test]
    fn test_entry_stores_normalized_url() {
        let entry = CatalogEntry::new("Paper", " https://example.com/paper core.jar ", "paper", "jar").unwrap();
        assert_eq!(entry.url(), "https://example.com/paper%20core.jar");
    }

    #[test]
    fn test_entry_sanitizes_filename() {
        let entry = CatalogEntry::new("x", "https://example.com/a", "paper/1.20:1", ".jar").unwrap();
        assert_eq!(entry.disk_name(), "paper_1.20_1.jar");
        assert_eq!(entry.key(), "x");

        let err = CatalogEntry::new("dots", "https://example.com/a", "..", "jar").unwrap_err();
        assert_eq!(err, EntryError::EmptyFilename("dots".to_string()));
    }

    #[test]
    fn test_disk_name_without_format() {
        let entry = CatalogEntry::new("Paper", "https://example.com/p", "Paper", "").unwrap();
        assert_eq!(entry.disk_name(), "Paper");
        assert_eq!(entry.label(), None);
        assert_eq!(entry.with_label("Plugin").label(), Some("Plugin"));
    }

    #[test]
    fn test_empty_entries_become_empty_result() {
        assert_eq!(SourceResult::from_entries(Vec::new()), SourceResult::Empty);
        assert_eq!(SourceResult::Empty.error(), None);
        assert_eq!(
            SourceResult::ParseError("bad".to_string()).error(),
            Some(AppError::Parse("bad".to_string()))
        );
    }

    #[test]
    fn test_task_state_transitions() {
        use TaskState::*;
        assert!(Queued.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Paused.can_transition_to(Canceled));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Canceled.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Queued));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_levels_per_source() {
        assert_eq!(SourceId::FastMirror.leaf_level(), 2);
        assert_eq!(SourceId::Mcsl(McslCategory::Java).leaf_level(), 0);
        assert_eq!(SourceId::all().len(), 8);
    }
}
