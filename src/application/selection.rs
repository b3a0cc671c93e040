use std::sync::Arc;

use thiserror::Error;

use super::fetch_coordinator::FetchKey;
use crate::domain::{CatalogEntry, FailureKind, SourceId, SourceResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelState {
    Unset,
    /// `previous` holds the payload a refresh is replacing, if any.
    Fetching { previous: Option<Arc<SourceResult>> },
    Ready(Arc<SourceResult>),
    Failed { kind: FailureKind, message: String },
}

impl LevelState {
    pub fn entries(&self) -> &[CatalogEntry] {
        match self {
            LevelState::Ready(result) => result.entries(),
            _ => &[],
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{source_id} has no level {level}")]
    NoSuchLevel { source_id: SourceId, level: usize },

    #[error("level {level} of {source_id} is not loaded")]
    NotReady { source_id: SourceId, level: usize },

    #[error("'{key}' is not an entry of level {level}")]
    UnknownKey { level: usize, key: String },

    #[error("level {level} has no entry {index}")]
    NoSuchEntry { level: usize, index: usize },

    #[error("a parent of level {level} is not selected")]
    ParentUnset { level: usize },
}

/// Keys chosen so far, root first. `None` past the deepest selection.
pub type SelectionPath = Vec<Option<String>>;

#[derive(Debug)]
pub enum SelectOutcome {
    /// The next level must be loaded.
    Fetch(FetchKey),
    /// A leaf was chosen; nothing more to load.
    Leaf(CatalogEntry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// `cleared` is set when the level's chosen key and every deeper level were reset.
    Updated { cleared: bool },
    Stale,
}

/// Drill-down state of one source.
#[derive(Debug, Clone)]
pub struct SelectionState {
    source: SourceId,
    levels: Vec<LevelState>,
    keys: SelectionPath,
}

impl SelectionState {
    pub fn new(source: SourceId) -> Self {
        let depth = source.depth();
        Self {
            source,
            levels: vec![LevelState::Unset; depth],
            keys: vec![None; depth],
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn level(&self, level: usize) -> Option<&LevelState> {
        self.levels.get(level)
    }

    pub fn path(&self) -> &SelectionPath {
        &self.keys
    }

    /// The entry chosen at `level`, if its level is loaded.
    pub fn selected_entry(&self, level: usize) -> Option<&CatalogEntry> {
        let key = self.keys.get(level)?.as_deref()?;
        self.levels
            .get(level)?
            .entries()
            .iter()
            .find(|e| e.key() == key)
    }

    /// Keys of every level above `level`, or `None` if one is missing.
    fn parents(&self, level: usize) -> Option<Vec<String>> {
        self.keys[..level].iter().cloned().collect()
    }

    fn check_level(&self, level: usize) -> Result<(), SelectionError> {
        if level < self.levels.len() {
            Ok(())
        } else {
            Err(SelectionError::NoSuchLevel {
                source_id: self.source,
                level,
            })
        }
    }

    /// Reset the key at `level` and everything beneath it.
    fn clear_from(&mut self, level: usize) {
        for key in &mut self.keys[level..] {
            *key = None;
        }
        for state in self.levels.iter_mut().skip(level + 1) {
            *state = LevelState::Unset;
        }
    }

    /// Put `level` into `Fetching`, remembering the payload being refreshed.
    pub fn begin_refresh(&mut self, level: usize) -> Result<FetchKey, SelectionError> {
        self.check_level(level)?;
        let parents = self
            .parents(level)
            .ok_or(SelectionError::ParentUnset { level })?;

        let previous = match &self.levels[level] {
            LevelState::Ready(result) => Some(Arc::clone(result)),
            LevelState::Fetching { previous } => previous.clone(),
            _ => None,
        };
        self.levels[level] = LevelState::Fetching { previous };

        Ok(FetchKey {
            source: self.source,
            level,
            parents,
        })
    }

    fn ready_entries(&self, level: usize) -> Result<&[CatalogEntry], SelectionError> {
        self.check_level(level)?;
        match &self.levels[level] {
            LevelState::Ready(result) => Ok(result.entries()),
            _ => Err(SelectionError::NotReady {
                source_id: self.source,
                level,
            }),
        }
    }

    pub fn select(&mut self, level: usize, key: &str) -> Result<SelectOutcome, SelectionError> {
        let index = self
            .ready_entries(level)?
            .iter()
            .position(|e| e.key() == key)
            .ok_or_else(|| SelectionError::UnknownKey {
                level,
                key: key.to_string(),
            })?;
        self.select_at(level, index)
    }

    /// Choose the entry at `index`. Entries sharing a key stay distinct.
    pub fn select_at(&mut self, level: usize, index: usize) -> Result<SelectOutcome, SelectionError> {
        let entry = self
            .ready_entries(level)?
            .get(index)
            .cloned()
            .ok_or(SelectionError::NoSuchEntry { level, index })?;

        self.clear_from(level);
        self.keys[level] = Some(entry.key().to_string());

        if level == self.source.leaf_level() {
            return Ok(SelectOutcome::Leaf(entry));
        }

        let next = level + 1;
        self.levels[next] = LevelState::Fetching { previous: None };
        Ok(SelectOutcome::Fetch(FetchKey {
            source: self.source,
            level: next,
            parents: self.keys[..next].iter().flatten().cloned().collect(),
        }))
    }

    /// Apply a finished fetch if it still answers what this state is waiting for.
    pub fn apply(&mut self, key: &FetchKey, result: Arc<SourceResult>) -> Applied {
        if key.source != self.source || key.level >= self.levels.len() {
            return Applied::Stale;
        }
        let previous = match &self.levels[key.level] {
            LevelState::Fetching { previous } => previous.clone(),
            _ => return Applied::Stale,
        };
        if self.parents(key.level).as_ref() != Some(&key.parents) {
            return Applied::Stale;
        }

        let level = key.level;
        let failure = match result.as_ref() {
            SourceResult::NetworkError(message) => Some((FailureKind::Network, message.clone())),
            SourceResult::ParseError(message) => Some((FailureKind::Parse, message.clone())),
            _ => None,
        };

        if let Some((kind, message)) = failure {
            self.clear_from(level);
            self.levels[level] = LevelState::Failed { kind, message };
            return Applied::Updated { cleared: true };
        }

        let cleared = previous.is_some_and(|prev| *prev != *result);
        if cleared {
            self.clear_from(level);
        }
        self.levels[level] = LevelState::Ready(result);
        Applied::Updated { cleared }
    }
}
