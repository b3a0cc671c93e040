use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use iced::{
    widget::{button, column, progress_bar, row, scrollable, text, Column, Row, Space},
    Element, Length,
};

use crate::application::Notification;
use crate::domain::{AppError, DownloadTask, SourceId, SourceResult, TaskId, TaskState};

#[derive(Debug, Clone, Default)]
pub enum LevelView {
    #[default]
    Empty,
    Loading,
    Loaded(Arc<SourceResult>),
}

/// One drill-down column as displayed.
#[derive(Debug, Clone, Default)]
pub struct LevelColumn {
    pub state: LevelView,
    pub selected: Option<String>,
}

/// Main view state, mirrored from hub notifications
pub struct CatalogView {
    pub sources: Vec<SourceId>,
    pub active: SourceId,
    pub columns: HashMap<SourceId, Vec<LevelColumn>>,
    pub tasks: BTreeMap<TaskId, DownloadTask>,
    pub status_message: String,
}

impl Default for CatalogView {
    fn default() -> Self {
        let sources = SourceId::all();
        let columns = sources
            .iter()
            .map(|s| (*s, vec![LevelColumn::default(); s.depth()]))
            .collect();

        Self {
            active: sources[0],
            sources,
            columns,
            tasks: BTreeMap::new(),
            status_message: "Starting download engine...".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CatalogMessage {
    SourceSelected(SourceId),
    RefreshPressed,
    EntryPressed { level: usize, index: usize },
    PausePressed(TaskId),
    ResumePressed(TaskId),
    CancelPressed(TaskId),
    DismissPressed(TaskId),
}

impl CatalogView {
    pub fn update(&mut self, message: &CatalogMessage) {
        match message {
            CatalogMessage::SourceSelected(source) => {
                self.active = *source;
            }
            CatalogMessage::EntryPressed { level, index } => {
                let key = self
                    .entry_key(self.active, *level, *index)
                    .map(str::to_string);
                if let Some(columns) = self.columns.get_mut(&self.active) {
                    if let Some(column) = columns.get_mut(*level) {
                        column.selected = key;
                    }
                    for column in columns.iter_mut().skip(level + 1) {
                        *column = LevelColumn::default();
                    }
                }
            }
            // Forwarded to the hub by the app
            _ => {}
        }
    }

    pub fn entry_key(&self, source: SourceId, level: usize, index: usize) -> Option<&str> {
        match &self.columns.get(&source)?.get(level)?.state {
            LevelView::Loaded(result) => result.entries().get(index).map(|e| e.key()),
            _ => None,
        }
    }

    /// Deepest column of the active source that has been requested.
    pub fn visible_level(&self) -> usize {
        self.columns
            .get(&self.active)
            .and_then(|columns| {
                columns
                    .iter()
                    .rposition(|c| !matches!(c.state, LevelView::Empty))
            })
            .unwrap_or(0)
    }

    pub fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::CatalogLoading { source, level } => {
                if let Some(column) = self.column_mut(*source, *level) {
                    column.state = LevelView::Loading;
                }
            }
            Notification::CatalogUpdated {
                source,
                level,
                result,
                cleared,
            } => {
                if let Some(columns) = self.columns.get_mut(source) {
                    if *cleared {
                        if let Some(column) = columns.get_mut(*level) {
                            column.selected = None;
                        }
                        for column in columns.iter_mut().skip(level + 1) {
                            *column = LevelColumn::default();
                        }
                    }
                    if let Some(column) = columns.get_mut(*level) {
                        column.state = LevelView::Loaded(Arc::clone(result));
                    }
                }
                if let Some(error) = result.error() {
                    self.status_message = format!("{}: {}", source, error);
                }
            }
            Notification::TaskAdded(task) => {
                self.status_message = format!("Queued {}", task.metadata.file_name);
                self.tasks.insert(task.id, task.clone());
            }
            Notification::TaskStateChanged { task, state } => {
                if let Some(t) = self.tasks.get_mut(task) {
                    t.state = *state;
                    if *state == TaskState::Completed {
                        self.status_message = format!("Saved {}", t.metadata.file_name);
                    }
                }
            }
            Notification::TaskProgress { task, progress } => {
                if let Some(t) = self.tasks.get_mut(task) {
                    t.progress = *progress;
                }
            }
            Notification::TaskRemoved(task) => {
                self.tasks.remove(task);
            }
            Notification::ConflictPrompt { file_name, .. } => {
                self.status_message = format!("{} already exists", file_name);
            }
            Notification::ConflictBlocked { file_name } => {
                self.status_message = AppError::ConflictBlocked(file_name.clone()).to_string();
            }
            Notification::Overwrote { file_name } => {
                self.status_message = format!("Replacing {}", file_name);
            }
            Notification::DownloadFailed { task, error } => {
                if let Some(t) = task.and_then(|id| self.tasks.get_mut(&id)) {
                    t.failure = Some(error.to_string());
                }
                self.status_message = format!("Download failed: {}", error);
            }
            Notification::CommandRejected { reason } => {
                self.status_message = reason.clone();
            }
        }
    }

    fn column_mut(&mut self, source: SourceId, level: usize) -> Option<&mut LevelColumn> {
        self.columns.get_mut(&source)?.get_mut(level)
    }

    pub fn view(&self) -> Element<'_, CatalogMessage> {
        let tabs = Row::with_children(self.sources.iter().map(|source| {
            let style = if *source == self.active {
                button::primary
            } else {
                button::secondary
            };
            button(text(source.to_string()).size(14))
                .style(style)
                .on_press(CatalogMessage::SourceSelected(*source))
                .into()
        }))
        .spacing(5);

        let levels = self.active.levels();
        let columns = Row::with_children(
            self.columns
                .get(&self.active)
                .into_iter()
                .flatten()
                .enumerate()
                .map(|(level, column)| level_column(levels.get(level).copied().unwrap_or(""), level, column)),
        )
        .spacing(10)
        .height(Length::Fill);

        column![
            text("Server Core Downloader").size(28),
            row![
                tabs,
                Space::new().width(Length::Fill),
                button("Refresh")
                    .on_press(CatalogMessage::RefreshPressed)
                    .padding([6, 16]),
            ],
            row![columns, downloads(&self.tasks)].spacing(20),
            text(&self.status_message).size(14),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

fn level_column<'a>(name: &'a str, level: usize, column: &'a LevelColumn) -> Element<'a, CatalogMessage> {
    let body: Element<'a, CatalogMessage> = match &column.state {
        LevelView::Empty => text("").into(),
        LevelView::Loading => text("Loading...").size(14).into(),
        LevelView::Loaded(result) => match result.as_ref() {
            SourceResult::Ok(entries) => scrollable(Column::with_children(entries.iter().enumerate().map(
                |(index, entry)| {
                    let caption = match entry.label() {
                        Some(label) => format!("{}  ({})", entry.title(), label),
                        None => entry.title().to_string(),
                    };
                    let style = if column.selected.as_deref() == Some(entry.key()) {
                        button::primary
                    } else {
                        button::text
                    };
                    button(text(caption).size(13))
                        .style(style)
                        .width(Length::Fill)
                        .on_press(CatalogMessage::EntryPressed { level, index })
                        .into()
                },
            )))
            .height(Length::Fill)
            .into(),
            SourceResult::Empty => text("Nothing here").size(14).into(),
            SourceResult::NetworkError(_) => text("Source unreachable, refresh to retry").size(14).into(),
            SourceResult::ParseError(_) => text("Unexpected data, refresh to retry").size(14).into(),
        },
    };

    column![text(name).size(16), body]
        .spacing(6)
        .width(Length::FillPortion(1))
        .into()
}

fn downloads(tasks: &BTreeMap<TaskId, DownloadTask>) -> Element<'_, CatalogMessage> {
    let rows = Column::with_children(tasks.values().map(|task| {
        let controls: Element<'_, CatalogMessage> = match task.state {
            TaskState::Queued => row![button("Cancel").on_press(CatalogMessage::CancelPressed(task.id))].into(),
            TaskState::Active => row![
                button("Pause").on_press(CatalogMessage::PausePressed(task.id)),
                button("Cancel").on_press(CatalogMessage::CancelPressed(task.id)),
            ]
            .spacing(5)
            .into(),
            TaskState::Paused => row![
                button("Resume").on_press(CatalogMessage::ResumePressed(task.id)),
                button("Cancel").on_press(CatalogMessage::CancelPressed(task.id)),
            ]
            .spacing(5)
            .into(),
            _ => row![button("Dismiss").on_press(CatalogMessage::DismissPressed(task.id))].into(),
        };

        let status = match &task.failure {
            Some(reason) => format!("{}: {}", task.state, reason),
            None => format!(
                "{} {:.1}%  {} KiB/s",
                task.state,
                task.progress.fraction() * 100.0,
                task.progress.speed / 1024
            ),
        };

        column![
            text(&task.display_name).size(14),
            progress_bar(0.0..=1.0, task.progress.fraction()),
            text(status).size(12),
            controls,
        ]
        .spacing(4)
        .into()
    }))
    .spacing(12);

    column![text("Downloads").size(16), scrollable(rows).height(Length::Fill)]
        .spacing(6)
        .width(Length::Fixed(320.0))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CatalogEntry;

    fn loaded(keys: &[&str]) -> Arc<SourceResult> {
        let entries = keys
            .iter()
            .map(|k| CatalogEntry::new(*k, format!("https://example.com/{}", k), *k, "").unwrap())
            .collect();
        Arc::new(SourceResult::Ok(entries))
    }

    #[test]
    fn test_cleared_update_resets_deeper_columns() {
        let mut view = CatalogView {
            active: SourceId::FastMirror,
            ..CatalogView::default()
        };
        for level in 0..3 {
            view.apply(&Notification::CatalogUpdated {
                source: SourceId::FastMirror,
                level,
                result: loaded(&["a", "b"]),
                cleared: false,
            });
        }
        view.update(&CatalogMessage::EntryPressed { level: 0, index: 1 });
        assert_eq!(view.columns[&SourceId::FastMirror][0].selected.as_deref(), Some("b"));
        assert!(matches!(view.columns[&SourceId::FastMirror][2].state, LevelView::Empty));

        view.apply(&Notification::CatalogLoading {
            source: SourceId::FastMirror,
            level: 1,
        });
        assert_eq!(view.visible_level(), 1);

        view.apply(&Notification::CatalogUpdated {
            source: SourceId::FastMirror,
            level: 0,
            result: loaded(&["c"]),
            cleared: true,
        });
        assert_eq!(view.columns[&SourceId::FastMirror][0].selected, None);
        assert_eq!(view.visible_level(), 0);
    }

    #[test]
    fn test_blocked_download_is_reported() {
        let mut view = CatalogView::default();
        view.apply(&Notification::ConflictBlocked {
            file_name: "paper.jar".to_string(),
        });
        assert_eq!(
            view.status_message,
            "A file named 'paper.jar' already exists, download stopped"
        );
    }
}
