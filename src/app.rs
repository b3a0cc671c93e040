use std::sync::Arc;

use futures::Stream;
use iced::{Subscription, Task};
use rfd::{AsyncMessageDialog, MessageButtons, MessageDialogResult, MessageLevel};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{self, CatalogClient};
use crate::application::{ConflictTicket, DownloadHub, HubHandle, Notification};
use crate::config::AppConfig;
use crate::domain::EntryRef;
use crate::engine::Aria2Engine;
use crate::ui::{CatalogMessage, CatalogView};

#[derive(Default)]
pub struct DownloaderApp {
    view: CatalogView,
    hub: Option<HubHandle>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Ui(CatalogMessage),
    HubReady(HubHandle),
    HubFailed(String),
    Hub(Notification),
    /// (Ticket, overwrite?)
    ConflictAnswered(ConflictTicket, bool),
}

enum HubStream {
    Starting,
    Running(mpsc::UnboundedReceiver<Notification>),
    Stopped,
}

/// Build the hub from the environment and start it.
fn start_hub() -> Result<(HubHandle, mpsc::UnboundedReceiver<Notification>), String> {
    let config = AppConfig::from_env();
    if let Err(e) = std::fs::create_dir_all(&config.download_dir) {
        warn!(dir = %config.download_dir.display(), error = %e, "could not create download directory");
    }

    let client = CatalogClient::new(config.fetch_timeout).map_err(|e| e.to_string())?;
    let engine = Aria2Engine::new(config.aria2.clone()).map_err(|e| e.to_string())?;
    let sources = api::default_sources(&client, &config.api);

    info!(dir = %config.download_dir.display(), "starting download hub");
    Ok(DownloadHub::spawn(sources, Arc::new(engine), &config))
}

/// First yields the hub handle, then every hub notification.
fn hub_events() -> impl Stream<Item = Message> {
    futures::stream::unfold(HubStream::Starting, |state| async move {
        match state {
            HubStream::Starting => match start_hub() {
                Ok((handle, notifications)) => {
                    Some((Message::HubReady(handle), HubStream::Running(notifications)))
                }
                Err(e) => Some((Message::HubFailed(e), HubStream::Stopped)),
            },
            HubStream::Running(mut notifications) => notifications
                .recv()
                .await
                .map(|n| (Message::Hub(n), HubStream::Running(notifications))),
            HubStream::Stopped => None,
        }
    })
}

pub fn subscription(_app: &DownloaderApp) -> Subscription<Message> {
    Subscription::run(hub_events)
}

pub fn update(app: &mut DownloaderApp, message: Message) -> Task<Message> {
    match message {
        Message::HubReady(hub) => {
            for source in &app.view.sources {
                hub.refresh(*source, 0);
            }
            app.view.status_message = "Loading catalogs...".to_string();
            app.hub = Some(hub);
        }
        Message::HubFailed(e) => {
            error!(error = %e, "download hub failed to start");
            app.view.status_message = format!("Failed to start: {}", e);
        }
        Message::Hub(notification) => {
            app.view.apply(&notification);

            if let Notification::ConflictPrompt { ticket, file_name } = notification {
                // Ask the user whether to replace the existing file
                return Task::perform(
                    async move {
                        AsyncMessageDialog::new()
                            .set_level(MessageLevel::Warning)
                            .set_title("File already exists")
                            .set_description(format!(
                                "{} already exists in the download folder. Replace it?",
                                file_name
                            ))
                            .set_buttons(MessageButtons::YesNo)
                            .show()
                            .await
                            == MessageDialogResult::Yes
                    },
                    move |overwrite| Message::ConflictAnswered(ticket, overwrite),
                );
            }
        }
        Message::ConflictAnswered(ticket, overwrite) => {
            if let Some(hub) = &app.hub {
                hub.resolve_conflict(ticket, overwrite);
            }
        }
        Message::Ui(ui_msg) => {
            app.view.update(&ui_msg);

            let Some(hub) = &app.hub else {
                return Task::none();
            };
            let source = app.view.active;
            match ui_msg {
                CatalogMessage::RefreshPressed => hub.refresh(source, app.view.visible_level()),
                CatalogMessage::EntryPressed { level, index } => {
                    if level == source.leaf_level() {
                        hub.download(EntryRef {
                            source,
                            level,
                            index,
                        });
                    } else if let Some(key) = app.view.entry_key(source, level, index) {
                        hub.select(source, level, key);
                    }
                }
                CatalogMessage::PausePressed(task) => hub.pause(task),
                CatalogMessage::ResumePressed(task) => hub.resume(task),
                CatalogMessage::CancelPressed(task) => hub.cancel(task),
                CatalogMessage::DismissPressed(task) => hub.acknowledge(task),
                CatalogMessage::SourceSelected(_) => {}
            }
        }
    }
    Task::none()
}

pub fn view(app: &DownloaderApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::Ui)
}
