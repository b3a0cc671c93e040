pub mod conflict;
pub mod fetch_coordinator;
pub mod hub;
pub mod selection;
pub mod task_controller;

pub use conflict::ConflictPolicy;
pub use hub::{ConflictTicket, DownloadHub, HubHandle, Notification};
