pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    CatalogEntry, DownloadTask, EngineTaskId, EntryError, EntryRef, FailureKind, McslCategory,
    SourceId, SourceResult, TaskId, TaskMetadata, TaskState, TransferProgress,
};
