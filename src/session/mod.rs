//! Session orchestration: lifecycle, transcript, processing progress and export.

mod export;
mod orchestrator;
mod progress;
mod transcript;

pub use export::{EXPORT_KIND, ExportBundle, ExportMeta, VECTOR_STORE_PLACEHOLDER};
pub use orchestrator::{
    CompletedQuery, PendingQuery, ProcessingRun, QueryStart, SessionError, SessionOrchestrator,
    SessionSnapshot, SessionState, drive_processing, drive_processing_observed,
};
pub use progress::{ProcessingProgress, RECENT_LOG_LINES};
pub use transcript::{Message, Role, Transcript};
