//! vidgrab — download-job orchestration around an external extraction engine.
//!
//! Submit a media URL, inspect the resolved quality catalog, start a
//! background download and poll its progress until it completes or fails.
//! The actual fetching is delegated to an [`engine::ExtractionEngine`]
//! implementation (yt-dlp in production); this crate owns job lifecycle,
//! progress normalization and format resolution.

pub mod config;
pub mod engine;
pub mod errors;
pub mod formats;
pub mod jobs;
pub mod orchestrator;
pub mod progress;
pub mod utils;

pub use config::AppConfig;
pub use engine::{ExtractionEngine, RawFormatDescriptor, RawMediaInfo, RawProgressEvent};
pub use errors::{AppError, Result};
pub use formats::{AudioCandidate, FormatResolver, MediaInfo, VideoCandidate};
pub use jobs::{JobManager, JobRecord, JobStatus, SnapshotUpdate};
pub use orchestrator::{DownloadRequest, FormatType, Orchestrator, Platform};
pub use progress::ProgressReporter;
