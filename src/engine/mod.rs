pub mod ytdlp;

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One format entry as reported by the extraction engine, before any
/// classification runs. The engine reports absent codecs as the literal
/// string "none", which the accessors below fold into `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFormatDescriptor {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub abr: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl RawFormatDescriptor {
    pub fn has_video_codec(&self) -> bool {
        self.vcodec
            .as_deref()
            .map_or(false, |v| v != "none" && !v.is_empty())
    }

    pub fn has_audio_codec(&self) -> bool {
        self.acodec
            .as_deref()
            .map_or(false, |a| a != "none" && !a.is_empty())
    }

    pub fn ext(&self) -> &str {
        self.ext.as_deref().unwrap_or("")
    }
}

/// Top-level metadata for one source URL, as reported by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormatDescriptor>,
}

/// One progress callback payload from the engine during an active download.
///
/// Field names mirror the engine's progress dictionary: display strings come
/// pre-rendered when the engine supplies them, numeric fields otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProgressEvent {
    pub status: String,
    #[serde(default)]
    pub percent: Option<f32>,
    #[serde(default)]
    pub downloaded_bytes: Option<u64>,
    #[serde(default)]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<u64>,
    /// Transfer rate in bytes per second
    #[serde(default)]
    pub speed: Option<f64>,
    /// Seconds remaining
    #[serde(default)]
    pub eta: Option<u64>,
    #[serde(default, rename = "_percent_str")]
    pub percent_str: Option<String>,
    #[serde(default, rename = "_speed_str")]
    pub speed_str: Option<String>,
    #[serde(default, rename = "_eta_str")]
    pub eta_str: Option<String>,
}

impl RawProgressEvent {
    pub fn downloading() -> Self {
        Self {
            status: "downloading".to_string(),
            ..Default::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            status: "finished".to_string(),
            ..Default::default()
        }
    }
}

/// Audio post-processing instruction for the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioExtraction {
    pub codec: String,
    /// Target bitrate in kbps, applied regardless of the source bitrate
    pub bitrate: u32,
}

/// Everything the engine needs to run one download
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Engine-consumable format selector (a direct format id or a fallback
    /// selector expression)
    pub format: String,
    /// Output template, e.g. `downloads/%(title)s.%(ext)s`
    pub output_template: PathBuf,
    /// Container to merge separate video/audio streams into
    pub merge_output_format: Option<String>,
    pub audio_extraction: Option<AudioExtraction>,
    pub user_agent: Option<String>,
}

/// The external extraction/download engine, specified only at this boundary.
///
/// `run_download` reports progress through the supplied channel; the caller
/// owns the receiving side and knows which job the events belong to, so no
/// job context is captured here.
#[async_trait::async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    async fn fetch_metadata(&self, url: &str) -> Result<RawMediaInfo>;

    async fn run_download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: mpsc::UnboundedSender<RawProgressEvent>,
    ) -> Result<()>;
}
