use crate::engine::{AudioExtraction, DownloadOptions, ExtractionEngine, RawMediaInfo};
use crate::errors::{AppError, Result};
use crate::formats::{FormatResolver, MediaInfo, VideoCandidate};
use crate::jobs::{JobManager, JobRecord, JobStatus, SnapshotUpdate};
use crate::progress::ProgressReporter;
use crate::utils::{ensure_dir_exists, format_duration, format_views};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock, Semaphore};
use url::Url;

/// Audio codec fallback chain used for every merged or extracted download
const PREFERRED_AUDIO: &str = "bestaudio[ext=m4a]/bestaudio[ext=aac]/bestaudio";

/// Selector for sources that only ever serve muxed streams
const MUXED_BEST: &str = "best[ext=mp4]/best";

const INSTAGRAM_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Extracted-audio target: mp3 at a fixed bitrate regardless of the source
const AUDIO_CODEC: &str = "mp3";
const AUDIO_BITRATE_KBPS: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    Video,
    Audio,
}

/// One accepted download request, validated before any background work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub platform: Platform,
    pub quality: String,
    pub format_type: FormatType,
    /// Defaults to "./downloads" when absent
    pub output_dir: Option<PathBuf>,
}

/// Format catalog remembered from the most recent metadata fetch, consulted
/// for direct format-id selection when a download request names the same URL
struct FormatCatalog {
    url: String,
    video_formats: Vec<VideoCandidate>,
}

/// Top-level download service: metadata fetches, job creation, background
/// download units, progress polling.
pub struct Orchestrator {
    engine: Arc<dyn ExtractionEngine>,
    jobs: Arc<JobManager>,
    download_slots: Arc<Semaphore>,
    catalog: RwLock<Option<FormatCatalog>>,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        jobs: Arc<JobManager>,
        max_concurrent_downloads: usize,
    ) -> Self {
        Self {
            engine,
            jobs,
            download_slots: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
            catalog: RwLock::new(None),
        }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// Fetches display-ready metadata and the quality catalog for a URL.
    ///
    /// Validation failures surface before the engine is contacted; engine
    /// failures surface as extraction errors. The resolved video catalog is
    /// cached so a later download request for the same URL can select a
    /// muxed format id directly.
    pub async fn fetch_info(&self, url: &str, platform: Platform) -> Result<MediaInfo> {
        let url = url.trim();
        validate_platform_url(url, platform)?;

        let raw = self.engine.fetch_metadata(url).await.map_err(|e| match e {
            AppError::Extraction(_) => e,
            other => AppError::Extraction(other.to_string()),
        })?;

        let media = build_media_info(url, platform, raw);

        {
            let mut catalog = self.catalog.write().await;
            *catalog = Some(FormatCatalog {
                url: url.to_string(),
                video_formats: media.video_formats.clone(),
            });
        }

        info!(
            "Fetched info for {}: {} video / {} audio formats",
            url,
            media.video_formats.len(),
            media.audio_formats.len()
        );
        Ok(media)
    }

    /// Accepts a download request, resolves the quality selector and launches
    /// one background unit. Returns the job id immediately; progress is
    /// observed through `get_progress`.
    pub async fn start_download(&self, request: DownloadRequest) -> Result<String> {
        if request.url.trim().is_empty() {
            return Err(AppError::Validation("URL is required".to_string()));
        }
        if request.quality.trim().is_empty() {
            return Err(AppError::Validation("Quality is required".to_string()));
        }

        let output_dir = request
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("./downloads"));
        ensure_dir_exists(&output_dir).await?;

        let options = self.resolve_options(&request, &output_dir).await?;

        let job_id = self.jobs.create_job().await;
        self.jobs
            .apply_snapshot(
                &job_id,
                SnapshotUpdate::status_only(JobStatus::Starting, "Starting..."),
            )
            .await;

        let engine = Arc::clone(&self.engine);
        let jobs = Arc::clone(&self.jobs);
        let slots = Arc::clone(&self.download_slots);
        let url = request.url.trim().to_string();
        let id = job_id.clone();

        tokio::spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Download slot pool closed before job {} could run", id);
                    jobs.apply_snapshot(
                        &id,
                        SnapshotUpdate::failed("Download pool shut down".to_string()),
                    )
                    .await;
                    return;
                }
            };

            info!(
                "Job {} starting download of {} via {}",
                id,
                url,
                engine.name()
            );

            // The engine owns the sender; the consumer below is this job's
            // sole progress writer and finishes once the engine hangs up.
            let (tx, mut rx) = mpsc::unbounded_channel();
            let consumer_jobs = Arc::clone(&jobs);
            let consumer_id = id.clone();
            let consumer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Some(update) = ProgressReporter::normalize(&event) {
                        consumer_jobs.apply_snapshot(&consumer_id, update).await;
                    }
                }
            });

            let result = engine.run_download(&url, &options, tx).await;

            // Drain remaining events before the terminal update so percent
            // stays monotonic for pollers
            if consumer.await.is_err() {
                warn!("Progress consumer for job {} panicked", id);
            }

            match result {
                Ok(()) => {
                    info!("Job {} completed", id);
                    jobs.apply_snapshot(&id, SnapshotUpdate::completed()).await;
                }
                Err(e) => {
                    error!("Job {} failed: {}", id, e);
                    jobs.apply_snapshot(&id, SnapshotUpdate::failed(e.to_string()))
                        .await;
                }
            }
        });

        Ok(job_id)
    }

    /// Non-blocking poll; unknown ids get the sentinel record, not an error
    pub async fn get_progress(&self, job_id: &str) -> JobRecord {
        self.jobs.get_snapshot(job_id).await
    }

    async fn resolve_options(
        &self,
        request: &DownloadRequest,
        output_dir: &Path,
    ) -> Result<DownloadOptions> {
        if request.platform == Platform::Instagram {
            return Ok(DownloadOptions {
                format: MUXED_BEST.to_string(),
                output_template: output_dir.join("%(uploader)s_%(title)s.%(ext)s"),
                merge_output_format: None,
                audio_extraction: None,
                user_agent: Some(INSTAGRAM_USER_AGENT.to_string()),
            });
        }

        let output_template = output_dir.join("%(title)s.%(ext)s");

        match request.format_type {
            FormatType::Video => {
                let height = parse_height(&request.quality)?;
                let cached = self.cached_muxed_format(&request.url, height).await;

                let format = match cached {
                    Some(format_id) => {
                        info!(
                            "Using muxed format {} for {}p request",
                            format_id, height
                        );
                        format_id
                    }
                    None => fallback_video_selector(height),
                };

                Ok(DownloadOptions {
                    format,
                    output_template,
                    merge_output_format: Some("mp4".to_string()),
                    audio_extraction: None,
                    user_agent: None,
                })
            }
            FormatType::Audio => Ok(DownloadOptions {
                format: PREFERRED_AUDIO.to_string(),
                output_template,
                merge_output_format: None,
                audio_extraction: Some(AudioExtraction {
                    codec: AUDIO_CODEC.to_string(),
                    bitrate: AUDIO_BITRATE_KBPS,
                }),
                user_agent: None,
            }),
        }
    }

    /// Looks up a muxed (audio-carrying) cached candidate at exactly the
    /// requested height. Only consulted when the catalog was fetched for the
    /// same source URL.
    async fn cached_muxed_format(&self, url: &str, height: u32) -> Option<String> {
        let catalog = self.catalog.read().await;
        let catalog = catalog.as_ref()?;
        if catalog.url != url.trim() {
            return None;
        }
        catalog
            .video_formats
            .iter()
            .find(|f| f.height == height && f.has_audio)
            .map(|f| f.format_id.clone())
    }
}

/// Best video at or below the requested height, merged with the best audio
/// track along the m4a -> aac -> any preference chain
fn fallback_video_selector(height: u32) -> String {
    format!("best[height<={}]+{}/best", height, PREFERRED_AUDIO)
}

/// Parses the requested height out of a quality label like "720p" or
/// "720p (video only)"
fn parse_height(quality: &str) -> Result<u32> {
    quality
        .split('p')
        .next()
        .and_then(|h| h.trim().parse::<u32>().ok())
        .ok_or_else(|| {
            AppError::Validation(format!("Could not parse quality label: {}", quality))
        })
}

fn validate_platform_url(url: &str, platform: Platform) -> Result<()> {
    if url.is_empty() {
        return Err(AppError::Validation("URL is required".to_string()));
    }

    let parsed =
        Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::Validation("URL must have a host".to_string()))?;

    let markers: &[&str] = match platform {
        Platform::Youtube => &["youtube.com", "youtu.be"],
        Platform::Instagram => &["instagram.com"],
    };

    let matches = markers
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)));

    if !matches {
        let name = match platform {
            Platform::Youtube => "YouTube",
            Platform::Instagram => "Instagram",
        };
        return Err(AppError::Validation(format!("Invalid {} URL", name)));
    }
    Ok(())
}

fn build_media_info(url: &str, platform: Platform, raw: RawMediaInfo) -> MediaInfo {
    let (video_formats, audio_formats) = FormatResolver::resolve(&raw.formats);

    let default_title = match platform {
        Platform::Youtube => "Unknown Title",
        Platform::Instagram => "Instagram Reel",
    };

    MediaInfo {
        title: raw.title.unwrap_or_else(|| default_title.to_string()),
        duration: format_duration(raw.duration.unwrap_or(0.0) as u64),
        views: format_views(raw.view_count.unwrap_or(0)),
        thumbnail: raw.thumbnail,
        uploader: raw.uploader,
        video_formats,
        audio_formats,
        url: url.to_string(),
    }
}
