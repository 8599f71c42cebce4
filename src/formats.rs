use crate::engine::RawFormatDescriptor;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One selectable video quality derived from the raw engine catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub height: u32,
    /// Opaque token the engine needs to select this exact stream
    pub format_id: String,
    pub ext: String,
    pub filesize: Option<u64>,
    /// Display label, e.g. "720p"
    pub quality: String,
    pub has_audio: bool,
}

/// One selectable audio track derived from the raw engine catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioCandidate {
    /// Average bitrate in kbps
    pub abr: f64,
    pub format_id: String,
    pub ext: String,
    pub filesize: Option<u64>,
    /// Display label, e.g. "128kbps"
    pub quality: String,
}

/// Display-ready metadata and format catalog for one source URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub duration: String,
    pub views: String,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
    pub video_formats: Vec<VideoCandidate>,
    pub audio_formats: Vec<AudioCandidate>,
    pub url: String,
}

const VIDEO_ONLY_EXTS: [&str; 2] = ["mp4", "webm"];
const AUDIO_EXTS: [&str; 3] = ["m4a", "mp3", "aac"];
const MIN_VIDEO_HEIGHT: u32 = 240;

/// Pure classification of the engine's noisy, duplicate-laden format list
/// into deduplicated, sorted video and audio candidates. No I/O;
/// deterministic for a fixed input sequence.
pub struct FormatResolver;

impl FormatResolver {
    pub fn resolve(
        raw_formats: &[RawFormatDescriptor],
    ) -> (Vec<VideoCandidate>, Vec<AudioCandidate>) {
        let mut video_formats = Vec::new();
        let mut audio_formats = Vec::new();

        for fmt in raw_formats {
            // Muxed mp4: video with its own audio track
            if fmt.has_video_codec() && fmt.has_audio_codec() && fmt.ext() == "mp4" {
                if let Some(height) = fmt.height {
                    video_formats.push(VideoCandidate {
                        height,
                        format_id: fmt.format_id.clone(),
                        ext: fmt.ext().to_string(),
                        filesize: fmt.filesize,
                        quality: format!("{}p", height),
                        has_audio: true,
                    });
                }
            // Video-only stream, needs merging with a separate audio track
            } else if fmt.has_video_codec()
                && !fmt.has_audio_codec()
                && VIDEO_ONLY_EXTS.contains(&fmt.ext())
            {
                if let Some(height) = fmt.height {
                    if height >= MIN_VIDEO_HEIGHT {
                        video_formats.push(VideoCandidate {
                            height,
                            format_id: fmt.format_id.clone(),
                            ext: fmt.ext().to_string(),
                            filesize: fmt.filesize,
                            quality: format!("{}p", height),
                            has_audio: false,
                        });
                    }
                }
            // Audio-only track
            } else if fmt.has_audio_codec() && !fmt.has_video_codec() {
                if let Some(abr) = fmt.abr.filter(|abr| *abr > 0.0) {
                    if AUDIO_EXTS.contains(&fmt.ext()) {
                        audio_formats.push(AudioCandidate {
                            abr,
                            format_id: fmt.format_id.clone(),
                            ext: fmt.ext().to_string(),
                            filesize: fmt.filesize,
                            quality: format!("{}kbps", abr as u64),
                        });
                    }
                }
            }
        }

        let mut video_formats = Self::dedup_by_height(video_formats);
        video_formats.sort_by(|a, b| b.height.cmp(&a.height));
        audio_formats.sort_by(|a, b| b.abr.partial_cmp(&a.abr).unwrap_or(Ordering::Equal));

        (video_formats, audio_formats)
    }

    /// Collapses same-height entries: an entry with its own audio wins over a
    /// video-only one; otherwise the first one encountered stays (insertion
    /// order is preserved).
    fn dedup_by_height(formats: Vec<VideoCandidate>) -> Vec<VideoCandidate> {
        let mut deduped: Vec<VideoCandidate> = Vec::with_capacity(formats.len());
        for fmt in formats {
            match deduped.iter_mut().find(|f| f.height == fmt.height) {
                Some(existing) => {
                    if fmt.has_audio && !existing.has_audio {
                        *existing = fmt;
                    }
                }
                None => deduped.push(fmt),
            }
        }
        deduped
    }
}
