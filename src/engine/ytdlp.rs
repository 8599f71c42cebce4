use super::{DownloadOptions, ExtractionEngine, RawMediaInfo, RawProgressEvent};
use crate::errors::{AppError, Result};
use log::{debug, error, info};
use regex::Regex;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Production extraction engine backed by the yt-dlp executable.
pub struct YtDlpEngine {
    ytdlp_path: String,
    proxy: Option<String>,
}

impl YtDlpEngine {
    pub fn new() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            proxy: None,
        }
    }

    pub fn with_ytdlp_path(mut self, path: String) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.arg("--no-warnings");
        if let Some(proxy) = &self.proxy {
            cmd.args(["--proxy", proxy.as_str()]);
        }
        cmd
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExtractionEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch_metadata(&self, url: &str) -> Result<RawMediaInfo> {
        info!("Extracting metadata for {}", url);

        let output = self
            .base_command()
            .args(["--dump-json", "--no-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::EngineSpawn(format!("Failed to start yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("yt-dlp metadata extraction failed: {}", stderr.trim());
            return Err(AppError::Extraction(stderr.trim().to_string()));
        }

        let info: RawMediaInfo = serde_json::from_slice(&output.stdout)?;
        debug!(
            "Extracted {} formats for {:?}",
            info.formats.len(),
            info.title
        );
        Ok(info)
    }

    async fn run_download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: mpsc::UnboundedSender<RawProgressEvent>,
    ) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.args(["--newline", "-f", options.format.as_str()])
            .arg("-o")
            .arg(&options.output_template);

        if let Some(container) = &options.merge_output_format {
            cmd.args(["--merge-output-format", container.as_str()]);
        }
        if let Some(audio) = &options.audio_extraction {
            let bitrate = audio.bitrate.to_string();
            cmd.args([
                "-x",
                "--audio-format",
                audio.codec.as_str(),
                "--audio-quality",
                bitrate.as_str(),
            ]);
        }
        if let Some(agent) = &options.user_agent {
            cmd.args(["--user-agent", agent.as_str()]);
        }
        cmd.arg(url).stdout(Stdio::piped()).stderr(Stdio::piped());

        info!("Starting yt-dlp download: {} (format {})", url, options.format);

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::EngineSpawn(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::EngineSpawn("yt-dlp stdout was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::EngineSpawn("yt-dlp stderr was not captured".to_string()))?;

        // Drain stderr alongside stdout; a chatty child would otherwise fill
        // the pipe buffer and stall mid-download
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        // yt-dlp progress lines look like:
        //   [download]  42.7% of 10.00MiB at 1.25MiB/s ETA 00:12
        let progress_re = Regex::new(
            r"\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+~?\S+)?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
        )
        .map_err(|e| AppError::EngineSpawn(format!("Invalid progress pattern: {}", e)))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut saw_finish = false;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = parse_progress_line(&progress_re, &line) {
                        if event.status == "finished" {
                            saw_finish = true;
                        }
                        // The receiver may be gone if the consumer task
                        // stopped early; the download itself still runs to
                        // completion.
                        if progress.send(event).is_err() {
                            debug!("Progress receiver dropped, continuing download");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    // Don't leave a zombie behind when the pipe breaks
                    error!("Lost yt-dlp output stream: {}", e);
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(AppError::Io(e));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::EngineSpawn(format!("Failed to wait for yt-dlp: {}", e)))?;

        let stderr_buf = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = last_error_line(&stderr_buf)
                .unwrap_or_else(|| format!("yt-dlp exited with status {}", status));
            error!("yt-dlp download failed: {}", message);
            return Err(AppError::Download(message));
        }

        if !saw_finish {
            // Short downloads can complete without a parseable 100% line
            let _ = progress.send(RawProgressEvent::finished());
        }

        info!("yt-dlp download finished: {}", url);
        Ok(())
    }
}

/// Maps one yt-dlp output line to a progress event, if it carries one.
fn parse_progress_line(progress_re: &Regex, line: &str) -> Option<RawProgressEvent> {
    // Postprocessing stages mean all media bytes are on disk
    if line.starts_with("[Merger]") || line.starts_with("[ExtractAudio]") {
        return Some(RawProgressEvent::finished());
    }

    let caps = progress_re.captures(line)?;
    let percent: f32 = caps.name("percent")?.as_str().parse().ok()?;

    if (percent - 100.0).abs() < f32::EPSILON && caps.name("eta").is_none() {
        // Final "[download] 100% of 10.00MiB in 00:08" summary line
        return Some(RawProgressEvent::finished());
    }

    let mut event = RawProgressEvent::downloading();
    event.percent = Some(percent);
    event.speed_str = caps
        .name("speed")
        .map(|m| m.as_str().to_string())
        .filter(|s| s != "Unknown");
    event.eta_str = caps
        .name("eta")
        .map(|m| m.as_str().to_string())
        .filter(|s| s != "Unknown");
    Some(event)
}

/// Picks the most relevant line out of yt-dlp's stderr for the job record
fn last_error_line(stderr: &str) -> Option<String> {
    let last = stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))?;
    Some(last.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_regex() -> Regex {
        Regex::new(
            r"\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+~?\S+)?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
        )
        .unwrap()
    }

    #[test]
    fn parses_regular_progress_line() {
        let re = progress_regex();
        let event =
            parse_progress_line(&re, "[download]  42.7% of 10.00MiB at 1.25MiB/s ETA 00:12")
                .unwrap();
        assert_eq!(event.status, "downloading");
        assert_eq!(event.percent, Some(42.7));
        assert_eq!(event.speed_str.as_deref(), Some("1.25MiB/s"));
        assert_eq!(event.eta_str.as_deref(), Some("00:12"));
    }

    #[test]
    fn parses_estimate_line_without_speed() {
        let re = progress_regex();
        let event = parse_progress_line(&re, "[download]   5.0% of ~120.50MiB").unwrap();
        assert_eq!(event.status, "downloading");
        assert_eq!(event.percent, Some(5.0));
        assert!(event.speed_str.is_none());
        assert!(event.eta_str.is_none());
    }

    #[test]
    fn summary_line_maps_to_finished() {
        let re = progress_regex();
        let event = parse_progress_line(&re, "[download] 100% of 10.00MiB in 00:08").unwrap();
        assert_eq!(event.status, "finished");
    }

    #[test]
    fn postprocessor_lines_map_to_finished() {
        let re = progress_regex();
        let event = parse_progress_line(
            &re,
            "[Merger] Merging formats into \"downloads/clip.mp4\"",
        )
        .unwrap();
        assert_eq!(event.status, "finished");

        let event = parse_progress_line(
            &re,
            "[ExtractAudio] Destination: downloads/clip.mp3",
        )
        .unwrap();
        assert_eq!(event.status, "finished");
    }

    #[test]
    fn non_progress_lines_are_ignored() {
        let re = progress_regex();
        assert!(parse_progress_line(&re, "[youtube] abc123: Downloading webpage").is_none());
        assert!(parse_progress_line(&re, "").is_none());
    }

    #[test]
    fn unknown_speed_and_eta_are_dropped() {
        let re = progress_regex();
        let event = parse_progress_line(
            &re,
            "[download]  10.0% of 5.00MiB at Unknown ETA Unknown",
        )
        .unwrap();
        assert!(event.speed_str.is_none());
        assert!(event.eta_str.is_none());
    }

    #[test]
    fn stderr_error_line_is_extracted() {
        let stderr = "WARNING: something minor\nERROR: Video unavailable\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("ERROR: Video unavailable")
        );

        let stderr = "some noise\nfatal: it broke\n";
        assert_eq!(last_error_line(stderr).as_deref(), Some("fatal: it broke"));
        assert!(last_error_line("").is_none());
    }
}
