use crate::engine::RawProgressEvent;
use crate::jobs::{JobStatus, SnapshotUpdate};
use crate::utils::human_readable_rate;

/// Normalizes raw engine progress events into canonical job snapshots.
///
/// Stateless: the caller applies the returned update to the registry with
/// the job id passed explicitly alongside it.
pub struct ProgressReporter;

impl ProgressReporter {
    /// Returns `None` for statuses outside the tracked set; the engine may
    /// emit informational statuses that pollers never need to see.
    pub fn normalize(event: &RawProgressEvent) -> Option<SnapshotUpdate> {
        match event.status.as_str() {
            "downloading" => Some(SnapshotUpdate {
                status: JobStatus::Downloading,
                percent: Self::percent_of(event),
                speed: Self::speed_of(event),
                eta: Self::eta_of(event),
                error: None,
            }),
            "finished" => Some(SnapshotUpdate {
                status: JobStatus::Finalizing,
                percent: 100.0,
                speed: String::new(),
                eta: "Finalizing...".to_string(),
                error: None,
            }),
            _ => None,
        }
    }

    fn percent_of(event: &RawProgressEvent) -> f32 {
        // The engine's pre-rendered string (" 42.7%") is the authoritative
        // source when present; the numeric field backs it up
        if let Some(percent) = event
            .percent_str
            .as_deref()
            .and_then(|s| s.trim().trim_end_matches('%').trim().parse::<f32>().ok())
        {
            return percent;
        }
        if let Some(percent) = event.percent {
            return percent;
        }

        let total = event
            .total_bytes
            .or(event.total_bytes_estimate)
            .unwrap_or(0);
        if total == 0 {
            return 0.0;
        }
        let downloaded = event.downloaded_bytes.unwrap_or(0);
        (downloaded as f64 / total as f64 * 100.0) as f32
    }

    fn speed_of(event: &RawProgressEvent) -> String {
        if let Some(speed) = &event.speed_str {
            return speed.clone();
        }
        event.speed.map(human_readable_rate).unwrap_or_default()
    }

    fn eta_of(event: &RawProgressEvent) -> String {
        if let Some(eta) = &event.eta_str {
            return eta.clone();
        }
        match event.eta {
            Some(seconds) => seconds.to_string(),
            None => "NA".to_string(),
        }
    }
}
