use crate::errors::Result;
use log::info;

/// Generates a unique ID for download jobs
pub fn generate_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Formats a duration in seconds as "mm:ss" or "hh:mm:ss".
/// Zero or missing durations render as "Unknown".
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "Unknown".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Formats a view count with K/M suffixes for display
pub fn format_views(views: u64) -> String {
    if views == 0 {
        return "Unknown".to_string();
    }

    if views >= 1_000_000 {
        format!("{:.1}M", views as f64 / 1_000_000.0)
    } else if views >= 1_000 {
        format!("{:.1}K", views as f64 / 1_000.0)
    } else {
        views.to_string()
    }
}

/// Formats a transfer rate in bytes per second as a human-readable string
/// (binary-prefix units, 1024 scaling, two decimals). Empty for zero/absent.
pub fn human_readable_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 || !bytes_per_sec.is_finite() {
        return String::new();
    }

    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut rate = bytes_per_sec;
    let mut unit = 0;
    while rate >= 1024.0 && unit < UNITS.len() - 1 {
        rate /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", rate, UNITS[unit])
}
