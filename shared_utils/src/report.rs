//! Report Module
//!
//! End-of-batch summary, emitted through the logging channel so it lands in
//! the log file as well as on the console.

use crate::batch::BatchResult;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Percentage saved; negative when the outputs grew.
pub fn size_reduction(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

pub fn log_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    info!("📊 {} Summary", operation_name);
    info!("   📁 Files processed: {}", result.total);
    info!("   ✅ Succeeded:       {}", result.succeeded);
    info!("   ❌ Failed:          {}", result.failed);
    info!("   📈 Success rate:    {:.1}%", result.success_rate());
    if result.succeeded > 0 {
        info!(
            "   💾 Size: {} → {} ({:.1}% reduction)",
            format_bytes(result.input_bytes),
            format_bytes(result.output_bytes),
            size_reduction(result.input_bytes, result.output_bytes)
        );
    }
    info!("   ⏱️  Total time:      {}", format_duration(duration));
    if result.total > 0 {
        info!(
            "   ⏱️  Avg time/file:   {:.2}s",
            duration.as_secs_f64() / result.total as f64
        );
    }

    if !result.errors.is_empty() {
        warn!("{} file(s) failed:", result.errors.len());
        for (path, message) in &result.errors {
            error!("   {} → {}", path.display(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536 * 1024), "1.50 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
    }

    #[test]
    fn test_size_reduction_formula() {
        assert!((size_reduction(1000, 500) - 50.0).abs() < 0.01);
        assert!((size_reduction(1000, 250) - 75.0).abs() < 0.01);
        assert!((size_reduction(500, 1000) - (-100.0)).abs() < 0.01);
        assert_eq!(size_reduction(0, 100), 0.0);
    }

    #[test]
    fn test_log_summary_report_no_panic() {
        let mut result = BatchResult::new();
        result.success(1000, 400);
        result.fail(PathBuf::from("bad.mkv"), "Encoder exited with 1".to_string());
        log_summary_report(&result, Duration::from_secs(10), "Test");
        log_summary_report(&BatchResult::new(), Duration::ZERO, "Empty");
    }
}
