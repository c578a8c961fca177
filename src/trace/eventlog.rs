//! GL-015: Append-only JSONL run trace.

use crate::core::types::{RunEvent, TimestampedEvent};
use std::io::Write;
use std::path::Path;

/// Generate an ISO 8601 timestamp.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_iso8601(dur.as_secs())
}

/// Render seconds since the Unix epoch as a UTC timestamp.
fn format_iso8601(secs: u64) -> String {
    let days = secs / 86400;
    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    let mut year = 1970i64;
    let mut remaining = days as i64;
    loop {
        let year_days = if is_leap(year) { 366 } else { 365 };
        if remaining < year_days {
            break;
        }
        remaining -= year_days;
        year += 1;
    }

    let february = if is_leap(year) { 29 } else { 28 };
    let month_days = [31, february, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut month = 12;
    for (i, &len) in month_days.iter().enumerate() {
        if remaining < len {
            month = i + 1;
            break;
        }
        remaining -= len;
    }

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        remaining + 1,
        hours,
        minutes,
        seconds
    )
}

fn is_leap(y: i64) -> bool {
    (y % 4 == 0 && y % 100 != 0) || y % 400 == 0
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Append an event to the trace file, creating it (and its directory) on first use.
pub fn append_event(path: &Path, event: RunEvent) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create trace dir {}: {}", parent.display(), e))?;
    }

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open trace {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read a trace back, skipping lines that do not parse.
pub fn read_events(path: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read trace {}: {}", path.display(), e))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HaltReason;

    #[test]
    fn test_gl015_now_iso8601() {
        let ts = now_iso8601();
        assert!(ts.starts_with("20"));
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('T'));
    }

    #[test]
    fn test_gl015_format_known_instants() {
        assert_eq!(format_iso8601(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_iso8601(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(format_iso8601(1_704_067_199), "2023-12-31T23:59:59Z");
    }

    #[test]
    fn test_gl015_generate_run_id() {
        let id = generate_run_id();
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_gl015_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces/run.jsonl");
        for steps in 0..3 {
            let event = RunEvent::RunCompleted {
                run_id: "r-abc".to_string(),
                halt: HaltReason::Completed,
                steps_executed: steps,
                jumps: 0,
                total_seconds: 0.5,
            };
            append_event(&path, event).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("\"event\":\"run_completed\""));

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2].event,
            RunEvent::RunCompleted { steps_executed: 2, .. }
        ));
    }

    #[test]
    fn test_gl015_read_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(read_events(&path).unwrap().is_empty());
        assert!(read_events(&dir.path().join("missing.jsonl")).is_err());
    }

    #[test]
    fn test_gl015_is_leap() {
        assert!(is_leap(2000));
        assert!(!is_leap(1900));
        assert!(is_leap(2024));
        assert!(!is_leap(2026));
    }
}
