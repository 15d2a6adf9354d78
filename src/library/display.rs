use std::time::Duration;

/// Format a duration as `mm:ss` (minutes are not wrapped into hours).
pub fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Like [`format_clock`] but renders an unknown length as `--:--`.
pub fn format_clock_opt(d: Option<Duration>) -> String {
    d.map(format_clock).unwrap_or_else(|| "--:--".to_string())
}

/// Parse a human-readable length (`ss`, `mm:ss` or `hh:mm:ss`).
///
/// Returns `None` for blank or malformed input.
pub fn parse_clock(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut parts = 0;
    for part in s.split(':') {
        parts += 1;
        if parts > 3 {
            return None;
        }
        let v: u64 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(v)?;
    }
    Some(Duration::from_secs(total))
}
