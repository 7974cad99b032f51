use std::time::Duration;

/// Check that a string is all lowercase and is a valid DNS label, as
/// Kubernetes requires of workload names.
pub fn is_valid_dns_label(s: &str) -> bool {
    let valid_character = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';

    !s.is_empty()
        && s.len() <= 63
        && s.chars().all(valid_character)
        && s.starts_with(|c: char| c.is_ascii_alphanumeric())
        && !s.ends_with(|c: char| c == '-')
}

/// Format a duration as `1d 2h 3m 4s`, leaving off leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86400;
    let hours = (total % 86400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parse a whole number of seconds, for command-line arguments.
pub fn parse_seconds(secs: &str) -> Result<Duration, std::num::ParseIntError> {
    secs.parse().map(Duration::from_secs)
}
