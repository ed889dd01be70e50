pub mod errors;

pub use errors::{SessionError, SessionResult};

/// Format seconds as `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_time(seconds: f64) -> String {
    if seconds <= 0.0 || !seconds.is_finite() {
        return "00:00".to_string();
    }

    let total = seconds.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours == 0 {
        format!("{:02}:{:02}", minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}
