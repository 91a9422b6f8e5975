use crate::connection::ReconnectNotice;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// `dd:hh:mm:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

/// `Xd Yh Zm Ws` since the server started, or `Unknown`
pub fn format_uptime(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(started_at) = started_at else {
        return "Unknown".to_string();
    };
    let total = (now - started_at).num_seconds().max(0);
    format!(
        "{}d {}h {}m {}s",
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60
    )
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

pub fn reconnect_text(notice: ReconnectNotice) -> String {
    match notice {
        ReconnectNotice::In(secs) => {
            let minutes = secs / 60;
            let seconds = secs % 60;
            let remaining = if minutes > 0 {
                format!("{} {}", plural(minutes, "minute"), plural(seconds, "second"))
            } else {
                plural(seconds, "second")
            };
            format!("Attempting to reconnect in {}...", remaining)
        }
        ReconnectNotice::Imminent => "Attempting to reconnect...".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "00:00:00:59");
        assert_eq!(
            format_elapsed(Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "02:03:04:05"
        );
    }

    #[test]
    fn test_format_uptime() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 1, 2, 3).unwrap();
        assert_eq!(format_uptime(Some(start), now), "1d 1h 2m 3s");
        assert_eq!(format_uptime(None, now), "Unknown");
        assert_eq!(format_uptime(Some(now), start), "0d 0h 0m 0s");
    }

    #[test]
    fn test_reconnect_text() {
        assert_eq!(
            reconnect_text(ReconnectNotice::In(5)),
            "Attempting to reconnect in 5 seconds..."
        );
        assert_eq!(
            reconnect_text(ReconnectNotice::In(1)),
            "Attempting to reconnect in 1 second..."
        );
        assert_eq!(
            reconnect_text(ReconnectNotice::In(61)),
            "Attempting to reconnect in 1 minute 1 second..."
        );
        assert_eq!(
            reconnect_text(ReconnectNotice::In(300)),
            "Attempting to reconnect in 5 minutes 0 seconds..."
        );
        assert_eq!(
            reconnect_text(ReconnectNotice::Imminent),
            "Attempting to reconnect..."
        );
    }
}
