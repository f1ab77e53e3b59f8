use std::time::Duration;

/// Human readable elapsed time for admin-facing messages.
///
/// Under a minute only seconds are shown, under an hour minutes and seconds,
/// otherwise hours and minutes.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();

    if secs < 60 {
        plural(secs, "second")
    } else if secs < 3600 {
        format!("{} {}", plural(secs / 60, "minute"), plural(secs % 60, "second"))
    } else {
        format!(
            "{} {}",
            plural(secs / 3600, "hour"),
            plural((secs % 3600) / 60, "minute")
        )
    }
}

fn plural(value: u64, unit: &str) -> String {
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0 seconds");
        assert_eq!(format_duration(Duration::from_secs(1)), "1 second");
        assert_eq!(format_duration(Duration::from_millis(59_900)), "59 seconds");
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(format_duration(Duration::from_secs(60)), "1 minute 0 seconds");
        assert_eq!(format_duration(Duration::from_secs(192)), "3 minutes 12 seconds");
        assert_eq!(format_duration(Duration::from_secs(901)), "15 minutes 1 second");
    }

    #[test]
    fn hours_and_minutes() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1 hour 0 minutes");
        assert_eq!(format_duration(Duration::from_secs(7_500)), "2 hours 5 minutes");
    }
}
