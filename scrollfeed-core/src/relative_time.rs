use chrono::{DateTime, Utc};

/// Short "how long ago" label for a publication time.
///
/// Minutes under an hour, hours under a day, "Yesterday", then "N days ago"
/// up to a week, and an absolute "Mon D" date beyond that.
pub fn relative_label(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - published).num_milliseconds().max(0);
    let mins = elapsed / 60_000;
    let hours = elapsed / 3_600_000;
    let days = elapsed / 86_400_000;

    if mins < 60 {
        format!("{mins}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days == 1 {
        "Yesterday".to_owned()
    } else if days < 7 {
        format!("{days} days ago")
    } else {
        published.format("%b %-d").to_string()
    }
}
