//! Display helpers for message and chat-list timestamps

use chrono::{DateTime, Days, TimeZone};
use duochat_core::parse_timestamp;

/// Timestamp under a message bubble.
///
/// Today `14:05`, yesterday `Yesterday 14:05`, otherwise `Mar 4, 14:05`.
/// Missing or unparseable input gives an empty string.
pub fn format_message_time<Tz>(timestamp: Option<&str>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(at) = localize(timestamp, now) else {
        return String::new();
    };

    match day_relation(&at, now) {
        DayRelation::Today => at.format("%H:%M").to_string(),
        DayRelation::Yesterday => format!("Yesterday {}", at.format("%H:%M")),
        DayRelation::Other => at.format("%b %-d, %H:%M").to_string(),
    }
}

/// Timestamp in the conversation list: `14:05`, `Yesterday` or `Mar 4`
pub fn format_chat_list_time<Tz>(timestamp: Option<&str>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(at) = localize(timestamp, now) else {
        return String::new();
    };

    match day_relation(&at, now) {
        DayRelation::Today => at.format("%H:%M").to_string(),
        DayRelation::Yesterday => "Yesterday".to_string(),
        DayRelation::Other => at.format("%b %-d").to_string(),
    }
}

/// Cut `text` to `max_chars` characters, appending `...` when cut
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

enum DayRelation {
    Today,
    Yesterday,
    Other,
}

fn localize<Tz: TimeZone>(timestamp: Option<&str>, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    timestamp
        .and_then(parse_timestamp)
        .map(|at| at.with_timezone(&now.timezone()))
}

fn day_relation<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> DayRelation {
    let today = now.date_naive();
    let day = at.date_naive();

    if day == today {
        DayRelation::Today
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        DayRelation::Yesterday
    } else {
        DayRelation::Other
    }
}
