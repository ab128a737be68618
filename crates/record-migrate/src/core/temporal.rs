//! ISO-8601 rendering and parsing for temporal values.
//!
//! Rendering keeps microseconds only when they are non-zero (always six
//! digits) and writes a zero UTC offset as `Z`. Parsing accepts `T` or a
//! space between date and time, optional seconds and fraction, and an
//! optional `Z` / `±HH[:MM]` suffix.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use super::value::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

fn push_micros(out: &mut String, nanos: u32) {
    let micros = (nanos % 1_000_000_000) / 1_000;
    if micros != 0 {
        let _ = write!(out, ".{:06}", micros);
    }
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_time(time: &NaiveTime) -> String {
    let mut out = time.format("%H:%M:%S").to_string();
    push_micros(&mut out, time.nanosecond());
    out
}

pub fn format_datetime(datetime: &NaiveDateTime) -> String {
    let mut out = datetime.format("%Y-%m-%dT%H:%M:%S").to_string();
    push_micros(&mut out, datetime.nanosecond());
    out
}

pub fn format_datetime_tz(datetime: &DateTime<FixedOffset>) -> String {
    let mut out = format_datetime(&datetime.naive_local());
    out.push_str(&format_offset(datetime.offset()));
    out
}

/// Render an offset as `Z` for UTC, `±HH:MM` otherwise.
pub fn format_offset(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "Z".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    format!("{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

/// Parse `Z`, `±HH`, `±HHMM` or `±HH:MM`.
pub fn parse_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let mut chars = text.chars();
    let sign = match chars.next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let digits: String = chars.filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits.get(..2)?.parse::<i32>().ok()?,
            digits.get(2..)?.parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse a datetime into [`Value::DateTime`] or, with an offset suffix,
/// [`Value::DateTimeTz`].
pub fn parse_datetime(text: &str) -> Option<Value> {
    let text = text.trim();
    let date = parse_date(text.get(..10)?)?;
    let rest = text.get(10..)?;
    let rest = rest
        .strip_prefix('T')
        .or_else(|| rest.strip_prefix('t'))
        .or_else(|| rest.strip_prefix(' '))?;

    let (time_part, offset_part) = match rest.find(|c: char| matches!(c, 'Z' | 'z' | '+' | '-')) {
        Some(index) => (rest.get(..index)?, Some(rest.get(index..)?)),
        None => (rest, None),
    };
    let naive = date.and_time(parse_time(time_part)?);

    match offset_part {
        None => Some(Value::DateTime(naive)),
        Some(offset) => {
            let offset = parse_offset(offset)?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(Value::DateTimeTz)
        }
    }
}
