use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_english::{parse_date_string, Dialect};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Failed to parse date '{0}'")]
    Date(String),
    #[error("Failed to parse time '{0}' (expected e.g. '14:30' or '2:30 PM')")]
    Time(String),
    #[error("Failed to parse duration '{0}' (expected e.g. '90m', '1h30m', '45s')")]
    Duration(String),
    #[error("Date is out of range: {0} plus {1}")]
    OutOfRange(DateTime<Utc>, String),
}

/// Accepts `YYYY-MM-DD` or anything `chrono-english` understands
/// ("tomorrow", "next friday").
pub fn parse_date(input: &str) -> Result<NaiveDate, ParseError> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_date_string(input, Local::now(), Dialect::Us)
        .map(|dt| dt.date_naive())
        .map_err(|_| ParseError::Date(input.to_string()))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM` in local time, or natural language.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>, ParseError> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                return Ok(local.with_timezone(&Utc));
            }
        }
    }
    parse_date_string(input, Local::now(), Dialect::Us)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::Date(input.to_string()))
}

pub fn parse_time(input: &str) -> Result<NaiveTime, ParseError> {
    let input = input.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p", "%I %p"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&input.to_uppercase(), format).ok())
        .ok_or_else(|| ParseError::Time(input.to_string()))
}

/// Parses compact durations such as `90m`, `1h30m` or `2h 5m 10s`.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let err = || ParseError::Duration(input.to_string());
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(err());
    }

    let mut total = Duration::zero();
    let mut digits = String::new();
    for c in compact.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let amount: i64 = digits.parse().map_err(|_| err())?;
        digits.clear();
        let part = match c.to_ascii_lowercase() {
            'h' => Duration::try_hours(amount),
            'm' => Duration::try_minutes(amount),
            's' => Duration::try_seconds(amount),
            _ => None,
        }
        .ok_or_else(err)?;
        total = total.checked_add(&part).ok_or_else(err)?;
    }
    if !digits.is_empty() || total <= Duration::zero() {
        return Err(err());
    }
    Ok(total)
}

/// `start + length`, or an error when the result is not a representable date.
pub fn end_after(start: DateTime<Utc>, length: Duration) -> Result<DateTime<Utc>, ParseError> {
    start
        .checked_add_signed(length)
        .ok_or_else(|| ParseError::OutOfRange(start, format_duration(length)))
}

/// `1h 05m`, `12m 30s`, `45s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
