use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// What a frontmatter string looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// Calendar date, `YYYY-MM-DD`.
    Date,
    /// ISO-8601 date-time, with or without offset.
    DateTime,
    Text,
}

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Classify a string as an ISO-8601 date, date-time, or plain text.
///
/// Strict: the value must start with a zero-padded `YYYY-MM-DD` and describe a
/// real calendar date, so `2024-02-30` and `2024-1-5` are text.
pub fn classify(value: &str) -> StringKind {
    if !has_iso_date_prefix(value) {
        return StringKind::Text;
    }

    if value.len() == 10 {
        return match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(_) => StringKind::Date,
            Err(_) => StringKind::Text,
        };
    }

    if DateTime::parse_from_rfc3339(value).is_ok() {
        return StringKind::DateTime;
    }

    if DATE_TIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
    {
        return StringKind::DateTime;
    }

    StringKind::Text
}

fn has_iso_date_prefix(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes[..10].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}
