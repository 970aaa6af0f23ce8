//! Parsing of the listing's scrobble timestamps.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

use crate::types::{UnscrobblerError, UnscrobblerResult};

/// Naive formats tried after RFC 3339, in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    // Listing tooltip format, e.g. "Tuesday 1 Jun 2021, 10:00am"
    "%A %d %b %Y, %I:%M%p",
    "%d %b %Y, %I:%M%p",
];

/// A scrobble time: the string exactly as the listing displayed it plus the
/// wall-clock date-time it denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp {
    display: String,
    parsed: NaiveDateTime,
}

impl Timestamp {
    /// Parse a display string. Offsets in RFC 3339 input are dropped and the
    /// displayed wall-clock time is kept, since hour filters apply to what the
    /// listing shows.
    pub fn parse(display: &str) -> UnscrobblerResult<Self> {
        let trimmed = display.trim();
        if trimmed.is_empty() {
            return Err(UnscrobblerError::Timestamp(
                "empty timestamp string".to_string(),
            ));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self {
                display: display.to_string(),
                parsed: dt.naive_local(),
            });
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(|parsed| Self {
                display: display.to_string(),
                parsed,
            })
            .ok_or_else(|| {
                UnscrobblerError::Timestamp(format!("unrecognized timestamp '{display}'"))
            })
    }

    /// The original display string.
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn parsed(&self) -> NaiveDateTime {
        self.parsed
    }

    pub fn hour(&self) -> u32 {
        self.parsed.hour()
    }

    pub fn year(&self) -> i32 {
        self.parsed.year()
    }

    /// `YYYY-MM-DDTHH:MM:SS` rendering of the parsed value.
    pub fn parsed_iso(&self) -> String {
        self.parsed.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
