//! Core data types for listing records, filters, and deletion bookkeeping.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// One scrobble as displayed in the listing.
///
/// Only valid for the scan cycle that produced it: any deletion on the page
/// makes the underlying view stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub title: String,
    pub artist: String,
    pub timestamp: Timestamp,
}

/// Inclusive hour-of-day window. When `start > end` the window wraps past
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    start: u32,
    end: u32,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> UnscrobblerResult<Self> {
        if start > 23 || end > 23 {
            return Err(UnscrobblerError::InvalidFilter(format!(
                "hour range {start}-{end} must be within 0-23"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Whether `hour` falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start > self.end {
            hour >= self.start || hour <= self.end
        } else if self.end > self.start {
            (self.start..=self.end).contains(&hour)
        } else {
            hour == self.start
        }
    }
}

/// Which records qualify for removal.
#[derive(Debug, Clone, Serialize)]
pub struct FilterConfig {
    artists: HashSet<String>,
    titles: HashSet<String>,
    year: Option<i32>,
    hour_range: Option<HourRange>,
}

impl FilterConfig {
    /// Build a filter from exact-match artist and title sets. At least one of
    /// them must be non-empty.
    pub fn new(artists: HashSet<String>, titles: HashSet<String>) -> UnscrobblerResult<Self> {
        if artists.is_empty() && titles.is_empty() {
            return Err(UnscrobblerError::InvalidFilter(
                "at least one artist or title is required".to_string(),
            ));
        }
        Ok(Self {
            artists,
            titles,
            year: None,
            hour_range: None,
        })
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_hour_range(mut self, hour_range: Option<HourRange>) -> Self {
        self.hour_range = hour_range;
        self
    }

    pub fn artists(&self) -> &HashSet<String> {
        &self.artists
    }

    pub fn titles(&self) -> &HashSet<String> {
        &self.titles
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn hour_range(&self) -> Option<HourRange> {
        self.hour_range
    }
}

/// Counts confirmed deletions against the run's ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalBudget {
    deletions: u32,
    max_removals: u32,
}

impl RemovalBudget {
    pub fn new(max_removals: u32) -> UnscrobblerResult<Self> {
        if max_removals == 0 {
            return Err(UnscrobblerError::InvalidFilter(
                "max removals must be positive".to_string(),
            ));
        }
        Ok(Self {
            deletions: 0,
            max_removals,
        })
    }

    pub fn deletions(&self) -> u32 {
        self.deletions
    }

    pub fn max_removals(&self) -> u32 {
        self.max_removals
    }

    pub fn remaining(&self) -> u32 {
        self.max_removals - self.deletions
    }

    pub fn is_exhausted(&self) -> bool {
        self.deletions >= self.max_removals
    }

    /// Count one confirmed deletion. Callers check `is_exhausted` before
    /// issuing the request, so this never passes the ceiling.
    pub(crate) fn record_deletion(&mut self) {
        debug_assert!(!self.is_exhausted(), "deletion recorded past the budget");
        self.deletions = (self.deletions + 1).min(self.max_removals);
    }
}

/// Position in the paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    page_number: u32,
    max_page: Option<u32>,
}

impl PageCursor {
    /// Start pages below 1 clamp to 1.
    pub fn new(start_page: u32, max_page: Option<u32>) -> Self {
        Self {
            page_number: start_page.max(1),
            max_page,
        }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn max_page(&self) -> Option<u32> {
        self.max_page
    }

    pub fn at_max_page(&self) -> bool {
        self.max_page.is_some_and(|max| self.page_number >= max)
    }

    pub fn advance(&mut self) {
        self.page_number += 1;
    }
}

/// One line of the deletion log. Fields are declared in key order so the
/// serialized object has sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionLogEntry {
    pub artist_name: String,
    pub timestamp: String,
    pub timestamp_parsed: String,
    pub track_title: String,
}

impl DeletionLogEntry {
    pub fn from_record(record: &Record) -> Self {
        Self {
            artist_name: record.artist.clone(),
            timestamp: record.timestamp.display().to_string(),
            timestamp_parsed: record.timestamp.parsed_iso(),
            track_title: record.title.clone(),
        }
    }
}

/// Login credentials handed to the page driver.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No further pages, or the configured last page was reached.
    Completed,
    /// The removal budget was used up.
    BudgetReached,
    /// The operator cancelled the run.
    Interrupted,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub deletions: u32,
    pub max_removals: u32,
    pub dry_run: bool,
    pub pages_visited: u32,
    pub outcome: RunOutcome,
}

/// Errors that can occur in the deletion engine.
#[derive(thiserror::Error, Debug)]
pub enum UnscrobblerError {
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    #[error("Scan error on page {page}, row {row}: {reason}")]
    Scan { page: u32, row: usize, reason: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Login still obstructed after {attempts} attempts")]
    LoginObstructed { attempts: u32 },

    #[error("Gave up deleting '{title}' by '{artist}' after {attempts} attempts")]
    DeleteRetriesExhausted {
        title: String,
        artist: String,
        attempts: u32,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type UnscrobblerResult<T> = Result<T, UnscrobblerError>;
