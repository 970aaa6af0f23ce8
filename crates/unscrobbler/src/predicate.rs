//! The deletion predicate.

use crate::types::{FilterConfig, Record};

/// Decide whether `record` should be removed under `config`.
///
/// A record is a candidate when its artist or its title is listed. Candidates
/// are then narrowed by hour of day, and after that by year. The year check
/// replaces the hour result rather than combining with it, so when both are
/// configured only the year decides.
pub fn should_delete(record: &Record, config: &FilterConfig) -> bool {
    let mut delete =
        config.artists().contains(&record.artist) || config.titles().contains(&record.title);

    if !delete {
        return false;
    }

    if let Some(range) = config.hour_range() {
        delete = range.contains(record.timestamp.hour());
    }

    if let Some(year) = config.year() {
        delete = record.timestamp.year() == year;
    }

    delete
}
