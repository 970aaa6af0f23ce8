//! Listing snapshot driver. Runs the deletion loop against a JSON export of
//! the scrobble library instead of a live browser session.
//!
//! Deletions only touch the in-memory copy; the snapshot file is never
//! rewritten.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use unscrobbler::{
    scan_page, Credentials, DeleteOutcome, LoginOutcome, PageDriver, PageView, RawRow,
    UnscrobblerError, UnscrobblerResult, DRIVER_LOG_TARGET,
};

/// On-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingSnapshot {
    /// Pages in order; rows within a page most recent first.
    pub pages: Vec<Vec<SnapshotRow>>,
    /// Login attempts that report an obstruction before one succeeds.
    #[serde(default)]
    pub login_obstructions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Stable identity of a row for the lifetime of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowId(u64);

#[derive(Debug, Clone)]
struct Slot {
    id: RowId,
    row: SnapshotRow,
}

/// `PageDriver` over a loaded snapshot.
#[derive(Debug)]
pub struct SnapshotDriver {
    pages: Vec<Vec<Slot>>,
    obstructions_left: u32,
    logged_in: bool,
    deleted: usize,
}

impl SnapshotDriver {
    pub fn new(snapshot: ListingSnapshot) -> Self {
        let mut next_id = 0u64;
        let pages = snapshot
            .pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|row| {
                        next_id += 1;
                        Slot {
                            id: RowId(next_id),
                            row,
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            pages,
            obstructions_left: snapshot.login_obstructions,
            logged_in: false,
            deleted: 0,
        }
    }

    /// Load a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read listing snapshot {}", path.display()))?;
        let snapshot: ListingSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("Invalid listing snapshot {}", path.display()))?;
        tracing::info!(
            "Loaded listing snapshot {} ({} pages)",
            path.display(),
            snapshot.pages.len()
        );
        Ok(Self::new(snapshot))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Rows removed so far.
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Current contents of every page.
    pub fn remaining(&self) -> Vec<Vec<SnapshotRow>> {
        self.pages
            .iter()
            .map(|page| page.iter().map(|slot| slot.row.clone()).collect())
            .collect()
    }

    fn ensure_logged_in(&self) -> UnscrobblerResult<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(UnscrobblerError::Driver("not logged in".to_string()))
        }
    }
}

impl PageDriver for SnapshotDriver {
    type Handle = RowId;

    fn login(&mut self, credentials: &Credentials) -> UnscrobblerResult<LoginOutcome> {
        if self.obstructions_left > 0 {
            self.obstructions_left -= 1;
            tracing::debug!(target: DRIVER_LOG_TARGET, "Login form obstructed by consent overlay");
            return Ok(LoginOutcome::Obstructed(
                "consent overlay covers the submit button".to_string(),
            ));
        }
        tracing::debug!(target: DRIVER_LOG_TARGET, user = %credentials.username, "Snapshot session opened");
        self.logged_in = true;
        Ok(LoginOutcome::LoggedIn)
    }

    fn navigate_to_page(&mut self, page_number: u32) -> UnscrobblerResult<PageView> {
        self.ensure_logged_in()?;
        tracing::debug!(target: DRIVER_LOG_TARGET, page = page_number, "Navigate");
        Ok(PageView {
            page_number,
            location: format!("snapshot?page={page_number}"),
        })
    }

    fn records_on_page(&mut self, view: &PageView) -> UnscrobblerResult<Vec<RawRow<RowId>>> {
        self.ensure_logged_in()?;
        let rows: &[Slot] = (view.page_number as usize)
            .checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        tracing::trace!(target: DRIVER_LOG_TARGET, page = view.page_number, rows = rows.len(), "Read page");
        Ok(rows
            .iter()
            .map(|slot| RawRow {
                title: slot.row.title.clone(),
                artist: slot.row.artist.clone(),
                timestamp: slot.row.timestamp.clone(),
                handle: slot.id,
            })
            .collect())
    }

    fn delete_record(&mut self, handle: &RowId) -> UnscrobblerResult<DeleteOutcome> {
        self.ensure_logged_in()?;
        for page in &mut self.pages {
            if let Some(pos) = page.iter().position(|slot| slot.id == *handle) {
                let slot = page.remove(pos);
                self.deleted += 1;
                tracing::debug!(
                    target: DRIVER_LOG_TARGET,
                    "Deleted row {:?}: {} - {}",
                    slot.id,
                    slot.row.artist,
                    slot.row.title
                );
                return Ok(DeleteOutcome::Deleted);
            }
        }
        Err(UnscrobblerError::Driver(format!(
            "row {handle:?} is no longer in the listing"
        )))
    }

    fn has_next_page(&mut self, view: &PageView) -> UnscrobblerResult<bool> {
        self.ensure_logged_in()?;
        Ok((view.page_number as usize) < self.pages.len())
    }

    fn close(&mut self) -> UnscrobblerResult<()> {
        if self.logged_in {
            tracing::debug!(target: DRIVER_LOG_TARGET, deleted = self.deleted, "Snapshot session closed");
        }
        self.logged_in = false;
        Ok(())
    }
}

/// Per-page result of checking a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReport {
    pub page: u32,
    pub records: usize,
    pub newest: Option<String>,
    pub oldest: Option<String>,
}

/// Scan every page of a snapshot, failing on the first unparsable row.
pub fn validate_snapshot(
    driver: &mut SnapshotDriver,
    credentials: &Credentials,
) -> UnscrobblerResult<Vec<PageReport>> {
    // A snapshot's simulated obstructions don't matter for validation.
    while let LoginOutcome::Obstructed(_) = driver.login(credentials)? {}

    let mut reports = Vec::with_capacity(driver.page_count());
    for page in 1..=driver.page_count() as u32 {
        let view = driver.navigate_to_page(page)?;
        let records = scan_page(driver, &view)?;
        reports.push(PageReport {
            page,
            records: records.len(),
            newest: records.first().map(|r| r.record.timestamp.parsed_iso()),
            oldest: records.last().map(|r| r.record.timestamp.parsed_iso()),
        });
    }
    driver.close()?;
    Ok(reports)
}
