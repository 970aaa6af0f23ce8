//! Turns a driver's raw rows into parsed records.

use crate::driver::{PageDriver, PageView, RawRow};
use crate::timestamp::Timestamp;
use crate::types::{Record, UnscrobblerError, UnscrobblerResult};

/// A parsed record together with the handle that deletes it.
#[derive(Debug, Clone)]
pub struct ScannedRecord<H> {
    pub record: Record,
    pub handle: H,
}

/// Read the current contents of `view` in display order.
///
/// An empty page is fine. A row without a usable timestamp fails the whole
/// scan: it means the listing format changed under us.
pub fn scan_page<D: PageDriver>(
    driver: &mut D,
    view: &PageView,
) -> UnscrobblerResult<Vec<ScannedRecord<D::Handle>>> {
    let rows = driver.records_on_page(view)?;
    let scanned = rows
        .into_iter()
        .enumerate()
        .map(|(idx, row)| parse_row(view.page_number, idx + 1, row))
        .collect::<UnscrobblerResult<Vec<_>>>()?;

    tracing::trace!(
        page = view.page_number,
        rows = scanned.len(),
        "Scanned page"
    );
    Ok(scanned)
}

fn parse_row<H>(page: u32, row: usize, raw: RawRow<H>) -> UnscrobblerResult<ScannedRecord<H>> {
    let display = raw.timestamp.ok_or_else(|| UnscrobblerError::Scan {
        page,
        row,
        reason: "missing timestamp".to_string(),
    })?;

    let timestamp = Timestamp::parse(&display).map_err(|e| UnscrobblerError::Scan {
        page,
        row,
        reason: e.to_string(),
    })?;

    Ok(ScannedRecord {
        record: Record {
            title: raw.title,
            artist: raw.artist,
            timestamp,
        },
        handle: raw.handle,
    })
}
