//! Page driver abstraction.
//!
//! Defines the `PageDriver` trait the deletion loop talks to. Implementations
//! own the browser (or any other backing store) and everything about how a
//! listing is rendered; the engine only sees rows, handles, and outcomes.

use serde::{Deserialize, Serialize};

use crate::types::{Credentials, UnscrobblerResult};

/// Tracing target for driver diagnostics. The CLI routes events with this
/// target to the per-run driver log.
pub const DRIVER_LOG_TARGET: &str = "unscrobbler::driver";

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    /// Something is in the way (consent popup, overlay). Worth retrying.
    Obstructed(String),
}

/// Result of a single delete action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The action did not go through (UI race, stale element). Retry it.
    Transient(String),
}

/// A loaded listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageView {
    pub page_number: u32,
    /// Where the page was loaded from, for logging.
    pub location: String,
}

/// One row as the driver sees it, before timestamp parsing.
#[derive(Debug, Clone)]
pub struct RawRow<H> {
    pub title: String,
    pub artist: String,
    /// `None` when the row has no timestamp element.
    pub timestamp: Option<String>,
    /// Driver-specific reference used to delete this row.
    pub handle: H,
}

/// Capability the deletion loop needs from the listing.
///
/// `records_on_page` must read the live page on every call. Handles it returns
/// are only valid until the next mutating call.
pub trait PageDriver {
    type Handle;

    fn login(&mut self, credentials: &Credentials) -> UnscrobblerResult<LoginOutcome>;

    fn navigate_to_page(&mut self, page_number: u32) -> UnscrobblerResult<PageView>;

    fn records_on_page(&mut self, view: &PageView) -> UnscrobblerResult<Vec<RawRow<Self::Handle>>>;

    fn delete_record(&mut self, handle: &Self::Handle) -> UnscrobblerResult<DeleteOutcome>;

    fn has_next_page(&mut self, view: &PageView) -> UnscrobblerResult<bool>;

    /// Release the session. Called once when the run ends, however it ends.
    fn close(&mut self) -> UnscrobblerResult<()> {
        Ok(())
    }
}
