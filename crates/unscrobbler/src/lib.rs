//! Unscrobbler — core deletion engine for pruning a paginated scrobble listing.

pub mod controller;
pub mod driver;
pub mod predicate;
pub mod retry;
pub mod scanner;
pub mod sink;
pub mod timestamp;
pub mod types;

pub use controller::{DeletionController, RunOptions, RunState};
pub use driver::{DeleteOutcome, LoginOutcome, PageDriver, PageView, RawRow, DRIVER_LOG_TARGET};
pub use predicate::should_delete;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use scanner::{scan_page, ScannedRecord};
pub use sink::DeletionLogSink;
pub use timestamp::Timestamp;
pub use types::*;
