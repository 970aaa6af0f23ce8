//! Unscrobbler CLI — argument handling, log files, and the listing snapshot driver.

pub mod cli;
pub mod config;
pub mod listing;
pub mod logging;
pub mod run;

pub use config::{resolve_credentials, ConfigError, RunArgs, RunConfig};
pub use listing::{validate_snapshot, ListingSnapshot, SnapshotDriver};
pub use logging::{init_tracing, run_stamp, RunLogFiles};
pub use run::run_pruning;
