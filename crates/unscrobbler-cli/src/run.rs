//! Runs the deletion loop off the async runtime and wires in Ctrl+C.

use std::future::Future;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};

use unscrobbler::{DeletionController, DeletionLogSink, RunSummary};

use crate::config::RunConfig;
use crate::listing::SnapshotDriver;

/// Run one pruning pass. The loop itself is blocking, so it runs on the
/// blocking pool; when `shutdown` resolves first the loop is asked to stop at
/// its next checkpoint and this still waits for it to release the driver and
/// flush the log.
pub async fn run_pruning<F>(
    config: RunConfig,
    sink: DeletionLogSink,
    shutdown: F,
) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let driver = SnapshotDriver::load(&config.listing)?;
    let RunConfig {
        credentials,
        filter,
        options,
        ..
    } = config;

    let mut controller = DeletionController::new(driver, filter, options, sink)?;
    let cancel = controller.cancel_flag();
    let mut task = tokio::task::spawn_blocking(move || controller.run(&credentials));

    tokio::pin!(shutdown);
    let joined = tokio::select! {
        joined = &mut task => joined,
        () = &mut shutdown => {
            tracing::warn!("Interrupt received; stopping after the current step.");
            cancel.store(true, Ordering::SeqCst);
            task.await
        }
    };

    let summary = joined.context("Deletion loop panicked")??;
    Ok(summary)
}
