//! The deletion loop: log in, walk pages, delete matches one at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::{DeleteOutcome, LoginOutcome, PageDriver, PageView};
use crate::predicate::should_delete;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::scanner::{scan_page, ScannedRecord};
use crate::sink::DeletionLogSink;
use crate::types::{
    Credentials, DeletionLogEntry, FilterConfig, PageCursor, Record, RemovalBudget, RunOutcome,
    RunSummary, UnscrobblerError, UnscrobblerResult,
};

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Skip the driver's delete call but otherwise behave like a real run.
    pub dry_run: bool,
    pub start_page: u32,
    pub max_page: Option<u32>,
    pub max_removals: u32,
    pub login_retry: RetryPolicy,
    pub delete_retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            start_page: 1,
            max_page: None,
            max_removals: 100,
            login_retry: RetryPolicy::login(),
            delete_retry: RetryPolicy::deletion(),
        }
    }
}

/// Where the controller is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    LoggingIn,
    PagingThroughListing,
    ScanningPage,
    DeletingMatches,
    AdvancingPage,
    Done,
    Failed,
}

/// How processing of one page ended.
enum PageOutcome {
    Cleared,
    BudgetReached,
    Interrupted,
}

/// Owns the driver, the budget, and the log for one run.
pub struct DeletionController<D: PageDriver> {
    driver: D,
    filter: FilterConfig,
    options: RunOptions,
    sink: DeletionLogSink,
    budget: RemovalBudget,
    cursor: PageCursor,
    state: RunState,
    history: Vec<RunState>,
    sleeper: Box<dyn Sleeper>,
    cancel: Arc<AtomicBool>,
    pages_visited: u32,
}

impl<D: PageDriver> DeletionController<D> {
    pub fn new(
        driver: D,
        filter: FilterConfig,
        options: RunOptions,
        sink: DeletionLogSink,
    ) -> UnscrobblerResult<Self> {
        let budget = RemovalBudget::new(options.max_removals)?;
        let cursor = PageCursor::new(options.start_page, options.max_page);
        Ok(Self {
            driver,
            filter,
            options,
            sink,
            budget,
            cursor,
            state: RunState::LoggingIn,
            history: vec![RunState::LoggingIn],
            sleeper: Box::new(ThreadSleeper),
            cancel: Arc::new(AtomicBool::new(false)),
            pages_visited: 0,
        })
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Flag that stops the run at its next checkpoint once set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn budget(&self) -> &RemovalBudget {
        &self.budget
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn sink(&self) -> &DeletionLogSink {
        &self.sink
    }

    /// Run to completion. The driver is closed and the log flushed on every
    /// exit path.
    pub fn run(&mut self, credentials: &Credentials) -> UnscrobblerResult<RunSummary> {
        let result = self.drive(credentials);

        if let Err(e) = self.driver.close() {
            tracing::warn!("Failed to close page driver: {e}");
        }
        self.sink.close();

        match result {
            Ok(outcome) => {
                self.transition(RunState::Done);
                let summary = self.summary(outcome);
                tracing::info!(
                    "{}Removed {} scrobbles (configured max: {}).",
                    if summary.dry_run { "[dry run] " } else { "" },
                    summary.deletions,
                    summary.max_removals
                );
                Ok(summary)
            }
            Err(e) => {
                self.transition(RunState::Failed);
                tracing::error!(
                    deletions = self.budget.deletions(),
                    "Run failed: {e}"
                );
                Err(e)
            }
        }
    }

    fn drive(&mut self, credentials: &Credentials) -> UnscrobblerResult<RunOutcome> {
        if self.options.dry_run {
            tracing::info!("This is a dry run. No destructive actions will be performed.");
        } else {
            tracing::warn!("Dry run disabled. Destructive actions may be performed.");
        }

        if !self.login(credentials)? {
            return Ok(RunOutcome::Interrupted);
        }

        loop {
            self.transition(RunState::PagingThroughListing);
            if self.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }

            let page_number = self.cursor.page_number();
            let view = self.driver.navigate_to_page(page_number)?;
            self.pages_visited += 1;
            tracing::info!("On page #{page_number}; {}", view.location);

            match self.prune_page(&view)? {
                PageOutcome::Cleared => {}
                PageOutcome::BudgetReached => return Ok(RunOutcome::BudgetReached),
                PageOutcome::Interrupted => return Ok(RunOutcome::Interrupted),
            }

            self.transition(RunState::AdvancingPage);
            if !self.driver.has_next_page(&view)? {
                tracing::info!("Finished last page.");
                return Ok(RunOutcome::Completed);
            }
            if self.cursor.at_max_page() {
                tracing::info!("Reached max page ({page_number}).");
                return Ok(RunOutcome::Completed);
            }
            self.cursor.advance();
        }
    }

    /// Returns `false` if the run was cancelled while waiting to retry.
    fn login(&mut self, credentials: &Credentials) -> UnscrobblerResult<bool> {
        let policy = self.options.login_retry;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.driver.login(credentials)? {
                LoginOutcome::LoggedIn => {
                    tracing::info!("Logged in as {}", credentials.username);
                    return Ok(true);
                }
                LoginOutcome::Obstructed(reason) => {
                    tracing::error!(attempt = attempts, "Cannot get past the login page: {reason}");
                    if !policy.allows_retry(attempts) {
                        return Err(UnscrobblerError::LoginObstructed { attempts });
                    }
                    tracing::warn!(
                        "Will retry in {:?}. Press Ctrl+C to stop the program and exit.",
                        policy.pause()
                    );
                    self.sleeper.sleep(policy.pause());
                    if self.is_cancelled() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Delete matches on `view` until none remain or the budget runs out.
    /// The page is rescanned after every deletion.
    fn prune_page(&mut self, view: &PageView) -> UnscrobblerResult<PageOutcome> {
        // Rows already counted by a dry run on this page. A real deletion
        // would have removed them from the view, so the next scan skips them.
        let mut dry_run_removed: HashMap<Record, usize> = HashMap::new();
        let mut pass = 0u32;

        loop {
            if self.budget.is_exhausted() {
                return Ok(PageOutcome::BudgetReached);
            }

            self.transition(RunState::ScanningPage);
            let rows = scan_page(&mut self.driver, view)?;
            let Some(target) = self.first_match(rows, &dry_run_removed) else {
                tracing::debug!(page = view.page_number, "No matches left on page");
                return Ok(PageOutcome::Cleared);
            };

            pass += 1;
            tracing::info!("attempt #{pass}");

            if self.is_cancelled() {
                return Ok(PageOutcome::Interrupted);
            }

            self.transition(RunState::DeletingMatches);
            if !self.delete_with_retry(&target)? {
                return Ok(PageOutcome::Interrupted);
            }

            // Count and log only after the driver confirmed the deletion.
            self.budget.record_deletion();
            self.sink.record(&DeletionLogEntry::from_record(&target.record));
            tracing::info!(
                deletions = self.budget.deletions(),
                "Removed '{}' by '{}' ({})",
                target.record.title,
                target.record.artist,
                target.record.timestamp
            );

            if self.options.dry_run {
                *dry_run_removed.entry(target.record).or_default() += 1;
            }
        }
    }

    fn first_match(
        &self,
        rows: Vec<ScannedRecord<D::Handle>>,
        dry_run_removed: &HashMap<Record, usize>,
    ) -> Option<ScannedRecord<D::Handle>> {
        let mut skipped: HashMap<Record, usize> = HashMap::new();
        for row in rows {
            if let Some(&removed) = dry_run_removed.get(&row.record) {
                let seen = skipped.entry(row.record.clone()).or_default();
                if *seen < removed {
                    *seen += 1;
                    continue;
                }
            }
            if should_delete(&row.record, &self.filter) {
                return Some(row);
            }
        }
        None
    }

    /// Returns `true` once the record is gone (or would be, in a dry run) and
    /// `false` if the run was cancelled between attempts.
    fn delete_with_retry(&mut self, target: &ScannedRecord<D::Handle>) -> UnscrobblerResult<bool> {
        if self.options.dry_run {
            return Ok(true);
        }

        let policy = self.options.delete_retry;
        let record = &target.record;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.driver.delete_record(&target.handle)? {
                DeleteOutcome::Deleted => return Ok(true),
                DeleteOutcome::Transient(reason) => {
                    tracing::error!(
                        attempt = attempts,
                        "Problem deleting {} ({}) ({}). This should be fixed automatically: {reason}",
                        record.title,
                        record.artist,
                        record.timestamp
                    );
                    if !policy.allows_retry(attempts) {
                        return Err(UnscrobblerError::DeleteRetriesExhausted {
                            title: record.title.clone(),
                            artist: record.artist.clone(),
                            attempts,
                        });
                    }
                    self.sleeper.sleep(policy.pause());
                    if self.is_cancelled() {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn transition(&mut self, next: RunState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
            self.history.push(next);
        }
    }

    fn summary(&self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            deletions: self.budget.deletions(),
            max_removals: self.budget.max_removals(),
            dry_run: self.options.dry_run,
            pages_visited: self.pages_visited,
            outcome,
        }
    }
}
