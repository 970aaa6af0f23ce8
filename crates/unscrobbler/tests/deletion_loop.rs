//! Integration tests for the deletion loop against an in-memory listing.
//!
//! The fixture driver hands out positional handles and can shuffle a page
//! after every deletion, so any reuse of a stale handle deletes the wrong row.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use unscrobbler::*;

// ─────────────────────── helpers ───────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    artist: String,
    title: String,
    timestamp: Option<String>,
}

fn row(artist: &str, title: &str, ts: &str) -> Row {
    Row {
        artist: artist.to_string(),
        title: title.to_string(),
        timestamp: Some(ts.to_string()),
    }
}

#[derive(Default)]
struct FixtureDriver {
    pages: Vec<Vec<Row>>,
    current_page: usize,
    reverse_after_delete: bool,
    /// Remaining transient failures keyed by title.
    flaky_titles: HashMap<String, u32>,
    login_obstructions: Option<u32>,
    login_calls: u32,
    delete_calls: u32,
    navigations: Vec<u32>,
    closed: bool,
}

impl FixtureDriver {
    fn new(pages: Vec<Vec<Row>>) -> Self {
        Self {
            pages,
            login_obstructions: Some(0),
            ..Default::default()
        }
    }

    fn remaining_titles(&self) -> Vec<Vec<&str>> {
        self.pages
            .iter()
            .map(|p| p.iter().map(|r| r.title.as_str()).collect())
            .collect()
    }
}

impl PageDriver for FixtureDriver {
    type Handle = usize;

    fn login(&mut self, _: &Credentials) -> UnscrobblerResult<LoginOutcome> {
        self.login_calls += 1;
        match self.login_obstructions.as_mut() {
            // None means the obstruction never goes away.
            None => Ok(LoginOutcome::Obstructed("cookie banner".to_string())),
            Some(0) => Ok(LoginOutcome::LoggedIn),
            Some(n) => {
                *n -= 1;
                Ok(LoginOutcome::Obstructed("cookie banner".to_string()))
            }
        }
    }

    fn navigate_to_page(&mut self, page_number: u32) -> UnscrobblerResult<PageView> {
        self.navigations.push(page_number);
        self.current_page = page_number as usize;
        Ok(PageView {
            page_number,
            location: format!("fixture?page={page_number}"),
        })
    }

    fn records_on_page(&mut self, view: &PageView) -> UnscrobblerResult<Vec<RawRow<usize>>> {
        let rows = self
            .pages
            .get(view.page_number as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(idx, r)| RawRow {
                title: r.title,
                artist: r.artist,
                timestamp: r.timestamp,
                handle: idx,
            })
            .collect())
    }

    fn delete_record(&mut self, handle: &usize) -> UnscrobblerResult<DeleteOutcome> {
        self.delete_calls += 1;
        let page = self
            .pages
            .get_mut(self.current_page - 1)
            .ok_or_else(|| UnscrobblerError::Driver("no such page".to_string()))?;
        let target = page
            .get(*handle)
            .ok_or_else(|| UnscrobblerError::Driver(format!("stale handle {handle}")))?;

        if let Some(left) = self.flaky_titles.get_mut(&target.title) {
            if *left > 0 {
                *left -= 1;
                return Ok(DeleteOutcome::Transient("menu did not open".to_string()));
            }
        }

        page.remove(*handle);
        if self.reverse_after_delete {
            page.reverse();
        }
        Ok(DeleteOutcome::Deleted)
    }

    fn has_next_page(&mut self, view: &PageView) -> UnscrobblerResult<bool> {
        Ok((view.page_number as usize) < self.pages.len())
    }

    fn close(&mut self) -> UnscrobblerResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn entries(&self) -> Vec<DeletionLogEntry> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

impl RecordingSleeper {
    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// Sets the cancel flag the first time the loop pauses.
struct CancellingSleeper(Arc<AtomicBool>);

impl Sleeper for CancellingSleeper {
    fn sleep(&self, _: Duration) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn artists(names: &[&str]) -> FilterConfig {
    FilterConfig::new(names.iter().map(|s| s.to_string()).collect(), HashSet::new()).unwrap()
}

fn options(dry_run: bool, max_removals: u32) -> RunOptions {
    RunOptions {
        dry_run,
        max_removals,
        login_retry: RetryPolicy::login().with_pause(Duration::ZERO),
        delete_retry: RetryPolicy::deletion().with_pause(Duration::ZERO),
        ..Default::default()
    }
}

fn creds() -> Credentials {
    Credentials::new("tester", "secret")
}

fn titles(entries: &[DeletionLogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.track_title.as_str()).collect()
}

// ═══════════════════════════════════════════════════════
// END-TO-END
// ═══════════════════════════════════════════════════════

#[test]
fn test_01_three_record_scenario() {
    let driver = FixtureDriver::new(vec![vec![
        row("A", "T1", "2021-06-01T10:00"),
        row("B", "T2", "2021-06-01T23:00"),
        row("A", "T3", "2021-06-02T10:00"),
    ]]);
    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();

    assert_eq!(summary.deletions, 2);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(controller.state(), RunState::Done);

    let entries = log.entries();
    assert_eq!(titles(&entries), vec!["T1", "T3"]);
    assert_eq!(entries[0].timestamp_parsed, "2021-06-01T10:00:00");
    assert_eq!(controller.driver().remaining_titles(), vec![vec!["T2"]]);
    assert!(controller.driver().closed);
}

#[test]
fn test_02_empty_listing_completes() {
    let mut controller = DeletionController::new(
        FixtureDriver::new(vec![]),
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.deletions, 0);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(controller.driver().navigations, vec![1]);
}

// ═══════════════════════════════════════════════════════
// BUDGET
// ═══════════════════════════════════════════════════════

#[test]
fn test_03_budget_stops_mid_page() {
    let page: Vec<Row> = (1..=5)
        .map(|i| row("A", &format!("T{i}"), "2021-06-01T10:00"))
        .collect();
    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        FixtureDriver::new(vec![page.clone(), page]),
        artists(&["A"]),
        options(false, 3),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();

    assert_eq!(summary.deletions, 3);
    assert_eq!(summary.outcome, RunOutcome::BudgetReached);
    assert_eq!(controller.driver().delete_calls, 3);
    assert_eq!(controller.driver().navigations, vec![1]);
    assert_eq!(titles(&log.entries()), vec!["T1", "T2", "T3"]);
}

#[test]
fn test_04_budget_spans_pages() {
    let pages = vec![
        vec![
            row("A", "P1a", "2021-06-01T10:00"),
            row("B", "keep", "2021-06-01T10:00"),
            row("A", "P1b", "2021-06-01T09:00"),
        ],
        vec![
            row("A", "P2a", "2021-05-01T10:00"),
            row("A", "P2b", "2021-05-01T09:00"),
        ],
        vec![row("A", "P3a", "2021-04-01T10:00")],
    ];
    let mut controller = DeletionController::new(
        FixtureDriver::new(pages),
        artists(&["A"]),
        options(false, 3),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();

    assert_eq!(summary.deletions, 3);
    assert!(summary.deletions <= summary.max_removals);
    assert_eq!(controller.driver().navigations, vec![1, 2]);
    assert_eq!(
        controller.driver().remaining_titles(),
        vec![vec!["keep"], vec!["P2b"], vec!["P3a"]]
    );
}

// ═══════════════════════════════════════════════════════
// RESCAN AFTER MUTATION
// ═══════════════════════════════════════════════════════

#[test]
fn test_05_rescan_survives_reordering() {
    let mut driver = FixtureDriver::new(vec![vec![
        row("A", "A1", "2021-06-01T10:00"),
        row("B", "B1", "2021-06-01T10:00"),
        row("A", "A2", "2021-06-01T10:00"),
        row("C", "C1", "2021-06-01T10:00"),
        row("A", "A3", "2021-06-01T10:00"),
    ]]);
    driver.reverse_after_delete = true;

    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    controller.run(&creds()).unwrap();

    let mut remaining = controller.driver().remaining_titles().remove(0);
    remaining.sort();
    assert_eq!(remaining, vec!["B1", "C1"]);

    let mut deleted: Vec<String> = log.entries().into_iter().map(|e| e.track_title).collect();
    deleted.sort();
    assert_eq!(deleted, vec!["A1", "A2", "A3"]);
}

// ═══════════════════════════════════════════════════════
// DRY RUN
// ═══════════════════════════════════════════════════════

fn dry_run_fixture() -> Vec<Vec<Row>> {
    vec![
        vec![
            row("A", "T1", "2021-06-01T10:00"),
            row("A", "T1", "2021-06-01T10:00"),
            row("B", "T2", "2021-06-01T23:00"),
            row("A", "T3", "2021-06-02T10:00"),
        ],
        vec![
            row("Z", "Z1", "2021-05-01T10:00"),
            row("A", "T4", "2021-05-01T10:00"),
        ],
    ]
}

#[test]
fn test_06_dry_run_matches_real_run_without_mutation() {
    let dry_log = SharedBuf::default();
    let mut dry = DeletionController::new(
        FixtureDriver::new(dry_run_fixture()),
        artists(&["A"]),
        options(true, 10),
        DeletionLogSink::from_writer(dry_log.clone()),
    )
    .unwrap();
    let dry_summary = dry.run(&creds()).unwrap();

    let real_log = SharedBuf::default();
    let mut real = DeletionController::new(
        FixtureDriver::new(dry_run_fixture()),
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(real_log.clone()),
    )
    .unwrap();
    let real_summary = real.run(&creds()).unwrap();

    assert_eq!(dry.driver().delete_calls, 0);
    assert_eq!(dry.driver().pages, dry_run_fixture());
    assert!(dry_summary.dry_run);
    assert_eq!(dry_summary.deletions, real_summary.deletions);
    assert_eq!(dry_summary.deletions, 4);
    assert_eq!(dry_log.entries(), real_log.entries());
}

#[test]
fn test_07_dry_run_respects_budget() {
    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        FixtureDriver::new(dry_run_fixture()),
        artists(&["A"]),
        options(true, 2),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.deletions, 2);
    assert_eq!(summary.outcome, RunOutcome::BudgetReached);
    assert_eq!(titles(&log.entries()), vec!["T1", "T1"]);
}

// ═══════════════════════════════════════════════════════
// RETRIES
// ═══════════════════════════════════════════════════════

#[test]
fn test_08_login_gives_up_after_twelve_attempts() {
    let mut driver = FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]);
    driver.login_obstructions = None;
    let sleeper = RecordingSleeper::default();

    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap()
    .with_sleeper(sleeper.clone());

    let err = controller.run(&creds()).unwrap_err();

    assert!(matches!(err, UnscrobblerError::LoginObstructed { attempts: 12 }));
    assert_eq!(controller.state(), RunState::Failed);
    assert_eq!(controller.driver().login_calls, 12);
    assert_eq!(sleeper.count(), 11);
    assert!(controller.driver().navigations.is_empty());
    assert!(controller.driver().closed);
}

#[test]
fn test_09_login_recovers_after_obstruction() {
    let mut driver = FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]);
    driver.login_obstructions = Some(3);

    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(controller.driver().login_calls, 4);
    assert_eq!(summary.deletions, 1);
}

#[test]
fn test_10_transient_delete_failure_is_retried_on_same_record() {
    let mut driver = FixtureDriver::new(vec![vec![
        row("A", "T1", "2021-06-01T10:00"),
        row("A", "T2", "2021-06-01T11:00"),
    ]]);
    driver.flaky_titles.insert("T1".to_string(), 4);
    let sleeper = RecordingSleeper::default();
    let log = SharedBuf::default();

    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap()
    .with_sleeper(sleeper.clone());

    let summary = controller.run(&creds()).unwrap();

    assert_eq!(summary.deletions, 2);
    assert_eq!(controller.driver().delete_calls, 6);
    assert_eq!(sleeper.count(), 4);
    assert_eq!(titles(&log.entries()), vec!["T1", "T2"]);
}

#[test]
fn test_11_bounded_delete_retry_gives_up() {
    let mut driver = FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]);
    driver.flaky_titles.insert("T1".to_string(), u32::MAX);
    let log = SharedBuf::default();

    let mut opts = options(false, 10);
    opts.delete_retry = RetryPolicy::bounded(3, Duration::ZERO);
    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        opts,
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    let err = controller.run(&creds()).unwrap_err();
    assert!(matches!(
        err,
        UnscrobblerError::DeleteRetriesExhausted { attempts: 3, .. }
    ));
    assert_eq!(controller.budget().deletions(), 0);
    assert!(log.entries().is_empty());
}

#[test]
fn test_12_dry_run_never_touches_flaky_delete() {
    let mut driver = FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]);
    driver.flaky_titles.insert("T1".to_string(), u32::MAX);

    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(true, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.deletions, 1);
    assert_eq!(controller.driver().delete_calls, 0);
}

// ═══════════════════════════════════════════════════════
// SCAN ERRORS
// ═══════════════════════════════════════════════════════

#[test]
fn test_13_unparsable_row_fails_the_run() {
    let driver = FixtureDriver::new(vec![vec![
        row("A", "T1", "2021-06-01T10:00"),
        Row {
            artist: "B".to_string(),
            title: "T2".to_string(),
            timestamp: None,
        },
    ]]);
    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    let err = controller.run(&creds()).unwrap_err();
    assert!(matches!(err, UnscrobblerError::Scan { page: 1, row: 2, .. }));
    assert_eq!(controller.state(), RunState::Failed);
    assert_eq!(controller.driver().delete_calls, 0);
    assert!(log.entries().is_empty());
    assert!(controller.driver().closed);
}

// ═══════════════════════════════════════════════════════
// PAGINATION
// ═══════════════════════════════════════════════════════

fn three_pages() -> Vec<Vec<Row>> {
    (1..=3)
        .map(|p| vec![row("A", &format!("P{p}"), "2021-06-01T10:00")])
        .collect()
}

#[test]
fn test_14_max_page_stops_walk() {
    let mut opts = options(false, 10);
    opts.max_page = Some(2);
    let mut controller = DeletionController::new(
        FixtureDriver::new(three_pages()),
        artists(&["A"]),
        opts,
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.deletions, 2);
    assert_eq!(controller.driver().navigations, vec![1, 2]);
}

#[test]
fn test_15_start_page_skips_earlier_pages() {
    let mut opts = options(false, 10);
    opts.start_page = 2;
    let mut controller = DeletionController::new(
        FixtureDriver::new(three_pages()),
        artists(&["A"]),
        opts,
        DeletionLogSink::disabled(),
    )
    .unwrap();

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.deletions, 2);
    assert_eq!(controller.driver().navigations, vec![2, 3]);
    assert_eq!(controller.driver().remaining_titles()[0], vec!["P1"]);
}

#[test]
fn test_16_year_and_hour_precedence_in_loop() {
    let driver = FixtureDriver::new(vec![vec![
        row("A", "late-2020", "2020-01-01T23:00"),
        row("A", "noon-2020", "2020-01-01T12:00"),
        row("A", "late-2019", "2019-01-01T23:00"),
    ]]);
    let filter = artists(&["A"])
        .with_hour_range(Some(HourRange::new(22, 2).unwrap()))
        .with_year(Some(2019));
    let log = SharedBuf::default();
    let mut controller = DeletionController::new(
        driver,
        filter,
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();

    controller.run(&creds()).unwrap();
    assert_eq!(titles(&log.entries()), vec!["late-2019"]);
}

// ═══════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════

#[test]
fn test_17_cancel_during_retry_leaves_record_unlogged() {
    let mut driver = FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]);
    driver.flaky_titles.insert("T1".to_string(), u32::MAX);
    let log = SharedBuf::default();

    let controller = DeletionController::new(
        driver,
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::from_writer(log.clone()),
    )
    .unwrap();
    let flag = controller.cancel_flag();
    let mut controller = controller.with_sleeper(CancellingSleeper(flag));

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert_eq!(summary.deletions, 0);
    assert_eq!(controller.driver().delete_calls, 1);
    assert!(log.entries().is_empty());
    assert!(controller.driver().closed);
}

#[test]
fn test_18_cancel_before_start_skips_navigation() {
    let mut controller = DeletionController::new(
        FixtureDriver::new(three_pages()),
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();
    controller.cancel_flag().store(true, Ordering::SeqCst);

    let summary = controller.run(&creds()).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Interrupted);
    assert!(controller.driver().navigations.is_empty());
    assert_eq!(controller.driver().delete_calls, 0);
}

// ═══════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════

#[test]
fn test_19_every_page_passes_through_paging_state() {
    let mut controller = DeletionController::new(
        FixtureDriver::new(three_pages()),
        artists(&["Nobody"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    controller.run(&creds()).unwrap();

    let per_page = [
        RunState::PagingThroughListing,
        RunState::ScanningPage,
        RunState::AdvancingPage,
    ];
    let mut expected = vec![RunState::LoggingIn];
    for _ in 0..3 {
        expected.extend_from_slice(&per_page);
    }
    expected.push(RunState::Done);
    assert_eq!(controller.history(), expected.as_slice());
}

#[test]
fn test_20_deletions_return_to_scanning_on_the_same_page() {
    let mut controller = DeletionController::new(
        FixtureDriver::new(vec![vec![row("A", "T1", "2021-06-01T10:00")]]),
        artists(&["A"]),
        options(false, 10),
        DeletionLogSink::disabled(),
    )
    .unwrap();

    controller.run(&creds()).unwrap();
    assert_eq!(
        controller.history(),
        &[
            RunState::LoggingIn,
            RunState::PagingThroughListing,
            RunState::ScanningPage,
            RunState::DeletingMatches,
            RunState::ScanningPage,
            RunState::AdvancingPage,
            RunState::Done,
        ]
    );
}
