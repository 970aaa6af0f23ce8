//! Command-line options, validation, and resolution into a run configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::Args;

use unscrobbler::{Credentials, FilterConfig, HourRange, RunOptions};

pub const USERNAME_VAR: &str = "LASTFM_USERNAME";
pub const PASSWORD_VAR: &str = "LASTFM_PASSWORD";

/// Options for a pruning run.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path of a newline-delimited list of artists to remove. Combined with
    /// --titles-file, scrobbles matching either list are removed.
    #[arg(short, long)]
    pub artists_file: Option<PathBuf>,

    /// Path of a newline-delimited list of track titles to remove.
    #[arg(short, long)]
    pub titles_file: Option<PathBuf>,

    /// Actually delete. Without this flag nothing is removed.
    #[arg(long)]
    pub no_dry_run: bool,

    /// Only remove scrobbles from this year.
    #[arg(long, allow_negative_numbers = true)]
    pub year: Option<i64>,

    /// Library page to start at.
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    /// Library page to end at (0 for no limit).
    #[arg(long, default_value_t = 20)]
    pub max_page: u32,

    /// First hour of the day (0-23) in which to remove scrobbles. Requires --last-hr.
    #[arg(long, allow_negative_numbers = true)]
    pub first_hr: Option<i64>,

    /// Last hour of the day (0-23) in which to remove scrobbles. Requires --first-hr.
    #[arg(long, allow_negative_numbers = true)]
    pub last_hr: Option<i64>,

    /// Directory for the deletion log and the driver diagnostics log.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Maximum number of scrobbles to remove.
    #[arg(short, long, default_value_t = 100, allow_negative_numbers = true)]
    pub max_removals: i64,

    /// Listing snapshot (JSON) to run against.
    #[arg(long)]
    pub listing: Option<PathBuf>,
}

/// A fully validated run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Credentials,
    pub filter: FilterConfig,
    pub options: RunOptions,
    pub log_dir: Option<PathBuf>,
    pub listing: PathBuf,
}

impl RunConfig {
    pub fn dry_run(&self) -> bool {
        self.options.dry_run
    }
}

/// Reasons a run is refused before it starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("At least one of --artists-file or --titles-file must be given.")]
    NoFilterLists,

    #[error("Given --year '{0}' seems incorrect.")]
    Year(i64),

    #[error("--first-hr and --last-hr must be used together.")]
    HoursNotPaired,

    #[error("--first-hr and --last-hr must be between 0-23 (inclusive).")]
    HourOutOfRange,

    #[error("--max-removals must be a positive number.")]
    MaxRemovals,

    #[error("Cannot read {flag} '{}': {source}", .path.display())]
    ListFile {
        flag: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("The given artist and title lists are both empty.")]
    EmptyLists,

    #[error("Last.fm username & password must be set using the LASTFM_USERNAME and LASTFM_PASSWORD environment variables.")]
    MissingCredentials,

    #[error("A listing snapshot must be given with --listing.")]
    NoListing,

    #[error("Cannot create log file '{}': {reason}", .path.display())]
    LogFile { path: PathBuf, reason: String },
}

impl RunConfig {
    /// Validate `args` and read the filter lists. `env` looks up environment
    /// variables.
    pub fn from_args(
        args: &RunArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if args.artists_file.is_none() && args.titles_file.is_none() {
            return Err(ConfigError::NoFilterLists);
        }

        let year = match args.year {
            Some(y) if !(1970..=2999).contains(&y) => return Err(ConfigError::Year(y)),
            Some(y) => Some(y as i32),
            None => None,
        };

        let hour_range = match (args.first_hr, args.last_hr) {
            (None, None) => None,
            (Some(first), Some(last)) => {
                let hour = |h: i64| u32::try_from(h).map_err(|_| ConfigError::HourOutOfRange);
                let range = HourRange::new(hour(first)?, hour(last)?)
                    .map_err(|_| ConfigError::HourOutOfRange)?;
                Some(range)
            }
            _ => return Err(ConfigError::HoursNotPaired),
        };

        if args.max_removals <= 0 {
            return Err(ConfigError::MaxRemovals);
        }
        let max_removals = u32::try_from(args.max_removals).unwrap_or(u32::MAX);

        let credentials = resolve_credentials(env)?;
        let listing = args.listing.clone().ok_or(ConfigError::NoListing)?;

        let artists = match &args.artists_file {
            Some(path) => read_name_list(path, "--artists-file")?,
            None => HashSet::new(),
        };
        let titles = match &args.titles_file {
            Some(path) => read_name_list(path, "--titles-file")?,
            None => HashSet::new(),
        };
        let filter = FilterConfig::new(artists, titles)
            .map_err(|_| ConfigError::EmptyLists)?
            .with_year(year)
            .with_hour_range(hour_range);

        let options = RunOptions {
            dry_run: !args.no_dry_run,
            start_page: args.start_page.max(1),
            max_page: (args.max_page > 0).then_some(args.max_page),
            max_removals,
            ..Default::default()
        };

        Ok(Self {
            credentials,
            filter,
            options,
            log_dir: args.log_dir.clone(),
            listing,
        })
    }
}

/// Read credentials from the environment. Empty values count as missing.
pub fn resolve_credentials(
    env: impl Fn(&str) -> Option<String>,
) -> Result<Credentials, ConfigError> {
    let username = env(USERNAME_VAR).filter(|v| !v.is_empty());
    let password = env(PASSWORD_VAR).filter(|v| !v.is_empty());
    match (username, password) {
        (Some(u), Some(p)) => Ok(Credentials::new(u, p)),
        _ => Err(ConfigError::MissingCredentials),
    }
}

/// Read a newline-delimited list of exact names. Line endings are stripped;
/// blank lines are ignored.
pub fn read_name_list(path: &Path, flag: &'static str) -> Result<HashSet<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ListFile {
        flag,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
