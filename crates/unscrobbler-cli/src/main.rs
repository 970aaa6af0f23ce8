//! Unscrobbler — entry point.

use clap::{CommandFactory, Parser};

use unscrobbler::Credentials;
use unscrobbler_cli::cli::{Cli, Commands};
use unscrobbler_cli::{
    init_tracing, run_pruning, run_stamp, validate_snapshot, RunConfig, RunLogFiles,
    SnapshotDriver,
};

const EXIT_ERROR: i32 = 1;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(args) = cli.run_args() {
        let config = match RunConfig::from_args(args, |key| std::env::var(key).ok()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(EXIT_ERROR);
            }
        };

        let stamp = run_stamp(chrono::Local::now().naive_local());
        let mut logs = match RunLogFiles::open(config.log_dir.as_deref(), &stamp, config.dry_run())
        {
            Ok(logs) => logs,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(EXIT_ERROR);
            }
        };

        init_tracing(&cli.log_level, logs.driver_log.take());
        logs.announce();

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };

        if let Err(e) = run_pruning(config, logs.deletion_sink, shutdown).await {
            tracing::error!("{e:#}");
            std::process::exit(EXIT_ERROR);
        }
        return Ok(());
    }

    match cli.command {
        Some(Commands::Validate { listing }) => {
            init_tracing(&cli.log_level, None);
            let mut driver = SnapshotDriver::load(&listing)?;
            match validate_snapshot(&mut driver, &Credentials::new("validate", "")) {
                Ok(reports) => {
                    println!("Valid listing snapshot: {}", listing.display());
                    for report in reports {
                        println!(
                            "  Page {}: {} records ({} .. {})",
                            report.page,
                            report.records,
                            report.newest.as_deref().unwrap_or("-"),
                            report.oldest.as_deref().unwrap_or("-")
                        );
                    }
                }
                Err(e) => {
                    eprintln!("Invalid listing snapshot: {e}");
                    std::process::exit(EXIT_ERROR);
                }
            }
        }

        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "unscrobbler", &mut std::io::stdout());
        }

        None | Some(Commands::Run { .. }) => {}
    }

    Ok(())
}
