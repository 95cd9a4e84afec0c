//! `depot`: keep repository metadata and checksums consistent with the files
//! on disk.

mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use depot_checksum::ChecksumStatus;
use depot_engine::{Depot, JobReport, JobScope, Orchestrator};
use depot_layout::Coordinate;
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "depot", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the platform
    /// configuration directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging. Repeat for more (-v, -vv). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regenerate checksum sidecars, and metadata when a base path is given.
    Regenerate {
        #[arg(long)]
        storage: Option<String>,
        /// Ignored without `--storage`.
        #[arg(long)]
        repository: Option<String>,
        /// Ignored without `--repository`.
        #[arg(long)]
        base_path: Option<PathBuf>,
        /// Overwrite existing sidecars instead of only filling in missing ones.
        #[arg(long)]
        force: bool,
    },
    /// Rebuild metadata documents from the files on disk.
    Rebuild {
        storage: String,
        repository: String,
        base_path: Option<PathBuf>,
    },
    /// Print the metadata document of an artifact.
    Show {
        storage: String,
        repository: String,
        /// `group:artifact[:version]`
        coordinate: String,
    },
    /// Compare a file's checksum sidecars with its contents.
    Verify {
        storage: String,
        repository: String,
        path: PathBuf,
    },
    /// Run a job from the configuration file.
    RunJob { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        },
    }
}

/// `Ok(false)` when the command ran but something in it failed.
async fn run(cli: Cli) -> Result<bool> {
    let configuration = depot_config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Configuration)?;
    debug!(storages = configuration.storages().len(), "configuration loaded");
    let depot = Depot::with_defaults(configuration).or_raise(|| ErrorKind::Operation)?;

    match cli.command {
        Command::Regenerate {
            storage,
            repository,
            base_path,
            force,
        } => {
            let scope = JobScope {
                storage_id: storage,
                repository_id: repository,
                base_path,
                force_regeneration: force,
            }
            .normalized();
            let report = Orchestrator::new(depot).run_job("regenerate", &scope, &print_report).await;
            Ok(report.is_success())
        },
        Command::Rebuild {
            storage,
            repository,
            base_path,
        } => {
            let summary = depot
                .rebuild_metadata(&storage, &repository, base_path.as_deref())
                .await
                .or_raise(|| ErrorKind::Operation)?;
            println!(
                "{} written, {} removed, {} version directories skipped",
                summary.documents_written, summary.documents_removed, summary.versions_skipped
            );
            Ok(summary.versions_skipped == 0)
        },
        Command::Show {
            storage,
            repository,
            coordinate,
        } => {
            let coordinate = parse_ga(&coordinate)?;
            match depot.get_metadata(&storage, &repository, &coordinate).await.or_raise(|| ErrorKind::Operation)? {
                Some(document) => {
                    let json = serde_json::to_string_pretty(&document).or_raise(|| ErrorKind::Operation)?;
                    println!("{json}");
                    Ok(true)
                },
                None => {
                    eprintln!("no metadata for {}", coordinate.ga());
                    Ok(false)
                },
            }
        },
        Command::Verify {
            storage,
            repository,
            path,
        } => {
            let report = depot.validate_checksum(&storage, &repository, &path).await.or_raise(|| ErrorKind::Operation)?;
            let mut clean = true;
            for (algorithm, status) in report {
                match status {
                    ChecksumStatus::Match => println!("{algorithm}: ok"),
                    ChecksumStatus::Missing => {
                        clean = false;
                        println!("{algorithm}: missing");
                    },
                    ChecksumStatus::Mismatch { expected, actual } => {
                        clean = false;
                        println!("{algorithm}: MISMATCH (sidecar {expected}, file {actual})");
                    },
                }
            }
            Ok(clean)
        },
        Command::RunJob { name } => {
            let report = Orchestrator::new(depot).run_configured(&name, &print_report).await;
            Ok(report.is_success())
        },
    }
}

/// Accept `group:artifact` as well as full coordinates.
fn parse_ga(text: &str) -> Result<Coordinate> {
    let text = match text.matches(':').count() {
        1 => format!("{text}:0"),
        _ => text.to_string(),
    };
    text.parse::<Coordinate>().or_raise(|| ErrorKind::InvalidArgument(text.clone()))
}

fn print_report(job: &str, report: &JobReport) {
    for target in &report.targets {
        let name = format!("{}/{}", target.target.storage_id, target.target.repository_id);
        if let Some(metadata) = &target.metadata {
            println!("{name}: {} metadata documents written", metadata.documents_written);
        }
        if let Some(checksums) = &target.checksums {
            println!(
                "{name}: {} files, {} failed, {} rewritten",
                checksums.files_processed, checksums.files_failed, checksums.files_rewritten
            );
            for failure in &checksums.failures {
                println!("  {}: {}", failure.path.display(), failure.reason);
            }
        }
        if let Some(error) = &target.error {
            println!("{name}: failed: {error}");
        }
    }
    for error in &report.errors {
        println!("{job}: {error}");
    }
    println!(
        "{job}: {} files processed, {} failed, {} rewritten",
        report.files_processed(),
        report.files_failed(),
        report.files_rewritten()
    );
}
