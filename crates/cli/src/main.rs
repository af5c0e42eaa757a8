mod dialects;
mod error_presentation;
mod logging;

use std::{path::PathBuf, process::ExitCode};

use applyalter_core::{ApplyOptions, Orchestrator, RunMode, renderer};
use applyalter_loader::{DbConfigFile, load_alterscripts};
use clap::Parser;
use tracing::info;

use crate::error_presentation::{CliError, CliResult, render_runtime_error};

#[derive(Debug, Parser)]
#[command(
    name = "applyalter",
    version,
    about = "Applies alterscripts to the configured database instances",
    after_help = dialects::engines_help()
)]
struct Args {
    /// Database configuration (YAML).
    dbconfig: PathBuf,
    /// Alterscript files or directories, applied in this order.
    #[arg(required = true)]
    alters: Vec<PathBuf>,
    /// commit (alias sharp), dry, print or look.
    #[arg(short = 'r', long, default_value = "commit")]
    run_mode: RunMode,
    /// Collect failures and continue with the next instance.
    #[arg(short = 'i', long)]
    ignore_failures: bool,
    /// Recorded in the log table; defaults to the login name.
    #[arg(short = 'u', long)]
    username: Option<String>,
    /// Overrides the environment of the database configuration.
    #[arg(short = 'e', long)]
    environment: Option<String>,
    /// Skip alterscripts already recorded in the log table.
    #[arg(long)]
    incremental: bool,
    /// Do not validate checks and migration parameters before applying.
    #[arg(short = 'n', long)]
    no_validate: bool,
    /// Neither create nor write the log tables.
    #[arg(short = 'L', long)]
    no_log_table: bool,
    /// Also write events as JSON lines to this file.
    #[arg(short = 'o', long)]
    log_output: Option<PathBuf>,
    /// Print failures with their debug representation.
    #[arg(short = 'p', long)]
    print_stacktrace: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match logging::init(args.log_output.as_deref()).and_then(|()| run(&args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let code = error.exit_code();
            if args.print_stacktrace {
                eprintln!("{error:?}");
            } else {
                eprintln!("{}", render_runtime_error(error));
            }
            code
        }
    }
}

fn run(args: &Args) -> CliResult<()> {
    let username = resolve_username(args.username.as_deref())?;
    let mut config = DbConfigFile::load(&args.dbconfig)
        .and_then(|file| file.into_db_config(dialects::resolve))
        .map_err(CliError::DbConfig)?;
    let loaded = load_alterscripts(args.alters.as_slice()).map_err(CliError::Alterscripts)?;

    let options = ApplyOptions {
        run_mode: args.run_mode,
        ignore_failures: args.ignore_failures,
        username,
        environment: args.environment.clone(),
        incremental: args.incremental,
        use_log_table: !args.no_log_table,
    };
    info!(
        run_mode = %options.run_mode,
        ignore_failures = options.ignore_failures,
        alterscripts = loaded.alterscripts.len(),
        "applyalter started"
    );

    let mut orchestrator =
        Orchestrator::new(&mut config, options).with_package_hash(loaded.bundle_hash);
    if args.no_validate {
        orchestrator = orchestrator.without_validation();
    }
    let report = orchestrator.apply(&loaded.alterscripts)?;

    if args.run_mode == RunMode::Look {
        print!("Unapplied alters:\n{}", renderer::render_unapplied(&report.unapplied));
    }
    println!("{}", renderer::render_summary(&report));
    Ok(())
}

fn resolve_username(explicit: Option<&str>) -> CliResult<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .filter(|name| !name.trim().is_empty())
        .ok_or(CliError::MissingUsername)
}
