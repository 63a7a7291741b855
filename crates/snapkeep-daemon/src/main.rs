use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::prelude::*;

use snapkeep_daemon::errors::{exit_code, StartupError};
use snapkeep_daemon::logging::{self, LogSink};
use snapkeep_daemon::scheduler::Scheduler;
use snapkeep_daemon::{config, mount};
use snapkeep_sync::SyncExecutor;

#[derive(Parser)]
#[command(name = "snapkeepd", about = "Snapshot backup scheduler daemon")]
struct Cli {
    /// Path to the INI-style configuration file.
    config: PathBuf,

    /// Override the configured console log level for this run.
    #[arg(long)]
    console_loglevel: Option<String>,

    /// Parse and validate the configuration, then exit without starting
    /// the scheduler.
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let sink = Arc::new(LogSink::buffering());
    let console_level = cli
        .console_loglevel
        .as_deref()
        .and_then(logging::parse_loglevel)
        .unwrap_or(tracing::Level::INFO);
    let (stdout_layer, stderr_layer) = logging::console_layers(console_level);
    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(stderr_layer)
        .with(sink.clone())
        .init();

    match run(&cli, &sink) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli, sink: &LogSink) -> Result<i32, StartupError> {
    let conf = config::load(&cli.config)?;

    let file_level = logging::parse_loglevel(&conf.loglevel).unwrap_or(tracing::Level::INFO);
    sink.set_level(file_level);
    if let Err(e) = sink.attach_file(&conf.logfile_path) {
        tracing::error!(path = %conf.logfile_path.display(), error = %e, "failed to open log file, continuing with buffered logging only");
    }

    tracing::info!(
        repositories = conf.repositories.len(),
        mounts = conf.mounts.len(),
        "configuration loaded"
    );

    if cli.check_config {
        tracing::info!("configuration is valid, exiting (--check-config)");
        return Ok(exit_code::SUCCESS);
    }

    for spec in &conf.mounts {
        mount::establish(spec)?;
    }

    let executor = SyncExecutor::new(conf.rsync_cmd.clone());
    let scheduler = Scheduler::new(conf.repositories, executor);
    Ok(scheduler.run())
}
