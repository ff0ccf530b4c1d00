//! netwatch - network health monitor for unstable connections
//!
//! Loads configuration (file, then environment, then flags), wires the
//! system collaborator to the report sinks and runs the scheduler until
//! Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};

use netwatch_agent::config::{ConfigWarning, NetwatchConfig, ProcessEnv, ReportFormat};
use netwatch_agent::sink::{ConsoleSink, FanoutSink, FileSink};
use netwatch_agent::{Scheduler, Shutdown, SystemCollaborator};

#[derive(Debug, Parser)]
#[command(name = "netwatch", version, about = "Continuous network health diagnostics")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose diagnostics and per-probe metrics
    #[arg(short, long)]
    debug: bool,

    /// Run a single cycle and exit
    #[arg(long, conflicts_with = "cycles")]
    once: bool,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Also append the report to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write the log file as JSON lines
    #[arg(long)]
    json: bool,
}

/// File, then environment, then flags. Warnings are returned for logging once tracing is up.
fn load_config(cli: &Cli) -> Result<(NetwatchConfig, Vec<ConfigWarning>)> {
    let (mut config, mut warnings) =
        NetwatchConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    warnings.extend(config.apply_env(&ProcessEnv));
    if cli.debug {
        config.report.debug = true;
    }
    if let Some(path) = &cli.log_file {
        config.report.log_file = Some(path.clone());
    }
    if cli.json {
        config.report.format = ReportFormat::Json;
    }
    warnings.extend(config.validate());
    Ok((config, warnings))
}

fn max_level(config: &NetwatchConfig) -> Level {
    if config.report.debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env is optional
    let _ = dotenvy::dotenv();

    let (config, warnings) = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_max_level(max_level(&config))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    for warning in &warnings {
        warn!("{}", warning);
    }
    info!("Netwatch v{} starting", env!("CARGO_PKG_VERSION"));

    let show_metrics = config.report.debug;
    let mut sink = FanoutSink::new().push(ConsoleSink::new(show_metrics));
    if let Some(path) = &config.report.log_file {
        info!("Appending report to {}", path.display());
        // the console sink above already shows every event
        sink = sink.push(FileSink::new(path, config.report.format, show_metrics).without_fallback());
    }

    let collaborator = SystemCollaborator::new(config.bandwidth_state_path());

    let (trigger, shutdown) = Shutdown::channel();
    trigger.listen_for_signals();

    let max_cycles = if cli.once { Some(1) } else { cli.cycles };
    let mut scheduler = Scheduler::new(config, collaborator, sink);
    if let Some(n) = max_cycles {
        scheduler = scheduler.with_max_cycles(n);
    }

    let stats = scheduler.run(shutdown).await;
    info!("Netwatch stopped after {} cycles", stats.cycles);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["netwatch", "--once", "--json", "--log-file", "/tmp/netwatch.log"]);
        assert!(cli.once);
        assert!(cli.json);
        assert_eq!(cli.log_file, Some(PathBuf::from("/tmp/netwatch.log")));
        assert!(Cli::try_parse_from(["netwatch", "--once", "--cycles", "3"]).is_err());
    }

    #[test]
    fn test_config_file_debug_raises_level() {
        let (config, _) = NetwatchConfig::from_toml("[report]\ndebug = true\n").unwrap();
        assert_eq!(max_level(&config), Level::DEBUG);
        assert_eq!(max_level(&NetwatchConfig::default()), Level::INFO);
    }
}
