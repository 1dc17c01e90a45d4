use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use taskpeek_core::prelude::*;
use taskpeek_protocol::LineFramer;
use taskpeek_utils::{error, info, init_logging_with, warn, LogConfig, LogFormat, LogLevel, LoggingGuard};

/// Launch a program and read the memory it asks about over its standard output.
#[derive(Parser, Debug)]
#[command(name = "taskpeek")]
#[command(version)]
#[command(
    about = "A minimal out-of-process memory inspector",
    long_about = "Launch PROGRAM with its stdout connected to taskpeek. Each line it prints of the form \
                  `<hex-address> <type-tag>` is answered by reading that many bytes from its memory."
)]
struct Cli
{
    /// Path to the program to launch and inspect
    program: PathBuf,

    /// argv[0] handed to the target (it receives no other arguments)
    #[arg(long, default_value = InspectorConfig::DEFAULT_ARGV0)]
    argv0: String,

    /// How long one channel poll may block, in milliseconds
    #[arg(long, env = "TASKPEEK_POLL_INTERVAL_MS", default_value_t = 250)]
    poll_interval_ms: u64,

    /// Longest request line accepted from the target, in bytes
    #[arg(long, default_value_t = LineFramer::DEFAULT_MAX_LEN)]
    max_message_len: usize,

    /// Upper bound on a single memory read, in bytes
    #[arg(long, default_value_t = InspectorConfig::DEFAULT_MAX_READ_SIZE)]
    max_read_size: usize,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Log format (pretty or json)
    #[arg(long, env = "TASKPEEK_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli
{
    fn log_config(&self) -> LogConfig
    {
        let from_env = LogConfig::from_env();
        LogConfig {
            level: self.log_level,
            format: self.log_format.unwrap_or(from_env.format),
            ..from_env
        }
    }

    fn inspector_config(&self) -> InspectorConfig
    {
        InspectorConfig {
            argv0: self.argv0.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_message_len: self.max_message_len,
            max_read_size: self.max_read_size,
            ..InspectorConfig::default()
        }
    }
}

fn main() -> ExitCode
{
    // clap exits with status 2 on usage errors.
    let cli = Cli::parse();

    // Held until main returns so buffered file output is flushed.
    let _guard: LoggingGuard = match init_logging_with(&cli.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(reason) if reason.is_clean() => ExitCode::SUCCESS,
        Ok(reason) => {
            error!("Inspector stopped: {:?}", reason);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> PeekResult<ExitReason>
{
    let config = cli.inspector_config();
    config.validate()?;

    let engine = create_engine()?;
    info!("Using {} debug engine", engine.name());

    let (mut target, mut channel) = Launcher::new(&config).launch(&cli.program)?;
    info!("Launched {} (PID: {})", target.program().display(), target.pid());

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("Cannot install interrupt handler: {}", e);
    }

    let exit_grace = config.exit_grace;
    let mut inspector = Inspector::for_target(engine, config, &target)?.with_shutdown_flag(shutdown);
    let reason = inspector.run(&mut channel, &mut target);

    if reason == ExitReason::ShutdownRequested {
        stop_target(&mut target, exit_grace);
    }

    Ok(reason)
}

/// SIGTERM the target, then SIGKILL it if it is still around after `grace`.
fn stop_target(target: &mut TargetProcess, grace: Duration)
{
    if target.exit_status().is_some() {
        return;
    }

    if let Err(e) = target.terminate() {
        warn!("Cannot terminate PID {}: {}", target.pid(), e);
        return;
    }

    match target.wait_timeout(grace) {
        Ok(Some(status)) => info!("Target {}", status),
        Ok(None) => {
            warn!("PID {} ignored SIGTERM, killing it", target.pid());
            if let Err(e) = target.kill().and_then(|()| target.wait_timeout(grace)) {
                warn!("Cannot kill PID {}: {}", target.pid(), e);
            }
        }
        Err(e) => warn!("Cannot reap PID {}: {}", target.pid(), e),
    }
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_inspector_config()
    {
        let cli = Cli::try_parse_from(["taskpeek", "./target-program"]).unwrap();
        let config = cli.inspector_config();

        assert_eq!(cli.program, PathBuf::from("./target-program"));
        assert_eq!(config.argv0, InspectorConfig::DEFAULT_ARGV0);
        assert_eq!(config.max_message_len, 128);
        assert_eq!(config.max_read_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_flags()
    {
        let cli = Cli::try_parse_from([
            "taskpeek",
            "--argv0",
            "probe",
            "--poll-interval-ms",
            "10",
            "--max-read-size",
            "64",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "/bin/true",
        ])
        .unwrap();

        let config = cli.inspector_config();
        assert_eq!(config.argv0, "probe");
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.max_read_size, 64);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_config().format, LogFormat::Json);
    }

    #[test]
    fn rejects_bad_usage()
    {
        assert!(Cli::try_parse_from(["taskpeek"]).is_err());
        assert!(Cli::try_parse_from(["taskpeek", "--log-level", "loud", "/bin/true"]).is_err());
    }
}
