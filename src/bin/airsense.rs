//! airsense CLI - offline tooling for the automatic context engine
//!
//! Commands:
//! - replay: Replay a recorded sensor trace and emit one context record per tick
//! - run: Stream sensor events from stdin and emit context records as ticks fall due
//! - validate: Check a sensor trace for malformed or out-of-order events
//! - doctor: Check configuration and cadence before a recording
//! - config: Print the default engine configuration

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use airsense_context::replay::{ContextRecord, SensorEvent, TraceReader};
use airsense_context::{
    EngineConfig, EngineError, RecordingCadence, RecordingSession, ENGINE_VERSION, PRODUCER_NAME,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// airsense - automatic context inference from GPS and accelerometer streams
#[derive(Parser)]
#[command(name = "airsense")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Infer stationary/walking/driving/red-light context from sensor traces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded sensor trace (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Recording cadence (e.g. "500ms", "10s", "1m")
        #[arg(long, default_value = "10s")]
        cadence: String,

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Stream NDJSON sensor events from stdin (streaming mode)
    Run {
        /// Recording cadence (e.g. "500ms", "10s", "1m")
        #[arg(long, default_value = "10s")]
        cadence: String,

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Flush output after each batch of records (--flush false to buffer)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        flush: bool,
    },

    /// Validate a sensor trace
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and environment
    Doctor {
        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Recording cadence to check
        #[arg(long, default_value = "10s")]
        cadence: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default engine configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one context record per line)
    Ndjson,
    /// JSON array of context records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("airsense_context=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AirsenseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            cadence,
            config,
        } => cmd_replay(
            &input,
            &output,
            input_format,
            output_format,
            &cadence,
            config.as_deref(),
        ),

        Commands::Run {
            cadence,
            config,
            flush,
        } => cmd_run(&cadence, config.as_deref(), flush),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor {
            config,
            cadence,
            json,
        } => cmd_doctor(config.as_deref(), &cadence, json),

        Commands::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    cadence: &str,
    config: Option<&Path>,
) -> Result<(), AirsenseCliError> {
    let config = load_config(config)?;
    let cadence = RecordingCadence::parse(cadence)?;
    let events = read_events(input, &input_format)?;

    if events.is_empty() {
        return Err(AirsenseCliError::NoEvents);
    }

    let records = TraceReader::replay(&events, config, cadence)?;
    info!(
        events = events.len(),
        ticks = records.len(),
        "trace replayed"
    );

    let output_data = format_output(&records, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_run(cadence: &str, config: Option<&Path>, flush: bool) -> Result<(), AirsenseCliError> {
    let config = load_config(config)?;
    let cadence = RecordingCadence::parse(cadence)?;
    let mut session = RecordingSession::new(config, cadence)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut records: Vec<ContextRecord> = Vec::new();
    let mut last_ts: Option<i64> = None;

    for (line_num, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let event: SensorEvent = serde_json::from_str(trimmed).map_err(|e| {
            AirsenseCliError::ParseError(format!("line {}: {}", line_num + 1, e))
        })?;
        let ts = event.timestamp_ms();

        if !session.is_active() {
            session.start(ts);
        }

        // Ticks that fell due before this event are resolved first
        TraceReader::drain_ticks(&mut session, ts, &mut records);
        write_records(&mut stdout, &mut records, flush)?;

        match event {
            SensorEvent::Gps(fix) => {
                session.on_gps_fix(&fix);
            }
            SensorEvent::Accel(sample) => {
                session.on_accel_sample(&sample);
            }
        }
        last_ts = Some(last_ts.map_or(ts, |t| t.max(ts)));
    }

    if let Some(ts) = last_ts {
        TraceReader::drain_ticks(&mut session, ts, &mut records);
        write_records(&mut stdout, &mut records, true)?;
    }
    debug!(ticks = session.tick_count(), "input exhausted");
    session.stop();

    Ok(())
}

fn write_records(
    out: &mut impl Write,
    records: &mut Vec<ContextRecord>,
    flush: bool,
) -> Result<(), AirsenseCliError> {
    if records.is_empty() {
        return Ok(());
    }
    for record in records.drain(..) {
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }
    if flush {
        out.flush()?;
    }
    Ok(())
}

fn cmd_validate(
    input: &Path,
    input_format: InputFormat,
    json: bool,
) -> Result<(), AirsenseCliError> {
    let events = read_events(input, &input_format)?;
    let issues = TraceReader::validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - issues.len(),
        invalid_events: issues.len(),
        errors: issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                timestamp_ms: issue.timestamp_ms,
                error: issue.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Event at {} ms (index {}): {}",
                    err.timestamp_ms, err.index, err.error
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(AirsenseCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, cadence: &str, json: bool) -> Result<(), AirsenseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("airsense-context version {}", ENGINE_VERSION),
    });

    match config {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist, defaults will be used".to_string(),
        }),
        Some(path) => match load_config(Some(path)) {
            Ok(_) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Config file {} is valid", path.display()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using default thresholds".to_string(),
        }),
    }

    match RecordingCadence::parse(cadence) {
        Ok(c) => checks.push(DoctorCheck {
            name: "cadence".to_string(),
            status: CheckStatus::Ok,
            message: format!("Sampling tick every {} ms", c.period_ms()),
        }),
        Err(e) => checks.push(DoctorCheck {
            name: "cadence".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    // Check stdin is available (for streaming mode)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("airsense Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(AirsenseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, AirsenseCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_events(
    input: &Path,
    input_format: &InputFormat,
) -> Result<Vec<SensorEvent>, AirsenseCliError> {
    let input_data = read_input(input)?;
    let events = match input_format {
        InputFormat::Ndjson => TraceReader::parse_ndjson(&input_data)?,
        InputFormat::Json => TraceReader::parse_array(&input_data)?,
    };
    Ok(events)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, AirsenseCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn format_output(
    records: &[ContextRecord],
    format: &OutputFormat,
) -> Result<String, AirsenseCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum AirsenseCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for AirsenseCliError {
    fn from(e: io::Error) -> Self {
        AirsenseCliError::Io(e)
    }
}

impl From<EngineError> for AirsenseCliError {
    fn from(e: EngineError) -> Self {
        AirsenseCliError::Engine(e)
    }
}

impl From<serde_json::Error> for AirsenseCliError {
    fn from(e: serde_json::Error) -> Self {
        AirsenseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AirsenseCliError> for CliError {
    fn from(e: AirsenseCliError) -> Self {
        match e {
            AirsenseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AirsenseCliError::Engine(e) => {
                let (code, hint) = match e {
                    EngineError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'airsense config' for the default layout")
                    }
                    EngineError::InvalidCadence(_) => {
                        ("CADENCE_ERROR", "Use a duration such as 500ms, 10s or 1m")
                    }
                    EngineError::JsonError(_) | EngineError::ParseError(_) => {
                        ("PARSE_ERROR", "Ensure each event has a type of gps or accel")
                    }
                    EngineError::InvalidEvent(_) => {
                        ("VALIDATION_ERROR", "Run 'airsense validate' for details")
                    }
                    EngineError::SessionNotActive => {
                        ("SESSION_ERROR", "Start the recording session first")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            AirsenseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AirsenseCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            AirsenseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            AirsenseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            AirsenseCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    timestamp_ms: i64,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_flush(args: &[&str]) -> bool {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run { flush, .. } => flush,
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_run_flush_flag() {
        assert!(run_flush(&["airsense", "run"]));
        assert!(run_flush(&["airsense", "run", "--flush", "true"]));
        assert!(!run_flush(&["airsense", "run", "--flush", "false"]));
    }

    #[test]
    fn test_write_records_drains_buffer() {
        let mut session =
            RecordingSession::new(EngineConfig::default(), RecordingCadence::default()).unwrap();
        session.start(0);
        let mut records = Vec::new();
        TraceReader::drain_ticks(&mut session, 20_000, &mut records);
        assert_eq!(records.len(), 2);

        let mut out = Vec::new();
        write_records(&mut out, &mut records, false).unwrap();
        assert!(records.is_empty());
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }
}
