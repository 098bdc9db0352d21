//! Doomscroll CLI - command-line driver for the doomscroll engine
//!
//! Commands:
//! - run: Analyze session snapshots (file or stdin, batch or streaming)
//! - validate: Check snapshots against the input schema
//! - doctor: Diagnose configuration and environment
//! - config: Print the default configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use doomscroll_engine::sink::NudgeHistory;
use doomscroll_engine::{
    parse_snapshot, DoomscrollEngine, EngineConfig, ManualClock, SessionAnalysis, SessionSnapshot,
    ENGINE_VERSION, PRODUCER_NAME,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Doomscroll - hybrid doomscrolling detection and nudge escalation
#[derive(Parser)]
#[command(name = "doomscroll")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Score browsing snapshots for doomscrolling and escalate nudges", long_about = None)]
struct Cli {
    /// Log pipeline decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze session snapshots
    Run {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
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

        /// Engine configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Apply the per-session evaluation interval
        #[arg(long)]
        throttle: bool,

        /// Write the nudge history JSON to this file on exit
        #[arg(long)]
        save_nudge_log: Option<PathBuf>,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Validate session snapshots
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Engine configuration JSON file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one snapshot per line)
    Ndjson,
    /// JSON array of snapshots
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one analysis per line)
    Ndjson,
    /// JSON array of analyses
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), DoomCliError> {
    match cli.command {
        Commands::Run {
            input,
            output,
            input_format,
            output_format,
            config,
            throttle,
            save_nudge_log,
            flush,
        } => cmd_run(
            &input,
            &output,
            input_format,
            output_format,
            config.as_deref(),
            throttle,
            save_nudge_log.as_deref(),
            flush,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Config => {
            println!("{}", EngineConfig::default().to_json()?);
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    config_path: Option<&Path>,
    throttle: bool,
    save_nudge_log: Option<&Path>,
    flush: bool,
) -> Result<(), DoomCliError> {
    let config = match config_path {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    // Snapshot timestamps drive time so recorded sessions replay deterministically
    let clock = ManualClock::new(Utc::now());
    let history = Rc::new(RefCell::new(NudgeHistory::new(config.nudge_history_capacity)));
    let mut engine = DoomscrollEngine::with_clock(config, clock.clone())?.with_nudge_log(history.clone());

    let mut sink: Box<dyn Write> = if is_stdio(output) {
        Box::new(io::stdout())
    } else {
        Box::new(fs::File::create(output)?)
    };
    let mut collected: Vec<SessionAnalysis> = Vec::new();
    let mut processed = 0usize;

    let mut handle = |snapshot: SessionSnapshot| -> Result<(), DoomCliError> {
        clock.set(snapshot.captured_at().unwrap_or_else(Utc::now));
        processed += 1;

        let analysis = if throttle {
            engine.ingest(&snapshot)
        } else {
            Some(engine.analyze_session(&snapshot))
        };
        let Some(analysis) = analysis else {
            return Ok(());
        };

        match output_format {
            OutputFormat::Ndjson => {
                writeln!(sink, "{}", serde_json::to_string(&analysis)?)?;
                if flush {
                    sink.flush()?;
                }
            }
            OutputFormat::Json | OutputFormat::JsonPretty => collected.push(analysis),
        }
        Ok(())
    };

    match input_format {
        InputFormat::Ndjson => {
            let reader: Box<dyn BufRead> = if is_stdio(input) {
                Box::new(BufReader::new(io::stdin()))
            } else {
                Box::new(BufReader::new(fs::File::open(input)?))
            };

            for line in reader.lines() {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                handle(parse_snapshot(trimmed)?)?;
            }
        }
        InputFormat::Json => {
            let snapshots: Vec<SessionSnapshot> = serde_json::from_str(&read_input(input)?)?;
            for snapshot in snapshots {
                handle(snapshot)?;
            }
        }
    }

    if processed == 0 {
        return Err(DoomCliError::NoSnapshots);
    }

    match output_format {
        OutputFormat::Ndjson => {}
        OutputFormat::Json => writeln!(sink, "{}", serde_json::to_string(&collected)?)?,
        OutputFormat::JsonPretty => writeln!(sink, "{}", serde_json::to_string_pretty(&collected)?)?,
    }
    sink.flush()?;

    if let Some(path) = save_nudge_log {
        fs::write(path, history.borrow().to_json()?)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), DoomCliError> {
    let input_data = read_input(input)?;

    // Parse each snapshot independently so one bad record does not hide the rest
    let parsed: Vec<Result<SessionSnapshot, String>> = match input_format {
        InputFormat::Ndjson => input_data
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| parse_snapshot(l).map_err(|e| e.to_string()))
            .collect(),
        InputFormat::Json => {
            let values: Vec<serde_json::Value> = serde_json::from_str(&input_data)?;
            values
                .into_iter()
                .map(|v| serde_json::from_value(v).map_err(|e| e.to_string()))
                .collect()
        }
    };

    let mut errors = Vec::new();
    for (index, result) in parsed.iter().enumerate() {
        match result {
            Ok(snapshot) => {
                for issue in snapshot.validation_issues() {
                    errors.push(ValidationErrorDetail {
                        index,
                        session_id: Some(snapshot.session_id.clone()),
                        error: issue,
                    });
                }
            }
            Err(e) => errors.push(ValidationErrorDetail {
                index,
                session_id: None,
                error: e.clone(),
            }),
        }
    }

    let mut invalid: Vec<usize> = errors.iter().map(|e| e.index).collect();
    invalid.dedup();

    let report = ValidationReport {
        total_snapshots: parsed.len(),
        valid_snapshots: parsed.len() - invalid.len(),
        invalid_snapshots: invalid.len(),
        errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total snapshots:   {}", report.total_snapshots);
        println!("Valid snapshots:   {}", report.valid_snapshots);
        println!("Invalid snapshots: {}", report.invalid_snapshots);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Snapshot {} (index {}): {}",
                    err.session_id.as_deref().unwrap_or("unknown"),
                    err.index,
                    err.error
                );
            }
        }
    }

    if report.invalid_snapshots > 0 {
        Err(DoomCliError::ValidationFailed(report.invalid_snapshots))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), DoomCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    if let Some(path) = config_path {
        let check = match fs::read_to_string(path) {
            Ok(content) => match EngineConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (cooldown {}s, evaluation interval {} min)",
                        config.nudge_cooldown_secs, config.evaluation_interval_minutes
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        };
        checks.push(check);
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "No config file given, using defaults".to_string(),
        });
    }

    let ttl_check = match config_path
        .and_then(|p| fs::read_to_string(p).ok())
        .and_then(|c| EngineConfig::from_json(&c).ok())
        .and_then(|c| c.session_idle_ttl_minutes)
    {
        Some(ttl) => DoctorCheck {
            name: "session_eviction".to_string(),
            status: CheckStatus::Ok,
            message: format!("Idle sessions evicted after {} min", ttl),
        },
        None => DoctorCheck {
            name: "session_eviction".to_string(),
            status: CheckStatus::Warning,
            message: "Session state is never evicted; long-running hosts grow without bound".to_string(),
        },
    };
    checks.push(ttl_check);

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
        println!("Doomscroll Doctor Report");
        println!("========================");
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

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DoomCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

fn read_input(input: &Path) -> Result<String, DoomCliError> {
    if is_stdio(input) {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

// Error types

#[derive(Debug)]
enum DoomCliError {
    Io(io::Error),
    Engine(doomscroll_engine::EngineError),
    Json(serde_json::Error),
    NoSnapshots,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for DoomCliError {
    fn from(e: io::Error) -> Self {
        DoomCliError::Io(e)
    }
}

impl From<doomscroll_engine::EngineError> for DoomCliError {
    fn from(e: doomscroll_engine::EngineError) -> Self {
        DoomCliError::Engine(e)
    }
}

impl From<serde_json::Error> for DoomCliError {
    fn from(e: serde_json::Error) -> Self {
        DoomCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DoomCliError> for CliError {
    fn from(e: DoomCliError) -> Self {
        match e {
            DoomCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DoomCliError::Engine(doomscroll_engine::EngineError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'doomscroll config' for a valid starting point".to_string()),
            },
            DoomCliError::Engine(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'doomscroll validate' for details".to_string()),
            },
            DoomCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DoomCliError::NoSnapshots => CliError {
                code: "NO_SNAPSHOTS".to_string(),
                message: "No snapshots found in input".to_string(),
                hint: Some("Ensure input is not empty".to_string()),
            },
            DoomCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} snapshots failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            DoomCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_snapshots: usize,
    valid_snapshots: usize,
    invalid_snapshots: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    session_id: Option<String>,
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
