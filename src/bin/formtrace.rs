//! Formtrace CLI - Command-line interface for Synheart Formtrace
//!
//! Input is newline-delimited JSON, one client request body per line, each
//! carrying its own `sessionId` and `eventType`.
//!
//! Commands:
//! - ingest: Replay a file of request bodies and print the final session records
//! - run: Process streaming input from stdin, one outcome per line
//! - validate: Decode events without aggregating them
//! - schema: Describe the accepted payload shapes

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use synheart_formtrace::envelope::MISSING_SESSION_ID;
use synheart_formtrace::parser;
use synheart_formtrace::{
    EventEnvelope, IngestOutcome, SessionAggregator, SessionSnapshot, TelemetryError,
    FORMTRACE_VERSION, PRODUCER_NAME,
};

/// Formtrace - Session aggregation for web form behavioral telemetry
#[derive(Parser)]
#[command(name = "formtrace")]
#[command(author = "Synheart AI Inc")]
#[command(version = FORMTRACE_VERSION)]
#[command(
    about = "Aggregate web form telemetry events into per-session records",
    long_about = None
)]
struct Cli {
    /// Log filter (e.g. "info", "synheart_formtrace=debug")
    #[arg(long, global = true, env = "FORMTRACE_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay request bodies and print the final record of every session
    Ingest {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Worker threads; events of one session always go to the same worker
        #[arg(
            long,
            env = "FORMTRACE_WORKERS",
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        workers: u16,

        /// Fail if any event is rejected
        #[arg(long)]
        strict: bool,
    },

    /// Process streaming input from stdin (streaming mode)
    Run {
        /// Buffer output instead of flushing after each record
        #[arg(long = "no-flush", action = ArgAction::SetFalse)]
        flush: bool,
    },

    /// Validate request bodies without aggregating them
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the accepted event payload shapes
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one session per line)
    Ndjson,
    /// JSON array of sessions
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<(), FormtraceCliError> {
    match cli.command {
        Commands::Ingest {
            input,
            output,
            output_format,
            workers,
            strict,
        } => cmd_ingest(&input, &output, output_format, usize::from(workers), strict),

        Commands::Run { flush } => cmd_run(flush),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

fn cmd_ingest(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    workers: usize,
    strict: bool,
) -> Result<(), FormtraceCliError> {
    let input_data = read_input(input)?;
    let lines = non_empty_lines(&input_data);
    if lines.is_empty() {
        return Err(FormtraceCliError::NoEvents);
    }

    let aggregator = SessionAggregator::new();
    let mut rejections: Vec<LineError> = Vec::new();

    // Route every line to a worker by session key so per-session order survives
    let mut buckets: Vec<Vec<(usize, &str)>> = vec![Vec::new(); workers];
    for &(line, body) in &lines {
        match EventEnvelope::from_body(body.as_bytes()) {
            Ok(envelope) => buckets[worker_for(&envelope.session_id, workers)].push((line, body)),
            Err(e) => {
                tracing::warn!(line, code = e.code(), error = %e, "request rejected");
                rejections.push(LineError::new(line, &e));
            }
        }
    }

    let worker_rejections: Vec<Vec<LineError>> = thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .iter()
            .map(|bucket| {
                let aggregator = &aggregator;
                scope.spawn(move || {
                    bucket
                        .iter()
                        .filter_map(|&(line, body)| {
                            aggregator
                                .ingest_body(body.as_bytes())
                                .err()
                                .map(|e| LineError::new(line, &e))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_default())
            .collect()
    });
    rejections.extend(worker_rejections.into_iter().flatten());
    rejections.sort_by_key(|r| r.line);

    let snapshots = aggregator.snapshot();
    let stats = aggregator.stats();
    tracing::info!(
        lines = lines.len(),
        rejected = rejections.len(),
        sessions = stats.sessions,
        complete = stats.complete,
        "ingest finished"
    );

    let output_data = format_output(&snapshots, &output_format)?;
    write_output(output, &output_data)?;

    if strict && !rejections.is_empty() {
        for rejection in &rejections {
            eprintln!("line {}: [{}] {}", rejection.line, rejection.code, rejection.message);
        }
        return Err(FormtraceCliError::EventsRejected(rejections.len()));
    }

    Ok(())
}

fn cmd_run(flush: bool) -> Result<(), FormtraceCliError> {
    let aggregator = SessionAggregator::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let result = match aggregator.ingest_body(trimmed.as_bytes()) {
            Ok(outcome) => StreamResult::Accepted {
                line: index + 1,
                outcome,
            },
            Err(e) => StreamResult::Rejected {
                line: index + 1,
                error: LineError::new(index + 1, &e),
            },
        };

        writeln!(stdout, "{}", serde_json::to_string(&result)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    let stats = aggregator.stats();
    tracing::info!(sessions = stats.sessions, complete = stats.complete, "stream closed");

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), FormtraceCliError> {
    let input_data = read_input(input)?;
    let lines = non_empty_lines(&input_data);

    let errors: Vec<LineError> = lines
        .iter()
        .filter_map(|&(line, body)| validate_body(body).err().map(|e| LineError::new(line, &e)))
        .collect();

    let report = ValidationReport {
        producer: PRODUCER_NAME.to_string(),
        version: FORMTRACE_VERSION.to_string(),
        generated_at: Utc::now(),
        total_events: lines.len(),
        valid_events: lines.len() - errors.len(),
        invalid_events: errors.len(),
        errors,
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
                println!("  - Line {} [{}]: {}", err.line, err.code, err.message);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(FormtraceCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

/// Full structural check of one body: envelope, kind, and payload
fn validate_body(body: &str) -> Result<(), TelemetryError> {
    let envelope = EventEnvelope::from_body(body.as_bytes())?;
    if envelope.session_id.is_empty() {
        return Err(TelemetryError::InvalidRequest(MISSING_SESSION_ID.to_string()));
    }
    let kind = envelope.kind()?;
    parser::decode(kind, body.as_bytes())?;
    Ok(())
}

fn cmd_schema(json_schema: bool) -> Result<(), FormtraceCliError> {
    if json_schema {
        println!("{}", get_input_json_schema());
        return Ok(());
    }

    println!("Input: one JSON object per line with `sessionId` and `eventType`");
    println!();
    println!("1. copyAndPaste - A paste into a sensitive form field");
    println!("   - websiteUrl (required), fieldName: email | cardNumber | CVV, pasted: bool");
    println!();
    println!("2. resize - A viewport resize (first one per session is kept)");
    println!("   - websiteUrl (required)");
    println!("   - resizeFrom: {{ width, height }} (non-empty strings)");
    println!("   - resizeTo: {{ width, height }} (non-empty strings)");
    println!();
    println!("3. timeTaken - Form completion time (completes the session)");
    println!("   - websiteUrl, timeTaken: non-zero integer");
    println!();
    println!("Output: one record per session");
    println!("- sessionKey, state (partial | complete)");
    println!("- record: {{ websiteUrl, sessionId, resizeFrom, resizeTo,");
    println!("            fieldPasteState, formCompletionTime }}");

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, FormtraceCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), FormtraceCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
        io::stdout().flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

/// Non-empty lines with their 1-based line numbers
fn non_empty_lines(data: &str) -> Vec<(usize, &str)> {
    data.lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect()
}

fn worker_for(session_id: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

fn format_output(
    snapshots: &[SessionSnapshot],
    format: &OutputFormat,
) -> Result<String, FormtraceCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut out = String::new();
            for snapshot in snapshots {
                out.push_str(&serde_json::to_string(snapshot)?);
                out.push('\n');
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(format!("{}\n", serde_json::to_string(snapshots)?)),
        OutputFormat::JsonPretty => Ok(format!("{}\n", serde_json::to_string_pretty(snapshots)?)),
    }
}

fn get_input_json_schema() -> String {
    let dimension = serde_json::json!({
        "type": "object",
        "required": ["width", "height"],
        "properties": {
            "width": { "type": "string", "minLength": 1 },
            "height": { "type": "string", "minLength": 1 }
        }
    });

    serde_json::json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "formtrace request body",
        "type": "object",
        "required": ["sessionId", "eventType", "websiteUrl"],
        "properties": {
            "sessionId": { "type": "string", "minLength": 1 },
            "websiteUrl": { "type": "string" },
            "eventType": { "enum": ["copyAndPaste", "resize", "timeTaken"] }
        },
        "oneOf": [
            {
                "properties": {
                    "eventType": { "const": "copyAndPaste" },
                    "websiteUrl": { "minLength": 1 },
                    "fieldName": { "enum": ["email", "cardNumber", "CVV"] },
                    "pasted": { "type": "boolean" }
                },
                "required": ["fieldName", "pasted"]
            },
            {
                "properties": {
                    "eventType": { "const": "resize" },
                    "websiteUrl": { "minLength": 1 },
                    "resizeFrom": dimension,
                    "resizeTo": dimension
                },
                "required": ["resizeFrom", "resizeTo"]
            },
            {
                "properties": {
                    "eventType": { "const": "timeTaken" },
                    "timeTaken": { "type": "integer", "not": { "const": 0 } }
                },
                "required": ["timeTaken"]
            }
        ]
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum FormtraceCliError {
    Io(io::Error),
    Json(serde_json::Error),
    NoEvents,
    EventsRejected(usize),
    ValidationFailed(usize),
}

impl From<io::Error> for FormtraceCliError {
    fn from(e: io::Error) -> Self {
        FormtraceCliError::Io(e)
    }
}

impl From<serde_json::Error> for FormtraceCliError {
    fn from(e: serde_json::Error) -> Self {
        FormtraceCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FormtraceCliError> for CliError {
    fn from(e: FormtraceCliError) -> Self {
        match e {
            FormtraceCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FormtraceCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FormtraceCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FormtraceCliError::EventsRejected(count) => CliError {
                code: "EVENTS_REJECTED".to_string(),
                message: format!("{} events were rejected", count),
                hint: Some("Run 'formtrace validate' for details".to_string()),
            },
            FormtraceCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

// Report types

#[derive(Debug, Serialize)]
struct LineError {
    line: usize,
    code: &'static str,
    message: String,
}

impl LineError {
    fn new(line: usize, err: &TelemetryError) -> Self {
        Self {
            line,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StreamResult {
    Accepted {
        line: usize,
        #[serde(flatten)]
        outcome: IngestOutcome,
    },
    Rejected {
        line: usize,
        error: LineError,
    },
}

#[derive(Serialize)]
struct ValidationReport {
    producer: String,
    version: String,
    generated_at: DateTime<Utc>,
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<LineError>,
}
