//! Proctor CLI - Command-line interface for SIMCO Proctor
//!
//! Commands:
//! - analyze: Replay recorded webcam frames into per-question behavioral metrics
//! - config: Print or validate the effective proctoring configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use simco_proctor::signals::{parse_ndjson, replay, ReplayedQuestion};
use simco_proctor::{ProctorConfig, ProctorError, PROCTOR_VERSION};

/// Proctor - Client-side engine for proctored adaptive quizzes
#[derive(Parser)]
#[command(name = "proctor")]
#[command(author = "SIMCO")]
#[command(version = PROCTOR_VERSION)]
#[command(about = "Analyze proctoring signals and inspect configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded frames into per-question behavioral metrics
    Analyze {
        /// Recorded frames, one JSON object per line (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only validate, print nothing on success
        #[arg(long)]
        validate: bool,

        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one question per line)
    Ndjson,
    /// JSON array
    Json,
    /// Pretty-printed JSON array
    JsonPretty,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| error.message.clone())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "simco_proctor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), ProctorCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            output_format,
        } => cmd_analyze(&input, &output, config.as_deref(), output_format),
        Commands::Config {
            config,
            validate,
            json,
        } => cmd_config(config.as_deref(), validate, json),
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    output_format: OutputFormat,
) -> Result<(), ProctorCliError> {
    let config = load_config(config)?;

    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let frames = parse_ndjson(&input_data)?;
    if frames.is_empty() {
        return Err(ProctorCliError::NoFrames);
    }

    let replayed = replay(&frames, &config.signals);
    tracing::info!(
        frames = frames.len(),
        questions = replayed.len(),
        "analyzed recording"
    );

    let output_data = format_output(&replayed, &output_format)?;
    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }
    Ok(())
}

fn cmd_config(config: Option<&Path>, validate: bool, json: bool) -> Result<(), ProctorCliError> {
    let config = load_config(config)?;
    if validate {
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_toml_string()?);
    }
    Ok(())
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<ProctorConfig, ProctorCliError> {
    let config = match path {
        Some(path) => ProctorConfig::load(path)?,
        None => ProctorConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn format_output(
    replayed: &[ReplayedQuestion],
    format: &OutputFormat,
) -> Result<String, ProctorCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for question in replayed {
                lines.push(serde_json::to_string(question)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(replayed)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(replayed)?),
    }
}

// Error types

#[derive(Debug)]
enum ProctorCliError {
    Io(io::Error),
    Proctor(ProctorError),
    Json(serde_json::Error),
    NoFrames,
}

impl From<io::Error> for ProctorCliError {
    fn from(e: io::Error) -> Self {
        ProctorCliError::Io(e)
    }
}

impl From<ProctorError> for ProctorCliError {
    fn from(e: ProctorError) -> Self {
        ProctorCliError::Proctor(e)
    }
}

impl From<serde_json::Error> for ProctorCliError {
    fn from(e: serde_json::Error) -> Self {
        ProctorCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ProctorCliError> for CliError {
    fn from(e: ProctorCliError) -> Self {
        match e {
            ProctorCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ProctorCliError::Proctor(e @ ProctorError::ConfigError(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'proctor config' to see the defaults".to_string()),
            },
            ProctorCliError::Proctor(e @ ProctorError::ParseError(_)) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(
                    "Each line must be {\"t_ms\": .., \"question\": .., \"landmarks\" | \"features\": ..}"
                        .to_string(),
                ),
            },
            ProctorCliError::Proctor(e) => CliError {
                code: "PROCTOR_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            ProctorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ProctorCliError::NoFrames => CliError {
                code: "NO_FRAMES".to_string(),
                message: "No frames found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
        }
    }
}
