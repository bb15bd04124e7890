mod commands;

use anyhow::Result;
use arbiter_common::types::EvaluationMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Validate harnesses, judge code locally, manage problems", long_about = None)]
struct Cli {
    /// Path to languages.json (overrides LANGUAGES_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Run,
    Submit,
}

impl From<Mode> for EvaluationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Run => EvaluationMode::Run,
            Mode::Submit => EvaluationMode::Submit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate languages.json and every harness template
    Check,

    /// Print the executable unit built from a source file
    Render {
        /// Language name (e.g., python, cpp)
        #[arg(short, long)]
        language: String,

        /// File holding the user code
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Print the error-quality tier of an error message
    Classify {
        /// Error text; read from --file or stdin when omitted
        text: Option<String>,

        /// Read the error text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Classify as a passing outcome
        #[arg(long, default_value = "false")]
        passed: bool,
    },

    /// Judge a source file against a problem file using the configured engine
    Judge {
        #[arg(short, long)]
        language: String,

        #[arg(short, long)]
        source: PathBuf,

        /// Problem JSON: { "id", "time_limit_ms"?, "test_cases": [...] }
        #[arg(short, long)]
        problem: PathBuf,

        #[arg(short, long, value_enum, default_value = "submit")]
        mode: Mode,

        /// Per-test timeout in milliseconds (defaults to the problem's limit)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Store a problem file in Redis
    LoadProblem {
        #[arg(short, long)]
        problem: PathBuf,
    },

    /// Build the Docker image for a language
    BuildImage {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip build cache
        #[arg(long, default_value = "false")]
        no_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = arbiter_common::config::Config::from_env()?;
    if let Some(path) = cli.config {
        config.languages_path = path;
    }

    match cli.command {
        Commands::Check => {
            commands::check(&config.languages_path)?;
        }
        Commands::Render { language, source } => {
            commands::render(&config.languages_path, &language, &source)?;
        }
        Commands::Classify { text, file, passed } => {
            commands::classify(text, file.as_deref(), passed)?;
        }
        Commands::Judge {
            language,
            source,
            problem,
            mode,
            timeout_ms,
        } => {
            commands::judge(&config, &language, &source, &problem, mode.into(), timeout_ms).await?;
        }
        Commands::LoadProblem { problem } => {
            commands::load_problem(&config.redis_url, &problem).await?;
        }
        Commands::BuildImage { name, no_cache } => {
            commands::build_docker_image(&config.languages_path, &name, no_cache)?;
        }
    }

    Ok(())
}
