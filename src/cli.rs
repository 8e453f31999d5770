//! CLI argument parsing.
use crate::config::{DEFAULT_INPUT_CSV, DEFAULT_OUTPUT_CSV, DEFAULT_PROMPT, DEFAULT_REPORT_HTML};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "meanings",
    version,
    about = "Enrich short codes with LM-provided meanings and compare annotation sources",
    after_help = "Examples:\n  meanings enrich --provider openai\n  meanings enrich --provider gemini --prompt false-positive\n  meanings enrich --provider openai --model gpt-4o --batch-size 20\n  meanings compare --json\n\nEnvironment:\n  OPENAI_API_KEY               credential for the openai provider\n  GOOGLE_API_KEY/GEMINI_API_KEY  credential for the gemini provider\n  LLM_MODEL                    model override when --model is not given\n  RUST_LOG                     log filter (default: info)",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Enrich(EnrichArgs),
    Compare(CompareArgs),
}

/// Enrichment run for one (provider, prompt) pair.
#[derive(Parser, Debug)]
#[command(about = "Annotate every code in the input CSV, resuming from the checkpoint")]
pub struct EnrichArgs {
    /// Provider id from the configuration (openai, gemini, ...)
    #[arg(long, default_value = "openai")]
    pub provider: String,

    /// Model to request first (overrides LLM_MODEL and the provider default)
    #[arg(long)]
    pub model: Option<String>,

    /// Prompt variant
    #[arg(long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Codes per request
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Input CSV with a `code` column
    #[arg(long, value_name = "PATH", default_value = DEFAULT_INPUT_CSV)]
    pub input: PathBuf,

    /// Enriched CSV, rewritten after every batch
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OUTPUT_CSV)]
    pub output: PathBuf,

    /// Checkpoint file (defaults to the configured path)
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// JSON configuration overlay
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append one JSON line per batch call to this file
    #[arg(long, value_name = "PATH")]
    pub call_log: Option<PathBuf>,
}

/// Comparison report over the annotation columns of an enriched CSV.
#[derive(Parser, Debug)]
#[command(about = "Write an HTML report comparing the meanings_* columns")]
pub struct CompareArgs {
    /// Enriched CSV
    #[arg(long, value_name = "PATH", default_value = DEFAULT_OUTPUT_CSV)]
    pub input: PathBuf,

    /// HTML report path
    #[arg(long, value_name = "PATH", default_value = DEFAULT_REPORT_HTML)]
    pub output: PathBuf,

    /// Also print the statistics as JSON
    #[arg(long)]
    pub json: bool,
}
