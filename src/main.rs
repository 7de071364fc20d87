use anyhow::Context;
use clap::{Parser, Subcommand};
use docgen::{
    Config, ExecutionPlan, FileFilterConfig, GeminiClient, Pipeline, RunnerOptions, StepRunner,
    TokenizerKind,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "docgen",
    version,
    author,
    about = "Generate documentation from a codebase with a language model",
    long_about = "Generate documentation from a codebase with a language model.\n\n\
    Source folders are concatenated into marker-delimited chunks, sent to the model \
    together with instruction prompts, and the file operations it returns are applied \
    to an output folder. Execution plans group steps: groups run in order, steps within \
    a group run concurrently.\n\n\
    USAGE EXAMPLES:\n  \
      # Run an execution plan\n  \
      docgen run plan.json\n\n  \
      # Only produce chunk artifacts\n  \
      docgen chunks --input ./src --out ./chunks\n\n  \
      # Preview chunking for TypeScript sources\n  \
      docgen chunks --input ./app --filter '**/*.ts' --dry-run"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute every group of an execution plan
    Run {
        /// Execution plan file
        #[arg(value_name = "FILE", default_value = "execution_plan.json")]
        plan: PathBuf,

        /// Directory that marker paths are made relative to
        #[arg(long, default_value = ".", value_name = "PATH")]
        base_dir: PathBuf,

        /// Attempts per model call, including the first
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Tokenizer used for chunk diagnostics
        #[arg(long, value_enum, default_value = "simple")]
        tokenizer: CliTokenizer,

        /// Warn about chunks estimated above this many tokens
        #[arg(long, value_name = "TOKENS")]
        token_warning: Option<usize>,

        /// Verify every model is reachable before the first step
        #[arg(long)]
        check: bool,
    },

    /// Scan folders and write chunk artifacts without calling a model
    Chunks {
        /// Folder to scan (repeatable, scanned in order)
        #[arg(short, long = "input", required = true, value_name = "PATH")]
        inputs: Vec<PathBuf>,

        /// Glob a file must match to be included (repeatable)
        #[arg(short, long = "filter", value_name = "GLOB")]
        filters: Vec<String>,

        /// Output directory for chunk artifacts
        #[arg(short, long, default_value = "chunks", value_name = "PATH")]
        out: PathBuf,

        /// Directory that marker paths are made relative to
        #[arg(long, default_value = ".", value_name = "PATH")]
        base_dir: PathBuf,

        /// Max characters per chunk
        #[arg(long, default_value_t = docgen::DEFAULT_MAX_CHUNK_SIZE)]
        chunk_size: usize,

        /// Tokenizer used for chunk diagnostics
        #[arg(long, value_enum, default_value = "simple")]
        tokenizer: CliTokenizer,

        /// Warn about chunks estimated above this many tokens
        #[arg(long, value_name = "TOKENS")]
        token_warning: Option<usize>,

        /// Skip writing code_folder_structure.txt
        #[arg(long)]
        no_structure: bool,

        /// Dry run (don't write files)
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    setup_tracing(cli.verbose)?;

    match cli.command {
        Command::Run {
            plan,
            base_dir,
            max_attempts,
            tokenizer,
            token_warning,
            check,
        } => {
            let plan = ExecutionPlan::load(&plan).context("Failed to load execution plan")?;
            let api_key = plan.api_key().context("Missing API key")?;
            let client = GeminiClient::new(api_key).context("Failed to create model client")?;

            let mut options = RunnerOptions {
                base_dir,
                tokenizer: tokenizer.into(),
                token_warning_threshold: token_warning,
                check_models: check,
                ..RunnerOptions::default()
            };
            options.retry.max_attempts = max_attempts.max(1);

            let report = StepRunner::with_options(Arc::new(client), options)
                .run_plan(&plan)
                .await
                .context("Execution plan failed")?;

            for step in report.suspect_steps() {
                eprintln!(
                    "Warning: response for step '{}' may be truncated; review its output",
                    step.step
                );
            }
            println!(
                "✓ {} steps completed, {} skipped, {} file operations applied",
                report.steps.len(),
                report.skipped.len(),
                report.total_applied()
            );
        }
        Command::Chunks {
            inputs,
            filters,
            out,
            base_dir,
            chunk_size,
            tokenizer,
            token_warning,
            no_structure,
            dry_run,
        } => {
            let mut builder = Config::builder()
                .input_folders(inputs)
                .base_dir(base_dir)
                .output_dir(out)
                .max_chunk_size(chunk_size)
                .tokenizer(tokenizer.into())
                .file_filter_config(FileFilterConfig::default().include(&filters))
                .write_folder_structure(!no_structure)
                .dry_run(dry_run);

            if let Some(tokens) = token_warning {
                builder = builder.token_warning_threshold(tokens);
            }

            let config = builder.build().context("Failed to build configuration")?;

            let stats = Pipeline::new(config)
                .context("Failed to create pipeline")?
                .run()
                .context("Chunk generation failed")?;

            if !dry_run {
                stats.print_summary();
            }
        }
    }

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("docgen=info"),
        1 => EnvFilter::new("docgen=debug"),
        _ => EnvFilter::new("docgen=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
