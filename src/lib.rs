//! # docgen
//!
//! Turns source folders into documentation by way of a language model.
//!
//! ## Features
//!
//! - Marker-delimited concatenation of text files, reversible back into files
//! - Greedy chunking under a character budget, order preserving
//! - Chunk artifacts persisted atomically for later steps
//! - Tolerant recovery of truncated model responses
//! - Grouped execution plans: groups run in order, steps within a group run concurrently
//!
//! ## Quick Start
//!
//! Chunk a project without calling a model:
//!
//! ```no_run
//! use docgen::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input_folder("./src")
//!     .output_dir("./chunks")
//!     .max_chunk_size(9_000)
//!     .build()?;
//!
//! Pipeline::new(config)?.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! Run an execution plan:
//!
//! ```no_run
//! use docgen::{ExecutionPlan, GeminiClient, StepRunner};
//! use std::{path::Path, sync::Arc};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let plan = ExecutionPlan::load(Path::new("plan.json"))?;
//! let client = GeminiClient::new(plan.api_key()?)?;
//!
//! let report = StepRunner::new(Arc::new(client)).run_plan(&plan).await?;
//! println!("{} steps completed", report.steps.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Chunk generation is a pipeline:
//! 1. **Scanner**: Walks input folders and wraps each text file in boundary markers
//! 2. **Splitter**: Packs wrapped files into chunks under the character budget
//! 3. **Writer**: Persists chunks as `code_part_NNN.txt` artifacts
//!
//! A plan step then assembles prompt messages from instructions and chunks,
//! calls the model through a [`ModelTransport`], validates the returned file
//! operations and applies them to the step's output folder.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod applier;
mod config;
mod error;
mod file;
mod filter;
mod pipeline;
mod plan;
mod prompt;
mod response;
mod runner;
mod scanner;
mod splitter;
mod token;
mod transport;
mod writer;

pub mod markers;

pub use applier::{apply_operations, ApplyReport};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result, RESPONSE_EXCERPT_CHARS};
pub use file::{concatenate, WrappedFile};
pub use filter::{FileFilterConfig, DEFAULT_EXCLUDED_DIRECTORIES, DEFAULT_EXCLUDED_FILES};
pub use pipeline::{Pipeline, PipelineStats};
pub use plan::{ExecutionGroup, ExecutionPlan, StepConfig};
pub use prompt::{assemble_messages, load_instruction};
pub use response::{parse_response, FileOperation, Operation, ParsedResponse};
pub use runner::{RunReport, RunnerOptions, StepOutcome, StepReport, StepRunner};
pub use scanner::{render_folder_structure, ScanStats, Scanner};
pub use splitter::{Chunk, Splitter, DEFAULT_MAX_CHUNK_SIZE};
pub use token::{TokenEstimator, TokenizerKind};
pub use transport::{
    invoke_with_retry, GeminiClient, ModelTransport, RetryPolicy, TransportError,
    DEFAULT_API_KEY_ENV,
};
pub use writer::{
    artifact_name, list_artifacts, read_chunk_artifacts, ARTIFACT_EXTENSION, ARTIFACT_PREFIX,
    FOLDER_STRUCTURE_FILE, SUMMARY_FILE,
};

/// Runs chunk generation with the given configuration.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - No text files are found in the input folders
/// - Chunk artifacts cannot be written
///
/// # Examples
///
/// ```no_run
/// use docgen::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .input_folder(".")
///     .build()?;
///
/// run(config)?;
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}

/// Loads the plan at `path` and executes it with `transport`.
///
/// # Errors
///
/// Returns an error if the plan is invalid or any step fails.
pub async fn run_plan(
    path: &std::path::Path,
    transport: std::sync::Arc<dyn ModelTransport>,
    options: RunnerOptions,
) -> Result<RunReport> {
    let plan = ExecutionPlan::load(path)?;
    StepRunner::with_options(transport, options).run_plan(&plan).await
}
