//! Step execution and group scheduling.
//!
//! Groups run strictly one after another. The steps of a group are spawned
//! as independent tasks and awaited in completion order. The first failing
//! step fails the group and the run: its siblings are left running
//! detached (they are never cancelled) and whatever they produce is
//! discarded.

use crate::{
    applier::{apply_operations, ApplyReport},
    error::{Error, Result},
    filter::FileFilterConfig,
    plan::{ExecutionGroup, ExecutionPlan, StepConfig},
    prompt::{assemble_messages, load_instruction},
    response::parse_response,
    scanner::Scanner,
    splitter::Splitter,
    token::TokenizerKind,
    transport::{invoke_with_retry, ModelTransport, RetryPolicy},
    writer::read_chunk_artifacts,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

/// Settings shared by every step of a run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Directory that marker paths are made relative to
    pub base_dir: PathBuf,

    /// Retry policy for transient transport failures
    pub retry: RetryPolicy,

    /// Sort directory entries by name while scanning
    pub sort_entries: bool,

    /// Estimator used for chunk token diagnostics
    pub tokenizer: TokenizerKind,

    /// Warn about chunks estimated above this many tokens
    pub token_warning_threshold: Option<usize>,

    /// Check every model of the plan before the first group starts
    pub check_models: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            sort_entries: true,
            tokenizer: TokenizerKind::default(),
            token_warning_threshold: None,
            check_models: false,
        }
    }
}

/// Result of one completed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step name
    pub step: String,

    /// Chunks sent to the model
    pub chunks: usize,

    /// Chunks came from persisted artifacts rather than a fresh scan
    pub from_artifacts: bool,

    /// Operations in the validated response
    pub operations: usize,

    /// The response only parsed after truncation repair
    pub recovered: bool,

    /// The response did not end with `]`
    pub tail_suspect: bool,

    /// What the applier did with the operations
    pub applied: ApplyReport,

    /// Wall-clock time of the step
    pub duration: Duration,
}

/// How a step ended without error.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step ran to completion
    Completed(StepReport),
    /// No input content was found; nothing was sent to the model
    Skipped {
        /// Step name
        step: String,
    },
}

/// Result of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Completed steps in completion order
    pub steps: Vec<StepReport>,

    /// Names of skipped steps
    pub skipped: Vec<String>,
}

impl RunReport {
    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Completed(report) => self.steps.push(report),
            StepOutcome::Skipped { step } => self.skipped.push(step),
        }
    }

    /// Total number of file operations applied across all steps.
    #[must_use]
    pub fn total_applied(&self) -> usize {
        self.steps.iter().map(|s| s.applied.applied()).sum()
    }

    /// Steps whose response was recovered or looked truncated.
    pub fn suspect_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.recovered || s.tail_suspect)
    }
}

/// Executes plans against a model transport.
pub struct StepRunner {
    transport: Arc<dyn ModelTransport>,
    options: Arc<RunnerOptions>,
}

impl StepRunner {
    /// Creates a runner with default options.
    #[must_use]
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self::with_options(transport, RunnerOptions::default())
    }

    /// Creates a runner with explicit options.
    #[must_use]
    pub fn with_options(transport: Arc<dyn ModelTransport>, options: RunnerOptions) -> Self {
        Self {
            transport,
            options: Arc::new(options),
        }
    }

    /// Runs every group of the plan in order.
    ///
    /// # Errors
    ///
    /// Returns the first step failure, wrapped in [`Error::StepFailed`]. Later
    /// groups are not started.
    #[instrument(skip_all, fields(groups = plan.groups.len()))]
    pub async fn run_plan(&self, plan: &ExecutionPlan) -> Result<RunReport> {
        if self.options.check_models {
            self.check_models(plan).await?;
        }

        let mut report = RunReport::default();

        for (i, group) in plan.groups.iter().enumerate() {
            info!(
                "Group {}/{} '{}' ({} steps)",
                i + 1,
                plan.groups.len(),
                group.name,
                group.steps.len()
            );

            for outcome in self.run_group(group).await? {
                report.record(outcome);
            }
        }

        info!(
            "Run complete: {} steps completed, {} skipped, {} file operations applied",
            report.steps.len(),
            report.skipped.len(),
            report.total_applied()
        );

        Ok(report)
    }

    /// Verifies that every distinct model named by the plan is reachable.
    ///
    /// # Errors
    ///
    /// Returns the transport failure for the first model that cannot be reached.
    pub async fn check_models(&self, plan: &ExecutionPlan) -> Result<()> {
        let models: BTreeSet<&str> = plan
            .groups
            .iter()
            .flat_map(|g| &g.steps)
            .map(|s| s.model.as_str())
            .collect();

        for model in models {
            self.transport.check(model).await.map_err(|e| {
                warn!("Model '{}' is not reachable: {}", model, e);
                Error::from(e)
            })?;
            info!("Model '{}' is reachable", model);
        }

        Ok(())
    }

    /// Runs the steps of one group concurrently.
    ///
    /// Outcomes are returned in completion order.
    ///
    /// # Errors
    ///
    /// Returns as soon as any step fails. Steps still running are detached.
    pub async fn run_group(&self, group: &ExecutionGroup) -> Result<Vec<StepOutcome>> {
        let mut pending: FuturesUnordered<_> = group
            .steps
            .iter()
            .cloned()
            .map(|step| {
                tokio::spawn(run_step(
                    Arc::clone(&self.transport),
                    Arc::clone(&self.options),
                    step,
                ))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(group.steps.len());

        while let Some(joined) = pending.next().await {
            match joined.map_err(Error::from).and_then(|result| result) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    if !pending.is_empty() {
                        warn!(
                            "Group '{}' failed; {} running step(s) detached and their results discarded",
                            group.name,
                            pending.len()
                        );
                    }
                    return Err(e);
                }
            }
        }

        Ok(outcomes)
    }

    /// Runs a single step on the current task.
    ///
    /// # Errors
    ///
    /// Returns the step failure wrapped in [`Error::StepFailed`].
    pub async fn run_step(&self, step: StepConfig) -> Result<StepOutcome> {
        run_step(Arc::clone(&self.transport), Arc::clone(&self.options), step).await
    }
}

async fn run_step(
    transport: Arc<dyn ModelTransport>,
    options: Arc<RunnerOptions>,
    step: StepConfig,
) -> Result<StepOutcome> {
    execute_step(transport.as_ref(), &options, &step)
        .await
        .map_err(|e| {
            warn!("Step '{}' failed: {}", step.name, e);
            e.in_step(&step.name)
        })
}

#[instrument(skip_all, fields(step = %step.name))]
async fn execute_step(
    transport: &dyn ModelTransport,
    options: &RunnerOptions,
    step: &StepConfig,
) -> Result<StepOutcome> {
    let started = Instant::now();
    info!("Executing step with model {}", step.model);

    let initial = load_instruction(&step.initial_instruction_file).await?;
    let post = load_instruction(&step.post_instruction_file).await?;

    let (chunks, from_artifacts) = gather_chunks(step, options).await?;
    if chunks.is_empty() {
        warn!("No content found in input folders, skipping step");
        return Ok(StepOutcome::Skipped {
            step: step.name.clone(),
        });
    }

    let messages = assemble_messages(&initial, &chunks, &post);
    info!("Calling model with {} messages", messages.len());

    let raw = invoke_with_retry(
        transport,
        options.retry,
        &step.model,
        step.temperature,
        &messages,
    )
    .await?;

    let parsed = parse_response(&raw)?;
    info!("Parsed {} file operations", parsed.operations.len());

    let applied = apply_operations(&parsed.operations, &step.output_folder).await;

    Ok(StepOutcome::Completed(StepReport {
        step: step.name.clone(),
        chunks: chunks.len(),
        from_artifacts,
        operations: parsed.operations.len(),
        recovered: parsed.recovered,
        tail_suspect: parsed.tail_suspect,
        applied,
        duration: started.elapsed(),
    }))
}

/// Uses persisted chunk artifacts when the input folders hold any, otherwise
/// scans and splits the folders.
async fn gather_chunks(step: &StepConfig, options: &RunnerOptions) -> Result<(Vec<String>, bool)> {
    let artifacts = read_chunk_artifacts(&step.input_folders).await?;
    if !artifacts.is_empty() {
        info!("Using {} persisted chunk artifacts", artifacts.len());
        return Ok((artifacts, true));
    }

    let scanner = Scanner::new(
        step.input_folders.clone(),
        &options.base_dir,
        &FileFilterConfig::default().include(&step.file_filters),
        options.sort_entries,
    )?;

    let mut splitter = Splitter::new(step.chunk_size).with_estimator(options.tokenizer);
    if let Some(threshold) = options.token_warning_threshold {
        splitter = splitter.with_token_warning(threshold);
    }

    let chunks = tokio::task::spawn_blocking(move || {
        let files = scanner.scan();
        splitter.split(&files)
    })
    .await?;

    info!("Split input folders into {} chunks", chunks.len());
    Ok((chunks.into_iter().map(|c| c.text).collect(), false))
}
