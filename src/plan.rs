//! Execution plan loading and validation.
//!
//! A plan is a JSON file listing the steps to run:
//!
//! ```json
//! {
//!   "project_root_folder": "./my_project_repo",
//!   "llm_api_key_env_var": "GEMINI_API_KEY",
//!   "steps": [ { "model": "...", "initial_instruction_file": "...", ... } ],
//!   "groups": [ { "name": "docs", "steps": [ ... ] } ]
//! }
//! ```
//!
//! Every entry of `steps` becomes a group of its own, so those steps run one
//! after another. Steps inside an entry of `groups` run concurrently.
//! `{{project_root_folder}}` in any string field is replaced with the
//! absolute project root.

use crate::error::{Error, Result};
use crate::splitter::DEFAULT_MAX_CHUNK_SIZE;
use crate::transport::DEFAULT_API_KEY_ENV;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PROJECT_ROOT_VAR: &str = "{{project_root_folder}}";
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// One fully validated step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepConfig {
    /// Display name used in logs and errors
    pub name: String,
    /// Model identifier passed to the transport
    pub model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Prompt sent before the chunks
    pub initial_instruction_file: PathBuf,
    /// Prompt sent after the chunks
    pub post_instruction_file: PathBuf,
    /// Folders read in order; chunk artifacts take precedence over a scan
    pub input_folders: Vec<PathBuf>,
    /// Name filters; empty accepts every file
    pub file_filters: Vec<String>,
    /// Folder the returned file operations are applied to
    pub output_folder: PathBuf,
    /// Character budget per chunk
    pub chunk_size: usize,
}

/// Steps that may run concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionGroup {
    /// Group name used in logs
    pub name: String,
    /// Steps of the group, never empty
    pub steps: Vec<StepConfig>,
}

/// A validated plan: groups run strictly in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// Absolute project root, when configured
    pub project_root: Option<PathBuf>,

    /// Environment variable holding the model API key
    pub api_key_env_var: String,

    /// Groups in execution order
    pub groups: Vec<ExecutionGroup>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    project_root_folder: Option<String>,
    llm_api_key_env_var: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
    #[serde(default)]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStep {
    name: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    initial_instruction_file: Option<String>,
    post_instruction_file: Option<String>,
    input_folders: Option<Vec<String>>,
    #[serde(default)]
    file_filters: Vec<String>,
    output_folder: Option<String>,
    chunk_size: Option<usize>,
}

impl ExecutionPlan {
    /// Loads and validates a plan file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing, is not valid
    /// JSON, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::config(format!(
                "Execution plan not found: {}",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let plan = Self::from_json(&text)?;

        info!(
            "Loaded execution plan {} ({} groups, {} steps)",
            path.display(),
            plan.groups.len(),
            plan.step_count()
        );
        Ok(plan)
    }

    /// Parses and validates plan JSON.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawPlan = serde_json::from_str(text)
            .map_err(|e| Error::config(format!("Invalid JSON in execution plan: {e}")))?;

        if raw.steps.is_empty() && raw.groups.is_empty() {
            return Err(Error::config(
                "Execution plan must have at least one step in \"steps\" or \"groups\"",
            ));
        }

        let project_root = raw
            .project_root_folder
            .as_deref()
            .map(|root| std::path::absolute(root).map_err(|e| Error::io(root, e)))
            .transpose()?;
        let substitute = |value: String| match &project_root {
            Some(root) => value.replace(PROJECT_ROOT_VAR, &root.to_string_lossy()),
            None => value,
        };

        let mut index = 0;
        let mut groups = Vec::with_capacity(raw.steps.len() + raw.groups.len());

        for step in raw.steps {
            let step = validate_step(index, step, &substitute)?;
            index += 1;
            groups.push(ExecutionGroup {
                name: step.name.clone(),
                steps: vec![step],
            });
        }

        for (group_index, group) in raw.groups.into_iter().enumerate() {
            let name = group
                .name
                .unwrap_or_else(|| format!("group-{}", group_index + 1));
            if group.steps.is_empty() {
                return Err(Error::config(format!("Group '{name}' has no steps")));
            }

            let mut steps = Vec::with_capacity(group.steps.len());
            for step in group.steps {
                steps.push(validate_step(index, step, &substitute)?);
                index += 1;
            }
            groups.push(ExecutionGroup { name, steps });
        }

        debug!("Validated {} steps", index);

        Ok(Self {
            project_root,
            api_key_env_var: raw
                .llm_api_key_env_var
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            groups,
        })
    }

    /// Total number of steps across all groups.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.groups.iter().map(|g| g.steps.len()).sum()
    }

    /// Reads the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the variable is unset or empty.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env_var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::config(format!(
                "Environment variable {} is not set. Add it to your environment or a .env file.",
                self.api_key_env_var
            ))),
        }
    }
}

fn validate_step(
    index: usize,
    raw: RawStep,
    substitute: &impl Fn(String) -> String,
) -> Result<StepConfig> {
    let required = |value: Option<String>, field: &str| {
        value
            .filter(|v| !v.trim().is_empty())
            .map(substitute)
            .ok_or_else(|| {
                Error::config(format!("Step {index} is missing required \"{field}\" field"))
            })
    };

    let model = required(raw.model, "model")?;
    let initial = required(raw.initial_instruction_file, "initial_instruction_file")?;
    let post = required(raw.post_instruction_file, "post_instruction_file")?;
    let output = required(raw.output_folder, "output_folder")?;

    let input_folders: Vec<PathBuf> = raw
        .input_folders
        .ok_or_else(|| {
            Error::config(format!("Step {index} is missing required \"input_folders\" array"))
        })?
        .into_iter()
        .map(|f| PathBuf::from(substitute(f)))
        .collect();

    let temperature = raw.temperature.unwrap_or(DEFAULT_TEMPERATURE);
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(Error::config(format!(
            "Step {index} has invalid temperature {temperature}"
        )));
    }

    let chunk_size = raw.chunk_size.unwrap_or(DEFAULT_MAX_CHUNK_SIZE);
    if chunk_size == 0 {
        return Err(Error::config(format!("Step {index} has a chunk_size of 0")));
    }

    Ok(StepConfig {
        name: raw
            .name
            .map(substitute)
            .unwrap_or_else(|| format!("step-{}", index + 1)),
        model,
        temperature,
        initial_instruction_file: PathBuf::from(initial),
        post_instruction_file: PathBuf::from(post),
        input_folders,
        file_filters: raw.file_filters,
        output_folder: PathBuf::from(output),
        chunk_size,
    })
}
