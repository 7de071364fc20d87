use crate::error::{Error, Result};
use crate::filter::FileFilterConfig;
use crate::splitter::DEFAULT_MAX_CHUNK_SIZE;
use crate::token::TokenizerKind;
use std::path::PathBuf;

const DEFAULT_OUTPUT_DIR: &str = "chunks";

/// Configuration for chunk generation.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Folders to scan, in order
    pub input_folders: Vec<PathBuf>,

    /// Directory that marker paths are made relative to
    pub base_dir: PathBuf,

    /// Output directory for chunk artifacts
    pub output_dir: PathBuf,

    /// Maximum characters per chunk
    pub max_chunk_size: usize,

    /// Estimator used for token diagnostics
    pub tokenizer: TokenizerKind,

    /// Warn about chunks estimated above this many tokens
    pub token_warning_threshold: Option<usize>,

    /// File selection rules
    pub file_filter_config: FileFilterConfig,

    /// Sort directory entries by name while walking
    pub sort_entries: bool,

    /// Write `code_folder_structure.txt` next to the chunks
    pub write_folder_structure: bool,

    /// Dry run mode (no file writes)
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use docgen::Config;
    ///
    /// let config = Config::builder()
    ///     .input_folder("./src")
    ///     .max_chunk_size(12_000)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// Input folders are not required to exist: missing folders are skipped
    /// with a warning while scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No input folder is configured
    /// - The chunk size or token threshold is zero
    pub fn validate(&self) -> Result<()> {
        if self.input_folders.is_empty() {
            return Err(Error::config("At least one input folder is required"));
        }

        if self.max_chunk_size == 0 {
            return Err(Error::config("max_chunk_size must be greater than 0"));
        }

        if self.token_warning_threshold == Some(0) {
            return Err(Error::config(
                "token_warning_threshold must be greater than 0",
            ));
        }

        if self.input_folders.iter().any(|f| f == &self.output_dir) {
            return Err(Error::config(format!(
                "Output directory {} is also an input folder",
                self.output_dir.display()
            )));
        }

        Ok(())
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input_folders: Vec<PathBuf>,
    base_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    max_chunk_size: Option<usize>,
    tokenizer: Option<TokenizerKind>,
    token_warning_threshold: Option<usize>,
    file_filter_config: Option<FileFilterConfig>,
    sort_entries: Option<bool>,
    write_folder_structure: Option<bool>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Adds a folder to scan.
    #[must_use]
    pub fn input_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_folders.push(path.into());
        self
    }

    /// Adds several folders to scan.
    #[must_use]
    pub fn input_folders<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.input_folders.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Sets the directory that marker paths are relative to.
    #[must_use]
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(path.into());
        self
    }

    /// Sets the output directory for chunk artifacts.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the maximum characters per chunk.
    #[must_use]
    pub fn max_chunk_size(mut self, chars: usize) -> Self {
        self.max_chunk_size = Some(chars);
        self
    }

    /// Sets the token estimator used for diagnostics.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Warns about chunks estimated above `tokens`.
    #[must_use]
    pub fn token_warning_threshold(mut self, tokens: usize) -> Self {
        self.token_warning_threshold = Some(tokens);
        self
    }

    /// Sets the file selection rules.
    #[must_use]
    pub fn file_filter_config(mut self, config: FileFilterConfig) -> Self {
        self.file_filter_config = Some(config);
        self
    }

    /// Enables or disables sorted directory walking.
    #[must_use]
    pub fn sort_entries(mut self, enabled: bool) -> Self {
        self.sort_entries = Some(enabled);
        self
    }

    /// Enables or disables writing the folder structure file.
    #[must_use]
    pub fn write_folder_structure(mut self, enabled: bool) -> Self {
        self.write_folder_structure = Some(enabled);
        self
    }

    /// Enables dry run mode (no file writes).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            input_folders: self.input_folders,
            base_dir: self.base_dir.unwrap_or_else(|| PathBuf::from(".")),
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            max_chunk_size: self.max_chunk_size.unwrap_or(DEFAULT_MAX_CHUNK_SIZE),
            tokenizer: self.tokenizer.unwrap_or_default(),
            token_warning_threshold: self.token_warning_threshold,
            file_filter_config: self.file_filter_config.unwrap_or_default(),
            sort_entries: self.sort_entries.unwrap_or(true),
            write_folder_structure: self.write_folder_structure.unwrap_or(true),
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
