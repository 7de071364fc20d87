use crate::{
    config::Config,
    error::{Error, Result},
    splitter::Chunk,
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// Prefix shared by every chunk artifact file.
pub const ARTIFACT_PREFIX: &str = "code_part_";

/// Extension of chunk artifact files.
pub const ARTIFACT_EXTENSION: &str = "txt";

/// File holding the rendered folder structure.
pub const FOLDER_STRUCTURE_FILE: &str = "code_folder_structure.txt";

/// Generation summary written next to the chunks.
pub const SUMMARY_FILE: &str = "summary.json";

/// Summary of written chunk artifacts.
#[derive(Debug, Serialize)]
pub(crate) struct WriteSummary {
    /// Total number of chunks written
    pub total_chunks: usize,

    /// Total number of files across all chunks
    pub total_files: usize,

    /// Total characters across all chunks
    pub total_chars: usize,

    /// Character budget used for splitting
    pub max_chunk_size: usize,

    /// Execution duration in seconds
    pub duration_secs: f64,

    /// Output directory path
    pub output_directory: String,

    /// Individual chunk summaries
    pub chunks: Vec<ChunkSummary>,

    /// Generation timestamp
    pub generated_at: String,
}

/// Summary of a single chunk.
#[derive(Debug, Serialize)]
pub(crate) struct ChunkSummary {
    /// Chunk index (1-based)
    pub index: usize,

    /// Number of files in chunk
    pub files: usize,

    /// Characters in chunk
    pub chars: usize,

    /// Output filename
    pub filename: String,
}

/// Returns the artifact filename for a 1-based chunk index.
///
/// Indices are zero-padded so lexicographic order matches chunk order.
#[must_use]
pub fn artifact_name(index: usize) -> String {
    format!("{ARTIFACT_PREFIX}{index:03}.{ARTIFACT_EXTENSION}")
}

fn is_artifact_name(name: &str) -> bool {
    name.strip_prefix(ARTIFACT_PREFIX)
        .and_then(|rest| rest.strip_suffix(&format!(".{ARTIFACT_EXTENSION}")))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Writes chunk artifacts with atomic operations.
pub(crate) struct Writer {
    output_dir: PathBuf,
    max_chunk_size: usize,
}

impl Writer {
    /// Creates a new writer from configuration.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            max_chunk_size: config.max_chunk_size,
        }
    }

    /// Writes all chunks, replacing any artifacts from a previous generation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Output directory cannot be created
    /// - Stale artifacts cannot be removed
    /// - File write operations fail
    pub(crate) fn write_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let removed = self.remove_stale_artifacts()?;
        if removed > 0 {
            debug!("Removed {} stale chunk artifacts", removed);
        }

        info!("Writing {} chunks to {}", chunks.len(), self.output_dir.display());

        for chunk in chunks {
            let path = self.output_dir.join(artifact_name(chunk.index));
            write_file_atomic(&path, &chunk.text)?;

            debug!(
                "Wrote chunk {}/{} ({} chars) to {}",
                chunk.index,
                chunks.len(),
                chunk.char_count,
                path.display()
            );
        }

        info!("Successfully wrote {} chunk files", chunks.len());
        Ok(())
    }

    /// Writes the rendered folder structure next to the chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub(crate) fn write_folder_structure(&self, tree: &str) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let path = self.output_dir.join(FOLDER_STRUCTURE_FILE);
        write_file_atomic(&path, tree)?;

        debug!("Wrote folder structure to {}", path.display());
        Ok(())
    }

    /// Writes a summary JSON file with metadata about all chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be written.
    pub(crate) fn write_summary(&self, chunks: &[Chunk], duration: Duration) -> Result<()> {
        let per_chunk: Vec<ChunkSummary> = chunks
            .iter()
            .map(|c| ChunkSummary {
                index: c.index,
                files: c.files().len(),
                chars: c.char_count,
                filename: artifact_name(c.index),
            })
            .collect();

        let summary = WriteSummary {
            total_chunks: chunks.len(),
            total_files: per_chunk.iter().map(|c| c.files).sum(),
            total_chars: chunks.iter().map(|c| c.char_count).sum(),
            max_chunk_size: self.max_chunk_size,
            duration_secs: duration.as_secs_f64(),
            output_directory: self.output_dir.display().to_string(),
            chunks: per_chunk,
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        };

        let summary_path = self.output_dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(&summary)?;
        write_file_atomic(&summary_path, &json)?;

        info!("Wrote summary to {}", summary_path.display());
        Ok(())
    }

    fn remove_stale_artifacts(&self) -> Result<usize> {
        let mut removed = 0;

        for path in list_artifacts(&self.output_dir)? {
            fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            removed += 1;
        }

        Ok(removed)
    }
}

/// Writes a file atomically.
///
/// # Process
///
/// 1. Writes content to a temporary file
/// 2. Syncs temporary file to disk
/// 3. Atomically renames temporary file to target path
fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .sync_all()
        .map_err(|e| Error::io(&temp_path, e))?;

    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

    Ok(())
}

/// Lists chunk artifacts in `folder`, sorted by filename.
///
/// A missing folder has no artifacts.
///
/// # Errors
///
/// Returns an error if the folder exists but cannot be listed.
pub fn list_artifacts(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(folder, e)),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(folder, e))?;
        let is_artifact = entry.file_name().to_str().is_some_and(is_artifact_name);
        if is_artifact && entry.path().is_file() {
            paths.push(entry.path());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Reads every chunk artifact found in `folders`, in folder order and sorted
/// filename order within a folder. Contents are returned verbatim.
///
/// # Errors
///
/// Returns an IO error if a folder cannot be listed or an artifact cannot be read.
pub async fn read_chunk_artifacts(folders: &[PathBuf]) -> Result<Vec<String>> {
    let mut chunks = Vec::new();

    for folder in folders {
        for path in list_artifacts(folder)? {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io(&path, e))?;
            debug!("Loaded chunk artifact {}", path.display());
            chunks.push(text);
        }
    }

    Ok(chunks)
}
