use crate::{
    config::Config,
    error::{Error, Result},
    scanner::{render_folder_structure, ScanStats, Scanner},
    splitter::{Chunk, Splitter},
    writer::Writer,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Files seen while walking the input folders
    pub total_files: usize,

    /// Files wrapped into chunks
    pub text_files: usize,

    /// Binary files skipped
    pub binary_files: usize,

    /// Files rejected by name filters or exclusions
    pub filtered_files: usize,

    /// Total number of chunks created
    pub total_chunks: usize,

    /// Total characters across all chunks
    pub total_chars: usize,

    /// Average characters per chunk
    pub avg_chars_per_chunk: usize,

    /// Largest chunk in characters
    pub max_chunk_chars: usize,

    /// Smallest chunk in characters
    pub min_chunk_chars: usize,

    /// Chunks holding a single file larger than the budget
    pub oversized_chunks: usize,

    /// Total execution time
    pub duration: Duration,

    /// Time spent scanning
    pub scan_duration: Duration,

    /// Time spent splitting
    pub split_duration: Duration,

    /// Time spent writing
    pub write_duration: Duration,

    /// Output directory path
    pub output_directory: String,

    /// Number of files written
    pub files_written: usize,
}

/// Stage timings recorded by [`Pipeline::run`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct StageTimings {
    pub(crate) total: Duration,
    pub(crate) scan: Duration,
    pub(crate) split: Duration,
    pub(crate) write: Duration,
}

impl PipelineStats {
    /// Creates statistics from pipeline execution data.
    pub(crate) fn new(
        scan: &ScanStats,
        chunks: &[Chunk],
        max_chunk_size: usize,
        timings: StageTimings,
        output_directory: String,
        files_written: usize,
    ) -> Self {
        let total_chunks = chunks.len();
        let total_chars: usize = chunks.iter().map(|c| c.char_count).sum();

        let avg_chars_per_chunk = if total_chunks > 0 {
            total_chars / total_chunks
        } else {
            0
        };

        Self {
            total_files: scan.total_files,
            text_files: scan.text_files,
            binary_files: scan.binary_files,
            filtered_files: scan.filtered_files,
            total_chunks,
            total_chars,
            avg_chars_per_chunk,
            max_chunk_chars: chunks.iter().map(|c| c.char_count).max().unwrap_or(0),
            min_chunk_chars: chunks.iter().map(|c| c.char_count).min().unwrap_or(0),
            oversized_chunks: chunks
                .iter()
                .filter(|c| c.char_count > max_chunk_size)
                .count(),
            duration: timings.total,
            scan_duration: timings.scan,
            split_duration: timings.split,
            write_duration: timings.write,
            output_directory,
            files_written,
        }
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║           Chunk Generation Summary                    ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Files Scanned:        {:>8}                        ║",
            self.total_files
        );
        println!(
            "║   - Included:         {:>8}                        ║",
            self.text_files
        );
        println!(
            "║   - Filtered out:     {:>8}                        ║",
            self.filtered_files
        );
        println!(
            "║   - Binary:           {:>8}                        ║",
            self.binary_files
        );
        println!("║                                                       ║");
        println!(
            "║ Chunks Created:       {:>8}                        ║",
            self.total_chunks
        );
        println!(
            "║ Total Characters:     {:>8}                        ║",
            self.total_chars
        );
        println!(
            "║ Avg Chars/Chunk:      {:>8}                        ║",
            self.avg_chars_per_chunk
        );
        println!(
            "║ Min Chunk Size:       {:>8} chars                  ║",
            self.min_chunk_chars
        );
        println!(
            "║ Max Chunk Size:       {:>8} chars                  ║",
            self.max_chunk_chars
        );
        if self.oversized_chunks > 0 {
            println!(
                "║ Oversized Chunks:     {:>8}                        ║",
                self.oversized_chunks
            );
        }
        println!("║                                                       ║");
        println!(
            "║ Files Written:        {:>8}                        ║",
            self.files_written
        );
        println!("║ Output Directory:                                     ║");
        println!(
            "║   {}                                              ║",
            self.output_directory
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Scanning:         {:>8.2}s                     ║",
            self.scan_duration.as_secs_f64()
        );
        println!(
            "║   - Splitting:        {:>8.2}s                     ║",
            self.split_duration.as_secs_f64()
        );
        println!(
            "║   - Writing:          {:>8.2}s                     ║",
            self.write_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }

    /// Returns the throughput in files per second.
    #[must_use]
    pub fn throughput_files_per_sec(&self) -> f64 {
        self.total_files as f64 / self.duration.as_secs_f64()
    }
}

/// Scans input folders, splits them into chunks and persists the chunks as
/// numbered artifacts.
pub struct Pipeline {
    config: Config,
    scanner: Scanner,
    splitter: Splitter,
    writer: Writer,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - A filter pattern is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let scanner = Scanner::new(
            config.input_folders.clone(),
            &config.base_dir,
            &config.file_filter_config,
            config.sort_entries,
        )?;

        let mut splitter = Splitter::new(config.max_chunk_size).with_estimator(config.tokenizer);
        if let Some(threshold) = config.token_warning_threshold {
            splitter = splitter.with_token_warning(threshold);
        }

        let writer = Writer::new(&config);

        Ok(Self {
            config,
            scanner,
            splitter,
            writer,
        })
    }

    /// Executes the complete pipeline and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Scan**: Reads matching files from the input folders
    /// 2. **Split**: Groups wrapped files into chunks within the character budget
    /// 3. **Write**: Persists chunks, folder structure and summary
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoContent`] if no file matched, or an IO error if
    /// writing fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use docgen::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input_folder("./src")
    ///     .output_dir("./chunks")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(folders = self.config.input_folders.len()))]
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut timings = StageTimings::default();

        info!("Starting chunk generation");

        info!("Stage 1/3: Scanning input folders...");
        let scan_start = Instant::now();
        let (files, scan_stats) = self.scanner.scan_with_stats();
        timings.scan = scan_start.elapsed();

        if files.is_empty() {
            return Err(Error::no_content(self.scanner.folders()));
        }

        info!(
            "✓ Collected {} files ({} filtered, {} binary) in {:.2}s",
            scan_stats.text_files,
            scan_stats.filtered_files,
            scan_stats.binary_files,
            timings.scan.as_secs_f64()
        );

        info!("Stage 2/3: Splitting into chunks...");
        let split_start = Instant::now();
        let chunks = self.splitter.split(&files);
        timings.split = split_start.elapsed();

        info!(
            "✓ Created {} chunks in {:.2}s",
            chunks.len(),
            timings.split.as_secs_f64()
        );

        self.log_chunk_distribution(&chunks);

        let write_start = Instant::now();
        let files_written = if self.config.dry_run {
            warn!("Dry run mode enabled - skipping file writes");
            self.print_dry_run_summary(&chunks, files.len());
            0
        } else {
            info!("Stage 3/3: Writing chunk artifacts...");
            self.writer.write_chunks(&chunks)?;
            let mut written = chunks.len();

            if self.config.write_folder_structure {
                let tree = render_folder_structure(
                    self.scanner.folders(),
                    &self.config.file_filter_config,
                );
                self.writer.write_folder_structure(&tree)?;
                written += 1;
            }

            self.writer.write_summary(&chunks, start_time.elapsed())?;
            written + 1
        };
        timings.write = write_start.elapsed();

        if !self.config.dry_run {
            info!(
                "✓ Wrote {} files in {:.2}s",
                files_written,
                timings.write.as_secs_f64()
            );
        }

        timings.total = start_time.elapsed();

        let stats = PipelineStats::new(
            &scan_stats,
            &chunks,
            self.config.max_chunk_size,
            timings,
            self.config.output_dir.display().to_string(),
            files_written,
        );

        info!(
            "✓ Chunk generation completed in {:.2}s",
            timings.total.as_secs_f64()
        );

        Ok(stats)
    }

    fn log_chunk_distribution(&self, chunks: &[Chunk]) {
        if chunks.is_empty() {
            return;
        }

        let total: usize = chunks.iter().map(|c| c.char_count).sum();
        let max = chunks.iter().map(|c| c.char_count).max().unwrap_or(0);
        let min = chunks.iter().map(|c| c.char_count).min().unwrap_or(0);

        info!(
            "  Chunk stats: avg={}, min={}, max={} chars",
            total / chunks.len(),
            min,
            max
        );

        let oversized = chunks
            .iter()
            .filter(|c| c.char_count > self.config.max_chunk_size)
            .count();

        if oversized > 0 {
            warn!(
                "  {} chunk(s) hold a single file larger than the {} char budget",
                oversized, self.config.max_chunk_size
            );
        }
    }

    fn print_dry_run_summary(&self, chunks: &[Chunk], total_files: usize) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                 Dry Run Summary                       ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Total chunks:         {:>8}                        ║",
            chunks.len()
        );
        println!(
            "║ Total files:          {:>8}                        ║",
            total_files
        );
        println!("║ Output directory:                                     ║");
        println!(
            "║   {}                                              ║",
            self.config.output_dir.display()
        );
        println!("║                                                       ║");
        println!("║ ⚠ No files were written (dry run mode)               ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::read_chunk_artifacts;
    use assert_fs::prelude::*;

    fn create_test_config(root: &std::path::Path) -> Config {
        Config::builder()
            .input_folder(root.join("src"))
            .base_dir(root)
            .output_dir(root.join("out"))
            .max_chunk_size(200)
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_basic_execution() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/file1.rs").write_str("fn main() {}").unwrap();
        temp.child("src/file2.rs").write_str("pub fn test() {}").unwrap();

        let stats = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.text_files, 2);
        assert!(stats.total_chunks > 0);
        assert!(temp.child("out/code_part_001.txt").exists());
        assert!(temp.child("out/code_folder_structure.txt").exists());
        assert!(temp.child("out/summary.json").exists());
        assert_eq!(stats.files_written, stats.total_chunks + 2);
    }

    #[test]
    fn test_pipeline_chunks_carry_relative_paths() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/lib.rs").write_str("pub mod a;").unwrap();

        Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        let chunk = std::fs::read_to_string(temp.child("out/code_part_001.txt").path()).unwrap();
        let expected_path = std::path::Path::new("src").join("lib.rs");
        assert!(chunk.starts_with(&format!("--- FILE_START: {} ---", expected_path.display())));
    }

    #[test]
    fn test_pipeline_dry_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/file.rs").write_str("fn main() {}").unwrap();

        let config = Config::builder()
            .input_folder(temp.path().join("src"))
            .output_dir(temp.path().join("out"))
            .dry_run(true)
            .build()
            .unwrap();

        let stats = Pipeline::new(config).unwrap().run().unwrap();

        assert_eq!(stats.files_written, 0);
        assert!(!temp.child("out").exists());
    }

    #[test]
    fn test_pipeline_no_content() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/image.png").write_binary(&[0x89, 0x50]).unwrap();

        let err = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap_err();

        assert!(err.is_no_content());
    }

    #[tokio::test]
    async fn test_generated_chunks_reproduce_all_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        for i in 0..12 {
            temp.child(format!("src/mod{i:02}.rs"))
                .write_str(&"let x = 1;\n".repeat(i + 1))
                .unwrap();
        }

        let stats = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        let chunks = read_chunk_artifacts(&[temp.path().join("out")]).await.unwrap();
        assert_eq!(chunks.len(), stats.total_chunks);

        let files: Vec<_> = chunks
            .iter()
            .flat_map(|c| crate::markers::extract_files(c))
            .collect();
        assert_eq!(files.len(), 12);
        for (i, file) in files.iter().enumerate() {
            assert!(file.path.ends_with(&format!("mod{i:02}.rs")));
            assert_eq!(file.content, "let x = 1;\n".repeat(i + 1));
        }
    }

    #[test]
    fn test_pipeline_stats_calculation() {
        let chunks = vec![Chunk::new(1, "x".repeat(100)), Chunk::new(2, "y".repeat(300))];
        let scan = ScanStats {
            total_files: 3,
            text_files: 2,
            binary_files: 1,
            ..ScanStats::default()
        };

        let stats = PipelineStats::new(
            &scan,
            &chunks,
            250,
            StageTimings {
                total: Duration::from_secs(1),
                ..StageTimings::default()
            },
            "/tmp/out".to_string(),
            4,
        );

        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_chars, 400);
        assert_eq!(stats.avg_chars_per_chunk, 200);
        assert_eq!(stats.max_chunk_chars, 300);
        assert_eq!(stats.min_chunk_chars, 100);
        assert_eq!(stats.oversized_chunks, 1);
        assert_eq!(stats.throughput_files_per_sec(), 3.0);
    }
}
