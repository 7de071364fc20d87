use crate::{
    file::WrappedFile,
    markers,
    token::{TokenEstimator, TokenizerKind},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 9_000;

/// One bounded unit of serialized file content, sent as a single LLM message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequential chunk index (1-based, contiguous)
    pub index: usize,

    /// Wrapped files, trimmed of surrounding whitespace
    pub text: String,

    /// Length of `text` in characters
    pub char_count: usize,
}

impl Chunk {
    /// Creates a new chunk from its text.
    #[must_use]
    pub fn new(index: usize, text: String) -> Self {
        let char_count = text.chars().count();
        Self {
            index,
            text,
            char_count,
        }
    }

    /// Re-derives the files carried by this chunk.
    #[must_use]
    pub fn files(&self) -> Vec<WrappedFile> {
        markers::extract_files(&self.text)
    }

    /// Returns the utilization relative to `max_chars` (may exceed 1.0 for oversized files).
    #[must_use]
    pub fn utilization(&self, max_chars: usize) -> f64 {
        if max_chars == 0 {
            return 0.0;
        }
        self.char_count as f64 / max_chars as f64
    }
}

/// Groups wrapped files into chunks without ever splitting a file.
///
/// The size limit is soft: a file whose wrapped form alone is larger than
/// the limit is emitted as its own, oversized chunk.
pub struct Splitter {
    max_chunk_size: usize,
    estimator: Arc<dyn TokenEstimator>,
    token_warning_threshold: Option<usize>,
}

impl Splitter {
    /// Creates a splitter with the given character limit.
    #[must_use]
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            estimator: TokenizerKind::default().create(),
            token_warning_threshold: None,
        }
    }

    /// Sets the estimator used for token diagnostics.
    #[must_use]
    pub fn with_estimator(mut self, kind: TokenizerKind) -> Self {
        self.estimator = kind.create();
        self
    }

    /// Warns about chunks whose estimated token count exceeds `tokens`.
    #[must_use]
    pub fn with_token_warning(mut self, tokens: usize) -> Self {
        self.token_warning_threshold = Some(tokens);
        self
    }

    /// Returns the configured character limit.
    #[must_use]
    pub const fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Splits files into chunks, preserving order.
    ///
    /// # Algorithm
    ///
    /// 1. Each file is measured in its fully wrapped form
    /// 2. If appending it would push a non-empty buffer past the limit, the
    ///    buffer is closed as a chunk and a new one starts with this file
    /// 3. Otherwise the file is appended to the buffer
    /// 4. The remaining buffer becomes the last chunk
    ///
    /// Empty input yields no chunks.
    #[must_use]
    pub fn split(&self, files: &[WrappedFile]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut builder = ChunkBuilder::default();

        for file in files {
            let wrapped_len = file.wrapped_len();

            if !builder.is_empty() && builder.char_count + wrapped_len > self.max_chunk_size {
                let full = std::mem::take(&mut builder);
                chunks.push(full.build(chunks.len() + 1));
            }

            if builder.is_empty() && wrapped_len > self.max_chunk_size {
                debug!(
                    "File '{}' exceeds chunk size ({} > {} chars), keeping it whole",
                    file.path, wrapped_len, self.max_chunk_size
                );
            }

            builder.push(file, wrapped_len);
        }

        if !builder.is_empty() {
            chunks.push(builder.build(chunks.len() + 1));
        }

        self.log_split_results(&chunks, files.len());
        chunks
    }

    /// Splits a previously concatenated stream by first re-deriving its files.
    #[must_use]
    pub fn split_stream(&self, stream: &str) -> Vec<Chunk> {
        if stream.is_empty() {
            return Vec::new();
        }
        self.split(&markers::extract_files(stream))
    }

    fn log_split_results(&self, chunks: &[Chunk], total_files: usize) {
        if chunks.is_empty() {
            return;
        }

        let avg_utilization = chunks
            .iter()
            .map(|c| c.utilization(self.max_chunk_size))
            .sum::<f64>()
            / chunks.len() as f64;

        debug!(
            "Created {} chunks from {} files (avg utilization: {:.1}%)",
            chunks.len(),
            total_files,
            avg_utilization * 100.0
        );

        for chunk in chunks {
            let tokens = self.estimator.estimate(&chunk.text);
            debug!(
                "Chunk {}: {} chars, ~{} tokens",
                chunk.index, chunk.char_count, tokens
            );

            if let Some(limit) = self.token_warning_threshold {
                if tokens > limit {
                    warn!(
                        "Chunk {} is within the character budget but estimated at ~{} tokens (threshold {})",
                        chunk.index, tokens, limit
                    );
                }
            }
        }
    }
}

/// Accumulates wrapped files for one chunk.
#[derive(Default)]
struct ChunkBuilder {
    buffer: String,
    char_count: usize,
}

impl ChunkBuilder {
    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn push(&mut self, file: &WrappedFile, wrapped_len: usize) {
        self.buffer.push_str(&file.wrapped());
        self.char_count += wrapped_len;
    }

    fn build(self, index: usize) -> Chunk {
        Chunk::new(index, self.buffer.trim().to_string())
    }
}
