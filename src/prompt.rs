use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Builds the ordered message list for one model call.
///
/// The initial instruction comes first, every chunk follows in the given
/// order, and the post instruction closes the list. Chunks are neither
/// merged nor skipped.
#[must_use]
pub fn assemble_messages<S: AsRef<str>>(initial: &str, chunks: &[S], post: &str) -> Vec<String> {
    let mut messages = Vec::with_capacity(chunks.len() + 2);
    messages.push(initial.to_string());
    messages.extend(chunks.iter().map(|c| c.as_ref().to_string()));
    messages.push(post.to_string());
    messages
}

/// Reads an instruction file.
///
/// # Errors
///
/// Returns [`Error::InputAbsent`] if the file does not exist and
/// [`Error::Io`] if it cannot be read.
pub async fn load_instruction(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            debug!("Loaded instruction {} ({} chars)", path.display(), text.chars().count());
            Ok(text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::input_absent(path)),
        Err(e) => Err(Error::io(path, e)),
    }
}
