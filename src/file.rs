use crate::error::{Error, Result};
use crate::markers;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

static BINARY_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "exe", "dll", "so", "dylib", "a", "o", "obj", "png", "jpg", "jpeg", "gif", "bmp", "ico",
        "webp", "mp3", "mp4", "avi", "mkv", "mov", "wav", "flac", "pdf", "doc", "docx", "xls",
        "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "wasm", "pyc",
        "class",
    ]
    .into_iter()
    .collect()
});

/// A source file paired with the relative path that identifies it in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedFile {
    /// Relative path, repeated verbatim in both boundary markers
    pub path: String,

    /// Raw file content, never modified
    pub content: String,
}

impl WrappedFile {
    /// Creates a new wrapped file.
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Returns the file in its fully wrapped textual form.
    #[must_use]
    pub fn wrapped(&self) -> String {
        markers::wrap(&self.path, &self.content)
    }

    /// Returns the character count of the wrapped form without allocating it.
    #[must_use]
    pub fn wrapped_len(&self) -> usize {
        markers::wrapped_len(&self.path, &self.content)
    }
}

/// Concatenates files into one marker-delimited stream, preserving order.
#[must_use]
pub fn concatenate(files: &[WrappedFile]) -> String {
    let capacity = files.iter().map(|f| f.content.len() + 2 * f.path.len() + 40).sum();
    let mut stream = String::with_capacity(capacity);
    for file in files {
        stream.push_str(&file.wrapped());
    }
    stream
}

/// Sniffs the head of a file for content that cannot be carried as text.
///
/// A NUL byte or an invalid UTF-8 sequence in the first 8 KiB marks the
/// file as binary. A multi-byte character cut by the sample boundary does
/// not count.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub(crate) fn is_likely_binary(path: &Path) -> Result<bool> {
    const SAMPLE_SIZE: u64 = 8 * 1024;

    let mut sample = Vec::with_capacity(SAMPLE_SIZE as usize);
    File::open(path)
        .and_then(|f| f.take(SAMPLE_SIZE).read_to_end(&mut sample))
        .map_err(|e| Error::io(path, e))?;

    if memchr::memchr(0, &sample).is_some() {
        return Ok(true);
    }

    Ok(match std::str::from_utf8(&sample) {
        Ok(_) => false,
        Err(e) => e.error_len().is_some(),
    })
}

/// Checks if a file extension suggests a binary file.
#[must_use]
pub(crate) fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(ext.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_wrapped_form_is_bit_exact() {
        let file = WrappedFile::new("src/a.ts", "let a = 1;");

        assert_eq!(
            file.wrapped(),
            "\n--- FILE_START: src/a.ts ---\nlet a = 1;\n--- FILE_END: src/a.ts ---\n"
        );
    }

    #[test]
    fn test_wrapped_len_matches_wrapped() {
        let file = WrappedFile::new("ünï/ç.rs", "fn main() { println!(\"é\"); }");
        assert_eq!(file.wrapped_len(), file.wrapped().chars().count());
    }

    #[test]
    fn test_concatenate_preserves_order() {
        let files = vec![WrappedFile::new("b.rs", "b"), WrappedFile::new("a.rs", "a")];
        let stream = concatenate(&files);

        let b = stream.find("FILE_START: b.rs").unwrap();
        let a = stream.find("FILE_START: a.rs").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_concatenate_empty() {
        assert!(concatenate(&[]).is_empty());
    }


    #[test]
    fn test_plain_text_is_not_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("test.txt");
        file.write_str("Hello, world!").unwrap();

        assert!(!is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_non_latin_utf8_is_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("ru.md");
        file.write_str("Привет, мир! Это обычный текст.").unwrap();

        assert!(!is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_nul_bytes_are_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("test.bin");

        file.write_binary(&[0u8; 100]).unwrap();

        assert!(is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_invalid_utf8_is_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("latin1.txt");
        file.write_binary(b"caf\xe9 au lait").unwrap();

        assert!(is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_sample_boundary_inside_character_is_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("wide.md");
        // 8191 ASCII bytes then a two-byte character straddling the sample edge
        file.write_str(&format!("{}é", "a".repeat(8 * 1024 - 1))).unwrap();

        assert!(!is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_empty_file_is_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("empty.txt");
        file.touch().unwrap();

        assert!(!is_likely_binary(file.path()).unwrap());
    }

    #[test]
    fn test_binary_extensions() {
        assert!(has_binary_extension(Path::new("app.exe")));
        assert!(has_binary_extension(Path::new("image.PNG")));
        assert!(has_binary_extension(Path::new("archive.zip")));
        assert!(!has_binary_extension(Path::new("code.rs")));
        assert!(!has_binary_extension(Path::new("Makefile")));
    }
}
