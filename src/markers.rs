//! Boundary marker format shared by the concatenator and the splitter.
//!
//! Every file travels as
//!
//! ```text
//! \n--- FILE_START: <path> ---\n<content>\n--- FILE_END: <path> ---\n
//! ```
//!
//! The format is bit-exact: persisted concatenations and chunk artifacts are
//! re-read with [`extract_files`], which only accepts a start/end pair whose
//! paths are byte-identical.

use crate::file::WrappedFile;
use std::collections::HashMap;
use tracing::trace;

/// Opening marker prefix.
pub const START_PREFIX: &str = "--- FILE_START: ";

/// Closing marker prefix.
pub const END_PREFIX: &str = "--- FILE_END: ";

/// Suffix shared by both markers.
pub const MARKER_SUFFIX: &str = " ---";

/// Wraps `content` in start/end markers carrying `path`.
#[must_use]
pub fn wrap(path: &str, content: &str) -> String {
    format!("\n{START_PREFIX}{path}{MARKER_SUFFIX}\n{content}\n{END_PREFIX}{path}{MARKER_SUFFIX}\n")
}

/// Character count of `wrap(path, content)`.
#[must_use]
pub fn wrapped_len(path: &str, content: &str) -> usize {
    // four newlines, two prefixes, two suffixes, the path twice
    4 + START_PREFIX.len()
        + END_PREFIX.len()
        + 2 * MARKER_SUFFIX.len()
        + 2 * path.chars().count()
        + content.chars().count()
}

/// Returns true if `path` cannot be carried inside a marker line.
#[must_use]
pub fn is_unmarkable_path(path: &str) -> bool {
    path.is_empty()
        || path.contains('\n')
        || path.contains(START_PREFIX.trim_end())
        || path.contains(END_PREFIX.trim_end())
}

/// Re-derives the ordered file list from a marker-delimited stream.
///
/// The scan is line based. A `FILE_START` line opens a candidate file; the
/// candidate is closed only by a later `FILE_END` line carrying the identical
/// path, with at least one content line in between. Lines that look like
/// markers for other paths are part of the content. A start marker that is
/// never closed does not produce a file and scanning resumes on the next line.
#[must_use]
pub fn extract_files(stream: &str) -> Vec<WrappedFile> {
    let lines: Vec<&str> = stream.split('\n').collect();
    let ends = end_markers(&lines);
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(path) = parse_marker(lines[i], START_PREFIX) else {
            i += 1;
            continue;
        };

        match find_end(&ends, i + 2, path) {
            Some(end) => {
                let content = lines[i + 1..end].join("\n");
                files.push(WrappedFile::new(path, content));
                i = end + 1;
            }
            None => {
                trace!("Unterminated start marker for '{}' at line {}", path, i + 1);
                i += 1;
            }
        }
    }

    files
}

/// Line numbers of every `FILE_END` marker, ascending, keyed by path.
fn end_markers<'a>(lines: &[&'a str]) -> HashMap<&'a str, Vec<usize>> {
    let mut ends: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, line) in lines.iter().enumerate() {
        if let Some(path) = parse_marker(line, END_PREFIX) {
            ends.entry(path).or_default().push(j);
        }
    }
    ends
}

fn find_end(ends: &HashMap<&str, Vec<usize>>, from: usize, path: &str) -> Option<usize> {
    let positions = ends.get(path)?;
    positions.get(positions.partition_point(|&j| j < from)).copied()
}

fn parse_marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let path = line.strip_prefix(prefix)?.strip_suffix(MARKER_SUFFIX)?;
    (!path.is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::concatenate;

    #[test]
    fn test_round_trip_preserves_order_and_content() {
        let files = vec![
            WrappedFile::new("src/main.rs", "fn main() {}\n"),
            WrappedFile::new("README.md", "# Title\n\nBody"),
            WrappedFile::new("empty.txt", ""),
            WrappedFile::new("src/lib.rs", "\n\nleading blank lines"),
            WrappedFile::new("win.txt", "a\r\nb\r\n"),
        ];

        let stream = concatenate(&files);
        assert_eq!(extract_files(&stream), files);
    }

    #[test]
    fn test_paths_with_regex_metacharacters() {
        let files = vec![
            WrappedFile::new("a+(b)*[c]?.ts", "x"),
            WrappedFile::new("dir/$^{}|.js", "y"),
        ];

        assert_eq!(extract_files(&concatenate(&files)), files);
    }

    #[test]
    fn test_end_marker_for_other_path_is_content() {
        let content = "before\n--- FILE_END: other.rs ---\nafter";
        let files = vec![WrappedFile::new("a.rs", content)];

        let extracted = extract_files(&concatenate(&files));
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].content, content);
    }

    #[test]
    fn test_nested_start_marker_is_content() {
        let content = "--- FILE_START: inner.rs ---\nstill outer";
        let files = vec![WrappedFile::new("outer.rs", content)];

        let extracted = extract_files(&concatenate(&files));
        assert_eq!(extracted, files);
    }

    #[test]
    fn test_mismatched_paths_are_not_a_pair() {
        let stream = "--- FILE_START: a.rs ---\ncontent\n--- FILE_END: b.rs ---\n";
        assert!(extract_files(stream).is_empty());
    }

    #[test]
    fn test_unterminated_start_resumes_scanning() {
        let stream = format!(
            "--- FILE_START: broken.rs ---\npartial{}",
            wrap("ok.rs", "fine")
        );

        let extracted = extract_files(&stream);
        assert_eq!(extracted, vec![WrappedFile::new("ok.rs", "fine")]);
    }

    #[test]
    fn test_many_unterminated_starts_scan_in_linear_passes() {
        let mut stream = String::new();
        for i in 0..50_000 {
            stream.push_str(&format!("--- FILE_START: stray_{i}.rs ---\n"));
        }
        stream.push_str(&wrap("kept.rs", "body"));

        let started = std::time::Instant::now();
        let extracted = extract_files(&stream);

        assert_eq!(extracted, vec![WrappedFile::new("kept.rs", "body")]);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_prose_around_markers_is_ignored() {
        let stream = format!("preamble text\n{}trailing", wrap("a.md", "body"));
        assert_eq!(extract_files(&stream), vec![WrappedFile::new("a.md", "body")]);
    }

    #[test]
    fn test_wrapped_len() {
        assert_eq!(wrapped_len("a", "b"), wrap("a", "b").len());
        assert_eq!(wrapped_len("", ""), wrap("", "").len());
    }

    #[test]
    fn test_unmarkable_paths() {
        assert!(is_unmarkable_path(""));
        assert!(is_unmarkable_path("a\nb"));
        assert!(is_unmarkable_path("x--- FILE_END: y"));
        assert!(!is_unmarkable_path("src/file.rs"));
    }

    #[test]
    fn test_empty_stream() {
        assert!(extract_files("").is_empty());
    }
}
