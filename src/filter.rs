//! File selection rules applied while walking input folders.
//!
//! Name filters are globs where `*` matches any run of characters. A filter
//! selects a file when it matches the file's extension, with or without its
//! leading dot (so `*.ts`, `.ts` and `ts` all select `app.ts`), or the full
//! basename (so `Dockerfile` or `*.config.js` work too).

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Lock-file artifacts that are never serialized.
pub const DEFAULT_EXCLUDED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
    "poetry.lock",
];

/// Generated test-report directories that are never descended into.
pub const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &["playwright-report"];

/// Configuration for file filtering with glob patterns.
#[derive(Debug, Clone)]
pub struct FileFilterConfig {
    include: Vec<String>,
    exclude_files: Vec<String>,
    exclude_directories: Vec<String>,
}

impl Default for FileFilterConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude_files: DEFAULT_EXCLUDED_FILES.iter().map(ToString::to_string).collect(),
            exclude_directories: DEFAULT_EXCLUDED_DIRECTORIES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl FileFilterConfig {
    /// Creates the default configuration (everything except lock files and report dirs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts processing to files matching any of the given name filters.
    ///
    /// An empty list accepts every file.
    #[must_use]
    pub fn include<S: AsRef<str>>(mut self, filters: &[S]) -> Self {
        self.include = filters.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    /// Adds basenames that are always skipped.
    #[must_use]
    pub fn exclude_files<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.exclude_files
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }

    /// Adds directory names that are never descended into.
    #[must_use]
    pub fn exclude_directories<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.exclude_directories
            .extend(names.iter().map(|n| n.as_ref().to_string()));
        self
    }
}

/// Compiled form of [`FileFilterConfig`].
#[derive(Debug, Clone)]
pub(crate) struct FileFilter {
    include: Option<GlobSet>,
    exclude_files: GlobSet,
    exclude_directories: GlobSet,
}

impl FileFilter {
    /// Compiles the configured patterns.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any pattern is not a valid glob.
    pub(crate) fn new(config: &FileFilterConfig) -> Result<Self> {
        let include = if config.include.is_empty() {
            None
        } else {
            Some(Self::build_globset(&config.include)?)
        };

        Ok(Self {
            include,
            exclude_files: Self::build_globset(&config.exclude_files)?,
            exclude_directories: Self::build_globset(&config.exclude_directories)?,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {}", e)))
    }

    /// Returns false for directories that must not be descended into.
    pub(crate) fn should_descend(&self, dir: &Path) -> bool {
        dir.file_name()
            .map_or(true, |name| !self.exclude_directories.is_match(name))
    }

    /// Returns true if the basename is on the exclusion list, ignoring name filters.
    pub(crate) fn is_excluded_file(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.exclude_files.is_match(name))
    }

    /// Returns true if the file passes exclusion rules and name filters.
    pub(crate) fn should_process(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };

        if self.is_excluded_file(path) {
            return false;
        }

        let Some(ref include) = self.include else {
            return true;
        };

        if include.is_match(name) {
            return true;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| include.is_match(ext) || include.is_match(format!(".{ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str]) -> FileFilter {
        FileFilter::new(&FileFilterConfig::default().include(include)).unwrap()
    }

    #[test]
    fn test_no_filters_accepts_everything() {
        let f = filter(&[]);
        assert!(f.should_process(Path::new("src/main.rs")));
        assert!(f.should_process(Path::new("Makefile")));
    }

    #[test]
    fn test_extension_filter() {
        let f = filter(&["*.ts", "*.md"]);
        assert!(f.should_process(Path::new("src/app.ts")));
        assert!(f.should_process(Path::new("docs/README.md")));
        assert!(!f.should_process(Path::new("src/app.js")));
    }

    #[test]
    fn test_bare_extension_filter() {
        let f = filter(&["ts", ".md"]);
        assert!(f.should_process(Path::new("src/app.ts")));
        assert!(f.should_process(Path::new("docs/README.md")));
        assert!(!f.should_process(Path::new("src/posts")));
        assert!(!f.should_process(Path::new("src/app.tsx")));
    }

    #[test]
    fn test_basename_filter() {
        let f = filter(&["Dockerfile", "*.config.js"]);
        assert!(f.should_process(Path::new("deploy/Dockerfile")));
        assert!(f.should_process(Path::new("web/vite.config.js")));
        assert!(!f.should_process(Path::new("web/main.js")));
    }

    #[test]
    fn test_star_matches_any_run() {
        let f = filter(&["test_*"]);
        assert!(f.should_process(Path::new("tests/test_parser.py")));
        assert!(!f.should_process(Path::new("tests/parser_test.py")));
    }

    #[test]
    fn test_lock_files_excluded_even_when_filter_matches() {
        let f = filter(&["*.json"]);
        assert!(f.should_process(Path::new("package.json")));
        assert!(!f.should_process(Path::new("app/package-lock.json")));
        assert!(!filter(&[]).should_process(Path::new("Cargo.lock")));
    }

    #[test]
    fn test_report_directory_not_descended() {
        let f = filter(&[]);
        assert!(!f.should_descend(Path::new("web/playwright-report")));
        assert!(f.should_descend(Path::new("web/src")));
    }

    #[test]
    fn test_extra_exclusions() {
        let config = FileFilterConfig::new()
            .exclude_files(&["secrets.env"])
            .exclude_directories(&["node_modules"]);
        let f = FileFilter::new(&config).unwrap();

        assert!(!f.should_process(Path::new("secrets.env")));
        assert!(!f.should_descend(Path::new("node_modules")));
        assert!(!f.should_process(Path::new("yarn.lock")));
    }

    #[test]
    fn test_invalid_glob_is_config_error() {
        let result = FileFilter::new(&FileFilterConfig::new().include(&["src/[unclosed"]));
        assert!(result.unwrap_err().is_config());
    }
}
