use crate::{
    error::Result,
    file::{has_binary_extension, is_likely_binary, WrappedFile},
    filter::{FileFilter, FileFilterConfig},
    markers,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Statistics collected during scanning.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Input folders that were walked
    pub folders_scanned: usize,

    /// Input folders that did not exist
    pub folders_missing: usize,

    /// Files seen by the walker
    pub total_files: usize,

    /// Files wrapped into the stream
    pub text_files: usize,

    /// Files rejected by name filters or exclusions
    pub filtered_files: usize,

    /// Binary files skipped
    pub binary_files: usize,

    /// Unreadable files and walk errors
    pub errors: usize,
}

/// Walks input folders and collects wrapped files in enumeration order.
pub struct Scanner {
    folders: Vec<PathBuf>,
    base_dir: PathBuf,
    filter: FileFilter,
    sort_entries: bool,
}

impl Scanner {
    /// Creates a scanner over `folders`; relative paths in markers are computed against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a filter pattern is invalid.
    pub fn new(
        folders: Vec<PathBuf>,
        base_dir: impl Into<PathBuf>,
        filter_config: &FileFilterConfig,
        sort_entries: bool,
    ) -> Result<Self> {
        Ok(Self {
            folders,
            base_dir: base_dir.into(),
            filter: FileFilter::new(filter_config)?,
            sort_entries,
        })
    }

    /// Returns the configured input folders.
    #[must_use]
    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Collects every matching file.
    ///
    /// Missing folders and unreadable files are skipped with a warning. An
    /// empty result means "no content"; it is up to the caller to decide
    /// whether that is an error.
    #[must_use]
    pub fn scan(&self) -> Vec<WrappedFile> {
        self.scan_with_stats().0
    }

    /// Like [`Scanner::scan`], also returning scan statistics.
    #[must_use]
    pub fn scan_with_stats(&self) -> (Vec<WrappedFile>, ScanStats) {
        let mut files = Vec::new();
        let mut stats = ScanStats::default();
        let base_dir = absolutize(&self.base_dir);

        for folder in &self.folders {
            if !folder.is_dir() {
                warn!("Input folder not found: {}", folder.display());
                stats.folders_missing += 1;
                continue;
            }

            stats.folders_scanned += 1;
            debug!("Scanning {}", folder.display());
            self.scan_folder(folder, &base_dir, &mut files, &mut stats);
        }

        debug!(
            "Scan complete: {} total, {} text, {} filtered, {} binary, {} errors",
            stats.total_files,
            stats.text_files,
            stats.filtered_files,
            stats.binary_files,
            stats.errors
        );

        (files, stats)
    }

    /// Collects matching files and concatenates them into one marker-delimited stream.
    #[must_use]
    pub fn concatenate(&self) -> String {
        crate::file::concatenate(&self.scan())
    }

    fn scan_folder(
        &self,
        folder: &Path,
        base_dir: &Path,
        files: &mut Vec<WrappedFile>,
        stats: &mut ScanStats,
    ) {
        let mut walker = WalkDir::new(folder).follow_links(false);
        if self.sort_entries {
            walker = walker.sort_by_file_name();
        }

        let entries = walker.into_iter().filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || self.filter.should_descend(entry.path())
        });

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            stats.total_files += 1;

            if !self.filter.should_process(entry.path()) {
                stats.filtered_files += 1;
                continue;
            }

            if let Some(file) = Self::process_entry(entry.path(), base_dir, stats) {
                files.push(file);
            }
        }
    }

    /// Reads one file, returning `None` when it has to be skipped.
    fn process_entry(path: &Path, base_dir: &Path, stats: &mut ScanStats) -> Option<WrappedFile> {
        trace!("Processing file: {}", path.display());

        let absolute = absolutize(path);
        let relative_path = pathdiff::diff_paths(&absolute, base_dir)
            .unwrap_or(absolute)
            .to_string_lossy()
            .to_string();

        if markers::is_unmarkable_path(&relative_path) {
            warn!("Skipping file whose path collides with boundary markers: {}", relative_path);
            stats.errors += 1;
            return None;
        }

        if has_binary_extension(path) || is_likely_binary(path).unwrap_or(false) {
            debug!("Skipping binary file: {}", relative_path);
            stats.binary_files += 1;
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => {
                stats.text_files += 1;
                Some(WrappedFile::new(relative_path, content))
            }
            Err(e) => {
                warn!("Could not read file {}: {}", path.display(), e);
                stats.errors += 1;
                None
            }
        }
    }
}

/// Renders an indented listing of each folder: directories first, then files.
///
/// Excluded files (lock files) are omitted. Missing folders are skipped.
#[must_use]
pub fn render_folder_structure(folders: &[PathBuf], filter_config: &FileFilterConfig) -> String {
    let excluded = FileFilter::new(filter_config).ok();
    let mut out = String::new();

    for folder in folders {
        if !folder.is_dir() {
            continue;
        }
        let name = folder
            .file_name()
            .map_or_else(|| folder.display().to_string(), |n| n.to_string_lossy().to_string());
        out.push_str(&format!("{name}/\n"));
        render_dir(folder, "  ", excluded.as_ref(), &mut out);
    }

    out
}

fn render_dir(dir: &Path, prefix: &str, filter: Option<&FileFilter>, out: &mut String) {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(read) => read.filter_map(std::result::Result::ok).collect(),
        Err(e) => {
            warn!("Could not read directory {}: {}", dir.display(), e);
            return;
        }
    };
    entries.sort_by_key(fs::DirEntry::file_name);

    let (dirs, files): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|e| e.file_type().is_ok_and(|t| t.is_dir()));

    for entry in dirs {
        out.push_str(&format!("{prefix}{}/\n", entry.file_name().to_string_lossy()));
        render_dir(&entry.path(), &format!("{prefix}  "), filter, out);
    }

    for entry in files {
        let path = entry.path();
        if filter.is_some_and(|f| f.is_excluded_file(&path)) {
            continue;
        }
        out.push_str(&format!("{prefix}{}\n", entry.file_name().to_string_lossy()));
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::extract_files;
    use assert_fs::prelude::*;

    fn scanner(root: &Path, folders: &[&str], filters: &[&str]) -> Scanner {
        Scanner::new(
            folders.iter().map(|f| root.join(f)).collect(),
            root,
            &FileFilterConfig::default().include(filters),
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_scanner_finds_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("proj/file1.rs").write_str("fn main() {}").unwrap();
        temp.child("proj/file2.rs").write_str("pub fn test() {}").unwrap();

        let files = scanner(temp.path(), &["proj"], &[]).scan();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, Path::new("proj").join("file1.rs").to_string_lossy());
        assert_eq!(files[1].content, "pub fn test() {}");
    }

    #[test]
    fn test_scanner_depth_first_sorted_order() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("p/b.ts").write_str("b").unwrap();
        temp.child("p/a/z.ts").write_str("z").unwrap();
        temp.child("p/a/y.ts").write_str("y").unwrap();
        temp.child("p/c.ts").write_str("c").unwrap();

        let contents: Vec<_> = scanner(temp.path(), &["p"], &[])
            .scan()
            .into_iter()
            .map(|f| f.content)
            .collect();

        assert_eq!(contents, vec!["y", "z", "b", "c"]);
    }

    #[test]
    fn test_scanner_applies_filters_and_exclusions() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("p/app.ts").write_str("ts").unwrap();
        temp.child("p/app.css").write_str("css").unwrap();
        temp.child("p/package-lock.json").write_str("{}").unwrap();
        temp.child("p/package.json").write_str("{}").unwrap();
        temp.child("p/playwright-report/index.ts").write_str("report").unwrap();

        let (files, stats) = scanner(temp.path(), &["p"], &["*.ts", "*.json"]).scan_with_stats();
        let names: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("app.ts")));
        assert!(names.iter().any(|n| n.ends_with("package.json")));
        assert_eq!(stats.filtered_files, 2);
    }

    #[test]
    fn test_scanner_skips_missing_folder() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("real/a.md").write_str("a").unwrap();

        let (files, stats) = scanner(temp.path(), &["missing", "real"], &[]).scan_with_stats();

        assert_eq!(files.len(), 1);
        assert_eq!(stats.folders_missing, 1);
        assert_eq!(stats.folders_scanned, 1);
    }

    #[test]
    fn test_scanner_skips_binary_and_invalid_utf8() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("p/text.rs").write_str("fn main() {}").unwrap();
        temp.child("p/image.png").write_binary(&[0x89, 0x50, 0x4e, 0x47]).unwrap();
        temp.child("p/blob.dat").write_binary(&[0u8; 64]).unwrap();
        temp.child("p/latin1.txt").write_binary(&[0xe9, 0xe8, 0xe0, 0xff, 0xfe]).unwrap();

        let files = scanner(temp.path(), &["p"], &[]).scan();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("text.rs"));
    }

    #[test]
    fn test_scanner_no_folders_yields_empty_stream() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert!(scanner(temp.path(), &[], &[]).concatenate().is_empty());
    }

    #[test]
    fn test_concatenate_round_trips() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("p/one.py").write_str("print(1)\n").unwrap();
        temp.child("p/two.py").write_str("print(2)").unwrap();

        let s = scanner(temp.path(), &["p"], &["*.py"]);
        assert_eq!(extract_files(&s.concatenate()), s.scan());
    }

    #[test]
    fn test_render_folder_structure() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("proj/src/main.rs").write_str("").unwrap();
        temp.child("proj/README.md").write_str("").unwrap();
        temp.child("proj/package-lock.json").write_str("").unwrap();

        let tree = render_folder_structure(&[temp.path().join("proj")], &FileFilterConfig::default());

        assert_eq!(tree, "proj/\n  src/\n    main.rs\n  README.md\n");
    }
}
