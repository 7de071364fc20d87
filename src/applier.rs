use crate::response::{FileOperation, Operation};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Counts of applied file operations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Files written where none existed
    pub created: usize,
    /// Files replaced
    pub updated: usize,
    /// Files removed
    pub deleted: usize,
    /// Deletes whose target did not exist
    pub missing: usize,
    /// Operations refused or failed with an IO error
    pub failed: usize,
}

impl ApplyReport {
    /// Total number of operations that changed the output tree.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Applies operations to `output_folder` in list order.
///
/// A failing operation is logged and counted; the remaining operations are
/// still applied. Paths that are absolute or climb out of the output folder
/// are refused.
pub async fn apply_operations(operations: &[FileOperation], output_folder: &Path) -> ApplyReport {
    let mut report = ApplyReport::default();

    for op in operations {
        let Some(target) = resolve_target(output_folder, &op.file_path) else {
            error!("Refusing to write outside the output folder: {}", op.file_path);
            report.failed += 1;
            continue;
        };

        let result = match op.operation {
            Operation::Create => write_file(&target, op).await.map(|()| report.created += 1),
            Operation::Update => {
                if let Err(e) = fs::remove_file(&target).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {} before update: {}", target.display(), e);
                    }
                }
                write_file(&target, op).await.map(|()| report.updated += 1)
            }
            Operation::Delete => match fs::remove_file(&target).await {
                Ok(()) => {
                    report.deleted += 1;
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("File to delete does not exist: {}", target.display());
                    report.missing += 1;
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(()) => debug!("{} {}", op.operation, target.display()),
            Err(e) => {
                error!("Failed to {} {}: {}", op.operation, target.display(), e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Applied operations in {}: {} created, {} updated, {} deleted, {} failed",
        output_folder.display(),
        report.created,
        report.updated,
        report.deleted,
        report.failed
    );

    report
}

async fn write_file(target: &Path, op: &FileOperation) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(target, op.file_content.as_deref().unwrap_or_default()).await
}

/// Joins a relative path onto `root`, rejecting absolute paths and `..` escapes.
fn resolve_target(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    (!normalized.as_os_str().is_empty()).then(|| root.join(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn op(operation: Operation, path: &str, content: Option<&str>) -> FileOperation {
        FileOperation {
            operation,
            file_path: path.to_string(),
            file_content: content.map(ToString::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("old.md").write_str("old").unwrap();
        temp.child("docs/api.md").write_str("v1").unwrap();

        let ops = vec![
            op(Operation::Create, "docs/guide/intro.md", Some("# Intro")),
            op(Operation::Update, "docs/api.md", Some("v2")),
            op(Operation::Delete, "old.md", None),
        ];

        let report = apply_operations(&ops, temp.path()).await;

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.applied(), 3);
        temp.child("docs/guide/intro.md").assert("# Intro");
        temp.child("docs/api.md").assert("v2");
        temp.child("old.md").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_update_creates_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();

        let report = apply_operations(&[op(Operation::Update, "new/file.md", Some("x"))], temp.path()).await;

        assert_eq!(report.updated, 1);
        temp.child("new/file.md").assert("x");
    }

    #[tokio::test]
    async fn test_delete_missing_is_counted_not_failed() {
        let temp = assert_fs::TempDir::new().unwrap();

        let report = apply_operations(&[op(Operation::Delete, "ghost.md", None)], temp.path()).await;

        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_escaping_paths_are_refused() {
        let temp = assert_fs::TempDir::new().unwrap();
        let out = temp.child("out");
        out.create_dir_all().unwrap();

        let ops = vec![
            op(Operation::Create, "../escape.md", Some("x")),
            op(Operation::Create, "/etc/owned", Some("x")),
            op(Operation::Create, "a/../../b.md", Some("x")),
            op(Operation::Create, "a/../ok.md", Some("fine")),
        ];

        let report = apply_operations(&ops, out.path()).await;

        assert_eq!(report.failed, 3);
        assert_eq!(report.created, 1);
        temp.child("escape.md").assert(predicate::path::missing());
        out.child("ok.md").assert("fine");
        out.child("a").assert(predicate::path::missing());
    }

    #[test]
    fn test_resolve_target() {
        let root = Path::new("/out");
        assert_eq!(resolve_target(root, "a/b.md"), Some(PathBuf::from("/out/a/b.md")));
        assert_eq!(resolve_target(root, "./a.md"), Some(PathBuf::from("/out/a.md")));
        assert_eq!(resolve_target(root, "a/../b.md"), Some(PathBuf::from("/out/b.md")));
        assert_eq!(resolve_target(root, ".."), None);
        assert_eq!(resolve_target(root, "."), None);
    }
}
