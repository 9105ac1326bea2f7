// Conflict hand-off
//
// Bisync keeps both versions of a file edited on both sides. The resolver
// moves the local copy back to its real name, opens the merge tool on the two
// versions and, once the tool exits cleanly, removes the other copy. It never
// merges content itself.

use crate::error::{Result, SyncError};
use crate::process::ProcessRunner;
use crate::sync::patterns::strip_conflict_suffix;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files left behind by a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The local copy under its original name, holding the merged result
    pub merged: PathBuf,
    /// The other copy, now deleted
    pub removed: PathBuf,
}

pub struct ConflictResolver {
    /// Merge program with any prefix and leading arguments
    merge_tool: Vec<String>,
    runner: Arc<dyn ProcessRunner>,
}

impl ConflictResolver {
    pub fn new(merge_tool: Vec<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { merge_tool, runner }
    }

    pub async fn resolve(&self, path_a: &str, path_b: &str) -> Result<Resolution> {
        if self.merge_tool.is_empty() {
            return Err(SyncError::InvalidConfig("no merge tool configured".to_string()));
        }

        let canonical = strip_conflict_suffix(path_a)
            .map(PathBuf::from)
            .ok_or_else(|| SyncError::NotAConflictCopy {
                path: PathBuf::from(path_a),
            })?;
        let path_a = Path::new(path_a);
        let path_b = PathBuf::from(path_b);

        // Check everything before touching the filesystem
        std::fs::symlink_metadata(path_a)?;
        std::fs::symlink_metadata(&path_b)?;
        if std::fs::symlink_metadata(&canonical).is_ok() {
            return Err(SyncError::TargetExists { path: canonical });
        }

        tracing::info!("Restoring {} as {}", path_a.display(), canonical.display());
        std::fs::rename(path_a, &canonical).map_err(|source| SyncError::Rename {
            from: path_a.to_path_buf(),
            to: canonical.clone(),
            source,
        })?;

        self.merge(&canonical, &path_b).await?;

        tracing::info!("Merge finished, removing {}", path_b.display());
        std::fs::remove_file(&path_b).map_err(|source| SyncError::Delete {
            path: path_b.clone(),
            source,
        })?;

        Ok(Resolution {
            merged: canonical,
            removed: path_b,
        })
    }

    /// Run the merge tool and wait for the user to close it
    async fn merge(&self, merged: &Path, other: &Path) -> Result<()> {
        let mut argv = self.merge_tool.clone();
        argv.push(merged.to_string_lossy().into_owned());
        argv.push(other.to_string_lossy().into_owned());
        let tool = self.merge_tool.join(" ");

        let (status, output) = self
            .runner
            .run_to_completion(&argv)
            .await
            .map_err(|e| SyncError::MergeTool {
                tool: tool.clone(),
                detail: e.to_string(),
            })?;

        if !status.success() {
            let detail = match output.trim() {
                "" => status.to_string(),
                out => format!("{}: {}", status, out),
            };
            return Err(SyncError::MergeTool { tool, detail });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{Script, ScriptedRunner};
    use std::fs;
    use tempfile::TempDir;

    fn resolver(runner: Arc<ScriptedRunner>) -> ConflictResolver {
        ConflictResolver::new(vec!["meld".to_string()], runner)
    }

    fn setup() -> (TempDir, String, String) {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("note.md.conflict1");
        let b = dir.path().join("note.md.conflict2");
        fs::write(&a, "local edit").unwrap();
        fs::write(&b, "remote edit").unwrap();
        (
            dir,
            a.to_string_lossy().into_owned(),
            b.to_string_lossy().into_owned(),
        )
    }

    #[tokio::test]
    async fn test_resolve_renames_merges_and_deletes() {
        let (dir, a, b) = setup();
        let runner = Arc::new(ScriptedRunner::new());

        let resolution = resolver(runner.clone()).resolve(&a, &b).await.unwrap();

        let canonical = dir.path().join("note.md");
        assert_eq!(resolution.merged, canonical);
        assert_eq!(resolution.removed, PathBuf::from(&b));
        assert_eq!(fs::read_to_string(&canonical).unwrap(), "local edit");
        assert!(!Path::new(&a).exists());
        assert!(!Path::new(&b).exists());

        let launched = runner.launched();
        assert_eq!(launched.len(), 1);
        assert_eq!(
            launched[0],
            vec!["meld".to_string(), canonical.to_string_lossy().into_owned(), b]
        );
    }

    #[tokio::test]
    async fn test_existing_target_keeps_both_files() {
        let (dir, a, b) = setup();
        fs::write(dir.path().join("note.md"), "already here").unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let result = resolver(runner.clone()).resolve(&a, &b).await;

        assert!(matches!(result, Err(SyncError::TargetExists { .. })));
        assert!(Path::new(&a).exists());
        assert!(Path::new(&b).exists());
        assert!(runner.launched().is_empty());
    }

    #[tokio::test]
    async fn test_target_equal_to_other_copy_is_refused() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("note.md.conflict1");
        let b = dir.path().join("note.md");
        fs::write(&a, "local").unwrap();
        fs::write(&b, "remote").unwrap();
        let runner = Arc::new(ScriptedRunner::new());

        let result = resolver(runner)
            .resolve(&a.to_string_lossy(), &b.to_string_lossy())
            .await;

        assert!(matches!(result, Err(SyncError::TargetExists { .. })));
        assert_eq!(fs::read_to_string(&b).unwrap(), "remote");
        assert_eq!(fs::read_to_string(&a).unwrap(), "local");
    }

    #[tokio::test]
    async fn test_merge_failure_keeps_other_copy() {
        let (dir, a, b) = setup();
        let runner = Arc::new(ScriptedRunner::new().script("meld", Script::exit(1).stderr("cannot open display")));

        let result = resolver(runner).resolve(&a, &b).await;

        match result {
            Err(SyncError::MergeTool { detail, .. }) => assert!(detail.contains("cannot open display")),
            other => panic!("expected merge tool error, got {:?}", other),
        }
        assert!(dir.path().join("note.md").exists());
        assert!(Path::new(&b).exists());
    }

    #[tokio::test]
    async fn test_merge_tool_missing_keeps_other_copy() {
        let (_dir, a, b) = setup();
        let runner = Arc::new(ScriptedRunner::new().fail_launch("meld"));

        let result = resolver(runner).resolve(&a, &b).await;

        assert!(matches!(result, Err(SyncError::MergeTool { .. })));
        assert!(Path::new(&b).exists());
    }

    #[tokio::test]
    async fn test_path_without_suffix_is_rejected() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("note.md");
        let b = dir.path().join("note.md.conflict2");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "y").unwrap();

        let result = resolver(Arc::new(ScriptedRunner::new()))
            .resolve(&a.to_string_lossy(), &b.to_string_lossy())
            .await;

        assert!(matches!(result, Err(SyncError::NotAConflictCopy { .. })));
        assert!(a.exists() && b.exists());
    }

    #[tokio::test]
    async fn test_missing_conflict_copy_is_an_error() {
        let (dir, _a, b) = setup();
        let missing = dir.path().join("gone.md.conflict1");

        let result = resolver(Arc::new(ScriptedRunner::new()))
            .resolve(&missing.to_string_lossy(), &b)
            .await;

        assert!(matches!(result, Err(SyncError::Io(_))));
        assert!(Path::new(&b).exists());
    }
}
