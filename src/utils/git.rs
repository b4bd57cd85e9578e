//! Version-control side effects.
//!
//! Stage-all, commit and push against a working repository, shelling out to
//! the `git` CLI. Both the project repository and the export tree repository
//! go through these helpers.

use crate::{exec, log};
use anyhow::{Context, Result, bail};
use std::path::Path;

/// Check whether the working tree at `root` has anything to commit.
pub fn is_clean(root: &Path) -> Result<bool> {
    let output = exec!(root; ["git"]; "status", "--porcelain")
        .with_context(|| format!("git status failed in `{}`", root.display()))?;
    Ok(output.stdout.iter().all(|b| b.is_ascii_whitespace()))
}

/// Stage all changes and commit them.
///
/// A clean tree is skipped with a log line instead of failing, so repeated
/// publish runs with an unchanged export tree stay green.
pub fn commit_all(root: &Path, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("Commit message cannot be empty");
    }

    if is_clean(root)? {
        log!("git"; "nothing to commit in {}", root.display());
        return Ok(());
    }

    exec!(root; ["git"]; "add", "-A", ".")?;
    exec!(root; ["git"]; "commit", "-m", message)?;

    log!("git"; "commit {}", root.display());
    Ok(())
}

/// Push the repository at `root` to its origin remote.
pub fn push(root: &Path, branch: &str) -> Result<()> {
    log!("git"; "push {} to origin/{branch}", root.display());
    exec!(root; ["git"]; "push", "--set-upstream", "origin", branch)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?}");
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        dir
    }

    #[test]
    fn test_commit_message_required() {
        let dir = tempfile::tempdir().unwrap();
        assert!(commit_all(dir.path(), "   ").is_err());
    }

    #[test]
    fn test_is_clean_fresh_repo() {
        let repo = init_repo();
        assert!(is_clean(repo.path()).unwrap());
    }

    #[test]
    fn test_commit_all_and_clean_skip() {
        let repo = init_repo();
        std::fs::write(repo.path().join("a.txt"), "a").unwrap();
        assert!(!is_clean(repo.path()).unwrap());

        commit_all(repo.path(), "add a").unwrap();
        assert!(is_clean(repo.path()).unwrap());

        // Second commit on a clean tree is a no-op, not an error
        commit_all(repo.path(), "add a again").unwrap();
    }

    #[test]
    fn test_is_clean_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_clean(dir.path()).is_err());
    }
}
