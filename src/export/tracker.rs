//! Stale-artifact tracking for the export tree.
//!
//! The tracker is a mark-and-sweep pass over the export root: a scan at the
//! start of a run records everything currently on disk as a deletion
//! candidate, every copy (or confirmed-fresh destination) marks its path as
//! still wanted, and whatever is left at the end is deleted. This turns
//! stale-artifact removal into a pure function of what the run touched,
//! without ever wiping and repopulating the whole tree.
//!
//! One tracker instance belongs to one orchestration run; callers pass it by
//! reference instead of sharing global state.

use crate::export::absolutize;
use crate::log;
use anyhow::{Context, Result};
use glob::Pattern;
use rustc_hash::FxHashSet;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Pending-deletion set over an export root.
#[derive(Debug, Default)]
pub struct ExportTracker {
    /// Absolute paths still scheduled for deletion.
    pending: FxHashSet<PathBuf>,
    /// Every path marked wanted during this run, ancestors included.
    /// A wanted path can never re-enter the pending set, even if a later
    /// scan matches it again.
    wanted: FxHashSet<PathBuf>,
    /// Roots whose whole subtrees were marked wanted.
    wanted_roots: Vec<PathBuf>,
}

impl ExportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand glob patterns and schedule every match for deletion.
    ///
    /// A pattern with a leading `!` excludes its matches from this scan
    /// instead. Returns the number of newly tracked paths.
    pub fn scan<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<usize> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(rest) => excludes.push(
                    Pattern::new(rest)
                        .with_context(|| format!("Invalid exclude pattern `{rest}`"))?,
                ),
                None => includes.push(pattern.to_owned()),
            }
        }

        let mut added = 0;
        for pattern in &includes {
            let matches = glob::glob(pattern)
                .with_context(|| format!("Invalid scan pattern `{pattern}`"))?;
            for entry in matches {
                let path =
                    entry.with_context(|| format!("Cannot read a match of `{pattern}`"))?;
                if excludes.iter().any(|x| x.matches_path(&path)) {
                    continue;
                }
                if self.track(absolutize(&path)) {
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Schedule a directory and everything below it for deletion.
    ///
    /// A missing directory tracks nothing.
    pub fn scan_dir(&mut self, dir: &Path) -> usize {
        let mut added = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if self.track(absolutize(entry.path())) {
                added += 1;
            }
        }
        added
    }

    /// Mark a path as still wanted: remove it and every ancestor directory
    /// from the pending set. Idempotent.
    ///
    /// Ancestors must be unmarked too, because a directory can never be
    /// deleted while a wanted path lives below it.
    pub fn mark_wanted(&mut self, path: &Path) {
        let path = absolutize(path);
        for ancestor in path.ancestors() {
            self.pending.remove(ancestor);
            self.wanted.insert(ancestor.to_path_buf());
        }
    }

    /// Like [`mark_wanted`](Self::mark_wanted), but additionally unmarks
    /// every tracked descendant of `path`. Used when an entire subtree is
    /// known to be freshly regenerated.
    pub fn mark_wanted_recursive(&mut self, path: &Path) {
        let path = absolutize(path);
        self.mark_wanted(&path);
        self.pending.retain(|p| !p.starts_with(&path));
        self.wanted_roots.push(path);
    }

    /// Delete everything still pending and clear the set.
    ///
    /// Deletion runs deepest paths first so directories are emptied before
    /// removal, regardless of the order the scan discovered them in. Files
    /// go through unlink; when unlink refuses because the path is a
    /// directory, it is retried as an empty-directory removal. A path that
    /// is already gone is fine; any other failure aborts the sweep. The
    /// pending set is cleared up front either way, already-processed
    /// entries being gone regardless.
    ///
    /// Returns the deleted paths.
    pub fn sweep(&mut self) -> Result<Vec<PathBuf>> {
        let mut doomed: Vec<PathBuf> = self.pending.drain().collect();
        doomed.sort_by(|a, b| {
            let depth = |p: &PathBuf| p.components().count();
            depth(b).cmp(&depth(a)).then_with(|| b.cmp(a))
        });

        let mut deleted = Vec::new();
        for path in doomed {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    if !path.is_dir() {
                        return Err(err)
                            .with_context(|| format!("Cannot delete `{}`", path.display()));
                    }
                    match fs::remove_dir(&path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                        Err(err) => {
                            return Err(err).with_context(|| {
                                format!("Cannot delete directory `{}`", path.display())
                            });
                        }
                    }
                }
            }
            log!("delete"; "{}", path.display());
            deleted.push(path);
        }
        Ok(deleted)
    }

    /// Whether a path is currently scheduled for deletion.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains(&absolutize(path))
    }

    /// Number of paths currently scheduled for deletion.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn track(&mut self, path: PathBuf) -> bool {
        if self.is_wanted(&path) {
            return false;
        }
        self.pending.insert(path)
    }

    fn is_wanted(&self, path: &Path) -> bool {
        self.wanted.contains(path) || self.wanted_roots.iter().any(|root| path.starts_with(root))
    }
}
