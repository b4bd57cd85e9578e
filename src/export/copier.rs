//! Copy rules and the artifact copier.
//!
//! A build list is a sequence of [`CopyRule`]s resolved against a source and
//! a destination directory. Rules are decoded once when the target is
//! declared; the copier then only pattern-matches on the variants.

use crate::export::{ExportTracker, copy_file, ensure_dir, is_stale};
use crate::invoker::ToolInvoker;
use crate::log;
use crate::platform::{Configuration, Platform};
use anyhow::{Context, Result, bail};
use glob::Pattern;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Copy Rules
// ============================================================================

/// One entry of a build list.
#[derive(Debug, Clone, PartialEq)]
pub enum CopyRule {
    /// Copy a single file.
    File { source: PathBuf, dest: PathBuf },
    /// Mirror the files matching `patterns` below `source` into `dest`.
    /// A pattern with a leading `!` excludes its matches instead.
    Glob {
        source: PathBuf,
        dest: PathBuf,
        patterns: Vec<String>,
    },
    /// Combine several inputs into one archive at `dest`.
    Combine { sources: Vec<PathBuf>, dest: PathBuf },
}

impl CopyRule {
    /// Single file; the source name doubles as the destination name.
    pub fn file(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        CopyRule::File {
            dest: source.clone(),
            source,
        }
    }

    /// Single file copied under a different name.
    pub fn file_as(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        CopyRule::File {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// Pattern-restricted directory mirror.
    pub fn glob(
        source: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        CopyRule::Glob {
            source: source.into(),
            dest: dest.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Combine several inputs into one output artifact.
    pub fn combine(
        sources: impl IntoIterator<Item = impl Into<PathBuf>>,
        dest: impl Into<PathBuf>,
    ) -> Self {
        CopyRule::Combine {
            sources: sources.into_iter().map(Into::into).collect(),
            dest: dest.into(),
        }
    }
}

/// Manifest form of a rule: either a bare path or a table naming its parts.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRule {
    Name(PathBuf),
    Combine {
        sources: Vec<PathBuf>,
        dest: PathBuf,
    },
    Glob {
        source: PathBuf,
        dest: Option<PathBuf>,
        patterns: Vec<String>,
    },
    File {
        source: PathBuf,
        dest: Option<PathBuf>,
    },
}

impl<'de> Deserialize<'de> for CopyRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match RawRule::deserialize(deserializer)? {
            RawRule::Name(source) => CopyRule::file(source),
            RawRule::Combine { sources, dest } => CopyRule::Combine { sources, dest },
            RawRule::Glob {
                source,
                dest,
                patterns,
            } => CopyRule::Glob {
                dest: dest.unwrap_or_else(|| source.clone()),
                source,
                patterns,
            },
            RawRule::File { source, dest } => CopyRule::File {
                dest: dest.unwrap_or_else(|| source.clone()),
                source,
            },
        })
    }
}

// ============================================================================
// Copier
// ============================================================================

/// Applies copy rules for one (platform, configuration) context.
///
/// Borrows the run's tracker so every destination it touches survives the
/// final sweep.
pub struct Copier<'a> {
    pub tracker: &'a mut ExportTracker,
    pub invoker: &'a dyn ToolInvoker,
    pub platform: &'a Platform,
    pub config: &'a Configuration,
    /// Skip rules whose source file is missing instead of failing.
    pub ignore_missing: bool,
}

impl Copier<'_> {
    /// Apply every rule, resolving sources against `source_dir` and
    /// destinations against `dest_dir`.
    pub fn apply(&mut self, source_dir: &Path, dest_dir: &Path, rules: &[CopyRule]) -> Result<()> {
        for rule in rules {
            match rule {
                CopyRule::File { source, dest } => {
                    self.copy_single(&source_dir.join(source), &dest_dir.join(dest))?;
                }
                CopyRule::Glob {
                    source,
                    dest,
                    patterns,
                } => {
                    self.copy_matching(
                        &source_dir.join(source),
                        &dest_dir.join(dest),
                        patterns,
                    )?;
                }
                CopyRule::Combine { sources, dest } => {
                    let sources: Vec<PathBuf> =
                        sources.iter().map(|s| source_dir.join(s)).collect();
                    self.combine(&sources, &dest_dir.join(dest))?;
                }
            }
        }
        Ok(())
    }

    fn copy_single(&mut self, src: &Path, dest: &Path) -> Result<()> {
        if !src.exists() {
            return self.missing(src);
        }
        copy_file(self.tracker, src, dest)?;
        Ok(())
    }

    /// Mirror every file matching the patterns below `src_root` to the same
    /// relative path below `dest_root`. Directories are not copied; matching
    /// nothing is not an error.
    fn copy_matching(
        &mut self,
        src_root: &Path,
        dest_root: &Path,
        patterns: &[String],
    ) -> Result<()> {
        let mut excludes = Vec::new();
        let mut includes = Vec::new();
        for pattern in patterns {
            match pattern.strip_prefix('!') {
                Some(rest) => excludes.push(
                    Pattern::new(rest)
                        .with_context(|| format!("Invalid exclude pattern `{rest}`"))?,
                ),
                None => includes.push(pattern.as_str()),
            }
        }

        for pattern in includes {
            let full = format!("{}/{pattern}", src_root.display());
            let matches =
                glob::glob(&full).with_context(|| format!("Invalid copy pattern `{full}`"))?;
            for entry in matches {
                let path = entry.with_context(|| format!("Cannot read a match of `{full}`"))?;
                if path.is_dir() {
                    continue;
                }
                let relative = path.strip_prefix(src_root).with_context(|| {
                    format!("Match `{}` escapes its source directory", path.display())
                })?;
                if excludes.iter().any(|x| x.matches_path(relative)) {
                    continue;
                }
                copy_file(self.tracker, &path, &dest_root.join(relative))?;
            }
        }
        Ok(())
    }

    /// Combine inputs into one archive when any of them is newer than the
    /// current output. The output is marked wanted even when fresh.
    fn combine(&mut self, sources: &[PathBuf], dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            ensure_dir(self.tracker, parent)?;
        }
        self.tracker.mark_wanted(dest);

        // A missing member would silently produce a corrupt archive, so the
        // ignore-missing escape hatch does not apply here
        for source in sources {
            if !source.exists() {
                bail!("Combine source not found: `{}`", source.display());
            }
        }

        if !is_stale(dest, sources)? {
            return Ok(());
        }

        self.invoker
            .combine(self.platform, self.config, dest, sources)?;
        log!("combine"; "{} ({} inputs)", dest.display(), sources.len());
        Ok(())
    }

    fn missing(&self, path: &Path) -> Result<()> {
        if self.ignore_missing {
            log!("copy"; "skip missing {}", path.display());
            return Ok(());
        }
        bail!("Copy source not found: `{}`", path.display());
    }
}

// ============================================================================
// Tests
// ============================================================================
