//! Export-tree reconciliation.
//!
//! This module owns the correctness-critical part of publishing:
//!
//! - **tracker**: mark-accessed / sweep-unaccessed pass over the export root
//! - **copier**: copy rules resolving single files, glob mirrors and
//!   combine-into-archive steps
//! - staleness check and copy/mkdir primitives shared by both
//!
//! # Reconciliation Flow
//!
//! ```text
//! scan() ──► copy rules mark_wanted() ──► sweep()
//!   │              │                        │
//!   ▼              ▼                        ▼
//! candidates   survivors              stale files gone
//! ```

pub mod copier;
pub mod tracker;

pub use copier::{Copier, CopyRule};
pub use tracker::ExportTracker;

use crate::log;
use anyhow::{Context, Result};
use std::{
    env, fs,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

/// Make a path absolute and lexically normalized.
///
/// Purely lexical: `.` components drop, `..` components pop, symlinks are
/// left alone. Works for paths that do not exist yet, which `canonicalize`
/// cannot do.
pub fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Check whether an output needs to be rebuilt from its inputs.
///
/// True when the output is missing or any input's modification time is
/// strictly newer than the output's. A missing output is not an error; a
/// missing input is.
pub fn is_stale<P: AsRef<Path>>(output: &Path, inputs: &[P]) -> Result<bool> {
    let out_mtime = match fs::metadata(output) {
        Ok(meta) => modified(&meta, output)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(err) => {
            return Err(err).with_context(|| format!("Cannot stat `{}`", output.display()));
        }
    };

    for input in inputs {
        let input = input.as_ref();
        let meta = fs::metadata(input)
            .with_context(|| format!("Cannot stat input `{}`", input.display()))?;
        if modified(&meta, input)? > out_mtime {
            return Ok(true);
        }
    }
    Ok(false)
}

fn modified(meta: &fs::Metadata, path: &Path) -> Result<SystemTime> {
    meta.modified()
        .with_context(|| format!("No modification time for `{}`", path.display()))
}

/// Copy a single file, skipping the copy when the destination is already
/// newer than the source. The destination is marked wanted either way.
///
/// Returns whether a copy actually happened.
pub(crate) fn copy_file(tracker: &mut ExportTracker, src: &Path, dest: &Path) -> Result<bool> {
    tracker.mark_wanted(dest);

    if !is_stale(dest, std::slice::from_ref(&src))? {
        return Ok(false);
    }

    if let Some(parent) = dest.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create `{}`", parent.display()))?;
    }

    fs::copy(src, dest).with_context(|| {
        format!("Cannot copy `{}` to `{}`", src.display(), dest.display())
    })?;
    log!("copy"; "{} -> {}", src.display(), dest.display());
    Ok(true)
}

/// Mark a directory wanted and create it (with parents) when missing.
pub(crate) fn ensure_dir(tracker: &mut ExportTracker, dir: &Path) -> Result<()> {
    tracker.mark_wanted(dir);
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create `{}`", dir.display()))?;
        log!("mkdir"; "{}", dir.display());
    }
    Ok(())
}
