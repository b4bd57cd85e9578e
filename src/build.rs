//! Per-combination build session.
//!
//! One [`Build`] value lives for a whole publish run. The orchestrator
//! points it at each (platform, configuration) pair in turn; the fields
//! derived from the active pair are recomputed on every switch. The
//! project's per-combination callback receives `&mut Build` and drives the
//! external compiler and the copy rules through it.

use crate::export::{Copier, CopyRule, ExportTracker};
use crate::invoker::ToolInvoker;
use crate::platform::{Configuration, Platform};
use crate::target::TargetResolved;
use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Include and lib locations of a sibling export tree, for linking against
/// another library published by the same tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPaths {
    pub include: PathBuf,
    pub lib: PathBuf,
}

/// Mutable per-run build state.
pub struct Build<'t> {
    target: &'t TargetResolved,
    tracker: ExportTracker,
    invoker: Box<dyn ToolInvoker>,

    /// Active platform.
    pub platform: Platform,
    /// Active configuration.
    pub config: Configuration,
    /// Artifact filename extensions expected for the active pair.
    pub extensions: Vec<&'static str>,
    /// Where headers export to for the active platform.
    pub include_export_dir: PathBuf,
    /// Where library artifacts export to for the active platform.
    pub lib_export_dir: PathBuf,
    /// Full path of the primary library artifact for the active pair.
    pub lib_export_path: PathBuf,
}

impl<'t> Build<'t> {
    pub(crate) fn new(
        target: &'t TargetResolved,
        tracker: ExportTracker,
        invoker: Box<dyn ToolInvoker>,
        platform: Platform,
        config: Configuration,
    ) -> Self {
        let mut build = Self {
            target,
            tracker,
            invoker,
            platform: platform.clone(),
            config,
            extensions: Vec::new(),
            include_export_dir: PathBuf::new(),
            lib_export_dir: PathBuf::new(),
            lib_export_path: PathBuf::new(),
        };
        build.set_platform(platform);
        build
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut ExportTracker {
        &mut self.tracker
    }

    /// Switch the session to a platform and recompute the derived fields.
    pub fn set_platform(&mut self, platform: Platform) {
        let export_dir = &self.target.export_dir;
        if self.target.platform_based_header {
            self.include_export_dir = export_dir.join(platform.short_name).join("include");
            self.lib_export_dir = export_dir.join(platform.short_name).join("lib");
        } else {
            self.include_export_dir = export_dir.join("include");
            self.lib_export_dir = export_dir.join("lib").join(platform.short_name);
        }

        self.extensions = if platform.is_wasm() {
            vec!["bc"]
        } else if self.target.static_lib {
            vec!["lib"]
        } else {
            vec!["dll", "lib"]
        };

        self.platform = platform;
        self.recompute_lib_path();
    }

    /// Switch the session to a configuration.
    pub fn set_config(&mut self, config: Configuration) {
        self.config = config;
        self.recompute_lib_path();
    }

    fn recompute_lib_path(&mut self) {
        self.lib_export_path = self
            .lib_export_dir
            .join(format!("{}{}.lib", self.target.name, self.config.postfix));
    }

    /// Expected artifact file names for the active pair.
    ///
    /// The stem defaults to the target name; the configuration postfix is
    /// appended (empty for release builds).
    pub fn outputs(&self, name: Option<&str>) -> Vec<String> {
        let stem = name.unwrap_or(&self.target.name);
        self.extensions
            .iter()
            .map(|ext| format!("{stem}{}.{ext}", self.config.postfix))
            .collect()
    }

    /// Build one combination of an IDE solution.
    ///
    /// Skipped entirely when the run was started with `--no-build`; the
    /// external tool does its own incremental work otherwise.
    pub fn ide_build(&self, solution: impl AsRef<Path>) -> Result<()> {
        if self.target.options.no_build {
            return Ok(());
        }
        self.invoker
            .ide_build(solution.as_ref(), &self.config.name, self.platform.long_name)
            .with_context(|| {
                format!("Compile failed for {}|{}", self.config.name, self.platform.long_name)
            })
    }

    /// Run an arbitrary external program.
    pub fn run(&self, program: &str, args: &[OsString]) -> Result<()> {
        self.invoker.run(program, args)
    }

    /// Apply copy rules with this session's platform and configuration.
    pub fn copy(
        &mut self,
        source_dir: impl AsRef<Path>,
        dest_dir: impl AsRef<Path>,
        rules: &[CopyRule],
    ) -> Result<()> {
        Copier {
            tracker: &mut self.tracker,
            invoker: &*self.invoker,
            platform: &self.platform,
            config: &self.config,
            ignore_missing: self.target.options.ignore_missing,
        }
        .apply(source_dir.as_ref(), dest_dir.as_ref(), rules)
    }

    /// Copy the built library artifacts from the IDE's output directory
    /// into the platform's lib export directory.
    ///
    /// The source defaults to the IDE convention `bin/<long>/<config>`.
    pub fn copy_lib(&mut self, name: Option<&str>, source_dir: Option<&Path>) -> Result<()> {
        let source_dir = match source_dir {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("bin")
                .join(self.platform.long_name)
                .join(&self.config.name),
        };
        let rules: Vec<CopyRule> = self
            .outputs(name)
            .into_iter()
            .map(CopyRule::file)
            .collect();
        let dest = self.lib_export_dir.clone();
        self.copy(source_dir, dest, &rules)
    }

    /// Include and lib paths of another library's export tree, following
    /// the same `../<name>-bin` layout this tool produces.
    pub fn import_paths(&self, name: &str) -> ImportPaths {
        let root = self.target.export_dir.parent().map_or_else(
            || PathBuf::from(format!("{name}-bin")),
            |parent| parent.join(format!("{name}-bin")),
        );
        ImportPaths {
            include: root.join("include"),
            lib: root.join("lib").join(self.platform.short_name),
        }
    }
}
