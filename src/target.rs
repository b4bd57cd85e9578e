//! Target declaration, resolution and the publish orchestration.
//!
//! A project declares a [`Target`]: which platforms and configurations to
//! build, what to copy into the export tree, and a per-combination callback
//! doing the actual compile-and-copy work. [`TargetResolved`] fills in the
//! defaults once; `publish` then walks every (platform, configuration)
//! combination, runs the final copy pass, sweeps stale artifacts and
//! optionally commits the results.

use crate::build::Build;
use crate::cli::Options;
use crate::config::Manifest;
use crate::export::{CopyRule, ExportTracker, absolutize, ensure_dir};
use crate::invoker::ToolInvoker;
use crate::log;
use crate::platform::{Configuration, Platform, PlatformId, default_configurations};
use crate::utils::git;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;

/// A no-argument hook run before or after the whole build.
pub type Hook = Box<dyn Fn() -> Result<()>>;

/// The per-combination callback.
pub type BuildStep = Box<dyn Fn(&mut Build<'_>) -> Result<()>>;

// ============================================================================
// Declaration
// ============================================================================

/// A project's build description.
///
/// Unset fields fall back to the `libpub.toml` manifest and then to the
/// built-in defaults during resolution.
pub struct Target {
    /// Library name; defaults to the project directory's basename.
    pub name: Option<String>,
    /// Project root; defaults to the current directory.
    pub root: Option<PathBuf>,
    /// Export tree location; defaults to `../<name>-bin` beside the root.
    pub export_dir: Option<PathBuf>,
    /// Platforms to build; defaults to all of them.
    pub platforms: Option<Vec<PlatformId>>,
    /// Configurations to build; defaults to Debug and Release.
    pub configurations: Option<Vec<Configuration>>,
    /// The library builds as a static archive only.
    pub static_lib: bool,
    /// Headers are organized per platform instead of shared.
    pub platform_based_header: bool,
    /// Skip committing the project's own repository.
    pub no_own_repo: bool,
    /// Skip pushing the project's own repository.
    pub no_own_push: bool,
    /// Top-level copy rules applied from the root into the export tree.
    pub files: Vec<CopyRule>,
    /// Runs after the export tree is prepared, before any compilation.
    pub prebuild: Option<Hook>,
    /// Runs after the final copy pass, before the sweep.
    pub postbuild: Option<Hook>,
    /// Per-combination build callback.
    pub each: BuildStep,
}

impl Target {
    pub fn new(each: impl Fn(&mut Build<'_>) -> Result<()> + 'static) -> Self {
        Self {
            name: None,
            root: None,
            export_dir: None,
            platforms: None,
            configurations: None,
            static_lib: false,
            platform_based_header: false,
            no_own_repo: false,
            no_own_push: false,
            files: Vec::new(),
            prebuild: None,
            postbuild: None,
            each: Box::new(each),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// A target with every default filled in. Read-only during the run.
pub struct TargetResolved {
    pub name: String,
    pub root: PathBuf,
    pub export_dir: PathBuf,
    pub platforms: Vec<Platform>,
    pub configurations: Vec<Configuration>,
    pub static_lib: bool,
    pub platform_based_header: bool,
    pub no_own_repo: bool,
    pub no_own_push: bool,
    pub branch: String,
    pub files: Vec<CopyRule>,
    pub(crate) options: Options,
    prebuild: Option<Hook>,
    postbuild: Option<Hook>,
    each: BuildStep,
}

impl TargetResolved {
    /// Merge the declaration with the manifest and the CLI options.
    ///
    /// Precedence: CLI restriction flags, then the code declaration, then
    /// the manifest, then built-in defaults.
    pub fn resolve(target: Target, manifest: Manifest, options: &Options) -> Result<Self> {
        let root = absolutize(&target.root.unwrap_or_else(|| PathBuf::from(".")));

        let name = target
            .name
            .or(manifest.target.name)
            .or_else(|| {
                root.file_name()
                    .map(|base| base.to_string_lossy().into_owned())
            })
            .context("Cannot derive a target name from the project directory")?;

        let platform_ids = if options.platforms.is_empty() {
            target
                .platforms
                .or(manifest.target.platforms)
                .unwrap_or_else(|| PlatformId::ALL.to_vec())
        } else {
            options.platforms.clone()
        };
        if platform_ids.is_empty() {
            bail!("No platforms selected");
        }

        let archiver_root = manifest.tools.archiver_root.as_deref();
        let platforms = platform_ids
            .into_iter()
            .map(|id| id.resolve(archiver_root))
            .collect();

        let configurations = target
            .configurations
            .or(manifest.target.configurations)
            .unwrap_or_else(default_configurations);
        if configurations.is_empty() {
            bail!("No configurations selected");
        }

        let export_dir = match target.export_dir {
            Some(dir) => absolutize(&dir),
            None => absolutize(&root.join(format!("../{name}-bin"))),
        };

        let files = if target.files.is_empty() {
            manifest.target.files
        } else {
            target.files
        };

        Ok(Self {
            name,
            root,
            export_dir,
            platforms,
            configurations,
            static_lib: target.static_lib || manifest.target.static_lib,
            platform_based_header: target.platform_based_header
                || manifest.target.platform_based_header,
            no_own_repo: target.no_own_repo || manifest.git.no_own_repo,
            no_own_push: target.no_own_push || manifest.git.no_own_push,
            branch: manifest.git.branch,
            files,
            options: options.clone(),
            prebuild: target.prebuild,
            postbuild: target.postbuild,
            each: target.each,
        })
    }

    // ========================================================================
    // Orchestration
    // ========================================================================

    /// Build every selected (platform, configuration) combination, refresh
    /// the export tree, sweep stale artifacts and optionally commit.
    ///
    /// Any failure aborts before the sweep, leaving previously tracked
    /// files on disk; nothing is deleted on an uncertain state.
    pub fn publish(&self, invoker: Box<dyn ToolInvoker>) -> Result<()> {
        log!("publish"; "{}", self.name);

        let mut tracker = ExportTracker::new();
        let export = self.export_dir.display();
        // The lib subtree is excluded here: the platform loop below rescans
        // exactly the per-platform directories it regenerates, so artifacts
        // of platforms not selected in this run survive
        tracker.scan(&[format!("{export}/**"), format!("!{export}/lib/**")])?;
        ensure_dir(&mut tracker, &self.export_dir)?;
        ensure_dir(&mut tracker, &self.export_dir.join("lib"))?;

        if let Some(hook) = &self.prebuild {
            hook().context("Prebuild hook failed")?;
        }

        let mut build = Build::new(
            self,
            tracker,
            invoker,
            self.platforms[0].clone(),
            self.configurations[0].clone(),
        );
        for platform in &self.platforms {
            build.set_platform(platform.clone());

            let platform_dir = build.lib_export_dir.clone();
            build.tracker_mut().scan_dir(&platform_dir);
            ensure_dir(build.tracker_mut(), &platform_dir)?;

            for config in &self.configurations {
                build.set_config(config.clone());
                (self.each)(&mut build)?;
            }
        }

        build.copy(&self.root, &self.export_dir, &self.files)?;

        if let Some(hook) = &self.postbuild {
            hook().context("Postbuild hook failed")?;
        }

        build.tracker_mut().sweep()?;

        if let Some(message) = &self.options.commit_message {
            self.git_commit(message)?;
            self.git_push()?;
        }

        Ok(())
    }

    // ========================================================================
    // Version control
    // ========================================================================

    /// Stage and commit the project repository (unless suppressed) and the
    /// export tree repository.
    pub fn git_commit(&self, message: &str) -> Result<()> {
        if !self.no_own_repo {
            git::commit_all(&self.root, message)?;
        }
        git::commit_all(&self.export_dir, message)
    }

    /// Push the project repository (unless suppressed) and the export tree
    /// repository.
    pub fn git_push(&self) -> Result<()> {
        if !self.no_own_repo && !self.no_own_push {
            git::push(&self.root, &self.branch)?;
        }
        git::push(&self.export_dir, &self.branch)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::RecordingInvoker;
    use std::cell::Cell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_defaults() {
        let mut target = Target::new(|_: &mut Build| Ok(()));
        target.name = Some("mylib".into());
        let resolved =
            TargetResolved::resolve(target, Manifest::default(), &Options::default()).unwrap();

        assert_eq!(resolved.platforms.len(), 3);
        assert_eq!(resolved.configurations, default_configurations());
        assert!(resolved.export_dir.ends_with("mylib-bin"));
        assert_eq!(resolved.branch, "master");
        assert!(!resolved.static_lib);
    }

    #[test]
    fn test_resolve_name_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("greatlib");
        fs::create_dir(&project).unwrap();

        let mut target = Target::new(|_: &mut Build| Ok(()));
        target.root = Some(project);
        let resolved =
            TargetResolved::resolve(target, Manifest::default(), &Options::default()).unwrap();

        assert_eq!(resolved.name, "greatlib");
        assert!(resolved.export_dir.ends_with("greatlib-bin"));
    }

    #[test]
    fn test_resolve_cli_restriction_wins() {
        let mut target = Target::new(|_: &mut Build| Ok(()));
        target.name = Some("mylib".into());
        target.platforms = Some(vec![PlatformId::X86, PlatformId::X64]);

        let options = Options {
            platforms: vec![PlatformId::Wasm],
            ..Options::default()
        };
        let resolved = TargetResolved::resolve(target, Manifest::default(), &options).unwrap();

        assert_eq!(resolved.platforms.len(), 1);
        assert_eq!(resolved.platforms[0].id, PlatformId::Wasm);
    }

    #[test]
    fn test_resolve_manifest_fills_declaration_gaps() {
        let manifest = Manifest::from_str(
            r#"
            [target]
            name = "fromfile"
            platforms = ["x64"]
            static = true
            files = ["README.md"]

            [git]
            branch = "main"
            no_own_push = true
            "#,
        )
        .unwrap();

        let target = Target::new(|_: &mut Build| Ok(()));
        let resolved =
            TargetResolved::resolve(target, manifest, &Options::default()).unwrap();

        assert_eq!(resolved.name, "fromfile");
        assert_eq!(resolved.platforms.len(), 1);
        assert!(resolved.static_lib);
        assert!(resolved.no_own_push);
        assert_eq!(resolved.branch, "main");
        assert_eq!(resolved.files, vec![CopyRule::file("README.md")]);
    }

    #[test]
    fn test_resolve_empty_configurations_rejected() {
        let mut target = Target::new(|_: &mut Build| Ok(()));
        target.name = Some("mylib".into());
        target.configurations = Some(Vec::new());
        assert!(
            TargetResolved::resolve(target, Manifest::default(), &Options::default()).is_err()
        );
    }

    // ------------------------------------------------------------------------
    // Full orchestration
    // ------------------------------------------------------------------------

    /// A project directory with one header, two object files and a readme,
    /// publishing into `<tmp>/mylib-bin`.
    struct Project {
        dir: TempDir,
    }

    impl Project {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("mylib");
            fs::create_dir_all(root.join("headers")).unwrap();
            fs::create_dir_all(root.join("objs")).unwrap();
            fs::write(root.join("README.md"), "readme").unwrap();
            fs::write(root.join("headers/api.h"), "api").unwrap();
            fs::write(root.join("objs/a.obj"), "a").unwrap();
            fs::write(root.join("objs/b.obj"), "b").unwrap();
            Self { dir }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("mylib")
        }

        fn export(&self) -> PathBuf {
            self.dir.path().join("mylib-bin")
        }

        fn target(&self) -> Target {
            let objs = self.root().join("objs");
            let mut target = Target::new(move |build: &mut Build| {
                let lib = format!("mylib{}.lib", build.config.postfix);
                let dest = build.lib_export_dir.clone();
                build.copy(
                    &objs,
                    &dest,
                    &[CopyRule::combine(["a.obj", "b.obj"], lib)],
                )
            });
            target.name = Some("mylib".into());
            target.root = Some(self.root());
            target.export_dir = Some(self.export());
            target.platforms = Some(vec![PlatformId::X64]);
            target.files = vec![
                CopyRule::file("README.md"),
                CopyRule::glob("headers", "include", ["**/*.h"]),
            ];
            target
        }

        fn publish(&self, target: Target) -> Rc<RecordingInvoker> {
            let invoker = Rc::new(RecordingInvoker::default());
            let resolved =
                TargetResolved::resolve(target, Manifest::default(), &Options::default())
                    .unwrap();
            resolved.publish(Box::new(invoker.clone())).unwrap();
            invoker
        }
    }

    #[test]
    fn test_publish_populates_export_tree() {
        let project = Project::new();
        let invoker = project.publish(project.target());

        assert!(project.export().join("README.md").exists());
        assert!(project.export().join("include/api.h").exists());
        assert!(project.export().join("lib/x64/mylibd.lib").exists());
        assert!(project.export().join("lib/x64/mylib.lib").exists());
        // One combine per configuration
        assert_eq!(invoker.combine_count(), 2);
    }

    #[test]
    fn test_publish_twice_is_idempotent() {
        let project = Project::new();
        project.publish(project.target());
        let second = project.publish(project.target());

        // Staleness gates every external invocation the second time around
        assert_eq!(second.combine_count(), 0);
        assert!(project.export().join("README.md").exists());
        assert!(project.export().join("include/api.h").exists());
        assert!(project.export().join("lib/x64/mylibd.lib").exists());
    }

    #[test]
    fn test_publish_sweeps_dropped_rules() {
        let project = Project::new();
        project.publish(project.target());
        assert!(project.export().join("README.md").exists());

        let mut target = project.target();
        target.files = vec![CopyRule::glob("headers", "include", ["**/*.h"])];
        project.publish(target);

        assert!(!project.export().join("README.md").exists());
        assert!(project.export().join("include/api.h").exists());
    }

    #[test]
    fn test_publish_sweeps_stale_platform_artifacts() {
        let project = Project::new();
        project.publish(project.target());

        let stale = project.export().join("lib/x64/old-leftover.lib");
        fs::write(&stale, "stale").unwrap();

        project.publish(project.target());
        assert!(!stale.exists());
        assert!(project.export().join("lib/x64/mylib.lib").exists());
    }

    #[test]
    fn test_publish_keeps_unselected_platform_artifacts() {
        let project = Project::new();
        project.publish(project.target());

        // Artifacts of a platform not selected in this run must survive
        let other = project.export().join("lib/x86");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("mylib.lib"), "x86 build").unwrap();

        project.publish(project.target());
        assert!(other.join("mylib.lib").exists());
    }

    #[test]
    fn test_publish_runs_hooks_in_order() {
        let project = Project::new();
        let pre = Rc::new(Cell::new(false));
        let post = Rc::new(Cell::new(false));

        let mut target = project.target();
        let pre_flag = pre.clone();
        target.prebuild = Some(Box::new(move || {
            pre_flag.set(true);
            Ok(())
        }));
        let post_flag = post.clone();
        target.postbuild = Some(Box::new(move || {
            post_flag.set(true);
            Ok(())
        }));

        project.publish(target);
        assert!(pre.get());
        assert!(post.get());
    }

    #[test]
    fn test_publish_aborts_on_callback_error() {
        let project = Project::new();
        let mut target = project.target();
        target.each = Box::new(|_: &mut Build| bail!("compile exploded"));

        let resolved =
            TargetResolved::resolve(target, Manifest::default(), &Options::default()).unwrap();
        let err = resolved
            .publish(Box::new(RecordingInvoker::default()))
            .unwrap_err();
        assert!(format!("{err}").contains("compile exploded"));
    }

    #[test]
    fn test_publish_missing_file_rule_aborts() {
        let project = Project::new();
        let mut target = project.target();
        target.files.push(CopyRule::file("missing.bin"));

        let resolved =
            TargetResolved::resolve(target, Manifest::default(), &Options::default())
                .unwrap();
        let err = resolved
            .publish(Box::new(RecordingInvoker::default()))
            .unwrap_err();
        assert!(format!("{err}").contains("missing.bin"));
    }
}
