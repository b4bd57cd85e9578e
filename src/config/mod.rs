//! Manifest configuration for `libpub.toml`.
//!
//! The manifest carries the declarative half of a target declaration; the
//! hooks and the per-combination callback stay in code. Every field is
//! optional, so a project with a fully coded declaration needs no manifest
//! at all.
//!
//! # Sections
//!
//! | Section    | Purpose                                          |
//! |------------|--------------------------------------------------|
//! | `[target]` | Name, platforms, configurations, copy rules      |
//! | `[git]`    | Commit/push behavior for the two repositories    |
//! | `[tools]`  | External IDE, WebAssembly linker, archiver root  |
//!
//! # Example
//!
//! ```toml
//! [target]
//! name = "mylib"
//! platforms = ["x86", "x64", "wasm"]
//! static = false
//! files = [
//!     "README.md",
//!     { source = "headers", dest = "include", patterns = ["**/*.h"] },
//! ]
//!
//! [git]
//! branch = "master"
//! no_own_push = true
//!
//! [tools]
//! ide = ["devenv"]
//! wasm_linker = ["emcc"]
//! archiver_root = "~/vcbin"
//! ```

pub mod defaults;
mod error;

pub use error::ConfigError;

use crate::export::CopyRule;
use crate::platform::{Configuration, PlatformId};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Manifest file name looked up in the project root.
pub const MANIFEST_FILE: &str = "libpub.toml";

// ============================================================================
// Root Manifest
// ============================================================================

/// Root manifest structure representing `libpub.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Declarative target fields
    pub target: TargetConfig,

    /// Version-control behavior
    pub git: GitConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

impl Manifest {
    /// Parse a manifest from TOML text.
    pub fn from_str(content: &str) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(content).map_err(ConfigError::Toml)?;
        manifest.normalize();
        Ok(manifest)
    }

    /// Load a manifest from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load the manifest at `path`, falling back to the defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Expand `~` in configured paths.
    fn normalize(&mut self) {
        if let Some(root) = &self.tools.archiver_root {
            let expanded = shellexpand::tilde(&root.to_string_lossy()).into_owned();
            self.tools.archiver_root = Some(PathBuf::from(expanded));
        }
    }

    /// Validate the external tool commands needed by this run.
    ///
    /// `check_ide` and `check_wasm` narrow the check to the tools the run
    /// will actually invoke.
    pub fn validate(&self, check_ide: bool, check_wasm: bool) -> Result<()> {
        if check_ide {
            Self::check_command_installed("[tools.ide]", &self.tools.ide)?;
        }
        if check_wasm {
            Self::check_command_installed("[tools.wasm_linker]", &self.tools.wasm_linker)?;
        }
        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        if command.is_empty() {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        }

        let cmd = &command[0];
        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// `[target]` section: the declarative half of a target declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Library name; defaults to the project directory's basename.
    pub name: Option<String>,

    /// Platforms to build; defaults to all of them.
    pub platforms: Option<Vec<PlatformId>>,

    /// Configurations to build; defaults to Debug and Release.
    pub configurations: Option<Vec<Configuration>>,

    /// The library builds as a static archive only.
    #[serde(rename = "static")]
    pub static_lib: bool,

    /// Headers are organized per platform instead of shared.
    pub platform_based_header: bool,

    /// Top-level copy rules applied from the root into the export tree.
    pub files: Vec<CopyRule>,
}

/// `[git]` section: commit/push behavior.
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct GitConfig {
    /// Skip committing the project's own repository.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = defaults::r#false())]
    pub no_own_repo: bool,

    /// Skip pushing the project's own repository.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = defaults::r#false())]
    pub no_own_push: bool,

    /// Branch pushed to on both repositories.
    #[serde(default = "defaults::git_branch")]
    #[educe(Default = defaults::git_branch())]
    pub branch: String,
}

/// `[tools]` section: external tool locations.
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// IDE build command.
    #[serde(default = "defaults::ide_command")]
    #[educe(Default = defaults::ide_command())]
    pub ide: Vec<String>,

    /// WebAssembly linker command.
    #[serde(default = "defaults::wasm_linker_command")]
    #[educe(Default = defaults::wasm_linker_command())]
    pub wasm_linker: Vec<String>,

    /// Root of the per-platform archiver tools, laid out as
    /// `<root>/<short_name>/lib`. Defaults to the `VCBIN` environment
    /// variable when set.
    #[serde(default = "defaults::archiver_root")]
    #[educe(Default = defaults::archiver_root())]
    pub archiver_root: Option<PathBuf>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_manifest_gets_defaults() {
        let manifest = Manifest::from_str("").unwrap();
        assert!(manifest.target.name.is_none());
        assert!(manifest.target.platforms.is_none());
        assert!(!manifest.target.static_lib);
        assert_eq!(manifest.git.branch, "master");
        assert_eq!(manifest.tools.ide, vec!["devenv"]);
        assert_eq!(manifest.tools.wasm_linker, vec!["emcc"]);
    }

    #[test]
    fn test_full_manifest_all_sections() {
        let manifest = Manifest::from_str(
            r#"
            [target]
            name = "mylib"
            platforms = ["x86", "wasm"]
            static = true
            platform_based_header = true
            files = [
                "README.md",
                { source = "headers", dest = "include", patterns = ["**/*.h"] },
            ]

            [[target.configurations]]
            name = "Debug"
            postfix = "d"

            [[target.configurations]]
            name = "Release"

            [git]
            branch = "main"
            no_own_repo = true

            [tools]
            ide = ["devenv", "/nologo"]
            wasm_linker = ["emcc"]
            archiver_root = "/opt/vcbin"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.target.name.as_deref(), Some("mylib"));
        assert_eq!(
            manifest.target.platforms,
            Some(vec![PlatformId::X86, PlatformId::Wasm])
        );
        assert!(manifest.target.static_lib);
        assert!(manifest.target.platform_based_header);
        assert_eq!(manifest.target.files.len(), 2);

        let configs = manifest.target.configurations.unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].postfix, "d");
        assert_eq!(configs[1].postfix, "");

        assert!(manifest.git.no_own_repo);
        assert!(!manifest.git.no_own_push);
        assert_eq!(manifest.git.branch, "main");

        assert_eq!(manifest.tools.ide.len(), 2);
        assert_eq!(
            manifest.tools.archiver_root,
            Some(PathBuf::from("/opt/vcbin"))
        );
    }

    #[test]
    fn test_unknown_field_rejection() {
        let result = Manifest::from_str(
            r#"
            [target]
            nmae = "typo"
            "#,
        );
        assert!(result.is_err());

        let result = Manifest::from_str(
            r#"
            [unknown_section]
            field = "value"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let manifest = Manifest::from_str(
            r#"
            [tools]
            archiver_root = "~/vcbin"
            "#,
        )
        .unwrap();

        let root = manifest.tools.archiver_root.unwrap();
        assert!(!root.to_string_lossy().starts_with('~'));
        assert!(root.ends_with("vcbin"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(manifest.target.name.is_none());
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, "[target]\nname = \"ondisk\"\n").unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.target.name.as_deref(), Some("ondisk"));
    }

    #[test]
    fn test_validate_empty_command() {
        let manifest = Manifest::from_str(
            r#"
            [tools]
            ide = []
            "#,
        )
        .unwrap();
        assert!(manifest.validate(true, false).is_err());
        // The empty command is not checked when the IDE is not needed
        assert!(manifest.validate(false, false).is_ok());
    }

    #[test]
    fn test_validate_missing_binary() {
        let manifest = Manifest::from_str(
            r#"
            [tools]
            wasm_linker = ["definitely-not-a-real-linker-0921"]
            "#,
        )
        .unwrap();
        assert!(manifest.validate(false, true).is_err());
    }

    #[test]
    fn test_validate_present_binary() {
        // `sh` exists everywhere the tests run
        let manifest = Manifest::from_str(
            r#"
            [tools]
            ide = ["sh"]
            "#,
        )
        .unwrap();
        assert!(manifest.validate(true, false).is_ok());
    }
}
