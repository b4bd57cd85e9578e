//! Target platform and build configuration tables.
//!
//! Platforms are a fixed enumeration resolved once at run start;
//! configurations are open structs so a manifest can declare more than the
//! built-in Debug/Release pair.

use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Platforms
// ============================================================================

/// Identifier of a target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    /// 32-bit native build.
    X86,
    /// 64-bit native build.
    X64,
    /// Browser build through the Emscripten toolchain.
    Wasm,
}

impl PlatformId {
    /// Every supported platform, in build order.
    pub const ALL: [PlatformId; 3] = [PlatformId::X86, PlatformId::X64, PlatformId::Wasm];

    /// Resolve the static naming table plus the archiver location for this
    /// platform. `archiver_root` holds per-platform archiver binaries laid
    /// out as `<root>/<short_name>/lib`; without it the bare tool name is
    /// used and resolution is left to `PATH`.
    pub fn resolve(self, archiver_root: Option<&Path>) -> Platform {
        let (name, short_name, long_name) = match self {
            PlatformId::X86 => ("x86", "x86", "Win32"),
            PlatformId::X64 => ("x64", "x64", "x64"),
            PlatformId::Wasm => ("wasm", "wasm", "Emscripten"),
        };
        let archiver = match archiver_root {
            Some(root) => root.join(short_name).join("lib"),
            None => PathBuf::from("lib"),
        };
        Platform {
            id: self,
            name,
            short_name,
            long_name,
            archiver,
        }
    }
}

/// A resolved target platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    pub id: PlatformId,
    /// Canonical name.
    pub name: &'static str,
    /// Short name, used as a path segment in the export tree.
    pub short_name: &'static str,
    /// Long name, following the IDE's naming convention.
    pub long_name: &'static str,
    /// Path of the archiver tool used to combine object files.
    pub archiver: PathBuf,
}

impl Platform {
    /// Whether this platform builds through the WebAssembly toolchain.
    pub fn is_wasm(&self) -> bool {
        self.id == PlatformId::Wasm
    }
}

// ============================================================================
// Configurations
// ============================================================================

/// A build flavor.
///
/// Debug artifacts carry `postfix` appended to the file stem; release
/// artifacts carry none.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub postfix: String,
}

impl Configuration {
    pub fn debug() -> Self {
        Self {
            name: "Debug".into(),
            postfix: "d".into(),
        }
    }

    pub fn release() -> Self {
        Self {
            name: "Release".into(),
            postfix: String::new(),
        }
    }

    pub fn is_release(&self) -> bool {
        self.name == "Release"
    }
}

/// The default configuration list: Debug then Release.
pub fn default_configurations() -> Vec<Configuration> {
    vec![Configuration::debug(), Configuration::release()]
}
