//! Default values for manifest fields, shared between serde and `educe`.

use std::env;
use std::path::PathBuf;

pub fn git_branch() -> String {
    "master".into()
}

pub fn ide_command() -> Vec<String> {
    vec!["devenv".into()]
}

pub fn wasm_linker_command() -> Vec<String> {
    vec!["emcc".into()]
}

/// Per-platform archiver root; the `VCBIN` environment variable when set.
pub fn archiver_root() -> Option<PathBuf> {
    env::var_os("VCBIN").map(PathBuf::from)
}

pub const fn r#false() -> bool {
    false
}
