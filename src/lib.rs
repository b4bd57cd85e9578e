//! libpub - build, export and publish native libraries.
//!
//! A project embeds this crate in its own publish binary: it declares a
//! [`Target`] with the platforms, configurations and copy rules to export,
//! plus a per-combination callback that drives the external compiler, then
//! hands everything to [`run`]. The export tree lives beside the project as
//! `../<name>-bin`, is refreshed incrementally by modification time, and is
//! reconciled by a mark-and-sweep pass so stale artifacts disappear without
//! a full rebuild.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     let mut target = libpub::Target::new(|build| {
//!         build.ide_build("mylib.sln")?;
//!         build.copy_lib(None, None)
//!     });
//!     target.files = vec![
//!         libpub::CopyRule::file("README.md"),
//!         libpub::CopyRule::glob("headers", "include", ["**/*.h"]),
//!     ];
//!
//!     if libpub::run(target).is_err() {
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod build;
pub mod cli;
pub mod config;
pub mod export;
pub mod invoker;
pub mod logger;
pub mod platform;
pub mod target;
pub mod utils;

pub use build::{Build, ImportPaths};
pub use cli::{Cli, Commands, Options};
pub use config::Manifest;
pub use export::{Copier, CopyRule, ExportTracker};
pub use invoker::{CommandInvoker, ToolInvoker};
pub use platform::{Configuration, Platform, PlatformId};
pub use target::{Target, TargetResolved};

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Parse the command line and run the requested command against `target`.
///
/// Failures are logged before being returned, so an embedding `main` only
/// has to pick the exit code.
pub fn run(target: Target) -> Result<()> {
    let cli = Cli::parse();
    let result = dispatch(target, &cli);
    if let Err(error) = &result {
        logger::log("error", &format!("{error:?}"));
    }
    result
}

/// Run one parsed command.
fn dispatch(target: Target, cli: &Cli) -> Result<()> {
    let options = cli.options();
    let root = target.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let manifest = Manifest::load(&root.join(config::MANIFEST_FILE))?;

    let resolved = TargetResolved::resolve(target, manifest.clone(), &options)?;

    match &cli.command {
        Commands::Publish { .. } => {
            let needs_wasm = resolved.platforms.iter().any(Platform::is_wasm);
            manifest.validate(!options.no_build, needs_wasm)?;
            resolved.publish(Box::new(CommandInvoker::new(manifest.tools)))
        }
        Commands::Commit { message } => resolved.git_commit(message),
        Commands::Push => resolved.git_push(),
    }
}
