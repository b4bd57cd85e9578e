//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap. The embedding
//! project's binary hands the parsed result to [`crate::run`].

use crate::platform::PlatformId;
use clap::{Args, Parser, Subcommand};

/// Build, export and publish a native library
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Platform restriction flags shared by build-like commands.
///
/// More than one flag may be given; no flag means every platform the
/// target declares.
#[derive(Args, Debug, Clone)]
pub struct PlatformFlags {
    /// Build the 32-bit native platform
    #[arg(long)]
    pub x86: bool,

    /// Build the 64-bit native platform
    #[arg(long)]
    pub x64: bool,

    /// Build the WebAssembly platform
    #[arg(long)]
    pub wasm: bool,
}

impl PlatformFlags {
    /// The restriction list; empty means unrestricted.
    pub fn restriction(&self) -> Vec<PlatformId> {
        let mut platforms = Vec::new();
        if self.x86 {
            platforms.push(PlatformId::X86);
        }
        if self.x64 {
            platforms.push(PlatformId::X64);
        }
        if self.wasm {
            platforms.push(PlatformId::Wasm);
        }
        platforms
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build every selected combination and refresh the export tree
    Publish {
        #[command(flatten)]
        platforms: PlatformFlags,

        /// Skip invoking the external IDE compiler
        #[arg(long)]
        no_build: bool,

        /// Skip copy rules whose source file is missing
        #[arg(long)]
        ignore_missing: bool,

        /// Commit and push both repositories after a successful run
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Commit the project and export repositories
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Push the project and export repositories
    Push,
}

impl Cli {
    /// Flatten the parsed command into the options record the orchestrator
    /// consumes.
    pub fn options(&self) -> Options {
        match &self.command {
            Commands::Publish {
                platforms,
                no_build,
                ignore_missing,
                message,
            } => Options {
                platforms: platforms.restriction(),
                no_build: *no_build,
                ignore_missing: *ignore_missing,
                commit_message: message.clone(),
            },
            Commands::Commit { message } => Options {
                commit_message: Some(message.clone()),
                ..Options::default()
            },
            Commands::Push => Options::default(),
        }
    }
}

/// Flattened run options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Platform restriction; empty means every declared platform.
    pub platforms: Vec<PlatformId>,
    /// Skip the external IDE compiler.
    pub no_build: bool,
    /// Skip copy rules whose source file is missing.
    pub ignore_missing: bool,
    /// Commit (and push) after a successful run.
    pub commit_message: Option<String>,
}
