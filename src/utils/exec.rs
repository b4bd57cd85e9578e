//! External command execution utilities.
//!
//! Provides the `exec!` macro and helpers for running the external build
//! tools with proper output handling. A nonzero exit status is an error.

use crate::log;
use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    path::Path,
    process::{Command, Output},
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command with arguments.
///
/// # Examples
/// ```ignore
/// // Without working directory
/// exec!(["git"]; "status", "--porcelain")?;
///
/// // With working directory
/// exec!(root; ["git"]; "push", "origin", branch)?;
/// ```
#[macro_export]
macro_rules! exec {
    ($cmd:expr; $($arg:expr),* $(,)?) => {{
        $crate::utils::exec::exec(
            None,
            &$crate::utils::exec::to_cmd_vec($cmd),
            &$crate::utils::exec::filter_args(&[$($crate::utils::exec::to_os($arg)),*]),
        )
    }};
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {{
        $crate::utils::exec::exec(
            Some($root),
            &$crate::utils::exec::to_cmd_vec($cmd),
            &$crate::utils::exec::filter_args(&[$($crate::utils::exec::to_os($arg)),*]),
        )
    }};
}

// ============================================================================
// Argument Conversion
// ============================================================================

/// Convert to `OsString`.
#[inline]
pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
    s.into()
}

/// Trait for converting to command vector.
pub trait ToCmd {
    fn to_cmd(self) -> Vec<OsString>;
}

impl<const N: usize> ToCmd for [&str; N] {
    #[inline]
    fn to_cmd(self) -> Vec<OsString> {
        self.into_iter().map(OsString::from).collect()
    }
}

impl ToCmd for &[String] {
    #[inline]
    fn to_cmd(self) -> Vec<OsString> {
        self.iter().map(OsString::from).collect()
    }
}

impl ToCmd for &Vec<String> {
    #[inline]
    fn to_cmd(self) -> Vec<OsString> {
        self.iter().map(OsString::from).collect()
    }
}

/// Convert command to Vec<OsString>.
#[inline]
pub fn to_cmd_vec<C: ToCmd>(cmd: C) -> Vec<OsString> {
    cmd.to_cmd()
}

/// Filter out empty args.
#[inline]
pub fn filter_args(args: &[OsString]) -> Vec<OsString> {
    args.iter().filter(|a| !a.is_empty()).cloned().collect()
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command and capture its output.
///
/// # Errors
/// Returns error if command fails to execute or returns non-zero exit code.
pub fn exec(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output)?;
    Ok(output)
}

/// Prepare a Command from components.
fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .context("Empty command")?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

// ============================================================================
// Output Filtering
// ============================================================================

/// Filter rule for tool output noise.
///
/// Matches lines that start with a prefix AND contain all required keywords.
/// This is more precise than keyword-only matching to avoid filtering
/// genuine diagnostics.
struct FilterRule {
    /// Line must start with one of these (case-insensitive, after trim).
    starts_with: &'static [&'static str],
    /// Line must also contain ALL of these keywords (case-insensitive).
    contains: &'static [&'static str],
}

impl FilterRule {
    const fn new(starts_with: &'static [&'static str], contains: &'static [&'static str]) -> Self {
        Self {
            starts_with,
            contains,
        }
    }

    fn matches(&self, line: &str) -> bool {
        let lower = line.trim().to_ascii_lowercase();
        let has_prefix =
            self.starts_with.is_empty() || self.starts_with.iter().any(|p| lower.starts_with(p));
        let has_keywords = self.contains.iter().all(|kw| lower.contains(kw));
        has_prefix && has_keywords
    }
}

/// Stderr filter configuration.
///
/// Known banner lines:
///   Microsoft (R) Visual Studio ...
///   Copyright (C) Microsoft Corporation ...
///   cache:INFO: generating system asset ...
///   shared:INFO: (Emscripten: Running sanity checks)
const STDERR_RULES: &[FilterRule] = &[
    FilterRule::new(&["microsoft (r)"], &[]),
    FilterRule::new(&["copyright (c)"], &["microsoft"]),
    FilterRule::new(&["cache:info:"], &[]),
    FilterRule::new(&["shared:info:"], &[]),
];

/// Check if a stderr line should be filtered.
fn should_filter_line(line: &str) -> bool {
    STDERR_RULES.iter().any(|r| r.matches(line))
}

/// Extract error message from stderr, skipping filtered lines at the start.
fn extract_error(stderr: &str) -> &str {
    stderr
        .lines()
        .find(|line| !line.trim().is_empty() && !should_filter_line(line))
        .map(|first| {
            let offset = first.as_ptr() as usize - stderr.as_ptr() as usize;
            &stderr[offset..]
        })
        .unwrap_or(stderr)
        .trim()
}

/// Log command output, filtering known noise.
///
/// On success only stderr (warnings) is logged; build tools echo their whole
/// command line to stdout and that is rarely worth repeating.
fn log_output(name: &str, output: &Output) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();

    if !output.status.success() {
        let error_msg = extract_error(stderr);
        if !error_msg.is_empty() {
            eprintln!("{error_msg}");
        }
        anyhow::bail!("Command `{name}` failed with {}", output.status);
    }

    for line in stderr.lines() {
        if !line.trim().is_empty() && !should_filter_line(line) {
            log!(name; "{line}");
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
