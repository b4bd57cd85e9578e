//! External build tool invocation.
//!
//! Everything that spawns a compiler, linker or archiver goes through the
//! [`ToolInvoker`] trait. The orchestration core only sees "run and wait,
//! fail on nonzero status"; tests substitute a recording fake.

use crate::config::ToolsConfig;
use crate::platform::{Configuration, Platform};
use crate::utils::exec::{exec, filter_args, to_cmd_vec, to_os};
use anyhow::Result;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Seam for external process invocation.
pub trait ToolInvoker {
    /// Run an arbitrary program and wait for it. Nonzero exit is an error.
    fn run(&self, program: &str, args: &[OsString]) -> Result<()>;

    /// Build one (configuration, platform) combination of an IDE solution.
    fn ide_build(&self, solution: &Path, config_name: &str, platform_name: &str) -> Result<()>;

    /// Combine object or library files into one output artifact.
    fn combine(
        &self,
        platform: &Platform,
        config: &Configuration,
        output: &Path,
        inputs: &[PathBuf],
    ) -> Result<()>;
}

/// The real invoker: commands come from the `[tools]` manifest section.
pub struct CommandInvoker {
    tools: ToolsConfig,
}

impl CommandInvoker {
    pub fn new(tools: ToolsConfig) -> Self {
        Self { tools }
    }
}

impl ToolInvoker for CommandInvoker {
    fn run(&self, program: &str, args: &[OsString]) -> Result<()> {
        exec(None, &to_cmd_vec([program]), &filter_args(args))?;
        Ok(())
    }

    fn ide_build(&self, solution: &Path, config_name: &str, platform_name: &str) -> Result<()> {
        let args = filter_args(&[
            to_os(solution),
            to_os("/build"),
            to_os(format!("{config_name}|{platform_name}")),
        ]);
        exec(None, &to_cmd_vec(&self.tools.ide), &args)?;
        Ok(())
    }

    fn combine(
        &self,
        platform: &Platform,
        config: &Configuration,
        output: &Path,
        inputs: &[PathBuf],
    ) -> Result<()> {
        if platform.is_wasm() {
            let mut args = vec![to_os("-o"), to_os(output)];
            args.extend(inputs.iter().map(to_os));
            exec(None, &to_cmd_vec(&self.tools.wasm_linker), &filter_args(&args))?;
        } else {
            let mut args = vec![
                to_os("/NOLOGO"),
                to_os(format!("/OUT:{}", output.display())),
                to_os(format!("/MACHINE:{}", platform.short_name.to_uppercase())),
            ];
            if config.is_release() {
                args.push(to_os("/LTCG"));
            }
            args.extend(inputs.iter().map(to_os));
            // 4221: an object file with no public symbols, expected for
            // configuration-stubbed sources
            args.push(to_os("/IGNORE:4221"));

            let archiver = platform.archiver.display().to_string();
            exec(None, &to_cmd_vec([archiver.as_str()]), &filter_args(&args))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// What a fake invoker was asked to do.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Run(String),
        IdeBuild(PathBuf, String, String),
        Combine(PathBuf, Vec<PathBuf>),
    }

    /// Records invocations instead of spawning anything. `combine` writes
    /// the output file so staleness behaves like the real archiver.
    #[derive(Default)]
    pub struct RecordingInvoker {
        pub calls: RefCell<Vec<Call>>,
    }

    impl RecordingInvoker {
        pub fn combine_count(&self) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| matches!(c, Call::Combine(..)))
                .count()
        }
    }

    impl ToolInvoker for std::rc::Rc<RecordingInvoker> {
        fn run(&self, program: &str, args: &[OsString]) -> Result<()> {
            self.as_ref().run(program, args)
        }

        fn ide_build(
            &self,
            solution: &Path,
            config_name: &str,
            platform_name: &str,
        ) -> Result<()> {
            self.as_ref().ide_build(solution, config_name, platform_name)
        }

        fn combine(
            &self,
            platform: &Platform,
            config: &Configuration,
            output: &Path,
            inputs: &[PathBuf],
        ) -> Result<()> {
            self.as_ref().combine(platform, config, output, inputs)
        }
    }

    impl ToolInvoker for RecordingInvoker {
        fn run(&self, program: &str, _args: &[OsString]) -> Result<()> {
            self.calls.borrow_mut().push(Call::Run(program.to_owned()));
            Ok(())
        }

        fn ide_build(
            &self,
            solution: &Path,
            config_name: &str,
            platform_name: &str,
        ) -> Result<()> {
            self.calls.borrow_mut().push(Call::IdeBuild(
                solution.to_path_buf(),
                config_name.to_owned(),
                platform_name.to_owned(),
            ));
            Ok(())
        }

        fn combine(
            &self,
            _platform: &Platform,
            _config: &Configuration,
            output: &Path,
            inputs: &[PathBuf],
        ) -> Result<()> {
            std::fs::write(output, "archive")?;
            self.calls
                .borrow_mut()
                .push(Call::Combine(output.to_path_buf(), inputs.to_vec()));
            Ok(())
        }
    }
}
