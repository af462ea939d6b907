//! Running procured tools.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::process::{Command, Stdio};

use crate::{DepsError, Result};

use super::Registry;

impl Registry {
    /// A command for the resolved executable of `name`, procuring it first
    pub fn command(&self, name: &str) -> Result<Command> {
        Ok(Command::new(self.resolved_path(name)?))
    }

    /// Run `name` with the parent's stdio, failing on a non-zero exit
    pub fn run<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<()> {
        self.run_with_env(name, &HashMap::new(), args)
    }

    pub fn run_with_env<S: AsRef<OsStr>>(&self, name: &str, env: &HashMap<String, String>, args: &[S]) -> Result<()> {
        let mut command = self.command(name)?;
        command.args(args).envs(env);

        log::debug!("Running {:?}", command);
        let status = command.status().map_err(|e| command_error(name, e.to_string()))?;
        if !status.success() {
            return Err(command_error(name, format!("exited with {}", status)));
        }
        Ok(())
    }

    /// Run `name` and return its stdout without the trailing newline.
    /// Stderr goes to the parent's stderr.
    pub fn output<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<String> {
        self.output_with_env(name, &HashMap::new(), args)
    }

    pub fn output_with_env<S: AsRef<OsStr>>(
        &self,
        name: &str,
        env: &HashMap<String, String>,
        args: &[S],
    ) -> Result<String> {
        let mut command = self.command(name)?;
        command.args(args).envs(env).stderr(Stdio::inherit());

        log::debug!("Running {:?}", command);
        let output = command.output().map_err(|e| command_error(name, e.to_string()))?;
        if !output.status.success() {
            return Err(command_error(name, format!("exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.strip_suffix('\n').unwrap_or(&stdout).to_string())
    }
}

fn command_error(name: &str, reason: String) -> DepsError {
    DepsError::Command {
        program: name.to_string(),
        reason,
    }
}
