// NetLab: Scripted network experiments on Linux namespaces
// Copyright (C) 2022-2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module for executing commands inside a network namespace.

use std::{
    ffi::OsStr,
    process::{Command as StdCommand, Output},
    string::FromUtf8Error,
    time::Duration,
};

use itertools::Itertools;
use thiserror::Error;
use tokio::{process::Command, time::timeout};

use crate::config::CONFIG;

/// Name used for logging commands that are executed in the root namespace.
pub const ROOT_NAME: &str = "root";

/// A handle to execute commands in a network namespace (or in the root namespace).
///
/// Every command is wrapped as `ip netns exec <namespace> <cmd>`. If `lab.use_sudo` is set in the
/// configuration, `sudo` is prepended. Make sure that `sudo` can be used without a password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetnsSession {
    /// Name of the namespace, or `None` for the root namespace.
    namespace: Option<String>,
}

impl NetnsSession {
    /// Create a session for the given namespace. This function does not check if the namespace
    /// exists. Use [`NetnsSession::verify`] for that.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Create a session that executes all commands in the root namespace.
    pub fn root() -> Self {
        Self { namespace: None }
    }

    /// Get the name of the namespace, or `"root"`.
    pub fn name(&self) -> &str {
        self.namespace.as_deref().unwrap_or(ROOT_NAME)
    }

    /// Get the namespace, or `None` for the root namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Make sure that commands can be executed in the namespace, by running `echo test`. This
    /// function waits for at most 10 seconds.
    pub async fn verify(&self) -> Result<(), NetnsError> {
        log::trace!("[{}] verifying...", self.name());
        match timeout(Duration::from_secs(10), self.execute_cmd(&["echo", "test"])).await {
            Ok(Ok((stdout, _))) => {
                let stdout = String::from_utf8_lossy(&stdout);
                if stdout.trim() == "test" {
                    log::trace!("[{}] namespace is ready!", self.name());
                    Ok(())
                } else {
                    log::error!(
                        "[{}] Unexpected stdout! expected `test`, but got:\n{stdout}",
                        self.name()
                    );
                    Err(NetnsError::Setup(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Expected `test`, but got {stdout}"),
                    )))
                }
            }
            Ok(Err(e)) => {
                log::error!("[{}] Cannot execute commands: {e}", self.name());
                Err(e)
            }
            Err(_) => {
                log::error!("[{}] timeout!", self.name());
                Err(NetnsError::Timeout)
            }
        }
    }

    /// Create a `std::process::Command` that executes `program` in the namespace. The prefix
    /// (`sudo` and `ip netns exec <ns>`) is already set.
    pub fn std_command(&self, program: impl AsRef<OsStr>) -> StdCommand {
        let mut prefix: Vec<&OsStr> = Vec::new();
        if CONFIG.lab.use_sudo {
            prefix.push(OsStr::new("sudo"));
        }
        if let Some(ns) = self.namespace.as_deref() {
            prefix.extend(
                [CONFIG.tools.ip.as_str(), "netns", "exec", ns]
                    .into_iter()
                    .map(OsStr::new),
            );
        }
        match prefix.split_first() {
            Some((first, rest)) => {
                let mut cmd = StdCommand::new(first);
                cmd.args(rest).arg(program);
                cmd
            }
            None => StdCommand::new(program),
        }
    }

    /// Create a tokio command that executes `program` in the namespace, with `kill_on_drop` set.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::from(self.std_command(program));
        log::trace!("[tokio::process::Command] {:?}", cmd);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Create a command from a list of arguments, the first one being the program.
    fn command_from_args(&self, args: &[impl AsRef<str> + Sync]) -> Result<Command, NetnsError> {
        let (program, rest) = args.split_first().ok_or(NetnsError::EmptyCommand)?;
        let mut cmd = self.command(program.as_ref());
        for arg in rest {
            cmd.arg(arg.as_ref());
        }
        Ok(cmd)
    }

    /// Execute a command and return the bytes of both `STDOUT` and `STDERR`. This function call
    /// will check that the returned exit code is 0.
    ///
    /// ```rust,no_run
    /// use netns_lab::netns::NetnsSession;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///
    /// let s = NetnsSession::new("nl-h1");
    /// let (stdout, stderr) = s.execute_cmd(&["echo", "hi"]).await?;
    /// assert_eq!(stdout, b"hi\n");
    /// assert!(stderr.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute_cmd(
        &self,
        args: &[impl AsRef<str> + Sync],
    ) -> Result<(Vec<u8>, Vec<u8>), NetnsError> {
        let cmd_str = || args.iter().map(AsRef::as_ref).join(" ");

        log::trace!("[{}] `{}`", self.name(), cmd_str());
        let output = match self.command_from_args(args)?.output().await {
            Ok(out) => out,
            Err(e) => {
                log::error!("[{}] {} failed: {}", self.name(), cmd_str(), e);
                Err(e)?
            }
        };

        check_output(self.name(), output, cmd_str)
    }

    /// Execute a command. Then, check that the status is successful, and that STDERR is
    /// empty. Finally, return the parsed STDOUT.
    pub async fn execute_cmd_stdout(
        &self,
        args: &[impl AsRef<str> + Sync],
    ) -> Result<String, NetnsError> {
        let (stdout, stderr) = self.execute_cmd(args).await?;

        if !stderr.is_empty() {
            log::trace!(
                "[{}] {} returned non-empty stderr:\nSTDERR:\n{}",
                self.name(),
                args.iter().map(AsRef::as_ref).join(" "),
                String::from_utf8_lossy(&stderr)
            );
            Err(NetnsError::CommandError(
                self.name().to_string(),
                args.iter().map(AsRef::as_ref).join(" "),
                255,
            ))
        } else {
            Ok(String::from_utf8(stdout)?)
        }
    }

    /// Execute a shell command line (`sh -c <line>`) and return everything it printed, STDOUT
    /// followed by STDERR. The exit code is **not** checked. A non-zero exit code is only logged.
    ///
    /// The only error returned is when the shell itself cannot be spawned.
    pub async fn execute_shell(&self, line: impl AsRef<str>) -> Result<String, NetnsError> {
        let line = line.as_ref();
        log::trace!("[{}] `{}`", self.name(), line);
        let output = match self
            .command(&CONFIG.tools.shell)
            .arg("-c")
            .arg(line)
            .output()
            .await
        {
            Ok(out) => out,
            Err(e) => {
                log::error!("[{}] {} failed: {}", self.name(), line, e);
                Err(e)?
            }
        };
        if !output.status.success() {
            log::warn!(
                "[{}] `{}` exited with exit code {}",
                self.name(),
                line,
                output.status.code().unwrap_or_default()
            );
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

/// Check the output for successful exit code
pub fn check_output<F, S>(
    name: &str,
    output: Output,
    cmd: F,
) -> Result<(Vec<u8>, Vec<u8>), NetnsError>
where
    F: FnOnce() -> S,
    S: std::fmt::Display,
{
    if output.status.success() {
        Ok((output.stdout, output.stderr))
    } else {
        let cmd = cmd().to_string();
        log::error!(
            "[{}] {} exited with exit code {}{}{}",
            name,
            cmd,
            output.status.code().unwrap_or_default(),
            if !output.stdout.is_empty() {
                format!("\nSTDOUT:\n{}", String::from_utf8_lossy(&output.stdout))
            } else {
                String::new()
            },
            if !output.stderr.is_empty() {
                format!("\nSTDERR:\n{}", String::from_utf8_lossy(&output.stderr))
            } else {
                String::new()
            }
        );
        Err(NetnsError::CommandError(
            name.to_string(),
            cmd,
            output.status.code().unwrap_or_default(),
        ))
    }
}

/// Error kind returned by [`NetnsSession`].
#[derive(Debug, Error)]
pub enum NetnsError {
    /// Error while preparing the namespace
    #[error("Error while preparing the namespace: {0}")]
    Setup(std::io::Error),
    /// Timeout while waiting for the namespace
    #[error("Timeout while waiting for the namespace.")]
    Timeout,
    /// Error while spawning a process
    #[error("Process error: {0}")]
    Client(#[from] std::io::Error),
    /// Tried to execute a command without a program
    #[error("Cannot execute an empty command")]
    EmptyCommand,
    /// Error while executing a command.
    #[error("Non-zero exit code of command {1} on {0}: {2}")]
    CommandError(String, String, i32),
    /// Cannot parse output as utf8
    #[error("Cannot parse output as UTF-8: {0}")]
    FromUtf8(#[from] FromUtf8Error),
}
