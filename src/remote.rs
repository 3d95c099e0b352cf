// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote command execution.
//!
//! Every command relink runs on a server goes through [`RemoteExecutor`].
//! The executor shows the operator the exact command line before it runs,
//! honors dry-run mode, and hands back whatever the command produced.
//!
//! # Dry Runs
//!
//! Dry-run mode is the default for every command that changes a server. In
//! dry-run mode the command is displayed but never sent, and an empty
//! successful result comes back. Read-only queries, e.g., reading the remote
//! clock or listing releases, are issued with `dry_run` unset so a dry run
//! still reflects real remote state.
//!
//! # No Retries
//!
//! Remote operations like `mkdir`, a symlink rename, or a database load are
//! not idempotent. The executor never retries, and it never decides whether
//! a non-zero exit is fatal. Callers do that through
//! [`CommandResult::into_success`].

pub mod command;
pub mod transport;

pub use command::RemoteCommand;
pub use transport::{LocalTransport, SshTransport, Transport};

use crate::ui;

use tracing::{debug, instrument};

/// Captured outcome of a command that ran to completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Standard output of the command.
    pub stdout: String,

    /// Standard error of the command, never swallowed.
    pub stderr: String,

    /// Exit code, or -1 when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandResult {
    /// Check whether command exited with zero.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Treat non-zero exit as an error.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Failed`] carrying the command and its standard
    ///   error verbatim if the exit code is not zero.
    pub fn into_success(self, command: &RemoteCommand) -> Result<Self> {
        if !self.is_success() {
            return Err(ExecError::Failed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr,
            });
        }

        Ok(self)
    }

    /// Standard output with the trailing newline chomped.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim_end_matches(['\r', '\n'])
    }
}

/// Run commands on one host through a transport.
#[derive(Debug)]
pub struct RemoteExecutor<T>
where
    T: Transport,
{
    transport: T,
    echo: bool,
}

impl<T> RemoteExecutor<T>
where
    T: Transport,
{
    /// Construct new executor over transport.
    ///
    /// Command echo is on by default.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            echo: true,
        }
    }

    /// Turn command echo on or off.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Access underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute command on host.
    ///
    /// Displays the full command line first unless echo is off. In dry-run
    /// mode nothing is sent and an empty successful result is returned.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the local process carrying the
    ///   command cannot be started.
    #[instrument(skip(self, command), fields(program = command.program()), level = "debug")]
    pub fn execute(&self, command: &RemoteCommand, dry_run: bool) -> Result<CommandResult> {
        if self.echo {
            ui::display_command(&self.transport.render(command));
        }

        if dry_run {
            debug!("dry run, not sending {:?}", command.program());
            return Ok(CommandResult::default());
        }

        let result = self
            .transport
            .run(command)
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;
        debug!("exit code {}", result.exit_code);

        Ok(result)
    }

    /// Execute command and require zero exit.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the command cannot be started.
    /// - Return [`ExecError::Failed`] if the command exits non-zero.
    pub fn execute_checked(&self, command: &RemoteCommand, dry_run: bool) -> Result<CommandResult> {
        self.execute(command, dry_run)?.into_success(command)
    }
}

/// Remote execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Local process carrying the command could not be started.
    #[error("failed to run {command:?}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command ran but exited non-zero.
    #[error("command {command:?} failed with exit code {exit_code}:\n{stderr}")]
    Failed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;
