// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Transports that carry remote commands to a host.
//!
//! A transport knows how to turn a [`RemoteCommand`] into a local process
//! invocation. [`SshTransport`] runs the command on a server through the
//! `ssh` binary. [`LocalTransport`] runs it through `sh -c` on this machine,
//! which covers servers that live on the same host as the operator.

use crate::{
    config::SshTarget,
    remote::{command::shell_quote, CommandResult, RemoteCommand},
};

use std::{ffi::OsStr, io, process::Command};
use tracing::{debug, instrument};

/// Seconds to wait for the initial SSH handshake.
pub const CONNECT_TIMEOUT: u32 = 10;

/// Carry remote commands to a host.
pub trait Transport {
    /// Run command to completion and capture its output.
    ///
    /// A command that ran but exited non-zero is still `Ok`. Only failure to
    /// spawn the local process is an error.
    fn run(&self, command: &RemoteCommand) -> io::Result<CommandResult>;

    /// Render full local command line for display, with secrets masked.
    fn render(&self, command: &RemoteCommand) -> String;
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn run(&self, command: &RemoteCommand) -> io::Result<CommandResult> {
        (**self).run(command)
    }

    fn render(&self, command: &RemoteCommand) -> String {
        (**self).render(command)
    }
}

/// Transport through the OpenSSH client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTransport {
    target: SshTarget,
}

impl SshTransport {
    /// Construct new SSH transport to target.
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }

    /// Options passed to `ssh` before the destination.
    ///
    /// Shared with rsync's remote shell option so both reach the host the
    /// same way.
    pub fn options(&self) -> Vec<String> {
        let mut options = vec!["-o".to_string(), format!("ConnectTimeout={CONNECT_TIMEOUT}")];
        if let Some(port) = self.target.port {
            options.extend(["-p".to_string(), port.to_string()]);
        }
        if let Some(key) = &self.target.key {
            options.extend(["-i".to_string(), key.to_string_lossy().into_owned()]);
        }

        options
    }

    /// Complete argument vector for `ssh` running `script` on the target.
    pub fn argv(&self, script: impl Into<String>) -> Vec<String> {
        let mut argv = self.options();
        argv.push(self.target.destination());
        argv.push(script.into());
        argv
    }
}

impl Transport for SshTransport {
    #[instrument(skip(self, command), level = "debug")]
    fn run(&self, command: &RemoteCommand) -> io::Result<CommandResult> {
        debug!("ssh to {}", self.target.destination());
        syscall("ssh", self.argv(command.to_shell()))
    }

    fn render(&self, command: &RemoteCommand) -> String {
        let mut line = vec!["ssh".to_string()];
        line.extend(self.options().iter().map(|option| shell_quote(option)));
        line.push(shell_quote(&self.target.destination()));
        line.push(shell_quote(&command.to_string()));
        line.join(" ")
    }
}

/// Transport through a local POSIX shell.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LocalTransport;

impl LocalTransport {
    /// Construct new local transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for LocalTransport {
    #[instrument(skip(self, command), level = "debug")]
    fn run(&self, command: &RemoteCommand) -> io::Result<CommandResult> {
        syscall("sh", ["-c".to_string(), command.to_shell()])
    }

    fn render(&self, command: &RemoteCommand) -> String {
        format!("sh -c {}", shell_quote(&command.to_string()))
    }
}

fn syscall(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> io::Result<CommandResult> {
    let output = Command::new(cmd.as_ref()).args(args).output()?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    // INVARIANT: Processes killed by a signal have no exit code, report -1.
    Ok(CommandResult {
        stdout,
        stderr,
        exit_code: output.status.code().unwrap_or(-1),
    })
}
