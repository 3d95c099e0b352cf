// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote command construction.
//!
//! Commands sent to a server are built from explicit argument lists instead
//! of formatted strings. Each argument is quoted exactly once, at render
//! time, so values carrying spaces, quotes, or glob characters reach the
//! remote shell intact.
//!
//! # Pipelines
//!
//! A POSIX pipeline exits with the status of its last stage, so a failing
//! `mysqldump | gzip` would look like a success. Commands with more than one
//! stage are therefore wrapped in `bash -o pipefail -c`, making the whole
//! command fail when any stage fails. Hosts running such commands need bash.

use std::fmt::{Display, Formatter, Result as FmtResult};

const MASK: &str = "****";

/// Command to run through a remote shell.
///
/// A command is a pipeline of one or more stages with optional input and
/// output redirection. Most commands are a single stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    stages: Vec<Stage>,
    stdin: Option<String>,
    stdout: Option<String>,
    sudo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
    Argv(Vec<Arg>),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Plain(String),
    Secret { prefix: String, value: String },
}

impl RemoteCommand {
    /// Construct new single stage command running `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            stages: vec![Stage::Argv(vec![Arg::Plain(program.into())])],
            ..Default::default()
        }
    }

    /// Construct command from a user-authored shell snippet.
    ///
    /// The snippet is sent verbatim. Only use this for text the operator
    /// wrote themselves, e.g., named actions from the configuration file.
    pub fn raw(script: impl Into<String>) -> Self {
        Self {
            stages: vec![Stage::Raw(script.into())],
            ..Default::default()
        }
    }

    /// Append argument to the last stage.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.push(Arg::Plain(arg.into()));
        self
    }

    /// Append listing of arguments to the last stage.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for arg in args {
            self.push(Arg::Plain(arg.into()));
        }
        self
    }

    /// Append argument whose value must not be shown to the operator.
    ///
    /// Rendered for execution as `prefix` + `value`, but displayed as
    /// `prefix` followed by a mask.
    pub fn secret_arg(mut self, prefix: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Arg::Secret {
            prefix: prefix.into(),
            value: value.into(),
        });
        self
    }

    /// Pipe standard output of this command into `next`.
    pub fn pipe(mut self, next: RemoteCommand) -> Self {
        self.stages.extend(next.stages);
        self
    }

    /// Redirect standard input of the first stage from a remote file.
    pub fn stdin_from(mut self, path: impl Into<String>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Redirect standard output of the last stage into a remote file.
    pub fn stdout_to(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Run every stage through `sudo` when `enabled` is set.
    pub fn with_sudo(mut self, enabled: bool) -> Self {
        self.sudo = enabled;
        self
    }

    /// Name of the program of the first stage.
    pub fn program(&self) -> &str {
        match self.stages.first() {
            Some(Stage::Argv(args)) => match args.first() {
                Some(Arg::Plain(program)) => program.as_str(),
                _ => "",
            },
            Some(Stage::Raw(script)) => script.split_whitespace().next().unwrap_or_default(),
            None => "",
        }
    }

    /// Render command as a shell script for execution.
    pub fn to_shell(&self) -> String {
        self.render(false)
    }

    fn push(&mut self, arg: Arg) {
        // INVARIANT: Arguments always attach to the last stage.
        match self.stages.last_mut() {
            Some(Stage::Argv(args)) => args.push(arg),
            Some(Stage::Raw(script)) => {
                script.push(' ');
                script.push_str(&arg.render(false));
            }
            None => self.stages.push(Stage::Argv(vec![arg])),
        }
    }

    fn render(&self, masked: bool) -> String {
        let script = self.render_stages(masked);
        if self.stages.len() > 1 {
            return format!("bash -o pipefail -c {}", shell_quote(&script));
        }

        script
    }

    fn render_stages(&self, masked: bool) -> String {
        let mut stages = Vec::with_capacity(self.stages.len());
        for (index, stage) in self.stages.iter().enumerate() {
            let mut out = match stage {
                Stage::Raw(script) => script.clone(),
                Stage::Argv(args) => args
                    .iter()
                    .map(|arg| arg.render(masked))
                    .collect::<Vec<_>>()
                    .join(" "),
            };

            if self.sudo && matches!(stage, Stage::Argv(_)) {
                out = format!("sudo {out}");
            }

            if index == 0 {
                if let Some(stdin) = &self.stdin {
                    out.push_str(&format!(" < {}", shell_quote(stdin)));
                }
            }

            stages.push(out);
        }

        let mut script = stages.join(" | ");
        if let Some(stdout) = &self.stdout {
            script.push_str(&format!(" > {}", shell_quote(stdout)));
        }

        script
    }
}

impl Arg {
    fn render(&self, masked: bool) -> String {
        match self {
            Self::Plain(value) => shell_quote(value),
            Self::Secret { prefix, .. } if masked => format!("{}{MASK}", shell_quote(prefix)),
            Self::Secret { prefix, value } => shell_quote(&format!("{prefix}{value}")),
        }
    }
}

/// Operator-facing rendering with secrets masked.
impl Display for RemoteCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.render(true).as_str())
    }
}

/// Quote string for a POSIX shell.
///
/// Strings made only of characters that the shell never interprets are left
/// as is. Everything else is wrapped in single quotes, with embedded single
/// quotes spelled as `'\''`.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty() && value.chars().all(is_shell_safe) {
        return value.to_string();
    }

    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '@' | '%' | '+' | '=' | ',')
}
