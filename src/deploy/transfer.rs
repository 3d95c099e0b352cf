// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release transfer.
//!
//! Publishing a release creates a fresh directory under the deploy root and
//! fills it from the local project root. When a previous release exists it
//! is handed to rsync as a link reference, so every file that did not change
//! since that release becomes a hard link instead of a copy. Keeping many
//! releases around thus costs disk space in proportion to what changed, not
//! to the size of the project.
//!
//! # Partial Releases
//!
//! A failed transfer leaves its half-filled release directory in place. It
//! is never linked to, and the operator can inspect or remove it by hand.

use crate::{
    config::{RemotePath, SshTarget},
    deploy::{exclude::ExcludeList, namer::NameError, DeployTarget, Release},
    remote::{
        command::shell_quote, ExecError, RemoteCommand, RemoteExecutor, SshTransport, Transport,
    },
    ui,
};

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info, instrument};

/// Everything a file transfer needs to fill one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Local directory whose contents are sent.
    pub source: PathBuf,

    /// Release directory receiving the contents.
    pub destination: RemotePath,

    /// Previous release to hard-link unchanged files against.
    pub reference: Option<RemotePath>,

    /// Patterns left out of the transfer.
    pub excludes: ExcludeList,

    /// Whether the source is a whole directory.
    ///
    /// Exclusions only apply to whole directory transfers.
    pub whole_directory: bool,
}

/// Move local files into a release directory.
pub trait FileTransfer {
    /// Sync plan source into plan destination.
    ///
    /// In dry-run mode the transfer is previewed without changing any file.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError`] if the transfer cannot start or fails.
    fn sync(&self, plan: &TransferPlan, dry_run: bool) -> Result<()>;
}

/// Where rsync sends files to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsyncTarget {
    /// Destination is on this machine.
    Local,

    /// Destination is reached through SSH.
    Remote(SshTarget),
}

/// File transfer through the rsync binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rsync {
    binary: String,
    target: RsyncTarget,
    echo: bool,
    quiet: bool,
}

impl Rsync {
    /// Construct new rsync transfer.
    ///
    /// Falls back to `rsync` from `PATH` when no binary is given.
    pub fn new(binary: Option<String>, target: RsyncTarget) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| "rsync".into()),
            target,
            echo: true,
            quiet: false,
        }
    }

    /// Turn command echo on or off.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Hide the itemized listing of changed files.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Build complete argument vector for a plan.
    ///
    /// Dry runs get `--dry-run`, so rsync lists what would change against
    /// the reference release without writing anything.
    pub fn arguments(&self, plan: &TransferPlan, dry_run: bool) -> Vec<String> {
        let mut args = [
            "--recursive",
            "--links",
            "--perms",
            "--times",
            "--compress",
            "--checksum",
        ]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

        if !self.quiet {
            args.push("--itemize-changes".into());
        }

        if dry_run {
            args.push("--dry-run".into());
        }

        if let Some(reference) = &plan.reference {
            args.push(format!("--link-dest={reference}"));
        }

        if plan.whole_directory {
            args.extend(plan.excludes.iter().map(|pattern| format!("--exclude={pattern}")));
        }

        let destination = format!("{}/", plan.destination.as_str().trim_end_matches('/'));
        match &self.target {
            RsyncTarget::Local => {
                args.push(source_arg(&plan.source, plan.whole_directory));
                args.push(destination);
            }
            RsyncTarget::Remote(ssh) => {
                let rsh = std::iter::once("ssh".to_string())
                    .chain(SshTransport::new(ssh.clone()).options())
                    .map(|option| shell_quote(&option))
                    .collect::<Vec<_>>()
                    .join(" ");
                args.push(format!("--rsh={rsh}"));
                args.push(source_arg(&plan.source, plan.whole_directory));
                args.push(format!("{}:{destination}", ssh.destination()));
            }
        }

        args
    }
}

impl FileTransfer for Rsync {
    #[instrument(skip(self, plan), level = "debug")]
    fn sync(&self, plan: &TransferPlan, dry_run: bool) -> Result<()> {
        let args = self.arguments(plan, dry_run);
        if self.echo {
            let line = std::iter::once(self.binary.as_str())
                .chain(args.iter().map(String::as_str))
                .map(shell_quote)
                .collect::<Vec<_>>()
                .join(" ");
            ui::display_command(&line);
        }

        if dry_run {
            debug!("dry run, previewing sync into {}", plan.destination);
        }

        // INVARIANT: Itemized changes stream to the operator, errors are kept.
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| TransferError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TransferError::Failed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
            });
        }

        Ok(())
    }
}

fn source_arg(source: &Path, whole_directory: bool) -> String {
    let source = source.to_string_lossy();
    if whole_directory {
        format!("{}/", source.trim_end_matches('/'))
    } else {
        source.into_owned()
    }
}

/// Create and fill release directories for one deploy target.
#[derive(Debug)]
pub struct TransferEngine<'a, T, F>
where
    T: Transport,
    F: FileTransfer,
{
    executor: &'a RemoteExecutor<T>,
    transfer: &'a F,
    target: &'a DeployTarget,
}

impl<'a, T, F> TransferEngine<'a, T, F>
where
    T: Transport,
    F: FileTransfer,
{
    /// Construct new transfer engine.
    pub fn new(executor: &'a RemoteExecutor<T>, transfer: &'a F, target: &'a DeployTarget) -> Self {
        Self {
            executor,
            transfer,
            target,
        }
    }

    /// Publish local root as a new release.
    ///
    /// Creates the release directory, hands it to the owner group when one
    /// is configured, then syncs the local root into it with `reference` as
    /// hard-link base.
    ///
    /// # Errors
    ///
    /// - Return [`TransferError::Name`] if `release_name` is not a release
    ///   name of this target.
    /// - Return [`TransferError::Exec`] if the directory already exists, or
    ///   if it cannot be created or handed over to the owner group.
    /// - Return [`TransferError::Spawn`] or [`TransferError::Failed`] if the
    ///   sync fails. The partial release directory is left in place.
    #[instrument(skip(self, local_root, reference, excludes), level = "debug")]
    pub fn publish(
        &self,
        local_root: impl AsRef<Path>,
        release_name: &str,
        reference: Option<&Release>,
        excludes: &ExcludeList,
        dry_run: bool,
    ) -> Result<Release> {
        let release = Release::from_name(self.target, release_name)?;

        // INVARIANT: No `-p`, an existing release must never be reused.
        let mkdir = RemoteCommand::new("mkdir").arg(release.path.as_str());
        self.executor.execute_checked(&mkdir, dry_run)?;

        if let Some(group) = &self.target.owner_group {
            let chown = RemoteCommand::new("chown")
                .arg(format!(":{group}"))
                .arg(release.path.as_str())
                .with_sudo(self.target.sudo);
            self.executor.execute_checked(&chown, dry_run)?;
        }

        match reference {
            Some(reference) => info!("link unchanged files against {}", reference.name),
            None => info!("no previous release, sending every file"),
        }

        let plan = TransferPlan {
            source: local_root.as_ref().to_path_buf(),
            destination: release.path.clone(),
            reference: reference.map(|reference| reference.path.clone()),
            excludes: excludes.clone(),
            whole_directory: true,
        };
        self.transfer.sync(&plan, dry_run)?;
        info!("published release {}", release.name);

        Ok(release)
    }
}

/// Transfer error types.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Transfer binary could not be started.
    #[error("failed to run {binary:?}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Transfer ran but failed.
    #[error("transfer failed with exit code {exit_code}:\n{stderr}")]
    Failed { exit_code: i32, stderr: String },

    /// Release directory could not be prepared.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Release name does not belong to the target.
    #[error(transparent)]
    Name(#[from] NameError),
}

/// Friendly result alias :3
pub type Result<T, E = TransferError> = std::result::Result<T, E>;
