// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release discovery.
//!
//! Releases are not recorded anywhere but on the host itself. The registry
//! lists the release directories under the deploy root, and reads the live
//! link to learn which one is active. Both queries are read-only, so they
//! always run, even in dry-run mode.

use crate::{
    config::RemotePath,
    deploy::{DeployTarget, Release},
    remote::{ExecError, RemoteCommand, RemoteExecutor, Transport},
};

use glob::Pattern;
use tracing::{debug, instrument};

/// Read releases of one deploy target.
#[derive(Debug)]
pub struct ReleaseRegistry<'a, T>
where
    T: Transport,
{
    executor: &'a RemoteExecutor<T>,
    target: &'a DeployTarget,
}

impl<'a, T> ReleaseRegistry<'a, T>
where
    T: Transport,
{
    /// Construct new release registry.
    pub fn new(executor: &'a RemoteExecutor<T>, target: &'a DeployTarget) -> Self {
        Self { executor, target }
    }

    /// List releases under the deploy root, oldest first.
    ///
    /// Directories matching `<base>.*` whose suffix is not a release stamp
    /// are skipped.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::Exec`] if the deploy root cannot be listed.
    #[instrument(skip(self), level = "debug")]
    pub fn list_releases(&self) -> Result<Vec<Release>> {
        // INVARIANT: Bracketed escapes mean the same to `find -name` and glob.
        let name_pattern = format!("{}.*", Pattern::escape(self.target.base_name()));
        let command = RemoteCommand::new("find")
            .arg(self.target.deploy_root.as_str())
            .args(["-mindepth", "1", "-maxdepth", "1", "-type", "d", "-name"])
            .arg(name_pattern.as_str());
        let result = self.executor.execute_checked(&command, false)?;

        let pattern = Pattern::new(&name_pattern)?;
        let mut releases = Vec::new();
        for line in result.stdout.lines() {
            let Some(name) = RemotePath::new(line.trim()).file_name().map(String::from) else {
                continue;
            };

            if !pattern.matches(&name) {
                continue;
            }

            match Release::from_name(self.target, &name) {
                Ok(release) => releases.push(release),
                Err(error) => debug!("skip {name:?}: {error}"),
            }
        }

        // INVARIANT: Lexical order of names is chronological order.
        releases.sort();
        Ok(releases)
    }

    /// Determine release the live link points at.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::LivePointerUnreadable`] if the live link
    ///   cannot be read.
    /// - Return [`RegistryError::UnknownLinkTarget`] if the live link points
    ///   at something that is not a listed release.
    /// - Return [`RegistryError::Exec`] if releases cannot be listed.
    pub fn current_release(&self) -> Result<Release> {
        let releases = self.list_releases()?;
        self.current_in(&releases)
    }

    /// Determine release the live link points at among known `releases`.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::LivePointerUnreadable`] if the live link
    ///   cannot be read.
    /// - Return [`RegistryError::UnknownLinkTarget`] if the live link points
    ///   at none of `releases`.
    #[instrument(skip(self, releases), level = "debug")]
    pub fn current_in(&self, releases: &[Release]) -> Result<Release> {
        let link = self.read_live_link()?;
        let name = link.file_name().unwrap_or_default();
        debug!("live link points at {link}");

        releases
            .iter()
            .find(|release| release.name == name)
            .cloned()
            .ok_or(RegistryError::UnknownLinkTarget { target: link })
    }

    /// Read target of the live link.
    ///
    /// # Errors
    ///
    /// - Return [`RegistryError::LivePointerUnreadable`] if `readlink` fails.
    pub fn read_live_link(&self) -> Result<RemotePath> {
        let command = RemoteCommand::new("readlink").arg(self.target.live_link.as_str());
        let result = self.executor.execute(&command, false)?;
        if !result.is_success() || result.trimmed_stdout().is_empty() {
            return Err(RegistryError::LivePointerUnreadable {
                path: self.target.live_link.clone(),
                stderr: result.stderr,
            });
        }

        Ok(RemotePath::new(result.trimmed_stdout()))
    }
}

/// Newest release whose name sorts before `name`.
///
/// `releases` must be sorted oldest first.
pub fn previous_release<'r>(releases: &'r [Release], name: &str) -> Option<&'r Release> {
    releases.iter().rev().find(|release| release.name.as_str() < name)
}

/// Release registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Live link points at something that is not a release.
    #[error("live link points at {target:?}, which is not a known release")]
    UnknownLinkTarget { target: RemotePath },

    /// Live link could not be read.
    #[error("cannot read live link {path:?}:\n{stderr}")]
    LivePointerUnreadable { path: RemotePath, stderr: String },

    /// Release name pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Remote listing failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
