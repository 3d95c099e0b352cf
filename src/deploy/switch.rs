// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Atomic live link switching.
//!
//! The live link is repointed in two steps. First a new symlink to the
//! chosen release is created next to the live link under a random name.
//! Then that symlink is renamed over the live link with `mv -T`, which is a
//! single `rename(2)` call. Clients traversing the live link see either the
//! old release or the new one, never a missing or dangling link.
//!
//! `ln -sfn` is not used. It unlinks the old link before creating the new
//! one, leaving a window where the live path does not exist.

use crate::{
    config::RemotePath,
    deploy::{DeployTarget, PreconditionError, Release},
    remote::{ExecError, RemoteCommand, RemoteExecutor, Transport},
};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Repoint the live link of one deploy target.
#[derive(Debug)]
pub struct SymlinkSwitcher<'a, T>
where
    T: Transport,
{
    executor: &'a RemoteExecutor<T>,
    target: &'a DeployTarget,
}

impl<'a, T> SymlinkSwitcher<'a, T>
where
    T: Transport,
{
    /// Construct new symlink switcher.
    pub fn new(executor: &'a RemoteExecutor<T>, target: &'a DeployTarget) -> Self {
        Self { executor, target }
    }

    /// Atomically point live link at `release`.
    ///
    /// # Errors
    ///
    /// - Return [`SwitchError::Precondition`] if the live path is not a
    ///   symlink. Nothing is changed in that case.
    /// - Return [`SwitchError::Exec`] if staging or renaming fails.
    /// - Return [`SwitchError::Unverified`] if the live link does not point
    ///   at `release` afterwards.
    #[instrument(skip(self, release), fields(release = %release.name), level = "debug")]
    pub fn switch_to(&self, release: &Release, dry_run: bool) -> Result<Release> {
        self.prepare(release, dry_run)?.commit()
    }

    /// Stage temporary link to `release` next to the live link.
    ///
    /// The live link is left alone until [`StagedLink::commit`].
    ///
    /// # Errors
    ///
    /// - Return [`SwitchError::Precondition`] if the live path is not a
    ///   symlink.
    /// - Return [`SwitchError::Exec`] if the temporary link cannot be made.
    pub fn prepare(&self, release: &Release, dry_run: bool) -> Result<StagedLink<'a, T>> {
        let test = RemoteCommand::new("test")
            .arg("-L")
            .arg(self.target.live_link.as_str());
        if !self.executor.execute(&test, false)?.is_success() {
            return Err(PreconditionError::NotASymlink {
                path: self.target.live_link.clone(),
            }
            .into());
        }

        self.stage(release, dry_run)
    }

    /// Stage temporary link for a live path that is not a link yet.
    ///
    /// Used when deploys are first set up and the live path is gone.
    ///
    /// # Errors
    ///
    /// - Return [`SwitchError::Exec`] if the temporary link cannot be made.
    pub fn prepare_fresh(&self, release: &Release, dry_run: bool) -> Result<StagedLink<'a, T>> {
        self.stage(release, dry_run)
    }

    fn stage(&self, release: &Release, dry_run: bool) -> Result<StagedLink<'a, T>> {
        let temp = self.temporary_path();
        let link = RemoteCommand::new("ln")
            .arg("-s")
            .arg(release.path.as_str())
            .arg(temp.as_str())
            .with_sudo(self.target.sudo);
        self.executor.execute_checked(&link, dry_run)?;
        debug!("staged {temp} -> {}", release.path);

        Ok(StagedLink {
            executor: self.executor,
            target: self.target,
            release: release.clone(),
            temp,
            dry_run,
        })
    }

    fn temporary_path(&self) -> RemotePath {
        let parent = self
            .target
            .live_link
            .parent()
            .unwrap_or_else(|| RemotePath::new("/"));
        parent.join(format!(
            ".{}.relink-{}",
            self.target.base_name(),
            Uuid::new_v4().simple()
        ))
    }
}

/// Temporary link waiting to replace the live link.
#[derive(Debug)]
pub struct StagedLink<'a, T>
where
    T: Transport,
{
    executor: &'a RemoteExecutor<T>,
    target: &'a DeployTarget,
    release: Release,
    temp: RemotePath,
    dry_run: bool,
}

impl<'a, T> StagedLink<'a, T>
where
    T: Transport,
{
    /// Path of the temporary link.
    pub fn temp_path(&self) -> &RemotePath {
        &self.temp
    }

    /// Rename temporary link over the live link.
    ///
    /// On failure the temporary link is removed and the live link is left as
    /// it was.
    ///
    /// # Errors
    ///
    /// - Return [`SwitchError::Exec`] if the rename fails.
    /// - Return [`SwitchError::Unverified`] if the live link does not point
    ///   at the release afterwards.
    #[instrument(skip(self), fields(release = %self.release.name), level = "debug")]
    pub fn commit(self) -> Result<Release> {
        let rename = RemoteCommand::new("mv")
            .arg("-T")
            .arg(self.temp.as_str())
            .arg(self.target.live_link.as_str())
            .with_sudo(self.target.sudo);
        if let Err(error) = self.executor.execute_checked(&rename, self.dry_run) {
            self.discard();
            return Err(error.into());
        }

        if !self.dry_run {
            let readlink = RemoteCommand::new("readlink").arg(self.target.live_link.as_str());
            let found = self.executor.execute_checked(&readlink, false)?;
            if found.trimmed_stdout() != self.release.path.as_str() {
                return Err(SwitchError::Unverified {
                    expected: self.release.path.clone(),
                    found: found.trimmed_stdout().to_string(),
                });
            }
        }
        info!("{} now points at {}", self.target.live_link, self.release.name);

        Ok(self.release)
    }

    /// Remove temporary link without touching the live link.
    pub fn discard(&self) {
        let remove = RemoteCommand::new("rm")
            .arg("-f")
            .arg(self.temp.as_str())
            .with_sudo(self.target.sudo);
        match self.executor.execute_checked(&remove, self.dry_run) {
            Ok(_) => debug!("removed {}", self.temp),
            Err(error) => warn!("failed to remove temporary link {}: {error}", self.temp),
        }
    }
}

/// One line of the release menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    /// Letter typed by the operator to pick this release.
    pub letter: String,

    /// Release behind the letter.
    pub release: Release,

    /// Whether the live link points at this release.
    pub current: bool,
}

/// Lettered listing of releases, oldest first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseMenu {
    entries: Vec<MenuEntry>,
}

impl ReleaseMenu {
    /// Construct new menu over sorted releases.
    pub fn new(releases: &[Release], current: Option<&Release>) -> Self {
        let entries = releases
            .iter()
            .enumerate()
            .map(|(index, release)| MenuEntry {
                letter: menu_letter(index),
                release: release.clone(),
                current: current.is_some_and(|current| current.name == release.name),
            })
            .collect();

        Self { entries }
    }

    /// Menu lines in display order.
    pub fn entries(&self) -> &[MenuEntry] {
        self.entries.as_slice()
    }

    /// Map letter typed by the operator to its release.
    ///
    /// # Errors
    ///
    /// - Return [`SelectionError::InvalidChoice`] if no entry has that
    ///   letter.
    pub fn resolve(&self, letter: &str) -> Result<&Release, SelectionError> {
        let letter = letter.trim().to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.letter == letter)
            .map(|entry| &entry.release)
            .ok_or(SelectionError::InvalidChoice { choice: letter })
    }

    /// Find release by exact name.
    ///
    /// # Errors
    ///
    /// - Return [`SelectionError::UnknownRelease`] if no entry has that name.
    pub fn by_name(&self, name: &str) -> Result<&Release, SelectionError> {
        self.entries
            .iter()
            .find(|entry| entry.release.name == name)
            .map(|entry| &entry.release)
            .ok_or_else(|| SelectionError::UnknownRelease {
                name: name.to_string(),
            })
    }
}

/// Menu letter for zero-based `index`: `a` to `z`, then `aa`, `ab`, and so on.
pub fn menu_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }

    letters.iter().rev().collect()
}

/// Release selection error types.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// Letter matches no menu entry.
    #[error("invalid choice {choice:?}")]
    InvalidChoice { choice: String },

    /// Name matches no release.
    #[error("release {name:?} does not exist")]
    UnknownRelease { name: String },
}

/// Symlink switch error types.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// Live path is not in a state that can be switched.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Live link does not point at the release after the rename.
    #[error("live link points at {found:?} instead of {expected:?}")]
    Unverified { expected: RemotePath, found: String },

    /// Remote command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = SwitchError> = std::result::Result<T, E>;
