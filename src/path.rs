// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the project file of the current project lives.

use crate::config::CONFIG_FILE_NAME;

use std::path::{Path, PathBuf};
use tracing::debug;

/// Find project file by walking up from `start` to the filesystem root.
///
/// Returns the first `relink.yaml` found in `start` or any of its ancestors.
///
/// # Errors
///
/// - Return [`NotInProject`] if no ancestor holds a project file.
pub fn find_config_file(start: impl AsRef<Path>) -> Result<PathBuf> {
    for dir in start.as_ref().ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!("found project file {:?}", candidate.display());
            return Ok(candidate);
        }
    }

    Err(NotInProject {
        start: start.as_ref().to_path_buf(),
    })
}

/// Find project file starting from the current working directory.
///
/// # Errors
///
/// - Return [`NotInProject`] if the current directory cannot be determined,
///   or if no ancestor holds a project file.
pub fn find_config_file_from_cwd() -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|_| NotInProject {
        start: PathBuf::from("."),
    })?;
    find_config_file(cwd)
}

/// No project file in this directory or any directory above it.
#[derive(Clone, Debug, thiserror::Error)]
#[error(
    "you are not in a project, {} was not found in {:?} or any directory above",
    CONFIG_FILE_NAME,
    start.display()
)]
pub struct NotInProject {
    pub start: PathBuf,
}

/// Friendly result alias :3
pub type Result<T, E = NotInProject> = std::result::Result<T, E>;
