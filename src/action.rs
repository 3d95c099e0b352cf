// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Named actions.
//!
//! A server section may list shell snippets under `actions`, e.g., clearing
//! a cache or restarting a worker. They run verbatim in the remote shell,
//! under the same dry-run rules as every other remote command.

use crate::{
    config::Server,
    remote::{CommandResult, ExecError, RemoteCommand, RemoteExecutor, Transport},
};

use tracing::{info, instrument};

/// Named actions of a server in sorted order.
pub fn list(server: &Server) -> Vec<(&str, &str)> {
    server
        .actions
        .iter()
        .flatten()
        .map(|(name, script)| (name.as_str(), script.as_str()))
        .collect()
}

/// Command running action `name` of `server`.
///
/// # Errors
///
/// - Return [`ActionError::Unknown`] if the server has no such action.
pub fn command(server: &Server, name: &str) -> Result<RemoteCommand> {
    server
        .actions
        .as_ref()
        .and_then(|actions| actions.get(name))
        .map(|script| RemoteCommand::raw(script.as_str()))
        .ok_or_else(|| ActionError::Unknown {
            name: name.to_string(),
            available: list(server)
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Run action `name` of `server`.
///
/// # Errors
///
/// - Return [`ActionError::Unknown`] if the server has no such action.
/// - Return [`ActionError::Exec`] if the action cannot be run or fails.
#[instrument(skip(executor, server), level = "debug")]
pub fn run<T>(
    executor: &RemoteExecutor<T>,
    server: &Server,
    name: &str,
    dry_run: bool,
) -> Result<CommandResult>
where
    T: Transport,
{
    let command = command(server, name)?;
    let result = executor.execute_checked(&command, dry_run)?;
    info!("action {name} finished");

    Ok(result)
}

/// Named action error types.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// No action with that name.
    #[error("action {name:?} does not exist, available actions: {available}")]
    Unknown { name: String, available: String },

    /// Action failed.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = ActionError> = std::result::Result<T, E>;
