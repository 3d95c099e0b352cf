// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release-based deploys over SSH.
//!
//! Relink publishes a local project tree to a server as immutable,
//! timestamped __release__ directories, and serves one of them through a
//! symlink that is switched atomically. Rolling back means switching the
//! symlink to an older release.
//!
//! Servers are described in a per-project `relink.yaml` file, see
//! [`config`]. Every command that changes a server is a dry run unless asked
//! to be real, and every remote command is shown before it runs, see
//! [`remote`].
//!
//! # See Also
//!
//! 1. [`deploy`]
//! 2. [`database`]
//! 3. [`action`]

pub mod action;
pub mod config;
pub mod database;
pub mod deploy;
pub mod path;
pub mod remote;
pub mod ui;
