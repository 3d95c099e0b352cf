// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Operator-facing terminal output and prompts.

use crate::deploy::{switch::ReleaseMenu, Operator};

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, Text};
use std::time::Duration;
use tracing::{instrument, warn};

/// Marker shown next to the release the live link points at.
pub const CURRENT_MARKER: &str = "▶";

/// Show command line that is about to run.
pub fn display_command(line: &str) {
    eprintln!("{}", format!("+ {line}").yellow().dimmed());
}

/// Show final banner of a command.
pub fn display_success(real: bool) {
    if real {
        println!("{}", " Success ".black().on_green());
    } else {
        println!("{}", " Success (DRY RUN) ".white().on_blue());
    }
}

/// Show lettered release menu.
pub fn display_menu(menu: &ReleaseMenu) {
    println!();
    println!(
        "Select a letter to change the symlink to. The {} indicates",
        CURRENT_MARKER.green().bold()
    );
    println!("the release the symlink currently points to.");
    println!();
    display_releases(menu);
    println!();
}

/// Show releases oldest first, marking the one the live link points at.
pub fn display_releases(menu: &ReleaseMenu) {
    for entry in menu.entries() {
        let marker = if entry.current {
            CURRENT_MARKER.red().bold().to_string()
        } else {
            " ".repeat(CURRENT_MARKER.chars().count())
        };
        println!(
            "{marker} {} {} {}",
            format!("{})", entry.letter).green().bold(),
            entry.release.path.as_str().bold(),
            format!("({})", entry.release.created_at.pretty()).green().dimmed(),
        );
    }
}

/// Spinner for long blocking remote work.
///
/// Purely cosmetic. Hidden automatically when stderr is not a terminal.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    match ProgressStyle::with_template("{spinner:.yellow} {msg}") {
        Ok(style) => bar.set_style(style),
        Err(error) => warn!("spinner template rejected: {error}"),
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Operator answering through terminal prompts.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireOperator;

impl InquireOperator {
    /// Construct new terminal operator.
    pub fn new() -> Self {
        Self
    }
}

impl Operator for InquireOperator {
    #[instrument(skip(self, menu), level = "debug")]
    fn choose(&self, menu: &ReleaseMenu) -> Result<String, PromptError> {
        display_menu(menu);
        let answer = Text::new("Select a release to link to (ctrl-c to abort)").prompt()?;
        Ok(answer.trim().to_string())
    }

    #[instrument(skip(self), level = "debug")]
    fn confirm(&self, message: &str) -> Result<bool, PromptError> {
        let prompt = format!("{} {message}", " WARNING ".red().on_yellow().bold());
        Ok(Confirm::new(&prompt).with_default(false).prompt()?)
    }
}

/// Prompt error types.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Terminal prompt failed or was interrupted.
    #[error(transparent)]
    Inquire(#[from] inquire::InquireError),
}
