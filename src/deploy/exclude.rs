// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exclusion patterns for directory transfers.
//!
//! Patterns come from two places: the project section, applying to every
//! server, and the server section. Both listings are merged into one
//! [`ExcludeList`] before a transfer. The list is kept free of duplicates and
//! blank entries, and it always yields its patterns in sorted order so the
//! same configuration produces the same transfer command every time.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Set of exclusion patterns.
///
/// # Invariant
///
/// - No duplicate patterns.
/// - No empty patterns.
/// - Iteration order is sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExcludeList {
    patterns: BTreeSet<String>,
}

impl ExcludeList {
    /// Construct new empty exclusion list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pattern.
    pub fn insert_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !pattern.trim().is_empty() {
            self.patterns.insert(pattern);
        }
    }

    /// Insert a listing of patterns.
    pub fn insert_patterns(&mut self, patterns: impl IntoIterator<Item = impl Into<String>>) {
        for pattern in patterns {
            self.insert_pattern(pattern);
        }
    }

    /// Iterate patterns in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    /// Check whether there is nothing to exclude.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

impl<S> FromIterator<S> for ExcludeList
where
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        list.insert_patterns(iter);
        list
    }
}

impl Display for ExcludeList {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let mut out = String::new();
        for pattern in self.iter() {
            out.push_str(pattern);
            out.push('\n');
        }

        write!(fmt, "{out}")
    }
}
