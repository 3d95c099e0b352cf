// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release naming.
//!
//! A release directory is named `<base>.<YY-MM-DD_HHMMSS_TZ>`, where `base`
//! is the last component of the served path and the stamp comes from the
//! clock of the target host. The fixed-width stamp makes lexical order of
//! names equal to chronological order, which the registry relies on to find
//! the previous release.
//!
//! # Remote Clock Only
//!
//! Stamps are never taken from the local clock. Mixing clocks of machines
//! that drift apart would break the ordering of releases on the host.

use crate::remote::{ExecError, RemoteCommand, RemoteExecutor, Transport};

use chrono::NaiveDateTime;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use tracing::{debug, instrument};

/// `date` format of a release stamp.
pub const CLOCK_FORMAT: &str = "+%y-%m-%d_%H%M%S_%Z";

const STAMP_FORMAT: &str = "%y-%m-%d_%H%M%S";

/// Point in time read from a remote clock.
///
/// The zone abbreviation printed by the host is kept verbatim, because
/// abbreviations like `CEST` cannot be mapped back to an offset reliably.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteTime {
    at: NaiveDateTime,
    zone: String,
}

impl RemoteTime {
    /// Construct new remote time.
    pub fn new(at: NaiveDateTime, zone: impl Into<String>) -> Self {
        Self {
            at,
            zone: zone.into(),
        }
    }

    /// Zone abbreviation of the host.
    pub fn zone(&self) -> &str {
        self.zone.as_str()
    }

    /// Human readable form, e.g., `Jan 01/2024, 12:00PM UTC`.
    pub fn pretty(&self) -> String {
        format!("{} {}", self.at.format("%b %d/%Y, %I:%M%p"), self.zone)
    }
}

impl FromStr for RemoteTime {
    type Err = NameError;

    fn from_str(stamp: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| NameError::InvalidStamp {
            stamp: stamp.to_string(),
            reason: reason.to_string(),
        };

        let (at, zone) = stamp
            .rsplit_once('_')
            .ok_or_else(|| invalid("missing zone"))?;
        if zone.is_empty()
            || !zone
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
        {
            return Err(invalid("bad zone"));
        }

        // INVARIANT: Reject anything chrono would accept that we never print.
        if at.len() != "YY-MM-DD_HHMMSS".len() {
            return Err(invalid("bad width"));
        }
        let at = NaiveDateTime::parse_from_str(at, STAMP_FORMAT)
            .map_err(|error| invalid(&error.to_string()))?;

        Ok(Self::new(at, zone))
    }
}

impl Display for RemoteTime {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}_{}", self.at.format(STAMP_FORMAT), self.zone)
    }
}

/// Command reading the clock of a host in release stamp format.
pub fn clock_command() -> RemoteCommand {
    RemoteCommand::new("date").arg(CLOCK_FORMAT)
}

/// Read clock of the host behind `executor`.
///
/// Always runs, even in dry-run mode, since it changes nothing.
///
/// # Errors
///
/// - Return [`NameError::Exec`] if `date` cannot be run or fails.
/// - Return [`NameError::InvalidStamp`] if the output is not a stamp.
#[instrument(skip(executor), level = "debug")]
pub fn read_remote_clock<T>(executor: &RemoteExecutor<T>) -> Result<RemoteTime>
where
    T: Transport,
{
    let command = clock_command();
    let result = executor.execute_checked(&command, false)?;
    let now = result.trimmed_stdout().trim().parse()?;
    debug!("remote clock reads {now}");

    Ok(now)
}

/// Compute release name for a base name and remote time.
pub fn compute_name(base: &str, remote_now: &RemoteTime) -> String {
    format!("{base}.{remote_now}")
}

/// Split release name into its stamp, given the base name it must carry.
///
/// # Errors
///
/// - Return [`NameError::ForeignRelease`] if `name` is not `<base>.<stamp>`.
/// - Return [`NameError::InvalidStamp`] if the stamp does not parse.
pub fn parse_name(base: &str, name: &str) -> Result<RemoteTime> {
    let stamp = name
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('.'))
        .ok_or_else(|| NameError::ForeignRelease {
            name: name.to_string(),
            base: base.to_string(),
        })?;

    stamp.parse()
}

/// Release naming error types.
#[derive(Debug, thiserror::Error)]
pub enum NameError {
    /// Text is not a release stamp.
    #[error("invalid release stamp {stamp:?}: {reason}")]
    InvalidStamp { stamp: String, reason: String },

    /// Name does not start with the base name of the target.
    #[error("{name:?} is not a release of {base:?}")]
    ForeignRelease { name: String, base: String },

    /// Clock could not be read.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = NameError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::ScriptedTransport;
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn time(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, s))
            .expect("valid date")
    }

    #[test]
    fn parse_and_print_stamp() -> anyhow::Result<()> {
        let stamp: RemoteTime = "24-01-01_120000_UTC".parse()?;
        assert_eq!(stamp, RemoteTime::new(time(2024, 1, 1, 12, 0, 0), "UTC"));
        assert_eq!(stamp.to_string(), "24-01-01_120000_UTC");
        assert_eq!(stamp.pretty(), "Jan 01/2024, 12:00PM UTC");

        let stamp: RemoteTime = "23-11-30_235959_+03".parse()?;
        assert_eq!(stamp.zone(), "+03");

        Ok(())
    }

    #[test_case("24-01-01_120000"; "missing zone")]
    #[test_case("24-01-01_120000_"; "empty zone")]
    #[test_case("24-01-01_1200_UTC"; "short time")]
    #[test_case("24-13-01_120000_UTC"; "bad month")]
    #[test_case("original_UTC"; "not a stamp")]
    #[test_case("24-01-01_120000_U C"; "space in zone")]
    #[test]
    fn reject_bad_stamps(stamp: &str) {
        assert!(stamp.parse::<RemoteTime>().is_err(), "{stamp} parsed");
    }

    #[test]
    fn compute_name_joins_base_and_stamp() {
        let now = RemoteTime::new(time(2024, 1, 1, 13, 0, 0), "UTC");
        assert_eq!(compute_name("site", &now), "site.24-01-01_130000_UTC");
    }

    #[test]
    fn parse_name_checks_base() -> anyhow::Result<()> {
        let now = parse_name("www", "www.24-01-01_130000_UTC")?;
        assert_eq!(now, RemoteTime::new(time(2024, 1, 1, 13, 0, 0), "UTC"));

        let error = parse_name("www", "www2.24-01-01_130000_UTC").unwrap_err();
        assert!(matches!(error, NameError::ForeignRelease { .. }));

        let error = parse_name("www", "www.original").unwrap_err();
        assert!(matches!(error, NameError::InvalidStamp { .. }));

        Ok(())
    }

    #[test]
    fn names_sort_like_remote_time() {
        let start = time(2024, 12, 31, 23, 59, 58);
        let steps = [1, 1, 59, 3_600, 86_400, 31 * 86_400, 365 * 86_400];

        let mut at = start;
        let mut previous = compute_name("www", &RemoteTime::new(at, "UTC"));
        for step in steps {
            at += Duration::seconds(step);
            let name = compute_name("www", &RemoteTime::new(at, "UTC"));
            assert!(name > previous, "{name} does not sort after {previous}");
            previous = name;
        }
    }

    #[test]
    fn read_clock_from_host() -> anyhow::Result<()> {
        let transport = ScriptedTransport::new().reply("date", "24-01-01_120000_UTC\n");
        let executor = RemoteExecutor::new(transport).with_echo(false);

        let now = read_remote_clock(&executor)?;
        assert_eq!(now.to_string(), "24-01-01_120000_UTC");
        assert_eq!(executor.transport().sent(), vec!["date +%y-%m-%d_%H%M%S_%Z"]);

        Ok(())
    }
}
