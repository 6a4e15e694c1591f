//! Conversion of naive source-local timestamps into the canonical zone.
//!
//! Ad accounts report spend in local wall-clock time tagged with a zone
//! code. The UTC offset of a wall-clock time depends on the date, so each
//! conversion goes through the full IANA rules for the source zone and again
//! for the canonical zone.
//!
//! Daylight-saving transitions create two kinds of problem wall times:
//!
//! - **Skipped** (spring forward): e.g. 02:30 on 2024-03-10 in New York never
//!   happened. With [`SkippedTimePolicy::ShiftForward`] the wall time is read
//!   with the offset in force just before the transition, which lands it the
//!   length of the gap later (03:30 EDT). [`SkippedTimePolicy::Reject`] turns
//!   it into an error instead.
//! - **Repeated** (fall back): e.g. 01:30 on 2024-11-03 in New York happened
//!   twice. [`AmbiguousTimePolicy::Standard`] picks the standard-time
//!   occurrence (01:30 EST, the second one), [`AmbiguousTimePolicy::Daylight`]
//!   the daylight-time one (01:30 EDT, the first).
//!
//! [`TimezoneNormalizer`] holds no mutable state and is `Copy`, so it can be
//! shared across concurrent transforms freely.

use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::{OffsetComponents, Tz};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone tags an ad account can report spend in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTimezone {
    /// US Eastern (EST/EDT).
    Eastern,
    Utc,
    /// US Pacific (PST/PDT).
    Pacific,
}

impl SourceTimezone {
    /// IANA rules used for this tag.
    #[must_use]
    pub fn tz(self) -> Tz {
        match self {
            Self::Eastern => chrono_tz::America::New_York,
            Self::Utc => chrono_tz::UTC,
            Self::Pacific => chrono_tz::America::Los_Angeles,
        }
    }

    /// Short code stored alongside canonical rows as `timezone_original`.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Eastern => "EST",
            Self::Utc => "UTC",
            Self::Pacific => "PST",
        }
    }
}

impl std::fmt::Display for SourceTimezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceTimezone {
    type Err = TimezoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "EST" | "EDT" | "ET" | "AMERICA/NEW_YORK" | "US/EASTERN" => Ok(Self::Eastern),
            "UTC" | "GMT" | "ETC/UTC" | "Z" => Ok(Self::Utc),
            "PST" | "PDT" | "PT" | "AMERICA/LOS_ANGELES" | "US/PACIFIC" => Ok(Self::Pacific),
            _ => Err(TimezoneError::UnknownTimezone(trimmed.to_string())),
        }
    }
}

/// Which occurrence of a repeated wall-clock time to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousTimePolicy {
    /// The reading on standard time, i.e. after clocks fall back.
    #[default]
    Standard,
    /// The reading on daylight-saving time, before clocks fall back.
    Daylight,
}

impl FromStr for AmbiguousTimePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "daylight" => Ok(Self::Daylight),
            other => Err(format!("expected 'standard' or 'daylight', got '{other}'")),
        }
    }
}

/// What to do with a wall-clock time that falls in a spring-forward gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkippedTimePolicy {
    #[default]
    ShiftForward,
    Reject,
}

impl FromStr for SkippedTimePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shift_forward" => Ok(Self::ShiftForward),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'shift_forward' or 'reject', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DstPolicy {
    pub ambiguous: AmbiguousTimePolicy,
    pub skipped: SkippedTimePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimezoneError {
    #[error("unknown timezone code '{0}'")]
    UnknownTimezone(String),

    #[error("local time {local} does not exist in {zone}: skipped by a daylight-saving transition")]
    NonexistentLocalTime { local: NaiveDateTime, zone: Tz },
}

#[derive(Debug, Clone, Copy)]
pub struct TimezoneNormalizer {
    canonical: Tz,
    policy: DstPolicy,
}

impl Default for TimezoneNormalizer {
    fn default() -> Self {
        Self::new(chrono_tz::America::Los_Angeles, DstPolicy::default())
    }
}

impl TimezoneNormalizer {
    #[must_use]
    pub fn new(canonical: Tz, policy: DstPolicy) -> Self {
        Self { canonical, policy }
    }

    #[must_use]
    pub fn canonical_zone(&self) -> Tz {
        self.canonical
    }

    #[must_use]
    pub fn policy(&self) -> DstPolicy {
        self.policy
    }

    /// Converts a naive wall-clock `local` time observed in `source` into the
    /// same instant expressed in the canonical zone.
    ///
    /// # Errors
    ///
    /// Returns [`TimezoneError::NonexistentLocalTime`] only when `local` falls
    /// in a spring-forward gap and the skipped-time policy is
    /// [`SkippedTimePolicy::Reject`].
    pub fn to_canonical(
        &self,
        local: NaiveDateTime,
        source: SourceTimezone,
    ) -> Result<DateTime<Tz>, TimezoneError> {
        let instant = self.localize(local, source.tz())?;
        Ok(instant.with_timezone(&self.canonical))
    }

    /// Pins a naive wall-clock time in `zone` to a single instant, applying
    /// the configured DST policy to skipped and repeated times.
    ///
    /// # Errors
    ///
    /// See [`TimezoneNormalizer::to_canonical`].
    pub fn localize(&self, local: NaiveDateTime, zone: Tz) -> Result<DateTime<Tz>, TimezoneError> {
        match zone.from_local_datetime(&local) {
            LocalResult::Single(dt) => Ok(dt),
            LocalResult::Ambiguous(a, b) => {
                let (standard, daylight) = split_by_dst(a, b);
                Ok(match self.policy.ambiguous {
                    AmbiguousTimePolicy::Standard => standard,
                    AmbiguousTimePolicy::Daylight => daylight,
                })
            }
            LocalResult::None => match self.policy.skipped {
                SkippedTimePolicy::Reject => {
                    Err(TimezoneError::NonexistentLocalTime { local, zone })
                }
                SkippedTimePolicy::ShiftForward => Ok(shift_past_gap(local, zone)),
            },
        }
    }
}

/// Orders the two readings of a repeated wall time as `(standard, daylight)`.
/// When both or neither observe DST, the chronologically second reading
/// counts as standard.
fn split_by_dst(a: DateTime<Tz>, b: DateTime<Tz>) -> (DateTime<Tz>, DateTime<Tz>) {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    if observes_dst(&second) && !observes_dst(&first) {
        (first, second)
    } else {
        (second, first)
    }
}

fn observes_dst(dt: &DateTime<Tz>) -> bool {
    dt.offset().dst_offset() != TimeDelta::zero()
}

/// Reads `local` with the offset that was in force a day earlier. Gaps are
/// never closer than a day to the previous transition, so that offset is the
/// pre-transition one and the result lands after the gap.
fn shift_past_gap(local: NaiveDateTime, zone: Tz) -> DateTime<Tz> {
    let before = zone
        .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
        .fix();
    let utc = local - TimeDelta::seconds(i64::from(before.local_minus_utc()));
    zone.from_utc_datetime(&utc)
}
