//! A second-precision [`Duration`] which is able to parse human-readable
//! formats like `3650d`, `12h30m` or `1d2h3m4s`.
//!
//! X.509 validity timestamps only carry whole seconds, so this type never
//! stores sub-second precision. It derefs to [`std::time::Duration`], which
//! means it can be handed to any API expecting the standard type.

use std::{
    cmp::Ordering,
    fmt::Display,
    num::ParseIntError,
    ops::Deref,
    str::FromStr,
};

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::IntoEnumIterator;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(module)]
pub enum DurationParseError {
    #[snafu(display("invalid input, either empty or contains non-ascii characters"))]
    InvalidInput,

    #[snafu(display("unexpected character {chr:?}"))]
    UnexpectedCharacter { chr: char },

    #[snafu(display("fragment with value {value} has no unit"))]
    NoUnit { value: u64 },

    #[snafu(display("invalid fragment order, {current} must be before {previous}"))]
    InvalidUnitOrdering {
        previous: DurationUnit,
        current: DurationUnit,
    },

    #[snafu(display("fragment unit {unit} was specified multiple times"))]
    DuplicateUnit { unit: DurationUnit },

    #[snafu(display("unknown fragment unit {unit:?}"))]
    ParseUnit { unit: String },

    #[snafu(display("failed to parse fragment value as integer"))]
    ParseInt { source: ParseIntError },

    #[snafu(display("the duration overflows the supported range"))]
    Overflow,
}

/// A whole-second duration with a human-readable text representation.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(std::time::Duration);

impl Duration {
    /// Creates a new [`Duration`] from the specified number of whole seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(std::time::Duration::from_secs(secs))
    }

    /// Creates a new [`Duration`] from whole minutes. Overflows are not
    /// checked, which is fine for constants.
    pub const fn from_minutes_unchecked(minutes: u64) -> Self {
        Self::from_secs(minutes * 60)
    }

    /// Creates a new [`Duration`] from whole hours. Overflows are not
    /// checked, which is fine for constants.
    pub const fn from_hours_unchecked(hours: u64) -> Self {
        Self::from_minutes_unchecked(hours * 60)
    }

    /// Creates a new [`Duration`] from whole days. Overflows are not checked,
    /// which is fine for constants.
    pub const fn from_days_unchecked(days: u64) -> Self {
        Self::from_hours_unchecked(days * 24)
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use duration_parse_error::*;

        let input = s.trim();
        ensure!(!input.is_empty() && input.is_ascii(), InvalidInputSnafu);

        let mut rest = input;
        let mut secs: u64 = 0;
        let mut last_unit: Option<DurationUnit> = None;

        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());

            if digits_end == 0 {
                let chr = rest.chars().next().unwrap_or_default();
                return UnexpectedCharacterSnafu { chr }.fail();
            }

            let value = rest[..digits_end].parse::<u64>().context(ParseIntSnafu)?;
            rest = &rest[digits_end..];

            let unit_end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());

            if unit_end == 0 {
                return match rest.chars().next() {
                    Some(chr) => UnexpectedCharacterSnafu { chr }.fail(),
                    None => NoUnitSnafu { value }.fail(),
                };
            }

            let unit = rest[..unit_end]
                .parse::<DurationUnit>()
                .ok()
                .context(ParseUnitSnafu {
                    unit: &rest[..unit_end],
                })?;
            rest = &rest[unit_end..];

            if let Some(previous) = last_unit {
                match unit.cmp(&previous) {
                    Ordering::Less => {
                        return InvalidUnitOrderingSnafu {
                            previous,
                            current: unit,
                        }
                        .fail();
                    }
                    Ordering::Equal => return DuplicateUnitSnafu { unit }.fail(),
                    Ordering::Greater => (),
                }
            }

            secs = value
                .checked_mul(unit.secs())
                .and_then(|fragment| secs.checked_add(fragment))
                .context(OverflowSnafu)?;
            last_unit = Some(unit);
        }

        Ok(Self::from_secs(secs))
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut secs = self.0.as_secs();

        if secs == 0 {
            return write!(f, "0{}", DurationUnit::Seconds);
        }

        for unit in DurationUnit::iter() {
            let whole = secs / unit.secs();
            if whole > 0 {
                write!(f, "{whole}{unit}")?;
            }
            secs %= unit.secs();
        }

        Ok(())
    }
}

impl Deref for Duration {
    type Target = std::time::Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Supported units of a duration fragment. The order of variants **MATTERS**:
/// fragments must appear from the largest to the smallest unit, and
/// [`Display`] renders them in declaration order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::EnumString,
    strum::Display,
    strum::EnumIter,
)]
pub enum DurationUnit {
    #[strum(serialize = "d")]
    Days,

    #[strum(serialize = "h")]
    Hours,

    #[strum(serialize = "m")]
    Minutes,

    #[strum(serialize = "s")]
    Seconds,
}

impl DurationUnit {
    /// Returns the number of whole seconds in each unit.
    const fn secs(self) -> u64 {
        match self {
            Self::Days => 24 * Self::Hours.secs(),
            Self::Hours => 60 * Self::Minutes.secs(),
            Self::Minutes => 60,
            Self::Seconds => 1,
        }
    }
}
