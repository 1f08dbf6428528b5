//! ISO-8601 durations for mute expiry
//!
//! Mutes store their length as an ISO-8601 duration string such as
//! `PT1H` or `P7D`. Accepted form: `P[nY][nM][nW][nD][T[nH][nM][nS]]`,
//! case-insensitive, with an optional fraction on the last day or time
//! component.

use chrono::{DateTime, Months, TimeDelta, Utc};
use thiserror::Error;

/// Parse failure for a duration string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration must start with 'P'")]
    MissingDesignator,

    #[error("duration has no components")]
    Empty,

    #[error("invalid number before '{0}'")]
    InvalidNumber(char),

    #[error("unexpected or repeated designator '{0}'")]
    UnexpectedDesignator(char),

    #[error("trailing number without designator")]
    Trailing,

    #[error("duration out of range")]
    OutOfRange,
}

/// A parsed calendar duration
///
/// Years and months are kept as calendar months so that `P1M` added to
/// January 31st lands on the last day of February, not 30 days later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsoDuration {
    pub months: u32,
    pub days: u64,
    pub millis: u64,
}

impl IsoDuration {
    /// Parse a duration, ignoring the case of designators
    ///
    /// A decimal fraction is allowed on the last component when it is
    /// days, hours, minutes or seconds.
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        let input = input.trim().to_ascii_uppercase();
        let body = input
            .strip_prefix('P')
            .ok_or(DurationError::MissingDesignator)?;

        let mut duration = Self::default();
        let mut in_time = false;
        // Rank of the last designator seen; components must appear in order.
        let mut last_rank = 0u8;
        let mut number = String::new();
        let mut components = 0usize;
        let mut fractional = false;

        for ch in body.chars() {
            if ch.is_ascii_digit() || ch == '.' || ch == ',' {
                number.push(if ch == ',' { '.' } else { ch });
                continue;
            }

            if ch == 'T' {
                if in_time || !number.is_empty() {
                    return Err(DurationError::UnexpectedDesignator(ch));
                }
                in_time = true;
                continue;
            }

            let rank = match (in_time, ch) {
                (false, 'Y') => 1,
                (false, 'M') => 2,
                (false, 'W') => 3,
                (false, 'D') => 4,
                (true, 'H') => 5,
                (true, 'M') => 6,
                (true, 'S') => 7,
                _ => return Err(DurationError::UnexpectedDesignator(ch)),
            };
            // A fractional component must be the last one.
            if rank <= last_rank || fractional {
                return Err(DurationError::UnexpectedDesignator(ch));
            }
            last_rank = rank;

            let (whole, fraction) = split_number(&number, ch)?;
            duration.apply(rank, whole)?;
            if !fraction.is_empty() {
                let unit = unit_millis(rank).ok_or(DurationError::InvalidNumber(ch))?;
                duration.millis = duration
                    .millis
                    .checked_add(fraction_millis(fraction, unit))
                    .ok_or(DurationError::OutOfRange)?;
                fractional = true;
            }
            number.clear();
            components += 1;
        }

        if !number.is_empty() {
            return Err(DurationError::Trailing);
        }
        if components == 0 {
            return Err(DurationError::Empty);
        }

        Ok(duration)
    }

    fn apply(&mut self, rank: u8, value: u64) -> Result<(), DurationError> {
        let overflow = || DurationError::OutOfRange;
        match rank {
            1 => {
                let months = value.checked_mul(12).ok_or_else(overflow)?;
                self.months = self
                    .months
                    .checked_add(u32::try_from(months).map_err(|_| overflow())?)
                    .ok_or_else(overflow)?;
            }
            2 => {
                self.months = self
                    .months
                    .checked_add(u32::try_from(value).map_err(|_| overflow())?)
                    .ok_or_else(overflow)?;
            }
            3 => {
                let days = value.checked_mul(7).ok_or_else(overflow)?;
                self.days = self.days.checked_add(days).ok_or_else(overflow)?;
            }
            4 => self.days = self.days.checked_add(value).ok_or_else(overflow)?,
            _ => {
                let unit = unit_millis(rank).ok_or_else(overflow)?;
                let millis = value.checked_mul(unit).ok_or_else(overflow)?;
                self.millis = self.millis.checked_add(millis).ok_or_else(overflow)?;
            }
        }
        Ok(())
    }

    /// Add this duration to a timestamp
    ///
    /// Returns `None` when the result is outside chrono's range.
    pub fn after(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = TimeDelta::try_days(i64::try_from(self.days).ok()?)?;
        let millis = TimeDelta::try_milliseconds(i64::try_from(self.millis).ok()?)?;
        start
            .checked_add_months(Months::new(self.months))?
            .checked_add_signed(days)?
            .checked_add_signed(millis)
    }
}

/// Fixed length of a component in milliseconds; None for calendar units
fn unit_millis(rank: u8) -> Option<u64> {
    match rank {
        4 => Some(86_400_000),
        5 => Some(3_600_000),
        6 => Some(60_000),
        7 => Some(1_000),
        _ => None,
    }
}

/// Split `12.5` into the whole part and the fraction digits
fn split_number(number: &str, designator: char) -> Result<(u64, &str), DurationError> {
    let invalid = || DurationError::InvalidNumber(designator);
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) if !fraction.is_empty() && !fraction.contains('.') => {
            (whole, fraction)
        }
        Some(_) => return Err(invalid()),
        None => (number, ""),
    };
    if whole.is_empty() {
        return Err(invalid());
    }

    let whole = whole.parse().map_err(|_| invalid())?;
    Ok((whole, fraction))
}

/// Milliseconds represented by `0.<fraction>` of `unit`, truncated
fn fraction_millis(fraction: &str, unit: u64) -> u64 {
    let digits = &fraction[..fraction.len().min(9)];
    let numerator: u128 = digits.parse().unwrap_or(0);
    let denominator = 10u128.pow(digits.len() as u32);
    (numerator * u128::from(unit) / denominator) as u64
}
