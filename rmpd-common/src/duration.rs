//! Go-style duration strings
//!
//! The control protocol carries durations the way Go's `time.ParseDuration`
//! accepts them: a sequence of decimal numbers, each with an optional fraction
//! and a mandatory unit suffix, such as `30s`, `1m30s`, `1.5h` or `300ms`.
//! Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
//!
//! Formatting mirrors Go's `Duration.String()` so that responses echo a
//! canonical form (`90s` is reported as `1m30s`).

use crate::{Error, Result};
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Parse a Go-style duration string.
///
/// Negative durations are rejected since every consumer (seek offsets) is an
/// absolute position.
///
/// # Examples
///
/// ```
/// use rmpd_common::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let original = input;
    let s = input.trim();

    if s.is_empty() {
        return Err(invalid(original, "empty duration"));
    }
    if s.starts_with('-') {
        return Err(invalid(original, "negative durations are not supported"));
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    // Go accepts a bare zero without a unit
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_end];
        rest = &rest[int_end..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_end = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_end];
            rest = &after_dot[frac_end..];
        }

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid(original, "expected a number"));
        }

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let scale = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => NANOS_PER_MIN,
            "h" => NANOS_PER_HOUR,
            "" => return Err(invalid(original, "missing unit")),
            other => return Err(invalid(original, &format!("unknown unit \"{}\"", other))),
        };

        let int_value: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| invalid(original, "value out of range"))?
        };

        let mut nanos = int_value
            .checked_mul(scale)
            .ok_or_else(|| invalid(original, "value out of range"))?;

        let mut digit_scale = scale;
        for digit in frac_part.bytes() {
            digit_scale /= 10;
            if digit_scale == 0 {
                break;
            }
            nanos += u128::from(digit - b'0') * digit_scale;
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid(original, "value out of range"))?;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| invalid(original, "value out of range"))?;
    let subsec = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, subsec))
}

/// Format a duration the way Go prints `time.Duration` values.
///
/// ```
/// use rmpd_common::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(30)), "30s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
/// assert_eq!(format_duration(Duration::from_secs(3600)), "1h0m0s");
/// assert_eq!(format_duration(Duration::ZERO), "0s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_SEC {
        let (scale, unit) = if nanos < NANOS_PER_MICRO {
            (1, "ns")
        } else if nanos < NANOS_PER_MILLI {
            (NANOS_PER_MICRO, "µs")
        } else {
            (NANOS_PER_MILLI, "ms")
        };
        return format!("{}{}", decimal(nanos, scale), unit);
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let seconds = decimal(nanos % NANOS_PER_MIN, NANOS_PER_SEC);

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Render `value / scale` with the fraction's trailing zeros removed.
fn decimal(value: u128, scale: u128) -> String {
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }

    let width = scale.to_string().len() - 1;
    let digits = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidInput(format!("invalid duration \"{}\": {}", input, reason))
}
