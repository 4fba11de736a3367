//! Time span with a human-readable external representation.
//!
//! Durations always serialize as strings such as `"5m0s"` or `"1.5s"`.
//! On read a JSON number is taken as nanoseconds and a string is parsed
//! with the same unit grammar (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`).
//! Negative spans are rejected.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

/// A non-negative time span.
///
/// # Examples
///
/// ```
/// use vigil_common::duration::Duration;
///
/// let d: Duration = "1m30s".parse().unwrap();
/// assert_eq!(d, Duration::from_secs(90));
/// assert_eq!(Duration::from_mins(5).to_string(), "5m0s");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(std::time::Duration);

impl Duration {
    pub const ZERO: Duration = Duration(std::time::Duration::ZERO);

    pub const fn from_secs(secs: u64) -> Self {
        Self(std::time::Duration::from_secs(secs))
    }

    pub const fn from_mins(mins: u64) -> Self {
        Self(std::time::Duration::from_secs(mins * 60))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(std::time::Duration::from_millis(millis))
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(std::time::Duration::from_nanos(nanos))
    }

    pub const fn as_std(&self) -> std::time::Duration {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Converts to a `chrono` delta, saturating at its maximum.
    pub fn to_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.0).unwrap_or(chrono::TimeDelta::MAX)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Self(d)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        d.0
    }
}

/// Renders `value / unit` with the fractional part trimmed of trailing zeros.
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, unit: u128) -> fmt::Result {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return write!(f, "{whole}");
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{rem:0width$}");
    write!(f, "{whole}.{}", digits.trim_end_matches('0'))
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }

        if nanos < NANOS_PER_SEC {
            let (unit, suffix) = if nanos < NANOS_PER_MICRO {
                (1, "ns")
            } else if nanos < NANOS_PER_MILLI {
                (NANOS_PER_MICRO, "µs")
            } else {
                (NANOS_PER_MILLI, "ms")
            };
            write_fraction(f, nanos, unit)?;
            return f.write_str(suffix);
        }

        let hours = nanos / NANOS_PER_HOUR;
        let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
        let secs = nanos % NANOS_PER_MIN;

        if hours > 0 {
            write!(f, "{hours}h{minutes}m")?;
        } else if minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        write_fraction(f, secs, NANOS_PER_SEC)?;
        f.write_str("s")
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

impl FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DurationError::InvalidDuration(s.to_string());

        let mut rest = s.strip_prefix('+').unwrap_or(s);
        if rest.starts_with('-') || rest.is_empty() {
            return Err(invalid());
        }
        if rest == "0" {
            return Ok(Duration::ZERO);
        }

        let mut total: u128 = 0;
        while !rest.is_empty() {
            let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let int_part = &rest[..int_len];
            rest = &rest[int_len..];

            let mut frac_part = "";
            if let Some(after_dot) = rest.strip_prefix('.') {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                frac_part = &after_dot[..frac_len];
                rest = &after_dot[frac_len..];
            }
            if int_part.is_empty() && frac_part.is_empty() {
                return Err(invalid());
            }

            let unit_len = rest
                .find(|c: char| c == '.' || c.is_ascii_digit())
                .unwrap_or(rest.len());
            let unit = unit_nanos(&rest[..unit_len]).ok_or_else(invalid)?;
            rest = &rest[unit_len..];

            let whole: u128 = if int_part.is_empty() {
                0
            } else {
                int_part.parse().map_err(|_| invalid())?
            };
            let mut component = whole.checked_mul(unit).ok_or_else(invalid)?;

            // Digits beyond nanosecond precision are dropped.
            let mut scale = unit;
            for digit in frac_part.bytes() {
                scale /= 10;
                if scale == 0 {
                    break;
                }
                component += u128::from(digit - b'0') * scale;
            }

            total = total.checked_add(component).ok_or_else(invalid)?;
        }

        let nanos = u64::try_from(total).map_err(|_| invalid())?;
        Ok(Duration::from_nanos(nanos))
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration string or a number of nanoseconds")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_nanos(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_nanos)
            .map_err(|_| E::custom(DurationError::InvalidDuration(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
        if !v.is_finite() || v < 0.0 || v > u64::MAX as f64 {
            return Err(E::custom(DurationError::InvalidDuration(v.to_string())));
        }
        Ok(Duration::from_nanos(v as u64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }
}
