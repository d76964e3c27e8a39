//! Fixed-Point Cost Arithmetic
//!
//! FOCUS feeds carry `EffectiveCost` as a high-precision decimal
//! (38 total digits, 32 fractional). Summing those values through `f64`
//! silently loses significance, so costs are held as an `i128` scaled at
//! 10^32 and parsed directly from the decimal text.
//!
//! # Representation
//!
//! - 1 cost unit = 10^32 raw units ([`COST_SCALE`]).
//! - The i128 range tops out near ±1.7 million units at this scale, which
//!   covers the upstream DECIMAL(38,32) domain (±999,999.99…) with headroom.
//! - All arithmetic is checked; overflow surfaces as an error instead of
//!   wrapping into a wrong total.
//!
//! # Parsing
//!
//! Feed values arrive as decimal strings, sometimes with a currency symbol
//! or thousands separators (`$1,234.56`). Both are stripped before parsing.
//! A plain exponent (`1.5e-3`) is accepted. Digits beyond the 32nd
//! fractional place are rounded half-up (away from zero).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fractional digits carried by a [`CostAmount`]. Matches the upstream
/// DECIMAL(38,32) cost contract.
pub const COST_FRACTIONAL_DIGITS: u32 = 32;

/// Conversion factor: 1 cost unit = 10^32 raw units.
pub const COST_SCALE: i128 = 100_000_000_000_000_000_000_000_000_000_000;

/// A cost value in fixed-point representation (scaled by [`COST_SCALE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CostAmount(i128);

impl CostAmount {
    pub const ZERO: CostAmount = CostAmount(0);

    /// Build from raw scaled units (value × 10^32).
    #[inline]
    pub fn from_raw(raw: i128) -> Self {
        CostAmount(raw)
    }

    /// Raw scaled units (value × 10^32).
    #[inline]
    pub fn raw(self) -> i128 {
        self.0
    }

    /// Checked addition; `None` on i128 overflow.
    #[inline]
    pub fn checked_add(self, other: CostAmount) -> Option<CostAmount> {
        self.0.checked_add(other.0).map(CostAmount)
    }

    /// Lossy conversion for logs and summaries. Never feed this back into
    /// totals or fingerprints.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / COST_SCALE as f64
    }

    /// Parse a decimal cost string. Strips `$` and `,`, accepts a leading
    /// sign and a plain exponent, rounds half-up past 32 fractional digits.
    pub fn parse(input: &str) -> Result<CostAmount, CostParseError> {
        let cleaned: String = input
            .trim()
            .chars()
            .filter(|c| *c != '$' && *c != ',')
            .collect();
        if cleaned.is_empty() {
            return Err(CostParseError::Empty);
        }

        let bytes = cleaned.as_bytes();
        let mut pos = 0;
        let negative = match bytes.first() {
            Some(b'-') => {
                pos += 1;
                true
            }
            Some(b'+') => {
                pos += 1;
                false
            }
            _ => false,
        };

        let mut digits: Vec<u8> = Vec::with_capacity(bytes.len());
        let mut frac_len: i64 = 0;
        let mut seen_point = false;
        let mut exponent: i64 = 0;
        while pos < bytes.len() {
            match bytes[pos] {
                b'0'..=b'9' => {
                    digits.push(bytes[pos] - b'0');
                    if seen_point {
                        frac_len += 1;
                    }
                    pos += 1;
                }
                b'.' if !seen_point => {
                    seen_point = true;
                    pos += 1;
                }
                b'e' | b'E' if !digits.is_empty() => {
                    exponent = cleaned[pos + 1..]
                        .parse::<i64>()
                        .map_err(|_| CostParseError::Invalid(input.trim().to_string()))?;
                    pos = bytes.len();
                }
                _ => return Err(CostParseError::Invalid(input.trim().to_string())),
            }
        }
        if digits.is_empty() {
            return Err(CostParseError::Invalid(input.trim().to_string()));
        }

        // Past this band the result is pinned to zero or overflow no matter
        // the digits; clamping keeps the shift arithmetic in i64 range.
        let exponent_bound = digits.len() as i64 + 2 * COST_FRACTIONAL_DIGITS as i64;
        let exponent = exponent.clamp(-exponent_bound, exponent_bound);

        // Shift the digit string onto the 32-fractional-digit grid.
        let scale_shift = COST_FRACTIONAL_DIGITS as i64 - (frac_len - exponent);
        let overflow = || CostParseError::Overflow(input.trim().to_string());

        let mut raw: i128 = 0;
        if scale_shift >= 0 {
            for &d in &digits {
                raw = raw
                    .checked_mul(10)
                    .and_then(|r| r.checked_add(d as i128))
                    .ok_or_else(overflow)?;
            }
            for _ in 0..scale_shift {
                raw = raw.checked_mul(10).ok_or_else(overflow)?;
            }
        } else {
            let drop = (-scale_shift) as usize;
            if drop > digits.len() {
                // Entire value sits below the grid; half-up cannot reach it.
                raw = 0;
            } else {
                let keep = digits.len() - drop;
                for &d in &digits[..keep] {
                    raw = raw
                        .checked_mul(10)
                        .and_then(|r| r.checked_add(d as i128))
                        .ok_or_else(overflow)?;
                }
                if digits[keep] >= 5 {
                    raw = raw.checked_add(1).ok_or_else(overflow)?;
                }
            }
        }

        Ok(CostAmount(if negative { -raw } else { raw }))
    }
}

impl FromStr for CostAmount {
    type Err = CostParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CostAmount::parse(s)
    }
}

impl fmt::Display for CostAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let int_part = abs / COST_SCALE as u128;
        let frac_part = abs % COST_SCALE as u128;
        if self.0 < 0 {
            write!(f, "-")?;
        }
        if frac_part == 0 {
            write!(f, "{}", int_part)
        } else {
            let frac = format!("{:032}", frac_part);
            write!(f, "{}.{}", int_part, frac.trim_end_matches('0'))
        }
    }
}

impl Serialize for CostAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CostAmount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNumber {
            String(String),
            Number(serde_json::Number),
        }

        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
            StringOrNumber::Number(n) => n.to_string().parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Errors from decimal cost parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CostParseError {
    Empty,
    Invalid(String),
    Overflow(String),
}

impl fmt::Display for CostParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty cost value"),
            Self::Invalid(v) => write!(f, "not a decimal cost value: {:?}", v),
            Self::Overflow(v) => write!(f, "cost value out of representable range: {:?}", v),
        }
    }
}

impl std::error::Error for CostParseError {}

// =============================================================================
// TESTS
// =============================================================================
