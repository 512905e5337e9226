//! Exact fixed-point resource quantities.
//!
//! A [`Quantity`] stores its value as a signed count of nano-units (`10^-9`) in an
//! `i128`, so every arithmetic operation is exact. Values are parsed from and
//! rendered to the usual Kubernetes notation: `500m`, `2`, `1.5`, `4Gi`, `1e3`.
//! Inputs more precise than one nano-unit are rounded away from zero.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Largest mantissa we accept before scaling. Keeps every intermediate product
/// inside `i128` for all supported suffixes.
const MAX_MANTISSA_DIGITS: usize = 30;

/// Preferred notation when rendering a quantity back to a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantityFormat {
    /// `k`, `M`, `G`, ... and `m`, `u`, `n`.
    #[default]
    DecimalSI,
    /// `Ki`, `Mi`, `Gi`, ...
    BinarySI,
    /// `1e3`, `5e-3`.
    DecimalExponent,
}

/// An exact, signed resource amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: QuantityFormat,
}

/// Error returned when a quantity string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("quantity must not be empty")]
    Empty,
    #[error("invalid quantity '{0}'")]
    Invalid(String),
    #[error("unknown quantity suffix '{suffix}' in '{input}'")]
    UnknownSuffix { input: String, suffix: String },
    #[error("quantity '{0}' is out of range")]
    OutOfRange(String),
}

enum Multiplier {
    Decimal(i32),
    Binary(u32),
}

impl Quantity {
    pub const fn zero() -> Self {
        Self {
            nanos: 0,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Whole units, e.g. `Quantity::from_units(4)` is `"4"`.
    pub fn from_units(units: i64) -> Self {
        Self {
            nanos: units as i128 * NANOS_PER_UNIT,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Thousandths of a unit, e.g. `Quantity::from_milli(500)` is `"500m"`.
    pub fn from_milli(milli: i64) -> Self {
        Self {
            nanos: milli as i128 * 1_000_000,
            format: QuantityFormat::DecimalSI,
        }
    }

    /// Byte-style amounts rendered with binary suffixes.
    pub fn from_bytes(bytes: i64) -> Self {
        Self {
            nanos: bytes as i128 * NANOS_PER_UNIT,
            format: QuantityFormat::BinarySI,
        }
    }

    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn is_negative(&self) -> bool {
        self.nanos < 0
    }

    /// Value in whole units, rounded away from zero.
    pub fn value(&self) -> i128 {
        div_away_from_zero(self.nanos, NANOS_PER_UNIT)
    }

    /// Value in thousandths of a unit, rounded away from zero.
    pub fn milli_value(&self) -> i128 {
        div_away_from_zero(self.nanos, 1_000_000)
    }

    pub fn checked_add(&self, other: &Quantity) -> Option<Quantity> {
        Some(Quantity {
            nanos: self.nanos.checked_add(other.nanos)?,
            format: self.merged_format(other),
        })
    }

    pub fn checked_sub(&self, other: &Quantity) -> Option<Quantity> {
        Some(Quantity {
            nanos: self.nanos.checked_sub(other.nanos)?,
            format: self.merged_format(other),
        })
    }

    /// Zero quantities carry no meaningful format; take the other side's.
    fn merged_format(&self, other: &Quantity) -> QuantityFormat {
        if self.nanos == 0 {
            other.format
        } else {
            self.format
        }
    }

    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let digits = digits.trim_start_matches('0');
        if digits.len() > MAX_MANTISSA_DIGITS {
            return Err(QuantityError::OutOfRange(input.to_string()));
        }
        let mantissa: i128 = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| QuantityError::Invalid(input.to_string()))?
        };

        let (multiplier, format) = parse_suffix(input, suffix)?;

        let out_of_range = || QuantityError::OutOfRange(input.to_string());
        let mut numerator = mantissa;
        let mut denominator = pow10(frac_part.len() as u32).ok_or_else(out_of_range)?;
        match multiplier {
            Multiplier::Decimal(exp) if exp >= 0 => {
                let scale = pow10(exp as u32).ok_or_else(out_of_range)?;
                numerator = numerator.checked_mul(scale).ok_or_else(out_of_range)?;
            }
            Multiplier::Decimal(exp) => {
                let scale = pow10(exp.unsigned_abs()).ok_or_else(out_of_range)?;
                denominator = denominator.checked_mul(scale).ok_or_else(out_of_range)?;
            }
            Multiplier::Binary(shift) => {
                numerator = numerator
                    .checked_mul(1i128 << shift)
                    .ok_or_else(out_of_range)?;
            }
        }
        numerator = numerator
            .checked_mul(NANOS_PER_UNIT)
            .ok_or_else(out_of_range)?;

        let magnitude = div_away_from_zero(numerator, denominator);
        Ok(Quantity {
            nanos: if negative { -magnitude } else { magnitude },
            format,
        })
    }
}

fn parse_suffix(input: &str, suffix: &str) -> Result<(Multiplier, QuantityFormat), QuantityError> {
    use Multiplier::{Binary, Decimal};
    use QuantityFormat::{BinarySI, DecimalExponent, DecimalSI};

    let parsed = match suffix {
        "" => (Decimal(0), DecimalSI),
        "n" => (Decimal(-9), DecimalSI),
        "u" => (Decimal(-6), DecimalSI),
        "m" => (Decimal(-3), DecimalSI),
        "k" => (Decimal(3), DecimalSI),
        "M" => (Decimal(6), DecimalSI),
        "G" => (Decimal(9), DecimalSI),
        "T" => (Decimal(12), DecimalSI),
        "P" => (Decimal(15), DecimalSI),
        "E" => (Decimal(18), DecimalSI),
        "Ki" => (Binary(10), BinarySI),
        "Mi" => (Binary(20), BinarySI),
        "Gi" => (Binary(30), BinarySI),
        "Ti" => (Binary(40), BinarySI),
        "Pi" => (Binary(50), BinarySI),
        "Ei" => (Binary(60), BinarySI),
        s if s.len() > 1 && (s.starts_with('e') || s.starts_with('E')) => {
            let exp: i32 = s[1..].parse().map_err(|_| QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            })?;
            (Decimal(exp), DecimalExponent)
        }
        _ => {
            return Err(QuantityError::UnknownSuffix {
                input: input.to_string(),
                suffix: suffix.to_string(),
            });
        }
    };
    Ok(parsed)
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

fn div_away_from_zero(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d == 0 {
        q
    } else if n < 0 {
        q - 1
    } else {
        q + 1
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return write!(f, "0");
        }
        let sign = if self.nanos < 0 { "-" } else { "" };
        let abs = self.nanos.unsigned_abs();

        if self.format == QuantityFormat::BinarySI && abs % NANOS_PER_UNIT as u128 == 0 {
            const SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
            let mut units = abs / NANOS_PER_UNIT as u128;
            let mut idx = 0;
            while idx < SUFFIXES.len() - 1 && units % 1024 == 0 {
                units /= 1024;
                idx += 1;
            }
            return write!(f, "{}{}{}", sign, units, SUFFIXES[idx]);
        }

        // Largest power of ten (relative to nano-units) that divides the value.
        let mut exp: i32 = -9;
        let mut mantissa = abs;
        while exp < 18 && mantissa % 1000 == 0 {
            mantissa /= 1000;
            exp += 3;
        }

        if self.format == QuantityFormat::DecimalExponent {
            if exp == 0 {
                write!(f, "{}{}", sign, mantissa)
            } else {
                write!(f, "{}{}e{}", sign, mantissa, exp)
            }
        } else {
            let suffix = match exp {
                -9 => "n",
                -6 => "u",
                -3 => "m",
                0 => "",
                3 => "k",
                6 => "M",
                9 => "G",
                12 => "T",
                15 => "P",
                _ => "E",
            };
            write!(f, "{}{}{}", sign, mantissa, suffix)
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nanos.cmp(&other.nanos)
    }
}

impl std::ops::Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_add(rhs.nanos),
            format: self.merged_format(&rhs),
        }
    }
}

impl std::ops::Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_sub(rhs.nanos),
            format: self.merged_format(&rhs),
        }
    }
}

impl std::ops::Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity {
            nanos: self.nanos.saturating_neg(),
            format: self.format,
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuantityVisitor;

        impl serde::de::Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity string such as \"500m\" or \"4Gi\", or a number")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_units(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}
