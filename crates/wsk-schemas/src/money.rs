//! Fixed-point money.
//!
//! Every amount on the order and ledger path is a [`Micros`]: an `i64` at
//! 1e-6 scale (1 currency unit = 1_000_000). Floating point never touches
//! money. Item quantities stay plain integers and only meet money through
//! [`Micros::checked_mul_qty`].

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Micros per currency unit.
pub const MICROS_SCALE: i64 = 1_000_000;

const MICROS_PER_CENT: i128 = 10_000;

// ---------------------------------------------------------------------------
// Micros newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount at 1e-6 scale.
///
/// There is no `From<i64>`; use [`Micros::new`] or [`parse_amount`] so the
/// call site says which scale it means.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);
    pub const MAX: Micros = Micros(i64::MAX);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole currency units, e.g. `Micros::from_units(25)` is 25.00.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units.saturating_mul(MICROS_SCALE))
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn saturating_add(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Micros) -> Micros {
        Micros(self.0.saturating_sub(rhs.0))
    }

    #[inline]
    pub fn checked_add(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_add(rhs.0).map(Micros)
    }

    /// Unit price times an item quantity. `None` on overflow; callers must
    /// surface it rather than clamp.
    #[inline]
    pub fn checked_mul_qty(self, qty: u32) -> Option<Micros> {
        self.0.checked_mul(i64::from(qty)).map(Micros)
    }

    /// Sum with overflow detection.
    pub fn checked_sum<I>(iter: I) -> Option<Micros>
    where
        I: IntoIterator<Item = Micros>,
    {
        iter.into_iter()
            .try_fold(Micros::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

/// Two decimal places, half away from zero at the cent.
impl fmt::Display for Micros {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = i128::from(self.0);
        let cents = (raw.abs() + MICROS_PER_CENT / 2) / MICROS_PER_CENT;
        let sign = if raw < 0 && cents != 0 { "-" } else { "" };
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

// ---------------------------------------------------------------------------
// Decimal parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Empty { field: &'static str },
    Invalid { field: &'static str, raw: String },
    TooManyDecimalPlaces { field: &'static str, raw: String },
    Overflow { field: &'static str, raw: String },
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty { field } => write!(f, "{field}: empty amount"),
            AmountError::Invalid { field, raw } => {
                write!(f, "{field}: not a decimal amount: '{raw}'")
            }
            AmountError::TooManyDecimalPlaces { field, raw } => {
                write!(f, "{field}: more than 6 decimal places: '{raw}'")
            }
            AmountError::Overflow { field, raw } => {
                write!(f, "{field}: amount out of range: '{raw}'")
            }
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse a decimal string (`"10"`, `"10.5"`, `".25"`, `"-3.10"`) into
/// [`Micros`] without going through floating point.
///
/// Both `.` and `,` are accepted as the decimal separator; at most one may
/// appear. Sign handling is left to the caller's validation: a negative
/// amount parses, and the order model rejects it as a non-positive price.
pub fn parse_amount(s: &str, field: &'static str) -> Result<Micros, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Empty { field });
    }
    let invalid = || AmountError::Invalid {
        field,
        raw: s.to_string(),
    };

    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let mut parts = digits.splitn(2, ['.', ',']);
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }
    if frac_part.len() > 6 {
        return Err(AmountError::TooManyDecimalPlaces {
            field,
            raw: s.to_string(),
        });
    }

    let overflow = || AmountError::Overflow {
        field,
        raw: s.to_string(),
    };

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<i64>().map_err(|_| overflow())?
    };
    let frac_val: i64 = if frac_part.is_empty() {
        0
    } else {
        // Right-pad to 6 digits: "5" -> 500000.
        let padded = format!("{frac_part:0<6}");
        padded.parse::<i64>().map_err(|_| invalid())?
    };

    let magnitude = int_val
        .checked_mul(MICROS_SCALE)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(overflow)?;

    Ok(Micros(if negative { -magnitude } else { magnitude }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
