//! Unit parsing and conversion.
//!
//! Unit strings are validated through a [`UnitSystem`]. The crate ships
//! [`StandardUnits`], which understands the units used by photometric and
//! astrometric metrics (magnitudes, angles, lengths, times, counts, pixels,
//! flux densities) with SI prefixes, products, quotients and integer powers:
//!
//! ```text
//! mmag   arcsec   mas   km / s   arcsec2   m s^-2   mJy   %   ""
//! ```
//!
//! Units are linear scale factors over a small set of base dimensions; two
//! units are convertible when their dimensions match.

use std::f64::consts::PI;

use crate::domain::error::{Result, VerifyError};

const LENGTH: usize = 0;
const MASS: usize = 1;
const TIME: usize = 2;
const ANGLE: usize = 3;
const MAGNITUDE: usize = 4;
const COUNT: usize = 5;
const PIXEL: usize = 6;
const INFORMATION: usize = 7;
const BASE_DIMENSIONS: usize = 8;

/// Exponents over the base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dimension([i8; BASE_DIMENSIONS]);

impl Dimension {
    const NONE: Dimension = Dimension([0; BASE_DIMENSIONS]);

    const fn base(index: usize) -> Self {
        let mut exps = [0; BASE_DIMENSIONS];
        exps[index] = 1;
        Dimension(exps)
    }

    const fn with(mut self, index: usize, power: i8) -> Self {
        self.0[index] += power;
        self
    }

    fn combine(self, other: Dimension, power: i32) -> Option<Self> {
        let mut exps = self.0;
        for (exp, other) in exps.iter_mut().zip(other.0) {
            let scaled = i32::from(other).checked_mul(power)?;
            *exp = i8::try_from(i32::from(*exp) + scaled).ok()?;
        }
        Some(Dimension(exps))
    }

    /// Whether every exponent is zero.
    pub fn is_dimensionless(&self) -> bool {
        *self == Dimension::NONE
    }
}

/// A parsed unit: scale relative to the base units of its dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    scale: f64,
    dimension: Dimension,
}

impl Unit {
    pub const DIMENSIONLESS: Unit = Unit {
        scale: 1.0,
        dimension: Dimension::NONE,
    };

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Whether values in this unit can be expressed in `other`.
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
    }

    /// Multiplicative factor converting a value in `self` to `to`, if compatible.
    pub fn conversion_factor(&self, to: &Unit) -> Option<f64> {
        self.is_compatible(to).then(|| self.scale / to.scale)
    }

    fn times(self, other: Unit, power: i32) -> Option<Unit> {
        Some(Unit {
            scale: self.scale * other.scale.powi(power),
            dimension: self.dimension.combine(other.dimension, power)?,
        })
    }
}

/// Capability to validate and convert unit strings.
///
/// Every [`crate::Datum`] unit and every comparison in [`crate::Metric::check`]
/// goes through a `UnitSystem`; [`StandardUnits`] is the default.
pub trait UnitSystem {
    /// Parse a unit string; the empty string is dimensionless.
    fn parse(&self, unit: &str) -> Result<Unit>;

    /// Validate a unit string without keeping the parsed form.
    fn validate(&self, unit: &str) -> Result<()> {
        self.parse(unit).map(|_| ())
    }

    /// Convert `value` expressed in `from` into `to`.
    fn convert(&self, value: f64, from: &str, to: &str) -> Result<f64> {
        let from_unit = self.parse(from)?;
        let to_unit = self.parse(to)?;
        from_unit
            .conversion_factor(&to_unit)
            .map(|factor| value * factor)
            .ok_or_else(|| VerifyError::IncompatibleUnits {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// Whether `from` can be converted into `to`.
    fn compatible(&self, from: &str, to: &str) -> Result<bool> {
        Ok(self.parse(from)?.is_compatible(&self.parse(to)?))
    }
}

/// Built-in unit table with SI prefixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

static STANDARD: StandardUnits = StandardUnits;

/// The process-wide default unit system.
pub fn standard() -> &'static StandardUnits {
    &STANDARD
}

struct BaseUnit {
    symbol: &'static str,
    scale: f64,
    dimension: Dimension,
    prefixes: Prefixes,
}

#[derive(Clone, Copy, PartialEq)]
enum Prefixes {
    None,
    Si,
    SiAndBinary,
}

const fn base(symbol: &'static str, scale: f64, dimension: Dimension, prefixes: Prefixes) -> BaseUnit {
    BaseUnit {
        symbol,
        scale,
        dimension,
        prefixes,
    }
}

const ARCSEC: f64 = PI / 648_000.0;

const BASE_UNITS: &[BaseUnit] = &[
    base("dimensionless", 1.0, Dimension::NONE, Prefixes::None),
    base("%", 0.01, Dimension::NONE, Prefixes::None),
    base("percent", 0.01, Dimension::NONE, Prefixes::None),
    // magnitudes
    base("mag", 1.0, Dimension::base(MAGNITUDE), Prefixes::Si),
    // angles
    base("rad", 1.0, Dimension::base(ANGLE), Prefixes::Si),
    base("deg", PI / 180.0, Dimension::base(ANGLE), Prefixes::None),
    base("degree", PI / 180.0, Dimension::base(ANGLE), Prefixes::None),
    base("arcmin", PI / 10_800.0, Dimension::base(ANGLE), Prefixes::None),
    base("arcminute", PI / 10_800.0, Dimension::base(ANGLE), Prefixes::None),
    base("arcsec", ARCSEC, Dimension::base(ANGLE), Prefixes::Si),
    base("arcsecond", ARCSEC, Dimension::base(ANGLE), Prefixes::None),
    base("mas", ARCSEC * 1e-3, Dimension::base(ANGLE), Prefixes::None),
    base("uas", ARCSEC * 1e-6, Dimension::base(ANGLE), Prefixes::None),
    base("sr", 1.0, Dimension::base(ANGLE).with(ANGLE, 1), Prefixes::None),
    // length
    base("m", 1.0, Dimension::base(LENGTH), Prefixes::Si),
    base("AU", 1.495_978_707e11, Dimension::base(LENGTH), Prefixes::None),
    base("au", 1.495_978_707e11, Dimension::base(LENGTH), Prefixes::None),
    base("pc", 3.085_677_581_491_367e16, Dimension::base(LENGTH), Prefixes::Si),
    base("Angstrom", 1e-10, Dimension::base(LENGTH), Prefixes::None),
    base("AA", 1e-10, Dimension::base(LENGTH), Prefixes::None),
    // time
    base("s", 1.0, Dimension::base(TIME), Prefixes::Si),
    base("min", 60.0, Dimension::base(TIME), Prefixes::None),
    base("h", 3_600.0, Dimension::base(TIME), Prefixes::None),
    base("d", 86_400.0, Dimension::base(TIME), Prefixes::None),
    base("day", 86_400.0, Dimension::base(TIME), Prefixes::None),
    base("yr", 31_557_600.0, Dimension::base(TIME), Prefixes::Si),
    base("Hz", 1.0, Dimension::base(TIME).with(TIME, -2), Prefixes::Si),
    // mass and derived
    base("g", 1e-3, Dimension::base(MASS), Prefixes::Si),
    base(
        "J",
        1.0,
        Dimension::base(MASS).with(LENGTH, 2).with(TIME, -2),
        Prefixes::Si,
    ),
    base(
        "erg",
        1e-7,
        Dimension::base(MASS).with(LENGTH, 2).with(TIME, -2),
        Prefixes::None,
    ),
    base(
        "W",
        1.0,
        Dimension::base(MASS).with(LENGTH, 2).with(TIME, -3),
        Prefixes::Si,
    ),
    base("Jy", 1e-26, Dimension::base(MASS).with(TIME, -2), Prefixes::Si),
    // counts and detector units
    base("count", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("ct", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("electron", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("adu", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("photon", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("ph", 1.0, Dimension::base(COUNT), Prefixes::None),
    base("pix", 1.0, Dimension::base(PIXEL), Prefixes::None),
    base("pixel", 1.0, Dimension::base(PIXEL), Prefixes::None),
    // information
    base("byte", 1.0, Dimension::base(INFORMATION), Prefixes::SiAndBinary),
    base("B", 1.0, Dimension::base(INFORMATION), Prefixes::SiAndBinary),
    base("bit", 0.125, Dimension::base(INFORMATION), Prefixes::SiAndBinary),
];

const SI_PREFIXES: &[(&str, f64)] = &[
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("da", 1e1),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("u", 1e-6),
    ("µ", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
];

const BINARY_PREFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
];

fn invalid(unit: &str, reason: impl Into<String>) -> VerifyError {
    VerifyError::InvalidUnit {
        unit: unit.to_string(),
        reason: reason.into(),
    }
}

impl StandardUnits {
    fn lookup(&self, symbol: &str) -> Option<Unit> {
        if let Some(b) = BASE_UNITS.iter().find(|b| b.symbol == symbol) {
            return Some(Unit {
                scale: b.scale,
                dimension: b.dimension,
            });
        }

        for b in BASE_UNITS.iter().filter(|b| b.prefixes != Prefixes::None) {
            let Some(prefix) = symbol.strip_suffix(b.symbol) else {
                continue;
            };
            let binary: &[(&str, f64)] = if b.prefixes == Prefixes::SiAndBinary {
                BINARY_PREFIXES
            } else {
                &[]
            };
            if let Some((_, factor)) = SI_PREFIXES
                .iter()
                .chain(binary)
                .find(|(p, _)| *p == prefix)
            {
                return Some(Unit {
                    scale: b.scale * factor,
                    dimension: b.dimension,
                });
            }
        }
        None
    }

    /// Parse one factor such as `arcsec`, `s^-2`, `m**3` or `arcsec2`.
    fn parse_factor(&self, full: &str, factor: &str) -> Result<(Unit, i32)> {
        let (symbol, power) = if let Some((symbol, exp)) = factor.split_once('^') {
            let power = exp
                .parse::<i32>()
                .map_err(|_| invalid(full, format!("bad exponent in {factor:?}")))?;
            (symbol, power)
        } else {
            let split = factor
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit() || *c == '-' || *c == '+')
                .last()
                .map(|(i, _)| i)
                .unwrap_or(factor.len());
            if split == factor.len() || split == 0 {
                (factor, 1)
            } else {
                let power = factor[split..]
                    .parse::<i32>()
                    .map_err(|_| invalid(full, format!("bad exponent in {factor:?}")))?;
                (&factor[..split], power)
            }
        };

        let unit = self
            .lookup(symbol)
            .ok_or_else(|| invalid(full, format!("unknown unit {symbol:?}")))?;
        Ok((unit, power))
    }

    fn parse_product(&self, full: &str, part: &str, sign: i32, acc: Unit) -> Result<Unit> {
        let mut acc = acc;
        let mut saw_factor = false;
        for factor in part
            .split(|c: char| c == '*' || c == '.' || c.is_whitespace())
            .filter(|f| !f.is_empty())
        {
            let (unit, power) = self.parse_factor(full, factor)?;
            acc = acc
                .times(unit, power * sign)
                .ok_or_else(|| invalid(full, "exponent out of range"))?;
            saw_factor = true;
        }
        if !saw_factor {
            return Err(invalid(full, "empty factor"));
        }
        Ok(acc)
    }
}

impl UnitSystem for StandardUnits {
    fn parse(&self, unit: &str) -> Result<Unit> {
        let trimmed = unit.trim();
        if trimmed.is_empty() {
            return Ok(Unit::DIMENSIONLESS);
        }
        if let Some(u) = self.lookup(trimmed) {
            return Ok(u);
        }

        let normalized = trimmed.replace("**", "^");
        let mut parts = normalized.split('/');
        let numerator = parts.next().unwrap_or_default();
        let mut acc = self.parse_product(unit, numerator, 1, Unit::DIMENSIONLESS)?;
        for denominator in parts {
            acc = self.parse_product(unit, denominator, -1, acc)?;
        }
        Ok(acc)
    }
}
