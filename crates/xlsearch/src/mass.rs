use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::Error;

pub const H2O: f32 = 18.010565;
pub const PROTON: f32 = 1.0072764;
/// Mass difference between C13 and C12, i.e. one isotope spacing
pub const NEUTRON: f32 = 1.00335;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f32, f32),
    Da(f32, f32),
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) for for a monoisotopic
    /// mass and a given tolerance
    pub fn bounds(&self, center: f32) -> (f32, f32) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f32, rhs: f32) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }

    /// Half of the window width around `center`, in Da (or Th, for m/z values)
    pub fn half_width(&self, center: f32) -> f32 {
        let (lo, hi) = self.bounds(center);
        (hi - lo) / 2.0
    }

    /// Half of the window width as a relative value (ppm / 1e6), as used on a
    /// logarithmic m/z axis. Absolute tolerances are converted at `center`
    pub fn relative_half_width(&self, center: f32) -> f64 {
        match self {
            Tolerance::Ppm(lo, hi) => (hi - lo) as f64 / 2.0 / 1_000_000.0,
            Tolerance::Da(_, _) => self.half_width(center) as f64 / center as f64,
        }
    }

    pub fn is_ppm(&self) -> bool {
        matches!(self, Tolerance::Ppm(_, _))
    }

    /// A usable window is finite, non-empty, and contains zero
    pub fn validate(&self, name: &str) -> Result<(), Error> {
        let (lo, hi) = match self {
            Tolerance::Ppm(lo, hi) | Tolerance::Da(lo, hi) => (*lo, *hi),
        };
        if lo.is_finite() && hi.is_finite() && lo < hi && lo <= 0.0 && hi >= 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidTolerance {
                name: name.into(),
                tolerance: *self,
            })
        }
    }

    pub fn ppm_to_delta_mass(center: f32, ppm: f32) -> f32 {
        ppm * center / 1_000_000.0
    }
}

impl Mul<f32> for Tolerance {
    type Output = Tolerance;

    fn mul(self, rhs: f32) -> Self::Output {
        match self {
            Tolerance::Ppm(lo, hi) => Tolerance::Ppm(lo * rhs, hi * rhs),
            Tolerance::Da(lo, hi) => Tolerance::Da(lo * rhs, hi * rhs),
        }
    }
}

/// Signed relative error of an observed value against a theoretical one, in ppm
pub fn ppm_error(theoretical: f32, observed: f32) -> f32 {
    (observed - theoretical) / theoretical * 1_000_000.0
}

pub trait Mass {
    fn monoisotopic(&self) -> f32;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f32 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            // Peptides are validated against `VALID_AA` on construction
            _ => 0.0,
        }
    }
}
