use crate::fragments::TheoreticalPeak;
use crate::mass::{ppm_error, Tolerance};
use crate::spectrum::{select_closest_peak, Peak};

/// Matched (theoretical, experimental) peak indices, in theoretical order,
/// with the signed relative error of each match
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Alignment {
    pub pairs: Vec<(usize, usize)>,
    pub ppm_errors: Vec<f32>,
}

impl Alignment {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Mean absolute ppm error, or 0 if nothing matched
    pub fn mean_abs_ppm(&self) -> f32 {
        mean_abs(self.ppm_errors.iter().copied())
    }

    /// Mean absolute ppm error of the matches whose theoretical peak
    /// satisfies `filter`
    pub fn mean_abs_ppm_where<F>(&self, theoretical: &[TheoreticalPeak], filter: F) -> f32
    where
        F: Fn(&TheoreticalPeak) -> bool,
    {
        mean_abs(
            self.pairs
                .iter()
                .zip(&self.ppm_errors)
                .filter(|((t, _), _)| filter(&theoretical[*t]))
                .map(|(_, ppm)| *ppm),
        )
    }

    /// Summed intensity of the matched experimental peaks
    pub fn intensity(&self, experimental: &[Peak]) -> f32 {
        self.pairs
            .iter()
            .map(|(_, e)| experimental[*e].intensity)
            .sum()
    }

    /// Number of matches whose theoretical peak satisfies `filter`
    pub fn count_where<F>(&self, theoretical: &[TheoreticalPeak], filter: F) -> usize
    where
        F: Fn(&TheoreticalPeak) -> bool,
    {
        self.pairs
            .iter()
            .filter(|(t, _)| filter(&theoretical[*t]))
            .count()
    }
}

fn mean_abs<I: Iterator<Item = f32>>(iter: I) -> f32 {
    let (sum, n) = iter.fold((0.0, 0usize), |(sum, n), x| (sum + x.abs(), n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

/// Match every theoretical peak to its nearest experimental peak within
/// `tolerance`. Several theoretical peaks may match the same experimental peak
pub fn align(theoretical: &[TheoreticalPeak], experimental: &[Peak], tolerance: Tolerance) -> Alignment {
    let mut alignment = Alignment::default();
    if experimental.is_empty() {
        return alignment;
    }
    for (idx, peak) in theoretical.iter().enumerate() {
        if let Some(exp) = select_closest_peak(experimental, peak.mz, peak.charge, tolerance) {
            alignment.pairs.push((idx, exp));
            alignment
                .ppm_errors
                .push(ppm_error(peak.mz, experimental[exp].mz));
        }
    }
    alignment
}
