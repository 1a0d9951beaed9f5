use serde::{Deserialize, Serialize};

use crate::database::binary_search_slice;
use crate::mass::{Tolerance, PROTON};

/// A centroided peak, optionally annotated with a charge state by upstream
/// deisotoping
#[derive(PartialEq, PartialOrd, Copy, Clone, Default, Debug, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f32,
    pub intensity: f32,
    pub charge: Option<u8>,
}

#[derive(Clone, Default, Debug, Serialize)]
pub struct ProcessedSpectrum {
    /// Scan ID
    pub id: String,
    /// File ID
    pub file_id: usize,
    pub precursor_mz: f32,
    pub precursor_charge: u8,
    /// MS peaks, sorted by m/z in ascending order
    pub peaks: Vec<Peak>,
    /// Total ion current
    pub total_ion_current: f32,
}

impl ProcessedSpectrum {
    /// Peaks with a negative or non-finite intensity or m/z are discarded;
    /// the remainder are sorted by m/z
    pub fn new<S: Into<String>>(
        id: S,
        file_id: usize,
        precursor_mz: f32,
        precursor_charge: u8,
        mut peaks: Vec<Peak>,
    ) -> Self {
        peaks.retain(|peak| {
            peak.mz.is_finite() && peak.intensity.is_finite() && peak.intensity >= 0.0
        });
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        let total_ion_current = peaks.iter().map(|peak| peak.intensity).sum::<f32>();
        Self {
            id: id.into(),
            file_id,
            precursor_mz,
            precursor_charge,
            peaks,
            total_ion_current,
        }
    }

    /// Neutral precursor mass, [M] instead of [M+zH]
    pub fn precursor_mass(&self) -> f32 {
        (self.precursor_mz - PROTON) * self.precursor_charge as f32
    }
}

/// Binary search followed by linear search to select the closest peak to `mz` within `tolerance` window.
/// Peaks annotated with a charge state only match theoretical ions of the same charge.
/// Equidistant peaks resolve to the one with lower m/z
pub fn select_closest_peak(
    peaks: &[Peak],
    mz: f32,
    charge: u8,
    tolerance: Tolerance,
) -> Option<usize> {
    let (lo, hi) = tolerance.bounds(mz);
    let (i, j) = binary_search_slice(peaks, |peak, query| peak.mz.total_cmp(query), lo, hi);

    let mut best_peak = None;
    let mut min_eps = f32::MAX;
    for (idx, peak) in peaks[i..j].iter().enumerate() {
        if peak.mz < lo || peak.mz > hi {
            continue;
        }
        if peak.charge.map(|c| c != charge).unwrap_or(false) {
            continue;
        }
        let eps = (peak.mz - mz).abs();
        if eps < min_eps {
            min_eps = eps;
            best_peak = Some(i + idx);
        }
    }
    best_peak
}
