use statrs::distribution::{Binomial, DiscreteCDF};

use crate::fragments::TheoreticalPeak;
use crate::mass::Tolerance;

/// Added to tail probabilities before taking the log, which caps every
/// binomial score at `-ln(1e-5)`
const TAIL_FLOOR: f64 = 1E-5;

/// Upper tail of the binomial distribution, P[X >= k], as a non-negative
/// log score
fn binomial_tail_score(n: usize, p: f64, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    match Binomial::new(p, n as u64) {
        Ok(binomial) => {
            let tail = binomial.sf(k as u64 - 1);
            (-(tail + TAIL_FLOOR).ln()).max(0.0)
        }
        Err(_) => 0.0,
    }
}

fn mz_range(theoretical: &[TheoreticalPeak]) -> Option<(f32, f32, f32)> {
    let first = theoretical.first()?.mz;
    let last = theoretical.last()?.mz;
    let mean = theoretical.iter().map(|peak| peak.mz).sum::<f32>() / theoretical.len() as f32;
    Some((first, last, mean))
}

/// How unlikely is matching `matched` of the (m/z sorted) theoretical peaks
/// by chance? Each peak matches randomly with a probability given by the
/// fraction of the m/z range covered by the tolerance windows of the
/// peaks of one charge state
pub fn match_odds(
    theoretical: &[TheoreticalPeak],
    matched: usize,
    tolerance: Tolerance,
    n_charges: u8,
) -> f64 {
    let n = theoretical.len();
    let (first, last, mean) = match mz_range(theoretical) {
        Some(x) => x,
        None => return 0.0,
    };
    let range = (last - first) as f64;
    if matched == 0 || range <= 0.0 {
        return 0.0;
    }
    let t = tolerance.half_width(mean) as f64;
    let base = (1.0 - 2.0 * t / (0.5 * range)).clamp(0.0, 1.0);
    let p = 1.0 - base.powf(n as f64 / n_charges.max(1) as f64);
    binomial_tail_score(n, p, matched)
}

/// Like [`match_odds`], but models peak placement as uniform over the m/z
/// axis, which is logarithmic for relative tolerances
pub fn log_occupancy(theoretical: &[TheoreticalPeak], matched: usize, tolerance: Tolerance) -> f64 {
    let n = theoretical.len();
    let (first, last, mean) = match mz_range(theoretical) {
        Some(x) => x,
        None => return 0.0,
    };
    if matched == 0 || first <= 0.0 {
        return 0.0;
    }
    let (range, t) = match tolerance {
        Tolerance::Ppm(_, _) => (
            (last as f64).ln() - (first as f64).ln(),
            tolerance.relative_half_width(mean),
        ),
        Tolerance::Da(_, _) => ((last - first) as f64, tolerance.half_width(mean) as f64),
    };
    if range <= 0.0 {
        return 0.0;
    }
    let base = (1.0 - 2.0 * t / range).clamp(0.0, 1.0);
    let p = 1.0 - base.powi(n as i32);
    binomial_tail_score(n, p, matched)
}

/// Fraction of the total ion current explained by matched peaks. For
/// cross-links, each chain is weighted by the length of the shorter chain
/// relative to its own length
pub fn weighted_tic(
    len_alpha: usize,
    len_beta: usize,
    intensity_alpha: f32,
    intensity_beta: f32,
    total_ion_current: f32,
    is_cross_link: bool,
) -> f64 {
    if total_ion_current <= 0.0 || len_alpha == 0 {
        return 0.0;
    }
    let tic = total_ion_current as f64;
    if !is_cross_link || len_beta == 0 {
        return intensity_alpha as f64 / tic;
    }
    let min = len_alpha.min(len_beta) as f64;
    (min / len_alpha as f64) * intensity_alpha as f64 / tic
        + (min / len_beta as f64) * intensity_beta as f64 / tic
}

/// Zero-offset cross-correlation of two peak lists rendered as binary
/// occupancy tables with `bin` Th wide bins, normalised by the smaller
/// peak count
pub fn xcorr_prescore(experimental: &[f32], theoretical: &[f32], bin: f32) -> f64 {
    if experimental.is_empty() || theoretical.is_empty() || bin <= 0.0 {
        return 0.0;
    }
    let (min, max) = experimental
        .iter()
        .chain(theoretical)
        .fold((f32::MAX, f32::MIN), |(min, max), mz| {
            (min.min(*mz), max.max(*mz))
        });
    let size = ((max - min) / bin).ceil() as usize + 1;

    let render = |mz: &[f32]| {
        let mut table = vec![false; size];
        for x in mz {
            let idx = ((x - min) / bin).ceil() as usize;
            if let Some(slot) = table.get_mut(idx) {
                *slot = true;
            }
        }
        table
    };
    let a = render(experimental);
    let b = render(theoretical);
    let dot = a.iter().zip(&b).filter(|(x, y)| **x && **y).count();
    dot as f64 / experimental.len().min(theoretical.len()) as f64
}
