use fnv::FnvHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignment::{align, Alignment};
use crate::candidates::{CrossLinker, Enumerator, LinkCandidate, Offset};
use crate::database::IndexedDatabase;
use crate::fragments::{
    Chain, Fidelity, FragmentGenerator, IonClass, LinkedIonGenerator, TheoreticalPeak,
};
use crate::ion_series::Kind;
use crate::mass::Tolerance;
use crate::spectrum::ProcessedSpectrum;
use crate::statistics::{log_occupancy, match_odds, weighted_tic, xcorr_prescore};
use crate::topk::TopK;
use crate::Error;

/// Bin width (Th) of the tables used for cross-correlation
const XCORR_BIN: f32 = 0.1;

/// Weights of the fast score, `odds * ln(floor + match_odds) - error * |ppm|`
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescoreWeights {
    pub odds: f64,
    pub error: f64,
    pub floor: f64,
}

impl Default for PrescoreWeights {
    fn default() -> Self {
        Self {
            odds: 0.2,
            error: 0.03,
            floor: 1E-7,
        }
    }
}

/// Weights of the linear combination used as the final score
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub xcorr_xlink: f64,
    pub xcorr_common: f64,
    pub match_odds: f64,
    pub wtic: f64,
    pub intsum: f64,
    pub log_occupancy: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            xcorr_xlink: 2.488,
            xcorr_common: 21.279,
            match_odds: 1.973,
            wtic: 12.829,
            intsum: 1.8,
            log_occupancy: 0.0,
        }
    }
}

impl PrescoreWeights {
    fn is_finite(&self) -> bool {
        self.odds.is_finite() && self.error.is_finite() && self.floor.is_finite() && self.floor > 0.0
    }
}

impl ScoreWeights {
    fn is_finite(&self) -> bool {
        [
            self.xcorr_xlink,
            self.xcorr_common,
            self.match_odds,
            self.wtic,
            self.intsum,
            self.log_occupancy,
        ]
        .iter()
        .all(|w| w.is_finite())
    }
}

#[derive(Deserialize, Default, Clone, Debug)]
/// User-facing scoring configuration; missing values take defaults
pub struct Builder {
    pub precursor_tol: Option<Tolerance>,
    pub fragment_tol: Option<Tolerance>,
    /// Fragment tolerance for ions carrying the cross-link, defaults to `fragment_tol`
    pub fragment_tol_xlinks: Option<Tolerance>,
    /// Precursor isotope corrections; later entries are preferred on ties
    pub corrections: Option<Vec<i8>>,
    /// Optional adduct masses, tried with every correction
    pub adducts: Option<Vec<f32>>,
    pub linker: Option<CrossLinker>,
    pub ion_kinds: Option<Vec<Kind>>,
    /// Minimum number of matched linear ions per chain to pass the prescore
    pub min_matched_linear: Option<usize>,
    /// Number of PSMs to report per spectrum
    pub report_psms: Option<usize>,
    /// Number of prescored candidates that are fully scored
    pub prescore_hits: Option<usize>,
    pub prescore_weights: Option<PrescoreWeights>,
    pub score_weights: Option<ScoreWeights>,
    /// Report matched fragment annotations
    pub annotate_matches: Option<bool>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub precursor_tol: Tolerance,
    pub fragment_tol: Tolerance,
    pub fragment_tol_xlinks: Tolerance,
    pub corrections: Vec<i8>,
    pub adducts: Vec<f32>,
    /// Corrections x adducts, in the order they are tried
    pub offsets: Vec<Offset>,
    pub linker: CrossLinker,
    pub ion_kinds: Vec<Kind>,
    pub min_matched_linear: usize,
    pub report_psms: usize,
    pub prescore_hits: usize,
    pub prescore_weights: PrescoreWeights,
    pub score_weights: ScoreWeights,
    pub annotate_matches: bool,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let precursor_tol = self.precursor_tol.unwrap_or(Tolerance::Ppm(-10.0, 10.0));
        let fragment_tol = self.fragment_tol.unwrap_or(Tolerance::Ppm(-20.0, 20.0));
        let fragment_tol_xlinks = self.fragment_tol_xlinks.unwrap_or(fragment_tol);
        precursor_tol.validate("precursor_tol")?;
        fragment_tol.validate("fragment_tol")?;
        fragment_tol_xlinks.validate("fragment_tol_xlinks")?;

        let corrections = self.corrections.unwrap_or_else(|| vec![2, 1, 0]);
        if corrections.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one precursor correction is required".into(),
            ));
        }
        let adducts = self.adducts.unwrap_or_default();
        if adducts.iter().any(|a| !a.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "adduct masses must be finite: {:?}",
                adducts
            )));
        }

        let linker = self.linker.unwrap_or_default();
        linker.validate()?;

        let ion_kinds = self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]);
        if ion_kinds.is_empty() {
            return Err(Error::InvalidParameter(
                "at least one ion kind is required".into(),
            ));
        }

        let report_psms = self.report_psms.unwrap_or(5);
        let prescore_hits = self.prescore_hits.unwrap_or(report_psms);
        if report_psms == 0 || prescore_hits == 0 {
            return Err(Error::InvalidParameter(
                "`report_psms` and `prescore_hits` must be at least 1".into(),
            ));
        }
        if prescore_hits < report_psms {
            log::warn!(
                "`prescore_hits` ({}) is less than `report_psms` ({}), at most {} PSMs will be reported per spectrum",
                prescore_hits,
                report_psms,
                prescore_hits
            );
        }

        let prescore_weights = self.prescore_weights.unwrap_or_default();
        let score_weights = self.score_weights.unwrap_or_default();
        if !prescore_weights.is_finite() || !score_weights.is_finite() {
            return Err(Error::InvalidParameter(
                "scoring weights must be finite, with a positive floor".into(),
            ));
        }

        let offsets = Offset::product(&corrections, &adducts);
        Ok(Parameters {
            precursor_tol,
            fragment_tol,
            fragment_tol_xlinks,
            corrections,
            adducts,
            offsets,
            linker,
            ion_kinds,
            min_matched_linear: self.min_matched_linear.unwrap_or(2),
            report_psms,
            prescore_hits,
            prescore_weights,
            score_weights,
            annotate_matches: self.annotate_matches.unwrap_or(false),
        })
    }
}

/// Result of the fast scoring tier for one candidate
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PreScore {
    pub candidate: LinkCandidate,
    pub score: f64,
    pub match_odds: f64,
    pub precursor_ppm: f32,
    pub matched_linear: usize,
    pub matched_xlink: usize,
}

/// Mean absolute fragment ppm errors
#[derive(Serialize, Default, Copy, Clone, Debug, PartialEq)]
pub struct PpmErrors {
    pub linear_alpha: f32,
    pub linear_beta: f32,
    pub xlink_alpha: f32,
    pub xlink_beta: f32,
    pub alpha: f32,
    pub beta: f32,
    pub linear: f32,
    pub xlink: f32,
    pub mean: f32,
}

/// Matching Fragment details
#[derive(Serialize, Default, Clone, Debug)]
pub struct Fragments {
    pub chains: Vec<Chain>,
    pub classes: Vec<IonClass>,
    pub kinds: Vec<Kind>,
    pub charges: Vec<u8>,
    pub fragment_ordinals: Vec<u16>,
    pub intensities: Vec<f32>,
    pub mz_calculated: Vec<f32>,
    pub mz_experimental: Vec<f32>,
}

#[derive(Serialize, Clone, Debug)]
/// A scored cross-link spectrum match
pub struct CrossLinkMatch {
    pub candidate: LinkCandidate,
    /// Spectrum id
    pub spec_id: String,
    /// File identifier
    pub file_id: usize,
    /// PSM rank
    pub rank: u32,
    /// Target/Decoy label, -1 if any chain is a decoy, 1 otherwise
    pub label: i32,
    /// Experimental mass
    pub expmass: f32,
    /// Calculated mass
    pub calcmass: f32,
    /// Reported precursor charge
    pub charge: u8,
    pub correction: i8,
    pub adduct: f32,
    /// Precursor m/z error, including the correction
    pub precursor_ppm: f32,
    /// Final composite score
    pub score: f64,
    /// Score from the fast tier
    pub fast_score: f64,
    pub xcorrx: f64,
    pub xcorrc: f64,
    pub match_odds: f64,
    pub match_odds_alpha: f64,
    pub match_odds_beta: f64,
    pub log_occupancy: f64,
    pub log_occupancy_alpha: f64,
    pub log_occupancy_beta: f64,
    pub wtic: f64,
    /// Matched intensity, each experimental peak counted once
    pub intsum: f32,
    pub intsum_alpha: f32,
    pub intsum_beta: f32,
    /// Fraction of the total ion current that was matched
    pub matched_intensity_pct: f32,
    pub matched_linear_alpha: u32,
    pub matched_linear_beta: u32,
    pub matched_xlink_alpha: u32,
    pub matched_xlink_beta: u32,
    /// Number of enumerated candidates for this spectrum
    pub candidates: u32,
    /// Number of candidates passing the fast tier
    pub prescored: u32,
    pub ppm_errors: PpmErrors,
    pub fragments: Option<Fragments>,
}

/// Number of cross-link ion charge states considered by the match-odds
/// model. Cross-link ions are at least doubly charged
pub fn n_xlink_charges(precursor_charge: u8) -> u8 {
    precursor_charge.saturating_sub(3).max(1)
}

fn split(peaks: Vec<TheoreticalPeak>) -> (Vec<TheoreticalPeak>, Vec<TheoreticalPeak>) {
    peaks
        .into_iter()
        .partition(|peak| peak.class == IonClass::Linear)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Theoretical peaks of one chain, split by class, and their alignments
struct ChainMatches {
    linear: Vec<TheoreticalPeak>,
    xlink: Vec<TheoreticalPeak>,
    linear_alignment: Alignment,
    xlink_alignment: Alignment,
}

impl ChainMatches {
    fn matched(&self) -> usize {
        self.linear_alignment.len() + self.xlink_alignment.len()
    }

    fn intensity(&self, query: &ProcessedSpectrum) -> f32 {
        self.linear_alignment.intensity(&query.peaks) + self.xlink_alignment.intensity(&query.peaks)
    }

    fn mean_abs_ppm(&self) -> f32 {
        let n = self.matched();
        if n == 0 {
            return 0.0;
        }
        let sum = self
            .linear_alignment
            .ppm_errors
            .iter()
            .chain(&self.xlink_alignment.ppm_errors)
            .map(|ppm| ppm.abs())
            .sum::<f32>();
        sum / n as f32
    }
}

pub struct Scorer<'db, G> {
    pub db: &'db IndexedDatabase,
    pub parameters: Parameters,
    pub generator: G,
}

impl<'db> Scorer<'db, LinkedIonGenerator<'db>> {
    pub fn new(db: &'db IndexedDatabase, parameters: Parameters) -> Self {
        let generator = LinkedIonGenerator::new(db, parameters.ion_kinds.clone());
        Self {
            db,
            parameters,
            generator,
        }
    }
}

impl<'db, G: FragmentGenerator> Scorer<'db, G> {
    pub fn with_generator(db: &'db IndexedDatabase, parameters: Parameters, generator: G) -> Self {
        Self {
            db,
            parameters,
            generator,
        }
    }

    /// All candidates matching the precursor mass of `query`
    pub fn enumerate(&self, query: &ProcessedSpectrum) -> Vec<LinkCandidate> {
        if query.precursor_charge == 0 {
            return Vec::new();
        }
        Enumerator {
            db: self.db,
            linker: &self.parameters.linker,
            offsets: &self.parameters.offsets,
            precursor_tol: self.parameters.precursor_tol,
        }
        .enumerate(query.precursor_mass())
    }

    fn chain_matches(
        &self,
        query: &ProcessedSpectrum,
        candidate: &LinkCandidate,
        chain: Chain,
        fidelity: Fidelity,
    ) -> ChainMatches {
        let peaks = self
            .generator
            .generate(candidate, chain, query.precursor_charge, fidelity);
        let (linear, xlink) = split(peaks);
        let linear_alignment = align(&linear, &query.peaks, self.parameters.fragment_tol);
        let xlink_alignment = align(&xlink, &query.peaks, self.parameters.fragment_tol_xlinks);
        ChainMatches {
            linear,
            xlink,
            linear_alignment,
            xlink_alignment,
        }
    }

    /// Average match-odds over the linear and cross-link subsets of a chain
    fn chain_match_odds(&self, chain: &ChainMatches, xlink_charges: u8) -> f64 {
        let linear = match_odds(
            &chain.linear,
            chain.linear_alignment.len(),
            self.parameters.fragment_tol,
            1,
        );
        let xlink = match_odds(
            &chain.xlink,
            chain.xlink_alignment.len(),
            self.parameters.fragment_tol_xlinks,
            xlink_charges,
        );
        mean(&[linear, xlink])
    }

    fn chain_log_occupancy(&self, chain: &ChainMatches) -> f64 {
        let linear = log_occupancy(
            &chain.linear,
            chain.linear_alignment.len(),
            self.parameters.fragment_tol,
        );
        let xlink = log_occupancy(
            &chain.xlink,
            chain.xlink_alignment.len(),
            self.parameters.fragment_tol_xlinks,
        );
        mean(&[linear, xlink])
    }

    /// Fast tier: score a candidate from a reduced theoretical spectrum.
    /// Returns `None` for candidates without enough linear ion evidence
    pub fn prescore(&self, query: &ProcessedSpectrum, candidate: &LinkCandidate) -> Option<PreScore> {
        let z = query.precursor_charge;
        let min = self.parameters.min_matched_linear;

        let alpha = self.chain_matches(query, candidate, Chain::Alpha, Fidelity::Reduced);
        if alpha.linear.is_empty() || alpha.linear_alignment.len() < min {
            return None;
        }
        let beta = match candidate.is_cross_link() {
            true => {
                let beta = self.chain_matches(query, candidate, Chain::Beta, Fidelity::Reduced);
                if beta.linear_alignment.len() < min {
                    return None;
                }
                Some(beta)
            }
            false => None,
        };
        if alpha.xlink.is_empty() {
            return None;
        }

        let xlink_charges = n_xlink_charges(z);
        let odds = match &beta {
            Some(beta) => mean(&[
                self.chain_match_odds(&alpha, xlink_charges),
                self.chain_match_odds(beta, xlink_charges),
            ]),
            None => self.chain_match_odds(&alpha, xlink_charges),
        };

        let precursor_ppm = candidate.precursor_ppm(query.precursor_mz, z);
        let weights = self.parameters.prescore_weights;
        let score =
            weights.odds * (weights.floor + odds).ln() - weights.error * precursor_ppm.abs() as f64;
        if !score.is_finite() {
            return None;
        }

        let beta = beta.as_ref();
        Some(PreScore {
            candidate: *candidate,
            score,
            match_odds: odds,
            precursor_ppm,
            matched_linear: alpha.linear_alignment.len()
                + beta.map(|b| b.linear_alignment.len()).unwrap_or_default(),
            matched_xlink: alpha.xlink_alignment.len()
                + beta.map(|b| b.xlink_alignment.len()).unwrap_or_default(),
        })
    }

    /// Prescore all candidates in parallel, keeping the best `prescore_hits`
    /// by descending fast score (discovery order on ties)
    pub fn prescore_candidates(
        &self,
        query: &ProcessedSpectrum,
        candidates: &[LinkCandidate],
    ) -> Vec<PreScore> {
        let mut prescores = candidates
            .par_iter()
            .filter_map(|candidate| self.prescore(query, candidate))
            .collect::<Vec<_>>();
        prescores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.candidate.order.cmp(&b.candidate.order))
        });
        prescores.truncate(self.parameters.prescore_hits);
        prescores
    }

    /// Full tier: compute the complete score vector of a prescored candidate.
    /// Returns `None` if a chain has no matched peaks, or the score is not finite
    pub fn score_candidate(&self, query: &ProcessedSpectrum, pre: &PreScore) -> Option<CrossLinkMatch> {
        let candidate = &pre.candidate;
        let z = query.precursor_charge;
        let is_cross_link = candidate.is_cross_link();

        let alpha = self.chain_matches(query, candidate, Chain::Alpha, Fidelity::Full);
        let beta = match is_cross_link {
            true => self.chain_matches(query, candidate, Chain::Beta, Fidelity::Full),
            false => ChainMatches {
                linear: Vec::new(),
                xlink: Vec::new(),
                linear_alignment: Alignment::default(),
                xlink_alignment: Alignment::default(),
            },
        };
        if alpha.matched() == 0 || (is_cross_link && beta.matched() == 0) {
            return None;
        }

        // Matched intensity, counting every experimental peak once
        let mut unique = FnvHashSet::default();
        let intsum = [
            &alpha.linear_alignment,
            &alpha.xlink_alignment,
            &beta.linear_alignment,
            &beta.xlink_alignment,
        ]
        .iter()
        .flat_map(|alignment| alignment.pairs.iter().map(|(_, exp)| *exp))
        .filter(|exp| unique.insert(*exp))
        .map(|exp| query.peaks[exp].intensity)
        .sum::<f32>();

        let (raw_alpha, raw_beta) = (alpha.intensity(query), beta.intensity(query));
        let (intsum_alpha, intsum_beta) = match raw_alpha + raw_beta > 0.0 {
            true => {
                let total = raw_alpha + raw_beta;
                (raw_alpha * intsum / total, raw_beta * intsum / total)
            }
            false => (0.0, 0.0),
        };

        let alpha_peptide = &self.db[candidate.alpha()];
        let beta_peptide = candidate.beta().map(|ix| &self.db[ix]);
        let wtic = weighted_tic(
            alpha_peptide.len(),
            beta_peptide.map(|p| p.len()).unwrap_or_default(),
            intsum_alpha,
            intsum_beta,
            query.total_ion_current,
            is_cross_link,
        );
        let matched_intensity_pct = match query.total_ion_current > 0.0 {
            true => intsum / query.total_ion_current,
            false => 0.0,
        };

        let xlink_charges = n_xlink_charges(z);
        let match_odds_alpha = self.chain_match_odds(&alpha, xlink_charges);
        let log_occupancy_alpha = self.chain_log_occupancy(&alpha);
        let (match_odds_beta, log_occupancy_beta, match_odds, log_occupancy) = match is_cross_link
        {
            true => {
                let odds = self.chain_match_odds(&beta, xlink_charges);
                let occupancy = self.chain_log_occupancy(&beta);
                (
                    odds,
                    occupancy,
                    mean(&[match_odds_alpha, odds]),
                    mean(&[log_occupancy_alpha, occupancy]),
                )
            }
            false => (0.0, 0.0, match_odds_alpha, log_occupancy_alpha),
        };

        let experimental = query.peaks.iter().map(|peak| peak.mz).collect::<Vec<_>>();
        let linear_mz = alpha
            .linear
            .iter()
            .chain(&beta.linear)
            .map(|peak| peak.mz)
            .collect::<Vec<_>>();
        let xlink_mz = alpha
            .xlink
            .iter()
            .chain(&beta.xlink)
            .map(|peak| peak.mz)
            .collect::<Vec<_>>();
        let xcorrx = xcorr_prescore(&experimental, &xlink_mz, XCORR_BIN);
        let xcorrc = xcorr_prescore(&experimental, &linear_mz, XCORR_BIN);

        let weights = self.parameters.score_weights;
        let score = weights.xcorr_xlink * xcorrx
            + weights.xcorr_common * xcorrc
            + weights.match_odds * match_odds
            + weights.wtic * wtic
            + weights.intsum * matched_intensity_pct as f64
            + weights.log_occupancy * log_occupancy;
        if !score.is_finite() {
            return None;
        }

        let ppm_errors = self.ppm_errors(&alpha, &beta);
        let fragments = match self.parameters.annotate_matches {
            true => Some(Self::fragments(query, [&alpha, &beta])),
            false => None,
        };

        let decoy = alpha_peptide.decoy || beta_peptide.map(|p| p.decoy).unwrap_or(false);
        Some(CrossLinkMatch {
            candidate: *candidate,
            spec_id: query.id.clone(),
            file_id: query.file_id,
            rank: 0,
            label: if decoy { -1 } else { 1 },
            expmass: query.precursor_mass(),
            calcmass: candidate.monoisotopic,
            charge: z,
            correction: candidate.offset.correction,
            adduct: candidate.offset.adduct,
            precursor_ppm: pre.precursor_ppm,
            score,
            fast_score: pre.score,
            xcorrx,
            xcorrc,
            match_odds,
            match_odds_alpha,
            match_odds_beta,
            log_occupancy,
            log_occupancy_alpha,
            log_occupancy_beta,
            wtic,
            intsum,
            intsum_alpha,
            intsum_beta,
            matched_intensity_pct,
            matched_linear_alpha: alpha.linear_alignment.len() as u32,
            matched_linear_beta: beta.linear_alignment.len() as u32,
            matched_xlink_alpha: alpha.xlink_alignment.len() as u32,
            matched_xlink_beta: beta.xlink_alignment.len() as u32,
            candidates: 0,
            prescored: 0,
            ppm_errors,
            fragments,
        })
    }

    fn ppm_errors(&self, alpha: &ChainMatches, beta: &ChainMatches) -> PpmErrors {
        let all = [
            &alpha.linear_alignment,
            &beta.linear_alignment,
            &alpha.xlink_alignment,
            &beta.xlink_alignment,
        ];
        let mean_of = |alignments: &[&Alignment]| {
            let n = alignments.iter().map(|a| a.len()).sum::<usize>();
            if n == 0 {
                return 0.0;
            }
            alignments
                .iter()
                .flat_map(|a| a.ppm_errors.iter())
                .map(|ppm| ppm.abs())
                .sum::<f32>()
                / n as f32
        };
        PpmErrors {
            linear_alpha: alpha.linear_alignment.mean_abs_ppm(),
            linear_beta: beta.linear_alignment.mean_abs_ppm(),
            xlink_alpha: alpha.xlink_alignment.mean_abs_ppm(),
            xlink_beta: beta.xlink_alignment.mean_abs_ppm(),
            alpha: alpha.mean_abs_ppm(),
            beta: beta.mean_abs_ppm(),
            linear: mean_of(&all[..2]),
            xlink: mean_of(&all[2..]),
            mean: mean_of(&all),
        }
    }

    fn fragments(query: &ProcessedSpectrum, chains: [&ChainMatches; 2]) -> Fragments {
        let mut fragments = Fragments::default();
        for chain in chains {
            for (peaks, alignment) in [
                (&chain.linear, &chain.linear_alignment),
                (&chain.xlink, &chain.xlink_alignment),
            ] {
                for (theo, exp) in &alignment.pairs {
                    let theoretical = &peaks[*theo];
                    let experimental = &query.peaks[*exp];
                    fragments.chains.push(theoretical.chain);
                    fragments.classes.push(theoretical.class);
                    fragments.kinds.push(theoretical.kind);
                    fragments.charges.push(theoretical.charge);
                    fragments.fragment_ordinals.push(theoretical.ordinal);
                    fragments.intensities.push(experimental.intensity);
                    fragments.mz_calculated.push(theoretical.mz);
                    fragments.mz_experimental.push(experimental.mz);
                }
            }
        }
        fragments
    }

    /// Fully score prescored candidates in parallel, keeping the best
    /// `report_psms`. Returned matches are ranked 1..n by descending score
    pub fn score_candidates(
        &self,
        query: &ProcessedSpectrum,
        prescores: &[PreScore],
        enumerated: usize,
    ) -> Vec<CrossLinkMatch> {
        let topk = TopK::new(self.parameters.report_psms);
        prescores.par_iter().for_each(|pre| {
            if let Some(csm) = self.score_candidate(query, pre) {
                topk.insert(csm.score, pre.candidate.order, csm);
            }
        });

        let mut matches = topk.into_sorted_vec();
        for (idx, csm) in matches.iter_mut().enumerate() {
            csm.rank = idx as u32 + 1;
            csm.candidates = enumerated as u32;
            csm.prescored = prescores.len() as u32;
        }
        matches
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidates::Link;
    use crate::database::PeptideIx;
    use crate::peptide::Peptide;
    use crate::spectrum::Peak;

    fn database() -> IndexedDatabase {
        IndexedDatabase::new(
            ["LESKEEVR", "VLSKTEAR", "GDKAPLTR", "KLEVK"]
                .iter()
                .map(|s| Peptide::new(s, false).unwrap())
                .collect(),
        )
    }

    fn find(db: &IndexedDatabase, sequence: &str) -> PeptideIx {
        db.iter()
            .find(|(_, p)| p.sequence.as_ref() == sequence.as_bytes())
            .map(|(ix, _)| ix)
            .unwrap()
    }

    fn cross_link(db: &IndexedDatabase, parameters: &Parameters) -> LinkCandidate {
        // Equal lengths, LESKEEVR is heavier
        let alpha = find(db, "LESKEEVR");
        let beta = find(db, "VLSKTEAR");
        LinkCandidate {
            link: Link::Cross {
                alpha,
                beta,
                alpha_site: 3,
                beta_site: 3,
            },
            offset: Offset {
                correction: 0,
                adduct: 0.0,
            },
            monoisotopic: db[alpha].monoisotopic + db[beta].monoisotopic + parameters.linker.mass,
            order: 0,
        }
    }

    /// A spectrum containing exactly the full theoretical peaks of `candidate`
    fn synthetic<G: FragmentGenerator>(
        scorer: &Scorer<G>,
        candidate: &LinkCandidate,
        charge: u8,
    ) -> ProcessedSpectrum {
        let mut peaks = [Chain::Alpha, Chain::Beta]
            .iter()
            .flat_map(|chain| {
                scorer
                    .generator
                    .generate(candidate, *chain, charge, Fidelity::Full)
            })
            .map(|peak| Peak {
                mz: peak.mz,
                intensity: 100.0 * peak.intensity,
                charge: None,
            })
            .collect::<Vec<_>>();
        // Both chains end in R: y1 ions coincide
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        peaks.dedup_by(|a, b| (a.mz - b.mz).abs() < 1E-4);
        ProcessedSpectrum::new("scan=1", 0, candidate.precursor_mz(charge), charge, peaks)
    }

    #[test]
    fn default_parameters() {
        let parameters: Builder = serde_json::from_str("{}").unwrap();
        let parameters = parameters.make_parameters().unwrap();
        assert_eq!(parameters.report_psms, 5);
        assert_eq!(parameters.prescore_hits, 5);
        assert_eq!(parameters.fragment_tol_xlinks, parameters.fragment_tol);
        assert_eq!(parameters.corrections, vec![2, 1, 0]);
        assert_eq!(
            parameters
                .offsets
                .iter()
                .map(|o| o.correction)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(parameters.score_weights, ScoreWeights::default());
        assert!(!parameters.annotate_matches);
    }

    #[test]
    fn parameters_from_json() {
        let parameters: Builder = serde_json::from_str(
            r#"{
                "precursor_tol": { "da": [-0.02, 0.02] },
                "fragment_tol_xlinks": { "ppm": [-30, 30] },
                "corrections": [1, 0],
                "adducts": [21.98],
                "report_psms": 2,
                "prescore_hits": 10,
                "score_weights": { "log_occupancy": 1.5 }
            }"#,
        )
        .unwrap();
        let parameters = parameters.make_parameters().unwrap();
        assert_eq!(parameters.precursor_tol, Tolerance::Da(-0.02, 0.02));
        assert_eq!(parameters.fragment_tol_xlinks, Tolerance::Ppm(-30.0, 30.0));
        assert_eq!(parameters.offsets.len(), 4);
        assert_eq!(parameters.prescore_hits, 10);
        assert_eq!(parameters.score_weights.log_occupancy, 1.5);
        assert_eq!(parameters.score_weights.wtic, 12.829);
    }

    #[test]
    fn invalid_parameters() {
        let invalid = [
            Builder {
                report_psms: Some(0),
                ..Default::default()
            },
            Builder {
                precursor_tol: Some(Tolerance::Ppm(10.0, -10.0)),
                ..Default::default()
            },
            Builder {
                fragment_tol: Some(Tolerance::Da(0.0, 0.0)),
                ..Default::default()
            },
            Builder {
                corrections: Some(vec![]),
                ..Default::default()
            },
            Builder {
                ion_kinds: Some(vec![]),
                ..Default::default()
            },
            Builder {
                adducts: Some(vec![f32::NAN]),
                ..Default::default()
            },
            Builder {
                score_weights: Some(ScoreWeights {
                    wtic: f64::INFINITY,
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];
        for builder in invalid {
            assert!(builder.make_parameters().is_err());
        }
        assert!(serde_json::from_str::<Builder>(r#"{"precursor_tol": {"mmu": [-1, 1]}}"#).is_err());
    }

    #[test]
    fn xlink_charge_states() {
        assert_eq!(n_xlink_charges(0), 1);
        assert_eq!(n_xlink_charges(3), 1);
        assert_eq!(n_xlink_charges(4), 1);
        assert_eq!(n_xlink_charges(6), 3);
    }

    #[test]
    fn prescore_requires_linear_evidence() {
        let db = database();
        let scorer = Scorer::new(&db, Builder::default().make_parameters().unwrap());
        let candidate = cross_link(&db, &scorer.parameters);

        let empty = ProcessedSpectrum::new("empty", 0, candidate.precursor_mz(3), 3, vec![]);
        assert!(scorer.prescore(&empty, &candidate).is_none());

        let query = synthetic(&scorer, &candidate, 3);
        let pre = scorer.prescore(&query, &candidate).unwrap();
        assert!(pre.matched_linear >= 4);
        assert!(pre.matched_xlink > 0);
        assert!(pre.precursor_ppm.abs() < 1.0);
        assert!(pre.match_odds > 0.0);
        assert!(pre.score.is_finite());
    }

    #[test]
    fn full_score_of_true_candidate() {
        let db = database();
        let parameters = Builder {
            annotate_matches: Some(true),
            ..Default::default()
        }
        .make_parameters()
        .unwrap();
        let scorer = Scorer::new(&db, parameters);
        let candidate = cross_link(&db, &scorer.parameters);
        let query = synthetic(&scorer, &candidate, 3);

        let pre = scorer.prescore(&query, &candidate).unwrap();
        let csm = scorer.score_candidate(&query, &pre).unwrap();
        assert!(csm.score.is_finite() && csm.score > 0.0);
        assert!(csm.matched_linear_alpha > 0 && csm.matched_linear_beta > 0);
        assert!(csm.matched_xlink_alpha > 0 && csm.matched_xlink_beta > 0);
        assert!(csm.matched_intensity_pct > 0.99);
        assert!((csm.intsum_alpha + csm.intsum_beta - csm.intsum).abs() < 1E-2);
        assert!(csm.xcorrc > 0.0 && csm.xcorrx > 0.0);
        assert!(csm.ppm_errors.mean < 1.0);
        assert_eq!(csm.label, 1);
        assert_eq!(csm.correction, 0);

        let fragments = csm.fragments.unwrap();
        let matched = (csm.matched_linear_alpha
            + csm.matched_linear_beta
            + csm.matched_xlink_alpha
            + csm.matched_xlink_beta) as usize;
        assert_eq!(fragments.mz_calculated.len(), matched);
        assert_eq!(fragments.kinds.len(), matched);
    }

    #[test]
    fn composite_not_dominated_by_match_odds() {
        let db = database();
        let scorer = Scorer::new(&db, Builder::default().make_parameters().unwrap());
        let candidate = cross_link(&db, &scorer.parameters);
        let query = synthetic(&scorer, &candidate, 4);

        let pre = scorer.prescore(&query, &candidate).unwrap();
        let csm = scorer.score_candidate(&query, &pre).unwrap();
        let weights = scorer.parameters.score_weights;

        assert!(csm.match_odds > 0.0 && csm.match_odds <= 11.52);
        let odds_term = weights.match_odds * csm.match_odds;
        let evidence = weights.xcorr_common * csm.xcorrc + weights.wtic * csm.wtic;
        assert!(odds_term < evidence, "{} vs {}", odds_term, evidence);
        assert!(odds_term < csm.score / 2.0, "{} of {}", odds_term, csm.score);
    }

    #[test]
    fn degenerate_loop_is_dropped() {
        let db = database();
        let scorer = Scorer::new(&db, Builder::default().make_parameters().unwrap());
        let peptide = find(&db, "KLEVK");
        let candidate = LinkCandidate {
            link: Link::Loop {
                peptide,
                first: 0,
                second: 4,
            },
            offset: Offset {
                correction: 0,
                adduct: 0.0,
            },
            monoisotopic: db[peptide].monoisotopic + scorer.parameters.linker.mass,
            order: 0,
        };
        let query = synthetic(&scorer, &cross_link(&db, &scorer.parameters), 3);
        assert!(scorer.prescore(&query, &candidate).is_none());

        let pre = PreScore {
            candidate,
            score: 0.0,
            match_odds: 0.0,
            precursor_ppm: 0.0,
            matched_linear: 0,
            matched_xlink: 0,
        };
        assert!(scorer.score_candidate(&query, &pre).is_none());
    }

    #[test]
    fn ranked_and_bounded() {
        let db = database();
        let parameters = Builder {
            report_psms: Some(1),
            prescore_hits: Some(8),
            ..Default::default()
        }
        .make_parameters()
        .unwrap();
        let scorer = Scorer::new(&db, parameters);
        let candidate = cross_link(&db, &scorer.parameters);
        let query = synthetic(&scorer, &candidate, 3);

        let candidates = scorer.enumerate(&query);
        assert!(candidates
            .iter()
            .any(|c| c.link == candidate.link && c.correction() == 0));

        let prescores = scorer.prescore_candidates(&query, &candidates);
        assert!(prescores.len() <= 8);
        assert!(prescores.windows(2).all(|w| w[0].score >= w[1].score));

        let matches = scorer.score_candidates(&query, &prescores, candidates.len());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rank, 1);
        assert_eq!(matches[0].candidate.link, candidate.link);
        assert_eq!(matches[0].candidates as usize, candidates.len());
    }
}
