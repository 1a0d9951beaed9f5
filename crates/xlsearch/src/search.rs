use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::candidates::global_mass_bound;
use crate::database::IndexedDatabase;
use crate::fragments::FragmentGenerator;
use crate::scoring::{CrossLinkMatch, Parameters, Scorer};
use crate::spectrum::ProcessedSpectrum;

/// How often (in spectra) throughput is logged
const REPORT_EVERY: usize = 1000;

/// Counters for a single search run. Owned by the caller of
/// [`Search::process`], so that separate runs never share state
pub struct Progress {
    spectra: AtomicUsize,
    candidates: AtomicUsize,
    prescored: AtomicUsize,
    matches: AtomicUsize,
    start: Instant,
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub spectra: usize,
    pub candidates: usize,
    pub prescored: usize,
    pub matches: usize,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            spectra: AtomicUsize::new(0),
            candidates: AtomicUsize::new(0),
            prescored: AtomicUsize::new(0),
            matches: AtomicUsize::new(0),
            start: Instant::now(),
        }
    }

    fn record(&self, candidates: usize, prescored: usize, matches: usize) {
        self.candidates.fetch_add(candidates, Ordering::Relaxed);
        self.prescored.fetch_add(prescored, Ordering::Relaxed);
        self.matches.fetch_add(matches, Ordering::Relaxed);
        let n = self.spectra.fetch_add(1, Ordering::Relaxed) + 1;
        if n % REPORT_EVERY == 0 {
            let duration = self.elapsed().as_millis().max(1) as usize;
            log::trace!(
                "- searched {} spectra ({} spectra/s, {} candidates)",
                n,
                n * 1000 / duration,
                self.candidates.load(Ordering::Relaxed)
            );
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            spectra: self.spectra.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            prescored: self.prescored.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
        }
    }
}

/// Ranked matches of one spectrum
#[derive(Serialize, Clone, Debug)]
pub struct SpectrumMatches {
    pub spec_id: String,
    pub file_id: usize,
    pub matches: Vec<CrossLinkMatch>,
}

/// Drop every indexed peptide too heavy to be part of a candidate for any of
/// `spectra`. Returns the number of peptides removed
pub fn restrict_to_spectra(
    db: &mut IndexedDatabase,
    parameters: &Parameters,
    spectra: &[ProcessedSpectrum],
) -> usize {
    let max_precursor = spectra
        .iter()
        .filter(|spectrum| spectrum.precursor_charge > 0)
        .map(|spectrum| spectrum.precursor_mass())
        .filter(|mass| mass.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max_precursor.is_finite() {
        return 0;
    }
    let bound = global_mass_bound(
        max_precursor,
        &parameters.linker,
        &parameters.offsets,
        parameters.precursor_tol,
    );
    let removed = db.restrict(bound);
    log::trace!(
        "restricted index to peptides <= {} Da, removed {}",
        bound,
        removed
    );
    removed
}

pub struct Search<'db, G> {
    pub scorer: Scorer<'db, G>,
}

impl<'db, G: FragmentGenerator> Search<'db, G> {
    pub fn new(scorer: Scorer<'db, G>) -> Self {
        Self { scorer }
    }

    /// Enumerate, prescore, score and rank the candidates of one spectrum.
    /// Both scoring tiers run in parallel over candidates
    pub fn process(&self, query: &ProcessedSpectrum, progress: &Progress) -> Vec<CrossLinkMatch> {
        let candidates = self.scorer.enumerate(query);
        if candidates.is_empty() {
            progress.record(0, 0, 0);
            return Vec::new();
        }
        let prescores = self.scorer.prescore_candidates(query, &candidates);
        let matches = self
            .scorer
            .score_candidates(query, &prescores, candidates.len());
        progress.record(candidates.len(), prescores.len(), matches.len());
        matches
    }

    /// Search spectra one at a time. `stop` is checked between spectra; if it
    /// is set, the spectra searched so far are returned
    pub fn run(&self, spectra: &[ProcessedSpectrum], stop: &AtomicBool) -> Vec<SpectrumMatches> {
        let progress = Progress::new();
        let mut results = Vec::with_capacity(spectra.len());
        for query in spectra {
            if stop.load(Ordering::Relaxed) {
                log::warn!(
                    "search stopped after {} of {} spectra",
                    results.len(),
                    spectra.len()
                );
                break;
            }
            results.push(SpectrumMatches {
                spec_id: query.id.clone(),
                file_id: query.file_id,
                matches: self.process(query, &progress),
            });
        }

        let summary = progress.summary();
        let duration = progress.elapsed().as_millis().max(1) as usize;
        log::info!(
            "- search:  {:8} ms ({} spectra/s)",
            duration,
            summary.spectra * 1000 / duration
        );
        log::info!(
            "- {} candidates enumerated, {} prescored, {} matches reported",
            summary.candidates,
            summary.prescored,
            summary.matches
        );
        results
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::candidates::{Link, LinkCandidate, Offset};
    use crate::database::PeptideIx;
    use crate::fragments::{Chain, Fidelity};
    use crate::mass::NEUTRON;
    use crate::peptide::Peptide;
    use crate::scoring::Builder;
    use crate::spectrum::Peak;

    fn database(sequences: &[&str]) -> IndexedDatabase {
        IndexedDatabase::new(
            sequences
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

    const SEQUENCES: [&str; 5] = ["LESKEEVR", "ELSKEEVR", "VLSKTEAR", "GDKAPLTR", "AKEGVLR"];

    fn true_link(db: &IndexedDatabase) -> Link {
        Link::Cross {
            alpha: find(db, "LESKEEVR"),
            beta: find(db, "VLSKTEAR"),
            alpha_site: 3,
            beta_site: 3,
        }
    }

    /// Spectrum of LESKEEVR x VLSKTEAR with a few noise peaks, its precursor
    /// shifted by `correction` isotope spacings
    fn spectrum<G: FragmentGenerator>(
        scorer: &Scorer<G>,
        id: &str,
        charge: u8,
        correction: i8,
    ) -> ProcessedSpectrum {
        let db = scorer.db;
        let monoisotopic = db[find(db, "LESKEEVR")].monoisotopic
            + db[find(db, "VLSKTEAR")].monoisotopic
            + scorer.parameters.linker.mass;
        let candidate = LinkCandidate {
            link: true_link(db),
            offset: Offset {
                correction: 0,
                adduct: 0.0,
            },
            monoisotopic,
            order: 0,
        };

        let mut peaks = [Chain::Alpha, Chain::Beta]
            .iter()
            .flat_map(|chain| {
                scorer
                    .generator
                    .generate(&candidate, *chain, charge, Fidelity::Full)
            })
            .map(|peak| Peak {
                mz: peak.mz,
                intensity: 100.0 * peak.intensity,
                charge: None,
            })
            .chain([150.5, 333.3, 777.7].iter().map(|&mz| Peak {
                mz,
                intensity: 20.0,
                charge: None,
            }))
            .collect::<Vec<_>>();
        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        peaks.dedup_by(|a, b| (a.mz - b.mz).abs() < 1E-4);

        let precursor_mz =
            candidate.precursor_mz(charge) + correction as f32 * NEUTRON / charge as f32;
        ProcessedSpectrum::new(id, 0, precursor_mz, charge, peaks)
    }

    fn parameters(report_psms: usize) -> Parameters {
        Builder {
            report_psms: Some(report_psms),
            ..Default::default()
        }
        .make_parameters()
        .unwrap()
    }

    #[test]
    fn true_cross_link_ranks_first() {
        let db = database(&SEQUENCES);
        let search = Search::new(Scorer::new(&db, parameters(5)));
        let query = spectrum(&search.scorer, "scan=1", 3, 0);

        let matches = search.process(&query, &Progress::new());
        // ELSKEEVR x VLSKTEAR has the same mass, but fewer matched b ions
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].candidate.link, true_link(&db));
        assert_eq!(matches[0].correction, 0);
        assert_eq!(
            matches.iter().map(|m| m.rank).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(matches[0].score > matches[1].score);
        assert_eq!(matches[0].spec_id, "scan=1");
    }

    #[test]
    fn reports_precursor_correction() {
        let db = database(&SEQUENCES);
        let search = Search::new(Scorer::new(&db, parameters(5)));
        let query = spectrum(&search.scorer, "scan=2", 3, 1);

        let matches = search.process(&query, &Progress::new());
        assert!(!matches.is_empty());
        assert_eq!(matches[0].candidate.link, true_link(&db));
        assert_eq!(matches[0].correction, 1);
        assert!(matches[0].precursor_ppm.abs() < 1.0);
    }

    #[test]
    fn keeps_top_k() {
        let db = database(&SEQUENCES);
        let search = Search::new(Scorer::new(&db, parameters(1)));
        let spectra = vec![
            spectrum(&search.scorer, "scan=1", 3, 0),
            spectrum(&search.scorer, "scan=2", 4, 0),
        ];

        let results = search.run(&spectra, &AtomicBool::new(false));
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.matches.len(), 1);
            assert_eq!(result.matches[0].rank, 1);
            assert_eq!(result.matches[0].candidate.link, true_link(&db));
            // Monotonic pruning: every reported match passed the fast tier
            assert!(result.matches[0].prescored >= 1);
            assert!(result.matches[0].candidates >= result.matches[0].prescored);
        }
    }

    #[test]
    fn deterministic_across_thread_counts() {
        let db = database(&SEQUENCES);
        let search = Search::new(Scorer::new(&db, parameters(5)));
        let spectra = (0..4)
            .map(|i| {
                let id = format!("scan={}", i);
                spectrum(&search.scorer, &id, 3 + (i % 2) as u8, (i / 2) as i8)
            })
            .collect::<Vec<_>>();

        let summarize = |results: Vec<SpectrumMatches>| {
            results
                .into_iter()
                .flat_map(|r| r.matches)
                .map(|m| (m.spec_id, m.rank, m.candidate.link, m.correction))
                .collect::<Vec<_>>()
        };

        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| search.run(&spectra, &AtomicBool::new(false)));
        let multi = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap()
            .install(|| search.run(&spectra, &AtomicBool::new(false)));
        let again = search.run(&spectra, &AtomicBool::new(false));

        let single = summarize(single);
        assert!(!single.is_empty());
        assert_eq!(single, summarize(multi));
        assert_eq!(single, summarize(again));
    }

    #[test]
    fn empty_and_stopped_searches() {
        let db = database(&SEQUENCES);
        let search = Search::new(Scorer::new(&db, parameters(5)));
        let progress = Progress::new();

        // No candidates within tolerance
        let empty = ProcessedSpectrum::new("scan=1", 0, 1234.5, 2, vec![]);
        assert!(search.process(&empty, &progress).is_empty());
        // Unknown charge state
        let uncharged = ProcessedSpectrum::new("scan=2", 0, 1234.5, 0, vec![]);
        assert!(search.process(&uncharged, &progress).is_empty());
        assert_eq!(progress.summary().spectra, 2);
        assert_eq!(progress.summary().candidates, 0);

        let spectra = vec![spectrum(&search.scorer, "scan=3", 3, 0)];
        assert!(search.run(&spectra, &AtomicBool::new(true)).is_empty());
    }

    #[test]
    fn restrict_index_to_spectra() {
        let mut db = database(&["LESKEEVR", "VLSKTEAR", "PEPTIDEPEPTIDEPEPTIDEK"]);
        let parameters = parameters(5);
        let heaviest = db.peptides[2].monoisotopic;
        let precursor = db.peptides[0].monoisotopic + db.peptides[1].monoisotopic + 138.06808;

        let spectra = vec![
            ProcessedSpectrum::new("scan=1", 0, (precursor + 3.0 * 1.0072764) / 3.0, 3, vec![]),
            ProcessedSpectrum::new("scan=2", 0, 5000.0, 0, vec![]),
        ];
        assert!(heaviest > precursor - 138.0);
        assert_eq!(restrict_to_spectra(&mut db, &parameters, &spectra), 1);
        assert_eq!(db.len(), 2);
        assert_eq!(restrict_to_spectra(&mut db, &parameters, &[]), 0);
        assert_eq!(db.len(), 2);
    }
}
