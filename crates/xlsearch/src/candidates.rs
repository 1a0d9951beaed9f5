//! Enumeration of cross-link, loop-link and mono-link candidates whose
//! theoretical mass matches an observed precursor mass

use fnv::FnvHashSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::{IndexedDatabase, PeptideIx};
use crate::mass::{Tolerance, NEUTRON, PROTON};
use crate::Error;

/// A linking reagent and the residues it reacts with
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossLinker {
    pub name: String,
    /// Mass added when both ends of the linker are attached
    pub mass: f32,
    /// Masses added by a linker attached at one end only (hydrolyzed,
    /// amidated, ...)
    pub mono_masses: Vec<f32>,
    /// Residues reacting with the first end of the linker
    pub residues_first: String,
    /// Residues reacting with the second end of the linker
    pub residues_second: String,
}

impl Default for CrossLinker {
    /// DSS / BS3
    fn default() -> Self {
        Self {
            name: "DSS".into(),
            mass: 138.06808,
            mono_masses: vec![156.07864, 155.09463],
            residues_first: "K".into(),
            residues_second: "K".into(),
        }
    }
}

impl CrossLinker {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "cross-linker `{}` must have a positive mass",
                self.name
            )));
        }
        if self.mono_masses.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "cross-linker `{}` mono-link masses must be positive",
                self.name
            )));
        }
        if self.residues_first.is_empty() || self.residues_second.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "cross-linker `{}` must react with at least one residue at each end",
                self.name
            )));
        }
        Ok(())
    }

    /// Smallest mass the linker can add to a peptide
    pub fn min_mass(&self) -> f32 {
        self.mono_masses.iter().fold(self.mass, |acc, m| acc.min(*m))
    }

    /// Do both ends react with the same residues?
    pub fn is_homobifunctional(&self) -> bool {
        let mut first = self.residues_first.bytes().collect::<Vec<_>>();
        let mut second = self.residues_second.bytes().collect::<Vec<_>>();
        first.sort_unstable();
        first.dedup();
        second.sort_unstable();
        second.dedup();
        first == second
    }
}

/// A correction applied to the observed precursor mass before querying the
/// index: a number of misassigned isotope peaks, plus an optional adduct
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Offset {
    pub correction: i8,
    pub adduct: f32,
}

impl Offset {
    /// Mass that is subtracted from the observed precursor mass
    pub fn shift(&self) -> f32 {
        self.correction as f32 * NEUTRON + self.adduct
    }

    /// Cartesian product of corrections and adducts, in the order in which
    /// they are tried. Later corrections in the configured list are preferred,
    /// so they are tried first and win ties. The unadducted precursor is
    /// always searched, before any configured adduct
    pub fn product(corrections: &[i8], adducts: &[f32]) -> Vec<Offset> {
        let mut unique = vec![0.0f32];
        for &adduct in adducts {
            if !unique.iter().any(|a| a.to_bits() == adduct.to_bits()) {
                unique.push(adduct);
            }
        }
        let adducts = &unique;
        corrections
            .iter()
            .rev()
            .flat_map(|&correction| {
                adducts
                    .iter()
                    .map(move |&adduct| Offset { correction, adduct })
            })
            .collect()
    }
}

/// Topology of a candidate. Link sites are residue positions within the
/// respective peptide
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Link {
    /// Two peptides joined by the linker; `alpha` is the longer chain
    Cross {
        alpha: PeptideIx,
        beta: PeptideIx,
        alpha_site: u16,
        beta_site: u16,
    },
    /// Both ends of the linker attached to the same peptide, `first < second`
    Loop {
        peptide: PeptideIx,
        first: u16,
        second: u16,
    },
    /// Linker attached at one end only. `mono` indexes
    /// [`CrossLinker::mono_masses`]
    Mono {
        peptide: PeptideIx,
        site: u16,
        mono: u8,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct LinkCandidate {
    pub link: Link,
    /// Offset under which the candidate matched the precursor mass
    pub offset: Offset,
    /// Theoretical neutral mass of the linked molecule(s)
    pub monoisotopic: f32,
    /// Order of discovery, used to break score ties deterministically
    pub order: u32,
}

impl LinkCandidate {
    /// The longer chain of a cross-link, or the only chain otherwise
    pub fn alpha(&self) -> PeptideIx {
        match self.link {
            Link::Cross { alpha, .. } => alpha,
            Link::Loop { peptide, .. } | Link::Mono { peptide, .. } => peptide,
        }
    }

    pub fn beta(&self) -> Option<PeptideIx> {
        match self.link {
            Link::Cross { beta, .. } => Some(beta),
            _ => None,
        }
    }

    pub fn is_cross_link(&self) -> bool {
        matches!(self.link, Link::Cross { .. })
    }

    pub fn correction(&self) -> i8 {
        self.offset.correction
    }

    /// Theoretical precursor m/z, including the isotope correction and adduct
    pub fn precursor_mz(&self, charge: u8) -> f32 {
        let z = charge.max(1) as f32;
        (self.monoisotopic + z * PROTON + self.offset.shift()) / z
    }

    /// Relative error of the observed precursor m/z, in ppm
    pub fn precursor_ppm(&self, observed_mz: f32, charge: u8) -> f32 {
        let calculated = self.precursor_mz(charge);
        (observed_mz - calculated) / calculated * 1_000_000.0
    }

    fn key(&self) -> (Link, i8, u32) {
        (
            self.link,
            self.offset.correction,
            self.offset.adduct.to_bits(),
        )
    }
}

/// Largest individual peptide mass that can contribute to any candidate of
/// any spectrum, given the heaviest observed precursor
pub fn global_mass_bound(
    max_precursor_mass: f32,
    linker: &CrossLinker,
    offsets: &[Offset],
    tolerance: Tolerance,
) -> f32 {
    let min_shift = offsets
        .iter()
        .map(Offset::shift)
        .fold(f32::INFINITY, f32::min);
    let min_shift = if min_shift.is_finite() { min_shift } else { 0.0 };
    let (_, hi) = tolerance.bounds(max_precursor_mass - min_shift);
    hi - linker.min_mass()
}

/// Produces every [`LinkCandidate`] matching a precursor mass
pub struct Enumerator<'db> {
    pub db: &'db IndexedDatabase,
    pub linker: &'db CrossLinker,
    pub offsets: &'db [Offset],
    pub precursor_tol: Tolerance,
}

impl<'db> Enumerator<'db> {
    /// Enumerate all candidates within tolerance of `precursor_mass` under any
    /// offset. Candidates are returned in discovery order: offsets in
    /// preference order, then mono-links, loop-links and cross-links by
    /// ascending peptide mass. Exact duplicates are suppressed
    pub fn enumerate(&self, precursor_mass: f32) -> Vec<LinkCandidate> {
        let first = self.linker.residues_first.as_bytes();
        let second = self.linker.residues_second.as_bytes();
        let symmetric = self.linker.is_homobifunctional();

        let mut candidates = Vec::new();
        for offset in self.offsets {
            let corrected = precursor_mass - offset.shift();
            let (lo, hi) = self.precursor_tol.bounds(corrected);

            self.mono_links(*offset, lo, hi, &mut candidates);
            self.loop_links(*offset, lo, hi, first, second, symmetric, &mut candidates);
            candidates.extend(self.cross_links(*offset, lo, hi, first, second, symmetric));
        }

        let mut seen = FnvHashSet::default();
        candidates.retain(|candidate| seen.insert(candidate.key()));
        for (order, candidate) in candidates.iter_mut().enumerate() {
            candidate.order = order as u32;
        }
        candidates
    }

    fn mono_links(&self, offset: Offset, lo: f32, hi: f32, out: &mut Vec<LinkCandidate>) {
        let residues = format!(
            "{}{}",
            self.linker.residues_first, self.linker.residues_second
        );
        for (mono, mass) in self.linker.mono_masses.iter().enumerate() {
            for idx in self.db.query_bounds(lo - mass, hi - mass) {
                let peptide = &self.db.peptides[idx];
                for site in peptide.linkable_positions(residues.as_bytes()) {
                    out.push(LinkCandidate {
                        link: Link::Mono {
                            peptide: PeptideIx(idx as u32),
                            site,
                            mono: mono as u8,
                        },
                        offset,
                        monoisotopic: peptide.monoisotopic + mass,
                        order: 0,
                    });
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn loop_links(
        &self,
        offset: Offset,
        lo: f32,
        hi: f32,
        first: &[u8],
        second: &[u8],
        symmetric: bool,
        out: &mut Vec<LinkCandidate>,
    ) {
        let xl = self.linker.mass;
        for idx in self.db.query_bounds(lo - xl, hi - xl) {
            let peptide = &self.db.peptides[idx];
            let mut sites = site_pairs(
                peptide.linkable_positions(first),
                peptide.linkable_positions(second),
            );
            if !symmetric {
                sites.extend(site_pairs(
                    peptide.linkable_positions(second),
                    peptide.linkable_positions(first),
                ));
            }
            for (a, b) in sites {
                // A loop needs two distinct sites
                if a == b {
                    continue;
                }
                out.push(LinkCandidate {
                    link: Link::Loop {
                        peptide: PeptideIx(idx as u32),
                        first: a.min(b),
                        second: a.max(b),
                    },
                    offset,
                    monoisotopic: peptide.monoisotopic + xl,
                    order: 0,
                });
            }
        }
    }

    fn cross_links(
        &self,
        offset: Offset,
        lo: f32,
        hi: f32,
        first: &[u8],
        second: &[u8],
        symmetric: bool,
    ) -> Vec<LinkCandidate> {
        let xl = self.linker.mass;
        // The lighter peptide of a pair can be at most half of the remainder
        let lighter = self
            .db
            .query_bounds(f32::NEG_INFINITY, (hi - xl) / 2.0)
            .end;

        (0..lighter)
            .into_par_iter()
            .flat_map_iter(|i| {
                let m_i = self.db.peptides[i].monoisotopic;
                let partners = self.db.query_bounds(lo - xl - m_i, hi - xl - m_i);
                (partners.start.max(i)..partners.end)
                    .flat_map(move |j| self.pair(i, j, offset, first, second, symmetric))
            })
            .collect()
    }

    /// All cross-link candidates between peptides `i` and `j`
    fn pair(
        &self,
        i: usize,
        j: usize,
        offset: Offset,
        first: &[u8],
        second: &[u8],
        symmetric: bool,
    ) -> Vec<LinkCandidate> {
        let (p_i, p_j) = (&self.db.peptides[i], &self.db.peptides[j]);

        // Alpha is the longer chain, then the heavier one
        let swap = match p_i.len().cmp(&p_j.len()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => p_j.monoisotopic > p_i.monoisotopic,
        };
        let ((a, alpha), (b, beta)) = match swap {
            true => ((j, p_j), (i, p_i)),
            false => ((i, p_i), (j, p_j)),
        };

        let mut sites = site_pairs(
            alpha.linkable_positions(first),
            beta.linkable_positions(second),
        );
        if !symmetric {
            sites.extend(site_pairs(
                alpha.linkable_positions(second),
                beta.linkable_positions(first),
            ));
        }

        let monoisotopic = alpha.monoisotopic + beta.monoisotopic + self.linker.mass;
        sites
            .into_iter()
            .map(|(alpha_site, beta_site)| {
                // A homodimer is symmetric in its two sites
                let (alpha_site, beta_site) = match a == b {
                    true => (alpha_site.min(beta_site), alpha_site.max(beta_site)),
                    false => (alpha_site, beta_site),
                };
                LinkCandidate {
                    link: Link::Cross {
                        alpha: PeptideIx(a as u32),
                        beta: PeptideIx(b as u32),
                        alpha_site,
                        beta_site,
                    },
                    offset,
                    monoisotopic,
                    order: 0,
                }
            })
            .collect()
    }
}

fn site_pairs<A, B>(first: A, second: B) -> Vec<(u16, u16)>
where
    A: Iterator<Item = u16>,
    B: Iterator<Item = u16> + Clone,
{
    first
        .flat_map(|a| second.clone().map(move |b| (a, b)))
        .collect()
}
