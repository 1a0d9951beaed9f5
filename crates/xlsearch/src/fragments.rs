use serde::Serialize;

use crate::candidates::{Link, LinkCandidate};
use crate::database::IndexedDatabase;
use crate::ion_series::{IonSeries, Kind};
use crate::mass::{NEUTRON, PROTON};
use crate::peptide::Peptide;

/// Does a fragment carry the linker (and the rest of the complex)?
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IonClass {
    Linear,
    CrossLink,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Alpha,
    Beta,
}

/// Reduced fidelity is used for prescoring: b/y ions, low charge states,
/// no isotope peaks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fidelity {
    Reduced,
    Full,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct TheoreticalPeak {
    pub mz: f32,
    pub intensity: f32,
    pub class: IonClass,
    pub kind: Kind,
    pub charge: u8,
    pub chain: Chain,
    /// Number of residues of the chain contained in the fragment
    pub ordinal: u16,
}

/// Source of theoretical fragment peaks for a candidate
pub trait FragmentGenerator: Sync {
    /// Generate the fragment peaks of one chain of `candidate`, sorted by m/z.
    /// Fragment charges are bounded by `precursor_charge`
    fn generate(
        &self,
        candidate: &LinkCandidate,
        chain: Chain,
        precursor_charge: u8,
        fidelity: Fidelity,
    ) -> Vec<TheoreticalPeak>;
}

/// Backbone fragments of linked peptides. A fragment is linear if it contains
/// none of the chain's link sites, and a cross-link fragment if it contains all
/// of them; fragments splitting a loop-link are not generated
pub struct LinkedIonGenerator<'db> {
    pub db: &'db IndexedDatabase,
    /// Ion kinds used at full fidelity
    pub ion_kinds: Vec<Kind>,
}

impl<'db> LinkedIonGenerator<'db> {
    pub fn new(db: &'db IndexedDatabase, ion_kinds: Vec<Kind>) -> Self {
        Self { db, ion_kinds }
    }

    /// The peptide making up `chain`, and its link sites
    fn chain(&self, candidate: &LinkCandidate, chain: Chain) -> Option<(&Peptide, u16, u16)> {
        let (peptide, first, last) = match (candidate.link, chain) {
            (
                Link::Cross {
                    alpha, alpha_site, ..
                },
                Chain::Alpha,
            ) => (alpha, alpha_site, alpha_site),
            (Link::Cross { beta, beta_site, .. }, Chain::Beta) => (beta, beta_site, beta_site),
            (
                Link::Loop {
                    peptide,
                    first,
                    second,
                },
                Chain::Alpha,
            ) => (peptide, first.min(second), first.max(second)),
            (Link::Mono { peptide, site, .. }, Chain::Alpha) => (peptide, site, site),
            _ => return None,
        };
        let peptide = self.db.peptides.get(peptide.0 as usize)?;
        if last as usize >= peptide.len() {
            return None;
        }
        Some((peptide, first, last))
    }
}

/// Highest fragment charge generated for a precursor charge state
pub fn max_fragment_charge(precursor_charge: u8, fidelity: Fidelity) -> u8 {
    let max = precursor_charge.saturating_sub(1).max(1);
    match fidelity {
        Fidelity::Reduced => max.min(2),
        Fidelity::Full => max,
    }
}

impl<'db> FragmentGenerator for LinkedIonGenerator<'db> {
    fn generate(
        &self,
        candidate: &LinkCandidate,
        chain: Chain,
        precursor_charge: u8,
        fidelity: Fidelity,
    ) -> Vec<TheoreticalPeak> {
        let (peptide, first, last) = match self.chain(candidate, chain) {
            Some(x) => x,
            None => return Vec::new(),
        };
        // Everything attached to this chain through the linker
        let attached = candidate.monoisotopic - peptide.monoisotopic;
        let max_charge = max_fragment_charge(precursor_charge, fidelity);
        let kinds = match fidelity {
            Fidelity::Reduced => &[Kind::B, Kind::Y][..],
            Fidelity::Full => &self.ion_kinds[..],
        };

        let mut peaks = Vec::new();
        for kind in kinds {
            for ion in IonSeries::new(peptide, *kind) {
                let (class, mass) = match (ion.covers(first as usize), ion.covers(last as usize)) {
                    (false, false) => (IonClass::Linear, ion.monoisotopic_mass),
                    (true, true) => (IonClass::CrossLink, ion.monoisotopic_mass + attached),
                    _ => continue,
                };
                let ordinal = ion.ordinal(peptide.len()) as u16;

                for charge in 1..=max_charge {
                    let mz = (mass + charge as f32 * PROTON) / charge as f32;
                    let peak = TheoreticalPeak {
                        mz,
                        intensity: 1.0,
                        class,
                        kind: *kind,
                        charge,
                        chain,
                        ordinal,
                    };
                    peaks.push(peak);
                    if fidelity == Fidelity::Full {
                        peaks.push(TheoreticalPeak {
                            mz: mz + NEUTRON / charge as f32,
                            intensity: 0.5,
                            ..peak
                        });
                    }
                }
            }
        }

        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        peaks
    }
}
