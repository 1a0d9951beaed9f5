use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidates::Offset;
use crate::mass::Tolerance;
use crate::peptide::Peptide;
use crate::Error;

#[derive(Deserialize, Default, Clone, Debug)]
/// Parameters used for building the candidate mass index
pub struct Builder {
    /// Minimum peptide monoisotopic mass that will be indexed
    pub peptide_min_mass: Option<f32>,
    /// Maximum peptide monoisotopic mass that will be indexed
    pub peptide_max_mass: Option<f32>,
    /// Minimum peptide length that will be indexed
    pub min_len: Option<usize>,
    /// Static modifications to add to matching amino acids
    pub static_mods: Option<HashMap<String, f32>>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let peptide_min_mass = self.peptide_min_mass.unwrap_or(500.0);
        let peptide_max_mass = self.peptide_max_mass.unwrap_or(6000.0);
        if !(peptide_min_mass <= peptide_max_mass) {
            return Err(Error::InvalidParameter(format!(
                "peptide_min_mass ({}) must not exceed peptide_max_mass ({})",
                peptide_min_mass, peptide_max_mass
            )));
        }

        let mut static_mods = HashMap::new();
        for (residue, mass) in self
            .static_mods
            .unwrap_or_else(|| [("C".to_string(), 57.021465)].into())
        {
            let mut chars = residue.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if mass.is_finite() => {
                    static_mods.insert(c, mass);
                }
                _ => {
                    return Err(Error::InvalidParameter(format!(
                        "invalid static modification `{}`: {}",
                        residue, mass
                    )))
                }
            }
        }

        Ok(Parameters {
            peptide_min_mass,
            peptide_max_mass,
            min_len: self.min_len.unwrap_or(3),
            static_mods,
        })
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub peptide_min_mass: f32,
    pub peptide_max_mass: f32,
    pub min_len: usize,
    pub static_mods: HashMap<char, f32>,
}

impl Parameters {
    /// Build the mass index from `(sequence, decoy)` records. Sequences that
    /// cannot be parsed are skipped with a warning
    pub fn build<S: AsRef<str>>(&self, records: &[(S, bool)]) -> IndexedDatabase {
        log::trace!("building peptides");
        let mut peptides = records
            .iter()
            .filter_map(|(sequence, decoy)| match Peptide::new(sequence, *decoy) {
                Ok(peptide) => Some(peptide.apply(&self.static_mods)),
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            })
            .filter(|peptide| {
                peptide.len() >= self.min_len
                    && peptide.monoisotopic >= self.peptide_min_mass
                    && peptide.monoisotopic <= self.peptide_max_mass
            })
            .collect::<Vec<_>>();

        // Isobaric sequences can interleave with duplicates of a peptide
        // unless ties in mass are broken by sequence
        log::trace!("sorting and deduplicating peptides");
        peptides.par_sort_by(|a, b| {
            a.monoisotopic
                .total_cmp(&b.monoisotopic)
                .then_with(|| a.initial_sort(b))
        });
        peptides.dedup_by(|remove, keep| {
            remove.sequence == keep.sequence
                && remove.modifications == keep.modifications
                && remove.nterm == keep.nterm
                && remove.cterm == keep.cterm
        });
        IndexedDatabase::new(peptides)
    }
}

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
#[repr(transparent)]
pub struct PeptideIx(pub u32);

/// Candidate molecules, sorted ascending by monoisotopic mass. The index is
/// immutable for the duration of a search
#[derive(Default, Clone, Debug)]
pub struct IndexedDatabase {
    pub peptides: Vec<Peptide>,
}

impl IndexedDatabase {
    /// Peptides are sorted by mass with a stable sort, which is cheap if the
    /// input is already sorted
    pub fn new(mut peptides: Vec<Peptide>) -> Self {
        peptides.par_sort_by(|a, b| a.monoisotopic.total_cmp(&b.monoisotopic));
        Self { peptides }
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    /// Exact index range of all peptides with `lo <= mass <= hi`
    pub fn query_bounds(&self, lo: f32, hi: f32) -> Range<usize> {
        if lo.is_nan() || hi.is_nan() || lo > hi {
            return 0..0;
        }
        let (mut left, mut right) = binary_search_slice(
            &self.peptides,
            |p, bounds| p.monoisotopic.total_cmp(bounds),
            lo,
            hi,
        );

        // `binary_search_slice` returns the maximal set of indices, the exact
        // `left` and `right` edges may lie just outside of the window
        while left < right && self.peptides[left].monoisotopic < lo {
            left += 1;
        }
        while right > left && self.peptides[right - 1].monoisotopic > hi {
            right -= 1;
        }
        left..right
    }

    /// Exact index range of all peptides within `tolerance` of `mass`
    pub fn query(&self, mass: f32, tolerance: Tolerance) -> Range<usize> {
        let (lo, hi) = tolerance.bounds(mass);
        self.query_bounds(lo, hi)
    }

    /// Query the index once for every correction offset. The shift implied by
    /// each offset is removed from `mass` before the range query; offsets
    /// that produce an empty range are still reported
    pub fn query_offsets(
        &self,
        mass: f32,
        tolerance: Tolerance,
        offsets: &[Offset],
    ) -> Vec<(Offset, Range<usize>)> {
        offsets
            .iter()
            .map(|offset| (*offset, self.query(mass - offset.shift(), tolerance)))
            .collect()
    }

    /// Drop every peptide heavier than `max_mass`, returning the number removed
    pub fn restrict(&mut self, max_mass: f32) -> usize {
        let keep = self
            .peptides
            .partition_point(|peptide| peptide.monoisotopic <= max_mass);
        let removed = self.peptides.len() - keep;
        self.peptides.truncate(keep);
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeptideIx, &Peptide)> {
        self.peptides
            .iter()
            .enumerate()
            .map(|(idx, peptide)| (PeptideIx(idx as u32), peptide))
    }
}

impl std::ops::Index<PeptideIx> for IndexedDatabase {
    type Output = Peptide;

    fn index(&self, index: PeptideIx) -> &Self::Output {
        &self.peptides[index.0 as usize]
    }
}

/// Return the widest `left` and `right` indices into a `slice` (sorted by the
/// function `key`) such that all values between `low` and `high` are
/// contained in `slice[left..right]`
pub fn binary_search_slice<T, F, S>(slice: &[T], key: F, low: S, high: S) -> (usize, usize)
where
    F: Fn(&T, &S) -> Ordering,
{
    let left_idx = match slice.binary_search_by(|a| key(a, &low)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx.saturating_sub(1);
            while idx > 0 && key(&slice[idx], &low) != Ordering::Less {
                idx -= 1;
            }
            idx
        }
    };

    let right_idx = match slice[left_idx..].binary_search_by(|a| key(a, &high)) {
        Ok(idx) | Err(idx) => {
            let mut idx = idx + left_idx;
            while idx < slice.len() && key(&slice[idx], &high) != Ordering::Greater {
                idx = idx.saturating_add(1);
            }
            idx.min(slice.len())
        }
    };
    (left_idx, right_idx)
}
