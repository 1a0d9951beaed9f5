use serde::{Deserialize, Serialize};

use crate::mass::Mass;
use crate::peptide::Peptide;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    /// Does this ion carry the N-terminus of the peptide?
    pub fn is_n_terminal(&self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
    /// Index of the backbone bond that was broken: the ion spans residues
    /// `0..=cleavage` (N-terminal ions) or `cleavage + 1..` (C-terminal ions)
    pub cleavage: usize,
}

impl Ion {
    /// Number of residues in the fragment
    pub fn ordinal(&self, peptide_len: usize) -> usize {
        match self.kind.is_n_terminal() {
            true => self.cleavage + 1,
            false => peptide_len - self.cleavage - 1,
        }
    }

    /// Does the fragment contain the residue at `position`?
    pub fn covers(&self, position: usize) -> bool {
        match self.kind.is_n_terminal() {
            true => position <= self.cleavage,
            false => position > self.cleavage,
        }
    }
}

/// Generate fragment ions of a single kind for a candidate peptide
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    peptide: &'p Peptide,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    /// Create a new [`IonSeries`] iterator for a specified peptide
    pub fn new(peptide: &'p Peptide, kind: Kind) -> Self {
        const C: f32 = 12.0;
        const O: f32 = 15.994914;
        const H: f32 = 1.007825;
        const PRO: f32 = 1.0072764;
        const N: f32 = 14.003074;
        const NH3: f32 = N + H * 2.0 + PRO;

        let nterm = peptide.nterm.unwrap_or_default();
        let cumulative_mass = match kind {
            Kind::A => nterm - (C + O),
            Kind::B => nterm,
            Kind::C => nterm + NH3,
            Kind::X => peptide.monoisotopic - nterm + (C + O - NH3 + N + H),
            Kind::Y => peptide.monoisotopic - nterm,
            Kind::Z => peptide.monoisotopic - nterm - NH3,
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Dynamic programming solution - memoize cumulative mass of
    // peptide fragment for fast fragment ion generation
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.sequence.len() {
            return None;
        }
        let r = self.peptide.sequence.get(self.idx)?;
        let m = self.peptide.modifications.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::A | Kind::B | Kind::C => r.monoisotopic() + *m,
            Kind::X | Kind::Y | Kind::Z => -(r.monoisotopic() + *m),
        };
        let cleavage = self.idx;
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
            cleavage,
        })
    }
}
