use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::mass::{Mass, H2O, VALID_AA};
use crate::Error;

#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize)]
pub struct Peptide {
    pub decoy: bool,
    pub sequence: Arc<[u8]>,
    /// Modification mass carried by each residue, 0.0 if unmodified
    pub modifications: Vec<f32>,
    pub nterm: Option<f32>,
    pub cterm: Option<f32>,
    pub monoisotopic: f32,
}

impl Peptide {
    pub fn new<S: AsRef<str>>(sequence: S, decoy: bool) -> Result<Self, Error> {
        let sequence = sequence.as_ref().trim();
        if sequence.is_empty() {
            return Err(Error::InvalidSequence(sequence.into()));
        }

        let mut monoisotopic = H2O;
        for c in sequence.bytes() {
            if !VALID_AA.contains(&c) {
                return Err(Error::InvalidSequence(sequence.into()));
            }
            monoisotopic += c.monoisotopic();
        }

        Ok(Peptide {
            decoy,
            sequence: sequence.as_bytes().into(),
            modifications: vec![0.0; sequence.len()],
            nterm: None,
            cterm: None,
            monoisotopic,
        })
    }

    fn set_nterm_mod(&mut self, m: f32) {
        if self.nterm.is_none() {
            self.nterm = Some(m);
            self.monoisotopic += m;
        }
    }

    fn set_cterm_mod(&mut self, m: f32) {
        if self.cterm.is_none() {
            self.cterm = Some(m);
            self.monoisotopic += m;
        }
    }

    pub fn label(&self) -> i32 {
        match self.decoy {
            true => -1,
            false => 1,
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Apply a static modification to a peptide in-place. `^` and `$` denote
    /// the peptide N- and C-terminus
    pub fn static_mod(&mut self, residue: char, mass: f32) {
        match residue {
            '^' => return self.set_nterm_mod(mass),
            '$' => return self.set_cterm_mod(mass),
            _ => {}
        }

        for (resi, m) in self.sequence.iter().zip(self.modifications.iter_mut()) {
            // Don't overwrite an already modified amino acid!
            if *resi as char == residue && *m == 0.0 {
                self.monoisotopic += mass;
                *m = mass;
            }
        }
    }

    pub fn apply(mut self, static_mods: &HashMap<char, f32>) -> Self {
        // Iterate in a fixed order, so that the floating point sum of the
        // monoisotopic mass does not depend on hash ordering
        let mut mods = static_mods.iter().collect::<Vec<_>>();
        mods.sort_by(|a, b| a.0.cmp(b.0));
        for (resi, mass) in mods {
            self.static_mod(*resi, *mass);
        }
        self
    }

    /// Total order on everything but mass, so that identical peptides sort
    /// next to each other, targets first
    pub fn initial_sort(&self, other: &Self) -> Ordering {
        let bits = |m: &f32| m.to_bits();
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| {
                self.modifications
                    .iter()
                    .map(bits)
                    .cmp(other.modifications.iter().map(bits))
            })
            .then_with(|| self.nterm.map(f32::to_bits).cmp(&other.nterm.map(f32::to_bits)))
            .then_with(|| self.cterm.map(f32::to_bits).cmp(&other.cterm.map(f32::to_bits)))
            .then_with(|| self.decoy.cmp(&other.decoy))
    }

    /// Residue positions that can carry the linker: any position whose residue
    /// is in `residues`, except the C-terminal residue, which is consumed by
    /// proteolytic cleavage
    pub fn linkable_positions<'a>(
        &'a self,
        residues: &'a [u8],
    ) -> impl Iterator<Item = u16> + Clone + 'a {
        let n = self.sequence.len().saturating_sub(1);
        self.sequence[..n]
            .iter()
            .enumerate()
            .filter(move |(_, r)| residues.contains(*r))
            .map(|(idx, _)| idx as u16)
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            if m.is_sign_positive() {
                write!(f, "[+{}]-", m)?;
            } else {
                write!(f, "[{}]-", m)?;
            }
        }
        for (resi, m) in self.sequence.iter().zip(self.modifications.iter()) {
            write!(f, "{}", *resi as char)?;
            if *m != 0.0 {
                if m.is_sign_positive() {
                    write!(f, "[+{}]", m)?;
                } else {
                    write!(f, "[{}]", m)?;
                }
            }
        }
        if let Some(m) = self.cterm {
            if m.is_sign_positive() {
                write!(f, "-[+{}]", m)?;
            } else {
                write!(f, "-[{}]", m)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_residues() {
        assert!(Peptide::new("PEPTIDE", false).is_ok());
        assert!(Peptide::new("PEPTIDEB", false).is_err());
        assert!(Peptide::new("", false).is_err());
    }

    #[test]
    fn apply_mods() {
        let peptide = Peptide::new("AACAACAA", false).unwrap();
        let unmodified = peptide.monoisotopic;

        let static_mods = [('C', 57.0), ('^', 42.0)].into_iter().collect();
        let peptide = peptide.apply(&static_mods);

        assert_eq!(peptide.to_string(), "[+42]-AAC[+57]AAC[+57]AA");
        assert!((peptide.monoisotopic - unmodified - 156.0).abs() < 1E-3);
    }

    #[test]
    fn cterm_mod() {
        let mut peptide = Peptide::new("PEPTIDE", false).unwrap();
        peptide.static_mod('$', 229.01);
        assert!((peptide.monoisotopic - 1028.37).abs() < 0.001);
        assert_eq!(peptide.to_string(), "PEPTIDE-[+229.01]");
    }

    #[test]
    fn link_sites() {
        let peptide = Peptide::new("KAKLEKK", false).unwrap();
        // The C-terminal lysine is never linkable
        assert_eq!(
            peptide.linkable_positions(b"K").collect::<Vec<_>>(),
            vec![0, 2, 5]
        );
        assert_eq!(
            peptide.linkable_positions(b"KE").collect::<Vec<_>>(),
            vec![0, 2, 4, 5]
        );
        assert_eq!(peptide.linkable_positions(b"C").count(), 0);

        // Pairing sites walks one ladder once per site of the other
        let sites = peptide.linkable_positions(b"K");
        let pairs = sites
            .clone()
            .flat_map(|a| sites.clone().map(move |b| (a, b)))
            .count();
        assert_eq!(pairs, 9);

        let single = Peptide::new("K", false).unwrap();
        assert_eq!(single.linkable_positions(b"K").count(), 0);
    }

    #[test]
    fn serialize() {
        let peptide = Peptide::new("LESK", true).unwrap();
        let value = serde_json::to_value(&peptide).unwrap();
        assert_eq!(value["sequence"], serde_json::json!([76, 69, 83, 75]));
        assert_eq!(value["decoy"], true);
    }

    #[test]
    fn labels() {
        assert_eq!(Peptide::new("PEPTIDE", false).unwrap().label(), 1);
        assert_eq!(Peptide::new("EDITPEP", true).unwrap().label(), -1);
    }
}
