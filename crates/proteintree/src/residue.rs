//! Amino acid equivalences consumed by the index
//!
//! The tree never decides on its own which residues are interchangeable: at
//! every level it asks an [`AminoAcidMatcher`] for the residues a query residue
//! may stand for. [`AminoAcidTable`] is the default implementation, covering
//! the standard residues and the IUPAC combination codes B, J, Z and X.

use crate::mass::{Mass, COMBINATION_AA, VALID_AA};
use crate::Error;

pub trait AminoAcidMatcher: Send + Sync {
    /// Residues represented by `residue`: its members if it is a combination
    /// code (Z -> E, Q), otherwise the residue itself
    fn sub_residues(&self, residue: u8) -> Vec<u8>;

    /// Combination codes which might represent `residue` (E -> Z, X)
    fn combination_codes(&self, residue: u8) -> Vec<u8>;

    /// Residues whose mass differs from `residue` by less than `tolerance` Da
    fn indistinguishable_residues(&self, residue: u8, tolerance: f64) -> Result<Vec<u8>, Error>;

    /// Every residue that may appear in an indexed protein sequence
    fn alphabet(&self) -> &[u8];
}

#[derive(Clone, Debug)]
pub struct AminoAcidTable {
    alphabet: Vec<u8>,
}

impl Default for AminoAcidTable {
    fn default() -> Self {
        let mut alphabet = VALID_AA.to_vec();
        alphabet.extend_from_slice(&COMBINATION_AA);
        Self { alphabet }
    }
}

fn members(code: u8) -> Option<&'static [u8]> {
    match code {
        b'B' => Some(b"DN"),
        b'J' => Some(b"IL"),
        b'Z' => Some(b"EQ"),
        b'X' => Some(&VALID_AA),
        _ => None,
    }
}

impl AminoAcidMatcher for AminoAcidTable {
    fn sub_residues(&self, residue: u8) -> Vec<u8> {
        match residue {
            // X also covers the narrower codes
            b'X' => self.alphabet.iter().copied().filter(|&aa| aa != b'X').collect(),
            _ => match members(residue) {
                Some(members) => members.to_vec(),
                None => vec![residue],
            },
        }
    }

    fn combination_codes(&self, residue: u8) -> Vec<u8> {
        if residue == b'X' || !self.alphabet.contains(&residue) {
            return Vec::new();
        }
        let mut codes = COMBINATION_AA
            .iter()
            .copied()
            .filter(|&code| code != b'X')
            .filter(|&code| members(code).map(|m| m.contains(&residue)).unwrap_or(false))
            .collect::<Vec<_>>();
        codes.push(b'X');
        codes
    }

    fn indistinguishable_residues(&self, residue: u8, tolerance: f64) -> Result<Vec<u8>, Error> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "mass tolerance {} not valid for amino acid comparison",
                tolerance
            )));
        }

        let mass = match residue.monoisotopic() {
            Some(mass) => mass,
            None => {
                // Combination codes: union over their members
                let mut result = Vec::new();
                if let Some(members) = members(residue) {
                    for &member in members {
                        for aa in self.indistinguishable_residues(member, tolerance)? {
                            if !result.contains(&aa) {
                                result.push(aa);
                            }
                        }
                    }
                } else {
                    result.push(residue);
                }
                return Ok(result);
            }
        };

        Ok(VALID_AA
            .iter()
            .copied()
            .filter(|aa| {
                aa.monoisotopic()
                    .map(|other| (mass - other).abs() < tolerance)
                    .unwrap_or(false)
            })
            .collect())
    }

    fn alphabet(&self) -> &[u8] {
        &self.alphabet
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combination_codes() {
        let table = AminoAcidTable::default();
        assert_eq!(table.sub_residues(b'Z'), b"EQ".to_vec());
        assert_eq!(table.sub_residues(b'K'), b"K".to_vec());
        assert_eq!(table.combination_codes(b'E'), b"ZX".to_vec());
        assert_eq!(table.combination_codes(b'L'), b"JX".to_vec());
        assert_eq!(table.combination_codes(b'W'), b"X".to_vec());
        assert!(table.combination_codes(b'X').is_empty());

        let x = table.sub_residues(b'X');
        assert_eq!(x.len(), 25);
        assert!(x.contains(&b'B') && x.contains(&b'W'));
    }

    #[test]
    fn indistinguishable() -> Result<(), Error> {
        let table = AminoAcidTable::default();
        assert_eq!(table.indistinguishable_residues(b'I', 0.01)?, b"IL".to_vec());
        assert_eq!(table.indistinguishable_residues(b'K', 0.01)?, b"K".to_vec());
        assert_eq!(table.indistinguishable_residues(b'K', 0.05)?, b"KQ".to_vec());
        // Zero tolerance excludes everything, even the residue itself
        assert!(table.indistinguishable_residues(b'A', 0.0)?.is_empty());
        assert_eq!(table.indistinguishable_residues(b'J', 0.01)?, b"IL".to_vec());
        Ok(())
    }

    #[test]
    fn invalid_tolerance() {
        let table = AminoAcidTable::default();
        assert!(table.indistinguishable_residues(b'A', f64::NAN).is_err());
        assert!(table.indistinguishable_residues(b'A', -1.0).is_err());
        assert!(table.indistinguishable_residues(b'A', f64::INFINITY).is_err());
    }
}
