use crate::mass::VALID_AA;
use crate::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EnzymeBuilder {
    /// Residues after (or before, see `c_terminal`) which the enzyme cleaves
    pub cleave_at: Option<String>,
    /// Skip the cleavage site if it is followed by this residue
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        Self {
            cleave_at: Some("KR".into()),
            restrict: Some('P'),
            c_terminal: Some(true),
        }
    }
}

impl TryFrom<EnzymeBuilder> for Enzyme {
    type Error = Error;

    fn try_from(en: EnzymeBuilder) -> Result<Self, Self::Error> {
        Enzyme::new(
            &en.cleave_at.unwrap_or_else(|| "KR".into()),
            en.restrict,
            en.c_terminal.unwrap_or(true),
        )
    }
}

/// Restricts which protein offsets are indexed as seeds
#[derive(Clone, Debug)]
pub struct Enzyme {
    // Skip cleaving if the site is followed matching this AA
    pub skip_suffix: Option<char>,
    // Regex for matching cleavage sites
    regex: Regex,
    // Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Result<Self, Error> {
        if cleave.is_empty() || !cleave.bytes().all(|x| VALID_AA.contains(&x)) {
            return Err(Error::InvalidArgument(format!(
                "enzyme cleavage sequence must be non-empty amino acids: `{}`",
                cleave
            )));
        }
        if let Some(skip) = skip_suffix {
            if !skip.is_ascii() || !VALID_AA.contains(&(skip as u8)) {
                return Err(Error::InvalidArgument(format!(
                    "enzyme cleavage restriction is non-amino acid character: {}",
                    skip
                )));
            }
        }

        let regex = Regex::new(&format!("[{}]", cleave))
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;

        Ok(Enzyme {
            regex,
            skip_suffix,
            c_terminal,
        })
    }

    /// Start offsets of every cleavage product, always including the protein
    /// N-terminus
    pub fn seeds(&self, sequence: &str) -> Vec<usize> {
        let mut seeds = vec![0];
        for mat in self.regex.find_iter(sequence) {
            let right = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if right < sequence.len() && sequence[right..].starts_with(skip) {
                    continue;
                }
            }
            if right > 0 && right < sequence.len() && seeds.last() != Some(&right) {
                seeds.push(right);
            }
        }
        seeds
    }
}
