//! Residue matching rules shared by the trie, the tag index and the cache

use crate::provider::SequenceProvider;
use crate::residue::AminoAcidMatcher;
use crate::Error;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Accession -> sorted, deduplicated start positions
pub type AccessionMap = FnvHashMap<Arc<str>, Vec<usize>>;

/// Matched protein subsequence -> accession -> start positions
///
/// For non-exact matching the matched subsequence may differ from the query
pub type ProteinMapping = FnvHashMap<String, AccessionMap>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingType {
    /// Plain string identity
    Exact,
    /// Expand combination codes (B, J, Z, X) and their member residues
    Combination,
    /// Combination matching, plus residues closer in mass than a tolerance
    Indistinguishable,
}

impl std::str::FromStr for MatchingType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" | "string" => Ok(Self::Exact),
            "combination" => Ok(Self::Combination),
            "indistinguishable" => Ok(Self::Indistinguishable),
            _ => Err(Error::InvalidArgument(format!("unknown matching type `{}`", s))),
        }
    }
}

/// Validate the tolerance against the matching type. The tolerance is only
/// meaningful for [`MatchingType::Indistinguishable`] and dropped otherwise.
pub fn effective_tolerance(
    matching_type: MatchingType,
    tolerance: Option<f64>,
) -> Result<Option<f64>, Error> {
    match (matching_type, tolerance) {
        (MatchingType::Indistinguishable, None) => Err(Error::InvalidArgument(
            "a mass tolerance is required for indistinguishable matching".into(),
        )),
        (MatchingType::Indistinguishable, Some(tol)) if !tol.is_finite() || tol < 0.0 => Err(
            Error::InvalidArgument(format!("mass tolerance {} is not valid", tol)),
        ),
        // -0.0 + 0.0 is 0.0
        (MatchingType::Indistinguishable, tol) => Ok(tol.map(|t| t + 0.0)),
        _ => Ok(None),
    }
}

/// The residues accepted at every position of a query peptide
///
/// Built once per query, so that neither the trie walk nor the leaf
/// verification has to consult the [`AminoAcidMatcher`] again.
#[derive(Clone, Debug, PartialEq)]
pub struct AminoAcidPattern {
    residues: Vec<Vec<u8>>,
}

impl AminoAcidPattern {
    pub fn new(
        peptide: &str,
        matching_type: MatchingType,
        tolerance: Option<f64>,
        matcher: &dyn AminoAcidMatcher,
    ) -> Result<Self, Error> {
        if peptide.is_empty() {
            return Err(Error::InvalidArgument("empty peptide sequence".into()));
        }
        if !peptide.is_ascii() {
            return Err(Error::InvalidArgument(format!(
                "peptide `{}` contains non amino acid characters",
                peptide
            )));
        }
        let tolerance = effective_tolerance(matching_type, tolerance)?;

        let residues = peptide
            .bytes()
            .map(|aa| candidates(aa, matching_type, tolerance, matcher))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { residues })
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Residues a protein may carry at offset `depth` of a match
    pub fn candidates(&self, depth: usize) -> &[u8] {
        &self.residues[depth]
    }

    /// Does `subsequence` (exactly as long as the pattern) match?
    pub fn matches(&self, subsequence: &[u8]) -> bool {
        subsequence.len() == self.residues.len()
            && subsequence
                .iter()
                .zip(&self.residues)
                .all(|(aa, allowed)| allowed.contains(aa))
    }
}

/// Residues that may stand in for `aa`, always starting with `aa` itself
fn candidates(
    aa: u8,
    matching_type: MatchingType,
    tolerance: Option<f64>,
    matcher: &dyn AminoAcidMatcher,
) -> Result<Vec<u8>, Error> {
    let mut result = vec![aa];
    if matching_type == MatchingType::Exact {
        return Ok(result);
    }

    let mut push = |residues: Vec<u8>| {
        for residue in residues {
            if !result.contains(&residue) {
                result.push(residue);
            }
        }
    };

    push(matcher.sub_residues(aa));
    push(matcher.combination_codes(aa));
    if let (MatchingType::Indistinguishable, Some(tolerance)) = (matching_type, tolerance) {
        push(matcher.indistinguishable_residues(aa, tolerance)?);
    }
    Ok(result)
}

/// Fetch the sequence of an accession the index already refers to. A miss
/// means the index and the provider have drifted apart.
pub(crate) fn indexed_sequence(
    provider: &dyn SequenceProvider,
    accession: &str,
) -> Result<Arc<str>, Error> {
    provider.sequence(accession).map_err(|e| match e {
        Error::NotFound(acc) => {
            log::error!("protein `{}` is indexed but unknown to the sequence provider", acc);
            Error::NotFound(acc)
        }
        e => e,
    })
}

/// Verify every seed of `accession` against the full pattern, grouping the
/// accepted seeds by the protein subsequence they matched
pub(crate) fn match_in_protein(
    provider: &dyn SequenceProvider,
    accession: &str,
    seeds: &[usize],
    pattern: &AminoAcidPattern,
) -> Result<FnvHashMap<String, Vec<usize>>, Error> {
    let sequence = indexed_sequence(provider, accession)?;
    let sequence = sequence.as_bytes();
    let mut results: FnvHashMap<String, Vec<usize>> = FnvHashMap::default();

    for &start in seeds {
        let end = start + pattern.len();
        if end > sequence.len() {
            continue;
        }
        let sub = &sequence[start..end];
        if pattern.matches(sub) {
            results
                .entry(String::from_utf8_lossy(sub).into_owned())
                .or_default()
                .push(start);
        }
    }
    Ok(results)
}

/// Merge sorted position lists, keeping the result sorted and unique
pub fn merge_positions(into: &mut Vec<usize>, from: &[usize]) {
    into.extend_from_slice(from);
    into.sort_unstable();
    into.dedup();
}

pub fn merge_accessions(into: &mut AccessionMap, from: AccessionMap) {
    for (accession, positions) in from {
        match into.get_mut(&accession) {
            Some(existing) => merge_positions(existing, &positions),
            None => {
                into.insert(accession, positions);
            }
        }
    }
}

pub fn merge_mapping(into: &mut ProteinMapping, from: ProteinMapping) {
    for (sequence, accessions) in from {
        if accessions.is_empty() {
            continue;
        }
        match into.get_mut(&sequence) {
            Some(existing) => merge_accessions(existing, accessions),
            None => {
                into.insert(sequence, accessions);
            }
        }
    }
}
