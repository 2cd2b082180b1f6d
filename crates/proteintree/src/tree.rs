use crate::cache::{CacheStats, QueryCache, QueryKey};
use crate::enzyme::{Enzyme, EnzymeBuilder};
use crate::matching::{
    effective_tolerance, match_in_protein, AminoAcidPattern, MatchingType, ProteinMapping,
};
use crate::node::Node;
use crate::provider::SequenceProvider;
use crate::residue::AminoAcidMatcher;
use crate::tags::{Cancellation, TagIndex, TagIndexer};
use crate::Error;
use fnv::FnvHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Converts a memory allocation in MB into accession x node units
pub const CACHE_SCALE: usize = 6000;

#[derive(Deserialize, Serialize, Default, Clone, Debug)]
/// Parameters used for building the protein index
pub struct Builder {
    /// Leaves holding more accessions than this are split
    pub max_node_size: Option<usize>,
    /// Deepest level at which a node may still be split
    pub max_depth: Option<usize>,
    /// Longest peptide expected; also bounds the split depth
    pub max_peptide_size: Option<usize>,
    /// Number of levels below the root that are always split
    pub initial_tag_size: Option<usize>,
    /// Memory allocated to the index, in MB
    pub memory_mb: Option<usize>,
    /// Capacity of each query cache tier
    pub cache_size: Option<usize>,
    /// Queries resolving slower than this go to the slow cache tier
    pub query_time_threshold_ms: Option<u64>,
    /// Proteins buffered per pass of the tag indexer
    pub batch_size: Option<usize>,
    /// Only seed the index at cleavage sites of this enzyme
    pub enzyme: Option<EnzymeBuilder>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let parameters = Parameters {
            max_node_size: self.max_node_size.unwrap_or(5000),
            max_depth: self.max_depth.unwrap_or(12),
            max_peptide_size: self.max_peptide_size.unwrap_or(50),
            initial_tag_size: self.initial_tag_size.unwrap_or(3),
            memory_mb: self.memory_mb.unwrap_or(1024),
            cache_size: self.cache_size.unwrap_or(10_000),
            query_time_threshold_ms: self.query_time_threshold_ms.unwrap_or(50),
            batch_size: self.batch_size.unwrap_or(100),
            enzyme: self.enzyme,
        };

        if parameters.max_peptide_size == 0 {
            return Err(Error::InvalidArgument(
                "max_peptide_size must be at least 1".into(),
            ));
        }
        if parameters.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be at least 1".into()));
        }
        if let Some(enzyme) = &parameters.enzyme {
            Enzyme::try_from(enzyme.clone())?;
        }
        Ok(parameters)
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub max_node_size: usize,
    pub max_depth: usize,
    pub max_peptide_size: usize,
    pub initial_tag_size: usize,
    pub memory_mb: usize,
    pub cache_size: usize,
    pub query_time_threshold_ms: u64,
    pub batch_size: usize,
    pub enzyme: Option<EnzymeBuilder>,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            max_node_size: 5000,
            max_depth: 12,
            max_peptide_size: 50,
            initial_tag_size: 3,
            memory_mb: 1024,
            cache_size: 10_000,
            query_time_threshold_ms: 50,
            batch_size: 100,
            enzyme: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Seeding,
    Splitting,
    Scanning,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub done: usize,
    pub total: usize,
}

#[derive(Debug)]
pub enum Backend {
    /// Fully resident trie
    Trie(Node),
    /// Inverted tag index, used when the trie does not fit the memory budget
    Tags(TagIndex),
}

impl Parameters {
    /// Deepest level at which nodes are split
    pub fn effective_depth(&self) -> usize {
        self.max_depth.min(self.max_peptide_size)
    }

    /// Memory budget in accession x node units
    pub fn budget(&self) -> usize {
        self.memory_mb.saturating_mul(CACHE_SCALE)
    }

    pub fn build(
        &self,
        provider: Arc<dyn SequenceProvider>,
        matcher: Arc<dyn AminoAcidMatcher>,
    ) -> Result<ProteinTree, Error> {
        self.build_with(provider, matcher, &mut |_| {}, Cancellation::default())
    }

    /// Build the index, reporting progress and honoring cancellation of the
    /// tag indexer
    pub fn build_with(
        &self,
        provider: Arc<dyn SequenceProvider>,
        matcher: Arc<dyn AminoAcidMatcher>,
        progress: &mut dyn FnMut(Progress),
        cancellation: Cancellation,
    ) -> Result<ProteinTree, Error> {
        let start = Instant::now();
        let enzyme = self.enzyme.clone().map(Enzyme::try_from).transpose()?;
        let accessions = provider.accessions()?;
        let budget = self.budget();

        let trie = match accessions.len() > budget {
            true => None,
            false => self.build_trie(
                provider.as_ref(),
                &accessions,
                enzyme.as_ref(),
                budget,
                progress,
            )?,
        };

        let backend = match trie {
            Some(root) => Backend::Trie(root),
            None => {
                log::warn!(
                    "protein tree for {} proteins does not fit in {} MB, falling back to tag index",
                    accessions.len(),
                    self.memory_mb
                );
                let index = TagIndexer::new(provider.as_ref(), matcher.alphabet())
                    .enzyme(enzyme.clone())
                    .batch_size(self.batch_size)
                    .cancellation(cancellation)
                    .run(progress)?;
                Backend::Tags(index)
            }
        };

        let tree = ProteinTree {
            backend,
            provider,
            matcher,
            enzyme,
            cache: QueryCache::new(
                self.cache_size,
                Duration::from_millis(self.query_time_threshold_ms),
            ),
            parameters: self.clone(),
        };
        log::info!(
            "indexed {} proteins: {} units in {:#?}",
            accessions.len(),
            tree.size(),
            start.elapsed()
        );
        Ok(tree)
    }

    /// Build a trie that fits `budget`, doubling the node size until it does.
    /// Returns `None` once leaves cannot get any coarser.
    fn build_trie(
        &self,
        provider: &dyn SequenceProvider,
        accessions: &[Arc<str>],
        enzyme: Option<&Enzyme>,
        budget: usize,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Option<Node>, Error> {
        let mut max_node_size = self.max_node_size;
        loop {
            let root = self.seed(provider, accessions, enzyme, progress)?;
            if let Some(root) = self.split(root, max_node_size, provider, budget, progress)? {
                return Ok(Some(root));
            }
            if max_node_size >= accessions.len() {
                return Ok(None);
            }
            max_node_size = max_node_size.saturating_mul(2).max(1);
            log::warn!(
                "trie exceeds budget of {} units, rebuilding with max node size {}",
                budget,
                max_node_size
            );
        }
    }

    /// Single leaf root holding every seed of every protein
    fn seed(
        &self,
        provider: &dyn SequenceProvider,
        accessions: &[Arc<str>],
        enzyme: Option<&Enzyme>,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Node, Error> {
        log::trace!("seeding {} proteins", accessions.len());
        let mut root = Node::new(0);
        for (idx, accession) in accessions.iter().enumerate() {
            let sequence = provider.sequence(accession)?;
            if !sequence.is_empty() {
                root.add_accession(accession.clone(), seeds(enzyme, &sequence))?;
            }
            progress(Progress {
                stage: Stage::Seeding,
                done: idx + 1,
                total: accessions.len(),
            });
        }
        Ok(root)
    }

    /// Split the seeded root, first down to the initial tag size, then every
    /// leaf above `max_node_size`. Stops early with `None` once the trie
    /// outgrows `budget`.
    fn split(
        &self,
        mut root: Node,
        max_node_size: usize,
        provider: &dyn SequenceProvider,
        budget: usize,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<Option<Node>, Error> {
        let depth = self.effective_depth();
        let initial = self.initial_tag_size.min(depth + 1);
        log::trace!("splitting to depth {}, initial tag size {}", depth, initial);

        let mut size = root.size();
        if initial > 0 && !root.split_within(0, initial - 1, provider, &mut size, budget)? {
            return Ok(None);
        }
        progress(Progress {
            stage: Stage::Splitting,
            done: 1,
            total: 2,
        });
        if !root.split_within(max_node_size, depth, provider, &mut size, budget)? {
            return Ok(None);
        }
        progress(Progress {
            stage: Stage::Splitting,
            done: 2,
            total: 2,
        });
        log::trace!(
            "trie of {} units, depth {}, max node size {}",
            size,
            root.max_depth(),
            max_node_size
        );
        Ok(Some(root))
    }
}

/// Offsets of `sequence` a match may start at
fn seeds(enzyme: Option<&Enzyme>, sequence: &str) -> Vec<usize> {
    match enzyme {
        Some(enzyme) => enzyme.seeds(sequence),
        None => (0..sequence.len()).collect(),
    }
}

/// Peptide to protein index
pub struct ProteinTree {
    backend: Backend,
    provider: Arc<dyn SequenceProvider>,
    matcher: Arc<dyn AminoAcidMatcher>,
    enzyme: Option<Enzyme>,
    cache: QueryCache,
    parameters: Parameters,
}

impl ProteinTree {
    /// Every protein subsequence matching `peptide` under `matching_type`,
    /// with the accessions and start positions it occurs at
    pub fn query(
        &self,
        peptide: &str,
        matching_type: MatchingType,
        tolerance: Option<f64>,
    ) -> Result<Arc<ProteinMapping>, Error> {
        if peptide.is_empty() {
            return Err(Error::InvalidArgument("empty peptide sequence".into()));
        }
        let tolerance = effective_tolerance(matching_type, tolerance)?;
        let key = QueryKey::new(peptide, matching_type, tolerance);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let pattern =
            AminoAcidPattern::new(peptide, matching_type, tolerance, self.matcher.as_ref())?;
        let mapping = match &self.backend {
            Backend::Trie(root) => root.get_protein_mapping(&pattern, self.provider.as_ref())?,
            Backend::Tags(index) => index.get_protein_mapping(&pattern, self.provider.as_ref())?,
        };
        let mapping = Arc::new(mapping);
        self.cache.insert(key, mapping.clone(), start.elapsed());
        Ok(mapping)
    }

    pub fn query_batch<S>(
        &self,
        peptides: &[S],
        matching_type: MatchingType,
        tolerance: Option<f64>,
    ) -> Vec<Result<Arc<ProteinMapping>, Error>>
    where
        S: AsRef<str> + Sync,
    {
        peptides
            .par_iter()
            .map(|peptide| self.query(peptide.as_ref(), matching_type, tolerance))
            .collect()
    }

    /// Every subsequence of a single protein matching `peptide`, with its
    /// start positions. Bypasses the index and the cache.
    pub fn matched_sequences(
        &self,
        peptide: &str,
        accession: &str,
        matching_type: MatchingType,
        tolerance: Option<f64>,
    ) -> Result<FnvHashMap<String, Vec<usize>>, Error> {
        if peptide.is_empty() {
            return Err(Error::InvalidArgument("empty peptide sequence".into()));
        }
        let tolerance = effective_tolerance(matching_type, tolerance)?;
        let pattern =
            AminoAcidPattern::new(peptide, matching_type, tolerance, self.matcher.as_ref())?;
        let sequence = self.provider.sequence(accession)?;
        let seeds = seeds(self.enzyme.as_ref(), &sequence);
        match_in_protein(self.provider.as_ref(), accession, &seeds, &pattern)
    }

    /// Length of the protein sequence behind `accession`
    pub fn protein_length(&self, accession: &str) -> Result<usize, Error> {
        Ok(self.provider.sequence(accession)?.len())
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Root of the trie, `None` if the tag index is in use
    pub fn root(&self) -> Option<&Node> {
        match &self.backend {
            Backend::Trie(root) => Some(root),
            Backend::Tags(_) => None,
        }
    }

    pub fn provider(&self) -> &Arc<dyn SequenceProvider> {
        &self.provider
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Approximate memory footprint in accession x node units
    pub fn size(&self) -> usize {
        match &self.backend {
            Backend::Trie(root) => root.size(),
            Backend::Tags(index) => index.size(),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of cached queries in the (fast, slow) tiers
    pub fn cache_len(&self) -> (usize, usize) {
        self.cache.len()
    }

    pub fn empty_cache(&self) {
        self.cache.clear()
    }

    pub fn set_cache_size(&mut self, cache_size: usize) {
        self.parameters.cache_size = cache_size;
        self.cache.set_capacity(cache_size);
    }
}
