//! Trie nodes keyed by the residue found at `seed + depth`
//!
//! A node starts out as a leaf holding `accession -> seeds`, where a seed is
//! the start offset of a candidate match inside that protein. Once a leaf
//! holds more accessions than the configured maximum it is split: every seed
//! is routed to the child keyed by the residue at `seed + depth`, and the leaf
//! becomes internal for good. Seeds that run into the protein C-terminus at
//! this depth cannot be routed anywhere and are kept in `termini` instead.
//!
//! ```text
//!  TESTEIST, seeds 0..8, depth 0
//!
//!          root
//!   T/    E|    S|    \I
//!  {0,3,7} {1,4} {2,6} {5}
//!    |E            ...
//!  {0,3}  + termini {7}
//! ```

use crate::matching::{
    indexed_sequence, match_in_protein, merge_accessions, merge_positions, AccessionMap,
    AminoAcidPattern, ProteinMapping,
};
use crate::provider::SequenceProvider;
use crate::Error;
use fnv::FnvHashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Not split (yet): accession -> sorted seeds
    Leaf(AccessionMap),
    /// Residue at `seed + depth` -> child node at `depth + 1`
    Internal(FnvHashMap<u8, Node>),
}

#[derive(Debug, Clone)]
pub struct Node {
    depth: usize,
    /// Seeds whose residue at `seed + depth` would lie past the C-terminus
    termini: AccessionMap,
    kind: NodeKind,
}

impl Node {
    pub fn new(depth: usize) -> Self {
        Node {
            depth,
            termini: AccessionMap::default(),
            kind: NodeKind::Leaf(AccessionMap::default()),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn accessions(&self) -> Option<&AccessionMap> {
        match &self.kind {
            NodeKind::Leaf(accessions) => Some(accessions),
            NodeKind::Internal(_) => None,
        }
    }

    pub fn subtree(&self) -> Option<&FnvHashMap<u8, Node>> {
        match &self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Internal(subtree) => Some(subtree),
        }
    }

    pub fn termini(&self) -> &AccessionMap {
        &self.termini
    }

    /// Register seeds of `accession` on a leaf. Seeds already present for the
    /// accession are merged, keeping them sorted and unique.
    pub fn add_accession(&mut self, accession: Arc<str>, seeds: Vec<usize>) -> Result<(), Error> {
        match &mut self.kind {
            NodeKind::Leaf(accessions) => {
                let entry = accessions.entry(accession).or_default();
                merge_positions(entry, &seeds);
                Ok(())
            }
            NodeKind::Internal(_) => Err(Error::InvalidArgument(format!(
                "cannot add `{}` to an already split node at depth {}",
                accession, self.depth
            ))),
        }
    }

    /// Approximate memory footprint in accession x node units
    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(accessions) => accessions.len(),
            NodeKind::Internal(subtree) => {
                subtree.values().map(Node::size).sum::<usize>() + self.termini.len()
            }
        }
    }

    /// Depth of the deepest node below (and including) this one
    pub fn max_depth(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => self.depth,
            NodeKind::Internal(subtree) => subtree
                .values()
                .map(Node::max_depth)
                .max()
                .unwrap_or(self.depth),
        }
    }

    /// Split this node if it holds more than `max_node_size` accessions and
    /// `depth <= max_depth`, then recursively split the new children.
    ///
    /// Returns `false` without touching the node otherwise, in particular for
    /// a node that was already split. A node whose seeds all end at the
    /// C-terminus still becomes internal: its subtree is empty and every seed
    /// lives in `termini`.
    pub fn split_node(
        &mut self,
        max_node_size: usize,
        max_depth: usize,
        provider: &dyn SequenceProvider,
    ) -> Result<bool, Error> {
        if !self.split_once(max_node_size, max_depth, provider)? {
            return Ok(false);
        }
        if let NodeKind::Internal(subtree) = &mut self.kind {
            for node in subtree.values_mut() {
                node.split_node(max_node_size, max_depth, provider)?;
            }
        }
        Ok(true)
    }

    /// Split every leaf at or below this node that exceeds `max_node_size`,
    /// keeping `size` (the footprint of the whole trie) up to date.
    ///
    /// Gives up and returns `false` as soon as `size` exceeds `budget`; the
    /// trie is then only partially split and should be discarded.
    pub fn split_within(
        &mut self,
        max_node_size: usize,
        max_depth: usize,
        provider: &dyn SequenceProvider,
        size: &mut usize,
        budget: usize,
    ) -> Result<bool, Error> {
        if self.is_leaf() {
            let before = self.size();
            if !self.split_once(max_node_size, max_depth, provider)? {
                return Ok(true);
            }
            *size = *size + self.size() - before;
            if *size > budget {
                return Ok(false);
            }
        }
        if let NodeKind::Internal(subtree) = &mut self.kind {
            for node in subtree.values_mut() {
                if !node.split_within(max_node_size, max_depth, provider, size, budget)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Route the seeds of an oversized leaf one level down
    fn split_once(
        &mut self,
        max_node_size: usize,
        max_depth: usize,
        provider: &dyn SequenceProvider,
    ) -> Result<bool, Error> {
        let accessions = match &mut self.kind {
            NodeKind::Leaf(accessions)
                if accessions.len() > max_node_size && self.depth <= max_depth =>
            {
                std::mem::take(accessions)
            }
            _ => return Ok(false),
        };

        let mut subtree: FnvHashMap<u8, Node> = FnvHashMap::default();
        for (accession, seeds) in accessions {
            let sequence = indexed_sequence(provider, &accession)?;
            let sequence = sequence.as_bytes();

            let mut by_residue: FnvHashMap<u8, Vec<usize>> = FnvHashMap::default();
            for seed in seeds {
                let index = seed + self.depth;
                if index < sequence.len() {
                    by_residue.entry(sequence[index]).or_default().push(seed);
                } else if index == sequence.len() {
                    self.termini.entry(accession.clone()).or_default().push(seed);
                } else {
                    return Err(Error::InvalidArgument(format!(
                        "attempting to index past the C-terminus of `{}` (seed {}, depth {}, length {})",
                        accession,
                        seed,
                        self.depth,
                        sequence.len()
                    )));
                }
            }

            for (aa, seeds) in by_residue {
                subtree
                    .entry(aa)
                    .or_insert_with(|| Node::new(self.depth + 1))
                    .add_accession(accession.clone(), seeds)?;
            }
        }

        for seeds in self.termini.values_mut() {
            seeds.sort_unstable();
            seeds.dedup();
        }

        self.kind = NodeKind::Internal(subtree);
        Ok(true)
    }

    /// Every accession and seed held at or below this node, termini included
    pub fn all_mappings(&self) -> AccessionMap {
        match &self.kind {
            NodeKind::Leaf(accessions) => accessions.clone(),
            NodeKind::Internal(subtree) => {
                let mut result = AccessionMap::default();
                for node in subtree.values() {
                    merge_accessions(&mut result, node.all_mappings());
                }
                merge_accessions(&mut result, self.termini.clone());
                result
            }
        }
    }

    /// Map a peptide pattern onto the proteins indexed below this node
    pub fn get_protein_mapping(
        &self,
        pattern: &AminoAcidPattern,
        provider: &dyn SequenceProvider,
    ) -> Result<ProteinMapping, Error> {
        if pattern.len() < self.depth {
            return Err(Error::InvalidArgument(format!(
                "peptide of length {} cannot be resolved from depth {}",
                pattern.len(),
                self.depth
            )));
        }
        let mut result = ProteinMapping::default();
        let mut path = Vec::with_capacity(pattern.len());
        self.collect(pattern, provider, &mut path, &mut result)?;
        Ok(result)
    }

    fn collect(
        &self,
        pattern: &AminoAcidPattern,
        provider: &dyn SequenceProvider,
        path: &mut Vec<u8>,
        result: &mut ProteinMapping,
    ) -> Result<(), Error> {
        if self.depth == pattern.len() {
            let mappings = self.all_mappings();
            if !mappings.is_empty() {
                let sequence = String::from_utf8_lossy(path).into_owned();
                merge_accessions(result.entry(sequence).or_default(), mappings);
            }
            return Ok(());
        }

        match &self.kind {
            NodeKind::Leaf(accessions) => {
                for (accession, seeds) in accessions {
                    for (sequence, positions) in
                        match_in_protein(provider, accession, seeds, pattern)?
                    {
                        let entry = result
                            .entry(sequence)
                            .or_default()
                            .entry(accession.clone())
                            .or_default();
                        merge_positions(entry, &positions);
                    }
                }
            }
            NodeKind::Internal(subtree) => {
                for aa in pattern.candidates(self.depth) {
                    if let Some(node) = subtree.get(aa) {
                        path.push(*aa);
                        node.collect(pattern, provider, path, result)?;
                        path.pop();
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fasta::Fasta;
    use crate::matching::MatchingType;
    use crate::residue::AminoAcidTable;

    fn seeded(fasta: &Fasta) -> Node {
        let mut root = Node::new(0);
        for (acc, seq) in &fasta.targets {
            root.add_accession(acc.clone(), (0..seq.len()).collect())
                .unwrap();
        }
        root
    }

    fn exact(peptide: &str) -> AminoAcidPattern {
        AminoAcidPattern::new(peptide, MatchingType::Exact, None, &AminoAcidTable::default())
            .unwrap()
    }

    #[test]
    fn leaf_lookup() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST")]);
        let root = seeded(&fasta);
        let mapping = root.get_protein_mapping(&exact("TEI"), &fasta)?;
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["TEI"]["P1"], vec![3]);
        Ok(())
    }

    #[test]
    fn split_routes_seeds() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST")]);
        let mut root = seeded(&fasta);
        assert!(root.split_node(0, 1, &fasta)?);

        let subtree = root.subtree().unwrap();
        assert_eq!(subtree.len(), 4);
        let t = &subtree[&b'T'];
        // Depth 1 split happened as well: seed 7 has nothing after it
        assert_eq!(t.termini()["P1"], vec![7]);
        let te = &t.subtree().unwrap()[&b'E'];
        assert_eq!(te.accessions().unwrap()["P1"], vec![0, 3]);
        // Depth 2 > max_depth, stays a leaf
        assert!(te.is_leaf());
        assert_eq!(root.max_depth(), 2);
        Ok(())
    }

    #[test]
    fn split_is_idempotent() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST")]);
        let mut root = seeded(&fasta);
        assert!(root.split_node(0, 12, &fasta)?);
        let size = root.size();
        assert!(!root.split_node(0, 12, &fasta)?);
        assert_eq!(root.size(), size);
        Ok(())
    }

    #[test]
    fn small_nodes_stay_leaves() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST"), ("P2", "PEPTIDE")]);
        let mut root = seeded(&fasta);
        assert!(!root.split_node(2, 12, &fasta)?);
        assert!(root.is_leaf());
        assert_eq!(root.size(), 2);
        Ok(())
    }

    #[test]
    fn split_rejects_seed_past_terminus() {
        let fasta = Fasta::from_sequences([("P1", "PEPTIDE")]);
        let mut root = Node::new(3);
        root.add_accession("P1".into(), vec![6]).unwrap();
        assert!(matches!(
            root.split_node(0, 12, &fasta),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn split_with_drifted_provider() {
        let fasta = Fasta::from_sequences([("P1", "PEPTIDE")]);
        let mut root = Node::new(0);
        root.add_accession("P9".into(), vec![0]).unwrap();
        assert!(matches!(root.split_node(0, 12, &fasta), Err(Error::NotFound(_))));
    }

    #[test]
    fn add_to_internal_node() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "PEPTIDE")]);
        let mut root = seeded(&fasta);
        root.split_node(0, 12, &fasta)?;
        assert!(root.add_accession("P1".into(), vec![0]).is_err());
        Ok(())
    }

    #[test]
    fn terminus_match() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "ABCDE")]);
        let mut root = seeded(&fasta);
        root.split_node(0, 12, &fasta)?;

        let de = &root.subtree().unwrap()[&b'D'].subtree().unwrap()[&b'E'];
        assert!(!de.is_leaf());
        assert!(de.subtree().unwrap().is_empty());
        assert_eq!(de.termini()["P1"], vec![3]);

        // Split at the initial tag depth only: all seeds run off the end
        let e = &root.subtree().unwrap()[&b'E'];
        assert!(e.subtree().unwrap().is_empty());
        assert_eq!(e.termini()["P1"], vec![4]);
        assert_eq!(e.size(), 1);

        let mapping = root.get_protein_mapping(&exact("DE"), &fasta)?;
        assert_eq!(mapping["DE"]["P1"], vec![3]);
        Ok(())
    }

    #[test]
    fn all_mappings_merge_children() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST"), ("P2", "ATEST")]);
        let mut root = seeded(&fasta);
        root.split_node(0, 12, &fasta)?;
        let t = &root.subtree().unwrap()[&b'T'];
        let all = t.all_mappings();
        assert_eq!(all["P1"], vec![0, 3, 7]);
        assert_eq!(all["P2"], vec![1, 4]);
        Ok(())
    }

    #[test]
    fn split_within_budget() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST"), ("P2", "PEPTIDE")]);
        let mut full = seeded(&fasta);
        full.split_node(0, 12, &fasta)?;

        let mut root = seeded(&fasta);
        let mut size = root.size();
        assert!(root.split_within(0, 12, &fasta, &mut size, usize::MAX)?);
        assert_eq!(size, root.size());
        assert_eq!(size, full.size());
        assert_eq!(root.max_depth(), full.max_depth());

        // The first split of the root already goes over
        let mut root = seeded(&fasta);
        let mut size = root.size();
        assert!(!root.split_within(0, 12, &fasta, &mut size, 2)?);
        assert!(size > 2);
        assert!(root.max_depth() <= 1);
        Ok(())
    }

    #[test]
    fn split_within_leaves_small_nodes() -> Result<(), Error> {
        let fasta = Fasta::from_sequences([("P1", "TESTEIST"), ("P2", "PEPTIDE")]);
        let mut root = seeded(&fasta);
        let mut size = root.size();
        assert!(root.split_within(2, 12, &fasta, &mut size, 2)?);
        assert!(root.is_leaf());
        assert_eq!(size, 2);
        Ok(())
    }
}
