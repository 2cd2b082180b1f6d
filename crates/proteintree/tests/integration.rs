//! Every indexed offset must be recoverable through the public query API

use proteintree_core::enzyme::EnzymeBuilder;
use proteintree_core::fasta::Fasta;
use proteintree_core::residue::AminoAcidTable;
use proteintree_core::tags::TagIndexer;
use proteintree_core::tree::Parameters;
use proteintree_core::{AminoAcidMatcher, Error, MatchingType, ProteinTree, SequenceProvider};
use quickcheck_macros::quickcheck;
use std::sync::Arc;

const FASTA: &'static str = r#"
>sp|Q99536|VAT1_HUMAN Synaptic vesicle membrane protein VAT-1 homolog OS=Homo sapiens OX=9606 GN=VAT1 PE=1 SV=2
MSDEREVAEAATGEDASSPPPKTEAASDPQHPAASEGAAAAAASPPLLRCLVLTGFGGYD
KVKLQSRPAAPPAPGPGQLTLRLRACGLNFADLMARQGLYDRLPPLPVTPGMEGAGVVIA
VGEGVSDRKAGDRVMVLNRSGMWQEEVTVPSVQTFLIPEAMTFEEAAALLVNYITAYMVL
FDFGNLQPGHSVLVHMAAGGVGMAAVQLCRTVENVTVFGTASASKHEALKENGVTHPIDY
HTTDYVDEIKKISPKGVDIVMDPLGGSDTAKGYNLLKPMGKVVTYGMANLLTGPKRNLMA
LARTWWNQFSVTALQLLQANRAVCGFHLGYLDGEVELVSGVVARLLALYNQGHIKPHIDS
VWPFEKVADAMKQMQEKKNVGKVLLVPGPEKEN
"#;

fn fasta() -> Fasta {
    Fasta::parse(FASTA.into(), "rev_", true)
}

fn mk_tree(max_node_size: usize, memory_mb: usize) -> Result<ProteinTree, Error> {
    mk_digested_tree(max_node_size, memory_mb, None)
}

fn mk_digested_tree(
    max_node_size: usize,
    memory_mb: usize,
    enzyme: Option<EnzymeBuilder>,
) -> Result<ProteinTree, Error> {
    let parameters = Parameters {
        max_node_size,
        memory_mb,
        max_depth: 8,
        enzyme,
        ..Default::default()
    };
    parameters.build(Arc::new(fasta()), Arc::new(AminoAcidTable::default()))
}

/// Pick a (accession, start, peptide) from arbitrary inputs
fn pick(fasta: &Fasta, protein: usize, offset: usize, len: usize) -> (Arc<str>, usize, String) {
    let (accession, sequence) = &fasta.targets[protein % fasta.targets.len()];
    let start = offset % sequence.len();
    let end = (start + 1 + len % 20).min(sequence.len());
    (accession.clone(), start, sequence[start..end].to_string())
}

#[quickcheck]
fn exact_round_trip(protein: usize, offset: usize, len: usize, max_node_size: usize) {
    let tree = mk_tree(max_node_size % 4, 1024).unwrap();
    let (accession, start, peptide) = pick(&fasta(), protein, offset, len);

    let mapping = tree.query(&peptide, MatchingType::Exact, None).unwrap();
    assert_eq!(mapping.len(), 1);
    assert!(mapping[&peptide][&accession].contains(&start));
}

#[quickcheck]
fn combination_is_superset(protein: usize, offset: usize, len: usize) {
    let tree = mk_tree(1, 1024).unwrap();
    let (_, _, peptide) = pick(&fasta(), protein, offset, len);

    let exact = tree.query(&peptide, MatchingType::Exact, None).unwrap();
    let combination = tree.query(&peptide, MatchingType::Combination, None).unwrap();
    let tolerant = tree
        .query(&peptide, MatchingType::Indistinguishable, Some(0.05))
        .unwrap();
    for (sequence, accessions) in exact.iter() {
        for (accession, positions) in accessions {
            for wider in [&combination, &tolerant] {
                let found = &wider[sequence][accession];
                assert!(positions.iter().all(|p| found.contains(p)));
            }
        }
    }
}

#[test]
fn trie_and_tag_index_agree() -> Result<(), Error> {
    let trie = mk_tree(2, 1024)?;
    let tags = mk_tree(2, 0)?;
    assert!(trie.root().is_some());
    assert!(tags.root().is_none());

    for peptide in ["LQSRPAAPPAPGPGQLTLR", "VVIA", "EKEN", "NEKEP", "AAAA", "JVIA"] {
        for matching_type in [MatchingType::Exact, MatchingType::Combination] {
            assert_eq!(
                trie.query(peptide, matching_type, None)?,
                tags.query(peptide, matching_type, None)?,
                "{} {:?}",
                peptide,
                matching_type
            );
        }
    }

    // Decoys are indexed like any other protein
    let decoy = trie.query("NEKEP", MatchingType::Exact, None)?;
    assert_eq!(decoy["NEKEP"]["rev_sp|Q99536|VAT1_HUMAN"], vec![0]);
    Ok(())
}

#[test]
fn digested_trie_and_tag_index_agree() -> Result<(), Error> {
    let trie = mk_digested_tree(2, 1024, Some(EnzymeBuilder::default()))?;
    let tags = mk_digested_tree(2, 0, Some(EnzymeBuilder::default()))?;
    assert!(trie.root().is_some());
    assert!(tags.root().is_none());

    for peptide in ["LQSRPAAPPAPGPGQLTLR", "SRPAAP", "VVIA", "EKEN", "NEKEP", "AAAA", "JVIA"] {
        for matching_type in [MatchingType::Exact, MatchingType::Combination] {
            assert_eq!(
                trie.query(peptide, matching_type, None)?,
                tags.query(peptide, matching_type, None)?,
                "{} {:?}",
                peptide,
                matching_type
            );
        }
    }

    // Starts right after a K, inside the protein otherwise
    assert!(!tags.query("LQSRPAAPPAPGPGQLTLR", MatchingType::Exact, None)?.is_empty());
    assert!(tags.query("SRPAAP", MatchingType::Exact, None)?.is_empty());
    Ok(())
}

#[test]
fn tag_index_is_complete() -> Result<(), Error> {
    let fasta = fasta();
    let table = AminoAcidTable::default();
    let index = TagIndexer::new(&fasta, table.alphabet())
        .batch_size(1)
        .threads(3)
        .run(&mut |_| {})?;

    for accession in fasta.accessions()? {
        let sequence = fasta.sequence(&accession)?;
        for (idx, window) in sequence.as_bytes().windows(3).enumerate() {
            let tag = [window[0], window[1], window[2]];
            assert!(index.get(&tag).unwrap()[&accession].contains(&idx));
        }
    }
    Ok(())
}
