use super::input::Search;
use anyhow::Context;
use log::info;
use proteintree_core::residue::AminoAcidTable;
use proteintree_core::{ProteinMapping, ProteinTree};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct Runner {
    pub tree: ProteinTree,
    pub parameters: Search,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let fasta = proteintree_core::read_fasta(
            &parameters.fasta,
            &parameters.decoy_tag,
            parameters.generate_decoys,
        )
        .with_context(|| format!("Failed to build protein tree from `{}`", parameters.fasta))?;

        let proteins = fasta.len();
        let tree = parameters
            .tree
            .build(Arc::new(fasta), Arc::new(AminoAcidTable::default()))
            .with_context(|| format!("Failed to index `{}`", parameters.fasta))?;

        info!(
            "indexed {} proteins ({} units) in {:#?}",
            proteins,
            tree.size(),
            start.elapsed()
        );

        Ok(Self {
            tree,
            parameters,
            start,
        })
    }

    fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// One record per (matched sequence, accession), sorted
    pub fn serialize_mapping(&self, peptide: &str, mapping: &ProteinMapping) -> Vec<csv::ByteRecord> {
        let mut rows = mapping
            .iter()
            .flat_map(|(sequence, accessions)| {
                accessions
                    .iter()
                    .map(move |(accession, positions)| (sequence, accession, positions))
            })
            .collect::<Vec<_>>();
        rows.sort_unstable_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

        rows.into_iter()
            .map(|(sequence, accession, positions)| {
                let mut record = csv::ByteRecord::new();
                record.push_field(peptide.as_bytes());
                record.push_field(sequence.as_bytes());
                record.push_field(accession.as_bytes());
                record.push_field(
                    positions
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(";")
                        .as_bytes(),
                );
                record
            })
            .collect()
    }

    pub fn write_mapping(&self, records: &[csv::ByteRecord]) -> anyhow::Result<String> {
        let path = self.make_path("peptide_mapping.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers =
            csv::ByteRecord::from(vec!["peptide", "matched_sequence", "accession", "positions"]);

        wtr.write_byte_record(&headers)?;
        for record in records {
            wtr.write_byte_record(record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let query_start = Instant::now();
        let results = self.tree.query_batch(
            &self.parameters.peptides,
            self.parameters.matching_type,
            self.parameters.tolerance,
        );

        let mut records = Vec::new();
        let mut unmapped = 0;
        for (peptide, result) in self.parameters.peptides.iter().zip(results) {
            match result {
                Ok(mapping) if mapping.is_empty() => unmapped += 1,
                Ok(mapping) => records.extend(self.serialize_mapping(peptide, &mapping)),
                Err(e) => {
                    log::warn!("failed to map `{}`: {}", peptide, e);
                    unmapped += 1;
                }
            }
        }

        let stats = self.tree.cache_stats();
        info!(
            "mapped {}/{} peptides in {:#?} (cache: {} hits, {} misses)",
            self.parameters.peptides.len() - unmapped,
            self.parameters.peptides.len(),
            query_start.elapsed(),
            stats.hits(),
            stats.misses
        );

        let path = self.write_mapping(&records)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters.output_paths.push(path.display().to_string());
        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {:#?}", self.start.elapsed());
        Ok(self.parameters)
    }
}
