use crate::provider::SequenceProvider;
use crate::Error;
use fnv::FnvHashMap;
use std::sync::Arc;

/// An in-memory protein database
pub struct Fasta {
    pub targets: Vec<(Arc<str>, Arc<str>)>,
    lookup: FnvHashMap<Arc<str>, usize>,
    decoy_tag: String,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse<S: Into<String>>(contents: String, decoy_tag: S, generate_decoys: bool) -> Fasta {
        let decoy_tag = decoy_tag.into();

        let mut targets = Vec::new();
        let mut last_id = "";
        let mut s = String::new();

        let mut push = |id: &str, seq: String| {
            let acc = match id.split_ascii_whitespace().next() {
                Some(acc) => acc,
                None => return,
            };
            // Decoys are regenerated below, so drop the ones from the file
            if !acc.contains(&decoy_tag) || !generate_decoys {
                targets.push((Arc::<str>::from(acc), Arc::<str>::from(seq)));
            }
        };

        for line in contents.as_str().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(id) = line.strip_prefix('>') {
                if !s.is_empty() {
                    push(last_id, std::mem::take(&mut s));
                }
                last_id = id;
            } else {
                s.push_str(line);
            }
        }

        if !s.is_empty() {
            push(last_id, s);
        }

        if generate_decoys {
            let decoys = targets
                .iter()
                .map(|(acc, seq)| {
                    let reversed = seq.chars().rev().collect::<String>();
                    (
                        Arc::<str>::from(format!("{}{}", decoy_tag, acc)),
                        Arc::<str>::from(reversed),
                    )
                })
                .collect::<Vec<_>>();
            targets.extend(decoys);
        }

        Self::with_decoy_tag(targets, decoy_tag)
    }

    /// Build a database directly from (accession, sequence) pairs
    pub fn from_sequences<I, A, S>(sequences: I) -> Fasta
    where
        I: IntoIterator<Item = (A, S)>,
        A: Into<Arc<str>>,
        S: Into<Arc<str>>,
    {
        let targets = sequences
            .into_iter()
            .map(|(acc, seq)| (acc.into(), seq.into()))
            .collect();
        Self::with_decoy_tag(targets, "rev_".into())
    }

    fn with_decoy_tag(targets: Vec<(Arc<str>, Arc<str>)>, decoy_tag: String) -> Fasta {
        let mut lookup = FnvHashMap::default();
        for (idx, (acc, _)) in targets.iter().enumerate() {
            if lookup.insert(acc.clone(), idx).is_some() {
                log::warn!("duplicate accession `{}` in fasta, keeping last entry", acc);
            }
        }
        Fasta {
            targets,
            lookup,
            decoy_tag,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn is_decoy(&self, accession: &str) -> bool {
        accession.starts_with(&self.decoy_tag)
    }
}

impl SequenceProvider for Fasta {
    fn sequence(&self, accession: &str) -> Result<Arc<str>, Error> {
        self.lookup
            .get(accession)
            .map(|&idx| self.targets[idx].1.clone())
            .ok_or_else(|| Error::NotFound(accession.to_string()))
    }

    fn accessions(&self) -> Result<Vec<Arc<str>>, Error> {
        let mut seen = fnv::FnvHashSet::default();
        Ok(self
            .targets
            .iter()
            .filter(|(acc, _)| seen.insert(acc.clone()))
            .map(|(acc, _)| acc.clone())
            .collect())
    }
}

/// Read a FASTA file from disk
pub fn read_fasta<P: AsRef<std::path::Path>>(
    path: P,
    decoy_tag: &str,
    generate_decoys: bool,
) -> Result<Fasta, Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(Fasta::parse(contents, decoy_tag, generate_decoys))
}
