//! Inverted index of fixed length tags, built in memory-bounded batches
//!
//! Every tag over the residue alphabet is scanned against batches of
//! buffered protein sequences. Tags are handed out to a pool of worker
//! threads through a shared queue; each worker accumulates its own
//! `tag -> accession -> positions` map and sends it back over a result
//! channel once the queue is drained. The orchestrator merges the reports of
//! a batch only after every worker of that batch has finished, then moves on
//! to the next batch. Accessions never span two batches, so batch results
//! are disjoint. A protein with anything but `A`-`Z` in its sequence is
//! rejected while its batch is buffered and never reaches the workers.

use crate::enzyme::Enzyme;
use crate::matching::{match_in_protein, merge_positions, AccessionMap, AminoAcidPattern, ProteinMapping};
use crate::provider::SequenceProvider;
use crate::tree::{Progress, Stage};
use crate::Error;
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub const TAG_LENGTH: usize = 3;

pub type Tag = [u8; TAG_LENGTH];

/// Every tag of length [`TAG_LENGTH`] over `alphabet`
pub fn all_tags(alphabet: &[u8]) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(alphabet.len().pow(TAG_LENGTH as u32));
    for &a in alphabet {
        for &b in alphabet {
            for &c in alphabet {
                tags.push([a, b, c]);
            }
        }
    }
    tags
}

/// Cooperative cancellation flag, checked by workers between tags
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TagIndex {
    tags: FnvHashMap<Tag, AccessionMap>,
}

impl TagIndex {
    pub fn get(&self, tag: &Tag) -> Option<&AccessionMap> {
        self.tags.get(tag)
    }

    /// Number of tags that occur at least once
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Approximate memory footprint in accession x tag units
    pub fn size(&self) -> usize {
        self.tags.values().map(|accessions| accessions.len()).sum()
    }

    fn merge(&mut self, partial: FnvHashMap<Tag, AccessionMap>) {
        for (tag, accessions) in partial {
            let entry = self.tags.entry(tag).or_default();
            for (accession, positions) in accessions {
                merge_positions(entry.entry(accession).or_default(), &positions);
            }
        }
    }

    /// Resolve a peptide by expanding its leading tag into every candidate
    /// tag, then verifying the indexed positions against the full pattern
    pub fn get_protein_mapping(
        &self,
        pattern: &AminoAcidPattern,
        provider: &dyn SequenceProvider,
    ) -> Result<ProteinMapping, Error> {
        if pattern.len() < TAG_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "peptide should be at least of length {}",
                TAG_LENGTH
            )));
        }

        let mut result = ProteinMapping::default();
        for &a in pattern.candidates(0) {
            for &b in pattern.candidates(1) {
                for &c in pattern.candidates(2) {
                    let accessions = match self.tags.get(&[a, b, c]) {
                        Some(accessions) => accessions,
                        None => continue,
                    };
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
            }
        }
        Ok(result)
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    /// Protein that was rejected before scanning
    pub accession: Option<Arc<str>>,
    /// Tag being scanned, `None` if the whole worker went down
    pub tag: Option<String>,
    pub error: Error,
}

/// What an interrupted indexing run managed to merge
#[derive(Debug)]
pub struct PartialIndex {
    pub index: TagIndex,
    pub failures: Vec<TaskFailure>,
    pub cancelled: bool,
}

#[derive(Default)]
struct WorkerReport {
    partial: FnvHashMap<Tag, AccessionMap>,
    failures: Vec<TaskFailure>,
}

/// A protein sequence held in memory for the duration of one batch
struct Buffered {
    accession: Arc<str>,
    sequence: Arc<str>,
    /// Sorted offsets a tag may start at, `None` for any offset
    seeds: Option<Vec<usize>>,
}

type ScanFn = dyn Fn(&Tag, &[Buffered]) -> AccessionMap + Sync;

pub struct TagIndexer<'a> {
    provider: &'a dyn SequenceProvider,
    alphabet: Vec<u8>,
    enzyme: Option<Enzyme>,
    batch_size: usize,
    threads: usize,
    cancellation: Cancellation,
}

impl<'a> TagIndexer<'a> {
    pub fn new(provider: &'a dyn SequenceProvider, alphabet: &[u8]) -> Self {
        TagIndexer {
            provider,
            alphabet: alphabet.to_vec(),
            enzyme: None,
            batch_size: 100,
            threads: num_cpus::get(),
            cancellation: Cancellation::default(),
        }
    }

    /// Only index tags starting at a cleavage site of `enzyme`
    pub fn enzyme(mut self, enzyme: Option<Enzyme>) -> Self {
        self.enzyme = enzyme;
        self
    }

    /// Number of protein sequences buffered per pass
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Scan the whole database. Provider errors abort immediately; rejected
    /// proteins, failed tasks and cancellation are reported as
    /// [`Error::Interrupted`] carrying everything merged so far.
    pub fn run(&self, progress: &mut dyn FnMut(Progress)) -> Result<TagIndex, Error> {
        let start = Instant::now();
        let accessions = self.provider.accessions()?;
        let tags = all_tags(&self.alphabet);
        log::trace!(
            "indexing {} proteins with {} tags, {} per batch",
            accessions.len(),
            tags.len(),
            self.batch_size
        );

        let mut index = TagIndex::default();
        let mut failures = Vec::new();
        let mut cancelled = false;
        let mut processed = 0;

        for batch in accessions.chunks(self.batch_size) {
            if self.cancellation.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut buffer = Vec::with_capacity(batch.len());
            for accession in batch {
                let sequence = self.provider.sequence(accession)?;
                if let Err(error) = validate(accession, &sequence) {
                    log::warn!("skipping `{}`: {}", accession, error);
                    failures.push(TaskFailure {
                        accession: Some(accession.clone()),
                        tag: None,
                        error,
                    });
                    continue;
                }
                buffer.push(Buffered {
                    accession: accession.clone(),
                    seeds: self.enzyme.as_ref().map(|enzyme| enzyme.seeds(&sequence)),
                    sequence,
                });
            }

            for report in self.scan_batch(&buffer, &tags, &scan_tag) {
                index.merge(report.partial);
                failures.extend(report.failures);
            }

            processed += batch.len();
            progress(Progress {
                stage: Stage::Scanning,
                done: processed,
                total: accessions.len(),
            });

            if self.cancellation.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        log::info!(
            "tag index holds {} tags over {}/{} proteins in {:#?}",
            index.len(),
            processed,
            accessions.len(),
            start.elapsed()
        );

        if failures.is_empty() && !cancelled {
            return Ok(index);
        }
        if !failures.is_empty() {
            log::warn!("{} tag indexing tasks failed", failures.len());
        }
        Err(Error::Interrupted(Box::new(PartialIndex {
            index,
            failures,
            cancelled,
        })))
    }

    /// Run the worker pool over one buffered batch, returning one report per
    /// worker once all of them are done
    fn scan_batch(&self, buffer: &[Buffered], tags: &[Tag], scan: &ScanFn) -> Vec<WorkerReport> {
        let (tag_tx, tag_rx) = bounded(tags.len());
        for tag in tags {
            // Cannot block: the queue is sized to hold every tag
            let _ = tag_tx.send(*tag);
        }
        drop(tag_tx);

        let (report_tx, report_rx) = unbounded();
        let cancellation = &self.cancellation;

        let mut reports = std::thread::scope(|s| {
            let workers = (0..self.threads)
                .map(|_| {
                    let tag_rx = tag_rx.clone();
                    let report_tx = report_tx.clone();
                    s.spawn(move || worker(tag_rx, buffer, report_tx, cancellation, scan))
                })
                .collect::<Vec<_>>();

            let mut lost = Vec::new();
            for handle in workers {
                if handle.join().is_err() {
                    lost.push(WorkerReport {
                        partial: FnvHashMap::default(),
                        failures: vec![TaskFailure {
                            accession: None,
                            tag: None,
                            error: Error::InvalidArgument("tag indexing worker panicked".into()),
                        }],
                    });
                }
            }
            lost
        });

        drop(report_tx);
        reports.extend(report_rx.iter());
        reports
    }
}

fn worker(
    tags: Receiver<Tag>,
    buffer: &[Buffered],
    reports: Sender<WorkerReport>,
    cancellation: &Cancellation,
    scan: &ScanFn,
) {
    let mut report = WorkerReport::default();
    for tag in tags.iter() {
        if cancellation.is_cancelled() {
            break;
        }
        let hits = scan(&tag, buffer);
        if !hits.is_empty() {
            report.partial.insert(tag, hits);
        }
    }
    let _ = reports.send(report);
}

/// Tags are only ever built from uppercase residues
fn validate(accession: &str, sequence: &str) -> Result<(), Error> {
    let sequence = sequence.as_bytes();
    match sequence.iter().position(|aa| !aa.is_ascii_uppercase()) {
        Some(pos) => Err(Error::InvalidArgument(format!(
            "malformed sequence for `{}`: unexpected byte {:#04x} at {}",
            accession, sequence[pos], pos
        ))),
        None => Ok(()),
    }
}

/// Every allowed offset at which `tag` occurs in the buffered sequences
fn scan_tag(tag: &Tag, buffer: &[Buffered]) -> AccessionMap {
    let mut hits = AccessionMap::default();
    for protein in buffer {
        // Compare window contents, not identity
        let positions = protein
            .sequence
            .as_bytes()
            .windows(TAG_LENGTH)
            .enumerate()
            .filter(|(_, window)| *window == &tag[..])
            .map(|(idx, _)| idx)
            .filter(|idx| match &protein.seeds {
                Some(seeds) => seeds.binary_search(idx).is_ok(),
                None => true,
            })
            .collect::<Vec<_>>();
        if !positions.is_empty() {
            hits.insert(protein.accession.clone(), positions);
        }
    }
    hits
}
