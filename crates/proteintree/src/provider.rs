use crate::Error;
use std::sync::Arc;

/// Accession to sequence lookup backing the index
///
/// The tree stores only accessions and seed offsets, and re-reads residues
/// through this trait whenever it splits a node or verifies a leaf. A
/// provider must therefore keep returning the same sequence for an accession
/// for as long as a tree built from it is alive.
pub trait SequenceProvider: Send + Sync {
    /// Full sequence of `accession`, or [`Error::NotFound`]
    fn sequence(&self, accession: &str) -> Result<Arc<str>, Error>;

    /// Every accession in the database, in a stable order
    fn accessions(&self) -> Result<Vec<Arc<str>>, Error>;
}

impl<P: SequenceProvider + ?Sized> SequenceProvider for Arc<P> {
    fn sequence(&self, accession: &str) -> Result<Arc<str>, Error> {
        (**self).sequence(accession)
    }

    fn accessions(&self) -> Result<Vec<Arc<str>>, Error> {
        (**self).accessions()
    }
}
