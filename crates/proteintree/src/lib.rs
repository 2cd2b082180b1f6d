pub mod cache;
pub mod enzyme;
pub mod fasta;
pub mod mass;
pub mod matching;
pub mod node;
pub mod provider;
pub mod residue;
pub mod tags;
pub mod tree;

pub use fasta::read_fasta;
pub use matching::{MatchingType, ProteinMapping};
pub use provider::SequenceProvider;
pub use residue::AminoAcidMatcher;
pub use tree::{Builder, Parameters, ProteinTree};

#[derive(Debug)]
pub enum Error {
    /// Caller error, or broken seed bookkeeping inside the index
    InvalidArgument(String),
    /// Accession missing from the sequence provider
    NotFound(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Tag indexing did not complete; carries whatever was merged
    Interrupted(Box<tags::PartialIndex>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::NotFound(accession) => write!(f, "protein `{}` not found", accession),
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::Interrupted(partial) => write!(
                f,
                "tag indexing interrupted ({} failed tasks, cancelled: {}), partial index holds {} tags",
                partial.failures.len(),
                partial.cancelled,
                partial.index.len()
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

pub fn read_json<S, T>(path: S) -> Result<T, Error>
where
    S: AsRef<str>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&contents)?)
}
