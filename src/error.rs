//! The [`CovArrayError`] `enum` definition and error messages.
//!
use crate::store::StorageKind;
use crate::Position;
use genomap::GenomeMapError;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

/// The [`CovArrayError`] defines the standard set of errors that should
/// be passed to the user.
#[derive(Debug, Error)]
pub enum CovArrayError {
    // IO related errors
    #[error("File reading error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // File parsing related errors
    #[error("Integer parsing error: {0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("Float parsing error: {0}")]
    ParseFloatError(#[from] ParseFloatError),
    #[error("Region file is invalid: {0}")]
    InvalidRegionFile(String),
    #[error("Genome file is invalid: {0}")]
    InvalidGenomeFile(String),
    #[error("Invalid strand '{0}': must be either '+', '-', or '.'")]
    InvalidStrand(String),

    // Invalid genomic range errors
    #[error("Range invalid: start ({0}) must be less than end ({1})")]
    InvalidGenomicRange(Position, Position),
    #[error("Range [{1}, {2}) on '{0}' is invalid for sequence of length {3}")]
    InvalidGenomicRangeForSequence(String, Position, Position, Position),
    #[error("Sequence name '{0}' is not in the coverage array")]
    MissingSequence(String),
    #[error("Error encountered in genomap::GenomeMap")]
    GenomeMapError(#[from] GenomeMapError),

    // Store errors
    #[error("Values length mismatch: interval covers {expected} positions but {found} values were supplied")]
    ValuesLengthMismatch { expected: usize, found: usize },
    #[error("Condition index {index} is out of bounds for store with {len} conditions")]
    ConditionOutOfBounds { index: usize, len: usize },
    #[error("Store holds {conditions} conditions but {sources} sources were supplied")]
    ConditionCountMismatch { conditions: usize, sources: usize },
    #[error("Store is unstranded: {0}")]
    UnstrandedStore(String),
    #[error("Store is finalized and can no longer be written to")]
    StoreFinalized,
    #[error("Storage backend {0:?} requires a directory; none was configured")]
    MissingStorePath(StorageKind),
    #[error("Store has no conditions; at least one condition label is required")]
    NoConditions,
    #[error("Persisted store does not match the requested configuration: {0}")]
    ManifestMismatch(String),

    // Array persistence errors
    #[error("Could not write .npy file: {0}")]
    NpyWriteError(#[from] ndarray_npy::WriteNpyError),
    #[error("Could not map .npy file: {0}")]
    NpyViewError(#[from] ndarray_npy::ViewNpyError),

    // Region indexer errors
    #[error("Region index {index} is out of bounds for indexer of length {len}")]
    RegionIndexOutOfBounds { index: usize, len: usize },
    #[error("Invalid window configuration: {0}")]
    InvalidWindowConfig(String),
    #[error("Indexer emitted an interval of width {found}, expected binsize {expected}")]
    IntervalWidthMismatch { expected: Position, found: Position },
    #[error("No regions were supplied; windows require regions")]
    MissingRegions,
    #[error("Sequence lengths are required: {0}")]
    MissingSeqlens(String),
}

impl From<Box<bincode::ErrorKind>> for CovArrayError {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        CovArrayError::SerializationError(error.to_string())
    }
}
