//! Traits used by the covarray library.
//!

use std::fmt::Debug;
use std::ops::AddAssign;

use indexmap::IndexMap;
use ndarray_npy::{ViewElement, WritableElement};
use num_traits::{One, Zero};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::CovArrayError;
use crate::interval::Interval;
use crate::sources::AlignmentRecord;
use crate::store::CoverageArray;
use crate::Position;

/// The element types coverage arrays can hold.
///
/// Implemented for `f32`, `f64`, and the common integer widths. The
/// bounds cover counting ([`Zero`], [`One`], [`AddAssign`]), log-record
/// serialization (serde), and `.npy` persistence (`ndarray-npy` element
/// traits). [`CoverageValue::DTYPE`] tags persisted manifests so a store
/// cannot be reopened at the wrong element type.
pub trait CoverageValue:
    Copy
    + Default
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Zero
    + One
    + AddAssign
    + Serialize
    + DeserializeOwned
    + WritableElement
    + ViewElement
{
    /// Short stable tag identifying the element type in persisted
    /// manifests.
    const DTYPE: &'static str;
}

macro_rules! impl_coverage_value {
    ($($type:ty => $tag:literal),* $(,)?) => {
        $(
            impl CoverageValue for $type {
                const DTYPE: &'static str = $tag;
            }
        )*
    };
}

impl_coverage_value!(
    f32 => "f32",
    f64 => "f64",
    i32 => "i32",
    i64 => "i64",
    u32 => "u32",
    u64 => "u64",
);

/// Maps dense indices `0..len` to genomic intervals.
///
/// Implementors enumerate a fixed set of equal-width windows so callers
/// can address them by integer index. Every emitted interval has width
/// [`RegionIndexer::binsize`].
pub trait RegionIndexer {
    /// The number of regions.
    fn len(&self) -> usize;

    /// Whether the indexer enumerates no regions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The uniform region width.
    fn binsize(&self) -> Position;

    /// The interval at `index`.
    ///
    /// Errors with [`CovArrayError::RegionIndexOutOfBounds`] when
    /// `index >= len()`.
    fn interval(&self, index: usize) -> Result<Interval, CovArrayError>;
}

/// Fills a [`CoverageArray`] exactly once, at construction.
///
/// [`CoverageArray::create`] consumes the loader, runs it against the
/// still-writable store, and finalizes afterwards, so a loader cannot be
/// re-run against a populated store.
pub trait Loader<T: CoverageValue> {
    fn load(self, store: &mut CoverageArray<T>) -> Result<(), CovArrayError>;
}

/// Adapter implementing [`Loader`] for a closure.
pub struct FnLoader<F>(pub F);

impl<T, F> Loader<T> for FnLoader<F>
where
    T: CoverageValue,
    F: FnOnce(&mut CoverageArray<T>) -> Result<(), CovArrayError>,
{
    fn load(self, store: &mut CoverageArray<T>) -> Result<(), CovArrayError> {
        (self.0)(store)
    }
}

/// Boxed fallible iterator over [`AlignmentRecord`]s.
pub type AlignmentIter<'a> = Box<dyn Iterator<Item = Result<AlignmentRecord, CovArrayError>> + 'a>;

/// A per-chromosome stream of alignment records.
///
/// This is the seam between raw alignment files and
/// [`CountAlignments`](crate::loaders::CountAlignments): the loader asks
/// for one chromosome at a time, in genome order, and gets `Ok(None)` for
/// chromosomes the source holds no data for (logged, left at zero).
pub trait AlignmentSource {
    /// A stable identifier for this source, used as the default
    /// condition label.
    fn identifier(&self) -> String;

    /// Sequence names and lengths known to this source, used to infer a
    /// genome when none is supplied. Must be deterministic for identical
    /// input.
    fn reference_sequences(&self) -> Result<IndexMap<String, Position>, CovArrayError>;

    /// An iterator over one chromosome's records, or `Ok(None)` when the
    /// chromosome is absent from the source.
    fn alignments(&mut self, seqname: &str)
        -> Result<Option<AlignmentIter<'_>>, CovArrayError>;
}

/// Per-base numeric signal over a genome.
///
/// [`SumSignal`](crate::loaders::SumSignal) queries one region at a time
/// and sums what it gets back. `Ok(None)` marks a chromosome absent from
/// the source; such regions are logged and left at zero.
pub trait SignalSource<T> {
    /// A stable identifier for this source, used as the default
    /// condition label.
    fn identifier(&self) -> String;

    /// Per-base values over `[start, end)` on `seqname`, or `Ok(None)`
    /// when the chromosome is absent. The returned vector has exactly
    /// `end - start` entries.
    fn values(
        &mut self,
        seqname: &str,
        start: Position,
        end: Position,
    ) -> Result<Option<Vec<T>>, CovArrayError>;
}
