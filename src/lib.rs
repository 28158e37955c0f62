//! # covarray: Genomic Coverage Arrays with Windowed Retrieval
//!
//! `covarray` stores per-base numeric coverage over a genome as
//! chromosome-indexed arrays and serves fixed-shape, strand-aware windows
//! out of them. It is built around a simple lifecycle:
//!
//!  1. A [`CoverageArray<T>`](crate::store::CoverageArray) is constructed
//!     from a [`StoreConfig`](crate::store::StoreConfig) and populated
//!     exactly once by a [`Loader`](crate::traits::Loader), for example
//!     [`CountAlignments`](crate::loaders::CountAlignments), which counts
//!     alignment 5' ends per base, or
//!     [`SumSignal`](crate::loaders::SumSignal), which sums a signal track
//!     over regions.
//!
//!  2. After loading, the store is *finalized*: writes error, and the
//!     array is served read-only. Stores backed by disk
//!     ([`StorageKind::AppendLog`](crate::store::StorageKind),
//!     [`StorageKind::MemoryMapped`](crate::store::StorageKind),
//!     [`StorageKind::KeyValue`](crate::store::StorageKind)) persist under
//!     a directory and are reopened on later runs without re-running the
//!     loader.
//!
//!  3. A [`CoverageDataset`](crate::dataset::CoverageDataset) pairs the
//!     store with a [`RegionIndexer`](crate::traits::RegionIndexer) (such
//!     as [`WindowIndex`](crate::index::WindowIndex)) and serves
//!     `(length, 2*flank + binsize, strands, conditions)` batches by
//!     integer index, flipping reverse-strand windows so the positional
//!     axis always reads 5' to 3'.
//!
//! Coverage is always per-base: an interval of width `w` maps to `w`
//! values per strand row and condition. Windows that extend past a
//! chromosome edge are zero-padded to their declared width, so batches
//! stack rectangularly.
//!
//! ## Example
//!
//! ```
//! use covarray::prelude::*;
//!
//! let seqlens = seqlens!("chr1" => 100, "chr2" => 50);
//! let config = StoreConfig::new(seqlens, true, vec!["sample1".to_string()]);
//!
//! // Loaders run exactly once, at construction. FnLoader wraps a
//! // closure for simple cases.
//! let store = CoverageArray::<f64>::create(
//!     config,
//!     FnLoader(|store: &mut CoverageArray<f64>| {
//!         let interval = Interval::new("chr1", 10, 14, Strand::Forward);
//!         store.write(&interval, 0, &[1.0, 2.0, 3.0, 4.0])
//!     }),
//! )?;
//!
//! let coverage = store.read(&Interval::new("chr1", 10, 14, Strand::Forward))?;
//! assert_eq!(coverage[[0, 0, 0]], 1.0);
//! assert_eq!(coverage.shape(), &[4, 2, 1]);
//! # Ok::<(), CovArrayError>(())
//! ```
//!
//! ## Design
//!
//! The storage backends all satisfy one capability set (zeroed at
//! creation, range writes during loading, range reads after), so loaders
//! and datasets are backend-agnostic. The backend is chosen by a
//! [`StorageKind`](crate::store::StorageKind) value at construction, never
//! by type parameter, so runtime configuration can pick it.
//!
//! Element types are any [`CoverageValue`](crate::traits::CoverageValue):
//! `f32`, `f64`, and the common integer widths.

pub mod dataset;
pub mod error;
pub mod index;
pub mod interval;
pub mod io;
pub mod loaders;
pub mod sources;
pub mod store;
pub mod test_utilities;
pub mod traits;

/// The main position type.
pub type Position = u32;

/// The type of signed position offsets, e.g. for flank arithmetic that
/// can extend past a chromosome start.
pub type PositionOffset = i64;

/// Create an [`IndexMap`](indexmap::IndexMap) of sequence names and their lengths.
#[macro_export]
macro_rules! seqlens {
    ($($key:expr => $value:expr),* $(,)?) => {
        {
            let mut seqlens = indexmap::IndexMap::new();
            $(seqlens.insert($key.to_string(), $value);)*
            seqlens
        }
    };
}

/// The covarray prelude.
pub mod prelude {
    pub use crate::dataset::{CoverageDataset, CoverageDatasetBuilder};
    pub use crate::error::CovArrayError;
    pub use crate::index::WindowIndex;
    pub use crate::interval::{Interval, Strand};
    pub use crate::io::file::read_seqlens;
    pub use crate::loaders::{CountAlignments, SumSignal};
    pub use crate::sources::{AlignmentRecord, BedAlignmentSource, BedGraphSource};
    pub use crate::store::{CoverageArray, StorageKind, StoreConfig};
    pub use crate::traits::{
        AlignmentSource, CoverageValue, FnLoader, Loader, RegionIndexer, SignalSource,
    };
    pub use crate::{seqlens, Position, PositionOffset};
}
