//! [`CoverageDataset`]: windowed, strand-normalized retrieval over a
//! shared [`CoverageArray`].
//!
//! A dataset pairs a store with a region indexer and a flank width.
//! Queries address windows by integer index; every returned window has
//! the same `(window, strand, condition)` shape, reverse-strand windows
//! are flipped so the positional axis always reads 5' to 3', and an
//! optional transform chain runs over each assembled batch.
//! [`CoverageDatasetBuilder`] is the front door: it wires regions, a
//! genome, sources, and a storage choice into a populated dataset.

use std::ops::{Bound, RangeBounds};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{s, Array3, Array4, Axis};

use crate::error::CovArrayError;
use crate::index::WindowIndex;
use crate::interval::Interval;
use crate::loaders::{CountAlignments, SumSignal};
use crate::store::{CoverageArray, StorageKind, StoreConfig};
use crate::traits::{AlignmentSource, CoverageValue, RegionIndexer, SignalSource};
use crate::Position;

/// A post-read transform applied to every assembled batch.
pub type Transform<T> = Box<dyn Fn(Array4<T>) -> Array4<T> + Send + Sync>;

pub struct CoverageDataset<T: CoverageValue, I> {
    store: Arc<CoverageArray<T>>,
    indexer: I,
    flank: Position,
    transforms: Vec<Transform<T>>,
}

impl<T, I> CoverageDataset<T, I>
where
    T: CoverageValue,
    I: RegionIndexer,
{
    /// A dataset over an already-populated store. The store is shared;
    /// several datasets with different indexers or flanks can serve
    /// windows out of one array.
    pub fn new(store: Arc<CoverageArray<T>>, indexer: I, flank: Position) -> Self {
        Self {
            store,
            indexer,
            flank,
            transforms: Vec::new(),
        }
    }

    /// Append a transform; transforms run on each assembled batch in
    /// registration order.
    pub fn add_transform(
        &mut self,
        transform: impl Fn(Array4<T>) -> Array4<T> + Send + Sync + 'static,
    ) {
        self.transforms.push(Box::new(transform));
    }

    /// The number of addressable windows.
    pub fn len(&self) -> usize {
        self.indexer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexer.is_empty()
    }

    /// Positions added on each side of a window.
    pub fn flank(&self) -> Position {
        self.flank
    }

    /// The positional extent of every returned window,
    /// `2 * flank + binsize`.
    pub fn window_width(&self) -> usize {
        (2 * self.flank + self.indexer.binsize()) as usize
    }

    /// `(windows, window width, strands, conditions)`; no I/O.
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (
            self.len(),
            self.window_width(),
            self.store.strand_dim(),
            self.store.n_conditions(),
        )
    }

    /// The backing store.
    pub fn store(&self) -> &CoverageArray<T> {
        &self.store
    }

    /// The condition labels, in axis order.
    pub fn conditions(&self) -> &[String] {
        self.store.conditions()
    }

    /// One window as `(window width, strands, conditions)`.
    pub fn get(&self, index: usize) -> Result<Array3<T>, CovArrayError> {
        let batch = self.get_batch(&[index])?;
        Ok(batch.index_axis_move(Axis(0), 0))
    }

    /// A batch of windows, one row per index, in the given order, as
    /// `(batch, window width, strands, conditions)`.
    ///
    /// Windows whose interval lies on the reverse strand are flipped on
    /// the positional and strand axes, never the condition axis, so
    /// row 0 of the strand axis is always the window's own sense
    /// strand.
    pub fn get_batch(&self, indices: &[usize]) -> Result<Array4<T>, CovArrayError> {
        let width = self.window_width();
        let mut batch = Array4::zeros((
            indices.len(),
            width,
            self.store.strand_dim(),
            self.store.n_conditions(),
        ));
        for (row, &index) in indices.iter().enumerate() {
            let interval = self.indexer.interval(index)?;
            if interval.width() != self.indexer.binsize() {
                return Err(CovArrayError::IntervalWidthMismatch {
                    expected: self.indexer.binsize(),
                    found: interval.width(),
                });
            }
            let window = self.store.read_window(&interval, self.flank)?;
            if interval.strand.is_reverse() {
                batch
                    .index_axis_mut(Axis(0), row)
                    .assign(&window.slice(s![..;-1, ..;-1, ..]));
            } else {
                batch.index_axis_mut(Axis(0), row).assign(&window);
            }
        }
        for transform in &self.transforms {
            batch = transform(batch);
        }
        Ok(batch)
    }

    /// A contiguous batch; unbounded ends default to `0` and `len()`.
    pub fn get_range(&self, range: impl RangeBounds<usize>) -> Result<Array4<T>, CovArrayError> {
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end + 1,
            Bound::Excluded(&end) => end,
            Bound::Unbounded => self.len(),
        };
        if end > self.len() {
            return Err(CovArrayError::RegionIndexOutOfBounds {
                index: end,
                len: self.len(),
            });
        }
        if start > end {
            return Err(CovArrayError::RegionIndexOutOfBounds {
                index: start,
                len: self.len(),
            });
        }
        let indices: Vec<usize> = (start..end).collect();
        self.get_batch(&indices)
    }
}

enum RegionInput {
    Bed(PathBuf),
    Intervals(Vec<Interval>),
}

/// Builds a populated [`CoverageDataset`] end to end: regions become a
/// [`WindowIndex`], sources and a loader populate a store, and the two
/// meet in a dataset.
///
/// Two terminal methods pick the loader: [`from_alignments`] counts
/// alignment 5' ends into a stranded store; [`from_signal`] sums
/// continuous signal at window anchors into an unstranded store.
///
/// [`from_alignments`]: CoverageDatasetBuilder::from_alignments
/// [`from_signal`]: CoverageDatasetBuilder::from_signal
pub struct CoverageDatasetBuilder {
    name: String,
    regions: Option<RegionInput>,
    binsize: Position,
    stepsize: Option<Position>,
    flank: Position,
    seqlens: Option<IndexMap<String, Position>>,
    conditions: Option<Vec<String>>,
    min_mapq: u8,
    storage: StorageKind,
    cachedir: Option<PathBuf>,
    overwrite: bool,
}

impl CoverageDatasetBuilder {
    /// A new builder. Defaults: binsize 200, stepsize equal to binsize,
    /// no flank, no mapping-quality filter, in-memory storage. The name
    /// namespaces persisted stores under the cache directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regions: None,
            binsize: 200,
            stepsize: None,
            flank: 0,
            seqlens: None,
            conditions: None,
            min_mapq: 0,
            storage: StorageKind::InMemory,
            cachedir: None,
            overwrite: false,
        }
    }

    /// Enumerate windows over the regions in a BED file.
    pub fn regions_bed(mut self, path: impl Into<PathBuf>) -> Self {
        self.regions = Some(RegionInput::Bed(path.into()));
        self
    }

    /// Enumerate windows over in-memory regions.
    pub fn regions(mut self, regions: Vec<Interval>) -> Self {
        self.regions = Some(RegionInput::Intervals(regions));
        self
    }

    pub fn binsize(mut self, binsize: Position) -> Self {
        self.binsize = binsize;
        self
    }

    pub fn stepsize(mut self, stepsize: Position) -> Self {
        self.stepsize = Some(stepsize);
        self
    }

    pub fn flank(mut self, flank: Position) -> Self {
        self.flank = flank;
        self
    }

    /// Sequence lengths for the store. Optional for alignment datasets
    /// (inferred from the first source); required for signal datasets.
    pub fn seqlens(mut self, seqlens: IndexMap<String, Position>) -> Self {
        self.seqlens = Some(seqlens);
        self
    }

    /// Condition labels; defaults to the sources' identifiers.
    pub fn conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Skip alignment records below this mapping quality.
    pub fn min_mapq(mut self, min_mapq: u8) -> Self {
        self.min_mapq = min_mapq;
        self
    }

    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Parent directory for persisted stores; the dataset name is
    /// appended to it.
    pub fn cachedir(mut self, cachedir: impl Into<PathBuf>) -> Self {
        self.cachedir = Some(cachedir.into());
        self
    }

    /// Rebuild a persisted store instead of reusing it.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Count alignment 5' ends from `sources` into a stranded store,
    /// one condition per source.
    pub fn from_alignments<T, S>(
        self,
        sources: Vec<S>,
    ) -> Result<CoverageDataset<T, WindowIndex>, CovArrayError>
    where
        T: CoverageValue,
        S: AlignmentSource,
    {
        let seqlens = match &self.seqlens {
            Some(seqlens) => seqlens.clone(),
            None => sources
                .first()
                .ok_or(CovArrayError::NoConditions)?
                .reference_sequences()?,
        };
        let conditions = match &self.conditions {
            Some(conditions) => conditions.clone(),
            None => sources.iter().map(|source| source.identifier()).collect(),
        };
        let indexer = self.build_indexer()?;
        let config = self.store_config(seqlens, true, conditions)?;
        let loader = CountAlignments::new(sources).min_mapq(self.min_mapq);
        let store = CoverageArray::create(config, loader)?;
        Ok(CoverageDataset::new(Arc::new(store), indexer, self.flank))
    }

    /// Sum per-base signal from `sources` at window anchors into an
    /// unstranded store, one condition per source. Requires explicit
    /// sequence lengths.
    pub fn from_signal<T, S>(
        self,
        sources: Vec<S>,
    ) -> Result<CoverageDataset<T, WindowIndex>, CovArrayError>
    where
        T: CoverageValue,
        S: SignalSource<T>,
    {
        let seqlens = self.seqlens.clone().ok_or_else(|| {
            CovArrayError::MissingSeqlens(
                "signal datasets need explicit sequence lengths; set seqlens on the builder"
                    .to_string(),
            )
        })?;
        let conditions = match &self.conditions {
            Some(conditions) => conditions.clone(),
            None => sources.iter().map(|source| source.identifier()).collect(),
        };
        let indexer = self.build_indexer()?;
        let config = self.store_config(seqlens, false, conditions)?;
        let store = CoverageArray::create(config, SumSignal::new(sources, &indexer))?;
        Ok(CoverageDataset::new(Arc::new(store), indexer, self.flank))
    }

    fn build_indexer(&self) -> Result<WindowIndex, CovArrayError> {
        let stepsize = self.stepsize.unwrap_or(self.binsize);
        match &self.regions {
            Some(RegionInput::Bed(path)) => WindowIndex::from_bed(path, self.binsize, stepsize),
            Some(RegionInput::Intervals(intervals)) => {
                WindowIndex::from_regions(intervals.clone(), self.binsize, stepsize)
            }
            None => Err(CovArrayError::MissingRegions),
        }
    }

    fn store_config(
        &self,
        seqlens: IndexMap<String, Position>,
        stranded: bool,
        conditions: Vec<String>,
    ) -> Result<StoreConfig, CovArrayError> {
        let mut config = StoreConfig::new(seqlens, stranded, conditions)
            .storage(self.storage)
            .overwrite(self.overwrite);
        if self.storage.is_persistent() {
            let cachedir = self
                .cachedir
                .as_ref()
                .ok_or(CovArrayError::MissingStorePath(self.storage))?;
            config = config.path(cachedir.join(&self.name));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Strand;
    use crate::seqlens;
    use crate::traits::FnLoader;

    /// chr1 gets an asymmetric per-base pattern: forward row holds the
    /// position, reverse row holds the position plus 100.
    fn patterned_store() -> Arc<CoverageArray<f64>> {
        let config = StoreConfig::new(seqlens!("chr1" => 20), true, vec!["s".to_string()]);
        let store = CoverageArray::create(
            config,
            FnLoader(|store: &mut CoverageArray<f64>| {
                let forward: Vec<f64> = (0..20).map(|p| p as f64).collect();
                let reverse: Vec<f64> = (0..20).map(|p| p as f64 + 100.0).collect();
                store.write(&Interval::new("chr1", 0, 20, Strand::Forward), 0, &forward)?;
                store.write(&Interval::new("chr1", 0, 20, Strand::Reverse), 0, &reverse)
            }),
        )
        .unwrap();
        Arc::new(store)
    }

    fn patterned_dataset(flank: Position) -> CoverageDataset<f64, WindowIndex> {
        let regions = vec![
            Interval::new("chr1", 4, 12, Strand::Forward),
            Interval::new("chr1", 4, 12, Strand::Reverse),
        ];
        let index = WindowIndex::from_regions(regions, 4, 4).unwrap();
        CoverageDataset::new(patterned_store(), index, flank)
    }

    #[test]
    fn test_shape_and_len() {
        let dataset = patterned_dataset(3);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.shape(), (4, 10, 2, 1));
        let window = dataset.get(0).unwrap();
        assert_eq!(window.shape(), &[10, 2, 1]);
    }

    #[test]
    fn test_forward_window_values() {
        let dataset = patterned_dataset(1);
        // window 0 covers [4, 8) with one flank base each side
        let window = dataset.get(0).unwrap();
        let positions: Vec<f64> = (0..6).map(|i| window[[i, 0, 0]]).collect();
        assert_eq!(positions, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(window[[0, 1, 0]], 103.0);
    }

    #[test]
    fn test_reverse_window_is_flipped() {
        let dataset = patterned_dataset(1);
        let forward = dataset.get(0).unwrap();
        // window 2 is the same span on the reverse strand
        let reverse = dataset.get(2).unwrap();
        let (width, strands, conditions) = (6, 2, 1);
        for i in 0..width {
            for strand in 0..strands {
                for condition in 0..conditions {
                    assert_eq!(
                        reverse[[i, strand, condition]],
                        forward[[width - 1 - i, strands - 1 - strand, condition]]
                    );
                }
            }
        }
        // spot check: the reverse window starts at the forward row's
        // rightmost base, seen from the reverse row
        assert_eq!(reverse[[0, 0, 0]], 108.0);
        assert_eq!(reverse[[0, 1, 0]], 8.0);
    }

    #[test]
    fn test_reverse_flip_keeps_condition_axis() {
        // condition 1 carries an offset of 1000 so a flip that touched
        // the condition axis would mix the two apart
        let config = StoreConfig::new(
            seqlens!("chr1" => 20),
            true,
            vec!["a".to_string(), "b".to_string()],
        );
        let store = CoverageArray::create(
            config,
            FnLoader(|store: &mut CoverageArray<f64>| {
                for condition in 0..2 {
                    let offset = 1000.0 * condition as f64;
                    let forward: Vec<f64> = (0..20).map(|p| p as f64 + offset).collect();
                    let reverse: Vec<f64> = (0..20).map(|p| p as f64 + offset + 100.0).collect();
                    let span = |strand| Interval::new("chr1", 0, 20, strand);
                    store.write(&span(Strand::Forward), condition, &forward)?;
                    store.write(&span(Strand::Reverse), condition, &reverse)?;
                }
                Ok(())
            }),
        )
        .unwrap();

        let regions = vec![
            Interval::new("chr1", 5, 11, Strand::Forward),
            Interval::new("chr1", 5, 11, Strand::Reverse),
        ];
        let index = WindowIndex::from_regions(regions, 6, 6).unwrap();
        let dataset = CoverageDataset::new(Arc::new(store), index, 0);

        let forward = dataset.get(0).unwrap();
        let reverse = dataset.get(1).unwrap();
        for i in 0..6 {
            for strand in 0..2 {
                for condition in 0..2 {
                    assert_eq!(
                        reverse[[i, strand, condition]],
                        forward[[5 - i, 1 - strand, condition]]
                    );
                }
            }
        }
        // the second condition keeps its own offset through the flip
        assert_eq!(reverse[[0, 0, 1]], 1110.0);
        assert_eq!(reverse[[0, 1, 1]], 1010.0);
    }

    #[test]
    fn test_get_batch_preserves_order() {
        let dataset = patterned_dataset(0);
        let batch = dataset.get_batch(&[1, 0]).unwrap();
        assert_eq!(batch.shape(), &[2, 4, 2, 1]);
        assert_eq!(batch.index_axis(Axis(0), 0), dataset.get(1).unwrap());
        assert_eq!(batch.index_axis(Axis(0), 1), dataset.get(0).unwrap());
    }

    #[test]
    fn test_get_range() {
        let dataset = patterned_dataset(0);
        let all = dataset.get_range(..).unwrap();
        assert_eq!(all.shape(), &[4, 4, 2, 1]);
        let tail = dataset.get_range(2..).unwrap();
        assert_eq!(tail.shape(), &[2, 4, 2, 1]);
        assert_eq!(tail.index_axis(Axis(0), 0), dataset.get(2).unwrap());
        let out_of_range = dataset.get_range(0..9);
        assert!(matches!(
            out_of_range,
            Err(CovArrayError::RegionIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_transforms_run_in_order() {
        let mut dataset = patterned_dataset(0);
        dataset.add_transform(|batch| batch.mapv(|v| v * 2.0));
        dataset.add_transform(|batch| batch.mapv(|v| v + 1.0));
        let window = dataset.get(0).unwrap();
        // position 4 doubled then incremented
        assert_eq!(window[[0, 0, 0]], 9.0);
    }

    #[test]
    fn test_get_out_of_bounds() {
        let dataset = patterned_dataset(0);
        assert!(matches!(
            dataset.get(4),
            Err(CovArrayError::RegionIndexOutOfBounds { index: 4, len: 4 })
        ));
    }
}
