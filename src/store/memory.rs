//! The in-memory backend: zeroed dense arrays, one per chromosome.

use std::ops::Range;

use genomap::GenomeMap;
use ndarray::{s, Array3, ArrayView1, ArrayViewMut3};

use crate::error::CovArrayError;
use crate::store::StoreLayout;
use crate::traits::CoverageValue;
use crate::Position;

/// Dense `(position, strand, condition)` arrays keyed by sequence name.
///
/// This is the whole store for in-memory storage, and the loading-phase
/// buffer the persistent backends fill before writing their files.
pub(crate) struct MemoryBackend<T: CoverageValue> {
    data: GenomeMap<Array3<T>>,
}

impl<T: CoverageValue> MemoryBackend<T> {
    pub(crate) fn zeroed(layout: &StoreLayout) -> Result<Self, CovArrayError> {
        let mut data = GenomeMap::new();
        for (seqname, length) in &layout.seqlens {
            let array = Array3::zeros((*length as usize, layout.strand_dim, layout.n_conditions));
            data.insert(seqname, array)?;
        }
        Ok(Self { data })
    }

    pub(crate) fn write_run(
        &mut self,
        seqname: &str,
        strand_row: usize,
        condition: usize,
        start: Position,
        values: &[T],
    ) -> Result<(), CovArrayError> {
        let array = self
            .data
            .get_mut(seqname)
            .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))?;
        let start = start as usize;
        array
            .slice_mut(s![start..start + values.len(), strand_row, condition])
            .assign(&ArrayView1::from(values));
        Ok(())
    }

    pub(crate) fn read_into(
        &self,
        seqname: &str,
        span: Range<usize>,
        mut out: ArrayViewMut3<'_, T>,
    ) -> Result<(), CovArrayError> {
        let array = self
            .data
            .get(seqname)
            .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))?;
        out.assign(&array.slice(s![span, .., ..]));
        Ok(())
    }

    /// The full array for one chromosome; used by persistent backends
    /// when flushing to disk.
    pub(crate) fn get(&self, seqname: &str) -> Option<&Array3<T>> {
        self.data.get(seqname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqlens;
    use ndarray::Array3;

    fn test_layout() -> StoreLayout {
        StoreLayout::new(seqlens!("chr1" => 20), true, 1)
    }

    #[test]
    fn test_zeroed_then_write() {
        let mut backend = MemoryBackend::<f64>::zeroed(&test_layout()).unwrap();
        backend.write_run("chr1", 1, 0, 5, &[1.0, 2.0]).unwrap();

        let mut out = Array3::zeros((3, 2, 1));
        backend.read_into("chr1", 4..7, out.view_mut()).unwrap();
        assert_eq!(out[[0, 1, 0]], 0.0);
        assert_eq!(out[[1, 1, 0]], 1.0);
        assert_eq!(out[[2, 1, 0]], 2.0);
        assert_eq!(out[[1, 0, 0]], 0.0);
    }

    #[test]
    fn test_unknown_sequence_errors() {
        let mut backend = MemoryBackend::<f64>::zeroed(&test_layout()).unwrap();
        let result = backend.write_run("chrX", 0, 0, 0, &[1.0]);
        assert!(matches!(result, Err(CovArrayError::MissingSequence(_))));
    }
}
