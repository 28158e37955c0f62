//! Windowed region indexing with [`WindowIndex`].
//!
//! A [`WindowIndex`] takes a set of regions and enumerates the
//! fixed-width windows they contain: a region of width `w` yields
//! `(w - binsize) / stepsize + 1` windows when `w >= binsize` and none
//! otherwise, so only full-width windows are kept and any remainder is
//! chopped. Windows are addressed by a dense index in region order and
//! resolved with a binary search over cumulative window counts.

use std::path::Path;

use crate::error::CovArrayError;
use crate::interval::Interval;
use crate::io::bed::read_regions;
use crate::traits::RegionIndexer;
use crate::Position;

/// Enumerates fixed-width windows over a set of regions.
///
/// Windows inherit their region's sequence name and strand. Regions too
/// short for a single window contribute nothing, but are kept and
/// visible through [`WindowIndex::regions`].
#[derive(Clone, Debug)]
pub struct WindowIndex {
    regions: Vec<Interval>,
    /// Cumulative window counts; `offsets[i]` is the number of windows
    /// in regions before region `i`, and the last entry is the total.
    offsets: Vec<usize>,
    binsize: Position,
    stepsize: Position,
}

impl WindowIndex {
    /// Create a window index over `regions` with the given window width
    /// (`binsize`) and spacing between adjacent window starts
    /// (`stepsize`).
    pub fn from_regions(
        regions: impl IntoIterator<Item = Interval>,
        binsize: Position,
        stepsize: Position,
    ) -> Result<Self, CovArrayError> {
        if binsize < 1 {
            return Err(CovArrayError::InvalidWindowConfig(format!(
                "binsize must be at least 1, got {}",
                binsize
            )));
        }
        if stepsize < 1 {
            return Err(CovArrayError::InvalidWindowConfig(format!(
                "stepsize must be at least 1, got {}",
                stepsize
            )));
        }
        let regions: Vec<Interval> = regions.into_iter().collect();
        let mut offsets = Vec::with_capacity(regions.len() + 1);
        offsets.push(0);
        let mut total = 0usize;
        for region in &regions {
            if region.start >= region.end {
                return Err(CovArrayError::InvalidGenomicRange(
                    region.start,
                    region.end,
                ));
            }
            let width = region.width();
            if width >= binsize {
                total += ((width - binsize) / stepsize) as usize + 1;
            }
            offsets.push(total);
        }
        Ok(Self {
            regions,
            offsets,
            binsize,
            stepsize,
        })
    }

    /// Create a window index from a BED-like file of regions; see
    /// [`read_regions`] for how columns are handled.
    pub fn from_bed(
        filepath: impl AsRef<Path>,
        binsize: Position,
        stepsize: Position,
    ) -> Result<Self, CovArrayError> {
        let regions = read_regions(filepath)?;
        Self::from_regions(regions, binsize, stepsize)
    }

    /// The regions windows are drawn from.
    pub fn regions(&self) -> &[Interval] {
        &self.regions
    }

    /// The spacing between adjacent window starts.
    pub fn stepsize(&self) -> Position {
        self.stepsize
    }
}

impl RegionIndexer for WindowIndex {
    fn len(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    fn binsize(&self) -> Position {
        self.binsize
    }

    fn interval(&self, index: usize) -> Result<Interval, CovArrayError> {
        let total = self.len();
        if index >= total {
            return Err(CovArrayError::RegionIndexOutOfBounds { index, len: total });
        }
        // the first offset entry greater than index belongs to the
        // region after the one holding this window
        let region_index = self.offsets.partition_point(|&offset| offset <= index) - 1;
        let region = &self.regions[region_index];
        let within = (index - self.offsets[region_index]) as Position;
        let start = region.start + within * self.stepsize;
        Ok(Interval::new(
            region.seqname.clone(),
            start,
            start + self.binsize,
            region.strand,
        ))
    }
}
