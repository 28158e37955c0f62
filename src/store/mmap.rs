//! The memory-mapped backend: one `.npy` file per chromosome.
//!
//! During loading, values buffer in dense in-memory arrays; finalize
//! writes each chromosome to `<seqname>.npy` and remaps the files as
//! read-only typed views. After reopening, a query touches only the
//! mapped pages it needs, so stores much larger than memory stay cheap
//! to read.

use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use genomap::GenomeMap;
use memmap2::Mmap;
use ndarray::{s, ArrayView3, ArrayViewMut3};
use ndarray_npy::{write_npy, ViewNpyExt};

use crate::error::CovArrayError;
use crate::store::memory::MemoryBackend;
use crate::store::StoreLayout;
use crate::traits::CoverageValue;
use crate::Position;

fn npy_path(dir: &Path, seqname: &str) -> PathBuf {
    dir.join(format!("{}.npy", seqname))
}

enum MmapState<T: CoverageValue> {
    Loading(MemoryBackend<T>),
    Ready(GenomeMap<Mmap>),
}

pub(crate) struct MmapBackend<T: CoverageValue> {
    state: MmapState<T>,
    layout: StoreLayout,
    dir: PathBuf,
}

impl<T: CoverageValue> MmapBackend<T> {
    pub(crate) fn create(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        Ok(Self {
            state: MmapState::Loading(MemoryBackend::zeroed(layout)?),
            layout: layout.clone(),
            dir: dir.to_path_buf(),
        })
    }

    pub(crate) fn open(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        let maps = map_files::<T>(dir, layout)?;
        Ok(Self {
            state: MmapState::Ready(maps),
            layout: layout.clone(),
            dir: dir.to_path_buf(),
        })
    }

    pub(crate) fn write_run(
        &mut self,
        seqname: &str,
        strand_row: usize,
        condition: usize,
        start: Position,
        values: &[T],
    ) -> Result<(), CovArrayError> {
        match &mut self.state {
            MmapState::Loading(buffer) => {
                buffer.write_run(seqname, strand_row, condition, start, values)
            }
            MmapState::Ready(_) => Err(CovArrayError::StoreFinalized),
        }
    }

    pub(crate) fn read_into(
        &self,
        seqname: &str,
        span: Range<usize>,
        mut out: ArrayViewMut3<'_, T>,
    ) -> Result<(), CovArrayError> {
        match &self.state {
            MmapState::Loading(buffer) => buffer.read_into(seqname, span, out),
            MmapState::Ready(maps) => {
                let mmap = maps
                    .get(seqname)
                    .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))?;
                let view = ArrayView3::<T>::view_npy(&mmap[..])?;
                out.assign(&view.slice(s![span, .., ..]));
                Ok(())
            }
        }
    }

    pub(crate) fn finalize(&mut self) -> Result<(), CovArrayError> {
        if let MmapState::Loading(buffer) = &self.state {
            for seqname in self.layout.seqlens.keys() {
                let array = buffer
                    .get(seqname)
                    .ok_or_else(|| CovArrayError::MissingSequence(seqname.clone()))?;
                write_npy(npy_path(&self.dir, seqname), array)?;
            }
            self.state = MmapState::Ready(map_files::<T>(&self.dir, &self.layout)?);
        }
        Ok(())
    }
}

/// Map every chromosome's file, checking each against the layout so a
/// stale or foreign file fails before it is ever served.
fn map_files<T: CoverageValue>(
    dir: &Path,
    layout: &StoreLayout,
) -> Result<GenomeMap<Mmap>, CovArrayError> {
    let mut maps = GenomeMap::new();
    for (seqname, length) in &layout.seqlens {
        let file = File::open(npy_path(dir, seqname))?;
        let mmap = unsafe { Mmap::map(&file)? };
        {
            let view = ArrayView3::<T>::view_npy(&mmap[..])?;
            let expected = [*length as usize, layout.strand_dim, layout.n_conditions];
            if view.shape() != &expected {
                return Err(CovArrayError::ManifestMismatch(format!(
                    "'{}.npy' has shape {:?}, expected {:?}",
                    seqname,
                    view.shape(),
                    expected
                )));
            }
        }
        maps.insert(seqname, mmap)?;
    }
    Ok(maps)
}
