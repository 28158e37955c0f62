//! Coverage array storage: [`CoverageArray`] and its backends.
//!
//! A [`CoverageArray<T>`] holds per-base values over a genome as dense
//! `(position, strand, condition)` arrays, one per chromosome. Four
//! backends share one capability set (zeroed at creation, range writes
//! while loading, range reads after), so loaders and queries never care
//! which one is underneath:
//!
//!  - [`StorageKind::InMemory`]: heap arrays, nothing persists.
//!  - [`StorageKind::AppendLog`]: heap arrays mirrored to an append-only
//!    log of run records, replayed on open.
//!  - [`StorageKind::MemoryMapped`]: one `.npy` per chromosome, written
//!    at finalize and memory-mapped for reads.
//!  - [`StorageKind::KeyValue`]: compressed position blocks behind an
//!    offset index.
//!
//! Persistent stores carry a manifest recording the genome, strand
//! layout, conditions, backend, and element type; reopening validates
//! against it so a cached store is never silently reinterpreted.

mod append;
mod kv;
mod memory;
mod mmap;

use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use memmap2::Mmap;
use ndarray::{s, Array3, ArrayViewMut3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CovArrayError;
use crate::interval::{try_range, Interval, Strand};
use crate::traits::{CoverageValue, Loader};
use crate::{Position, PositionOffset};

use append::AppendLogBackend;
use kv::KvBackend;
use memory::MemoryBackend;
use mmap::MmapBackend;

pub(crate) const MANIFEST_FILENAME: &str = "manifest.bin";

/// Which backend holds the coverage values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Dense arrays on the heap; nothing persists.
    InMemory,
    /// Dense arrays on the heap, mirrored to an append-only log of run
    /// records which is replayed on open.
    AppendLog,
    /// One `.npy` file per chromosome, written at finalize and
    /// memory-mapped for reads.
    MemoryMapped,
    /// Per-row position blocks, compressed and looked up through an
    /// offset index.
    KeyValue,
}

impl StorageKind {
    /// Whether this backend persists under a directory.
    pub fn is_persistent(&self) -> bool {
        !matches!(self, StorageKind::InMemory)
    }
}

/// Configuration for creating a [`CoverageArray`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Sequence names and lengths defining the genome.
    pub seqlens: IndexMap<String, Position>,
    /// Whether to keep separate forward and reverse strand rows.
    pub stranded: bool,
    /// Condition (sample) labels, one per entry of the condition axis.
    pub conditions: Vec<String>,
    /// Backend choice.
    pub storage: StorageKind,
    /// Directory for persistent backends; ignored by in-memory stores.
    pub path: Option<PathBuf>,
    /// Rebuild even if a persisted store already exists at `path`.
    pub overwrite: bool,
}

impl StoreConfig {
    /// A new configuration with in-memory storage and no persistence.
    pub fn new(
        seqlens: IndexMap<String, Position>,
        stranded: bool,
        conditions: Vec<String>,
    ) -> Self {
        Self {
            seqlens,
            stranded,
            conditions,
            storage: StorageKind::InMemory,
            path: None,
            overwrite: false,
        }
    }

    /// Set the storage backend.
    pub fn storage(mut self, storage: StorageKind) -> Self {
        self.storage = storage;
        self
    }

    /// Set the directory persistent backends live under.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Rebuild even when a persisted store exists.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// What a persisted store records about itself; checked when reopening.
#[derive(Debug, Serialize, Deserialize)]
struct StoreManifest {
    seqlens: IndexMap<String, Position>,
    stranded: bool,
    conditions: Vec<String>,
    storage: StorageKind,
    dtype: String,
}

/// Array geometry shared by the backends.
#[derive(Clone, Debug)]
pub(crate) struct StoreLayout {
    pub(crate) seqlens: IndexMap<String, Position>,
    pub(crate) strand_dim: usize,
    pub(crate) n_conditions: usize,
}

impl StoreLayout {
    pub(crate) fn new(
        seqlens: IndexMap<String, Position>,
        stranded: bool,
        n_conditions: usize,
    ) -> Self {
        Self {
            seqlens,
            strand_dim: if stranded { 2 } else { 1 },
            n_conditions,
        }
    }
}

enum Backend<T: CoverageValue> {
    Memory(MemoryBackend<T>),
    Append(AppendLogBackend<T>),
    Mmap(MmapBackend<T>),
    KeyValue(KvBackend<T>),
}

impl<T: CoverageValue> Backend<T> {
    fn write_run(
        &mut self,
        seqname: &str,
        strand_row: usize,
        condition: usize,
        start: Position,
        values: &[T],
    ) -> Result<(), CovArrayError> {
        match self {
            Backend::Memory(backend) => {
                backend.write_run(seqname, strand_row, condition, start, values)
            }
            Backend::Append(backend) => {
                backend.write_run(seqname, strand_row, condition, start, values)
            }
            Backend::Mmap(backend) => {
                backend.write_run(seqname, strand_row, condition, start, values)
            }
            Backend::KeyValue(backend) => {
                backend.write_run(seqname, strand_row, condition, start, values)
            }
        }
    }

    fn read_into(
        &self,
        seqname: &str,
        span: Range<usize>,
        out: ArrayViewMut3<'_, T>,
    ) -> Result<(), CovArrayError> {
        match self {
            Backend::Memory(backend) => backend.read_into(seqname, span, out),
            Backend::Append(backend) => backend.read_into(seqname, span, out),
            Backend::Mmap(backend) => backend.read_into(seqname, span, out),
            Backend::KeyValue(backend) => backend.read_into(seqname, span, out),
        }
    }

    fn finalize(&mut self) -> Result<(), CovArrayError> {
        match self {
            Backend::Memory(_) => Ok(()),
            Backend::Append(backend) => backend.finalize(),
            Backend::Mmap(backend) => backend.finalize(),
            Backend::KeyValue(backend) => backend.finalize(),
        }
    }
}

/// Per-base coverage over a genome, with a strand and a condition axis.
///
/// Values live in dense `(position, strand, condition)` arrays, one per
/// chromosome, in a backend picked by [`StorageKind`] at construction.
/// A store is populated exactly once by a [`Loader`] passed to
/// [`CoverageArray::create`]; afterwards it is finalized and read-only,
/// and reads can be shared freely across threads.
pub struct CoverageArray<T: CoverageValue> {
    layout: StoreLayout,
    conditions: Vec<String>,
    storage: StorageKind,
    path: Option<PathBuf>,
    backend: Backend<T>,
    finalized: bool,
}

impl<T: CoverageValue> CoverageArray<T> {
    /// Create a store from `config`, populating it with `loader`.
    ///
    /// For persistent backends, if a store already exists under
    /// `config.path` and `config.overwrite` is false, it is reopened and
    /// validated against `config` instead, and the loader never runs.
    pub fn create<L: Loader<T>>(config: StoreConfig, loader: L) -> Result<Self, CovArrayError> {
        if config.conditions.is_empty() {
            return Err(CovArrayError::NoConditions);
        }
        if config.storage.is_persistent() {
            let dir = config
                .path
                .clone()
                .ok_or(CovArrayError::MissingStorePath(config.storage))?;
            if dir.join(MANIFEST_FILENAME).exists() && !config.overwrite {
                info!(path = %dir.display(), "reusing existing coverage store");
                let store = Self::open(&dir)?;
                store.check_config(&config)?;
                return Ok(store);
            }
            fs::create_dir_all(&dir)?;
        }
        let storage = config.storage;
        let mut store = Self::allocate(config)?;
        info!(?storage, "populating coverage store");
        loader.load(&mut store)?;
        store.finalize()?;
        Ok(store)
    }

    /// Open a persisted store from its directory, taking the genome,
    /// strand layout, conditions, and backend from the manifest.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CovArrayError> {
        let dir = dir.as_ref();
        let manifest = read_manifest(dir)?;
        if manifest.dtype != T::DTYPE {
            return Err(CovArrayError::ManifestMismatch(format!(
                "stored element type is {}, requested {}",
                manifest.dtype,
                T::DTYPE
            )));
        }
        let layout = StoreLayout::new(
            manifest.seqlens,
            manifest.stranded,
            manifest.conditions.len(),
        );
        let backend = match manifest.storage {
            StorageKind::InMemory => {
                return Err(CovArrayError::ManifestMismatch(
                    "an in-memory store cannot be reopened".to_string(),
                ))
            }
            StorageKind::AppendLog => Backend::Append(AppendLogBackend::open(dir, &layout)?),
            StorageKind::MemoryMapped => Backend::Mmap(MmapBackend::open(dir, &layout)?),
            StorageKind::KeyValue => Backend::KeyValue(KvBackend::open(dir, &layout)?),
        };
        Ok(Self {
            layout,
            conditions: manifest.conditions,
            storage: manifest.storage,
            path: Some(dir.to_path_buf()),
            backend,
            finalized: true,
        })
    }

    fn allocate(config: StoreConfig) -> Result<Self, CovArrayError> {
        let StoreConfig {
            seqlens,
            stranded,
            conditions,
            storage,
            path,
            ..
        } = config;
        let layout = StoreLayout::new(seqlens, stranded, conditions.len());
        let backend = match storage {
            StorageKind::InMemory => Backend::Memory(MemoryBackend::zeroed(&layout)?),
            StorageKind::AppendLog => {
                let dir = path.as_ref().ok_or(CovArrayError::MissingStorePath(storage))?;
                Backend::Append(AppendLogBackend::create(dir, &layout)?)
            }
            StorageKind::MemoryMapped => {
                let dir = path.as_ref().ok_or(CovArrayError::MissingStorePath(storage))?;
                Backend::Mmap(MmapBackend::create(dir, &layout)?)
            }
            StorageKind::KeyValue => {
                let dir = path.as_ref().ok_or(CovArrayError::MissingStorePath(storage))?;
                Backend::KeyValue(KvBackend::create(dir, &layout)?)
            }
        };
        Ok(Self {
            layout,
            conditions,
            storage,
            path,
            backend,
            finalized: false,
        })
    }

    fn check_config(&self, config: &StoreConfig) -> Result<(), CovArrayError> {
        if self.storage != config.storage {
            return Err(CovArrayError::ManifestMismatch(format!(
                "stored backend is {:?}, requested {:?}",
                self.storage, config.storage
            )));
        }
        if !self.layout.seqlens.iter().eq(config.seqlens.iter()) {
            return Err(CovArrayError::ManifestMismatch(
                "genome differs from the persisted store".to_string(),
            ));
        }
        if self.stranded() != config.stranded {
            return Err(CovArrayError::ManifestMismatch(format!(
                "persisted store has stranded = {}, requested {}",
                self.stranded(),
                config.stranded
            )));
        }
        if self.conditions != config.conditions {
            return Err(CovArrayError::ManifestMismatch(
                "condition labels differ from the persisted store".to_string(),
            ));
        }
        Ok(())
    }

    /// Flush the backend, write the manifest for persistent backends,
    /// and mark the store read-only.
    fn finalize(&mut self) -> Result<(), CovArrayError> {
        self.backend.finalize()?;
        if self.storage.is_persistent() {
            let dir = self
                .path
                .as_ref()
                .ok_or(CovArrayError::MissingStorePath(self.storage))?;
            let manifest = StoreManifest {
                seqlens: self.layout.seqlens.clone(),
                stranded: self.stranded(),
                conditions: self.conditions.clone(),
                storage: self.storage,
                dtype: T::DTYPE.to_string(),
            };
            write_manifest(dir, &manifest)?;
        }
        self.finalized = true;
        Ok(())
    }

    /// Write per-base values over `interval` for one condition.
    ///
    /// `values` must have exactly `interval.width()` entries. Forward
    /// and unstranded intervals go to the first strand row; writing
    /// [`Strand::Reverse`] requires a stranded store. Later writes to
    /// the same positions win.
    pub fn write(
        &mut self,
        interval: &Interval,
        condition: usize,
        values: &[T],
    ) -> Result<(), CovArrayError> {
        if self.finalized {
            return Err(CovArrayError::StoreFinalized);
        }
        let length = self.seqlen(&interval.seqname)?;
        let span = try_range(&interval.seqname, interval.start, interval.end, length)?;
        if values.len() != span.len() {
            return Err(CovArrayError::ValuesLengthMismatch {
                expected: span.len(),
                found: values.len(),
            });
        }
        if condition >= self.conditions.len() {
            return Err(CovArrayError::ConditionOutOfBounds {
                index: condition,
                len: self.conditions.len(),
            });
        }
        let strand_row = self.strand_row(interval.strand)?;
        self.backend
            .write_run(&interval.seqname, strand_row, condition, interval.start, values)
    }

    /// Read per-base coverage over `interval` as a dense
    /// `(positions, strands, conditions)` array.
    ///
    /// Every strand row is returned regardless of `interval.strand`;
    /// orientation only matters when writing and when datasets flip
    /// reverse-strand windows.
    pub fn read(&self, interval: &Interval) -> Result<Array3<T>, CovArrayError> {
        let length = self.seqlen(&interval.seqname)?;
        let span = try_range(&interval.seqname, interval.start, interval.end, length)?;
        let mut out = Array3::zeros((span.len(), self.layout.strand_dim, self.layout.n_conditions));
        self.backend
            .read_into(&interval.seqname, span, out.view_mut())?;
        Ok(out)
    }

    /// Read coverage over `interval` extended by `flank` positions on
    /// both sides.
    ///
    /// The result always has `interval.width() + 2 * flank` positions;
    /// parts of the window past either end of the chromosome read as
    /// zero. The interval itself must be in range, only its flanks may
    /// extend out.
    pub fn read_window(
        &self,
        interval: &Interval,
        flank: Position,
    ) -> Result<Array3<T>, CovArrayError> {
        let length = self.seqlen(&interval.seqname)?;
        try_range(&interval.seqname, interval.start, interval.end, length)?;

        let window_width = (interval.width() + 2 * flank) as usize;
        let mut out = Array3::zeros((
            window_width,
            self.layout.strand_dim,
            self.layout.n_conditions,
        ));

        let padded_start = interval.start as PositionOffset - flank as PositionOffset;
        let padded_end = interval.end as PositionOffset + flank as PositionOffset;
        let clipped_start = padded_start.max(0) as usize;
        let clipped_end = padded_end.min(length as PositionOffset) as usize;
        if clipped_start < clipped_end {
            let offset = (clipped_start as PositionOffset - padded_start) as usize;
            let copy_len = clipped_end - clipped_start;
            let view = out.slice_mut(s![offset..offset + copy_len, .., ..]);
            self.backend
                .read_into(&interval.seqname, clipped_start..clipped_end, view)?;
        }
        Ok(out)
    }

    /// The sequence names, in genome order.
    pub fn seqnames(&self) -> Vec<String> {
        self.layout.seqlens.keys().cloned().collect()
    }

    /// The sequence names and lengths this store covers.
    pub fn seqlens(&self) -> &IndexMap<String, Position> {
        &self.layout.seqlens
    }

    /// The condition labels, in axis order.
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// The number of conditions.
    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }

    /// Whether the store keeps separate forward and reverse strand rows.
    pub fn stranded(&self) -> bool {
        self.layout.strand_dim == 2
    }

    /// The strand axis length: 2 when stranded, 1 otherwise.
    pub fn strand_dim(&self) -> usize {
        self.layout.strand_dim
    }

    /// The backend kind.
    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    /// Whether the store has been finalized (read-only).
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn seqlen(&self, seqname: &str) -> Result<Position, CovArrayError> {
        self.layout
            .seqlens
            .get(seqname)
            .copied()
            .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))
    }

    fn strand_row(&self, strand: Strand) -> Result<usize, CovArrayError> {
        match strand {
            Strand::Forward | Strand::Unstranded => Ok(0),
            Strand::Reverse => {
                if self.stranded() {
                    Ok(1)
                } else {
                    Err(CovArrayError::UnstrandedStore(
                        "cannot write reverse-strand values; create the store with stranded = true"
                            .to_string(),
                    ))
                }
            }
        }
    }
}

fn write_manifest(dir: &Path, manifest: &StoreManifest) -> Result<(), CovArrayError> {
    let mut writer = BufWriter::new(File::create(dir.join(MANIFEST_FILENAME))?);
    bincode::serialize_into(&mut writer, manifest)?;
    writer.flush()?;
    Ok(())
}

fn read_manifest(dir: &Path) -> Result<StoreManifest, CovArrayError> {
    let file = File::open(dir.join(MANIFEST_FILENAME))?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(bincode::deserialize(&mmap[..])?)
}
