//! The key-value backend: compressed position blocks behind an offset
//! index.
//!
//! Each (sequence, strand, condition) row is cut into fixed-length
//! position blocks. Finalize bincode-serializes every block's values,
//! zstd-compresses them into `blocks.bin`, and records each block's
//! offset and compressed length in `index.bin`. Reads look up and
//! decompress only the blocks a span touches.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use ndarray::{s, ArrayViewMut3};
use serde::{Deserialize, Serialize};

use crate::error::CovArrayError;
use crate::store::memory::MemoryBackend;
use crate::store::StoreLayout;
use crate::traits::CoverageValue;
use crate::Position;

pub(crate) const BLOCKS_FILENAME: &str = "blocks.bin";
pub(crate) const INDEX_FILENAME: &str = "index.bin";

/// Positions per block.
const BLOCK_LEN: usize = 8192;
/// zstd level for block data.
const COMPRESSION_LEVEL: i32 = 3;

/// Address of one block: sequence index, strand row, condition, and
/// block number along the position axis.
type BlockKey = (u32, u8, u32, u32);

#[derive(Debug, Serialize, Deserialize)]
struct BlockEntry {
    offset: u64,
    length: u32,
}

enum KvState<T: CoverageValue> {
    Loading(MemoryBackend<T>),
    Ready {
        index: HashMap<BlockKey, BlockEntry>,
        /// `None` when every sequence has zero length, so no block was
        /// ever written.
        blocks: Option<Mmap>,
    },
}

pub(crate) struct KvBackend<T: CoverageValue> {
    state: KvState<T>,
    layout: StoreLayout,
    dir: PathBuf,
}

impl<T: CoverageValue> KvBackend<T> {
    pub(crate) fn create(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        Ok(Self {
            state: KvState::Loading(MemoryBackend::zeroed(layout)?),
            layout: layout.clone(),
            dir: dir.to_path_buf(),
        })
    }

    pub(crate) fn open(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        let index = read_index(dir)?;
        let blocks = map_blocks(dir)?;
        Ok(Self {
            state: KvState::Ready { index, blocks },
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
            KvState::Loading(buffer) => {
                buffer.write_run(seqname, strand_row, condition, start, values)
            }
            KvState::Ready { .. } => Err(CovArrayError::StoreFinalized),
        }
    }

    pub(crate) fn read_into(
        &self,
        seqname: &str,
        span: Range<usize>,
        mut out: ArrayViewMut3<'_, T>,
    ) -> Result<(), CovArrayError> {
        match &self.state {
            KvState::Loading(buffer) => buffer.read_into(seqname, span, out),
            KvState::Ready { index, blocks } => {
                let seq_index = self
                    .layout
                    .seqlens
                    .get_index_of(seqname)
                    .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))?
                    as u32;
                if span.is_empty() {
                    return Ok(());
                }
                let blocks = blocks.as_ref().ok_or_else(|| {
                    CovArrayError::SerializationError("store has no block data".to_string())
                })?;
                let first_block = span.start / BLOCK_LEN;
                let last_block = (span.end - 1) / BLOCK_LEN;
                for strand_row in 0..self.layout.strand_dim {
                    for condition in 0..self.layout.n_conditions {
                        for block_number in first_block..=last_block {
                            let key = (
                                seq_index,
                                strand_row as u8,
                                condition as u32,
                                block_number as u32,
                            );
                            let entry = index.get(&key).ok_or_else(|| {
                                CovArrayError::SerializationError(format!(
                                    "block {:?} missing from index",
                                    key
                                ))
                            })?;
                            let compressed = &blocks[entry.offset as usize
                                ..entry.offset as usize + entry.length as usize];
                            let mut raw = Vec::new();
                            zstd::stream::copy_decode(compressed, &mut raw)?;
                            let values: Vec<T> = bincode::deserialize(&raw)?;

                            let block_start = block_number * BLOCK_LEN;
                            let copy_start = span.start.max(block_start);
                            let copy_end = span.end.min(block_start + values.len());
                            for position in copy_start..copy_end {
                                out[[position - span.start, strand_row, condition]] =
                                    values[position - block_start];
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) fn finalize(&mut self) -> Result<(), CovArrayError> {
        let index = match &self.state {
            KvState::Ready { .. } => return Ok(()),
            KvState::Loading(buffer) => {
                let mut index = HashMap::new();
                let mut writer = BufWriter::new(File::create(self.dir.join(BLOCKS_FILENAME))?);
                let mut offset = 0u64;
                for (seq_index, (seqname, length)) in self.layout.seqlens.iter().enumerate() {
                    let array = buffer
                        .get(seqname)
                        .ok_or_else(|| CovArrayError::MissingSequence(seqname.clone()))?;
                    let length = *length as usize;
                    for strand_row in 0..self.layout.strand_dim {
                        for condition in 0..self.layout.n_conditions {
                            let mut block_number = 0u32;
                            let mut block_start = 0usize;
                            while block_start < length {
                                let block_end = (block_start + BLOCK_LEN).min(length);
                                let values: Vec<T> = array
                                    .slice(s![block_start..block_end, strand_row, condition])
                                    .to_vec();
                                let raw = bincode::serialize(&values)?;
                                let mut compressed = Vec::new();
                                zstd::stream::copy_encode(
                                    raw.as_slice(),
                                    &mut compressed,
                                    COMPRESSION_LEVEL,
                                )?;
                                writer.write_all(&compressed)?;
                                index.insert(
                                    (
                                        seq_index as u32,
                                        strand_row as u8,
                                        condition as u32,
                                        block_number,
                                    ),
                                    BlockEntry {
                                        offset,
                                        length: compressed.len() as u32,
                                    },
                                );
                                offset += compressed.len() as u64;
                                block_number += 1;
                                block_start = block_end;
                            }
                        }
                    }
                }
                writer.flush()?;
                write_index(&self.dir, &index)?;
                index
            }
        };
        let blocks = map_blocks(&self.dir)?;
        self.state = KvState::Ready { index, blocks };
        Ok(())
    }
}

fn write_index(dir: &Path, index: &HashMap<BlockKey, BlockEntry>) -> Result<(), CovArrayError> {
    let mut writer = BufWriter::new(File::create(dir.join(INDEX_FILENAME))?);
    bincode::serialize_into(&mut writer, index)?;
    writer.flush()?;
    Ok(())
}

fn read_index(dir: &Path) -> Result<HashMap<BlockKey, BlockEntry>, CovArrayError> {
    let file = File::open(dir.join(INDEX_FILENAME))?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(bincode::deserialize(&mmap[..])?)
}

fn map_blocks(dir: &Path) -> Result<Option<Mmap>, CovArrayError> {
    let file = File::open(dir.join(BLOCKS_FILENAME))?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqlens;
    use ndarray::Array3;

    #[test]
    fn test_reads_across_block_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        // long enough that chr1 spans three blocks
        let layout = StoreLayout::new(seqlens!("chr1" => 20_000, "chr2" => 100), true, 2);

        let mut backend = KvBackend::<f64>::create(dir.path(), &layout).unwrap();
        // this run straddles the first block boundary at 8192
        backend
            .write_run("chr1", 0, 0, 8190, &[1.0, 2.0, 3.0, 4.0])
            .unwrap();
        backend.write_run("chr1", 1, 1, 16_500, &[7.0]).unwrap();
        backend.write_run("chr2", 0, 0, 99, &[5.0]).unwrap();
        backend.finalize().unwrap();

        let mut out = Array3::zeros((8, 2, 2));
        backend.read_into("chr1", 8188..8196, out.view_mut()).unwrap();
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[2, 0, 0]], 1.0);
        assert_eq!(out[[3, 0, 0]], 2.0);
        assert_eq!(out[[4, 0, 0]], 3.0);
        assert_eq!(out[[5, 0, 0]], 4.0);
        assert_eq!(out[[6, 0, 0]], 0.0);

        let reopened = KvBackend::<f64>::open(dir.path(), &layout).unwrap();
        let mut out = Array3::zeros((8, 2, 2));
        reopened
            .read_into("chr1", 8188..8196, out.view_mut())
            .unwrap();
        assert_eq!(out[[2, 0, 0]], 1.0);
        assert_eq!(out[[5, 0, 0]], 4.0);

        let mut out = Array3::zeros((2, 2, 2));
        reopened.read_into("chr1", 16_500..16_502, out.view_mut()).unwrap();
        assert_eq!(out[[0, 1, 1]], 7.0);

        // last block of chr2 is shorter than the block length
        let mut out = Array3::zeros((1, 2, 2));
        reopened.read_into("chr2", 99..100, out.view_mut()).unwrap();
        assert_eq!(out[[0, 0, 0]], 5.0);
    }

    #[test]
    fn test_write_after_finalize_errors() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(seqlens!("chr1" => 10), false, 1);
        let mut backend = KvBackend::<f64>::create(dir.path(), &layout).unwrap();
        backend.finalize().unwrap();
        assert!(matches!(
            backend.write_run("chr1", 0, 0, 0, &[1.0]),
            Err(CovArrayError::StoreFinalized)
        ));
    }
}
