//! The append-log backend: run records appended to `coverage.log`.
//!
//! Every write appends one bincode-serialized [`RunRecord`] to the log
//! and mirrors it into dense in-memory arrays. Reopening replays the
//! log in order into a zeroed mirror, which reproduces last-write-wins
//! semantics for overlapping writes exactly.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::ops::Range;
use std::path::Path;

use ndarray::ArrayViewMut3;
use serde::{Deserialize, Serialize};

use crate::error::CovArrayError;
use crate::store::memory::MemoryBackend;
use crate::store::StoreLayout;
use crate::traits::CoverageValue;
use crate::Position;

pub(crate) const LOG_FILENAME: &str = "coverage.log";

/// One write, as persisted: a run of values at a (sequence, strand,
/// condition, start) address. Sequences are stored as their index in
/// the genome's name order.
#[derive(Debug, Serialize, Deserialize)]
struct RunRecord<T> {
    seq_index: u32,
    strand_row: u8,
    condition: u32,
    start: Position,
    values: Vec<T>,
}

pub(crate) struct AppendLogBackend<T: CoverageValue> {
    mirror: MemoryBackend<T>,
    layout: StoreLayout,
    /// `None` once finalized or when opened from disk.
    log: Option<BufWriter<File>>,
}

impl<T: CoverageValue> AppendLogBackend<T> {
    pub(crate) fn create(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        let log_file = File::create(dir.join(LOG_FILENAME))?;
        Ok(Self {
            mirror: MemoryBackend::zeroed(layout)?,
            layout: layout.clone(),
            log: Some(BufWriter::new(log_file)),
        })
    }

    pub(crate) fn open(dir: &Path, layout: &StoreLayout) -> Result<Self, CovArrayError> {
        let mut mirror = MemoryBackend::zeroed(layout)?;
        let log_file = File::open(dir.join(LOG_FILENAME))?;
        let mut reader = BufReader::new(log_file);
        loop {
            match bincode::deserialize_from::<_, RunRecord<T>>(&mut reader) {
                Ok(record) => {
                    let (seqname, _) = layout
                        .seqlens
                        .get_index(record.seq_index as usize)
                        .ok_or_else(|| {
                            CovArrayError::SerializationError(format!(
                                "log names sequence index {} outside the genome",
                                record.seq_index
                            ))
                        })?;
                    mirror.write_run(
                        seqname,
                        record.strand_row as usize,
                        record.condition as usize,
                        record.start,
                        &record.values,
                    )?;
                }
                Err(error) => {
                    if let bincode::ErrorKind::Io(ref io_error) = *error {
                        if io_error.kind() == ErrorKind::UnexpectedEof {
                            break;
                        }
                    }
                    return Err(error.into());
                }
            }
        }
        Ok(Self {
            mirror,
            layout: layout.clone(),
            log: None,
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
        let seq_index = self
            .layout
            .seqlens
            .get_index_of(seqname)
            .ok_or_else(|| CovArrayError::MissingSequence(seqname.to_string()))?
            as u32;
        let log = self.log.as_mut().ok_or(CovArrayError::StoreFinalized)?;
        let record = RunRecord {
            seq_index,
            strand_row: strand_row as u8,
            condition: condition as u32,
            start,
            values: values.to_vec(),
        };
        bincode::serialize_into(&mut *log, &record)?;
        self.mirror
            .write_run(seqname, strand_row, condition, start, values)
    }

    pub(crate) fn read_into(
        &self,
        seqname: &str,
        span: Range<usize>,
        out: ArrayViewMut3<'_, T>,
    ) -> Result<(), CovArrayError> {
        self.mirror.read_into(seqname, span, out)
    }

    pub(crate) fn finalize(&mut self) -> Result<(), CovArrayError> {
        if let Some(mut log) = self.log.take() {
            log.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seqlens;
    use ndarray::Array3;

    #[test]
    fn test_log_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(seqlens!("chr1" => 30, "chr2" => 10), true, 2);

        let mut backend = AppendLogBackend::<f64>::create(dir.path(), &layout).unwrap();
        backend.write_run("chr1", 0, 0, 5, &[1.0, 2.0, 3.0]).unwrap();
        backend.write_run("chr1", 1, 1, 5, &[4.0]).unwrap();
        backend.write_run("chr2", 0, 0, 0, &[7.0, 8.0]).unwrap();
        // overlapping write; replay must keep this one
        backend.write_run("chr1", 0, 0, 6, &[9.0]).unwrap();
        backend.finalize().unwrap();

        let reopened = AppendLogBackend::<f64>::open(dir.path(), &layout).unwrap();
        let mut out = Array3::zeros((4, 2, 2));
        reopened.read_into("chr1", 4..8, out.view_mut()).unwrap();
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[1, 0, 0]], 1.0);
        assert_eq!(out[[2, 0, 0]], 9.0);
        assert_eq!(out[[3, 0, 0]], 3.0);
        assert_eq!(out[[1, 1, 1]], 4.0);

        let mut out = Array3::zeros((2, 2, 2));
        reopened.read_into("chr2", 0..2, out.view_mut()).unwrap();
        assert_eq!(out[[0, 0, 0]], 7.0);
        assert_eq!(out[[1, 0, 0]], 8.0);
    }

    #[test]
    fn test_write_after_finalize_errors() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(seqlens!("chr1" => 10), false, 1);
        let mut backend = AppendLogBackend::<f64>::create(dir.path(), &layout).unwrap();
        backend.finalize().unwrap();
        assert!(matches!(
            backend.write_run("chr1", 0, 0, 0, &[1.0]),
            Err(CovArrayError::StoreFinalized)
        ));
    }

    #[test]
    fn test_empty_log_opens_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(seqlens!("chr1" => 10), false, 1);
        let mut backend = AppendLogBackend::<f64>::create(dir.path(), &layout).unwrap();
        backend.finalize().unwrap();

        let reopened = AppendLogBackend::<f64>::open(dir.path(), &layout).unwrap();
        let mut out = Array3::zeros((10, 1, 1));
        reopened.read_into("chr1", 0..10, out.view_mut()).unwrap();
        assert!(out.iter().all(|v| *v == 0.0));
    }
}
