//! Raw-data adapters implementing the alignment and signal source traits.
//!
//! Binary alignment and signal formats stay behind the
//! [`AlignmentSource`] and [`SignalSource`] seams; the adapters here
//! cover their plain-text analogues (BED6 for alignments, bedGraph for
//! signal), which is enough to load real tracks and to exercise loaders
//! end to end. Both adapters can also be built empty and filled with
//! `push`, which is how synthetic sources are made in tests.

use indexmap::IndexMap;
use std::path::Path;

use crate::error::CovArrayError;
use crate::io::bed::{read_bed6_records, BedGraphRecord};
use crate::io::tsv::TsvRecordIterator;
use crate::traits::{AlignmentIter, AlignmentSource, CoverageValue, SignalSource};
use crate::Position;

/// A single aligned read, reduced to what coverage counting needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlignmentRecord {
    /// Leftmost aligned position (zero-based).
    pub start: Position,
    /// One past the rightmost aligned position, when known.
    pub end: Option<Position>,
    /// Mapping quality.
    pub mapq: u8,
    /// Whether the read aligned to the reverse strand.
    pub reverse: bool,
}

impl AlignmentRecord {
    pub fn new(start: Position, end: Option<Position>, mapq: u8, reverse: bool) -> Self {
        Self {
            start,
            end,
            mapq,
            reverse,
        }
    }
}

fn path_identifier(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Alignments parsed from a six-column BED file.
///
/// Records are grouped per chromosome at construction. Sequence lengths
/// are inferred as the maximum end seen per chromosome, in order of
/// first appearance, so genome inference from a source is deterministic
/// for identical input; an explicitly supplied genome always overrides
/// the inferred one.
#[derive(Clone, Debug)]
pub struct BedAlignmentSource {
    identifier: String,
    seqlens: IndexMap<String, Position>,
    records: IndexMap<String, Vec<AlignmentRecord>>,
}

impl BedAlignmentSource {
    /// Read a BED file of alignments, one row per read. The score
    /// column is used as mapping quality; missing (`"."`) scores count
    /// as 255, i.e. never filtered.
    pub fn from_bed(filepath: impl AsRef<Path>) -> Result<Self, CovArrayError> {
        let filepath = filepath.as_ref();
        let mut source = BedAlignmentSource::new(path_identifier(filepath));
        for record in read_bed6_records(filepath)? {
            let mapq = record
                .score
                .map(|score| score.clamp(0.0, 255.0) as u8)
                .unwrap_or(255);
            let alignment = AlignmentRecord::new(
                record.start,
                Some(record.end),
                mapq,
                record.strand.is_reverse(),
            );
            source.push(record.seqname, alignment);
        }
        Ok(source)
    }

    /// An empty source with the given identifier; fill it with
    /// [`BedAlignmentSource::push`].
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            seqlens: IndexMap::new(),
            records: IndexMap::new(),
        }
    }

    /// Add a record, updating the inferred sequence length.
    pub fn push(&mut self, seqname: impl Into<String>, record: AlignmentRecord) {
        let seqname = seqname.into();
        let covered_end = record.end.unwrap_or(record.start + 1);
        let length = self.seqlens.entry(seqname.clone()).or_insert(0);
        *length = (*length).max(covered_end);
        self.records.entry(seqname).or_default().push(record);
    }
}

impl AlignmentSource for BedAlignmentSource {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn reference_sequences(&self) -> Result<IndexMap<String, Position>, CovArrayError> {
        Ok(self.seqlens.clone())
    }

    fn alignments(
        &mut self,
        seqname: &str,
    ) -> Result<Option<AlignmentIter<'_>>, CovArrayError> {
        match self.records.get(seqname) {
            Some(records) => Ok(Some(Box::new(records.iter().copied().map(Ok)))),
            None => Ok(None),
        }
    }
}

/// Signal runs parsed from a four-column bedGraph file.
///
/// Runs are grouped per chromosome at construction and expanded to
/// per-base values on query; positions no run covers read as zero.
#[derive(Clone, Debug)]
pub struct BedGraphSource<T> {
    identifier: String,
    runs: IndexMap<String, Vec<(Position, Position, T)>>,
}

impl<T: CoverageValue> BedGraphSource<T> {
    /// Read a bedGraph file of `seqname`, `start`, `end`, `value` rows.
    pub fn from_bedgraph(filepath: impl AsRef<Path>) -> Result<Self, CovArrayError> {
        let filepath = filepath.as_ref();
        let mut source = BedGraphSource::new(path_identifier(filepath));
        for record in TsvRecordIterator::<BedGraphRecord<T>>::new(filepath)? {
            let record = record?;
            source.push(record.seqname, record.start, record.end, record.value);
        }
        Ok(source)
    }

    /// An empty source with the given identifier; fill it with
    /// [`BedGraphSource::push`].
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            runs: IndexMap::new(),
        }
    }

    /// Add a run of equal values over `[start, end)`.
    pub fn push(&mut self, seqname: impl Into<String>, start: Position, end: Position, value: T) {
        self.runs
            .entry(seqname.into())
            .or_default()
            .push((start, end, value));
    }
}

impl<T: CoverageValue> SignalSource<T> for BedGraphSource<T> {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn values(
        &mut self,
        seqname: &str,
        start: Position,
        end: Position,
    ) -> Result<Option<Vec<T>>, CovArrayError> {
        let runs = match self.runs.get(seqname) {
            Some(runs) => runs,
            None => return Ok(None),
        };
        if start >= end {
            return Err(CovArrayError::InvalidGenomicRange(start, end));
        }
        let mut values = vec![T::zero(); (end - start) as usize];
        for (run_start, run_end, value) in runs {
            let overlap_start = (*run_start).max(start);
            let overlap_end = (*run_end).min(end);
            for position in overlap_start..overlap_end {
                values[(position - start) as usize] = *value;
            }
        }
        Ok(Some(values))
    }
}
