//! BED-like and bedGraph-like record types and region reading.
//!
//! Only the pieces of these formats needed for coverage loading are
//! handled here: BED3/BED6 for regions and text alignments, and the
//! four-column bedGraph layout for signal runs. Columns past the ones a
//! record type names are ignored, so e.g. BED12 input still reads as
//! BED6 regions.

use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::error::CovArrayError;
use crate::interval::{Interval, Strand};
use crate::io::file::InputFile;
use crate::io::tsv::{build_tsv_reader, deserialize_option_generic};
use crate::Position;

/// The three columns every BED-like file starts with.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Bed3Record {
    pub seqname: String,
    pub start: Position,
    pub end: Position,
}

/// [`serde`] deserializer for a BED column with a possibly missing
/// (`"."`) value.
pub fn deserialize_bed_missing<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    let missing_chars = &["."];
    deserialize_option_generic(deserializer, missing_chars)
}

/// A six-column BED record.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Bed6Record {
    pub seqname: String,
    pub start: Position,
    pub end: Position,
    pub name: String,
    #[serde(deserialize_with = "deserialize_bed_missing")]
    pub score: Option<f64>,
    pub strand: Strand,
}

/// A bedGraph-like record: a run of positions sharing one value.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BedGraphRecord<T> {
    pub seqname: String,
    pub start: Position,
    pub end: Position,
    pub value: T,
}

/// Read records of type `T` from a TSV, keeping only the first
/// `keep_columns` columns of each row. This is how trailing BED columns
/// are ignored.
fn read_truncated_records<T>(
    filepath: &Path,
    keep_columns: usize,
) -> Result<Vec<T>, CovArrayError>
where
    for<'de> T: Deserialize<'de>,
{
    let mut reader = build_tsv_reader(filepath)?;
    let mut records = Vec::new();
    let mut row = csv::StringRecord::new();
    loop {
        let has_row = reader
            .read_record(&mut row)
            .map_err(|e| CovArrayError::IOError(e.into()))?;
        if !has_row {
            break;
        }
        let truncated: csv::StringRecord = row.iter().take(keep_columns).collect();
        let record: T = truncated
            .deserialize(None)
            .map_err(|e| CovArrayError::IOError(e.into()))?;
        records.push(record);
    }
    Ok(records)
}

/// Read a BED file with at least six columns into [`Bed6Record`]s.
pub fn read_bed6_records(filepath: impl AsRef<Path>) -> Result<Vec<Bed6Record>, CovArrayError> {
    let filepath = filepath.as_ref();
    let n_columns = InputFile::new(filepath).detect_columns()?;
    if n_columns < 6 {
        return Err(CovArrayError::InvalidRegionFile(format!(
            "'{}' has {} columns; six (through strand) are required",
            filepath.display(),
            n_columns
        )));
    }
    read_truncated_records(filepath, 6)
}

/// Read regions from a BED-like file.
///
/// Files with fewer than six columns are read as BED3 and the regions
/// are unstranded; files with six or more are read as BED6 and keep the
/// strand column.
pub fn read_regions(filepath: impl AsRef<Path>) -> Result<Vec<Interval>, CovArrayError> {
    let filepath = filepath.as_ref();
    let n_columns = InputFile::new(filepath).detect_columns()?;
    if n_columns < 3 {
        return Err(CovArrayError::InvalidRegionFile(format!(
            "'{}' has {} columns; at least seqname, start, and end are required",
            filepath.display(),
            n_columns
        )));
    }
    let regions = if n_columns >= 6 {
        read_truncated_records::<Bed6Record>(filepath, 6)?
            .into_iter()
            .map(|record| Interval::new(record.seqname, record.start, record.end, record.strand))
            .collect()
    } else {
        read_truncated_records::<Bed3Record>(filepath, 3)?
            .into_iter()
            .map(|record| Interval::unstranded(record.seqname, record.start, record.end))
            .collect()
    };
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::tsv::TsvRecordIterator;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_regions_bed3() {
        let file = temp_file("# header\nchr1\t0\t100\nchr2\t50\t150\n");
        let regions = read_regions(file.path()).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], Interval::unstranded("chr1", 0, 100));
        assert_eq!(regions[1], Interval::unstranded("chr2", 50, 150));
    }

    #[test]
    fn test_read_regions_bed6() {
        let file = temp_file("chr1\t0\t100\tregion1\t.\t+\nchr1\t200\t300\tregion2\t12.5\t-\n");
        let regions = read_regions(file.path()).unwrap();
        assert_eq!(regions[0].strand, Strand::Forward);
        assert_eq!(regions[1].strand, Strand::Reverse);
        assert_eq!(regions[1].start, 200);
    }

    #[test]
    fn test_read_regions_extra_columns_ignored() {
        let file = temp_file("chr1\t0\t100\tregion1\t0\t+\tthick1\tthick2\n");
        let regions = read_regions(file.path()).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].strand, Strand::Forward);
    }

    #[test]
    fn test_read_regions_too_few_columns() {
        let file = temp_file("chr1\t100\n");
        let result = read_regions(file.path());
        assert!(matches!(result, Err(CovArrayError::InvalidRegionFile(_))));
    }

    #[test]
    fn test_read_bed6_records_missing_score() {
        let file = temp_file("chr1\t10\t20\tread1\t.\t+\nchr1\t30\t40\tread2\t60\t-\n");
        let records = read_bed6_records(file.path()).unwrap();
        assert_eq!(records[0].score, None);
        assert_eq!(records[1].score, Some(60.0));
        assert_eq!(records[1].strand, Strand::Reverse);
    }

    #[test]
    fn test_bedgraph_records() {
        let file = temp_file("chr1\t0\t10\t1.5\nchr1\t10\t20\t-0.5\n");
        let records: Vec<BedGraphRecord<f64>> = TsvRecordIterator::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, 1.5);
        assert_eq!(records[1].value, -0.5);
    }
}
