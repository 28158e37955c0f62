//! Input file handling with [`InputFile`].
//!
//! This abstracts over reading plaintext and gzip-compressed files
//! through a common interface, and reads tab-delimited *genome files* of
//! sequence names and lengths.

use flate2::read::GzDecoder;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;

use crate::error::CovArrayError;
use crate::Position;

/// Read a tab-delimited *genome file* of sequence (i.e. chromosome) names
/// and their lengths. Comment lines beginning with `#` are skipped, as
/// are columns past the second.
pub fn read_seqlens(
    filepath: impl Into<PathBuf>,
) -> Result<IndexMap<String, Position>, CovArrayError> {
    let input_file = InputFile::new(filepath);
    let reader = input_file.reader()?;

    let mut seqlens = IndexMap::new();
    for result in reader.lines() {
        let line = result?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut columns = line.split('\t');
        let seqname = match columns.next() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(CovArrayError::InvalidGenomeFile(format!(
                    "line has no sequence name: '{}'",
                    line
                )))
            }
        };
        let length: Position = match columns.next() {
            Some(value) => value.parse()?,
            None => {
                return Err(CovArrayError::InvalidGenomeFile(format!(
                    "line has no length column: '{}'",
                    line
                )))
            }
        };
        if seqlens.contains_key(seqname) {
            return Err(CovArrayError::InvalidGenomeFile(format!(
                "sequence '{}' is duplicated",
                seqname
            )));
        }
        seqlens.insert(seqname.to_string(), length);
    }
    Ok(seqlens)
}

/// Check if a file is gzipped by looking for the magic numbers. Empty
/// files are not gzipped.
pub(crate) fn is_gzipped_file(file_path: impl Into<PathBuf>) -> io::Result<bool> {
    let mut file = File::open(file_path.into())?;
    let mut buffer = [0; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

/// Represents an input file.
///
/// This struct is used to handle operations on an input file, such as
/// reading from the file. This abstracts how data is read in, allowing
/// both plaintext and gzip-compressed input (detected by magic number,
/// not extension) to be read through a common interface.
#[derive(Clone, Debug)]
pub struct InputFile {
    pub filepath: PathBuf,
}

impl InputFile {
    /// Constructs a new `InputFile`.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
        }
    }

    /// Opens the file and returns a buffered reader, decompressing
    /// gzipped input automatically.
    pub fn reader(&self) -> io::Result<BufReader<Box<dyn Read>>> {
        let file = File::open(&self.filepath)?;
        let is_gzipped = is_gzipped_file(&self.filepath)?;
        let reader: Box<dyn Read> = if is_gzipped {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }

    /// Detect the number of tab-delimited columns from the first
    /// non-comment, non-empty line. This is not robust against ragged
    /// delimited data formats.
    pub fn detect_columns(&self) -> Result<usize, CovArrayError> {
        let reader = self.reader()?;
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return Ok(line.split('\t').count());
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_seqlens() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# genome v1").unwrap();
        writeln!(file, "chr1\t1000").unwrap();
        writeln!(file, "chr2\t500").unwrap();
        file.flush().unwrap();
        let seqlens = read_seqlens(file.path()).unwrap();
        assert_eq!(seqlens.get("chr1"), Some(&1000));
        assert_eq!(seqlens.get("chr2"), Some(&500));
        assert_eq!(seqlens.len(), 2);
    }

    #[test]
    fn test_read_seqlens_duplicate() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\t1000").unwrap();
        writeln!(file, "chr1\t500").unwrap();
        file.flush().unwrap();
        let result = read_seqlens(file.path());
        assert!(matches!(result, Err(CovArrayError::InvalidGenomeFile(_))));
    }

    #[test]
    fn test_read_seqlens_missing_length() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1").unwrap();
        file.flush().unwrap();
        let result = read_seqlens(file.path());
        assert!(matches!(result, Err(CovArrayError::InvalidGenomeFile(_))));
    }

    #[test]
    fn test_gzipped_reader() {
        let file = NamedTempFile::new().unwrap();
        {
            let out = File::create(file.path()).unwrap();
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(b"chrM\t16569\n").unwrap();
            encoder.finish().unwrap();
        }
        let seqlens = read_seqlens(file.path()).unwrap();
        assert_eq!(seqlens.get("chrM"), Some(&16569));
    }

    #[test]
    fn test_detect_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file, "chr1\t10\t20\tname\t0\t+").unwrap();
        file.flush().unwrap();
        let input_file = InputFile::new(file.path());
        assert_eq!(input_file.detect_columns().unwrap(), 6);
    }

    #[test]
    fn test_detect_columns_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let input_file = InputFile::new(file.path());
        assert_eq!(input_file.detect_columns().unwrap(), 0);
    }
}
