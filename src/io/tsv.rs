//! Essential TSV parsing functionality, which wraps the blazingly-fast
//! [`csv`] crate's deserialization method using [`serde`].

use csv::{DeserializeRecordsIntoIter, Reader, ReaderBuilder};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::CovArrayError;
use crate::io::file::InputFile;

/// Build a TSV reader which ignores comment lines and works on
/// gzip-compressed files.
pub fn build_tsv_reader(
    filepath: impl Into<PathBuf>,
) -> Result<Reader<Box<dyn Read>>, CovArrayError> {
    let input_file = InputFile::new(filepath);
    let stream: Box<dyn Read> = Box::new(input_file.reader()?);

    let reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .from_reader(stream);
    Ok(reader)
}

/// Deserializes some value of type `T` with some possible missing
/// character `missing_chars` into [`Option<T>`].
pub fn deserialize_option_generic<'de, D, T>(
    deserializer: D,
    missing_chars: &'de [&'de str],
) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if missing_chars.contains(&s.as_str()) {
        Ok(None)
    } else {
        s.parse::<T>()
            .map(Some)
            .map_err(|e| DeError::custom(format!("parsing error: {}", e)))
    }
}

/// An iterator over TSV records deserialized into type `T`.
pub struct TsvRecordIterator<T> {
    inner: DeserializeRecordsIntoIter<Box<dyn Read>, T>,
}

impl<T> std::fmt::Debug for TsvRecordIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsvRecordIterator").finish_non_exhaustive()
    }
}

impl<T> TsvRecordIterator<T>
where
    for<'de> T: Deserialize<'de>,
{
    /// Create a new TSV record iterator. By default, this skips lines
    /// that begin with `'#'`, since a pseudo-standard is that these
    /// indicate metadata or column headers.
    pub fn new(filepath: impl Into<PathBuf>) -> Result<Self, CovArrayError> {
        let reader = build_tsv_reader(filepath)?;
        let inner = reader.into_deserialize();
        Ok(Self { inner })
    }
}

impl<T> Iterator for TsvRecordIterator<T>
where
    for<'de> T: Deserialize<'de>,
{
    type Item = Result<T, CovArrayError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|result| result.map_err(|e| CovArrayError::IOError(e.into())))
    }
}
