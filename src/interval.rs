//! The [`Interval`] and [`Strand`] types.
//!
//! Intervals are zero-based and right-exclusive: `[start, end)`. Widths
//! are always `end - start`, and `end` may equal the sequence length.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};

use crate::error::CovArrayError;
use crate::Position;

/// Orientation of an [`Interval`].
///
/// The string forms are the BED ones: `+`, `-`, and `.` for unstranded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
    #[default]
    Unstranded,
}

impl Strand {
    /// Whether this is [`Strand::Reverse`].
    pub fn is_reverse(&self) -> bool {
        matches!(self, Strand::Reverse)
    }
}

impl FromStr for Strand {
    type Err = CovArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." => Ok(Strand::Unstranded),
            _ => Err(CovArrayError::InvalidStrand(s.to_string())),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Strand::Forward => "+",
            Strand::Reverse => "-",
            Strand::Unstranded => ".",
        };
        write!(f, "{}", symbol)
    }
}

impl<'de> Deserialize<'de> for Strand {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A genomic interval: a sequence name with zero-based, right-exclusive
/// start and end positions, and a [`Strand`].
#[derive(Clone, Debug, PartialEq)]
pub struct Interval {
    pub seqname: String,
    pub start: Position,
    pub end: Position,
    pub strand: Strand,
}

impl Interval {
    /// Create a new interval.
    pub fn new(seqname: impl Into<String>, start: Position, end: Position, strand: Strand) -> Self {
        Interval {
            seqname: seqname.into(),
            start,
            end,
            strand,
        }
    }

    /// Create a new unstranded interval.
    pub fn unstranded(seqname: impl Into<String>, start: Position, end: Position) -> Self {
        Interval::new(seqname, start, end, Strand::Unstranded)
    }

    /// The interval width.
    pub fn width(&self) -> Position {
        self.end - self.start
    }

    /// The single-base interval at this interval's start position,
    /// keeping the sequence name and strand.
    pub fn anchor(&self) -> Interval {
        Interval {
            seqname: self.seqname.clone(),
            start: self.start,
            end: self.start + 1,
            strand: self.strand,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}({})",
            self.seqname, self.start, self.end, self.strand
        )
    }
}

/// Validates a right-exclusive range against a sequence length, returning
/// the corresponding `usize` range for array indexing.
pub fn try_range(
    seqname: &str,
    start: Position,
    end: Position,
    length: Position,
) -> Result<std::ops::Range<usize>, CovArrayError> {
    if start >= end {
        return Err(CovArrayError::InvalidGenomicRange(start, end));
    }
    if end > length {
        return Err(CovArrayError::InvalidGenomicRangeForSequence(
            seqname.to_string(),
            start,
            end,
            length,
        ));
    }
    Ok(start as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_range_valid() {
        assert_eq!(try_range("chr1", 0, 10, 10).unwrap(), 0..10);
        assert_eq!(try_range("chr1", 9, 10, 10).unwrap(), 9..10);
    }

    #[test]
    fn test_try_range_start_not_less_than_end() {
        let result = try_range("chr1", 5, 5, 10);
        assert!(matches!(
            result,
            Err(CovArrayError::InvalidGenomicRange(5, 5))
        ));
        let result = try_range("chr1", 7, 5, 10);
        assert!(matches!(
            result,
            Err(CovArrayError::InvalidGenomicRange(7, 5))
        ));
    }

    #[test]
    fn test_try_range_past_sequence_end() {
        let result = try_range("chr1", 5, 11, 10);
        assert!(matches!(
            result,
            Err(CovArrayError::InvalidGenomicRangeForSequence(_, 5, 11, 10))
        ));
    }

    #[test]
    fn test_strand_round_trip() {
        for symbol in ["+", "-", "."] {
            let strand: Strand = symbol.parse().unwrap();
            assert_eq!(strand.to_string(), symbol);
        }
        assert!("x".parse::<Strand>().is_err());
    }

    #[test]
    fn test_interval_width_and_anchor() {
        let interval = Interval::new("chr1", 100, 200, Strand::Reverse);
        assert_eq!(interval.width(), 100);
        let anchor = interval.anchor();
        assert_eq!((anchor.start, anchor.end), (100, 101));
        assert_eq!(anchor.strand, Strand::Reverse);
        assert_eq!(anchor.width(), 1);
    }
}
