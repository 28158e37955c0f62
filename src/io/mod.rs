//! Types and methods for reading and parsing input files.

pub mod bed;
pub mod file;
pub mod tsv;

pub use bed::{read_regions, Bed3Record, Bed6Record, BedGraphRecord};
pub use file::{read_seqlens, InputFile};
pub use tsv::TsvRecordIterator;
