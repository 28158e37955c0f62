//! Test utility functions and synthetic data generators.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use indexmap::IndexMap;
use rand::{thread_rng, Rng};
use tempfile::TempDir;

use crate::error::CovArrayError;
use crate::interval::{Interval, Strand};
use crate::sources::{AlignmentRecord, BedAlignmentSource};
use crate::store::CoverageArray;
use crate::Position;

// Stochastic test defaults.
//
// Enough records to catch indexing errors without slowing the suite.
pub const NRANDOM_RECORDS: usize = 1000;

// test genome shape
pub const NCHROM: usize = 4;
pub const MIN_CHROM_LEN: Position = 10_000;
pub const MAX_CHROM_LEN: Position = 50_000;

// synthetic read length bounds
pub const MIN_READ_LEN: Position = 20;
pub const MAX_READ_LEN: Position = 200;

/// Build a small random genome, `chr1..chrN`.
pub fn random_seqlens() -> IndexMap<String, Position> {
    let mut rng = thread_rng();
    let mut seqlens = IndexMap::new();
    for i in 1..=NCHROM {
        seqlens.insert(
            format!("chr{}", i),
            rng.gen_range(MIN_CHROM_LEN..=MAX_CHROM_LEN),
        );
    }
    seqlens
}

/// A random start/end pair of exactly `width` on a sequence of
/// `chrom_len`. 0-indexed, right exclusive.
pub fn random_span(chrom_len: Position, width: Position) -> (Position, Position) {
    let mut rng = thread_rng();
    let start = rng.gen_range(0..chrom_len - width + 1);
    (start, start + width)
}

/// Random fixed-width regions over a genome, alternating strands so
/// both flip paths get exercised.
pub fn random_regions(
    seqlens: &IndexMap<String, Position>,
    n: usize,
    width: Position,
) -> Vec<Interval> {
    let mut rng = thread_rng();
    let mut regions = Vec::with_capacity(n);
    for i in 0..n {
        let index = rng.gen_range(0..seqlens.len());
        let (seqname, length) = seqlens
            .get_index(index)
            .expect("chromosome index out of range");
        let (start, end) = random_span(*length, width);
        let strand = if i % 2 == 0 {
            Strand::Forward
        } else {
            Strand::Reverse
        };
        regions.push(Interval::new(seqname.as_str(), start, end, strand));
    }
    regions
}

/// A synthetic alignment source with `n` random records per
/// chromosome of `seqlens`.
pub fn random_alignments(seqlens: &IndexMap<String, Position>, n: usize) -> BedAlignmentSource {
    let mut rng = thread_rng();
    let mut source = BedAlignmentSource::new("random");
    for (seqname, length) in seqlens {
        for _ in 0..n {
            let width = rng.gen_range(MIN_READ_LEN..=MAX_READ_LEN.min(*length));
            let (start, end) = random_span(*length, width);
            let record =
                AlignmentRecord::new(start, Some(end), rng.gen_range(0..=60), rng.gen_bool(0.5));
            source.push(seqname.as_str(), record);
        }
    }
    source
}

/// The deterministic per-base pattern used by exact-content tests:
/// `position + 1000 * strand_row + 10_000 * condition`.
pub fn patterned_values(length: Position, strand_row: usize, condition: usize) -> Vec<f64> {
    (0..length)
        .map(|p| p as f64 + 1000.0 * strand_row as f64 + 10_000.0 * condition as f64)
        .collect()
}

/// Fill every (chromosome, strand, condition) row of a store with
/// [`patterned_values`]; usable as a loader through
/// [`FnLoader`](crate::traits::FnLoader).
pub fn load_pattern(store: &mut CoverageArray<f64>) -> Result<(), CovArrayError> {
    let seqlens = store.seqlens().clone();
    for (seqname, length) in &seqlens {
        for condition in 0..store.n_conditions() {
            let forward = Interval::new(seqname.as_str(), 0, *length, Strand::Forward);
            store.write(&forward, condition, &patterned_values(*length, 0, condition))?;
            if store.stranded() {
                let reverse = Interval::new(seqname.as_str(), 0, *length, Strand::Reverse);
                store.write(&reverse, condition, &patterned_values(*length, 1, condition))?;
            }
        }
    }
    Ok(())
}

/// Write `contents` to `name` inside a fresh temporary directory. Keep
/// the directory guard alive while the file is in use.
pub fn temp_file(name: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("could not create temporary directory");
    let path = dir.path().join(name);
    let mut file = File::create(&path).expect("could not create temporary file");
    file.write_all(contents.as_bytes())
        .expect("could not write temporary file");
    (dir, path)
}
