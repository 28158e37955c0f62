//! Loaders that populate a [`CoverageArray`] during construction.
//!
//! A [`Loader`] runs exactly once, inside [`CoverageArray::create`],
//! with exclusive access to the store. Two strategies ship here:
//! [`CountAlignments`] turns alignment records into per-base 5' end
//! counts on both strands, and [`SumSignal`] reduces continuous signal
//! to one sum per enumerated window, written at the window's anchor
//! base. Closures can be used directly through
//! [`FnLoader`](crate::traits::FnLoader).

use ndarray::Array2;
use tracing::{debug, warn};

use crate::error::CovArrayError;
use crate::interval::{Interval, Strand};
use crate::store::CoverageArray;
use crate::traits::{AlignmentSource, CoverageValue, Loader, RegionIndexer, SignalSource};

/// Counts alignment 5' ends per base and strand, one source per
/// condition.
///
/// Forward alignments count at `start`; reverse alignments count at
/// `end - 1`, or at `start` when the source carries no end. Records
/// with mapping quality below `min_mapq` are skipped. Chromosomes the
/// store declares but a source lacks are logged and left at zero.
/// Requires a stranded store.
pub struct CountAlignments<S> {
    sources: Vec<S>,
    min_mapq: u8,
}

impl<S> CountAlignments<S> {
    pub fn new(sources: Vec<S>) -> Self {
        Self {
            sources,
            min_mapq: 0,
        }
    }

    /// Skip records with mapping quality below `min_mapq`. The default
    /// of 0 keeps everything, including the SAM missing-quality value
    /// 255.
    pub fn min_mapq(mut self, min_mapq: u8) -> Self {
        self.min_mapq = min_mapq;
        self
    }
}

impl<T, S> Loader<T> for CountAlignments<S>
where
    T: CoverageValue,
    S: AlignmentSource,
{
    fn load(self, store: &mut CoverageArray<T>) -> Result<(), CovArrayError> {
        if !store.stranded() {
            return Err(CovArrayError::UnstrandedStore(
                "alignment counting needs forward and reverse rows; create the store with \
                 stranded = true"
                    .to_string(),
            ));
        }
        if store.n_conditions() != self.sources.len() {
            return Err(CovArrayError::ConditionCountMismatch {
                conditions: store.n_conditions(),
                sources: self.sources.len(),
            });
        }
        let CountAlignments { sources, min_mapq } = self;
        let seqlens = store.seqlens().clone();
        for (condition, mut source) in sources.into_iter().enumerate() {
            let source_id = source.identifier();
            for (seqname, length) in &seqlens {
                let length = *length;
                if length == 0 {
                    continue;
                }
                let alignments = match source.alignments(seqname)? {
                    Some(alignments) => alignments,
                    None => {
                        warn!(
                            source = %source_id,
                            seqname = %seqname,
                            "sequence absent from source; coverage left at zero"
                        );
                        continue;
                    }
                };
                let mut counts = Array2::<T>::zeros((length as usize, 2));
                for record in alignments {
                    let record = record?;
                    if record.mapq < min_mapq {
                        continue;
                    }
                    if record.reverse {
                        let position = match record.end {
                            Some(end) if end > record.start => end - 1,
                            Some(end) => {
                                return Err(CovArrayError::InvalidGenomicRange(record.start, end))
                            }
                            None => record.start,
                        };
                        if position >= length {
                            return Err(CovArrayError::InvalidGenomicRangeForSequence(
                                seqname.clone(),
                                position,
                                position + 1,
                                length,
                            ));
                        }
                        counts[[position as usize, 1]] += T::one();
                    } else {
                        if record.start >= length {
                            return Err(CovArrayError::InvalidGenomicRangeForSequence(
                                seqname.clone(),
                                record.start,
                                record.start + 1,
                                length,
                            ));
                        }
                        counts[[record.start as usize, 0]] += T::one();
                    }
                }
                let forward = Interval::new(seqname.as_str(), 0, length, Strand::Forward);
                store.write(&forward, condition, &counts.column(0).to_vec())?;
                let reverse = Interval::new(seqname.as_str(), 0, length, Strand::Reverse);
                store.write(&reverse, condition, &counts.column(1).to_vec())?;
            }
            debug!(source = %source_id, condition, "alignment counting complete");
        }
        Ok(())
    }
}

/// Sums continuous signal over each enumerated window and writes the
/// sum at the window's anchor base, one source per condition.
///
/// Anchors are written unstranded (strand row 0), so this loader works
/// against stranded and unstranded stores alike. Windows on
/// chromosomes a source lacks are logged and skipped.
pub struct SumSignal<'a, S, I> {
    sources: Vec<S>,
    indexer: &'a I,
}

impl<'a, S, I> SumSignal<'a, S, I> {
    pub fn new(sources: Vec<S>, indexer: &'a I) -> Self {
        Self { sources, indexer }
    }
}

impl<T, S, I> Loader<T> for SumSignal<'_, S, I>
where
    T: CoverageValue,
    S: SignalSource<T>,
    I: RegionIndexer,
{
    fn load(self, store: &mut CoverageArray<T>) -> Result<(), CovArrayError> {
        if store.n_conditions() != self.sources.len() {
            return Err(CovArrayError::ConditionCountMismatch {
                conditions: store.n_conditions(),
                sources: self.sources.len(),
            });
        }
        let SumSignal {
            mut sources,
            indexer,
        } = self;
        for (condition, source) in sources.iter_mut().enumerate() {
            let source_id = source.identifier();
            for index in 0..indexer.len() {
                let interval = indexer.interval(index)?;
                let values =
                    match source.values(&interval.seqname, interval.start, interval.end)? {
                        Some(values) => values,
                        None => {
                            warn!(
                                source = %source_id,
                                region = %interval,
                                "sequence absent from source; skipping window"
                            );
                            continue;
                        }
                    };
                if values.len() != interval.width() as usize {
                    return Err(CovArrayError::ValuesLengthMismatch {
                        expected: interval.width() as usize,
                        found: values.len(),
                    });
                }
                let mut total = T::zero();
                for value in values {
                    total += value;
                }
                let mut anchor = interval.anchor();
                anchor.strand = Strand::Unstranded;
                store.write(&anchor, condition, &[total])?;
            }
            debug!(source = %source_id, condition, "signal summing complete");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::WindowIndex;
    use crate::seqlens;
    use crate::sources::{AlignmentRecord, BedAlignmentSource, BedGraphSource};
    use crate::store::StoreConfig;

    fn alignment_source() -> BedAlignmentSource {
        let mut source = BedAlignmentSource::new("sample");
        source.push("chr1", AlignmentRecord::new(100, Some(150), 60, false));
        source.push("chr1", AlignmentRecord::new(150, Some(200), 60, true));
        source
    }

    #[test]
    fn test_count_alignments() {
        let config = StoreConfig::new(seqlens!("chr1" => 1000), true, vec!["sample".to_string()]);
        let store: CoverageArray<f64> =
            CoverageArray::create(config, CountAlignments::new(vec![alignment_source()]))
                .unwrap();

        let coverage = store
            .read(&Interval::new("chr1", 0, 1000, Strand::Forward))
            .unwrap();
        // forward read counted at its start, reverse read at end - 1
        assert_eq!(coverage[[100, 0, 0]], 1.0);
        assert_eq!(coverage[[199, 1, 0]], 1.0);
        assert_eq!(coverage.sum(), 2.0);
    }

    #[test]
    fn test_count_alignments_mapq_filter() {
        let mut source = BedAlignmentSource::new("sample");
        source.push("chr1", AlignmentRecord::new(10, Some(50), 10, false));
        source.push("chr1", AlignmentRecord::new(20, Some(60), 60, false));

        let config = StoreConfig::new(seqlens!("chr1" => 100), true, vec!["sample".to_string()]);
        let store: CoverageArray<f64> =
            CoverageArray::create(config, CountAlignments::new(vec![source]).min_mapq(30))
                .unwrap();

        let coverage = store
            .read(&Interval::new("chr1", 0, 100, Strand::Forward))
            .unwrap();
        assert_eq!(coverage[[10, 0, 0]], 0.0);
        assert_eq!(coverage[[20, 0, 0]], 1.0);
        assert_eq!(coverage.sum(), 1.0);
    }

    #[test]
    fn test_count_alignments_skips_absent_sequence() {
        let config = StoreConfig::new(
            seqlens!("chr1" => 1000, "chr2" => 500),
            true,
            vec!["sample".to_string()],
        );
        // the source only carries chr1; chr2 must stay zero
        let store: CoverageArray<f64> =
            CoverageArray::create(config, CountAlignments::new(vec![alignment_source()]))
                .unwrap();

        let coverage = store
            .read(&Interval::new("chr2", 0, 500, Strand::Forward))
            .unwrap();
        assert_eq!(coverage.sum(), 0.0);
    }

    #[test]
    fn test_count_alignments_condition_mismatch() {
        let config = StoreConfig::new(
            seqlens!("chr1" => 1000),
            true,
            vec!["a".to_string(), "b".to_string()],
        );
        let result: Result<CoverageArray<f64>, _> =
            CoverageArray::create(config, CountAlignments::new(vec![alignment_source()]));
        assert!(matches!(
            result,
            Err(CovArrayError::ConditionCountMismatch {
                conditions: 2,
                sources: 1
            })
        ));
    }

    #[test]
    fn test_count_alignments_requires_stranded_store() {
        let config = StoreConfig::new(seqlens!("chr1" => 1000), false, vec!["sample".to_string()]);
        let result: Result<CoverageArray<f64>, _> =
            CoverageArray::create(config, CountAlignments::new(vec![alignment_source()]));
        assert!(matches!(result, Err(CovArrayError::UnstrandedStore(_))));
    }

    #[test]
    fn test_count_alignments_rejects_out_of_range_record() {
        let mut source = BedAlignmentSource::new("sample");
        source.push("chr1", AlignmentRecord::new(40, Some(90), 60, false));

        // the store's chr1 is shorter than the source's records
        let config = StoreConfig::new(seqlens!("chr1" => 30), true, vec!["sample".to_string()]);
        let result: Result<CoverageArray<f64>, _> =
            CoverageArray::create(config, CountAlignments::new(vec![source]));
        assert!(matches!(
            result,
            Err(CovArrayError::InvalidGenomicRangeForSequence(_, _, _, _))
        ));
    }

    #[test]
    fn test_sum_signal() {
        let regions = vec![Interval::new("chr1", 50, 150, Strand::Unstranded)];
        let index = WindowIndex::from_regions(regions, 100, 100).unwrap();

        let mut source = BedGraphSource::<f64>::new("signal");
        source.push("chr1", 50, 150, 2.0);

        let config = StoreConfig::new(seqlens!("chr1" => 1000), false, vec!["signal".to_string()]);
        let store: CoverageArray<f64> =
            CoverageArray::create(config, SumSignal::new(vec![source], &index)).unwrap();

        let coverage = store
            .read(&Interval::new("chr1", 50, 51, Strand::Unstranded))
            .unwrap();
        assert_eq!(coverage[[0, 0, 0]], 200.0);
        let full = store
            .read(&Interval::new("chr1", 0, 1000, Strand::Unstranded))
            .unwrap();
        assert_eq!(full.sum(), 200.0);
    }

    #[test]
    fn test_sum_signal_anchors_are_unstranded() {
        // windows on the reverse strand still write to strand row 0
        let regions = vec![Interval::new("chr1", 10, 20, Strand::Reverse)];
        let index = WindowIndex::from_regions(regions, 10, 10).unwrap();

        let mut source = BedGraphSource::<f64>::new("signal");
        source.push("chr1", 10, 20, 1.5);

        let config = StoreConfig::new(seqlens!("chr1" => 100), true, vec!["signal".to_string()]);
        let store: CoverageArray<f64> =
            CoverageArray::create(config, SumSignal::new(vec![source], &index)).unwrap();

        let coverage = store
            .read(&Interval::new("chr1", 10, 11, Strand::Unstranded))
            .unwrap();
        assert_eq!(coverage[[0, 0, 0]], 15.0);
        assert_eq!(coverage[[0, 1, 0]], 0.0);
    }

    #[test]
    fn test_sum_signal_skips_absent_sequence() {
        let regions = vec![
            Interval::new("chr1", 0, 10, Strand::Unstranded),
            Interval::new("chr2", 0, 10, Strand::Unstranded),
        ];
        let index = WindowIndex::from_regions(regions, 10, 10).unwrap();

        let mut source = BedGraphSource::<f64>::new("signal");
        source.push("chr1", 0, 10, 1.0);

        let config = StoreConfig::new(
            seqlens!("chr1" => 100, "chr2" => 100),
            false,
            vec!["signal".to_string()],
        );
        let store: CoverageArray<f64> =
            CoverageArray::create(config, SumSignal::new(vec![source], &index)).unwrap();

        let chr2 = store
            .read(&Interval::new("chr2", 0, 100, Strand::Unstranded))
            .unwrap();
        assert_eq!(chr2.sum(), 0.0);
    }
}
