use criterion::{criterion_group, criterion_main, Criterion};

use covarray::prelude::*;
use covarray::test_utilities::{random_alignments, random_regions, random_seqlens};

const NREGIONS: usize = 200;
const NREADS_PER_CHROM: usize = 2000;

fn bench_window_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_query");
    group.sample_size(30);

    let seqlens = random_seqlens();
    let regions = random_regions(&seqlens, NREGIONS, 1000);

    let in_memory = CoverageDatasetBuilder::new("bench")
        .seqlens(seqlens.clone())
        .regions(regions.clone())
        .binsize(200)
        .flank(100)
        .from_alignments::<f32, _>(vec![random_alignments(&seqlens, NREADS_PER_CHROM)])
        .unwrap();

    let cachedir = tempfile::tempdir().unwrap();
    let memory_mapped = CoverageDatasetBuilder::new("bench-mmap")
        .seqlens(seqlens.clone())
        .regions(regions)
        .binsize(200)
        .flank(100)
        .storage(StorageKind::MemoryMapped)
        .cachedir(cachedir.path())
        .from_alignments::<f32, _>(vec![random_alignments(&seqlens, NREADS_PER_CHROM)])
        .unwrap();

    let indices: Vec<usize> = (0..in_memory.len()).collect();

    group.bench_function("batch_in_memory", |b| {
        b.iter(|| in_memory.get_batch(&indices).unwrap().len());
    });

    group.bench_function("batch_memory_mapped", |b| {
        b.iter(|| memory_mapped.get_batch(&indices).unwrap().len());
    });

    group.bench_function("single_windows", |b| {
        b.iter(|| {
            let mut checksum = 0.0f32;
            for &index in &indices {
                checksum += in_memory.get(index).unwrap()[[0, 0, 0]];
            }
            checksum
        });
    });
}

criterion_group!(benches, bench_window_queries,);
criterion_main!(benches);
