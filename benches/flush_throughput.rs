//! Flush throughput benchmark.
//!
//! Measures how long `Series::flush` takes to realize a batch of meshes and
//! their chunk payloads against each reference backend, for varying mesh
//! counts. Reports component counts alongside the timing so `html_reports`
//! output can be read without cross-referencing this file.
//!
//! Run: cargo bench --bench flush_throughput

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use openpmd_io::datatype::Datatype;
use openpmd_io::series::{IterationEncoding, Series};
use openpmd_io::task::ChunkBuffer;
use tempfile::TempDir;

const CHUNK_EXTENT: u64 = 256;

fn chunk_bytes() -> Vec<u8> {
    vec![0u8; (CHUNK_EXTENT as usize) * std::mem::size_of::<f64>()]
}

/// Build an unflushed in-memory `Series` with `mesh_count` meshes, each a
/// single scalar component with one `CHUNK_EXTENT`-element chunk queued.
fn prepare_memory_series(mesh_count: usize) -> Series {
    let mut series = Series::create(":memory:", IterationEncoding::GroupBased, "").unwrap();
    write_meshes(&mut series, mesh_count);
    series
}

/// Same, but backed by a fresh on-disk directory.
fn prepare_fs_series(mesh_count: usize) -> (TempDir, Series) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("run").to_string_lossy().into_owned();
    let mut series = Series::create(&root, IterationEncoding::GroupBased, "").unwrap();
    write_meshes(&mut series, mesh_count);
    (dir, series)
}

fn write_meshes(series: &mut Series, mesh_count: usize) {
    let (it, arena) = series.iteration_and_arena(0).unwrap();
    it.set_time(arena, 0.0);
    for i in 0..mesh_count {
        let mesh = it.mesh_or_insert(arena, &format!("field_{i}"));
        let comp = mesh.component_or_insert(arena, "scalar").unwrap();
        comp.reset_dataset(arena, Datatype::Double, vec![CHUNK_EXTENT], None)
            .unwrap();
        comp.store_chunk(arena, vec![0], vec![CHUNK_EXTENT], ChunkBuffer::Owned(chunk_bytes()))
            .unwrap();
    }
}

fn bench_memory_backend(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_memory");

    for mesh_count in [8usize, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(mesh_count),
            &mesh_count,
            |b, &mesh_count| {
                b.iter_batched(
                    || prepare_memory_series(mesh_count),
                    |mut series| black_box(series.flush().unwrap()),
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_json_fs_backend(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_json_fs");

    for mesh_count in [8usize, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(mesh_count),
            &mesh_count,
            |b, &mesh_count| {
                b.iter_batched(
                    || prepare_fs_series(mesh_count),
                    |(_dir, mut series)| black_box(series.flush().unwrap()),
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

/// Re-flush an already-flushed series where nothing is dirty, isolating the
/// no-op-delta-flush path (`Attributable`'s last-flushed snapshot, `spec.md`
/// §4.6) from the cost of actually creating datasets and writing chunks.
fn bench_redundant_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_redundant");

    group.bench_function("memory_256_meshes_clean", |b| {
        b.iter_batched(
            || {
                let mut series = prepare_memory_series(256);
                series.flush().unwrap();
                series
            },
            |mut series| black_box(series.flush().unwrap()),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(flush, bench_memory_backend, bench_json_fs_backend, bench_redundant_flush);
criterion_main!(flush);
