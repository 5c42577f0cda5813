//! Create and extract throughput over a generated tree with a mix of
//! duplicate, compressible and random files.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mtar::{create_archive, extract_archive, CreateOptions, ExtractOptions};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::fs;
use tempfile::TempDir;

const FILES_PER_DIR: usize = 25;
const FILE_SIZE: usize = 64 * 1024;

/// Builds 4 directories of 25 files each and returns the tree with its total size.
fn generate_tree() -> (TempDir, u64) {
    let root = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(0x6d746172);
    let mut total = 0u64;
    for d in 0..4 {
        let dir = root.path().join(format!("dir{}", d));
        fs::create_dir(&dir).unwrap();
        for f in 0..FILES_PER_DIR {
            let body = match f % 3 {
                0 => b"duplicated block ".repeat(FILE_SIZE / 17),
                1 => format!("line {} of file {} in dir {}\n", f, f, d).repeat(FILE_SIZE / 32).into_bytes(),
                _ => {
                    let mut buf = vec![0u8; FILE_SIZE];
                    rng.fill_bytes(&mut buf);
                    buf
                }
            };
            total += body.len() as u64;
            fs::write(dir.join(format!("file{:03}", f)), body).unwrap();
        }
    }
    (root, total)
}

fn bench_create(c: &mut Criterion) {
    let (tree, total) = generate_tree();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("bench.mtar");

    let mut group = c.benchmark_group("create");
    group.throughput(Throughput::Bytes(total));
    group.sample_size(10);
    for threads in [1usize, 4, 0] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let options = CreateOptions { threads, ..Default::default() };
            b.iter(|| black_box(create_archive(&archive, tree.path(), &options).unwrap()));
        });
    }
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let (tree, total) = generate_tree();
    let out = TempDir::new().unwrap();
    let archive = out.path().join("bench.mtar");
    create_archive(&archive, tree.path(), &CreateOptions::default()).unwrap();

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Bytes(total));
    group.sample_size(10);
    for threads in [1usize, 4, 0] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let dest = out.path().join(format!("restore-{}", threads));
            let options = ExtractOptions { threads };
            b.iter(|| black_box(extract_archive(&archive, &dest, &options).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create, bench_extract);
criterion_main!(benches);
