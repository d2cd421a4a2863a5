// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for envelope seal/open and archive pack/unpack.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use cachette::{archive, EncryptionContext, EnvelopeCipher, LocalKeyService, Secret};

fn bench_envelope(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let kms = Arc::new(LocalKeyService::generate().expect("failed to generate key service"));
    let cipher = EnvelopeCipher::new(Arc::clone(&kms));
    let ctx = EncryptionContext::new().with("env", "bench");

    let mut group = c.benchmark_group("envelope");

    for size in [64, 256, 1024, 4096, 16384, 65536].iter() {
        let data: Vec<u8> = (0..*size).map(|i| (i % 256) as u8).collect();

        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &data, |b, data| {
            b.iter(|| {
                let unit = rt.block_on(cipher.seal(black_box(data), &ctx)).unwrap();
                black_box(unit)
            })
        });

        let unit = rt.block_on(cipher.seal(&data, &ctx)).unwrap();

        group.bench_with_input(BenchmarkId::new("open", size), &unit, |b, unit| {
            b.iter(|| {
                let plaintext = rt.block_on(cipher.open(black_box(unit), &ctx)).unwrap();
                black_box(plaintext)
            })
        });
    }

    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let kms = LocalKeyService::generate().expect("failed to generate key service");
    let ctx = EncryptionContext::new().with("env", "bench");

    let mut group = c.benchmark_group("archive");

    for count in [1usize, 16, 128].iter() {
        let secrets: Vec<Secret> = (0..*count)
            .map(|i| Secret::new(format!("secret-{}", i), vec![0xAB; 1024]))
            .collect();

        group.throughput(Throughput::Bytes((*count as u64) * 1024));

        group.bench_with_input(BenchmarkId::new("pack", count), &secrets, |b, secrets| {
            b.iter(|| {
                let bytes = rt.block_on(archive::pack(&kms, black_box(secrets), &ctx)).unwrap();
                black_box(bytes)
            })
        });

        let bytes = rt.block_on(archive::pack(&kms, &secrets, &ctx)).unwrap();

        group.bench_with_input(BenchmarkId::new("unpack", count), &bytes, |b, bytes| {
            b.iter(|| {
                let secrets = rt.block_on(archive::unpack(&kms, black_box(bytes), &ctx)).unwrap();
                black_box(secrets)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_envelope, bench_archive);
criterion_main!(benches);
