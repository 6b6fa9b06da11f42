use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fwupdate::archive::decode_plaintext;
use std::time::Duration;

const TARGET_DECODE_MS: f64 = 50.0;

fn build_archive_text(product_count: usize, records_per_product: usize) -> String {
    let mut lines = vec!["FORMAT-BENCH-1.0".to_string()];
    for p in 0..product_count {
        lines.push(format!("PE{p:04}=Product{p}=1.0=bench fixture"));
        for r in 0..records_per_product {
            let offset = (r * 16) as u16;
            lines.push(checksummed_data_line(offset, &[0xAAu8; 16]));
        }
        lines.push(checksummed_eof_line());
    }
    lines.join("\n")
}

fn checksummed_data_line(offset: u16, data: &[u8]) -> String {
    checksummed_line(data.len() as u8, offset, 0, data)
}

fn checksummed_eof_line() -> String {
    checksummed_line(0, 0, 1, &[])
}

fn checksummed_line(length: u8, offset: u16, record_type: u8, data: &[u8]) -> String {
    let mut bytes = vec![length];
    bytes.extend_from_slice(&offset.to_be_bytes());
    bytes.push(record_type);
    bytes.extend_from_slice(data);
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    let checksum = (256 - (sum & 0xFF)) as u8 & 0xFF;
    bytes.push(checksum);
    format!(":{}", hex::encode(&bytes))
}

fn benchmark_decode_single_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_decode");
    group.measurement_time(Duration::from_secs(10));

    // ~116 KiB firmware blob, one data record per 16 bytes.
    let text = build_archive_text(1, (116 * 1024) / 16);
    let bytes = text.into_bytes();

    group.bench_function("single_receiver_blob", |b| {
        b.iter(|| {
            let _ = decode_plaintext(black_box(&bytes)).unwrap();
        })
    });

    group.finish();
}

fn benchmark_decode_two_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive_decode");
    group.measurement_time(Duration::from_secs(10));

    let text = build_archive_text(2, (48 * 1024) / 16);
    let bytes = text.into_bytes();

    group.bench_function("two_products", |b| {
        b.iter(|| {
            let _ = decode_plaintext(black_box(&bytes)).unwrap();
        })
    });

    group.finish();
}

fn benchmark_target_is_met(c: &mut Criterion) {
    let text = build_archive_text(1, (116 * 1024) / 16);
    let bytes = text.into_bytes();

    let start = std::time::Instant::now();
    let _ = decode_plaintext(black_box(&bytes)).unwrap();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    assert!(
        elapsed_ms < TARGET_DECODE_MS,
        "archive decode regressed: {elapsed_ms}ms for a single 116KiB blob"
    );

    c.bench_function("regression_guard_noop", |b| b.iter(|| black_box(1)));
}

criterion_group!(
    benches,
    benchmark_decode_single_product,
    benchmark_decode_two_products,
    benchmark_target_is_met
);
criterion_main!(benches);
