//! Parser throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dango::parser::VtMachine;

fn plain_text(size: usize) -> Vec<u8> {
    let line = b"The quick brown fox jumps over the lazy dog.\r\n";
    line.iter().cycle().take(size).copied().collect()
}

fn colored_output(size: usize) -> Vec<u8> {
    let chunk = b"\x1b[32mok\x1b[0m \x1b[1;31merror\x1b[0m \x1b[38;5;208mwarn\x1b[0m\r\n";
    chunk.iter().cycle().take(size).copied().collect()
}

fn cursor_heavy(size: usize) -> Vec<u8> {
    let chunk = b"\x1b[10;20H*\x1b[H\x1b[2K\x1b[5Cx";
    chunk.iter().cycle().take(size).copied().collect()
}

fn bench_parser(c: &mut Criterion) {
    const SIZE: usize = 64 * 1024;
    let mut group = c.benchmark_group("parser");
    group.throughput(Throughput::Bytes(SIZE as u64));

    let inputs = [
        ("plain_text", plain_text(SIZE)),
        ("colored_output", colored_output(SIZE)),
        ("cursor_heavy", cursor_heavy(SIZE)),
    ];

    for (name, data) in &inputs {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let mut machine = VtMachine::new();
                let mut events = 0usize;
                machine.parse(black_box(data), |_| events += 1);
                black_box(events)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parser);
criterion_main!(benches);
