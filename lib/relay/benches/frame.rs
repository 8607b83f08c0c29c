#[macro_use]
extern crate criterion;

extern crate relay;
use criterion::{black_box, BatchSize, Criterion};
use relay::net::buffer::Buffer;
use relay::net::frame::{self, Decoder, Opcode};

fn encode(c: &mut Criterion) {
    let small = vec![b'a'; 100];
    let large = vec![b'a'; 70_000];

    c.bench_function("Mask 100B", |b| b.iter(|| frame::mask(black_box(&small))));
    c.bench_function("Mask 70KB", |b| b.iter(|| frame::mask(black_box(&large))));
}

fn decode(c: &mut Criterion) {
    let payload = vec![b'a'; 4096];
    let mut stream = Vec::new();

    for _ in 0..64 {
        stream.extend(frame::mask_with(&payload, Opcode::Text, true, [1, 2, 3, 4]));
    }

    c.bench_function("Deframe 64x4KB", move |b| {
        b.iter_batched(
            || {
                let mut buffer = Buffer::new(usize::max_value());
                buffer.extend(&stream);
                (buffer, Decoder::default())
            },
            |(mut buffer, mut decoder)| {
                while let Ok(inbound) = decoder.deframe(&mut buffer) {
                    black_box(inbound);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, encode, decode);
criterion_main!(benches);
