use sealdrop_crypto::{derive_chunk_nonce, generate_base_nonce, generate_key, open_stored_chunk, seal_chunk};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 5242880])]
fn bench_seal_chunk(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let base = generate_base_nonce();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .with_inputs(|| data.clone())
        .bench_values(|plaintext| {
            seal_chunk(divan::black_box(&key), divan::black_box(&base), 7, plaintext).unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576, 5242880])]
fn bench_open_stored_chunk(bencher: divan::Bencher, size: usize) {
    let key = generate_key();
    let base = generate_base_nonce();
    let stored = seal_chunk(&key, &base, 7, make_data(size)).unwrap().into_stored();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .with_inputs(|| stored.clone())
        .bench_values(|stored| {
            open_stored_chunk(divan::black_box(&key), divan::black_box(&base), 7, stored).unwrap()
        });
}

#[divan::bench]
fn bench_derive_chunk_nonce(bencher: divan::Bencher) {
    let base = *generate_base_nonce().as_bytes();
    bencher.bench(|| derive_chunk_nonce(divan::black_box(&base), divan::black_box(1234)));
}

fn main() {
    divan::main();
}
