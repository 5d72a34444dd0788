use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyharden::encoder::{decode_node, encode_row, Branch};
use keyharden::history::{decrypt_and_validate, derive_history_key, seal, HISTORY_SIZE};
use keyharden::poly::{evaluate, interpolate, random_polynomial, Point, COEFFICIENT_BITS};
use keyharden::{HardeningConfig, Hardener, MemoryStore};
use rand::rngs::StdRng;
use rand::SeedableRng;

const PASSWORD: &str = ".tie5Roanl";
const FEATURES: usize = 19;

fn bench_interpolate(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let poly = random_polynomial(&mut rng, FEATURES, COEFFICIENT_BITS);
    let points: Vec<Point> = (0..FEATURES as i64)
        .map(|i| Point::new(2 * i + (i % 2), evaluate(&poly, 2 * i + (i % 2))))
        .collect();

    c.bench_function("interpolate (19 nodes)", |b| {
        b.iter(|| interpolate(black_box(&points)).map(|form| form.evaluate(0)))
    });
}

fn bench_encode_decode(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let poly = random_polynomial(&mut rng, FEATURES, COEFFICIENT_BITS);
    let y0 = evaluate(&poly, 10);
    let y1 = evaluate(&poly, 11);

    c.bench_function("encode_row", |b| {
        b.iter(|| encode_row(black_box(&y0), black_box(&y1), 5, PASSWORD))
    });

    let row = encode_row(&y0, &y1, 5, PASSWORD);
    c.bench_function("decode_node", |b| {
        b.iter(|| decode_node(black_box(&row), 5, PASSWORD, Branch::Alpha))
    });
}

fn bench_history(c: &mut Criterion) {
    let key = derive_history_key("bench", &num_bigint::BigInt::from(123_456_789u64));
    let history = vec![vec![0.0; FEATURES]; 50];
    let blob = seal(&key, "bench", &history, HISTORY_SIZE).unwrap();

    c.bench_function("history seal (50 x 19)", |b| {
        b.iter(|| seal(&key, "bench", black_box(&history), HISTORY_SIZE))
    });
    c.bench_function("history open (50 x 19)", |b| {
        b.iter(|| decrypt_and_validate(&key, black_box(&blob), "bench", FEATURES))
    });
}

fn bench_login(c: &mut Criterion) {
    let store = MemoryStore::new(vec![0.5; FEATURES]);
    let mut hardener =
        Hardener::new(store, StdRng::seed_from_u64(3), HardeningConfig::default()).unwrap();
    hardener.enroll("bench", PASSWORD).unwrap();
    let features = vec![0.0; FEATURES];

    c.bench_function("Hardener::login", |b| {
        b.iter(|| hardener.login("bench", PASSWORD, black_box(&features)))
    });
}

criterion_group!(
    benches,
    bench_interpolate,
    bench_encode_decode,
    bench_history,
    bench_login,
);
criterion_main!(benches);
