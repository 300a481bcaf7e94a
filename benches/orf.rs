use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use uproc_rs::orf::OrfIter;

const NUCS: [u8; 4] = [b'A', b'C', b'T', b'G'];

/// 5,000 random nucleotides, matching the input size the original library's
/// own ORF benchmark used.
fn random_seq<R: Rng>(len: usize, rng: &mut R) -> Vec<u8> {
    (0..len).map(|_| NUCS[rng.gen_range(0..NUCS.len())]).collect()
}

fn bench_six_frame_orfs(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0FFEE);
    let seq = random_seq(5_000, &mut rng);

    c.bench_function("orf_iter_5k_nt", |b| {
        b.iter(|| {
            let orfs: Vec<_> = OrfIter::new(black_box(&seq), None, None).collect();
            orfs
        })
    });
}

criterion_group!(benches, bench_six_frame_orfs);
criterion_main!(benches);
