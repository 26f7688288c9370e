/// A seeded permutation of `0..n`.
///
/// The same `(n, seed)` always yields the same order.
pub(crate) fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut order: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut order);
    order
}
