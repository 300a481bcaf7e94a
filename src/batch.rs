// Parallel classification over a batch of queries (§5, §9).
//
// `std::thread::scope` is enough here: every query is an independent,
// CPU-bound computation over immutable, `Sync` shared state (the
// classifier), so there's no need to pull in an external executor.

/// Classify `queries` against `classify_one` across up to `worker_count`
/// threads, returning results in the same order as `queries`.
///
/// `classify_one` must be `Sync` since it (and whatever it closes over —
/// typically a `&ProteinClassifier`/`&DnaClassifier`) is shared across
/// worker threads; each individual call still runs to completion on a
/// single thread with no cross-thread state of its own.
pub fn classify_batch<Q, T, F>(queries: &[Q], worker_count: usize, classify_one: F) -> Vec<T>
where
    Q: Sync,
    T: Send,
    F: Fn(&Q) -> T + Sync,
{
    let worker_count = worker_count.max(1).min(queries.len().max(1));
    let mut results: Vec<Option<T>> = (0..queries.len()).map(|_| None).collect();

    if queries.is_empty() {
        return Vec::new();
    }

    std::thread::scope(|scope| {
        let chunk_size = queries.len().div_ceil(worker_count);
        let mut remaining = results.as_mut_slice();
        let mut offset = 0usize;
        let mut handles = Vec::new();

        while !remaining.is_empty() {
            let take = chunk_size.min(remaining.len());
            let (chunk, rest) = remaining.split_at_mut(take);
            remaining = rest;
            let queries_chunk = &queries[offset..offset + take];
            offset += take;

            let classify_one = &classify_one;
            handles.push(scope.spawn(move || {
                for (slot, query) in chunk.iter_mut().zip(queries_chunk) {
                    *slot = Some(classify_one(query));
                }
            }));
        }

        for handle in handles {
            // A worker panicking (e.g. on a bug in `classify_one`) is
            // propagated rather than silently dropping its results.
            handle.join().expect("classify_batch worker thread panicked");
        }
    });

    log::debug!(
        "classify_batch processed {} quer{} across {} worker thread{}",
        queries.len(),
        if queries.len() == 1 { "y" } else { "ies" },
        worker_count,
        if worker_count == 1 { "" } else { "s" }
    );

    results
        .into_iter()
        .map(|r| r.expect("every slot is written exactly once by its assigned worker"))
        .collect()
}
