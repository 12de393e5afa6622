//! Bounded, order-preserving parallel map.

use rayon::prelude::*;

/// Apply `f` to every item on a pool of at most `workers` threads,
/// returning results in input order.
///
/// `workers <= 1` runs on the calling thread, as does any run where the
/// pool cannot be built. A panic in `f` is propagated to the caller.
pub fn map_bounded<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(&f).collect();
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.min(items.len()))
        .build()
    {
        Ok(pool) => pool.install(|| items.par_iter().map(&f).collect()),
        Err(e) => {
            tracing::warn!(error = %e, workers, "worker pool unavailable, running sequentially");
            items.iter().map(&f).collect()
        }
    }
}
