//! The three data-parallel primitives the round engine runs on.
//!
//! With the `parallel` feature they are thin wrappers over `rayon`; without
//! it they split work into chunks over `std::thread::scope`. Either way, a
//! loop shorter than the granularity, or any loop under
//! [`ExecutionMode::Sequential`], runs inline on the calling thread. Every
//! primitive returns only after all of its work has finished, which is the
//! barrier the engine places between phases.

use crate::config::ExecutionMode;

/// Execution mode plus the sequential cut-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism {
    /// Sequential or parallel.
    pub mode: ExecutionMode,
    /// Minimum items per parallel task.
    pub granularity: usize,
}

impl Parallelism {
    /// Single-threaded.
    pub const SEQUENTIAL: Self = Self {
        mode: ExecutionMode::Sequential,
        granularity: 1,
    };

    /// `mode` with a granularity of at least one.
    pub fn new(mode: ExecutionMode, granularity: usize) -> Self {
        Self {
            mode,
            granularity: granularity.max(1),
        }
    }

    #[inline]
    fn inline_for(&self, len: usize) -> bool {
        self.mode == ExecutionMode::Sequential || len <= self.granularity
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::new(ExecutionMode::Parallel, 8)
    }
}

/// Runs `body(i)` for every `i` in `lo..hi`, in no particular order.
pub fn parallel_for<F>(par: Parallelism, lo: usize, hi: usize, body: F)
where
    F: Fn(usize) + Sync + Send,
{
    if hi <= lo {
        return;
    }
    if par.inline_for(hi - lo) {
        (lo..hi).for_each(body);
        return;
    }
    backend::parallel_for(par.granularity, lo, hi, &body);
}

/// Maps `f` over `items`, keeping input order in the output.
pub fn parallel_map<T, R, F>(par: Parallelism, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if par.inline_for(items.len()) {
        return items.iter().map(f).collect();
    }
    backend::parallel_map(par.granularity, items, &f)
}

/// Runs both closures, potentially in parallel, and returns both results.
pub fn fork_join<A, B, RA, RB>(par: Parallelism, left: A, right: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if par.mode == ExecutionMode::Sequential {
        return (left(), right());
    }
    backend::fork_join(left, right)
}

/// Stable compaction: the items of `input` satisfying `keep`, in input order.
pub fn filter<T, P>(par: Parallelism, input: &[T], keep: P) -> Vec<T>
where
    T: Copy + Send + Sync,
    P: Fn(&T) -> bool + Sync + Send,
{
    if par.inline_for(input.len()) {
        return input.iter().copied().filter(|x| keep(x)).collect();
    }
    let kept: Vec<Option<T>> = parallel_map(par, input, |x| keep(x).then_some(*x));
    kept.into_iter().flatten().collect()
}

#[cfg(feature = "parallel")]
mod backend {
    use rayon::prelude::*;

    pub(super) fn parallel_for<F>(grain: usize, lo: usize, hi: usize, body: &F)
    where
        F: Fn(usize) + Sync + Send,
    {
        (lo..hi).into_par_iter().with_min_len(grain).for_each(body);
    }

    pub(super) fn parallel_map<T, R, F>(grain: usize, items: &[T], f: &F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        items.par_iter().with_min_len(grain).map(f).collect()
    }

    pub(super) fn fork_join<A, B, RA, RB>(left: A, right: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(left, right)
    }
}

#[cfg(not(feature = "parallel"))]
mod backend {
    use std::num::NonZeroUsize;
    use std::thread;

    fn workers() -> usize {
        thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }

    fn chunk_len(len: usize, grain: usize) -> usize {
        len.div_ceil(workers()).max(grain).max(1)
    }

    fn join<T>(h: thread::ScopedJoinHandle<'_, T>) -> T {
        h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }

    pub(super) fn parallel_for<F>(grain: usize, lo: usize, hi: usize, body: &F)
    where
        F: Fn(usize) + Sync + Send,
    {
        let chunk = chunk_len(hi - lo, grain);
        thread::scope(|s| {
            let handles: Vec<_> = (lo..hi)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(hi);
                    s.spawn(move || (start..end).for_each(body))
                })
                .collect();
            handles.into_iter().for_each(join);
        });
    }

    pub(super) fn parallel_map<T, R, F>(grain: usize, items: &[T], f: &F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        let chunk = chunk_len(items.len(), grain);
        thread::scope(|s| {
            let handles: Vec<_> = items
                .chunks(chunk)
                .map(|part| s.spawn(move || part.iter().map(f).collect::<Vec<R>>()))
                .collect();
            handles.into_iter().flat_map(join).collect()
        })
    }

    pub(super) fn fork_join<A, B, RA, RB>(left: A, right: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        thread::scope(|s| {
            let l = s.spawn(left);
            let r = right();
            (join(l), r)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn modes() -> [Parallelism; 3] {
        [
            Parallelism::SEQUENTIAL,
            Parallelism::new(ExecutionMode::Parallel, 1),
            Parallelism::new(ExecutionMode::Parallel, 64),
        ]
    }

    #[test]
    fn parallel_for_visits_every_index_once() {
        for par in modes() {
            let hits: Vec<AtomicUsize> = (0..500).map(|_| AtomicUsize::new(0)).collect();
            parallel_for(par, 10, 500, |i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            });
            assert!(hits[..10].iter().all(|h| h.load(Ordering::Relaxed) == 0));
            assert!(hits[10..].iter().all(|h| h.load(Ordering::Relaxed) == 1));
        }
    }

    #[test]
    fn map_and_filter_keep_order() {
        let input: Vec<u32> = (0..1000).collect();
        for par in modes() {
            let doubled = parallel_map(par, &input, |x| x * 2);
            assert_eq!(doubled, input.iter().map(|x| x * 2).collect::<Vec<_>>());
            let odd = filter(par, &input, |x| x % 2 == 1);
            assert_eq!(odd, input.iter().copied().filter(|x| x % 2 == 1).collect::<Vec<_>>());
        }
    }

    #[test]
    fn fork_join_returns_both_sides() {
        for par in modes() {
            let (a, b) = fork_join(par, || (0..100u64).sum::<u64>(), || "right");
            assert_eq!((a, b), (4950, "right"));
        }
    }

    #[test]
    fn empty_ranges_are_no_ops() {
        parallel_for(Parallelism::default(), 5, 5, |_| panic!("ran"));
        assert!(parallel_map(Parallelism::default(), &[] as &[u8], |x| *x).is_empty());
    }
}
