use crate::Error;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Minimum number of frames one worker takes at a time.
///
/// The pool is shared between `set_count` concurrently running sizing sets, so each set gets
/// `threads / set_count` lanes and splits its frames evenly across them.
pub fn block_size(frame_count: usize, set_count: usize) -> usize {
    let threads = rayon::current_num_threads().max(1);
    let lanes = (threads / set_count.max(1)).max(1);
    frame_count.div_ceil(lanes).max(1)
}

/// Maps `f` over `items` in parallel; results keep the order of `items`.
///
/// A panic in any task is returned as [`Error::WorkerPanicked`].
pub fn iter_parallel_by_list<T, R, F>(items: &[T], block: usize, f: F) -> Result<Vec<R>, Error>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync + Send,
{
    capture(|| {
        items
            .par_iter()
            .enumerate()
            .with_min_len(block.max(1))
            .map(|(index, item)| f(index, item))
            .collect()
    })
}

/// Maps `f` over `0..count` in parallel; results are indexed like the range.
pub fn iter_parallel_by_count<R, F>(count: usize, block: usize, f: F) -> Result<Vec<R>, Error>
where
    R: Send,
    F: Fn(usize) -> R + Sync + Send,
{
    capture(|| {
        (0..count)
            .into_par_iter()
            .with_min_len(block.max(1))
            .map(f)
            .collect()
    })
}

/// Runs the left and right side of a pass concurrently.
pub fn join_sides<A, B, FA, FB>(left: FA, right: FB) -> Result<(A, B), Error>
where
    A: Send,
    B: Send,
    FA: FnOnce() -> A + Send,
    FB: FnOnce() -> B + Send,
{
    capture(|| rayon::join(left, right))
}

fn capture<R>(f: impl FnOnce() -> R) -> Result<R, Error> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::WorkerPanicked {
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
