//! # cancellable_loops
//!
//! A small utility crate for creating cancellable loops in both sequential and parallel contexts.
//!
//! This crate provides functions that allow you to break out of loops early when an abort flag is set,
//! which is particularly useful for:
//!
//! - Long-running numerical batch jobs (e.g. baselining hundreds of spectra)
//! - User-interruptible processing pipelines
//! - Tasks that may need to be aborted based on external conditions
//!
//! ## Features
//!
//! - Sequential loop with cancellation support
//! - Parallel loop with cancellation support using Rayon
//! - Parallel, order-preserving map with cancellation support
//!
//! ## Example
//!
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use cancellable_loops::for_each_cancellable;
//!
//! let abort_flag = AtomicBool::new(false);
//! let mut processed = 0;
//!
//! for_each_cancellable(0..1000, &abort_flag, |_i| {
//!     processed += 1;
//!     if processed == 10 {
//!         abort_flag.store(true, Ordering::Relaxed);
//!     }
//! });
//!
//! assert_eq!(processed, 10);
//! ```

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Executes a sequential loop that can be cancelled via an abort flag.
///
/// This function iterates over the provided iterator and applies the given function
/// to each element. If the abort flag is set to `true` at any point during iteration,
/// the loop will exit early.
///
/// # Arguments
///
/// * `iter` - Any iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - A function to apply to each element in the iterator
pub fn for_each_cancellable<I, F, T>(iter: I, abort_flag: &AtomicBool, mut func: F)
where
    I: IntoIterator<Item = T>,
    F: FnMut(T),
{
    for item in iter {
        if abort_flag.load(Ordering::Relaxed) {
            break;
        }
        func(item);
    }
}

/// Executes a parallel loop that can be cancelled via an abort flag.
///
/// This function parallelizes the iteration over the provided iterator using Rayon
/// and applies the given function to each element. If the abort flag is set to `true`
/// at any point, remaining work will be skipped.
///
/// # Arguments
///
/// * `iter` - Any parallel iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - A function to apply to each element in the iterator
pub fn par_for_each_cancellable<I, F>(iter: I, abort_flag: &AtomicBool, func: F)
where
    I: IntoParallelIterator,
    F: Fn(I::Item) + Sync + Send,
    I::Item: Send,
{
    let abort = Arc::new(abort_flag);

    iter.into_par_iter()
        .try_for_each(|item| {
            if abort.load(Ordering::Relaxed) {
                Err(())
            } else {
                func(item);
                Ok(())
            }
        })
        .ok();
}

/// Executes a parallel, order-preserving map that can be cancelled via an abort flag.
///
/// Each element of the input is mapped through `func` on the Rayon thread pool.
/// The output vector has the same length and ordering as the input; elements that
/// were skipped because the abort flag was raised are `None`.
///
/// This is the building block for batch operations over independent spectra,
/// where each worker produces an independent result and the caller needs the
/// results matched back to the inputs.
///
/// # Arguments
///
/// * `iter` - Any indexed parallel iterator to process
/// * `abort_flag` - An atomic boolean that can be set to `true` to cancel the loop
/// * `func` - A function mapping each item to a result
///
/// # Examples
///
/// ```
/// use std::sync::atomic::AtomicBool;
/// use cancellable_loops::par_map_cancellable;
///
/// let abort_flag = AtomicBool::new(false);
/// let doubled = par_map_cancellable(vec![1, 2, 3], &abort_flag, |v| v * 2);
/// assert_eq!(doubled, vec![Some(2), Some(4), Some(6)]);
/// ```
pub fn par_map_cancellable<I, F, R>(iter: I, abort_flag: &AtomicBool, func: F) -> Vec<Option<R>>
where
    I: IntoParallelIterator,
    I::Iter: IndexedParallelIterator,
    F: Fn(I::Item) -> R + Sync + Send,
    I::Item: Send,
    R: Send,
{
    let abort = Arc::new(abort_flag);

    iter.into_par_iter()
        .map(|item| {
            if abort.load(Ordering::Relaxed) {
                None
            } else {
                Some(func(item))
            }
        })
        .collect()
}
