//! Per-batch-element dispatch, parallel when the `parallel` feature is on.

use crate::error::Result;

/// Run `f` for every batch element and concatenate the results in batch order.
pub(crate) fn map_batch<T, F>(batch: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<Vec<T>> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    let parts: Vec<Result<Vec<T>>> = {
        use rayon::prelude::*;
        (0..batch).into_par_iter().map(&f).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let parts: Vec<Result<Vec<T>>> = (0..batch).map(&f).collect();

    let mut out = Vec::new();
    for part in parts {
        out.extend(part?);
    }
    Ok(out)
}
