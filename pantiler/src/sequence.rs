//! Strictly ordered async execution.
//!
//! Some work must not overlap: outputs of one source share a conversion
//! context, fonts are processed one after another, and sprite ratios are
//! rendered in turn. [`run_in_order`] awaits each step before starting the
//! next and stops at the first error.

use std::future::Future;

/// Run `step` over `items` one at a time, collecting the results in order.
///
/// # Examples
///
/// ```
/// use pantiler::sequence::run_in_order;
///
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let doubled: Result<Vec<u32>, ()> = run_in_order(vec![1, 2, 3], |n| async move { Ok(n * 2) }).await;
/// assert_eq!(doubled, Ok(vec![2, 4, 6]));
/// # });
/// ```
pub async fn run_in_order<I, T, F, Fut, R, E>(items: I, mut step: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let mut results = Vec::new();
    for item in items {
        results.push(step(item).await?);
    }
    Ok(results)
}
