//! Top-N process ranking.

use crate::types::ProcessUsage;

/// Rank `items` by the metric `read` extracts, highest first, keeping at most `n`.
///
/// `read` returns `None` when the process vanished or its metric could not be read;
/// such entries are skipped, as are non-finite values. The sort is stable, so ties
/// keep enumeration order.
pub fn rank_top_n<I, F>(items: I, n: usize, mut read: F) -> Vec<ProcessUsage>
where
    I: IntoIterator,
    F: FnMut(&I::Item) -> Option<ProcessUsage>,
{
    if n == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<ProcessUsage> = items
        .into_iter()
        .filter_map(|item| read(&item))
        .filter(|p| p.metric_value.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.metric_value.total_cmp(&a.metric_value));
    ranked.truncate(n);
    ranked
}
