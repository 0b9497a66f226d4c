//! Bounded top-k selection with a deterministic tie-break.

use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Ordering key: higher score first, then lower row first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ranked {
    score: OrderedFloat<f32>,
    row: usize,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.row.cmp(&self.row))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the `k` best `(row, score)` pairs.
///
/// The result is sorted by descending score; equal scores keep ascending row
/// order, so a stream of all-zero scores comes back in catalog order.
pub fn top_k<I>(scores: I, k: usize) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = (usize, f32)>,
{
    if k == 0 {
        return Vec::new();
    }

    // Min-heap of the current best k: the root is the weakest survivor
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
    for (row, score) in scores {
        let candidate = Ranked {
            score: OrderedFloat(if score.is_nan() { f32::NEG_INFINITY } else { score }),
            row,
        };
        if heap.len() < k {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(weakest)) = heap.peek() {
            if candidate > *weakest {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    // Ascending Reverse order == descending Ranked order
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(r)| (r.row, r.score.into_inner()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_orders_by_score() {
        let scores = vec![(0, 0.1), (1, 0.9), (2, 0.5), (3, 0.7)];
        assert_eq!(top_k(scores, 2), vec![(1, 0.9), (3, 0.7)]);
    }

    #[test]
    fn test_top_k_ties_prefer_lower_row() {
        let scores = vec![(4, 0.5), (2, 0.5), (7, 0.5), (0, 0.2), (1, 0.5)];
        assert_eq!(top_k(scores, 3), vec![(1, 0.5), (2, 0.5), (4, 0.5)]);
    }

    #[test]
    fn test_top_k_all_zero_is_catalog_order() {
        let scores = (0..10).map(|row| (row, 0.0));
        let rows: Vec<usize> = top_k(scores, 5).into_iter().map(|(r, _)| r).collect();
        assert_eq!(rows, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_top_k_bounds() {
        assert!(top_k(vec![(0, 1.0)], 0).is_empty());
        assert_eq!(top_k(vec![(0, 1.0), (1, 0.5)], 10).len(), 2);
    }
}
