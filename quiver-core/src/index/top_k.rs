//! Bounded top-k selection.
//!
//! A min-heap capped at `k` entries: the root is always the weakest survivor,
//! so each candidate costs one comparison against the root and, if admitted,
//! O(log k) to sift. Results are ordered only once, when the heap is drained.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A scored candidate identified by a caller-defined key (slot, doc id, ...).
#[derive(Debug, Clone, Copy)]
pub struct Candidate<K> {
    pub score: f32,
    pub key: K,
}

impl<K: Ord> PartialEq for Candidate<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Candidate<K> {}

impl<K: Ord> PartialOrd for Candidate<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Candidate<K> {
    /// Higher score ranks higher; on ties the smaller key ranks higher.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Keeps the `k` best candidates seen so far.
#[derive(Debug)]
pub struct TopK<K: Ord> {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate<K>>>,
}

impl<K: Ord> TopK<K> {
    /// Creates a selector for `k` results. `capacity_hint` bounds the allocation.
    pub fn new(k: usize, capacity_hint: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(capacity_hint)),
        }
    }

    /// Current number of survivors.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if nothing has been admitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the weakest survivor once the selector is full.
    #[inline]
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|Reverse(c)| c.score)
    }

    /// Offers a candidate. Returns true if it was admitted.
    ///
    /// While fewer than `k` survivors exist every candidate is admitted; after
    /// that a candidate replaces the minimum only if its score is strictly greater.
    pub fn push(&mut self, score: f32, key: K) -> bool {
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(Reverse(Candidate { score, key }));
            return true;
        }

        let Some(mut root) = self.heap.peek_mut() else {
            return false;
        };
        if score > root.0.score {
            *root = Reverse(Candidate { score, key });
            true
        } else {
            false
        }
    }

    /// Drains the survivors, best first.
    pub fn into_sorted_vec(self) -> Vec<Candidate<K>> {
        // Ascending order of Reverse is descending order of the candidates.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(c)| c)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_best_k_in_order() {
        let mut top = TopK::new(3, 10);
        for (key, score) in [0.1, 0.9, 0.5, 0.7, 0.3, 0.8].iter().enumerate() {
            top.push(*score, key);
        }

        let out: Vec<_> = top.into_sorted_vec().iter().map(|c| c.key).collect();
        assert_eq!(out, vec![1, 5, 3]);
    }

    #[test]
    fn test_fewer_candidates_than_k() {
        let mut top = TopK::new(5, 2);
        top.push(-1.0, 0usize);
        top.push(2.0, 1usize);

        assert_eq!(top.threshold(), None);
        let out = top.into_sorted_vec();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, 1);
    }

    #[test]
    fn test_ties_do_not_replace() {
        let mut top = TopK::new(1, 4);
        assert!(top.push(0.5, 0usize));
        assert!(!top.push(0.5, 1usize));
        assert!(top.push(0.6, 2usize));
        assert_eq!(top.threshold(), Some(0.6));
        assert_eq!(top.into_sorted_vec()[0].key, 2);
    }

    #[test]
    fn test_zero_k() {
        let mut top = TopK::new(0, 4);
        assert!(!top.push(1.0, 0usize));
        assert!(top.is_empty());
    }
}
