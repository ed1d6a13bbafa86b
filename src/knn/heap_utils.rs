//! Bounded max-heap keeping the k best (smallest distance) items seen so far.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry. Ordered by distance, then by arrival order, so that among
/// equal distances the earliest item wins, matching a stable sort.
#[derive(Debug)]
pub struct HeapElement<P> {
    pub distance: u64,
    pub seq: usize,
    pub data: P,
}

impl<P> PartialEq for HeapElement<P> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.seq == other.seq
    }
}
impl<P> Eq for HeapElement<P> {}

impl<P> PartialOrd for HeapElement<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for HeapElement<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the worst kept item sits on top.
        (self.distance, self.seq).cmp(&(other.distance, other.seq))
    }
}

#[derive(Debug)]
pub struct KBestNeighbors<P> {
    capacity: usize,
    next_seq: usize,
    heap: BinaryHeap<HeapElement<P>>,
}

impl<P> KBestNeighbors<P> {
    pub fn new(capacity: usize) -> Self {
        KBestNeighbors {
            capacity,
            next_seq: 0,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    pub fn add(&mut self, distance: u64, data: P) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.capacity == 0 {
            return;
        }
        let item = HeapElement { distance, seq, data };
        if self.heap.len() < self.capacity {
            self.heap.push(item);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            // Later arrivals lose ties, so only a strictly smaller distance gets in.
            if item.distance < worst.distance {
                *worst = item;
            }
        }
    }

    /// Kept items, nearest first.
    pub fn into_sorted_points(self) -> Vec<P> {
        self.heap.into_sorted_vec().into_iter().map(|elem| elem.data).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_best_neighbors_logic() {
        let mut k_best = KBestNeighbors::new(3);
        k_best.add(10, "P10");
        k_best.add(5, "P5");
        k_best.add(12, "P12");
        assert_eq!(k_best.len(), 3);

        // P4 pushes out P12, P15 never gets in.
        k_best.add(4, "P4");
        k_best.add(15, "P15");
        assert_eq!(k_best.len(), 3);

        assert_eq!(k_best.into_sorted_points(), vec!["P4", "P5", "P10"]);
    }

    #[test]
    fn test_ties_keep_earliest() {
        let mut k_best = KBestNeighbors::new(2);
        k_best.add(7, 'a');
        k_best.add(3, 'b');
        k_best.add(7, 'c');
        k_best.add(3, 'd');
        assert_eq!(k_best.into_sorted_points(), vec!['b', 'd']);

        let mut k_best = KBestNeighbors::new(3);
        for (d, c) in [(1, 'x'), (1, 'y'), (1, 'z'), (1, 'w')] {
            k_best.add(d, c);
        }
        assert_eq!(k_best.into_sorted_points(), vec!['x', 'y', 'z']);
    }

    #[test]
    fn test_zero_capacity() {
        let mut k_best = KBestNeighbors::new(0);
        k_best.add(1, ());
        assert!(k_best.is_empty());
        assert!(k_best.into_sorted_points().is_empty());
    }
}
