use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

/// An item together with the keys it is ranked by: higher scores first, and
/// for equal scores, the item discovered first
#[derive(Debug)]
struct Entry<T> {
    score: f64,
    order: u32,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Bounded collection of the `k` best items, safe to insert into from many
/// threads at once. Internally a min-heap: the root is the entry that would
/// be evicted next
pub struct TopK<T> {
    k: usize,
    heap: Mutex<Vec<Entry<T>>>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: Mutex::new(Vec::with_capacity(k)),
        }
    }

    /// Offer an item. Returns `true` if it was retained, which can evict the
    /// currently worst item. Non-finite scores are never retained
    pub fn insert(&self, score: f64, order: u32, item: T) -> bool {
        if !score.is_finite() || self.k == 0 {
            return false;
        }
        let entry = Entry { score, order, item };

        let mut heap = self.heap.lock().unwrap_or_else(PoisonError::into_inner);
        if heap.len() < self.k {
            heap.push(entry);
            let last = heap.len() - 1;
            sift_up(&mut heap, last);
            true
        } else if entry > heap[0] {
            heap[0] = entry;
            sift_down(&mut heap, 0);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained items, best first
    pub fn into_sorted_vec(self) -> Vec<T> {
        let mut entries = self
            .heap
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        entries.sort_unstable_by(|a, b| b.cmp(a));
        entries.into_iter().map(|entry| entry.item).collect()
    }
}

fn sift_up<T: Ord>(slice: &mut [T], mut index: usize) {
    while index > 0 {
        let parent = (index - 1) / 2;
        if slice[index] < slice[parent] {
            slice.swap(index, parent);
            index = parent;
        } else {
            break;
        }
    }
}

fn sift_down<T: Ord>(slice: &mut [T], mut index: usize) {
    while let Some(left) = slice.get(index * 2 + 1) {
        let mut smallest = index;
        if left < &slice[smallest] {
            smallest = index * 2 + 1;
        }

        if let Some(right) = slice.get(index * 2 + 2) {
            if right < &slice[smallest] {
                smallest = index * 2 + 2;
            }
        }

        if smallest != index {
            slice.swap(smallest, index);
            index = smallest;
        } else {
            break;
        }
    }
}
