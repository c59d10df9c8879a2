//! A binary min-heap of ids whose positions are tracked by their owner.
//!
//! The heap itself only stores ids. Keys are looked up, and positions written
//! back, through a [`HeapIndex`] supplied on every mutating call. Whoever owns
//! the per-id records therefore always knows where each id sits in the heap
//! and can remove or re-key it in `O(log n)` without a search.

/// Key lookup and position write-back for the ids stored in an [`IndexedHeap`].
pub trait HeapIndex<Id> {
    /// Ordering key; the smallest key is at the top of the heap.
    type Key: Ord;

    /// Current key of `id`.
    fn key(&self, id: Id) -> Self::Key;

    /// Records the slot `id` now occupies, or `None` once it left the heap.
    fn set_position(&mut self, id: Id, position: Option<usize>);
}

/// A binary min-heap over ids with owner-tracked positions.
#[derive(Debug, Clone)]
pub struct IndexedHeap<Id> {
    items: Vec<Id>,
}

impl<Id> Default for IndexedHeap<Id> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<Id: Copy> IndexedHeap<Id> {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids in the heap.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The id with the smallest key, without removing it.
    pub fn peek(&self) -> Option<Id> {
        self.items.first().copied()
    }

    /// The id stored at `position`.
    pub fn get(&self, position: usize) -> Option<Id> {
        self.items.get(position).copied()
    }

    /// Inserts `id`.
    pub fn push<I: HeapIndex<Id>>(&mut self, id: Id, index: &mut I) {
        let position = self.items.len();
        self.items.push(id);
        index.set_position(id, Some(position));
        self.up(position, index);
    }

    /// Removes and returns the id with the smallest key.
    pub fn pop<I: HeapIndex<Id>>(&mut self, index: &mut I) -> Option<Id> {
        if self.items.is_empty() {
            return None;
        }
        self.remove(0, index)
    }

    /// Removes the id at `position`.
    pub fn remove<I: HeapIndex<Id>>(&mut self, position: usize, index: &mut I) -> Option<Id> {
        if position >= self.items.len() {
            return None;
        }
        let last = self.items.len() - 1;
        if position != last {
            self.swap(position, last, index);
            if !self.down(position, last, index) {
                self.up(position, index);
            }
        }
        let id = self.items.pop()?;
        index.set_position(id, None);
        Some(id)
    }

    /// Restores heap order after the key of the id at `position` changed.
    pub fn fix<I: HeapIndex<Id>>(&mut self, position: usize, index: &mut I) {
        if position >= self.items.len() {
            return;
        }
        if !self.down(position, self.items.len(), index) {
            self.up(position, index);
        }
    }

    fn less<I: HeapIndex<Id>>(&self, i: usize, j: usize, index: &I) -> bool {
        index.key(self.items[i]) < index.key(self.items[j])
    }

    fn swap<I: HeapIndex<Id>>(&mut self, i: usize, j: usize, index: &mut I) {
        self.items.swap(i, j);
        index.set_position(self.items[i], Some(i));
        index.set_position(self.items[j], Some(j));
    }

    fn up<I: HeapIndex<Id>>(&mut self, mut j: usize, index: &mut I) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent, index) {
                break;
            }
            self.swap(parent, j, index);
            j = parent;
        }
    }

    /// Sifts the id at `start` down within `items[..n]`. Returns whether it moved.
    fn down<I: HeapIndex<Id>>(&mut self, start: usize, n: usize, index: &mut I) -> bool {
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left, index) {
                child = right;
            }
            if !self.less(child, i, index) {
                break;
            }
            self.swap(i, child, index);
            i = child;
        }
        i > start
    }
}
