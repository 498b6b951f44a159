//! Sparse, size-aware chunk cache.
//!
//! Slots are filled on demand in any order. Storage grows only as far as the
//! highest slot actually filled, so a huge window count costs nothing until
//! windows near its end are computed.

#[derive(Debug, Clone)]
pub struct SparseCache<T> {
    slots: Vec<Option<T>>,
    filled: usize,
}

impl<T> Default for SparseCache<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            filled: 0,
        }
    }
}

impl<T: Clone> SparseCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.slots.get(index).and_then(Clone::clone)
    }

    /// Store `value` at `index`, growing the cache if needed. An existing
    /// value is kept.
    pub fn set(&mut self, index: usize, value: T) {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        let slot = &mut self.slots[index];
        if slot.is_none() {
            *slot = Some(value);
            self.filled += 1;
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}
