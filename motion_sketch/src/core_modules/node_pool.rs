// THEORY:
// The `NodePool` keeps per-frame motion sampling free of heap churn. Storage slots
// are allocated lazily the first time the cursor walks past the end of the pool
// and are never freed. Everything below the cursor is in use; everything at or
// above it is free for reuse.
//
// Eviction always removes the oldest live nodes, which are the slots at the front
// of the pool. `compact` rotates exactly those slots to the tail and pulls the
// cursor back, so live node `i` stays in slot `i` and slot order keeps matching
// usage recency.

use crate::core_modules::motion_node::MotionNode;

/// A bump allocator of reusable `MotionNode` slots.
#[derive(Debug, Default)]
pub struct NodePool {
    slots: Vec<MotionNode>,
    /// Next free slot. Always within `0..=slots.len()`.
    cursor: usize,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocates `capacity` slots so the first frames do not grow the pool.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![MotionNode::default(); capacity],
            cursor: 0,
        }
    }

    /// Hands out the slot at the cursor and advances it.
    ///
    /// The slot keeps whatever a previous frame wrote into it; callers must
    /// overwrite every field before reading.
    pub fn checkout(&mut self) -> &mut MotionNode {
        if self.cursor == self.slots.len() {
            self.slots.push(MotionNode::default());
        }
        let index = self.cursor;
        self.cursor += 1;
        &mut self.slots[index]
    }

    /// Moves the first `n` slots to the end of the pool and releases them.
    ///
    /// Panics if `n` exceeds the number of slots in use.
    pub fn compact(&mut self, n: usize) {
        assert!(
            n <= self.cursor,
            "cannot compact {n} slots with only {} in use",
            self.cursor
        );
        self.slots.rotate_left(n);
        self.cursor -= n;
        log::trace!("node pool compacted by {n}: {} in use / {} slots", self.cursor, self.slots.len());
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total allocated slots, in use or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The slots currently in use, oldest first.
    pub fn in_use(&self) -> &[MotionNode] {
        &self.slots[..self.cursor]
    }

    /// Every slot in storage order, including free ones.
    pub fn slots(&self) -> &[MotionNode] {
        &self.slots
    }
}
