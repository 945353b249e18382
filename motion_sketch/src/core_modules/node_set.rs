// THEORY:
// The `NodeSet` is the bounded, time-ordered collection of live motion nodes. It
// is a view over the in-use region of its `NodePool`: live node `i` is pool slot
// `i`, so appending is a pool checkout and evicting from the front is a pool
// compaction by the same count.
//
// The cap is only enforced at eviction time. Within a frame the set may hold
// more than `nodes_max` nodes; the end-of-frame eviction then removes at least
// `nodes_remove` of the oldest nodes, which gives a sawtooth occupancy profile
// rather than a hard ceiling.

use serde::{Deserialize, Serialize};

use crate::core_modules::motion_node::MotionNode;
use crate::core_modules::node_pool::NodePool;

/// How many nodes an eviction pass removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    /// Live node count above which the excess is always evicted.
    pub nodes_max: usize,
    /// Minimum number of nodes removed per eviction pass.
    pub nodes_remove: usize,
}

impl EvictionPolicy {
    /// `max(len - nodes_max, nodes_remove)`, never more than `len`.
    pub fn eviction_count(&self, len: usize) -> usize {
        len.saturating_sub(self.nodes_max)
            .max(self.nodes_remove)
            .min(len)
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            nodes_max: 80,
            nodes_remove: 10,
        }
    }
}

/// Live motion nodes, oldest first, backed by a `NodePool`.
#[derive(Debug, Default)]
pub struct NodeSet {
    pool: NodePool,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: NodePool::with_capacity(capacity),
        }
    }

    /// Appends a node to the end of the set, reusing a pooled slot.
    pub fn append(&mut self, node: MotionNode) {
        *self.pool.checkout() = node;
    }

    /// Appends a node sampled at `pixel_index`, writing straight into the pooled slot.
    pub fn append_pixel(&mut self, pixel_index: usize, width: u32, height: u32, magnitude: f32) {
        self.pool
            .checkout()
            .set_from_pixel_index(pixel_index, width, height, magnitude);
    }

    /// Removes the oldest nodes according to `policy` and recycles their slots.
    ///
    /// An empty set is left untouched. Returns the number of nodes removed.
    pub fn evict_oldest(&mut self, policy: &EvictionPolicy) -> usize {
        let len = self.len();
        if len == 0 {
            return 0;
        }
        let count = policy.eviction_count(len);
        self.pool.compact(count);
        log::trace!("evicted {count} of {len} nodes");
        count
    }

    pub fn nodes(&self) -> &[MotionNode] {
        self.pool.in_use()
    }

    pub fn len(&self) -> usize {
        self.pool.cursor()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(count: usize) -> NodeSet {
        let mut set = NodeSet::new();
        for i in 0..count {
            set.append(MotionNode::new(i as f32, 0.0, 1.0));
        }
        set
    }

    #[test]
    fn eviction_removes_excess_over_cap() {
        let mut set = filled(15);
        let policy = EvictionPolicy {
            nodes_max: 10,
            nodes_remove: 2,
        };
        assert_eq!(set.evict_oldest(&policy), 5);
        assert_eq!(set.len(), 10);
        assert_eq!(set.nodes()[0].x, 5.0);
        assert_eq!(set.nodes()[9].x, 14.0);
    }

    #[test]
    fn eviction_removes_minimum_when_under_cap() {
        let mut set = filled(6);
        let policy = EvictionPolicy {
            nodes_max: 10,
            nodes_remove: 2,
        };
        assert_eq!(set.evict_oldest(&policy), 2);
        assert_eq!(set.nodes()[0].x, 2.0);
    }

    #[test]
    fn eviction_never_removes_more_than_live() {
        let mut set = filled(1);
        let policy = EvictionPolicy {
            nodes_max: 5,
            nodes_remove: 10,
        };
        assert_eq!(set.evict_oldest(&policy), 1);
        assert!(set.is_empty());
        assert_eq!(set.pool().cursor(), 0);
    }

    #[test]
    fn empty_set_is_left_untouched() {
        let mut set = NodeSet::new();
        assert_eq!(set.evict_oldest(&EvictionPolicy::default()), 0);
        assert_eq!(set.pool().slot_count(), 0);
    }

    #[test]
    fn slots_are_reused_across_frames() {
        let policy = EvictionPolicy {
            nodes_max: 3,
            nodes_remove: 1,
        };
        let mut set = NodeSet::new();
        for frame in 0..20 {
            for i in 0..4 {
                set.append_pixel(i, 4, 4, frame as f32);
            }
            set.evict_oldest(&policy);
            assert!(set.len() <= policy.nodes_max);
        }
        // Steady state never needs more than cap plus one frame of nodes.
        assert!(set.pool().slot_count() <= 7);
    }
}
