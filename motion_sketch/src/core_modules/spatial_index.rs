// THEORY:
// The `QuadTree` is the spatial layer of the sketch. It is rebuilt from a snapshot
// of the live `NodeSet` every frame and answers one question: which nodes lie
// within a radius of a point?
//
// Key architectural principles:
// 1.  **Arena Storage**: Cells live in a flat `Vec` and refer to their children
//     by index, so building the tree is a handful of pushes rather than a web of
//     boxed pointers.
// 2.  **Bucketed Leaves**: A leaf holds up to `LEAF_CAPACITY` point indices before
//     it splits into four quadrants. Splitting stops at `MAX_DEPTH`, so coincident
//     points simply share a leaf.
// 3.  **Bounding-Box Pruning**: A radius query first turns the circle into its
//     bounding square. Any cell whose region lies entirely outside that square is
//     skipped together with its whole subtree. Candidates that survive are tested
//     against the exact squared distance.
// 4.  **Borrowed Results**: The tree borrows the node slice it was built from and
//     queries hand back references into that same storage. Mutating the node set
//     while a tree built from it is alive does not compile.

use crate::core_modules::motion_node::MotionNode;

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 24;

/// Axis-aligned region, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Bounds {
    fn midpoint(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Quadrant index: bit 0 set for the right half, bit 1 set for the upper half.
    fn quadrant(&self, x: f64, y: f64) -> usize {
        let (mx, my) = self.midpoint();
        (x >= mx) as usize | (((y >= my) as usize) << 1)
    }

    fn child(&self, quadrant: usize) -> Bounds {
        let (mx, my) = self.midpoint();
        let (x0, x1) = if quadrant & 1 == 0 { (self.x0, mx) } else { (mx, self.x1) };
        let (y0, y1) = if quadrant & 2 == 0 { (self.y0, my) } else { (my, self.y1) };
        Bounds { x0, y0, x1, y1 }
    }

    /// True when the two regions do not overlap at all.
    fn is_disjoint(&self, other: &Bounds) -> bool {
        self.x0 > other.x1 || self.y0 > other.y1 || self.x1 < other.x0 || self.y1 < other.y0
    }
}

#[derive(Debug)]
enum Cell {
    Leaf(Vec<usize>),
    Branch([Option<usize>; 4]),
}

#[derive(Debug)]
struct QuadCell {
    bounds: Bounds,
    depth: usize,
    cell: Cell,
}

/// Squared Euclidean distance between a query point and a node.
pub fn distance_sq(x: f32, y: f32, node: &MotionNode) -> f64 {
    let dx = node.x as f64 - x as f64;
    let dy = node.y as f64 - y as f64;
    dx * dx + dy * dy
}

/// A point quadtree over the `(x, y)` projection of a node snapshot.
#[derive(Debug)]
pub struct QuadTree<'a> {
    points: &'a [MotionNode],
    cells: Vec<QuadCell>,
}

impl<'a> QuadTree<'a> {
    /// Builds a tree over `points`. An empty slice yields an empty tree.
    pub fn build(points: &'a [MotionNode]) -> Self {
        let mut tree = Self {
            points,
            cells: Vec::with_capacity(points.len() / LEAF_CAPACITY + 1),
        };
        let Some(bounds) = Self::square_extent(points) else {
            return tree;
        };

        tree.cells.push(QuadCell {
            bounds,
            depth: 0,
            cell: Cell::Leaf(Vec::with_capacity(LEAF_CAPACITY + 1)),
        });
        for index in 0..points.len() {
            tree.insert_from(0, index);
        }
        tree
    }

    /// The smallest square containing every point, or `None` for no points.
    fn square_extent(points: &[MotionNode]) -> Option<Bounds> {
        let first = points.first()?;
        let (mut x0, mut y0) = (first.x as f64, first.y as f64);
        let (mut x1, mut y1) = (x0, y0);
        for p in &points[1..] {
            x0 = x0.min(p.x as f64);
            y0 = y0.min(p.y as f64);
            x1 = x1.max(p.x as f64);
            y1 = y1.max(p.y as f64);
        }
        let size = (x1 - x0).max(y1 - y0);
        Some(Bounds {
            x0,
            y0,
            x1: x0 + size,
            y1: y0 + size,
        })
    }

    fn insert_from(&mut self, start: usize, index: usize) {
        let point = self.points[index];
        let (px, py) = (point.x as f64, point.y as f64);
        let mut at = start;
        loop {
            let bounds = self.cells[at].bounds;
            let depth = self.cells[at].depth;
            let next_id = self.cells.len();
            match &mut self.cells[at].cell {
                Cell::Leaf(bucket) => {
                    bucket.push(index);
                    if bucket.len() > LEAF_CAPACITY && depth < MAX_DEPTH {
                        let bucket = std::mem::take(bucket);
                        self.cells[at].cell = Cell::Branch([None; 4]);
                        for moved in bucket {
                            self.insert_from(at, moved);
                        }
                    }
                    return;
                }
                Cell::Branch(children) => {
                    let quadrant = bounds.quadrant(px, py);
                    if let Some(child) = children[quadrant] {
                        at = child;
                        continue;
                    }
                    children[quadrant] = Some(next_id);
                    self.cells.push(QuadCell {
                        bounds: bounds.child(quadrant),
                        depth: depth + 1,
                        cell: Cell::Leaf(vec![index]),
                    });
                    return;
                }
            }
        }
    }

    /// The node snapshot this tree indexes.
    pub fn points(&self) -> &'a [MotionNode] {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Calls `visit` with `(index, node)` for every node within `radius` of `(x, y)`.
    ///
    /// A negative or NaN radius matches nothing. A node at exactly `(x, y)` matches.
    pub fn visit_within<F>(&self, x: f32, y: f32, radius: f32, mut visit: F)
    where
        F: FnMut(usize, &'a MotionNode),
    {
        if self.cells.is_empty() || !(radius >= 0.0) {
            return;
        }
        let (cx, cy, r) = (x as f64, y as f64, radius as f64);
        let query = Bounds {
            x0: cx - r,
            y0: cy - r,
            x1: cx + r,
            y1: cy + r,
        };
        self.visit_cell(0, &query, x, y, r * r, &mut visit);
    }

    fn visit_cell<F>(&self, at: usize, query: &Bounds, x: f32, y: f32, radius_sq: f64, visit: &mut F)
    where
        F: FnMut(usize, &'a MotionNode),
    {
        let cell = &self.cells[at];
        if cell.bounds.is_disjoint(query) {
            return;
        }
        match &cell.cell {
            Cell::Leaf(bucket) => {
                let points: &'a [MotionNode] = self.points;
                for &index in bucket {
                    let node = &points[index];
                    if distance_sq(x, y, node) <= radius_sq {
                        visit(index, node);
                    }
                }
            }
            Cell::Branch(children) => {
                for &child in children.iter().flatten() {
                    self.visit_cell(child, query, x, y, radius_sq, visit);
                }
            }
        }
    }

    /// Every node within `radius` of `(x, y)`, borrowed from the indexed snapshot.
    pub fn search(&self, x: f32, y: f32, radius: f32) -> Vec<&'a MotionNode> {
        let mut matches = Vec::new();
        self.visit_within(x, y, radius, |_, node| matches.push(node));
        matches
    }

    /// Like `search`, but yields positions in the indexed snapshot.
    pub fn search_indices(&self, x: f32, y: f32, radius: f32) -> Vec<usize> {
        let mut matches = Vec::new();
        self.visit_within(x, y, radius, |index, _| matches.push(index));
        matches
    }

    /// Number of cells, exposed for occupancy diagnostics.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn brute_force(points: &[MotionNode], x: f32, y: f32, radius: f32) -> Vec<usize> {
        let radius_sq = radius as f64 * radius as f64;
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| distance_sq(x, y, p) <= radius_sq)
            .map(|(i, _)| i)
            .collect()
    }

    fn grid(n: usize) -> Vec<MotionNode> {
        let mut points = Vec::new();
        for row in 0..n {
            for col in 0..n {
                points.push(MotionNode::new(col as f32 / n as f32, row as f32 / n as f32, 1.0));
            }
        }
        points
    }

    #[test]
    fn empty_tree_matches_nothing() {
        let tree = QuadTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.search(0.5, 0.5, 10.0).is_empty());
    }

    #[test]
    fn self_match_is_included() {
        let points = grid(10);
        let tree = QuadTree::build(&points);
        let hits = tree.search_indices(points[42].x, points[42].y, 0.0);
        assert_eq!(hits, vec![42]);
    }

    #[test]
    fn results_borrow_the_snapshot() {
        let points = grid(4);
        let tree = QuadTree::build(&points);
        let hits = tree.search(points[5].x, points[5].y, 0.0);
        assert!(std::ptr::eq(hits[0], &points[5]));
    }

    #[test]
    fn point_on_radius_boundary_matches() {
        let points = vec![
            MotionNode::new(0.0, 0.0, 1.0),
            MotionNode::new(0.5, 0.0, 1.0),
            MotionNode::new(1.0, 1.0, 1.0),
        ];
        let tree = QuadTree::build(&points);
        let mut hits = tree.search_indices(0.0, 0.0, 0.5);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn coincident_points_share_a_leaf() {
        let points = vec![MotionNode::new(0.25, 0.25, 1.0); 100];
        let tree = QuadTree::build(&points);
        assert_eq!(tree.search(0.25, 0.25, 0.01).len(), 100);
    }

    #[test]
    fn negative_radius_matches_nothing() {
        let points = grid(3);
        let tree = QuadTree::build(&points);
        assert!(tree.search(0.0, 0.0, -1.0).is_empty());
        assert!(tree.search(0.0, 0.0, f32::NAN).is_empty());
    }

    #[test]
    fn large_grid_splits_into_cells() {
        let points = grid(32);
        let tree = QuadTree::build(&points);
        assert!(tree.cell_count() > 1);
        let mut hits = tree.search_indices(0.5, 0.5, 0.1);
        hits.sort_unstable();
        assert_eq!(hits, brute_force(&points, 0.5, 0.5, 0.1));
    }

    proptest! {
        #[test]
        fn search_equals_brute_force(
            coords in prop::collection::vec((0.0f32..1.0, 0.0f32..1.0), 0..300),
            x in -0.2f32..1.2,
            y in -0.2f32..1.2,
            radius in 0.0f32..0.6,
        ) {
            let points: Vec<MotionNode> = coords
                .into_iter()
                .map(|(px, py)| MotionNode::new(px, py, 1.0))
                .collect();
            let tree = QuadTree::build(&points);
            let mut hits = tree.search_indices(x, y, radius);
            hits.sort_unstable();
            prop_assert_eq!(hits, brute_force(&points, x, y, radius));
        }
    }
}
