// THEORY:
// The `GeometryBuilder` is the procedural layer of the sketch. For every live
// motion node it asks the `QuadTree` for neighbours inside a radius proportional
// to the node's magnitude, orders those neighbours by angle around the node, and
// emits a fan of triangles from the node to each consecutive neighbour pair.
//
// Key architectural principles:
// 1.  **Star-Shaped Fans**: Sorting neighbours by `atan2` around the centre makes
//     each consecutive pair sweep around the node once, so the fan never
//     self-intersects.
// 2.  **Ring Vertex Buffer**: Vertices are written into a fixed-capacity buffer.
//     When the write cursor reaches the end it wraps to zero and the oldest
//     geometry is overwritten. Memory and upload size stay bounded under heavy
//     motion.
// 3.  **Fade, Never Remove**: Fresh vertices are written at full opacity. Every
//     frame every slot's opacity drops by a fixed step, floored at zero. Fading and
//     overwriting are the only ways geometry ever disappears.
// 4.  **Owned Buffers**: The builder owns its position, colour and opacity arrays
//     and exposes them read-only through `GeometryFrame` for the render surface.

use serde::{Deserialize, Serialize};

use crate::core_modules::frame_differ::Band;
use crate::core_modules::motion_node::MotionNode;
use crate::core_modules::spatial_index::QuadTree;

/// How emitted fans are presented by the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveMode {
    /// Filled triangles.
    #[default]
    Triangles,
    /// Outlines of the same triangles.
    Lines,
}

/// Tunable parameters of the geometry layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Search radius is `magnitude / radius_divisor` in normalized units.
    pub radius_divisor: f32,
    /// Opacity lost by every vertex each frame.
    pub fade_step: f32,
    /// Number of triangles the vertex ring can hold before it wraps.
    pub poly_capacity: usize,
    pub primitive: PrimitiveMode,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            radius_divisor: 3000.0,
            fade_step: 0.1,
            poly_capacity: 10_000,
            primitive: PrimitiveMode::Triangles,
        }
    }
}

/// Maps `x` from `[a1, a2]` onto `[b1, b2]`.
pub fn map_linear(x: f32, a1: f32, a2: f32, b1: f32, b2: f32) -> f32 {
    b1 + (x - a1) * (b2 - b1) / (a2 - a1)
}

/// An ordered colour ramp indexed by motion magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Panics on an empty colour list; configs are validated before this point.
    pub fn new(colors: Vec<[u8; 3]>) -> Self {
        assert!(!colors.is_empty(), "palette needs at least one colour");
        Self { colors }
    }

    /// Picks the palette entry for `magnitude` by mapping the band onto the ramp.
    pub fn color_for(&self, magnitude: f32, band: Band) -> [u8; 3] {
        let last = (self.colors.len() - 1) as f32;
        let position = map_linear(magnitude, band.min, band.max, 0.0, last).round();
        let index = if position.is_nan() { 0.0 } else { position.clamp(0.0, last) };
        self.colors[index as usize]
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(vec![[100, 100, 100], [255, 255, 255]])
    }
}

/// Fixed-capacity ring of vertices with per-vertex colour and opacity.
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    /// Clip-space positions in `[-1, 1]`.
    positions: Vec<[f32; 2]>,
    /// Linear RGB in `[0, 1]`.
    colors: Vec<[f32; 3]>,
    opacity: Vec<f32>,
    /// Next slot to write.
    cursor: usize,
}

impl VertexBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "vertex buffer capacity must be non-zero");
        Self {
            positions: vec![[0.0; 2]; capacity],
            colors: vec![[0.0; 3]; capacity],
            opacity: vec![0.0; capacity],
            cursor: 0,
        }
    }

    /// Writes one vertex at full opacity, wrapping to slot 0 when full.
    pub fn push(&mut self, node: &MotionNode, color: [u8; 3]) {
        if self.cursor >= self.capacity() {
            self.cursor = 0;
        }
        let i = self.cursor;
        self.positions[i] = [node.x * 2.0 - 1.0, node.y * 2.0 - 1.0];
        self.colors[i] = color.map(|c| c as f32 / 255.0);
        self.opacity[i] = 1.0;
        self.cursor += 1;
    }

    /// Lowers every slot's opacity by `step`, never below zero.
    pub fn fade(&mut self, step: f32) {
        for o in &mut self.opacity {
            *o = (*o - step).max(0.0);
        }
    }

    pub fn capacity(&self) -> usize {
        self.positions.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn opacity(&self) -> &[f32] {
        &self.opacity
    }
}

/// Read-only view of the vertex ring handed to a render surface.
#[derive(Debug, Clone, Copy)]
pub struct GeometryFrame<'a> {
    pub positions: &'a [[f32; 2]],
    pub colors: &'a [[f32; 3]],
    pub opacity: &'a [f32],
    pub mode: PrimitiveMode,
}

impl GeometryFrame<'_> {
    /// Vertex index triples of every triangle with at least one visible vertex.
    pub fn visible_triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.positions.len() / 3)
            .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
            .filter(|tri| tri.iter().any(|&v| self.opacity[v] > 0.0))
    }
}

/// Orders `indices` into `nodes` by ascending angle around `center`.
pub fn sort_by_angle(center: &MotionNode, nodes: &[MotionNode], indices: &mut [usize]) {
    indices.sort_by(|&a, &b| {
        center
            .angle_to(&nodes[a])
            .total_cmp(&center.angle_to(&nodes[b]))
    });
}

/// Builds fading triangle fans between spatially close motion nodes.
#[derive(Debug, Clone)]
pub struct GeometryBuilder {
    vertices: VertexBuffer,
    palette: Palette,
    band: Band,
    config: GeometryConfig,
    /// Reused neighbour scratch, indices into the indexed snapshot.
    neighbors: Vec<usize>,
}

impl GeometryBuilder {
    pub fn new(config: GeometryConfig, palette: Palette, band: Band) -> Self {
        Self {
            vertices: VertexBuffer::new(config.poly_capacity * 3),
            palette,
            band,
            config,
            neighbors: Vec::new(),
        }
    }

    pub fn set_band(&mut self, band: Band) {
        self.band = band;
    }

    pub fn search_radius(&self, magnitude: f32) -> f32 {
        magnitude / self.config.radius_divisor
    }

    /// Emits the fan for one node. Returns the number of triangles written.
    pub fn connect_node(&mut self, tree: &QuadTree<'_>, node: &MotionNode) -> usize {
        let nodes = tree.points();
        let radius = self.search_radius(node.magnitude);

        let neighbors = &mut self.neighbors;
        neighbors.clear();
        tree.visit_within(node.x, node.y, radius, |index, _| neighbors.push(index));
        sort_by_angle(node, nodes, neighbors);

        let node_color = self.palette.color_for(node.magnitude, self.band);
        for pair in self.neighbors.windows(2) {
            let (n0, n1) = (&nodes[pair[0]], &nodes[pair[1]]);
            self.vertices.push(node, node_color);
            self.vertices.push(n0, self.palette.color_for(n0.magnitude, self.band));
            self.vertices.push(n1, self.palette.color_for(n1.magnitude, self.band));
        }
        self.neighbors.len().saturating_sub(1)
    }

    /// Emits fans for every node in the tree's snapshot. Returns triangles written.
    pub fn build(&mut self, tree: &QuadTree<'_>) -> usize {
        tree.points()
            .iter()
            .map(|node| self.connect_node(tree, node))
            .sum()
    }

    /// Applies one frame of opacity decay to every vertex slot.
    pub fn fade(&mut self) {
        self.vertices.fade(self.config.fade_step);
    }

    pub fn vertices(&self) -> &VertexBuffer {
        &self.vertices
    }

    pub fn frame(&self) -> GeometryFrame<'_> {
        GeometryFrame {
            positions: self.vertices.positions(),
            colors: self.vertices.colors(),
            opacity: self.vertices.opacity(),
            mode: self.config.primitive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn builder(poly_capacity: usize) -> GeometryBuilder {
        let config = GeometryConfig {
            radius_divisor: 1000.0,
            poly_capacity,
            ..GeometryConfig::default()
        };
        GeometryBuilder::new(config, Palette::default(), Band::new(0.0, 1000.0))
    }

    #[test]
    fn fan_connects_consecutive_angular_neighbours() {
        // Radius 0.1 around the centre node catches the three satellites.
        let nodes = vec![
            MotionNode::new(0.5, 0.5, 100.0),
            MotionNode::new(0.55, 0.5, 1.0),
            MotionNode::new(0.5, 0.55, 1.0),
            MotionNode::new(0.45, 0.5, 1.0),
        ];
        let tree = QuadTree::build(&nodes);
        let mut builder = builder(16);

        // Self plus three neighbours gives three consecutive pairs.
        assert_eq!(builder.connect_node(&tree, &nodes[0]), 3);
        assert_eq!(builder.vertices().cursor(), 9);

        let positions = builder.vertices().positions();
        // Every triangle starts at the centre node in clip space.
        for t in 0..3 {
            assert_eq!(positions[t * 3], [0.0, 0.0]);
        }
    }

    #[test]
    fn isolated_node_emits_nothing() {
        let nodes = vec![MotionNode::new(0.1, 0.1, 10.0), MotionNode::new(0.9, 0.9, 10.0)];
        let tree = QuadTree::build(&nodes);
        let mut builder = builder(4);
        assert_eq!(builder.build(&tree), 0);
        assert_eq!(builder.vertices().cursor(), 0);
    }

    #[test]
    fn ring_buffer_wraps_and_overwrites_oldest() {
        let mut buffer = VertexBuffer::new(3);
        let a = MotionNode::new(0.0, 0.0, 0.0);
        let b = MotionNode::new(1.0, 1.0, 0.0);
        for _ in 0..3 {
            buffer.push(&a, [0, 0, 0]);
        }
        buffer.push(&b, [255, 255, 255]);
        assert_eq!(buffer.cursor(), 1);
        assert_eq!(buffer.positions()[0], [1.0, 1.0]);
        assert_eq!(buffer.colors()[0], [1.0, 1.0, 1.0]);
        assert_eq!(buffer.positions()[1], [-1.0, -1.0]);
    }

    #[test]
    fn opacity_decays_to_zero_and_stays_there() {
        let mut buffer = VertexBuffer::new(3);
        buffer.push(&MotionNode::default(), [1, 2, 3]);
        assert_eq!(buffer.opacity()[0], 1.0);

        for _ in 0..10 {
            buffer.fade(0.1);
            assert!(buffer.opacity()[0] >= 0.0);
        }
        assert_eq!(buffer.opacity()[0], 0.0);

        for _ in 0..5 {
            buffer.fade(0.1);
        }
        assert_eq!(buffer.opacity()[0], 0.0);
        assert_eq!(buffer.opacity()[1], 0.0);
    }

    #[test]
    fn palette_maps_band_onto_ramp() {
        let palette = Palette::new(vec![[0, 0, 0], [128, 128, 128], [255, 255, 255]]);
        let band = Band::new(200.0, 400.0);
        assert_eq!(palette.color_for(200.0, band), [0, 0, 0]);
        assert_eq!(palette.color_for(300.0, band), [128, 128, 128]);
        assert_eq!(palette.color_for(399.0, band), [255, 255, 255]);
        // Out-of-band magnitudes clamp to the ends of the ramp.
        assert_eq!(palette.color_for(10.0, band), [0, 0, 0]);
        assert_eq!(palette.color_for(9000.0, band), [255, 255, 255]);
    }

    #[test]
    fn single_colour_palette_always_returns_it() {
        let palette = Palette::new(vec![[7, 8, 9]]);
        assert_eq!(palette.color_for(250.0, Band::default()), [7, 8, 9]);
    }

    #[test]
    fn visible_triangles_skip_faded_slots() {
        let nodes = vec![
            MotionNode::new(0.5, 0.5, 100.0),
            MotionNode::new(0.52, 0.5, 1.0),
            MotionNode::new(0.5, 0.52, 1.0),
        ];
        let tree = QuadTree::build(&nodes);
        let mut builder = builder(8);
        builder.connect_node(&tree, &nodes[0]);
        assert_eq!(builder.frame().visible_triangles().count(), 2);

        for _ in 0..10 {
            builder.fade();
        }
        assert_eq!(builder.frame().visible_triangles().count(), 0);
    }

    proptest! {
        #[test]
        fn angle_sort_is_non_decreasing(
            center in (0.0f32..1.0, 0.0f32..1.0),
            coords in prop::collection::vec((0.0f32..1.0, 0.0f32..1.0), 0..64),
        ) {
            let center = MotionNode::new(center.0, center.1, 1.0);
            let nodes: Vec<MotionNode> = coords
                .into_iter()
                .map(|(x, y)| MotionNode::new(x, y, 1.0))
                .collect();
            let mut indices: Vec<usize> = (0..nodes.len()).collect();
            sort_by_angle(&center, &nodes, &mut indices);

            for pair in indices.windows(2) {
                let a = center.angle_to(&nodes[pair[0]]);
                let b = center.angle_to(&nodes[pair[1]]);
                prop_assert!(a <= b);
            }
        }
    }
}
