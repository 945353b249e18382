// THEORY:
// A `MotionNode` is a single detected motion sample: where in the frame it was
// seen and how strong the change was. Nodes are plain values living in pooled
// storage slots; which slot holds a node carries no meaning, only its contents do.

/// A pooled motion sample. `x` and `y` are normalized to `[0, 1]` and mirrored on
/// both axes; `magnitude` is the raw per-pixel difference `d`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionNode {
    pub x: f32,
    pub y: f32,
    pub magnitude: f32,
}

impl MotionNode {
    pub const fn new(x: f32, y: f32, magnitude: f32) -> Self {
        Self { x, y, magnitude }
    }

    /// Builds a node from a pixel index of a `width` x `height` sampling grid.
    ///
    /// Both axes are mirrored so the sketch reads like a mirror to the viewer.
    pub fn from_pixel_index(index: usize, width: u32, height: u32, magnitude: f32) -> Self {
        let mut node = Self::default();
        node.set_from_pixel_index(index, width, height, magnitude);
        node
    }

    /// Overwrites every field of an existing (possibly recycled) node.
    pub fn set_from_pixel_index(&mut self, index: usize, width: u32, height: u32, magnitude: f32) {
        let width = width as usize;
        let column = (index % width) as f32;
        let row = (index / width) as f32;
        self.x = (column / width as f32 - 1.0).abs();
        self.y = (row / height as f32 - 1.0).abs();
        self.magnitude = magnitude;
    }

    /// Angle of `other` as seen from this node, in radians.
    pub fn angle_to(&self, other: &MotionNode) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_index_is_normalized_and_mirrored() {
        // Pixel 37 on an 8x8 grid is column 5, row 4.
        let node = MotionNode::from_pixel_index(37, 8, 8, 50.0);
        assert_eq!(node.x, 0.375);
        assert_eq!(node.y, 0.5);
        assert_eq!(node.magnitude, 50.0);
    }

    #[test]
    fn origin_pixel_maps_to_far_corner() {
        let node = MotionNode::from_pixel_index(0, 64, 48, 1.0);
        assert_eq!((node.x, node.y), (1.0, 1.0));
    }

    #[test]
    fn angle_to_follows_atan2() {
        let center = MotionNode::new(0.5, 0.5, 0.0);
        let above = MotionNode::new(0.5, 0.75, 0.0);
        let left = MotionNode::new(0.25, 0.5, 0.0);
        assert!((center.angle_to(&above) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((center.angle_to(&left) - std::f32::consts::PI).abs() < 1e-6);
    }
}
