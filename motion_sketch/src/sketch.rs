// THEORY:
// The `VideoSketch` is the per-frame driver. It owns every piece of mutable
// pipeline state (the live node set with its pool, and the geometry builder with
// its vertex ring) and runs one frame strictly in order:
//
//   sample -> index -> build + fade -> render -> evict
//
// Key architectural principles:
// 1.  **One Owner**: Nothing outside the sketch can reach its nodes or vertex
//     buffers while a frame runs. The video and render surfaces are borrowed for
//     the duration of `draw` only.
// 2.  **Frame-Local Index**: The `QuadTree` is built from the node snapshot and
//     dropped before eviction mutates the set. A frame with no live nodes builds
//     no tree at all, so there is never an index to go stale.
// 3.  **Guarded Frames**: Until a source is attached and either streaming or
//     playing, `draw` does nothing and reports nothing.

use crate::config::{SketchConfig, validate_band};
use crate::core_modules::frame_differ::{Band, FrameDiff};
use crate::core_modules::geometry::{GeometryBuilder, GeometryFrame, Palette};
use crate::core_modules::node_set::{EvictionPolicy, NodeSet};
use crate::core_modules::spatial_index::QuadTree;
use crate::error::Result;
use crate::render::RenderSurface;
use crate::video::VideoBuffer;

/// What happened during one drawn frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub total_movement: u64,
    /// Nodes sampled from this frame's in-band pixels.
    pub nodes_added: usize,
    /// Triangles emitted into the vertex ring.
    pub primitives: usize,
    /// Nodes removed by the end-of-frame eviction.
    pub evicted: usize,
    /// Nodes still live after eviction.
    pub live_nodes: usize,
}

impl FrameReport {
    /// Live nodes at their peak, just before eviction.
    pub fn peak_nodes(&self) -> usize {
        self.live_nodes + self.evicted
    }
}

/// The motion-to-geometry pipeline.
#[derive(Debug)]
pub struct VideoSketch {
    config: SketchConfig,
    eviction: EvictionPolicy,
    nodes: NodeSet,
    geometry: GeometryBuilder,
}

impl VideoSketch {
    pub fn new(config: SketchConfig) -> Result<Self> {
        config.validate()?;
        let geometry = GeometryBuilder::new(
            config.geometry,
            Palette::new(config.colors.clone()),
            config.range,
        );
        Ok(Self {
            eviction: config.eviction(),
            nodes: NodeSet::with_capacity(config.nodes_max + config.nodes_remove),
            geometry,
            config,
        })
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    /// Changes the motion band. Colour mapping follows the new band immediately.
    pub fn set_range(&mut self, min: f32, max: f32) -> Result<()> {
        let band = Band::new(min, max);
        validate_band(band)?;
        self.config.range = band;
        self.geometry.set_band(band);
        log::debug!("motion band set to ({min}, {max})");
        Ok(())
    }

    pub fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    pub fn geometry(&self) -> GeometryFrame<'_> {
        self.geometry.frame()
    }

    /// Reads the next frame from `video` and appends a node for every in-band pixel.
    pub fn sample(&mut self, video: &mut VideoBuffer) -> FrameDiff {
        if video.read_pixels().is_none() {
            return FrameDiff::default();
        }
        let (width, height) = video.dimensions();
        let band = self.config.range;
        let nodes = &mut self.nodes;
        video.for_frame_diff(band, |index, d| {
            nodes.append_pixel(index, width, height, d as f32);
        })
    }

    /// Indexes the live nodes, emits their fans and fades the vertex ring.
    ///
    /// Returns the number of triangles emitted.
    pub fn build_geometry(&mut self) -> usize {
        let mut primitives = 0;
        if !self.nodes.is_empty() {
            let tree = QuadTree::build(self.nodes.nodes());
            primitives = self.geometry.build(&tree);
            log::trace!(
                "indexed {} nodes into {} cells, {primitives} triangles",
                tree.len(),
                tree.cell_count()
            );
        }
        self.geometry.fade();
        primitives
    }

    /// End-of-frame eviction. Returns the number of nodes removed.
    pub fn reset(&mut self) -> usize {
        self.nodes.evict_oldest(&self.eviction)
    }

    /// Runs one full frame. Returns `None` when the frame guard skipped it.
    pub fn draw<S>(&mut self, video: &mut VideoBuffer, surface: &mut S) -> Result<Option<FrameReport>>
    where
        S: RenderSurface + ?Sized,
    {
        if !(video.is_streaming() || video.is_playing()) || !video.has_source() {
            return Ok(None);
        }

        let before = self.nodes.len();
        let diff = self.sample(video);
        let nodes_added = self.nodes.len() - before;
        let primitives = self.build_geometry();
        let rendered = surface.draw(&self.geometry.frame());
        let evicted = self.reset();
        rendered?;

        Ok(Some(FrameReport {
            total_movement: diff.total_movement,
            nodes_added,
            primitives,
            evicted,
            live_nodes: self.nodes.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::config::{GeometryConfig, VideoConfig};
    use crate::core_modules::motion_node::MotionNode;
    use crate::render::NullSurface;
    use crate::video::ImageSequence;

    const SIDE: u32 = 8;

    fn gray() -> RgbaImage {
        RgbaImage::from_pixel(SIDE, SIDE, Rgba([128, 128, 128, 255]))
    }

    /// Gray frame with the red channel of `pixels` raised by 50.
    fn bumped(pixels: &[u32]) -> RgbaImage {
        let mut frame = gray();
        for &index in pixels {
            frame.put_pixel(index % SIDE, index / SIDE, Rgba([178, 128, 128, 255]));
        }
        frame
    }

    fn config() -> SketchConfig {
        SketchConfig {
            nodes_max: 5,
            range: Band::new(10.0, 100.0),
            ..SketchConfig::default()
        }
    }

    fn video(frames: Vec<RgbaImage>) -> VideoBuffer {
        let mut video = VideoBuffer::new(VideoConfig {
            width: SIDE,
            height: SIDE,
        });
        video.attach_stream(Box::new(ImageSequence::from_frames(frames)));
        video
    }

    #[test]
    fn first_frame_is_suppressed_and_second_samples_one_node() {
        let mut sketch = VideoSketch::new(config()).unwrap();
        let mut video = video(vec![gray(), bumped(&[37])]);
        let mut surface = NullSurface::default();

        let first = sketch.draw(&mut video, &mut surface).unwrap().unwrap();
        assert!(first.total_movement > 0);
        assert_eq!(first.nodes_added, 0);

        let second = sketch.draw(&mut video, &mut surface).unwrap().unwrap();
        assert_eq!(second.total_movement, 50);
        assert_eq!(second.nodes_added, 1);
        assert_eq!(second.primitives, 0);
        assert_eq!(surface.draws, 2);
    }

    #[test]
    fn sampled_node_sits_at_mirrored_pixel_position() {
        let mut sketch = VideoSketch::new(config()).unwrap();
        let mut video = video(vec![gray(), bumped(&[37])]);

        sketch.sample(&mut video);
        assert!(sketch.nodes().is_empty());

        let diff = sketch.sample(&mut video);
        assert_eq!(diff.in_band, 1);
        assert_eq!(sketch.nodes().nodes(), &[MotionNode::new(0.375, 0.5, 50.0)]);
    }

    #[test]
    fn eviction_runs_after_render() {
        let config = SketchConfig {
            nodes_max: 5,
            nodes_remove: 2,
            ..config()
        };
        let mut sketch = VideoSketch::new(config).unwrap();
        let bumps: Vec<u32> = (0..20).collect();
        let mut video = video(vec![gray(), bumped(&bumps)]);
        let mut surface = NullSurface::default();

        sketch.draw(&mut video, &mut surface).unwrap();
        let report = sketch.draw(&mut video, &mut surface).unwrap().unwrap();
        assert_eq!(report.nodes_added, 20);
        assert_eq!(report.evicted, 15);
        assert_eq!(report.live_nodes, 5);
        assert_eq!(report.peak_nodes(), 20);
        // Oldest nodes went first: the survivors are the last five sampled.
        assert_eq!(
            sketch.nodes().nodes()[0],
            MotionNode::from_pixel_index(15, SIDE, SIDE, 50.0)
        );
    }

    #[test]
    fn clustered_motion_emits_fans() {
        let config = SketchConfig {
            geometry: GeometryConfig {
                radius_divisor: 100.0,
                ..GeometryConfig::default()
            },
            ..config()
        };
        let mut sketch = VideoSketch::new(config).unwrap();
        // Three horizontally adjacent pixels, each within 0.5 of the others.
        let mut video = video(vec![gray(), bumped(&[26, 27, 28])]);
        let mut surface = NullSurface::default();

        sketch.draw(&mut video, &mut surface).unwrap();
        let report = sketch.draw(&mut video, &mut surface).unwrap().unwrap();
        // Every node sees all three, giving two consecutive pairs each.
        assert_eq!(report.primitives, 6);
        assert_eq!(surface.last_visible, 6);
    }

    #[test]
    fn frames_are_skipped_without_a_running_source() {
        let mut sketch = VideoSketch::new(config()).unwrap();
        let mut surface = NullSurface::default();

        let mut idle = VideoBuffer::new(VideoConfig::default());
        assert_eq!(sketch.draw(&mut idle, &mut surface).unwrap(), None);

        idle.set_source(Box::new(ImageSequence::from_frames(vec![gray()])));
        assert_eq!(sketch.draw(&mut idle, &mut surface).unwrap(), None);

        idle.play();
        assert!(sketch.draw(&mut idle, &mut surface).unwrap().is_some());
        assert_eq!(surface.draws, 1);
    }

    #[test]
    fn empty_frames_leave_the_set_alone() {
        let mut sketch = VideoSketch::new(config()).unwrap();
        assert_eq!(sketch.build_geometry(), 0);
        assert_eq!(sketch.reset(), 0);
        assert!(sketch.nodes().is_empty());
    }

    #[test]
    fn set_range_rejects_an_inverted_band() {
        let mut sketch = VideoSketch::new(config()).unwrap();
        assert!(sketch.set_range(50.0, 10.0).is_err());
        sketch.set_range(5.0, 60.0).unwrap();
        assert_eq!(sketch.config().range, Band::new(5.0, 60.0));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = SketchConfig {
            colors: Vec::new(),
            ..SketchConfig::default()
        };
        assert!(VideoSketch::new(config).is_err());
    }
}
