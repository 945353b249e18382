// THEORY:
// Configuration for the whole sketch lives in a handful of plain structs with
// sensible defaults. The `AppConfig` can be loaded from JSON; any field left out
// falls back to its default. Every config is validated once at construction time,
// so the per-frame code never has to second-guess its parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::frame_differ::Band;
use crate::core_modules::node_set::EvictionPolicy;
use crate::error::{Result, SketchError};

pub use crate::core_modules::geometry::{GeometryConfig, PrimitiveMode};

/// Configuration of the motion-to-geometry pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    /// Live node count above which the excess is evicted at the end of a frame.
    pub nodes_max: usize,
    /// Minimum number of nodes evicted at the end of every frame that had nodes.
    pub nodes_remove: usize,
    /// Band of per-pixel difference magnitudes treated as motion.
    pub range: Band,
    /// Ordered colour ramp indexed by magnitude within `range`.
    pub colors: Vec<[u8; 3]>,
    pub geometry: GeometryConfig,
}

impl Default for SketchConfig {
    fn default() -> Self {
        let eviction = EvictionPolicy::default();
        Self {
            nodes_max: eviction.nodes_max,
            nodes_remove: eviction.nodes_remove,
            range: Band::default(),
            colors: vec![[100, 100, 100], [255, 255, 255]],
            geometry: GeometryConfig::default(),
        }
    }
}

impl SketchConfig {
    pub fn eviction(&self) -> EvictionPolicy {
        EvictionPolicy {
            nodes_max: self.nodes_max,
            nodes_remove: self.nodes_remove,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_band(self.range)?;
        if self.colors.is_empty() {
            return Err(invalid("colors must contain at least one entry"));
        }
        let geometry = &self.geometry;
        if !(geometry.radius_divisor > 0.0) || !geometry.radius_divisor.is_finite() {
            return Err(invalid("geometry.radius_divisor must be a positive number"));
        }
        if !(geometry.fade_step > 0.0) {
            return Err(invalid("geometry.fade_step must be greater than zero"));
        }
        if geometry.poly_capacity == 0 {
            return Err(invalid("geometry.poly_capacity must be greater than zero"));
        }
        Ok(())
    }
}

pub(crate) fn validate_band(band: Band) -> Result<()> {
    if !(band.min < band.max) {
        return Err(invalid(format!(
            "range min ({}) must be below range max ({})",
            band.min, band.max
        )));
    }
    Ok(())
}

/// Low-resolution sampling grid the video is read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
}

impl VideoConfig {
    /// A 4:3 grid of `4 * scale` by `3 * scale` samples.
    pub fn from_scale(scale: u32) -> Self {
        Self {
            width: 4 * scale,
            height: 3 * scale,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self::from_scale(16)
    }
}

/// Post-processing pass applied between the off-screen layer and the final image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxConfig {
    pub enabled: bool,
    /// Gaussian sigma of the bloom blur, in output pixels.
    pub blur_sigma: f32,
    pub vignette_offset: f32,
    pub vignette_darkness: f32,
    /// Film grain amplitude in `[0, 1]`.
    pub noise_intensity: f32,
    /// Time added to the grain seed every draw.
    pub time_step: f32,
}

impl Default for PostFxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blur_sigma: 3.0,
            vignette_offset: 0.25,
            vignette_darkness: 4.0,
            noise_intensity: 0.05,
            time_step: 0.1,
        }
    }
}

/// Output surface configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: [u8; 3],
    pub post: PostFxConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            clear_color: [20, 0, 14],
            post: PostFxConfig::default(),
        }
    }
}

/// Top-level configuration of a sketch application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sketch: SketchConfig,
    pub video: VideoConfig,
    pub render: RenderConfig,
    /// Target time between frames, roughly one display refresh.
    pub frame_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sketch: SketchConfig::default(),
            video: VideoConfig::default(),
            render: RenderConfig::default(),
            frame_interval_ms: 16,
        }
    }
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SketchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.sketch.validate()?;
        if self.video.width == 0 || self.video.height == 0 {
            return Err(invalid("video width and height must be non-zero"));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(invalid("render width and height must be non-zero"));
        }
        if self.frame_interval_ms == 0 {
            return Err(invalid("frame_interval_ms must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SketchError {
    SketchError::InvalidConfig(message.into())
}
