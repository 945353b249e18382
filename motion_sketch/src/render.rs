// THEORY:
// The render module is the sink at the end of every frame. The core hands it a
// read-only `GeometryFrame` and never looks back; what a surface does with the
// vertices is its own business.
//
// Key architectural principles:
// 1.  **Narrow Trait**: `RenderSurface` is three calls: resize, draw and an
//     optional snapshot. The sketch driver is generic over it, so tests run
//     against `NullSurface` and the runner draws through `RasterSurface`.
// 2.  **Two-Pass Compositing**: `RasterSurface` first accumulates geometry into an
//     off-screen float layer with additive blending (`src * alpha + dst`). A post
//     pass then builds the backdrop: clear colour plus a blurred copy of the
//     layer (bloom), a vignette and a time-seeded film grain. Finally the sharp
//     layer is added on top and everything is clamped into 8-bit RGBA.
// 3.  **Clip-Space Input**: Vertices arrive in `[-1, 1]` with `+y` up. The surface
//     maps them onto its own pixel grid, so the core never knows the output size.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::imageops;
use image::{ExtendedColorType, ImageEncoder, Rgb, Rgb32FImage, Rgba, RgbaImage};

use crate::config::{PostFxConfig, RenderConfig};
use crate::core_modules::geometry::{GeometryFrame, PrimitiveMode};
use crate::error::{Result, SketchError};

/// A sink for one frame of emitted geometry.
pub trait RenderSurface {
    fn resize(&mut self, width: u32, height: u32);

    fn draw(&mut self, frame: &GeometryFrame<'_>) -> Result<()>;

    /// The last composited image, for surfaces that keep one.
    fn snapshot(&self) -> Option<&RgbaImage> {
        None
    }
}

/// Discards geometry, only counting what it was given.
#[derive(Debug, Clone, Default)]
pub struct NullSurface {
    pub draws: u64,
    /// Visible triangles in the last frame drawn.
    pub last_visible: usize,
    pub width: u32,
    pub height: u32,
}

impl RenderSurface for NullSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn draw(&mut self, frame: &GeometryFrame<'_>) -> Result<()> {
        self.draws += 1;
        self.last_visible = frame.visible_triangles().count();
        Ok(())
    }
}

/// A vertex projected onto the pixel grid, carrying its shading inputs.
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    color: [f32; 3],
    alpha: f32,
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// CPU rasteriser with an off-screen accumulation layer and a post pass.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    clear_color: [f32; 3],
    post: PostFxConfig,
    /// Additively blended geometry, linear RGB, unclamped.
    layer: Vec<[f32; 3]>,
    output: RgbaImage,
    /// Grain seed, advanced by `post.time_step` every draw.
    time: f32,
}

impl RasterSurface {
    pub fn new(config: RenderConfig) -> Self {
        let (width, height) = (config.width.max(1), config.height.max(1));
        Self {
            width,
            height,
            clear_color: config.clear_color.map(|c| c as f32 / 255.0),
            post: config.post,
            layer: vec![[0.0; 3]; (width * height) as usize],
            output: RgbaImage::new(width, height),
            time: 0.0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// The last composited frame.
    pub fn output(&self) -> &RgbaImage {
        &self.output
    }

    fn project(&self, frame: &GeometryFrame<'_>, v: usize) -> ScreenVertex {
        let [cx, cy] = frame.positions[v];
        ScreenVertex {
            x: (cx + 1.0) * 0.5 * self.width as f32,
            y: (1.0 - (cy + 1.0) * 0.5) * self.height as f32,
            color: frame.colors[v],
            alpha: frame.opacity[v],
        }
    }

    fn blend(&mut self, x: i64, y: i64, color: [f32; 3], alpha: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let dst = &mut self.layer[(y as u32 * self.width + x as u32) as usize];
        for c in 0..3 {
            dst[c] += color[c] * alpha;
        }
    }

    fn fill_triangle(&mut self, v: [ScreenVertex; 3]) {
        let area = edge(&v[0], &v[1], v[2].x, v[2].y);
        if area == 0.0 || !area.is_finite() {
            return;
        }

        let min_x = v.iter().map(|p| p.x).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let min_y = v.iter().map(|p| p.y).fold(f32::INFINITY, f32::min).floor().max(0.0) as i64;
        let max_x = (v.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
            .min(self.width as i64 - 1);
        let max_y = (v.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
            .min(self.height as i64 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(&v[1], &v[2], px, py) / area;
                let w1 = edge(&v[2], &v[0], px, py) / area;
                let w2 = edge(&v[0], &v[1], px, py) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let mut color = [0.0; 3];
                for (c, out) in color.iter_mut().enumerate() {
                    *out = w0 * v[0].color[c] + w1 * v[1].color[c] + w2 * v[2].color[c];
                }
                let alpha = w0 * v[0].alpha + w1 * v[1].alpha + w2 * v[2].alpha;
                self.blend(x, y, color, alpha);
            }
        }
    }

    fn draw_line(&mut self, a: ScreenVertex, b: ScreenVertex) {
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0);
        if !steps.is_finite() {
            return;
        }
        let steps = steps as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let mut color = [0.0; 3];
            for (c, out) in color.iter_mut().enumerate() {
                *out = a.color[c] + (b.color[c] - a.color[c]) * t;
            }
            let alpha = a.alpha + (b.alpha - a.alpha) * t;
            let x = (a.x + (b.x - a.x) * t).floor() as i64;
            let y = (a.y + (b.y - a.y) * t).floor() as i64;
            self.blend(x, y, color, alpha);
        }
    }

    /// Clear colour plus bloom, vignette and grain, one value per pixel.
    fn backdrop(&self) -> Vec<[f32; 3]> {
        let mut base = vec![self.clear_color; self.layer.len()];
        if !self.post.enabled {
            return base;
        }

        if self.post.blur_sigma > 0.0 {
            let mut glow = Rgb32FImage::new(self.width, self.height);
            for (px, value) in glow.pixels_mut().zip(&self.layer) {
                *px = Rgb(*value);
            }
            let glow = imageops::blur(&glow, self.post.blur_sigma);
            for (dst, px) in base.iter_mut().zip(glow.pixels()) {
                for c in 0..3 {
                    dst[c] += px.0[c];
                }
            }
        }

        let (w, h) = (self.width as f32, self.height as f32);
        for (i, dst) in base.iter_mut().enumerate() {
            let u = ((i as u32 % self.width) as f32 + 0.5) / w;
            let v = ((i as u32 / self.width) as f32 + 0.5) / h;

            let ux = (u - 0.5) * self.post.vignette_offset;
            let uy = (v - 0.5) * self.post.vignette_offset;
            let amount = ux * ux + uy * uy;
            let edge_tone = 1.0 - self.post.vignette_darkness;

            let grain = (film_grain(u, v, self.time) - 0.5) * self.post.noise_intensity;
            for c in dst.iter_mut() {
                *c = *c + (edge_tone - *c) * amount + grain;
            }
        }
        base
    }
}

/// Cheap hash noise in `[0, 1)`, reseeded by `time`.
fn film_grain(u: f32, v: f32, time: f32) -> f32 {
    let n = ((u + time) * 12.9898 + (v + time) * 78.233).sin() * 43_758.547;
    n - n.floor()
}

impl RenderSurface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.layer = vec![[0.0; 3]; (self.width * self.height) as usize];
        self.output = RgbaImage::new(self.width, self.height);
    }

    fn draw(&mut self, frame: &GeometryFrame<'_>) -> Result<()> {
        self.layer.fill([0.0; 3]);

        for [a, b, c] in frame.visible_triangles() {
            let v = [self.project(frame, a), self.project(frame, b), self.project(frame, c)];
            match frame.mode {
                PrimitiveMode::Triangles => self.fill_triangle(v),
                PrimitiveMode::Lines => {
                    self.draw_line(v[0], v[1]);
                    self.draw_line(v[1], v[2]);
                    self.draw_line(v[2], v[0]);
                }
            }
        }

        let backdrop = self.backdrop();
        for ((px, base), geometry) in self.output.pixels_mut().zip(&backdrop).zip(&self.layer) {
            let mut rgba = [255u8; 4];
            for c in 0..3 {
                rgba[c] = ((base[c] + geometry[c]).clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            *px = Rgba(rgba);
        }

        self.time += self.post.time_step;
        Ok(())
    }

    fn snapshot(&self) -> Option<&RgbaImage> {
        Some(&self.output)
    }
}

/// Writes `image` to `path` as an RGBA PNG.
pub fn save_png(path: impl AsRef<Path>, image: &RgbaImage) -> Result<()> {
    let path = path.as_ref();
    let output = File::create(path).map_err(|source| SketchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoder = PngEncoder::new(BufWriter::new(output));
    encoder.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)?;
    log::debug!("wrote {}x{} snapshot to {}", image.width(), image.height(), path.display());
    Ok(())
}
