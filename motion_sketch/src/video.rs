// THEORY:
// The video module is the sketch's window onto the world. It hides where frames
// come from (a directory of recorded frames, a list of image files, or a
// generated test pattern) behind the `FrameSource` trait, and presents them to
// the core through `VideoBuffer`, which samples every frame down to a small fixed
// grid and runs the frame differ over it.
//
// Key architectural principles:
// 1.  **Low-Resolution Sampling**: The core never sees full frames. `read_pixels`
//     resamples to a grid of tens of pixels per axis, which keeps the differ,
//     the node count and the quadtree small.
// 2.  **Acquisition Boundary**: Opening a source is the only fallible, blocking
//     step. `SourceSpec::open` does it in one go so callers can run it on a
//     blocking task and hand the result back to the frame loop.
// 3.  **Forgiving Playback**: A prerecorded source that runs out loops back to its
//     first frame. A source that yields nothing at all leaves the previous pixels
//     in place, which the differ reads as zero movement.

use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::config::VideoConfig;
use crate::core_modules::frame_differ::{Band, FrameDiff, FrameDiffer};
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{Result, SketchError};

/// A stream of RGBA frames at any resolution.
pub trait FrameSource: Send {
    /// The next frame, or `None` at the end of the stream.
    fn next_frame(&mut self) -> Option<&RgbaImage>;

    /// Seeks back to the first frame.
    fn rewind(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// A prerecorded sequence of decoded frames.
pub struct ImageSequence {
    frames: Vec<RgbaImage>,
    position: usize,
    label: String,
}

impl ImageSequence {
    pub fn from_frames(frames: Vec<RgbaImage>) -> Self {
        let label = format!("{} in-memory frames", frames.len());
        Self {
            frames,
            position: 0,
            label,
        }
    }

    /// Loads and decodes every file in `paths`, in the order given.
    pub fn open_files(paths: &[PathBuf]) -> Result<Self> {
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let frame = image::open(path)
                .map_err(|source| SketchError::ImageLoad {
                    path: path.clone(),
                    source,
                })?
                .to_rgba8();
            frames.push(frame);
        }
        if frames.is_empty() {
            return Err(SketchError::Acquisition {
                source_desc: "file list".to_string(),
                reason: "no frames given".to_string(),
            });
        }
        let mut sequence = Self::from_frames(frames);
        sequence.label = format!("{} frames from file list", sequence.frames.len());
        Ok(sequence)
    }

    /// Loads every decodable image in `dir`, sorted by file name.
    pub fn open_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|err| SketchError::Acquisition {
            source_desc: dir.display().to_string(),
            reason: err.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| SketchError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.is_file() && ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(SketchError::Acquisition {
                source_desc: dir.display().to_string(),
                reason: "directory contains no image frames".to_string(),
            });
        }
        let mut sequence = Self::open_files(&paths)?;
        sequence.label = format!("{} frames from {}", sequence.frames.len(), dir.display());
        Ok(sequence)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Option<&RgbaImage> {
        let frame = self.frames.get(self.position)?;
        self.position += 1;
        Some(frame)
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Generated test footage: a bright square orbiting over a grey field.
pub struct SyntheticSource {
    canvas: RgbaImage,
    frame: u64,
    /// Frames per full orbit.
    period: u64,
}

impl SyntheticSource {
    const BACKGROUND: Rgba<u8> = Rgba([90, 90, 90, 255]);
    const FOREGROUND: Rgba<u8> = Rgba([250, 230, 200, 255]);

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::from_pixel(width.max(1), height.max(1), Self::BACKGROUND),
            frame: 0,
            period: 120,
        }
    }

    fn paint(&mut self) {
        let (width, height) = self.canvas.dimensions();
        for px in self.canvas.pixels_mut() {
            *px = Self::BACKGROUND;
        }

        let phase = (self.frame % self.period) as f32 / self.period as f32 * std::f32::consts::TAU;
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let orbit = cx.min(cy) * 0.6;
        let half = (width.min(height) / 10).max(1) as i64;
        let sx = (cx + orbit * phase.cos()) as i64;
        let sy = (cy + orbit * phase.sin()) as i64;

        for y in (sy - half).max(0)..(sy + half).min(height as i64) {
            for x in (sx - half).max(0)..(sx + half).min(width as i64) {
                self.canvas.put_pixel(x as u32, y as u32, Self::FOREGROUND);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Option<&RgbaImage> {
        self.paint();
        self.frame += 1;
        Some(&self.canvas)
    }

    fn rewind(&mut self) {
        self.frame = 0;
    }

    fn describe(&self) -> String {
        let (w, h) = self.canvas.dimensions();
        format!("synthetic {w}x{h} orbit")
    }
}

/// Where to acquire frames from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Directory(PathBuf),
    Files(Vec<PathBuf>),
    Synthetic { width: u32, height: u32 },
}

impl SourceSpec {
    /// Opens the source. Blocking: decodes every frame up front.
    pub fn open(&self) -> Result<Box<dyn FrameSource>> {
        let source: Box<dyn FrameSource> = match self {
            SourceSpec::Directory(dir) => Box::new(ImageSequence::open_dir(dir)?),
            SourceSpec::Files(paths) => Box::new(ImageSequence::open_files(paths)?),
            SourceSpec::Synthetic { width, height } => Box::new(SyntheticSource::new(*width, *height)),
        };
        Ok(source)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Directory(dir) => write!(f, "directory {}", dir.display()),
            SourceSpec::Files(paths) => write!(f, "{} files", paths.len()),
            SourceSpec::Synthetic { width, height } => write!(f, "synthetic {width}x{height}"),
        }
    }
}

/// Copies `frame` into `out`, resampling when the sizes differ.
fn resample_into(frame: &RgbaImage, out: &mut PixelBuffer) {
    if frame.dimensions() == (out.width(), out.height()) {
        out.copy_from_image(frame);
    } else {
        let scaled = imageops::resize(frame, out.width(), out.height(), FilterType::Triangle);
        out.copy_from_image(&scaled);
    }
}

/// Pulls one frame from `source` into `out`. Returns false at end of stream.
fn sample_next(source: &mut dyn FrameSource, out: &mut PixelBuffer) -> bool {
    match source.next_frame() {
        Some(frame) => {
            resample_into(frame, out);
            true
        }
        None => false,
    }
}

/// Low-resolution view of a video source plus its frame differ.
pub struct VideoBuffer {
    width: u32,
    height: u32,
    source: Option<Box<dyn FrameSource>>,
    /// The most recently sampled frame.
    pixels: PixelBuffer,
    differ: FrameDiffer,
    is_streaming: bool,
    is_playing: bool,
    /// Set while the source yields no frames, to log the stall only once.
    stalled: bool,
}

impl VideoBuffer {
    pub fn new(config: VideoConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            source: None,
            pixels: PixelBuffer::new(config.width, config.height),
            differ: FrameDiffer::new(config.width, config.height),
            is_streaming: false,
            is_playing: false,
            stalled: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Changes the sampling grid. The differ starts over with a fresh baseline.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = PixelBuffer::new(width, height);
        self.differ.resize(width, height);
    }

    /// Swaps in a new source without touching the play state.
    pub fn set_source(&mut self, source: Box<dyn FrameSource>) {
        log::debug!("video source set to {}", source.describe());
        self.source = Some(source);
        self.stalled = false;
    }

    /// Completes a successful acquisition: the new stream gets a fresh first-frame
    /// gate, is marked streaming, and starts playing.
    pub fn attach_stream(&mut self, source: Box<dyn FrameSource>) {
        self.differ.reset_gate();
        self.is_streaming = true;
        self.pause();
        self.set_source(source);
        self.play();
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn play(&mut self) {
        self.is_playing = true;
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
    }

    pub fn toggle(&mut self) {
        if self.is_playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn seek_start(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.rewind();
        }
    }

    /// Samples the current frame into the pixel grid.
    ///
    /// Returns `None` without a source. While paused the previous frame is kept.
    pub fn read_pixels(&mut self) -> Option<&PixelBuffer> {
        let source = self.source.as_mut()?;
        if !self.is_playing {
            return Some(&self.pixels);
        }

        // End of a recorded stream loops back to the first frame.
        let sampled = sample_next(&mut **source, &mut self.pixels) || {
            source.rewind();
            sample_next(&mut **source, &mut self.pixels)
        };

        if sampled {
            self.stalled = false;
        } else if !self.stalled {
            log::warn!("video source {} yields no frames; holding last frame", source.describe());
            self.stalled = true;
        }
        Some(&self.pixels)
    }

    /// Diffs the last sampled frame against the previous one.
    pub fn for_frame_diff<F>(&mut self, band: Band, on_in_band: F) -> FrameDiff
    where
        F: FnMut(usize, u32),
    {
        self.differ.process(&self.pixels, band, on_in_band)
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// `|current - previous|` from the last diff pass, for debug overlays.
    pub fn diff_image(&self) -> &PixelBuffer {
        self.differ.diff_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    fn streaming(frames: Vec<RgbaImage>, width: u32, height: u32) -> VideoBuffer {
        let mut video = VideoBuffer::new(VideoConfig { width, height });
        video.attach_stream(Box::new(ImageSequence::from_frames(frames)));
        video
    }

    #[test]
    fn no_source_reads_nothing() {
        let mut video = VideoBuffer::new(VideoConfig::default());
        assert!(video.read_pixels().is_none());
        assert!(!video.is_streaming());
    }

    #[test]
    fn attach_stream_marks_streaming_and_playing() {
        let video = streaming(vec![solid(2, 2, 1)], 2, 2);
        assert!(video.is_streaming());
        assert!(video.is_playing());
        assert!(video.has_source());
    }

    #[test]
    fn recorded_stream_loops_at_end() {
        let mut video = streaming(vec![solid(2, 2, 10), solid(2, 2, 20)], 2, 2);
        let seen: Vec<u8> = (0..5)
            .map(|_| video.read_pixels().unwrap().pixel(0)[0])
            .collect();
        assert_eq!(seen, vec![10, 20, 10, 20, 10]);
    }

    #[test]
    fn paused_video_holds_last_frame() {
        let mut video = streaming(vec![solid(2, 2, 10), solid(2, 2, 20)], 2, 2);
        video.read_pixels();
        video.toggle();
        assert!(!video.is_playing());
        assert_eq!(video.read_pixels().unwrap().pixel(0)[0], 10);
        assert_eq!(video.read_pixels().unwrap().pixel(0)[0], 10);
    }

    #[test]
    fn empty_source_holds_previous_pixels() {
        let mut video = streaming(Vec::new(), 2, 2);
        let pixels = video.read_pixels().unwrap();
        assert!(pixels.as_slice().iter().all(|&b| b == 0));
        let diff = video.for_frame_diff(Band::default(), |_, _| {});
        assert_eq!(diff.total_movement, 0);
    }

    #[test]
    fn frames_are_resampled_to_the_grid() {
        let mut video = streaming(vec![solid(64, 48, 77)], 8, 6);
        let pixels = video.read_pixels().unwrap();
        assert_eq!((pixels.width(), pixels.height()), (8, 6));
        assert_eq!(pixels.pixel(10), [77, 77, 77, 255]);
    }

    #[test]
    fn synthetic_source_moves() {
        let mut source = SyntheticSource::new(32, 24);
        let first = source.next_frame().unwrap().clone();
        for _ in 0..10 {
            source.next_frame();
        }
        let later = source.next_frame().unwrap();
        assert_ne!(&first, later);

        source.rewind();
        assert_eq!(source.next_frame().unwrap(), &first);
    }

    #[test]
    fn missing_directory_fails_acquisition() {
        let spec = SourceSpec::Directory(PathBuf::from("/definitely/not/a/frame/dir"));
        assert!(matches!(spec.open(), Err(SketchError::Acquisition { .. })));
    }

    #[test]
    fn directory_frames_load_in_name_order() {
        let dir = std::env::temp_dir().join(format!("motion_sketch_frames_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        solid(4, 4, 200).save(dir.join("frame_002.png")).unwrap();
        solid(4, 4, 100).save(dir.join("frame_001.png")).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = SourceSpec::Directory(dir.clone()).open().unwrap();
        assert_eq!(source.next_frame().unwrap().get_pixel(0, 0).0[0], 100);
        assert_eq!(source.next_frame().unwrap().get_pixel(0, 0).0[0], 200);
        assert!(source.next_frame().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn directory_without_frames_fails_acquisition() {
        let dir = std::env::temp_dir().join(format!("motion_sketch_empty_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let result = SourceSpec::Directory(dir.clone()).open();
        assert!(matches!(result, Err(SketchError::Acquisition { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
