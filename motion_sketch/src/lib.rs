// THEORY:
// This file is the entry point of the `motion_sketch` library crate. It turns a
// video stream into a generative sketch: frame differences become motion nodes,
// nodes are indexed in a quadtree every frame, and neighbouring nodes are joined
// into fading triangle fans.
//
// The pipeline core (`core_modules`) is pure, synchronous and allocation-bounded.
// Around it sit the collaborators the core only talks to through narrow
// interfaces: the `video` surface it samples, the `render` surface it draws into,
// the `looper` that schedules frames, and the `app` context that owns them all.

pub mod app;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod looper;
pub mod render;
pub mod sketch;
pub mod video;

pub use app::{AppEvent, RunSummary, SketchApp, SnapshotPlan, spawn_acquisition};
pub use config::AppConfig;
pub use error::{Result, SketchError};
pub use render::{NullSurface, RasterSurface, RenderSurface};
pub use sketch::{FrameReport, VideoSketch};
pub use video::{FrameSource, SourceSpec, VideoBuffer};
