// THEORY:
// The `SketchApp` is the explicit application context. Everything the sketch
// needs at runtime (the video buffer, the pipeline, the render surface and the
// looper) is constructed once here and owned here. There are no process-wide
// singletons: two apps in one process do not share anything.
//
// Key architectural principles:
// 1.  **One Event Queue**: Everything that is not a frame arrives as an
//     `AppEvent` on an unbounded channel: acquisition results, resizes, range
//     changes, playback toggles, snapshots and quit. The looper interleaves those
//     events with frames, so state only ever changes between frames.
// 2.  **Asynchronous Acquisition**: `request` opens a source on a blocking task
//     and posts the outcome back as `SourceReady`. The caller gets a `oneshot`
//     completion signal with the result. Until a source lands, the frame guard
//     skips every tick.
// 3.  **No Retries**: A failed acquisition is logged and reported to the
//     requester. Trying again is up to the caller.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::AppConfig;
use crate::error::{Result, SketchError};
use crate::looper::{LoopHandle, Looper, Tick};
use crate::render::{RenderSurface, save_png};
use crate::sketch::{FrameReport, VideoSketch};
use crate::video::{FrameSource, SourceSpec, VideoBuffer};

/// Host events applied between frames.
pub enum AppEvent {
    /// A `request` finished, successfully or not.
    SourceReady {
        source: String,
        result: Result<Box<dyn FrameSource>>,
        done: Option<oneshot::Sender<Result<()>>>,
    },
    /// The output surface changed size.
    Resize { width: u32, height: u32 },
    /// A new motion band.
    SetRange { min: f32, max: f32 },
    /// Pauses or resumes both the video and the frame loop.
    TogglePlayback,
    /// Writes the last rendered frame to a PNG file.
    Snapshot(PathBuf),
    Quit,
}

/// Totals over a `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Frames that went through the whole pipeline.
    pub frames: u64,
    /// Frame ticks skipped by the guard while no source was running.
    pub skipped: u64,
    pub nodes_sampled: u64,
    pub peak_live_nodes: usize,
    pub primitives: u64,
}

impl RunSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.nodes_sampled += report.nodes_added as u64;
        self.peak_live_nodes = self.peak_live_nodes.max(report.peak_nodes());
        self.primitives += report.primitives as u64;
    }

    pub fn ticks(&self) -> u64 {
        self.frames + self.skipped
    }
}

/// Periodic PNG dumps of the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPlan {
    pub dir: PathBuf,
    /// Write every n-th drawn frame.
    pub every: u64,
    /// Also write the frame differ's diff image next to each snapshot.
    pub debug_diff: bool,
}

/// Opens `spec` on a blocking task and posts the outcome to `events` as
/// `SourceReady`, carrying `done` along so the app can answer the requester.
///
/// Must be called from within a tokio runtime.
pub fn spawn_acquisition(
    events: mpsc::UnboundedSender<AppEvent>,
    spec: SourceSpec,
    done: Option<oneshot::Sender<Result<()>>>,
) {
    let source = spec.to_string();
    tokio::spawn(async move {
        let result = match tokio::task::spawn_blocking(move || spec.open()).await {
            Ok(result) => result,
            Err(err) => {
                log::error!("acquisition task for {source} failed: {err}");
                Err(SketchError::AcquisitionCancelled)
            }
        };
        let event = AppEvent::SourceReady {
            source,
            result,
            done,
        };
        if events.send(event).is_err() {
            log::debug!("sketch app dropped before acquisition completed");
        }
    });
}

pub struct SketchApp<S: RenderSurface> {
    video: VideoBuffer,
    sketch: VideoSketch,
    surface: S,
    looper: Looper,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    /// Stop after this many frame ticks, drawn or skipped.
    max_frames: Option<u64>,
    snapshots: Option<SnapshotPlan>,
    summary: RunSummary,
}

impl<S: RenderSurface> SketchApp<S> {
    pub fn new(config: AppConfig, mut surface: S) -> Result<Self> {
        config.validate()?;
        surface.resize(config.render.width, config.render.height);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            video: VideoBuffer::new(config.video),
            sketch: VideoSketch::new(config.sketch)?,
            surface,
            looper: Looper::new(Duration::from_millis(config.frame_interval_ms)),
            events_tx,
            events_rx,
            max_frames: None,
            snapshots: None,
            summary: RunSummary::default(),
        })
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn with_snapshots(mut self, plan: SnapshotPlan) -> Self {
        self.snapshots = Some(plan);
        self
    }

    /// A sender for posting events from other tasks.
    pub fn events_sender(&self) -> mpsc::UnboundedSender<AppEvent> {
        self.events_tx.clone()
    }

    pub fn loop_handle(&self) -> LoopHandle {
        self.looper.handle()
    }

    pub fn video(&self) -> &VideoBuffer {
        &self.video
    }

    pub fn sketch(&self) -> &VideoSketch {
        &self.sketch
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Attaches an already-open source right away, bypassing the event queue.
    pub fn attach_source(&mut self, source: Box<dyn FrameSource>) {
        log::info!("video source ready: {}", source.describe());
        self.video.attach_stream(source);
    }

    /// Starts acquiring `spec` in the background.
    ///
    /// The outcome is applied between frames; the returned receiver resolves once
    /// it has been. Must be called from within a tokio runtime.
    pub fn request(&self, spec: SourceSpec) -> oneshot::Receiver<Result<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        log::debug!("requesting video source: {spec}");
        spawn_acquisition(self.events_tx.clone(), spec, Some(done_tx));
        done_rx
    }

    /// Applies one host event. Returns `Break` on `Quit`.
    pub fn handle_event(&mut self, event: AppEvent) -> ControlFlow<()> {
        match event {
            AppEvent::SourceReady {
                source,
                result,
                done,
            } => {
                let outcome = match result {
                    Ok(stream) => {
                        self.attach_source(stream);
                        Ok(())
                    }
                    Err(err) => {
                        log::error!("could not acquire video source {source}: {err}");
                        Err(err)
                    }
                };
                if let Some(done) = done {
                    // The requester may have stopped listening; that is fine.
                    let _ = done.send(outcome);
                }
            }
            AppEvent::Resize { width, height } => {
                log::debug!("surface resized to {width}x{height}");
                self.surface.resize(width, height);
            }
            AppEvent::SetRange { min, max } => {
                if let Err(err) = self.sketch.set_range(min, max) {
                    log::warn!("ignoring range change: {err}");
                }
            }
            AppEvent::TogglePlayback => {
                self.video.toggle();
                self.looper.toggle();
                log::info!(
                    "playback {}",
                    if self.looper.is_looping() { "resumed" } else { "paused" }
                );
            }
            AppEvent::Snapshot(path) => self.write_snapshot(&path),
            AppEvent::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn write_snapshot(&self, path: &Path) {
        match self.surface.snapshot() {
            Some(image) => {
                if let Err(err) = save_png(path, image) {
                    log::warn!("snapshot failed: {err}");
                }
            }
            None => log::warn!("render surface keeps no image; nothing written to {}", path.display()),
        }
    }

    fn write_periodic(&self, plan: &SnapshotPlan) {
        let frame = self.summary.frames;
        if plan.every == 0 || frame % plan.every != 0 {
            return;
        }
        self.write_snapshot(&plan.dir.join(format!("frame_{frame:06}.png")));
        if plan.debug_diff {
            let diff = self.video.diff_image().to_image();
            if let Err(err) = save_png(plan.dir.join(format!("diff_{frame:06}.png")), &diff) {
                log::warn!("diff snapshot failed: {err}");
            }
        }
    }

    fn frame(&mut self) -> Result<()> {
        match self.sketch.draw(&mut self.video, &mut self.surface)? {
            Some(report) => {
                self.summary.record(&report);
                log::trace!("frame {}: {report:?}", self.summary.frames);
                if let Some(plan) = &self.snapshots {
                    self.write_periodic(plan);
                }
            }
            None => self.summary.skipped += 1,
        }
        Ok(())
    }

    /// Waits for and handles one frame tick or host event.
    pub async fn pump(&mut self) -> Result<ControlFlow<()>> {
        match self.looper.next(&mut self.events_rx).await {
            None => Ok(ControlFlow::Break(())),
            Some(Tick::Event(event)) => Ok(self.handle_event(event)),
            Some(Tick::Frame) => {
                self.frame()?;
                let done = self.max_frames.is_some_and(|max| self.summary.ticks() >= max);
                Ok(if done {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            }
        }
    }

    /// Plays the loop until `Quit` or the frame limit, then pauses it.
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.looper.play();
        let outcome = loop {
            match self.pump().await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.looper.pause();
        outcome?;

        log::info!(
            "run finished: {} frames drawn, {} skipped, {} nodes sampled",
            self.summary.frames,
            self.summary.skipped,
            self.summary.nodes_sampled
        );
        Ok(self.summary)
    }
}
