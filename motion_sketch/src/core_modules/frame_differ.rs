// THEORY:
// The `FrameDiffer` is the temporal layer of the sketch. It compares each new
// frame against the frame before it and turns the per-pixel change into two
// outputs: a single scalar "movement" total for the whole frame, and a stream of
// in-band pixel hits that later become motion nodes.
//
// Key architectural principles:
// 1.  **Single-Pass Arithmetic**: One pass over the RGBA samples computes the
//     absolute channel differences, their sum `d`, and the running movement total.
//     Alpha never participates.
// 2.  **Band Filtering**: Only pixels whose `d` falls strictly inside the
//     configured band are reported. The lower edge filters sensor noise, the
//     upper edge filters saturation (cuts, flashes).
// 3.  **First-Frame Gate**: Before any movement has ever been observed there is
//     no meaningful baseline, so nothing is reported. The gate opens at the end of
//     the first frame with movement and only affects later frames.
// 4.  **Explicit Buffer Roles**: `diff_in_place` writes the difference back into
//     the "previous" buffer. `FrameDiffer` wraps that in two owned buffers whose
//     roles are swapped every pass, so after a pass `history` holds the last-seen
//     colours and `diff_image` holds the difference image used as a debug overlay.

use serde::{Deserialize, Serialize};

use crate::core_modules::pixel_buffer::{CHANNELS, PixelBuffer};

/// The open interval of per-pixel difference magnitudes considered motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// True when `min < d < max`.
    pub fn contains(&self, d: u32) -> bool {
        let d = d as f32;
        d > self.min && d < self.max
    }
}

impl Default for Band {
    fn default() -> Self {
        Self::new(200.0, 400.0)
    }
}

/// Diffs `current` against `previous`, overwriting `previous` RGB with the
/// absolute channel differences. Alpha in `previous` is left untouched.
///
/// When `report` is set, every pixel with an in-band difference is passed to
/// `on_in_band` as `(pixel_index, d)` in scan order. Returns the total movement.
///
/// Panics if the slices differ in length.
pub fn diff_in_place<F>(
    current: &[u8],
    previous: &mut [u8],
    band: Band,
    report: bool,
    mut on_in_band: F,
) -> u64
where
    F: FnMut(usize, u32),
{
    assert_eq!(
        current.len(),
        previous.len(),
        "current and previous pixel buffers must be the same length"
    );

    let mut movement = 0u64;
    for (index, (cur, prev)) in current
        .chunks_exact(CHANNELS)
        .zip(previous.chunks_exact_mut(CHANNELS))
        .enumerate()
    {
        let dr = cur[0].abs_diff(prev[0]);
        let dg = cur[1].abs_diff(prev[1]);
        let db = cur[2].abs_diff(prev[2]);

        prev[0] = dr;
        prev[1] = dg;
        prev[2] = db;

        let d = dr as u32 + dg as u32 + db as u32;
        movement += d as u64;

        if report && band.contains(d) {
            on_in_band(index, d);
        }
    }
    movement
}

/// The result of a single differ pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDiff {
    /// Sum of `d` over every pixel of the frame.
    pub total_movement: u64,
    /// Number of pixels reported through the in-band callback.
    pub in_band: usize,
}

/// Stateful frame-to-frame differ with an explicit history / diff double buffer.
#[derive(Debug, Clone)]
pub struct FrameDiffer {
    /// Colours of the last frame seen. Starts out transparent black.
    history: PixelBuffer,
    /// `|current - previous|` from the last pass.
    diff_image: PixelBuffer,
    /// Set once any frame has produced movement. Gates reporting on later frames.
    has_diff: bool,
}

impl FrameDiffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            history: PixelBuffer::new(width, height),
            diff_image: PixelBuffer::new(width, height),
            has_diff: false,
        }
    }

    /// Diffs `current` against the stored history and reports in-band pixels.
    pub fn process<F>(&mut self, current: &PixelBuffer, band: Band, on_in_band: F) -> FrameDiff
    where
        F: FnMut(usize, u32),
    {
        let mut on_in_band = on_in_band;
        let mut in_band = 0usize;
        let total_movement = diff_in_place(
            current.as_slice(),
            self.history.as_mut_slice(),
            band,
            self.has_diff,
            |index, d| {
                in_band += 1;
                on_in_band(index, d);
            },
        );

        // `history` now holds the diff: swap roles, then refresh history.
        std::mem::swap(&mut self.history, &mut self.diff_image);
        self.history.copy_from(current);

        if total_movement > 0 {
            self.has_diff = true;
        }

        FrameDiff {
            total_movement,
            in_band,
        }
    }

    /// Whether movement has been observed since construction or the last `reset_gate`.
    pub fn has_diff(&self) -> bool {
        self.has_diff
    }

    /// Closes the first-frame gate again, e.g. after switching to a new source.
    pub fn reset_gate(&mut self) {
        self.has_diff = false;
    }

    /// Reallocates both buffers for a new sampling resolution and closes the gate.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.history = PixelBuffer::new(width, height);
        self.diff_image = PixelBuffer::new(width, height);
        self.has_diff = false;
    }

    pub fn history(&self) -> &PixelBuffer {
        &self.history
    }

    pub fn diff_image(&self) -> &PixelBuffer {
        &self.diff_image
    }
}
