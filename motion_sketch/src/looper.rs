// THEORY:
// The `Looper` is the sketch's scheduler. It is single-threaded and cooperative:
// while playing it yields one frame per display interval, and at any time it
// yields host events (acquisition results, resizes, toggles) so they are applied
// between frames, never during one. Pausing only stops future frames; a frame in
// progress always runs to completion.
//
// The play state sits behind a `watch` channel. A `LoopHandle` can flip it from
// anywhere, and a paused looper sleeps on that channel instead of spinning.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

/// What woke the looper up.
#[derive(Debug, PartialEq, Eq)]
pub enum Tick<E> {
    /// Time to draw a frame.
    Frame,
    /// A host event arrived.
    Event(E),
}

enum Wake<E> {
    Frame,
    Event(Option<E>),
    StateChanged,
}

/// Remote control over a `Looper`'s play state.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    state: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    pub fn play(&self) {
        self.state.send_replace(true);
    }

    pub fn pause(&self) {
        self.state.send_replace(false);
    }

    pub fn toggle(&self) {
        self.state.send_modify(|playing| *playing = !*playing);
    }

    pub fn is_looping(&self) -> bool {
        *self.state.borrow()
    }
}

/// Display-refresh frame scheduler.
#[derive(Debug)]
pub struct Looper {
    handle: LoopHandle,
    state_rx: watch::Receiver<bool>,
    frame_interval: Duration,
    /// Created on first use; needs a running tokio time driver.
    ticker: Option<Interval>,
}

impl Looper {
    /// A paused looper producing frames every `frame_interval` once played.
    pub fn new(frame_interval: Duration) -> Self {
        let (state, state_rx) = watch::channel(false);
        Self {
            handle: LoopHandle {
                state: Arc::new(state),
            },
            state_rx,
            frame_interval,
            ticker: None,
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn play(&mut self) {
        if !self.is_looping() {
            // Restart the cadence so the first frame after play is immediate.
            self.ticker = None;
        }
        self.handle.play();
    }

    pub fn pause(&mut self) {
        self.handle.pause();
    }

    pub fn toggle(&mut self) {
        if self.is_looping() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn is_looping(&self) -> bool {
        self.handle.is_looping()
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Runs `on_frame` once if the looper is playing. Returns whether it ran.
    ///
    /// For hosts that own their own refresh callback.
    pub fn tick<F: FnOnce()>(&self, on_frame: F) -> bool {
        if self.is_looping() {
            on_frame();
            true
        } else {
            false
        }
    }

    /// Waits for the next frame or host event.
    ///
    /// Returns `None` once the event channel is closed and drained.
    pub async fn next<E>(&mut self, events: &mut mpsc::UnboundedReceiver<E>) -> Option<Tick<E>> {
        loop {
            let wake = if self.is_looping() {
                let frame_interval = self.frame_interval;
                let ticker = self.ticker.get_or_insert_with(|| {
                    let mut ticker = tokio::time::interval(frame_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker
                });
                tokio::select! {
                    biased;
                    event = events.recv() => Wake::Event(event),
                    _ = ticker.tick() => Wake::Frame,
                }
            } else {
                if *self.state_rx.borrow_and_update() {
                    self.ticker = None;
                    continue;
                }
                tokio::select! {
                    biased;
                    event = events.recv() => Wake::Event(event),
                    _ = self.state_rx.changed() => Wake::StateChanged,
                }
            };

            match wake {
                Wake::Event(event) => return event.map(Tick::Event),
                // Paused through a handle while waiting on the ticker.
                Wake::Frame if !self.is_looping() => continue,
                Wake::Frame => return Some(Tick::Frame),
                Wake::StateChanged => {
                    if self.is_looping() {
                        self.ticker = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_only_runs_while_looping() {
        let mut looper = Looper::new(Duration::from_millis(16));
        let mut frames = 0;
        assert!(!looper.tick(|| frames += 1));

        looper.play();
        assert!(looper.tick(|| frames += 1));
        looper.toggle();
        assert!(!looper.tick(|| frames += 1));
        looper.toggle();
        assert!(looper.tick(|| frames += 1));
        assert_eq!(frames, 2);
    }

    #[test]
    fn handle_shares_play_state() {
        let looper = Looper::new(Duration::from_millis(16));
        let handle = looper.handle();
        handle.play();
        assert!(looper.is_looping());
        handle.toggle();
        assert!(!looper.is_looping());
    }

    #[tokio::test]
    async fn paused_looper_only_yields_events() {
        let mut looper = Looper::new(Duration::from_millis(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(7u32).unwrap();
        assert_eq!(looper.next(&mut rx).await, Some(Tick::Event(7)));

        drop(tx);
        assert_eq!(looper.next(&mut rx).await, None);
    }

    #[tokio::test]
    async fn playing_looper_yields_frames() {
        let mut looper = Looper::new(Duration::from_millis(1));
        let (_tx, mut rx) = mpsc::unbounded_channel::<()>();
        looper.play();
        for _ in 0..3 {
            assert_eq!(looper.next(&mut rx).await, Some(Tick::Frame));
        }
    }

    #[tokio::test]
    async fn handle_wakes_a_paused_looper() {
        let mut looper = Looper::new(Duration::from_millis(1));
        let handle = looper.handle();
        let (_tx, mut rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.play();
        });
        assert_eq!(looper.next(&mut rx).await, Some(Tick::Frame));
    }
}
