// src/playback.rs - Offline playback scheduling and the live-stream gate
use crate::capture::Capture;
use crate::error::PlaybackError;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// How many due frames a single tick may consume after a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUp {
    /// At most one advance per tick; leftover time carries to later ticks.
    #[default]
    Single,
    /// Advance through every frame that is already due.
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub mode: PlaybackMode,
    pub current_index: usize,
    /// Wallclock instant that corresponds to the start of the current frame.
    pub last_tick_wallclock: Option<Instant>,
}

/// Smallest wait the scheduler accepts; a zero wait would never move the
/// anchor.
pub const MIN_WAIT_FLOOR: Duration = Duration::from_millis(1);

/// Drives which frame of a [`Capture`] is current, reproducing the recorded
/// inter-frame timing against a variable-rate render loop.
pub struct Scheduler {
    capture: Capture,
    state: PlaybackState,
    min_wait: Duration,
    catch_up: CatchUp,
}

impl Scheduler {
    pub fn new(min_wait: Duration, catch_up: CatchUp) -> Self {
        Self {
            capture: Capture::default(),
            state: PlaybackState::default(),
            min_wait: min_wait.max(MIN_WAIT_FLOOR),
            catch_up,
        }
    }

    pub fn load(&mut self, capture: Capture) {
        self.capture = capture;
        self.state = PlaybackState::default();
    }

    pub fn set_catch_up(&mut self, catch_up: CatchUp) {
        self.catch_up = catch_up;
    }

    pub fn set_min_wait(&mut self, min_wait: Duration) {
        self.min_wait = min_wait.max(MIN_WAIT_FLOOR);
    }

    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    #[cfg(test)]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.state.mode
    }

    pub fn is_playing(&self) -> bool {
        self.state.mode == PlaybackMode::Playing
    }

    pub fn total_frames(&self) -> usize {
        self.capture.len()
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.capture.is_empty()).then_some(self.state.current_index)
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.capture.frame_at(self.state.current_index)
    }

    /// The current frame, or `None` when its line was blank or malformed.
    pub fn current_payload(&self) -> Option<&Frame> {
        self.capture.decoded_at(self.state.current_index)
    }

    pub fn current_timestamp(&self) -> Option<u64> {
        self.capture.timestamp_at(self.state.current_index)
    }

    /// Jumps to `index`, clamped to the capture. Rejected while playing.
    pub fn seek(&mut self, index: usize) -> Result<usize, PlaybackError> {
        let total = self.loaded_len()?;
        self.reject_while_playing()?;

        self.state.current_index = index.min(total - 1);
        Ok(self.state.current_index)
    }

    /// Moves one frame forward or back, wrapping at both ends. Rejected
    /// while playing.
    pub fn step(&mut self, forward: bool) -> Result<usize, PlaybackError> {
        let total = self.loaded_len()?;
        self.reject_while_playing()?;

        let index = self.state.current_index;
        self.state.current_index = if forward {
            (index + 1) % total
        } else {
            (index + total - 1) % total
        };
        Ok(self.state.current_index)
    }

    /// Starts autonomous advance. `anchor` is the wallclock instant of the
    /// previous render; the current frame is considered to have started then.
    pub fn play(&mut self, anchor: Instant) -> Result<usize, PlaybackError> {
        self.loaded_len()?;
        self.reject_while_playing()?;

        self.state.mode = PlaybackMode::Playing;
        self.state.last_tick_wallclock = Some(anchor);
        Ok(self.state.current_index)
    }

    /// Freezes on the current frame. Has no effect unless playing.
    pub fn pause(&mut self) -> Result<usize, PlaybackError> {
        self.loaded_len()?;
        if self.state.mode == PlaybackMode::Playing {
            self.state.mode = PlaybackMode::Paused;
        }
        Ok(self.state.current_index)
    }

    /// Returns to frame 0 and stops.
    pub fn stop(&mut self) -> Result<usize, PlaybackError> {
        self.loaded_len()?;
        self.state = PlaybackState::default();
        Ok(0)
    }

    /// Wallclock time frame `index` stays on screen: the recorded gap to the
    /// next frame, or the minimum wait when that gap is not positive
    /// (duplicate stamps, or the wrap from last frame to first).
    pub fn frame_wait(&self, index: usize) -> Duration {
        let total = self.capture.len();
        if total == 0 {
            return self.min_wait;
        }

        let stamp_now = self.capture.timestamp_at(index % total);
        let stamp_next = self.capture.timestamp_at((index + 1) % total);
        match (stamp_now, stamp_next) {
            (Some(now), Some(next)) if next > now => Duration::from_micros(next - now),
            _ => self.min_wait,
        }
    }

    /// Called once per rendered frame. Returns the new current index when it
    /// changed.
    ///
    /// The anchor advances by the consumed frame's wait rather than jumping to
    /// `now`, so time left over from an irregular render cadence is kept and
    /// the average rate converges to the recorded one.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        if self.state.mode != PlaybackMode::Playing || self.capture.is_empty() {
            return None;
        }

        let total = self.capture.len();
        let start_index = self.state.current_index;
        let mut anchor = *self.state.last_tick_wallclock.get_or_insert(now);

        loop {
            let wait = self.frame_wait(self.state.current_index);
            if now.saturating_duration_since(anchor) <= wait {
                break;
            }

            self.state.current_index = (self.state.current_index + 1) % total;
            anchor += wait;

            if self.catch_up == CatchUp::Single {
                break;
            }
        }
        self.state.last_tick_wallclock = Some(anchor);

        (self.state.current_index != start_index).then_some(self.state.current_index)
    }

    fn loaded_len(&self) -> Result<usize, PlaybackError> {
        match self.capture.len() {
            0 => Err(PlaybackError::NoData),
            total => Ok(total),
        }
    }

    fn reject_while_playing(&self) -> Result<(), PlaybackError> {
        if self.is_playing() {
            debug!("Ignoring scrub request during playback");
            return Err(PlaybackError::Playing);
        }
        Ok(())
    }
}

/// One pushed frame from a live source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFrame {
    pub text: String,
    pub index: Option<usize>,
    pub stamp: Option<u64>,
}

/// Latest-wins slot for push sources. Each accepted push is the advance
/// event; nothing queues, so a fast producer only loses intermediate frames.
#[derive(Debug, Default)]
pub struct LiveFeed {
    accepting: bool,
    latest: Option<LiveFrame>,
    received: u64,
    dropped: u64,
}

impl LiveFeed {
    pub fn play(&mut self) {
        self.accepting = true;
    }

    pub fn stop(&mut self) {
        self.accepting = false;
        self.latest = None;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Offers a frame; returns false when the feed is stopped.
    pub fn push(&mut self, frame: LiveFrame) -> bool {
        if !self.accepting {
            return false;
        }
        self.received += 1;
        if self.latest.replace(frame).is_some() {
            self.dropped += 1;
        }
        true
    }

    pub fn take_latest(&mut self) -> Option<LiveFrame> {
        self.latest.take()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
