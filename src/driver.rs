// src/driver.rs - Per-refresh glue between playback and reconstruction
use crate::capture::Capture;
use crate::error::PlaybackError;
use crate::frame::{self, Frame};
use crate::playback::{CatchUp, LiveFeed, LiveFrame, PlaybackMode, Scheduler};
use crate::settings::Settings;
use crate::skeleton::{Reconstructor, SkeletonCache};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where displayed frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    #[default]
    Offline,
    Live,
}

/// The most recent frame received from a live source.
#[derive(Debug, Clone, Default)]
pub struct LiveSample {
    pub frame: Frame,
    pub index: Option<usize>,
    pub stamp: Option<u64>,
}

/// Owns the scheduler, the live gate and the skeleton cache, and decides once
/// per rendered frame whether the skeleton needs rebuilding.
pub struct RenderDriver {
    scheduler: Scheduler,
    live: LiveFeed,
    cache: SkeletonCache,
    reconstructor: Reconstructor,
    source: SourceMode,
    dirty: bool,
    last_render: Option<Instant>,
    live_sample: Option<LiveSample>,
    /// Index most recently reached by autonomous playback, not yet replayed.
    played: Option<usize>,
}

impl RenderDriver {
    pub fn new(reconstructor: Reconstructor, min_wait: Duration, catch_up: CatchUp) -> Self {
        Self {
            scheduler: Scheduler::new(min_wait, catch_up),
            live: LiveFeed::default(),
            cache: SkeletonCache::new(),
            reconstructor,
            source: SourceMode::Offline,
            dirty: false,
            last_render: None,
            live_sample: None,
            played: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.reconstructor(), settings.min_frame_wait(), settings.catch_up)
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.reconstructor = settings.reconstructor();
        self.scheduler.set_catch_up(settings.catch_up);
        self.scheduler.set_min_wait(settings.min_frame_wait());
        self.dirty = true;
    }

    pub fn load_capture(&mut self, capture: Capture) {
        info!(
            "Capture ready: {} frames, {:.3} sec",
            capture.len(),
            capture.duration_secs()
        );
        self.live.stop();
        self.source = SourceMode::Offline;
        self.scheduler.load(capture);
        self.played = None;
        self.dirty = true;
    }

    pub fn source(&self) -> SourceMode {
        self.source
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn live_feed(&self) -> &LiveFeed {
        &self.live
    }

    pub fn cache(&self) -> &SkeletonCache {
        &self.cache
    }

    pub fn capture(&self) -> &Capture {
        self.scheduler.capture()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.scheduler.mode()
    }

    pub fn is_playing(&self) -> bool {
        match self.source {
            SourceMode::Offline => self.scheduler.is_playing(),
            SourceMode::Live => self.live.is_accepting(),
        }
    }

    /// The frame the skeleton currently shows.
    pub fn current_frame(&self) -> Option<&Frame> {
        match self.source {
            SourceMode::Offline => self.scheduler.current_frame(),
            SourceMode::Live => self.live_sample.as_ref().map(|s| &s.frame),
        }
    }

    /// Start-playback request. With `reset` the capture is rewound first.
    pub fn start_playback(&mut self, reset: bool, now: Instant) -> Result<usize, PlaybackError> {
        if reset && !self.scheduler.is_playing() {
            self.rewind()?;
        }
        // The current frame is taken to have begun at the last render.
        let anchor = self.last_render.unwrap_or(now);
        let index = self.scheduler.play(anchor)?;
        debug!("Playback started at frame {}", index);
        Ok(index)
    }

    /// Start-step request. With `reset` the capture is rewound first.
    pub fn start_step(&mut self, forward: bool, reset: bool) -> Result<usize, PlaybackError> {
        if reset && !self.scheduler.is_playing() {
            self.rewind()?;
        }
        let index = self.scheduler.step(forward)?;
        self.dirty = true;
        Ok(index)
    }

    pub fn seek(&mut self, index: usize) -> Result<usize, PlaybackError> {
        let index = self.scheduler.seek(index)?;
        self.dirty = true;
        Ok(index)
    }

    pub fn pause(&mut self) -> Result<usize, PlaybackError> {
        self.scheduler.pause()
    }

    pub fn stop(&mut self) -> Result<usize, PlaybackError> {
        let index = self.scheduler.stop()?;
        self.dirty = true;
        Ok(index)
    }

    fn rewind(&mut self) -> Result<(), PlaybackError> {
        self.scheduler.stop()?;
        self.dirty = true;
        Ok(())
    }

    /// Switches to the live source and starts accepting pushed frames.
    pub fn begin_live(&mut self) {
        if self.scheduler.is_playing() {
            let _ = self.scheduler.pause();
        }
        self.source = SourceMode::Live;
        self.live.play();
    }

    pub fn end_live(&mut self) {
        self.live.stop();
    }

    /// Stops accepting pushed frames and shows the loaded capture again.
    pub fn leave_live(&mut self) {
        self.live.stop();
        if self.source == SourceMode::Live {
            self.source = SourceMode::Offline;
            self.dirty = true;
        }
    }

    /// Offers one pushed frame. Ignored unless the live source is accepting.
    pub fn push_live(&mut self, frame: LiveFrame) -> bool {
        if self.source != SourceMode::Live {
            debug!("Dropping live frame while showing a capture");
            return false;
        }
        self.live.push(frame)
    }

    /// Called once per rendered frame. Returns true when the skeleton was
    /// rebuilt.
    pub fn tick(&mut self, now: Instant) -> bool {
        let rebuilt = match self.source {
            SourceMode::Offline => {
                let advanced = self.scheduler.tick(now);
                if advanced.is_some() {
                    self.played = advanced;
                }
                let dirty = std::mem::take(&mut self.dirty);
                // Blank or malformed lines keep the previous skeleton.
                match self.scheduler.current_payload() {
                    Some(frame) if advanced.is_some() || dirty => {
                        self.reconstructor.reconstruct(frame, &mut self.cache);
                        true
                    }
                    _ => false,
                }
            }
            SourceMode::Live => match self.live.take_latest() {
                Some(pushed) => {
                    let decoded = frame::decode_lenient(&pushed.text);
                    if let Some(frame) = &decoded {
                        self.reconstructor.reconstruct(frame, &mut self.cache);
                    }
                    let rebuilt = decoded.is_some();
                    self.live_sample = Some(LiveSample {
                        frame: decoded.unwrap_or_default(),
                        index: pushed.index,
                        stamp: pushed.stamp,
                    });
                    rebuilt
                }
                None => false,
            },
        };

        self.last_render = Some(now);
        rebuilt
    }

    /// The frame playback most recently advanced to, once. Only decoded
    /// frames are returned; with drain catch-up only the last of a burst is.
    pub fn take_played(&mut self) -> Option<&Frame> {
        let index = self.played.take()?;
        self.scheduler.capture().decoded_at(index)
    }

    /// `frames: i/N, timestamp: t/T [sec]` for the displayed frame.
    pub fn position_text(&self) -> Option<String> {
        match self.source {
            SourceMode::Offline => {
                let capture = self.scheduler.capture();
                let index = self.scheduler.current_index()?;
                let begin = capture.begin_timestamp();
                let stamp = self.scheduler.current_timestamp().unwrap_or(begin);
                Some(format!(
                    "frames: {}/{}, timestamp: {:.3}/{:.3} [sec]",
                    index,
                    self.scheduler.total_frames(),
                    stamp.saturating_sub(begin) as f64 * 1e-6,
                    capture.duration_secs(),
                ))
            }
            SourceMode::Live => {
                let sample = self.live_sample.as_ref()?;
                let index = sample.index.map_or_else(|| "-".to_string(), |i| i.to_string());
                let stamp = sample
                    .stamp
                    .or(sample.frame.pose_landmarks_stamp)
                    .map_or_else(|| "-".to_string(), |s| format!("{:.3}", s as f64 * 1e-6));
                Some(format!("frames: {}, timestamp: {} [sec]", index, stamp))
            }
        }
    }

    /// `total_frames: N, total length: T sec` for the loaded capture.
    pub fn summary_text(&self) -> Option<String> {
        let capture = self.scheduler.capture();
        if capture.is_empty() {
            return None;
        }
        Some(format!(
            "total_frames: {}, total length: {} sec",
            capture.len(),
            capture.duration_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::LineGroup;

    const MIN_WAIT: Duration = Duration::from_millis(100);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn driver() -> RenderDriver {
        RenderDriver::new(Reconstructor::default(), MIN_WAIT, CatchUp::Single)
    }

    fn frame_text(stamp: u64, x: f64) -> String {
        let landmark = format!("{{\"x\": {}, \"y\": 0, \"z\": 0}}", x);
        let landmarks = vec![landmark; 33].join(", ");
        format!(
            "{{\"pose_landmarks_stamp\": {}, \"pose_world_landmarks\": [{}]}}",
            stamp, landmarks
        )
    }

    fn capture() -> Capture {
        let lines: Vec<String> = (0..4).map(|i| frame_text(i * 100_000, i as f64)).collect();
        Capture::build(&lines.join("\n"))
    }

    fn body_x(driver: &RenderDriver) -> f64 {
        driver.cache().get(LineGroup::Body).unwrap().points()[0].x
    }

    #[test]
    fn test_tick_without_data_does_nothing() {
        let mut driver = driver();
        assert!(!driver.tick(Instant::now()));
        assert!(driver.cache().is_empty());
        assert_eq!(driver.start_playback(false, Instant::now()), Err(PlaybackError::NoData));
        assert_eq!(driver.position_text(), None);
    }

    #[test]
    fn test_load_rebuilds_once() {
        let mut driver = driver();
        driver.load_capture(capture());
        let now = Instant::now();
        assert!(driver.tick(now));
        assert!(!driver.cache().is_empty());
        assert!(!driver.tick(now + ms(5)));
    }

    #[test]
    fn test_step_and_seek_rebuild() {
        let mut driver = driver();
        driver.load_capture(capture());
        let now = Instant::now();
        driver.tick(now);

        assert_eq!(driver.start_step(true, false), Ok(1));
        assert!(driver.tick(now + ms(1)));
        assert_eq!(driver.seek(10), Ok(3));
        assert!(driver.tick(now + ms(2)));
        assert_eq!(driver.scheduler().current_index(), Some(3));
    }

    #[test]
    fn test_playback_anchors_on_previous_render() {
        let mut driver = driver();
        driver.load_capture(capture());
        let base = Instant::now();
        driver.tick(base);

        driver.start_playback(false, base + ms(30)).unwrap();
        assert_eq!(driver.scheduler().state().last_tick_wallclock, Some(base));

        assert!(!driver.tick(base + ms(60)));
        assert!(driver.tick(base + ms(101)));
        assert_eq!(driver.scheduler().current_index(), Some(1));
    }

    #[test]
    fn test_scrub_rejected_during_playback() {
        let mut driver = driver();
        driver.load_capture(capture());
        let base = Instant::now();
        driver.tick(base);
        driver.start_playback(false, base).unwrap();

        assert_eq!(driver.start_step(true, false), Err(PlaybackError::Playing));
        assert_eq!(driver.seek(2), Err(PlaybackError::Playing));
        assert!(!driver.tick(base + ms(10)));
        assert_eq!(driver.scheduler().current_index(), Some(0));
    }

    #[test]
    fn test_reset_flag_rewinds_before_play() {
        let mut driver = driver();
        driver.load_capture(capture());
        driver.seek(2).unwrap();
        driver.pause().unwrap();

        let now = Instant::now();
        assert_eq!(driver.start_playback(true, now), Ok(0));
        assert!(driver.is_playing());
        assert_eq!(driver.start_step(false, true), Err(PlaybackError::Playing));
    }

    #[test]
    fn test_stop_redraws_first_frame() {
        let mut driver = driver();
        driver.load_capture(capture());
        let now = Instant::now();
        driver.seek(3).unwrap();
        driver.tick(now);
        assert_eq!(body_x(&driver), -3.0);

        driver.stop().unwrap();
        assert!(driver.tick(now + ms(1)));
        assert_eq!(body_x(&driver), 0.0);
    }

    #[test]
    fn test_live_frames_latest_wins() {
        let mut driver = driver();
        let frame = |x: f64| LiveFrame { text: frame_text(5, x), index: None, stamp: None };

        assert!(!driver.push_live(frame(1.0)));

        driver.begin_live();
        assert!(driver.is_playing());
        assert!(driver.push_live(frame(1.0)));
        assert!(driver.push_live(frame(2.0)));
        assert!(driver.tick(Instant::now()));
        assert_eq!(body_x(&driver), -2.0);
        assert_eq!(driver.live_feed().dropped(), 1);
        assert!(!driver.tick(Instant::now()));

        driver.end_live();
        assert!(!driver.push_live(frame(3.0)));
        assert!(!driver.tick(Instant::now()));
        assert_eq!(body_x(&driver), -2.0);
    }

    #[test]
    fn test_malformed_live_frame_keeps_skeleton() {
        let mut driver = driver();
        driver.begin_live();
        driver.push_live(LiveFrame { text: frame_text(5, 1.0), index: Some(0), stamp: Some(5) });
        driver.tick(Instant::now());

        driver.push_live(LiveFrame { text: "{broken".to_string(), index: Some(1), stamp: None });
        assert!(!driver.tick(Instant::now()));
        assert_eq!(body_x(&driver), -1.0);
    }

    #[test]
    fn test_empty_object_collapses_previous_skeleton() {
        let mut driver = driver();
        let text = [frame_text(0, 1.0), "{}".to_string(), "not json".to_string()].join("\n");
        driver.load_capture(Capture::build(&text));
        let now = Instant::now();
        assert!(driver.tick(now));
        assert_eq!(body_x(&driver), -1.0);

        driver.seek(1).unwrap();
        assert!(driver.tick(now + ms(1)));
        assert!(driver.cache().get(LineGroup::Body).unwrap().is_collapsed());

        driver.seek(0).unwrap();
        driver.tick(now + ms(2));
        driver.seek(2).unwrap();
        assert!(!driver.tick(now + ms(3)));
        assert_eq!(body_x(&driver), -1.0);
    }

    #[test]
    fn test_played_frames_are_reported_once() {
        let mut driver = driver();
        driver.load_capture(capture());
        let base = Instant::now();
        driver.tick(base);
        assert!(driver.take_played().is_none());

        driver.seek(1).unwrap();
        driver.tick(base + ms(1));
        assert!(driver.take_played().is_none());

        driver.start_playback(false, base + ms(1)).unwrap();
        assert!(driver.tick(base + ms(102)));
        let played = driver.take_played().cloned().unwrap();
        assert_eq!(played.pose_landmarks_stamp, Some(200_000));
        assert!(driver.take_played().is_none());
    }

    #[test]
    fn test_leaving_live_returns_to_capture() {
        let mut driver = driver();
        driver.load_capture(capture());
        let now = Instant::now();
        driver.tick(now);

        driver.begin_live();
        driver.push_live(LiveFrame { text: frame_text(5, 9.0), index: None, stamp: None });
        driver.tick(now + ms(1));
        assert_eq!(body_x(&driver), -9.0);

        driver.leave_live();
        assert_eq!(driver.source(), SourceMode::Offline);
        assert!(!driver.live_feed().is_accepting());
        assert!(driver.tick(now + ms(2)));
        assert_eq!(body_x(&driver), 0.0);
    }

    #[test]
    fn test_loading_capture_leaves_live_mode() {
        let mut driver = driver();
        driver.begin_live();
        driver.load_capture(capture());
        assert_eq!(driver.source(), SourceMode::Offline);
        assert!(!driver.live_feed().is_accepting());
        assert!(driver.tick(Instant::now()));
    }

    #[test]
    fn test_position_and_summary_text() {
        let mut driver = driver();
        assert_eq!(driver.summary_text(), None);

        driver.load_capture(capture());
        driver.seek(2).unwrap();
        assert_eq!(
            driver.position_text().as_deref(),
            Some("frames: 2/4, timestamp: 0.200/0.300 [sec]")
        );
        assert_eq!(
            driver.summary_text().as_deref(),
            Some("total_frames: 4, total length: 0.3 sec")
        );

        driver.begin_live();
        driver.push_live(LiveFrame { text: frame_text(1_500_000, 0.0), index: Some(7), stamp: None });
        driver.tick(Instant::now());
        assert_eq!(
            driver.position_text().as_deref(),
            Some("frames: 7, timestamp: 1.500 [sec]")
        );
    }
}
