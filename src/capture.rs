// src/capture.rs - Random-access index over a recorded capture file
use crate::frame::{self, Frame};
use std::path::{Path, PathBuf};

/// What a blank or malformed line reads as.
static ABSENT: Frame = Frame {
    camera_params: None,
    gravity: None,
    pose_landmarks: None,
    pose_landmarks_stamp: None,
    pose_world_landmarks: None,
    pose_world_landmarks_stamp: None,
    face_landmarks: None,
    face_landmarks_stamp: None,
    right_hand_landmarks: None,
    right_hand_landmarks_stamp: None,
    left_hand_landmarks: None,
    left_hand_landmarks_stamp: None,
};

/// A recorded capture: one decoded frame per line plus the pose timestamp
/// (microseconds) used to pace playback.
///
/// `frames.len() == timestamps.len()` always holds.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    path: Option<PathBuf>,
    /// `None` for lines that did not decode.
    frames: Vec<Option<Frame>>,
    timestamps: Vec<u64>,
}

impl Capture {
    /// Indexes newline-delimited capture text.
    ///
    /// Frames without `pose_landmarks_stamp` inherit the previous frame's
    /// stamp (0 for the first), so the index stays non-decreasing whenever the
    /// recorded stamps are.
    pub fn build(raw_text: &str) -> Self {
        let mut capture = Self::default();
        if raw_text.is_empty() {
            return capture;
        }

        let mut last_stamp = 0;
        for line in raw_text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let frame = frame::decode_lenient(line);
            if let Some(stamp) = frame.as_ref().and_then(|f| f.pose_landmarks_stamp) {
                last_stamp = stamp;
            }
            capture.frames.push(frame);
            capture.timestamps.push(last_stamp);
        }

        capture
    }

    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        self.path = path;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame at `index`; blank or malformed lines read as all-absent.
    pub fn frame_at(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index).map(|frame| frame.as_ref().unwrap_or(&ABSENT))
    }

    /// Like [`Capture::frame_at`], but `None` for a line that did not decode.
    pub fn decoded_at(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)?.as_ref()
    }

    pub fn timestamp_at(&self, index: usize) -> Option<u64> {
        self.timestamps.get(index).copied()
    }

    #[cfg(test)]
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    pub fn begin_timestamp(&self) -> u64 {
        self.timestamps.first().copied().unwrap_or(0)
    }

    pub fn end_timestamp(&self) -> u64 {
        self.timestamps.last().copied().unwrap_or(0)
    }

    /// Recorded length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_timestamp().saturating_sub(self.begin_timestamp()) as f64 * 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_newline_is_an_empty_frame() {
        let capture = Capture::build(
            "{\"pose_landmarks_stamp\": 10}\n{\"pose_landmarks_stamp\": 20}\n",
        );
        assert_eq!(capture.len(), 3);
        assert!(capture.frame_at(2).unwrap().is_empty());
        assert_eq!(capture.decoded_at(2), None);
        assert_eq!(capture.timestamps(), &[10, 20, 20]);
    }

    #[test]
    fn test_missing_stamp_inherits_previous() {
        let capture = Capture::build(concat!(
            "{\"gravity\": [0, 1, 0]}\n",
            "{\"pose_landmarks_stamp\": 100}\n",
            "not json at all\n",
            "{\"face_landmarks_stamp\": 999}\n",
            "{\"pose_landmarks_stamp\": 250}",
        ));
        assert_eq!(capture.len(), 5);
        assert_eq!(capture.timestamps(), &[0, 100, 100, 100, 250]);
        assert_eq!(capture.begin_timestamp(), 0);
        assert_eq!(capture.end_timestamp(), 250);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let lines: Vec<String> = (0..50)
            .map(|i| {
                if i % 7 == 3 {
                    "{}".to_string()
                } else {
                    format!("{{\"pose_landmarks_stamp\": {}}}", i * 33_333)
                }
            })
            .collect();
        let capture = Capture::build(&lines.join("\n"));
        assert_eq!(capture.len(), 50);
        assert!(capture.timestamps().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_empty_object_is_a_decoded_frame() {
        let capture = Capture::build("{}\nnot json\n{\"unknown_field\": 1}");
        assert_eq!(capture.decoded_at(0), Some(&Frame::default()));
        assert_eq!(capture.decoded_at(1), None);
        assert_eq!(capture.frame_at(1), Some(&Frame::default()));
        assert_eq!(capture.decoded_at(2), Some(&Frame::default()));
        assert_eq!(capture.decoded_at(3), None);
    }

    #[test]
    fn test_crlf_lines() {
        let capture = Capture::build("{\"pose_landmarks_stamp\": 1}\r\n{\"pose_landmarks_stamp\": 2}");
        assert_eq!(capture.timestamps(), &[1, 2]);
    }

    #[test]
    fn test_empty_text_has_no_frames() {
        let capture = Capture::build("");
        assert!(capture.is_empty());
        assert_eq!(capture.frame_at(0), None);
        assert_eq!(capture.timestamp_at(0), None);
        assert_eq!(capture.duration_secs(), 0.0);
    }

    #[test]
    fn test_duration() {
        let capture = Capture::build(
            "{\"pose_landmarks_stamp\": 1000000}\n{\"pose_landmarks_stamp\": 3500000}",
        );
        assert!((capture.duration_secs() - 2.5).abs() < 1e-9);
    }
}
