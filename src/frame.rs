// src/frame.rs - Decoding of one holistic tracking frame (one JSON object per line)
use crate::error::DecodeError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One estimated keypoint. Image-relative groups carry x,y in [0,1];
/// world groups carry metric scene units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub const ZERO: Landmark = Landmark { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn from_value(value: &Value) -> Self {
        Self {
            x: number(value.get("x")),
            y: number(value.get("y")),
            z: number(value.get("z")),
        }
    }
}

/// Looks up `index` in a landmark group; malformed frames with short groups
/// read as the zero landmark instead of failing.
pub fn landmark_at(group: &[Landmark], index: usize) -> Landmark {
    group.get(index).copied().unwrap_or(Landmark::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CameraParams {
    pub focal_length: f64,
    pub frame_width: f64,
    pub frame_height: f64,
}

impl CameraParams {
    fn from_value(value: &Value) -> Self {
        Self {
            focal_length: number(value.get("focal_length")),
            frame_width: number(value.get("frame_width")),
            frame_height: number(value.get("frame_height")),
        }
    }

    /// `frame_width / frame_height`, or `None` when the dimensions cannot
    /// produce a usable ratio.
    pub fn aspect_ratio(&self) -> Option<f64> {
        let ratio = self.frame_width / self.frame_height;
        if self.frame_width > 0.0 && self.frame_height > 0.0 && ratio.is_finite() {
            Some(ratio)
        } else {
            None
        }
    }
}

/// The landmark collections a frame may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkGroup {
    Pose,
    PoseWorld,
    Face,
    RightHand,
    LeftHand,
}

impl LandmarkGroup {
    pub const ALL: [LandmarkGroup; 5] = [
        LandmarkGroup::Pose,
        LandmarkGroup::PoseWorld,
        LandmarkGroup::Face,
        LandmarkGroup::RightHand,
        LandmarkGroup::LeftHand,
    ];

    pub fn field_name(self) -> &'static str {
        match self {
            LandmarkGroup::Pose => "pose_landmarks",
            LandmarkGroup::PoseWorld => "pose_world_landmarks",
            LandmarkGroup::Face => "face_landmarks",
            LandmarkGroup::RightHand => "right_hand_landmarks",
            LandmarkGroup::LeftHand => "left_hand_landmarks",
        }
    }

    pub fn stamp_name(self) -> &'static str {
        match self {
            LandmarkGroup::Pose => "pose_landmarks_stamp",
            LandmarkGroup::PoseWorld => "pose_world_landmarks_stamp",
            LandmarkGroup::Face => "face_landmarks_stamp",
            LandmarkGroup::RightHand => "right_hand_landmarks_stamp",
            LandmarkGroup::LeftHand => "left_hand_landmarks_stamp",
        }
    }
}

/// One decoded time sample. Every field is independently optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_params: Option<CameraParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<[f64; 3]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_landmarks: Option<Vec<Landmark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_landmarks_stamp: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_world_landmarks: Option<Vec<Landmark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pose_world_landmarks_stamp: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_landmarks: Option<Vec<Landmark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_landmarks_stamp: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_hand_landmarks: Option<Vec<Landmark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_hand_landmarks_stamp: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_hand_landmarks: Option<Vec<Landmark>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_hand_landmarks_stamp: Option<u64>,
}

impl Frame {
    pub fn group(&self, group: LandmarkGroup) -> Option<&[Landmark]> {
        let landmarks = match group {
            LandmarkGroup::Pose => &self.pose_landmarks,
            LandmarkGroup::PoseWorld => &self.pose_world_landmarks,
            LandmarkGroup::Face => &self.face_landmarks,
            LandmarkGroup::RightHand => &self.right_hand_landmarks,
            LandmarkGroup::LeftHand => &self.left_hand_landmarks,
        };
        landmarks.as_deref()
    }

    pub fn stamp(&self, group: LandmarkGroup) -> Option<u64> {
        match group {
            LandmarkGroup::Pose => self.pose_landmarks_stamp,
            LandmarkGroup::PoseWorld => self.pose_world_landmarks_stamp,
            LandmarkGroup::Face => self.face_landmarks_stamp,
            LandmarkGroup::RightHand => self.right_hand_landmarks_stamp,
            LandmarkGroup::LeftHand => self.left_hand_landmarks_stamp,
        }
    }

    /// True when no field at all was present.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        *self == Frame::default()
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let group = |g: LandmarkGroup| landmark_list(obj, g.field_name());
        let stamp = |g: LandmarkGroup| obj.get(g.stamp_name()).map(stamp_value);

        Self {
            camera_params: obj.get("camera_params").map(CameraParams::from_value),
            gravity: obj.get("gravity").map(|v| {
                [number(v.get(0)), number(v.get(1)), number(v.get(2))]
            }),
            pose_landmarks: group(LandmarkGroup::Pose),
            pose_landmarks_stamp: stamp(LandmarkGroup::Pose),
            pose_world_landmarks: group(LandmarkGroup::PoseWorld),
            pose_world_landmarks_stamp: stamp(LandmarkGroup::PoseWorld),
            face_landmarks: group(LandmarkGroup::Face),
            face_landmarks_stamp: stamp(LandmarkGroup::Face),
            right_hand_landmarks: group(LandmarkGroup::RightHand),
            right_hand_landmarks_stamp: stamp(LandmarkGroup::RightHand),
            left_hand_landmarks: group(LandmarkGroup::LeftHand),
            left_hand_landmarks_stamp: stamp(LandmarkGroup::LeftHand),
        }
    }
}

/// Parses one line of frame text.
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;
    Ok(Frame::from_object(obj))
}

/// Like [`decode`], but a bad frame is logged and reported as `None` so
/// playback can continue. A valid object with no known fields is still
/// `Some`.
pub fn decode_lenient(text: &str) -> Option<Frame> {
    match decode(text) {
        Ok(frame) => Some(frame),
        Err(DecodeError::Empty) => {
            debug!("Skipping blank frame line");
            None
        }
        Err(e) => {
            warn!("Failed to decode frame: {}", e);
            None
        }
    }
}

/// Serializes a frame back to its single-line wire form.
pub fn encode(frame: &Frame) -> serde_json::Result<String> {
    serde_json::to_string(frame)
}

fn number(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

fn stamp_value(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
        .unwrap_or(0)
}

fn landmark_list(obj: &Map<String, Value>, key: &str) -> Option<Vec<Landmark>> {
    match obj.get(key)? {
        Value::Array(items) => Some(items.iter().map(Landmark::from_value).collect()),
        other => {
            debug!("Ignoring {}: expected an array, got {}", key, other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(offset: f64) -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(offset + i as f64 * 0.03125, 0.5, -0.0625))
            .collect()
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let frame = decode(r#"{"pose_landmarks_stamp": 1234}"#).unwrap();
        assert_eq!(frame.pose_landmarks_stamp, Some(1234));
        assert!(frame.camera_params.is_none());
        assert!(frame.gravity.is_none());
        for group in LandmarkGroup::ALL {
            assert!(frame.group(group).is_none(), "{:?} should be absent", group);
        }
    }

    #[test]
    fn test_bad_numbers_degrade_to_zero() {
        let frame = decode(
            r#"{"camera_params": {"focal_length": "wide", "frame_width": 640},
                "gravity": [1.0, "down"],
                "face_landmarks": [{"x": 0.25, "y": null}, 7],
                "face_landmarks_stamp": "soon"}"#,
        )
        .unwrap();

        let params = frame.camera_params.unwrap();
        assert_eq!(params.focal_length, 0.0);
        assert_eq!(params.frame_width, 640.0);
        assert_eq!(params.frame_height, 0.0);
        assert_eq!(frame.gravity, Some([1.0, 0.0, 0.0]));

        let face = frame.face_landmarks.unwrap();
        assert_eq!(face[0], Landmark::new(0.25, 0.0, 0.0));
        assert_eq!(face[1], Landmark::ZERO);
        assert_eq!(frame.face_landmarks_stamp, Some(0));
    }

    #[test]
    fn test_non_array_group_is_absent() {
        let frame = decode(r#"{"right_hand_landmarks": "none"}"#).unwrap();
        assert!(frame.right_hand_landmarks.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let frame = decode(r#"{"schema": 3, "left_hand_landmarks_stamp": 5}"#).unwrap();
        assert_eq!(frame.left_hand_landmarks_stamp, Some(5));
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decode("   "), Err(DecodeError::Empty)));
        assert!(matches!(decode("{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode("[1, 2, 3]"), Err(DecodeError::NotAnObject)));
        assert_eq!(decode_lenient("{not json"), None);
        assert_eq!(decode_lenient(""), None);
        assert_eq!(decode_lenient("{\"unknown_field\": 1}"), Some(Frame::default()));
    }

    #[test]
    fn test_float_stamp_is_accepted() {
        let frame = decode(r#"{"pose_landmarks_stamp": 1500000.0}"#).unwrap();
        assert_eq!(frame.pose_landmarks_stamp, Some(1_500_000));
    }

    #[test]
    fn test_round_trip_preserves_present_fields() {
        let frame = Frame {
            camera_params: Some(CameraParams {
                focal_length: 1.5,
                frame_width: 1920.0,
                frame_height: 1080.0,
            }),
            gravity: Some([0.0, -9.75, 0.125]),
            pose_world_landmarks: Some(
                (0..33).map(|i| Landmark::new(i as f64 * 0.125, -0.375, 0.0625)).collect(),
            ),
            pose_world_landmarks_stamp: Some(42),
            pose_landmarks_stamp: Some(41),
            right_hand_landmarks: Some(hand(0.25)),
            left_hand_landmarks: Some(hand(0.5)),
            ..Default::default()
        };

        let text = encode(&frame).unwrap();
        assert!(!text.contains('\n'));
        assert!(!text.contains("face_landmarks"));
        assert_eq!(decode(&text).unwrap(), frame);
    }

    #[test]
    fn test_aspect_ratio() {
        let params = CameraParams { focal_length: 1.0, frame_width: 1280.0, frame_height: 720.0 };
        assert!((params.aspect_ratio().unwrap() - 1280.0 / 720.0).abs() < 1e-12);

        let degenerate = CameraParams { focal_length: 1.0, frame_width: 1280.0, frame_height: 0.0 };
        assert_eq!(degenerate.aspect_ratio(), None);
    }

    #[test]
    fn test_landmark_at_out_of_range() {
        let group = vec![Landmark::new(1.0, 2.0, 3.0)];
        assert_eq!(landmark_at(&group, 0), Landmark::new(1.0, 2.0, 3.0));
        assert_eq!(landmark_at(&group, 5), Landmark::ZERO);
    }
}
