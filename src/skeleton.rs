// src/skeleton.rs - Reconstruction of the 3D line skeleton from one frame
use crate::frame::{landmark_at, Frame, Landmark};
use nalgebra::Vector3;
use std::collections::HashMap;

pub type Point = Vector3<f64>;

// Pose landmark indices used as anchors.
const POSE_NOSE: usize = 0;
const POSE_LEFT_WRIST: usize = 15;
const POSE_RIGHT_WRIST: usize = 16;

// Root landmark of each recentred group.
const FACE_ROOT: usize = 0;
const HAND_ROOT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineColor {
    Gray,
    Red,
    Blue,
    Green,
}

impl LineColor {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            LineColor::Gray => [0x33, 0x33, 0x33],
            LineColor::Red => [0xff, 0x00, 0x00],
            LineColor::Blue => [0x00, 0x00, 0xff],
            LineColor::Green => [0x00, 0x99, 0x00],
        }
    }
}

/// Identity of one polyline in the skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LineGroup {
    Body,
    RightArm,
    RightLeg,
    LeftArm,
    LeftLeg,

    FaceOutline,
    LipOuterLower,
    LipOuterUpper,
    LipInnerLower,
    LipInnerUpper,
    LeftEyeLower,
    LeftEyeUpper,
    LeftEyebrowLower,
    LeftEyebrowUpper,
    RightEyeLower,
    RightEyeUpper,
    RightEyebrowLower,
    RightEyebrowUpper,

    RightHandThumb,
    RightHandIndex,
    RightHandMiddle,
    RightHandRing,
    RightHandPinky,

    LeftHandThumb,
    LeftHandIndex,
    LeftHandMiddle,
    LeftHandRing,
    LeftHandPinky,
}

impl LineGroup {
    pub fn name(self) -> &'static str {
        match self {
            LineGroup::Body => "body",
            LineGroup::RightArm => "right_arm",
            LineGroup::RightLeg => "right_leg",
            LineGroup::LeftArm => "left_arm",
            LineGroup::LeftLeg => "left_leg",
            LineGroup::FaceOutline => "face_outline",
            LineGroup::LipOuterLower => "lip_outer_lower",
            LineGroup::LipOuterUpper => "lip_outer_upper",
            LineGroup::LipInnerLower => "lip_inner_lower",
            LineGroup::LipInnerUpper => "lip_inner_upper",
            LineGroup::LeftEyeLower => "left_eye_lower",
            LineGroup::LeftEyeUpper => "left_eye_upper",
            LineGroup::LeftEyebrowLower => "left_eyebrow_lower",
            LineGroup::LeftEyebrowUpper => "left_eyebrow_upper",
            LineGroup::RightEyeLower => "right_eye_lower",
            LineGroup::RightEyeUpper => "right_eye_upper",
            LineGroup::RightEyebrowLower => "right_eyebrow_lower",
            LineGroup::RightEyebrowUpper => "right_eyebrow_upper",
            LineGroup::RightHandThumb => "right_hand_thumb",
            LineGroup::RightHandIndex => "right_hand_index",
            LineGroup::RightHandMiddle => "right_hand_middle",
            LineGroup::RightHandRing => "right_hand_ring",
            LineGroup::RightHandPinky => "right_hand_pinky",
            LineGroup::LeftHandThumb => "left_hand_thumb",
            LineGroup::LeftHandIndex => "left_hand_index",
            LineGroup::LeftHandMiddle => "left_hand_middle",
            LineGroup::LeftHandRing => "left_hand_ring",
            LineGroup::LeftHandPinky => "left_hand_pinky",
        }
    }
}

/// Which landmark collection feeds a line group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Body,
    Face,
    RightHand,
    LeftHand,
}

pub struct LineDef {
    pub id: LineGroup,
    pub source: LineSource,
    pub indices: &'static [usize],
    pub color: LineColor,
}

const fn def(
    id: LineGroup,
    source: LineSource,
    indices: &'static [usize],
    color: LineColor,
) -> LineDef {
    LineDef { id, source, indices, color }
}

const BODY: &[usize] = &[11, 12, 24, 23, 11];
const RIGHT_ARM: &[usize] = &[12, 14, 16, 18, 20, 16, 22];
const RIGHT_LEG: &[usize] = &[24, 26, 28, 30, 32, 28];
const LEFT_ARM: &[usize] = &[11, 13, 15, 17, 19, 15, 21];
const LEFT_LEG: &[usize] = &[23, 25, 27, 29, 31, 27];

const FACE_OUTLINE: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377,
    152, 148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10,
];
const LIP_OUTER_LOWER: &[usize] = &[61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291];
const LIP_OUTER_UPPER: &[usize] = &[61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291];
const LIP_INNER_LOWER: &[usize] = &[78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308];
const LIP_INNER_UPPER: &[usize] = &[78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308];
const LEFT_EYE_LOWER: &[usize] = &[263, 249, 390, 373, 374, 380, 381, 382, 362];
const LEFT_EYE_UPPER: &[usize] = &[263, 466, 388, 387, 386, 385, 384, 398, 362];
const LEFT_EYEBROW_LOWER: &[usize] = &[276, 283, 282, 295, 285];
const LEFT_EYEBROW_UPPER: &[usize] = &[300, 293, 334, 296, 336];
const RIGHT_EYE_LOWER: &[usize] = &[33, 7, 163, 144, 145, 153, 154, 155, 133];
const RIGHT_EYE_UPPER: &[usize] = &[33, 246, 161, 160, 159, 158, 157, 173, 133];
const RIGHT_EYEBROW_LOWER: &[usize] = &[46, 53, 52, 65, 55];
const RIGHT_EYEBROW_UPPER: &[usize] = &[70, 63, 105, 66, 107];

const THUMB: &[usize] = &[0, 1, 2, 3, 4];
const INDEX: &[usize] = &[0, 5, 6, 7, 8];
const MIDDLE: &[usize] = &[0, 9, 10, 11, 12];
const RING: &[usize] = &[0, 13, 14, 15, 16];
const PINKY: &[usize] = &[0, 17, 18, 19, 20];

/// Every line group, its landmark source, index path and colour.
pub static GROUPS: [LineDef; 28] = [
    def(LineGroup::Body, LineSource::Body, BODY, LineColor::Gray),
    def(LineGroup::RightArm, LineSource::Body, RIGHT_ARM, LineColor::Red),
    def(LineGroup::RightLeg, LineSource::Body, RIGHT_LEG, LineColor::Red),
    def(LineGroup::LeftArm, LineSource::Body, LEFT_ARM, LineColor::Blue),
    def(LineGroup::LeftLeg, LineSource::Body, LEFT_LEG, LineColor::Blue),
    def(LineGroup::FaceOutline, LineSource::Face, FACE_OUTLINE, LineColor::Green),
    def(LineGroup::LipOuterLower, LineSource::Face, LIP_OUTER_LOWER, LineColor::Green),
    def(LineGroup::LipOuterUpper, LineSource::Face, LIP_OUTER_UPPER, LineColor::Green),
    def(LineGroup::LipInnerLower, LineSource::Face, LIP_INNER_LOWER, LineColor::Green),
    def(LineGroup::LipInnerUpper, LineSource::Face, LIP_INNER_UPPER, LineColor::Green),
    def(LineGroup::LeftEyeLower, LineSource::Face, LEFT_EYE_LOWER, LineColor::Green),
    def(LineGroup::LeftEyeUpper, LineSource::Face, LEFT_EYE_UPPER, LineColor::Green),
    def(LineGroup::LeftEyebrowLower, LineSource::Face, LEFT_EYEBROW_LOWER, LineColor::Green),
    def(LineGroup::LeftEyebrowUpper, LineSource::Face, LEFT_EYEBROW_UPPER, LineColor::Green),
    def(LineGroup::RightEyeLower, LineSource::Face, RIGHT_EYE_LOWER, LineColor::Green),
    def(LineGroup::RightEyeUpper, LineSource::Face, RIGHT_EYE_UPPER, LineColor::Green),
    def(LineGroup::RightEyebrowLower, LineSource::Face, RIGHT_EYEBROW_LOWER, LineColor::Green),
    def(LineGroup::RightEyebrowUpper, LineSource::Face, RIGHT_EYEBROW_UPPER, LineColor::Green),
    def(LineGroup::RightHandThumb, LineSource::RightHand, THUMB, LineColor::Red),
    def(LineGroup::RightHandIndex, LineSource::RightHand, INDEX, LineColor::Red),
    def(LineGroup::RightHandMiddle, LineSource::RightHand, MIDDLE, LineColor::Red),
    def(LineGroup::RightHandRing, LineSource::RightHand, RING, LineColor::Red),
    def(LineGroup::RightHandPinky, LineSource::RightHand, PINKY, LineColor::Red),
    def(LineGroup::LeftHandThumb, LineSource::LeftHand, THUMB, LineColor::Blue),
    def(LineGroup::LeftHandIndex, LineSource::LeftHand, INDEX, LineColor::Blue),
    def(LineGroup::LeftHandMiddle, LineSource::LeftHand, MIDDLE, LineColor::Blue),
    def(LineGroup::LeftHandRing, LineSource::LeftHand, RING, LineColor::Blue),
    def(LineGroup::LeftHandPinky, LineSource::LeftHand, PINKY, LineColor::Blue),
];

/// World landmarks: mirror x and y, keep depth.
pub fn world_to_scene(landmark: Landmark) -> Point {
    Vector3::new(-landmark.x, -landmark.y, landmark.z)
}

/// Image-relative landmarks: centre on the image, undo the aspect ratio
/// stretch of x and depth, mirror into the world frame.
pub fn image_to_scene(landmark: Landmark, aspect_ratio: f64) -> Point {
    Vector3::new(
        -(landmark.x - 0.5) / aspect_ratio,
        -(landmark.y - 0.5),
        -landmark.z / aspect_ratio,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
    pub center: Point,
    pub radius: f64,
}

impl Bounds {
    fn from_points(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points.iter().fold((first, first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        });
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0, f64::max);
        Some(Self { min, max, center, radius })
    }
}

/// A cached line strip. Its vertex buffer is overwritten in place on every
/// frame and never shrinks to nothing once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    points: Vec<Point>,
    color: LineColor,
    bounds: Option<Bounds>,
    revision: u64,
}

impl Polyline {
    fn new(points: Vec<Point>, color: LineColor) -> Self {
        let bounds = Bounds::from_points(&points);
        Self { points, color, bounds, revision: 0 }
    }

    fn set_points(&mut self, points: impl IntoIterator<Item = Point>) {
        self.points.clear();
        self.points.extend(points);
        self.bounds = Bounds::from_points(&self.points);
        self.revision += 1;
    }

    /// Keeps the vertex count but moves every vertex to the origin.
    fn collapse(&mut self) {
        if self.is_collapsed() {
            return;
        }
        let count = self.points.len();
        self.set_points(std::iter::repeat(Point::zeros()).take(count));
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn color(&self) -> LineColor {
        self.color
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Number of times the vertex buffer has been rewritten.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_collapsed(&self) -> bool {
        self.points.iter().all(|p| *p == Point::zeros())
    }
}

/// Polylines keyed by line group, created on first sight and kept for the
/// whole session.
#[derive(Debug, Default)]
pub struct SkeletonCache {
    lines: HashMap<LineGroup, Polyline>,
}

impl SkeletonCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: LineGroup) -> Option<&Polyline> {
        self.lines.get(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LineGroup, &Polyline)> {
        self.lines.iter().map(|(id, line)| (*id, line))
    }

    fn update(&mut self, id: LineGroup, color: LineColor, points: Vec<Point>) {
        match self.lines.get_mut(&id) {
            Some(line) => line.set_points(points),
            None => {
                self.lines.insert(id, Polyline::new(points, color));
            }
        }
    }

    fn collapse(&mut self, id: LineGroup) {
        if let Some(line) = self.lines.get_mut(&id) {
            line.collapse();
        }
    }
}

/// Body landmarks in scene space, preferring the metric world group.
#[derive(Clone, Copy)]
enum BodySource<'a> {
    World(&'a [Landmark]),
    Image(&'a [Landmark], f64),
}

impl BodySource<'_> {
    fn from_frame(frame: &Frame, aspect_ratio: f64) -> Option<BodySource<'_>> {
        match (frame.pose_world_landmarks.as_deref(), frame.pose_landmarks.as_deref()) {
            (Some(world), _) => Some(BodySource::World(world)),
            (None, Some(image)) => Some(BodySource::Image(image, aspect_ratio)),
            (None, None) => None,
        }
    }

    fn point(&self, index: usize) -> Point {
        match *self {
            BodySource::World(landmarks) => world_to_scene(landmark_at(landmarks, index)),
            BodySource::Image(landmarks, aspect) => {
                image_to_scene(landmark_at(landmarks, index), aspect)
            }
        }
    }
}

/// Turns frames into skeleton geometry inside a [`SkeletonCache`].
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor {
    pub default_aspect_ratio: f64,
    pub anchor_scale: f64,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self {
            default_aspect_ratio: 1280.0 / 720.0,
            anchor_scale: 2.0,
        }
    }
}

impl Reconstructor {
    pub fn new(default_aspect_ratio: f64, anchor_scale: f64) -> Self {
        Self { default_aspect_ratio, anchor_scale }
    }

    pub fn aspect_ratio(&self, frame: &Frame) -> f64 {
        frame
            .camera_params
            .and_then(|params| params.aspect_ratio())
            .unwrap_or(self.default_aspect_ratio)
    }

    /// Updates every line group from `frame`. Groups whose landmarks are
    /// missing collapse in place.
    pub fn reconstruct(&self, frame: &Frame, cache: &mut SkeletonCache) {
        let aspect = self.aspect_ratio(frame);
        let body = BodySource::from_frame(frame, aspect);

        let anchor = |index: usize| body.map_or_else(Point::zeros, |b| b.point(index));
        let nose = anchor(POSE_NOSE);
        let right_wrist = anchor(POSE_RIGHT_WRIST);
        let left_wrist = anchor(POSE_LEFT_WRIST);

        for group in GROUPS.iter() {
            let points: Option<Vec<Point>> = match group.source {
                LineSource::Body => body.map(|b| group.indices.iter().map(|&i| b.point(i)).collect()),
                LineSource::Face => frame.face_landmarks.as_deref().map(|landmarks| {
                    self.anchored(landmarks, FACE_ROOT, group.indices, aspect, nose)
                }),
                LineSource::RightHand => frame.right_hand_landmarks.as_deref().map(|landmarks| {
                    self.anchored(landmarks, HAND_ROOT, group.indices, aspect, right_wrist)
                }),
                LineSource::LeftHand => frame.left_hand_landmarks.as_deref().map(|landmarks| {
                    self.anchored(landmarks, HAND_ROOT, group.indices, aspect, left_wrist)
                }),
            };

            match points {
                Some(points) => cache.update(group.id, group.color, points),
                None => cache.collapse(group.id),
            }
        }
    }

    /// Recentres an image-relative group on its root landmark, scales it and
    /// moves it onto `anchor`.
    fn anchored(
        &self,
        landmarks: &[Landmark],
        root: usize,
        indices: &[usize],
        aspect: f64,
        anchor: Point,
    ) -> Vec<Point> {
        let origin = image_to_scene(landmark_at(landmarks, root), aspect);
        indices
            .iter()
            .map(|&i| {
                (image_to_scene(landmark_at(landmarks, i), aspect) - origin) * self.anchor_scale
                    + anchor
            })
            .collect()
    }
}
