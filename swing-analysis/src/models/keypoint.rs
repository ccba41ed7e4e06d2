/// Keypoint data structures
///
/// This module provides the canonical 17-joint skeleton, per-frame keypoint
/// sets with explicit absence, and the keypoint table produced from a CSV.
use serde::{Deserialize, Serialize};

pub const JOINT_COUNT: usize = 17;

/// COCO17 joints in canonical index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Joint {
    Nose = 0,
    LEye = 1,
    REye = 2,
    LEar = 3,
    REar = 4,
    LShoulder = 5,
    RShoulder = 6,
    LElbow = 7,
    RElbow = 8,
    LWrist = 9,
    RWrist = 10,
    LHip = 11,
    RHip = 12,
    LKnee = 13,
    RKnee = 14,
    LAnkle = 15,
    RAnkle = 16,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Nose,
        Joint::LEye,
        Joint::REye,
        Joint::LEar,
        Joint::REar,
        Joint::LShoulder,
        Joint::RShoulder,
        Joint::LElbow,
        Joint::RElbow,
        Joint::LWrist,
        Joint::RWrist,
        Joint::LHip,
        Joint::RHip,
        Joint::LKnee,
        Joint::RKnee,
        Joint::LAnkle,
        Joint::RAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Column prefix used by the named CSV layout (e.g. `LShoulder_x`)
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "Nose",
            Self::LEye => "LEye",
            Self::REye => "REye",
            Self::LEar => "LEar",
            Self::REar => "REar",
            Self::LShoulder => "LShoulder",
            Self::RShoulder => "RShoulder",
            Self::LElbow => "LElbow",
            Self::RElbow => "RElbow",
            Self::LWrist => "LWrist",
            Self::RWrist => "RWrist",
            Self::LHip => "LHip",
            Self::RHip => "RHip",
            Self::LKnee => "LKnee",
            Self::RKnee => "RKnee",
            Self::LAnkle => "LAnkle",
            Self::RAnkle => "RAnkle",
        }
    }
}

/// Canonical skeleton edges as pairs of joint indices
pub const COCO_CONNECTIONS: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    (5, 11),
    (6, 12),
    (11, 12),
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

/// A detected keypoint. Undetected joints are never represented by a
/// `Keypoint`; they are `None` in the owning frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    /// Depth, when the source provides one
    pub z: Option<f64>,
    pub confidence: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            confidence: None,
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = z.is_finite().then_some(z);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Apply the detection rules to raw column values.
    ///
    /// Returns `None` when the confidence is at or below `cutoff`, when x or y
    /// is not finite, or when the point sits exactly at (0, 0). A NaN
    /// confidence does not mark the point missing on its own.
    pub fn from_raw(x: f64, y: f64, z: Option<f64>, confidence: f64, cutoff: f64) -> Option<Self> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if x == 0.0 && y == 0.0 {
            return None;
        }
        if !confidence.is_nan() && confidence <= cutoff {
            return None;
        }

        let mut keypoint = Self::new(x, y);
        if !confidence.is_nan() {
            keypoint.confidence = Some(confidence);
        }
        if let Some(z) = z {
            keypoint = keypoint.with_z(z);
        }
        Some(keypoint)
    }

    pub fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn xyz(&self) -> Option<[f64; 3]> {
        self.z.map(|z| [self.x, self.y, z])
    }
}

/// One frame of the skeleton
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointFrame {
    pub frame: i64,
    joints: [Option<Keypoint>; JOINT_COUNT],
}

impl KeypointFrame {
    /// A frame with every joint absent
    pub fn empty(frame: i64) -> Self {
        Self {
            frame,
            joints: [None; JOINT_COUNT],
        }
    }

    pub fn new(frame: i64, joints: [Option<Keypoint>; JOINT_COUNT]) -> Self {
        Self { frame, joints }
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.joints[joint.index()].as_ref()
    }

    pub fn set(&mut self, joint: Joint, keypoint: Option<Keypoint>) {
        self.joints[joint.index()] = keypoint;
    }

    pub fn joints(&self) -> &[Option<Keypoint>; JOINT_COUNT] {
        &self.joints
    }

    pub fn detected_count(&self) -> usize {
        self.joints.iter().filter(|kp| kp.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.detected_count() == 0
    }
}

/// Whether coordinates are fractions of the frame size or absolute pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    Normalized,
    Pixel,
}

impl CoordinateSpace {
    /// Map a coordinate into pixel space for a frame of the given size
    pub fn to_pixel(self, x: f64, y: f64, width: u32, height: u32) -> (f64, f64) {
        match self {
            CoordinateSpace::Normalized => (x * width as f64, y * height as f64),
            CoordinateSpace::Pixel => (x, y),
        }
    }
}

/// The two supported keypoint CSV layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointSchema {
    /// `x_i`, `y_i`, `score_i` (and optionally `z_i`) for i in 0..17
    Indexed { has_depth: bool },
    /// `{Joint}_x`, `{Joint}_y`, `{Joint}_c`
    Named,
}

impl KeypointSchema {
    pub fn x_column(&self, joint: Joint) -> String {
        match self {
            Self::Indexed { .. } => format!("x_{}", joint.index()),
            Self::Named => format!("{}_x", joint.name()),
        }
    }

    pub fn y_column(&self, joint: Joint) -> String {
        match self {
            Self::Indexed { .. } => format!("y_{}", joint.index()),
            Self::Named => format!("{}_y", joint.name()),
        }
    }

    pub fn confidence_column(&self, joint: Joint) -> String {
        match self {
            Self::Indexed { .. } => format!("score_{}", joint.index()),
            Self::Named => format!("{}_c", joint.name()),
        }
    }

    pub fn z_column(&self, joint: Joint) -> Option<String> {
        match self {
            Self::Indexed { has_depth: true } => Some(format!("z_{}", joint.index())),
            _ => None,
        }
    }

    pub fn has_depth(&self) -> bool {
        matches!(self, Self::Indexed { has_depth: true })
    }

    /// Header row for writing a table in this layout
    pub fn headers(&self) -> Vec<String> {
        let mut headers = Vec::with_capacity(JOINT_COUNT * 4);
        match self {
            Self::Named => {
                for joint in Joint::ALL {
                    headers.push(self.x_column(joint));
                    headers.push(self.y_column(joint));
                    headers.push(self.confidence_column(joint));
                }
            }
            Self::Indexed { .. } => {
                for joint in Joint::ALL {
                    headers.push(self.x_column(joint));
                }
                for joint in Joint::ALL {
                    headers.push(self.y_column(joint));
                }
                for joint in Joint::ALL {
                    headers.push(self.confidence_column(joint));
                }
                for joint in Joint::ALL {
                    if let Some(z) = self.z_column(joint) {
                        headers.push(z);
                    }
                }
            }
        }
        headers
    }
}

/// Keypoints for a whole video, one frame per row in row order
#[derive(Debug, Clone)]
pub struct KeypointTable {
    pub schema: KeypointSchema,
    pub space: CoordinateSpace,
    pub frames: Vec<KeypointFrame>,
}

impl KeypointTable {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeypointFrame> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_indices_round_trip() {
        for (i, joint) in Joint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
            assert_eq!(Joint::from_index(i), Some(*joint));
        }
        assert_eq!(Joint::from_index(17), None);
        assert_eq!(Joint::RAnkle.name(), "RAnkle");
    }

    #[test]
    fn test_from_raw_missing_markers() {
        assert!(Keypoint::from_raw(0.0, 0.0, None, 0.9, 0.01).is_none());
        assert!(Keypoint::from_raw(f64::NAN, 10.0, None, 0.9, 0.01).is_none());
        assert!(Keypoint::from_raw(10.0, f64::INFINITY, None, 0.9, 0.01).is_none());
        assert!(Keypoint::from_raw(10.0, 10.0, None, 0.01, 0.01).is_none());
        assert!(Keypoint::from_raw(10.0, 10.0, None, 0.0, 0.01).is_none());
    }

    #[test]
    fn test_from_raw_valid_points() {
        let kp = Keypoint::from_raw(0.0, 12.5, Some(0.3), 0.8, 0.01).unwrap();
        assert_eq!(kp.xy(), [0.0, 12.5]);
        assert_eq!(kp.xyz(), Some([0.0, 12.5, 0.3]));
        assert_eq!(kp.confidence, Some(0.8));

        // NaN confidence alone does not hide a point
        let kp = Keypoint::from_raw(4.0, 5.0, Some(f64::NAN), f64::NAN, 0.01).unwrap();
        assert_eq!(kp.confidence, None);
        assert_eq!(kp.z, None);
    }

    #[test]
    fn test_frame_access() {
        let mut frame = KeypointFrame::empty(3);
        assert!(frame.is_empty());
        frame.set(Joint::LHip, Some(Keypoint::new(1.0, 2.0)));
        assert_eq!(frame.detected_count(), 1);
        assert_eq!(frame.get(Joint::LHip).map(|kp| kp.x), Some(1.0));
        assert!(frame.get(Joint::RHip).is_none());
    }

    #[test]
    fn test_schema_columns() {
        let indexed = KeypointSchema::Indexed { has_depth: true };
        assert_eq!(indexed.x_column(Joint::LWrist), "x_9");
        assert_eq!(indexed.confidence_column(Joint::LWrist), "score_9");
        assert_eq!(indexed.z_column(Joint::LWrist).as_deref(), Some("z_9"));
        assert_eq!(indexed.headers().len(), 68);

        let named = KeypointSchema::Named;
        assert_eq!(named.y_column(Joint::RKnee), "RKnee_y");
        assert_eq!(named.confidence_column(Joint::RKnee), "RKnee_c");
        assert_eq!(named.z_column(Joint::RKnee), None);
        assert_eq!(&named.headers()[..3], &["Nose_x", "Nose_y", "Nose_c"]);
    }

    #[test]
    fn test_to_pixel() {
        assert_eq!(
            CoordinateSpace::Normalized.to_pixel(0.5, 0.25, 640, 480),
            (320.0, 120.0)
        );
        assert_eq!(
            CoordinateSpace::Pixel.to_pixel(320.0, 120.0, 640, 480),
            (320.0, 120.0)
        );
    }
}
