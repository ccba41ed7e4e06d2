/// Geometric Angle Engine
///
/// Computes per-frame joint angles from a keypoint frame:
/// - Planar flexion angles for elbows, knees and shoulders
/// - Spatial hip flexion when the source carries depth
/// - Pelvis list/rotation as signed hip offsets
///
/// Degenerate geometry (coincident points) and missing joints yield `None`
/// for the affected feature only.
use crate::models::angles::{AngleFeature, AngleRecord};
use crate::models::keypoint::{Joint, KeypointFrame};

/// Angle ABC at vertex `b`, in degrees
pub fn angle_2d(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Option<f64> {
    let ba = [a[0] - b[0], a[1] - b[1]];
    let bc = [c[0] - b[0], c[1] - b[1]];
    vector_angle(&ba, &bc)
}

/// Angle ABC at vertex `b` in three dimensions, in degrees
pub fn angle_3d(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Option<f64> {
    let ba = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    let bc = [c[0] - b[0], c[1] - b[1], c[2] - b[2]];
    vector_angle(&ba, &bc)
}

fn vector_angle(u: &[f64], v: &[f64]) -> Option<f64> {
    let dot: f64 = u.iter().zip(v).map(|(a, b)| a * b).sum();
    let mag_u = u.iter().map(|a| a * a).sum::<f64>().sqrt();
    let mag_v = v.iter().map(|a| a * a).sum::<f64>().sqrt();

    let denominator = mag_u * mag_v;
    if denominator == 0.0 || !denominator.is_finite() || !dot.is_finite() {
        return None;
    }

    let cos_angle = (dot / denominator).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plane {
    Planar,
    Spatial,
}

/// Flexion configurations: (feature, outer point, vertex, outer point, plane)
const FLEXION_JOINTS: [(AngleFeature, Joint, Joint, Joint, Plane); 8] = [
    (AngleFeature::LeftElbowFlexion, Joint::LShoulder, Joint::LElbow, Joint::LWrist, Plane::Planar),
    (AngleFeature::RightElbowFlexion, Joint::RShoulder, Joint::RElbow, Joint::RWrist, Plane::Planar),
    (AngleFeature::LeftKneeFlexion, Joint::LHip, Joint::LKnee, Joint::LAnkle, Plane::Planar),
    (AngleFeature::RightKneeFlexion, Joint::RHip, Joint::RKnee, Joint::RAnkle, Plane::Planar),
    (AngleFeature::LeftHipFlexion, Joint::LShoulder, Joint::LHip, Joint::LKnee, Plane::Spatial),
    (AngleFeature::RightHipFlexion, Joint::RShoulder, Joint::RHip, Joint::RKnee, Plane::Spatial),
    (AngleFeature::LeftShoulderFlexion, Joint::LHip, Joint::LShoulder, Joint::LElbow, Plane::Planar),
    (AngleFeature::RightShoulderFlexion, Joint::RHip, Joint::RShoulder, Joint::RElbow, Plane::Planar),
];

/// Compute every angle feature for one frame
pub fn frame_angles(frame: &KeypointFrame) -> AngleRecord {
    let mut record = AngleRecord::default();

    for (feature, joint_a, joint_b, joint_c, plane) in FLEXION_JOINTS {
        let (Some(a), Some(b), Some(c)) = (frame.get(joint_a), frame.get(joint_b), frame.get(joint_c))
        else {
            continue;
        };

        let angle = match plane {
            Plane::Planar => angle_2d(a.xy(), b.xy(), c.xy()),
            Plane::Spatial => match (a.xyz(), b.xyz(), c.xyz()) {
                (Some(a), Some(b), Some(c)) => angle_3d(a, b, c),
                _ => None,
            },
        };
        record.set(feature, angle);
    }

    if let (Some(left), Some(right)) = (frame.get(Joint::LHip), frame.get(Joint::RHip)) {
        record.pelvis_list = Some(right.y - left.y);
        record.pelvis_rotation = Some(right.x - left.x);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::keypoint::Keypoint;
    use proptest::prelude::*;

    fn posed_frame() -> KeypointFrame {
        let mut frame = KeypointFrame::empty(0);
        let points = [
            (Joint::LShoulder, 280.0, 200.0),
            (Joint::RShoulder, 360.0, 200.0),
            (Joint::LElbow, 280.0, 300.0),
            (Joint::RElbow, 390.0, 300.0),
            (Joint::LWrist, 380.0, 300.0),
            (Joint::RWrist, 410.0, 400.0),
            (Joint::LHip, 290.0, 400.0),
            (Joint::RHip, 350.0, 404.0),
            (Joint::LKnee, 290.0, 550.0),
            (Joint::RKnee, 360.0, 550.0),
            (Joint::LAnkle, 290.0, 700.0),
            (Joint::RAnkle, 370.0, 700.0),
        ];
        for (joint, x, y) in points {
            frame.set(joint, Some(Keypoint::new(x, y).with_confidence(0.9)));
        }
        frame
    }

    #[test]
    fn test_right_angle() {
        let angle = angle_2d([0.0, 0.0], [0.0, 1.0], [1.0, 1.0]).unwrap();
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_vectors() {
        assert_eq!(angle_2d([1.0, 1.0], [1.0, 1.0], [3.0, 4.0]), None);
        assert_eq!(angle_2d([0.0, 5.0], [1.0, 1.0], [1.0, 1.0]), None);
        assert_eq!(angle_3d([1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]), None);
    }

    #[test]
    fn test_depth_changes_hip_angle() {
        let planar = angle_2d([0.0, 0.0], [0.0, 1.0], [0.0, 2.0]).unwrap();
        let spatial = angle_3d([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 2.0, 1.0]).unwrap();
        assert!((planar - 180.0).abs() < 1e-9);
        assert!((spatial - 135.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_angles_planar_features() {
        let record = frame_angles(&posed_frame());

        let left_elbow = record.left_elbow_flexion.unwrap();
        assert!((left_elbow - 90.0).abs() < 1e-9);
        let left_knee = record.left_knee_flexion.unwrap();
        assert!((left_knee - 180.0).abs() < 1e-9);
        assert!(record.left_shoulder_flexion.is_some());
        assert!(record.right_elbow_flexion.is_some());

        // No depth, so spatial hip flexion is undefined
        assert_eq!(record.left_hip_flexion, None);
        assert_eq!(record.right_hip_flexion, None);

        assert_eq!(record.pelvis_list, Some(4.0));
        assert_eq!(record.pelvis_rotation, Some(60.0));
    }

    #[test]
    fn test_frame_angles_hip_flexion_with_depth() {
        let mut frame = posed_frame();
        for joint in [Joint::LShoulder, Joint::LHip, Joint::LKnee] {
            let kp = *frame.get(joint).unwrap();
            frame.set(joint, Some(kp.with_z(0.0)));
        }
        let record = frame_angles(&frame);
        let left_hip = record.left_hip_flexion.unwrap();
        let planar = angle_2d([280.0, 200.0], [290.0, 400.0], [290.0, 550.0]).unwrap();
        assert!((left_hip - planar).abs() < 1e-9);
        assert_eq!(record.right_hip_flexion, None);
    }

    #[test]
    fn test_missing_joint_only_affects_its_features() {
        let mut frame = posed_frame();
        frame.set(Joint::LWrist, None);
        frame.set(Joint::RHip, None);

        let record = frame_angles(&frame);
        assert_eq!(record.left_elbow_flexion, None);
        assert_eq!(record.right_knee_flexion, None);
        assert_eq!(record.right_shoulder_flexion, None);
        assert_eq!(record.pelvis_list, None);
        assert_eq!(record.pelvis_rotation, None);
        assert!(record.left_knee_flexion.is_some());
        assert!(record.right_elbow_flexion.is_some());
    }

    #[test]
    fn test_empty_frame() {
        let record = frame_angles(&KeypointFrame::empty(9));
        assert_eq!(record, AngleRecord::default());
    }

    proptest! {
        #[test]
        fn prop_collinear_points_are_straight(
            ax in -1000.0..1000.0f64,
            ay in -1000.0..1000.0f64,
            dx in -100.0..100.0f64,
            dy in -100.0..100.0f64,
            t in 0.05..0.95f64,
        ) {
            prop_assume!(dx.abs() > 0.1 || dy.abs() > 0.1);
            let a = [ax, ay];
            let c = [ax + dx, ay + dy];
            let b = [ax + t * dx, ay + t * dy];
            let angle = angle_2d(a, b, c).unwrap();
            prop_assert!((angle - 180.0).abs() < 1e-2);
        }

        #[test]
        fn prop_perpendicular_vectors(
            bx in -1000.0..1000.0f64,
            by in -1000.0..1000.0f64,
            ux in -100.0..100.0f64,
            uy in -100.0..100.0f64,
            scale in 0.1..10.0f64,
        ) {
            prop_assume!(ux.abs() > 1e-2 || uy.abs() > 1e-2);
            let b = [bx, by];
            let a = [bx + ux, by + uy];
            let c = [bx - uy * scale, by + ux * scale];
            let angle = angle_2d(a, b, c).unwrap();
            prop_assert!((angle - 90.0).abs() < 1e-6);
        }

        #[test]
        fn prop_angle_is_bounded_and_symmetric(
            a in prop::array::uniform3(-500.0..500.0f64),
            b in prop::array::uniform3(-500.0..500.0f64),
            c in prop::array::uniform3(-500.0..500.0f64),
        ) {
            if let Some(angle) = angle_3d(a, b, c) {
                prop_assert!((0.0..=180.0).contains(&angle));
                let reversed = angle_3d(c, b, a).unwrap();
                prop_assert!((angle - reversed).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_coincident_vertex_is_undefined(
            a in prop::array::uniform2(-500.0..500.0f64),
            c in prop::array::uniform2(-500.0..500.0f64),
        ) {
            prop_assert_eq!(angle_2d(a, a, c), None);
            prop_assert_eq!(angle_2d(a, c, c), None);
        }
    }
}
