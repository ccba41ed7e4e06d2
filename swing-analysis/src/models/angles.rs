use serde::{Deserialize, Serialize};

/// Per-frame angle features, in output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AngleFeature {
    LeftElbowFlexion,
    RightElbowFlexion,
    LeftKneeFlexion,
    RightKneeFlexion,
    LeftHipFlexion,
    RightHipFlexion,
    LeftShoulderFlexion,
    RightShoulderFlexion,
    PelvisList,
    PelvisRotation,
}

impl AngleFeature {
    pub const ALL: [AngleFeature; 10] = [
        AngleFeature::LeftElbowFlexion,
        AngleFeature::RightElbowFlexion,
        AngleFeature::LeftKneeFlexion,
        AngleFeature::RightKneeFlexion,
        AngleFeature::LeftHipFlexion,
        AngleFeature::RightHipFlexion,
        AngleFeature::LeftShoulderFlexion,
        AngleFeature::RightShoulderFlexion,
        AngleFeature::PelvisList,
        AngleFeature::PelvisRotation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftElbowFlexion => "left_elbow_flexion",
            Self::RightElbowFlexion => "right_elbow_flexion",
            Self::LeftKneeFlexion => "left_knee_flexion",
            Self::RightKneeFlexion => "right_knee_flexion",
            Self::LeftHipFlexion => "left_hip_flexion",
            Self::RightHipFlexion => "right_hip_flexion",
            Self::LeftShoulderFlexion => "left_shoulder_flexion",
            Self::RightShoulderFlexion => "right_shoulder_flexion",
            Self::PelvisList => "pelvis_list",
            Self::PelvisRotation => "pelvis_rotation",
        }
    }

    /// Pelvis features are signed offsets, not angles
    pub fn is_angle(self) -> bool {
        !matches!(self, Self::PelvisList | Self::PelvisRotation)
    }
}

/// Angle values for one frame. Flexion angles are degrees in [0, 180].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AngleRecord {
    pub left_elbow_flexion: Option<f64>,
    pub right_elbow_flexion: Option<f64>,
    pub left_knee_flexion: Option<f64>,
    pub right_knee_flexion: Option<f64>,
    pub left_hip_flexion: Option<f64>,
    pub right_hip_flexion: Option<f64>,
    pub left_shoulder_flexion: Option<f64>,
    pub right_shoulder_flexion: Option<f64>,
    pub pelvis_list: Option<f64>,
    pub pelvis_rotation: Option<f64>,
}

impl AngleRecord {
    pub fn get(&self, feature: AngleFeature) -> Option<f64> {
        match feature {
            AngleFeature::LeftElbowFlexion => self.left_elbow_flexion,
            AngleFeature::RightElbowFlexion => self.right_elbow_flexion,
            AngleFeature::LeftKneeFlexion => self.left_knee_flexion,
            AngleFeature::RightKneeFlexion => self.right_knee_flexion,
            AngleFeature::LeftHipFlexion => self.left_hip_flexion,
            AngleFeature::RightHipFlexion => self.right_hip_flexion,
            AngleFeature::LeftShoulderFlexion => self.left_shoulder_flexion,
            AngleFeature::RightShoulderFlexion => self.right_shoulder_flexion,
            AngleFeature::PelvisList => self.pelvis_list,
            AngleFeature::PelvisRotation => self.pelvis_rotation,
        }
    }

    pub fn set(&mut self, feature: AngleFeature, value: Option<f64>) {
        let slot = match feature {
            AngleFeature::LeftElbowFlexion => &mut self.left_elbow_flexion,
            AngleFeature::RightElbowFlexion => &mut self.right_elbow_flexion,
            AngleFeature::LeftKneeFlexion => &mut self.left_knee_flexion,
            AngleFeature::RightKneeFlexion => &mut self.right_knee_flexion,
            AngleFeature::LeftHipFlexion => &mut self.left_hip_flexion,
            AngleFeature::RightHipFlexion => &mut self.right_hip_flexion,
            AngleFeature::LeftShoulderFlexion => &mut self.left_shoulder_flexion,
            AngleFeature::RightShoulderFlexion => &mut self.right_shoulder_flexion,
            AngleFeature::PelvisList => &mut self.pelvis_list,
            AngleFeature::PelvisRotation => &mut self.pelvis_rotation,
        };
        *slot = value;
    }

    pub fn defined_count(&self) -> usize {
        AngleFeature::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }
}
