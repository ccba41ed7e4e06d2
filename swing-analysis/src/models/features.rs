use super::angles::{AngleFeature, AngleRecord};
use super::com::ComPoint;

/// Number of numeric features carried per frame: the angle features plus
/// the three COM axes.
pub const FEATURE_COUNT: usize = 13;

/// Angle and COM values for one frame index
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureRow {
    pub frame: i64,
    pub angles: AngleRecord,
    pub com: ComPoint,
}

impl FeatureRow {
    pub fn new(frame: i64, angles: AngleRecord, com: ComPoint) -> Self {
        Self { frame, angles, com }
    }

    /// Feature values in a fixed order: angle features, then com x/y/z
    pub fn values(&self) -> [Option<f64>; FEATURE_COUNT] {
        let mut values = [None; FEATURE_COUNT];
        for (slot, feature) in values.iter_mut().zip(AngleFeature::ALL) {
            *slot = self.angles.get(feature);
        }
        let com = self.com.axes();
        values[10..].copy_from_slice(&com);
        values
    }

    pub fn from_values(frame: i64, values: [Option<f64>; FEATURE_COUNT]) -> Self {
        let mut angles = AngleRecord::default();
        for (feature, value) in AngleFeature::ALL.iter().zip(values) {
            angles.set(*feature, value);
        }
        let com = ComPoint::from_axes([values[10], values[11], values[12]]);
        Self { frame, angles, com }
    }
}
