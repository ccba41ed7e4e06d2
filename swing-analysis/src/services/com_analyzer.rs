/// COM Stability Analyzer
///
/// Approximates the center of mass as the centroid of eight torso and leg
/// joints, then scores how much it moves over the swing:
/// - Per-frame centroid with per-axis missing-value handling
/// - Global per-axis mean, population standard deviation and range
/// - Per-frame deviation from the global mean over the axes valid in both
/// - A single stability scalar (mean deviation)
use crate::models::com::{ComMovement, ComPoint, ComRange, StabilitySummary};
use crate::models::keypoint::{Joint, KeypointFrame};
use statrs::statistics::Statistics;
use tracing::debug;

pub const COM_JOINTS: [Joint; 8] = [
    Joint::LHip,
    Joint::RHip,
    Joint::LShoulder,
    Joint::RShoulder,
    Joint::LKnee,
    Joint::RKnee,
    Joint::LAnkle,
    Joint::RAnkle,
];

/// Centroid of the COM joints for one frame. An axis is `None` when none of
/// the joints provides a value for it.
pub fn frame_com(frame: &KeypointFrame) -> ComPoint {
    let detected: Vec<_> = COM_JOINTS.iter().filter_map(|j| frame.get(*j)).collect();

    let xs: Vec<f64> = detected.iter().map(|kp| kp.x).collect();
    let ys: Vec<f64> = detected.iter().map(|kp| kp.y).collect();
    let zs: Vec<f64> = detected.iter().filter_map(|kp| kp.z).collect();

    ComPoint::new(mean_of(&xs), mean_of(&ys), mean_of(&zs))
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(Statistics::mean(values))
    }
}

/// Per-axis statistics over the frames where the axis is present
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AxisStats {
    mean: Option<f64>,
    std: Option<f64>,
    range: Option<f64>,
}

impl AxisStats {
    fn from_series(series: &[Option<f64>]) -> Self {
        let values: Vec<f64> = series.iter().flatten().copied().collect();
        if values.is_empty() {
            return Self::default();
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            mean: Some(Statistics::mean(&values)),
            std: Some(Statistics::population_std_dev(&values)),
            range: Some(max - min),
        }
    }
}

/// Scores COM stability over a sequence of frames
pub struct ComStabilityAnalyzer {
    /// Every present axis range must be strictly below this value
    threshold: f64,
}

impl ComStabilityAnalyzer {
    pub fn new() -> Self {
        Self { threshold: 0.05 }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.max(0.0);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn analyze(&self, coms: &[ComPoint]) -> StabilitySummary {
        let stats: [AxisStats; 3] = std::array::from_fn(|axis| {
            let series: Vec<Option<f64>> = coms.iter().map(|c| c.axes()[axis]).collect();
            AxisStats::from_series(&series)
        });

        let mean = ComPoint::from_axes(stats.map(|s| s.mean));
        let std = ComPoint::from_axes(stats.map(|s| s.std));
        let range = ComRange::from_axes(stats.map(|s| s.range));

        let present_ranges: Vec<f64> = range.axes().iter().flatten().copied().collect();
        let stable =
            !present_ranges.is_empty() && present_ranges.iter().all(|r| *r < self.threshold);

        let deviations: Vec<Option<f64>> = coms.iter().map(|c| deviation(c, &mean)).collect();
        let scores: Vec<f64> = deviations.iter().flatten().copied().collect();
        let stability = mean_of(&scores);

        debug!(
            "COM stability over {} frames: stable={}, scalar={:?}",
            coms.len(),
            stable,
            stability
        );

        StabilitySummary {
            movement: ComMovement {
                mean,
                std,
                range,
                stable,
            },
            stability,
            deviations,
        }
    }
}

impl Default for ComStabilityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Euclidean distance between a frame COM and the global mean, restricted to
/// axes present in both
fn deviation(com: &ComPoint, mean: &ComPoint) -> Option<f64> {
    let squared: Vec<f64> = com
        .axes()
        .iter()
        .zip(mean.axes())
        .filter_map(|(value, center)| match (value, center) {
            (Some(v), Some(c)) => Some((v - c).powi(2)),
            _ => None,
        })
        .collect();

    if squared.is_empty() {
        None
    } else {
        Some(squared.iter().sum::<f64>().sqrt())
    }
}
