use serde::{Deserialize, Serialize};

/// Center of mass for one frame (or an aggregate over frames). Each axis is
/// independently optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComPoint {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl ComPoint {
    pub fn new(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    pub fn axes(&self) -> [Option<f64>; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_axes(axes: [Option<f64>; 3]) -> Self {
        Self {
            x: axes[0],
            y: axes[1],
            z: axes[2],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.axes().iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComRange {
    pub x_range: Option<f64>,
    pub y_range: Option<f64>,
    pub z_range: Option<f64>,
}

impl ComRange {
    pub fn from_axes(axes: [Option<f64>; 3]) -> Self {
        Self {
            x_range: axes[0],
            y_range: axes[1],
            z_range: axes[2],
        }
    }

    pub fn axes(&self) -> [Option<f64>; 3] {
        [self.x_range, self.y_range, self.z_range]
    }
}

/// Global COM statistics, serialized as `com_movement`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComMovement {
    pub mean: ComPoint,
    pub std: ComPoint,
    pub range: ComRange,
    pub stable: bool,
}

/// Output of the stability pass over a sequence of per-frame COM values
#[derive(Debug, Clone, PartialEq)]
pub struct StabilitySummary {
    pub movement: ComMovement,
    /// Mean per-frame deviation, `None` when no frame has a deviation
    pub stability: Option<f64>,
    /// Deviation from the global mean, aligned with the input frames
    pub deviations: Vec<Option<f64>>,
}
