/// Keypoint Imputation
///
/// Fills absent joints across a keypoint table before rendering. Each joint
/// is interpolated independently over row order for x and y, with the same
/// kernel the temporal gap filler uses. Joints never detected in the table
/// stay absent.
use crate::models::keypoint::{Joint, Keypoint, KeypointTable};
use crate::services::gap_filler::fill_series;
use tracing::debug;

/// Return a copy of `table` with every absent joint interpolated.
///
/// Imputed keypoints carry no confidence and no depth.
pub fn impute_missing(table: &KeypointTable) -> KeypointTable {
    let mut imputed = table.clone();
    let mut filled = 0usize;

    for joint in Joint::ALL {
        let xs: Vec<Option<f64>> = table.iter().map(|f| f.get(joint).map(|kp| kp.x)).collect();
        let ys: Vec<Option<f64>> = table.iter().map(|f| f.get(joint).map(|kp| kp.y)).collect();
        let xs = fill_series(&xs);
        let ys = fill_series(&ys);

        for (i, frame) in imputed.frames.iter_mut().enumerate() {
            if frame.get(joint).is_some() {
                continue;
            }
            if let (Some(x), Some(y)) = (xs[i], ys[i]) {
                frame.set(joint, Some(Keypoint::new(x, y)));
                filled += 1;
            }
        }
    }

    debug!("Imputed {} keypoints over {} frames", filled, table.len());
    imputed
}
