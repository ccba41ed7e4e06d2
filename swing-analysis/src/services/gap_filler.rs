/// Temporal Gap Filler
///
/// Produces a dense, contiguous feature series from sparse per-frame rows:
/// - One output row for every frame index between the first and last input frame
/// - Piecewise-linear interpolation per feature, passing exactly through observations
/// - Leading/trailing gaps clamped to the nearest observed value
/// - A single observation is broadcast; no observations stay `None`
use crate::models::features::{FeatureRow, FEATURE_COUNT};
use std::collections::BTreeMap;

/// Interpolate a sparse series at `position`.
///
/// `observed` must be sorted by position with unique positions. Positions
/// outside the observed range take the nearest observed value.
pub fn interpolate_at(observed: &[(f64, f64)], position: f64) -> Option<f64> {
    let (first, last) = (observed.first()?, observed.last()?);
    if position <= first.0 {
        return Some(first.1);
    }
    if position >= last.0 {
        return Some(last.1);
    }

    // First observation strictly after `position`
    let upper = observed.partition_point(|(p, _)| *p <= position);
    let (p1, v1) = observed[upper];
    let (p0, v0) = observed[upper - 1];
    if p0 == position {
        return Some(v0);
    }

    let t = (position - p0) / (p1 - p0);
    Some(v0 + (v1 - v0) * t)
}

/// Fill every `None` in a series indexed by position, using the present
/// values as observations. Returns the input unchanged when nothing is present.
pub fn fill_series(series: &[Option<f64>]) -> Vec<Option<f64>> {
    let observed: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect();

    (0..series.len())
        .map(|i| series[i].or_else(|| interpolate_at(&observed, i as f64)))
        .collect()
}

/// Densify per-frame feature rows.
///
/// Rows sharing a frame index collapse to the last one. The output covers
/// `min_frame..=max_frame` in order.
pub fn fill_gaps(rows: &[FeatureRow]) -> Vec<FeatureRow> {
    let by_frame: BTreeMap<i64, [Option<f64>; FEATURE_COUNT]> =
        rows.iter().map(|row| (row.frame, row.values())).collect();

    let (Some(&start), Some(&end)) = (by_frame.keys().next(), by_frame.keys().next_back()) else {
        return Vec::new();
    };

    let observations: Vec<Vec<(f64, f64)>> = (0..FEATURE_COUNT)
        .map(|feature| {
            by_frame
                .iter()
                .filter_map(|(frame, values)| values[feature].map(|v| (*frame as f64, v)))
                .collect()
        })
        .collect();

    (start..=end)
        .map(|frame| {
            let values: [Option<f64>; FEATURE_COUNT] = std::array::from_fn(|feature| {
                by_frame
                    .get(&frame)
                    .and_then(|values| values[feature])
                    .or_else(|| interpolate_at(&observations[feature], frame as f64))
            });
            FeatureRow::from_values(frame, values)
        })
        .collect()
}
