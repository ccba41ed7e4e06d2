/// Angle Report Service
///
/// Turns a keypoint CSV into the angle/COM document:
/// - Per-frame angles and COM from the resolved keypoint table
/// - COM stability summary and per-frame scores over the raw frames
/// - Dense, gap-filled angle and COM series
/// - Atomic JSON write
use crate::config::ThresholdConfig;
use crate::error::AnalysisResult;
use crate::models::features::FeatureRow;
use crate::models::keypoint::KeypointTable;
use crate::models::report::{AngleEntry, AngleReport, ComFrame, StabilityScore};
use crate::services::angle_engine::frame_angles;
use crate::services::com_analyzer::{frame_com, ComStabilityAnalyzer};
use crate::services::gap_filler::fill_gaps;
use crate::services::json_store::write_json_atomic;
use crate::services::schema_resolver::KeypointTableLoader;
use std::path::Path;
use tracing::info;

pub struct AngleReportService {
    loader: KeypointTableLoader,
    analyzer: ComStabilityAnalyzer,
}

impl AngleReportService {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            loader: KeypointTableLoader::new().with_confidence_cutoff(thresholds.confidence_cutoff),
            analyzer: ComStabilityAnalyzer::new().with_threshold(thresholds.stability_threshold),
        }
    }

    /// Compute the report for an in-memory table
    pub fn build(&self, table: &KeypointTable, fps: u32) -> AngleReport {
        let rows: Vec<FeatureRow> = table
            .iter()
            .map(|frame| FeatureRow::new(frame.frame, frame_angles(frame), frame_com(frame)))
            .collect();

        let raw_coms: Vec<_> = rows.iter().map(|row| row.com).collect();
        let summary = self.analyzer.analyze(&raw_coms);

        let com_stability_scores = rows
            .iter()
            .zip(&summary.deviations)
            .map(|(row, score)| StabilityScore {
                frame: row.frame,
                score: *score,
            })
            .collect();

        let filled = fill_gaps(&rows);

        AngleReport {
            fps,
            angles: filled.iter().map(AngleEntry::from).collect(),
            com_movement: summary.movement,
            com_stability: summary.stability,
            com_frames: filled.iter().map(ComFrame::from).collect(),
            com_stability_scores,
        }
    }

    /// Read `csv_path`, compute the report and write it to `out_path`
    pub fn generate(&self, csv_path: &Path, out_path: &Path, fps: u32) -> AnalysisResult<AngleReport> {
        let table = self.loader.load(csv_path)?;
        let report = self.build(&table, fps);
        write_json_atomic(out_path, &report)?;

        info!(
            "Wrote angle report {:?}: {} frames, stable={}, stability={:?}",
            out_path,
            report.angles.len(),
            report.com_movement.stable,
            report.com_stability
        );
        Ok(report)
    }
}

impl Default for AngleReportService {
    fn default() -> Self {
        Self::new(&ThresholdConfig::default())
    }
}
