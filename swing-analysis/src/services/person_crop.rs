/// Subject Crop Service
///
/// Locates the main golfer from per-frame pose detector output and derives
/// a single crop window for the whole video:
/// - Reads detector JSON files (first person per frame, 17 COCO keypoints)
/// - Clusters hip centers with DBSCAN and keeps the largest cluster
/// - Pads the union of the kept boxes and clips it to the frame
/// - Writes the cropped-video detections as a named-layout keypoint CSV
use crate::config::CropConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::keypoint::{Joint, KeypointSchema, JOINT_COUNT};
use linfa::prelude::*;
use linfa_clustering::Dbscan;
use ndarray::Array2;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// First detected person of one frame: (x, y, confidence) per COCO joint.
/// `None` when the detector found nobody.
pub type DetectorFrame = Option<Vec<[f64; 3]>>;

#[derive(Debug, Deserialize)]
struct DetectorOutput {
    #[serde(default)]
    people: Option<Vec<DetectedPerson>>,
}

#[derive(Debug, Deserialize)]
struct DetectedPerson {
    #[serde(default)]
    pose_keypoints_2d: Vec<f64>,
}

/// Axis-aligned box in source pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// Crop window in whole pixels, inside the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// ffmpeg crop filter expression
    pub fn filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

/// Read every `*.json` file in `dir` in file-name order
pub fn read_detector_frames(dir: &Path) -> AnalysisResult<Vec<DetectorFrame>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();

    let frames = files
        .iter()
        .map(|path| parse_detector_json(&fs::read_to_string(path)?))
        .collect::<AnalysisResult<Vec<_>>>()?;

    debug!("Read {} detector frames from {:?}", frames.len(), dir);
    Ok(frames)
}

/// Parse one detector JSON document
pub fn parse_detector_json(content: &str) -> AnalysisResult<DetectorFrame> {
    let output: DetectorOutput = serde_json::from_str(content)?;
    let Some(person) = output.people.and_then(|people| people.into_iter().next()) else {
        return Ok(None);
    };

    let keypoints = person
        .pose_keypoints_2d
        .chunks(3)
        .take(JOINT_COUNT)
        .map(|c| [c[0], c.get(1).copied().unwrap_or(f64::NAN), c.get(2).copied().unwrap_or(f64::NAN)])
        .collect();
    Ok(Some(keypoints))
}

pub struct PersonCropService {
    config: CropConfig,
}

impl PersonCropService {
    pub fn new(config: CropConfig) -> Self {
        Self { config }
    }

    /// Boxes of the frames that belong to the main person.
    ///
    /// A frame takes part when its left hip is confident enough; its box
    /// spans the joints above the joint confidence floor.
    pub fn main_person_boxes(&self, frames: &[DetectorFrame]) -> AnalysisResult<Vec<BoundingBox>> {
        let mut centers: Vec<[f64; 2]> = Vec::new();
        let mut boxes: Vec<BoundingBox> = Vec::new();

        for keypoints in frames.iter().flatten() {
            let Some(anchor) = keypoints.get(Joint::LHip.index()) else {
                continue;
            };
            if anchor[2].is_nan() || anchor[2] < self.config.min_anchor_confidence {
                continue;
            }
            let Some(bbox) = self.joint_box(keypoints) else {
                continue;
            };
            centers.push([anchor[0], anchor[1]]);
            boxes.push(bbox);
        }

        if centers.is_empty() {
            return Ok(Vec::new());
        }

        let labels = self.cluster(&centers)?;
        let main = largest_cluster(&labels);
        debug!(
            "Clustered {} subject centers, main cluster {:?}",
            centers.len(),
            main
        );

        let selected = match main {
            Some(label) => boxes
                .into_iter()
                .zip(&labels)
                .filter(|(_, l)| **l == Some(label))
                .map(|(b, _)| b)
                .collect(),
            None => {
                warn!("Every subject center was clustered as noise, no main subject");
                Vec::new()
            }
        };
        Ok(selected)
    }

    fn joint_box(&self, keypoints: &[[f64; 3]]) -> Option<BoundingBox> {
        let valid: Vec<&[f64; 3]> = keypoints
            .iter()
            .filter(|kp| kp[2] > self.config.min_joint_confidence)
            .filter(|kp| kp[0].is_finite() && kp[1].is_finite())
            .collect();
        if valid.is_empty() {
            return None;
        }

        Some(BoundingBox {
            x1: valid.iter().map(|kp| kp[0]).fold(f64::INFINITY, f64::min),
            y1: valid.iter().map(|kp| kp[1]).fold(f64::INFINITY, f64::min),
            x2: valid.iter().map(|kp| kp[0]).fold(f64::NEG_INFINITY, f64::max),
            y2: valid.iter().map(|kp| kp[1]).fold(f64::NEG_INFINITY, f64::max),
        })
    }

    fn cluster(&self, centers: &[[f64; 2]]) -> AnalysisResult<Vec<Option<usize>>> {
        let points = Array2::from_shape_fn((centers.len(), 2), |(i, j)| centers[i][j]);
        let labels = Dbscan::params(self.config.cluster_min_points)
            .tolerance(self.config.cluster_tolerance)
            .transform(&points)
            .map_err(|e| AnalysisError::Config(format!("Invalid clustering parameters: {}", e)))?;
        Ok(labels.to_vec())
    }

    /// Padded union of `boxes`, clipped to a `frame_width`x`frame_height` frame
    pub fn crop_region(
        &self,
        boxes: &[BoundingBox],
        frame_width: u32,
        frame_height: u32,
    ) -> AnalysisResult<CropRegion> {
        let union = union_box(boxes)
            .ok_or_else(|| AnalysisError::InvalidCrop("no subject boxes to combine".to_string()))?;

        let pad_w = union.width() * self.config.pad_ratio;
        let pad_h = union.height() * self.config.pad_ratio;

        // Truncate toward zero, then clip to the frame
        let mut x = (union.x1 - pad_w) as i64;
        let mut y = (union.y1 - pad_h) as i64;
        let mut w = (union.width() + 2.0 * pad_w) as i64;
        let mut h = (union.height() + 2.0 * pad_h) as i64;

        x = x.max(0);
        y = y.max(0);
        if x + w > frame_width as i64 {
            w = frame_width as i64 - x;
        }
        if y + h > frame_height as i64 {
            h = frame_height as i64 - y;
        }

        // yuv420p needs even dimensions
        w -= w.rem_euclid(2);
        h -= h.rem_euclid(2);

        if w <= 0 || h <= 0 {
            return Err(AnalysisError::InvalidCrop(format!(
                "crop size {}x{} for a {}x{} frame",
                w, h, frame_width, frame_height
            )));
        }

        let region = CropRegion {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        };
        info!("Subject crop region: {:?}", region);
        Ok(region)
    }
}

impl Default for PersonCropService {
    fn default() -> Self {
        Self::new(CropConfig::default())
    }
}

/// Most populated non-noise label; ties go to the lowest label
fn largest_cluster(labels: &[Option<usize>]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for label in labels.iter().flatten() {
        *counts.entry(*label).or_default() += 1;
    }

    let mut best: Option<(usize, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

pub fn union_box(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    let first = *boxes.first()?;
    Some(boxes.iter().fold(first, |acc, b| BoundingBox {
        x1: acc.x1.min(b.x1),
        y1: acc.y1.min(b.y1),
        x2: acc.x2.max(b.x2),
        y2: acc.y2.max(b.y2),
    }))
}

/// Write detections as a named-layout keypoint CSV, one row per frame.
/// Frames without a person become all-empty rows.
pub fn write_crop_csv(frames: &[DetectorFrame], path: &Path) -> AnalysisResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(KeypointSchema::Named.headers())?;

    for frame in frames {
        let mut row = vec![String::new(); JOINT_COUNT * 3];
        if let Some(keypoints) = frame {
            for (slot, value) in row.iter_mut().zip(keypoints.iter().flatten()) {
                if value.is_finite() {
                    *slot = value.to_string();
                }
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!("Wrote crop keypoint table {:?} ({} frames)", path, frames.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schema_resolver::KeypointTableLoader;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// A standing person whose left hip sits at (cx, cy)
    fn person(cx: f64, cy: f64) -> Vec<[f64; 3]> {
        let mut keypoints = vec![[0.0, 0.0, 0.0]; JOINT_COUNT];
        keypoints[Joint::Nose.index()] = [cx + 10.0, cy - 150.0, 0.9];
        keypoints[Joint::LShoulder.index()] = [cx - 20.0, cy - 100.0, 0.8];
        keypoints[Joint::LHip.index()] = [cx, cy, 0.7];
        keypoints[Joint::RHip.index()] = [cx + 30.0, cy, 0.7];
        keypoints[Joint::LAnkle.index()] = [cx, cy + 150.0, 0.6];
        keypoints[Joint::RAnkle.index()] = [cx + 40.0, cy + 150.0, 0.02];
        keypoints
    }

    #[test]
    fn test_parse_detector_json() {
        let values: Vec<String> = (0..18 * 3).map(|i| format!("{}.0", i)).collect();
        let json = format!(
            r#"{{"version": 1.3, "people": [{{"pose_keypoints_2d": [{}]}}]}}"#,
            values.join(",")
        );
        let frame = parse_detector_json(&json).unwrap().unwrap();
        assert_eq!(frame.len(), JOINT_COUNT);
        assert_eq!(frame[1], [3.0, 4.0, 5.0]);

        assert_eq!(parse_detector_json(r#"{"people": []}"#).unwrap(), None);
        assert_eq!(parse_detector_json(r#"{"version": 1.3}"#).unwrap(), None);
    }

    #[test]
    fn test_outlier_frames_are_dropped() {
        let mut frames: Vec<DetectorFrame> = (0..10)
            .map(|i| Some(person(400.0 + i as f64 * 2.0, 500.0)))
            .collect();
        frames.push(Some(person(1500.0, 200.0)));
        frames.push(None);

        let boxes = PersonCropService::default().main_person_boxes(&frames).unwrap();
        assert_eq!(boxes.len(), 10);
        assert!(boxes.iter().all(|b| b.x2 < 1000.0));
    }

    #[test]
    fn test_low_confidence_anchor_is_skipped() {
        let mut weak = person(400.0, 500.0);
        weak[Joint::LHip.index()][2] = 0.05;
        let frames = vec![Some(weak); 8];
        let boxes = PersonCropService::default().main_person_boxes(&frames).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_all_noise_selects_nothing() {
        let frames = vec![Some(person(100.0, 100.0)), Some(person(1000.0, 1000.0))];
        let boxes = PersonCropService::default().main_person_boxes(&frames).unwrap();
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_joint_box_ignores_weak_joints() {
        let service = PersonCropService::default();
        let bbox = service.joint_box(&person(400.0, 500.0)).unwrap();
        // RAnkle has confidence 0.02 and the unset joints have 0.0
        assert_eq!(bbox.x1, 380.0);
        assert_eq!(bbox.x2, 430.0);
        assert_eq!(bbox.y1, 350.0);
        assert_eq!(bbox.y2, 650.0);
    }

    #[test]
    fn test_largest_cluster() {
        assert_eq!(largest_cluster(&[Some(1), Some(0), Some(1), None]), Some(1));
        assert_eq!(largest_cluster(&[Some(2), Some(0)]), Some(0));
        assert_eq!(largest_cluster(&[None, None]), None);
    }

    #[test]
    fn test_crop_region_pads_and_clips() {
        let service = PersonCropService::default();
        let boxes = [
            BoundingBox { x1: 100.0, y1: 200.0, x2: 300.0, y2: 600.0 },
            BoundingBox { x1: 120.0, y1: 180.0, x2: 310.0, y2: 610.0 },
        ];
        let region = service.crop_region(&boxes, 1920, 1080).unwrap();
        // union 100..310 x 180..610, padding 21 x 43
        assert_eq!(region, CropRegion { x: 79, y: 137, width: 252, height: 516 });
        assert_eq!(region.filter(), "crop=252:516:79:137");

        let clipped = service.crop_region(&boxes, 300, 500).unwrap();
        assert_eq!(clipped.x, 79);
        assert_eq!(clipped.width, 220);
        assert_eq!(clipped.height, 362);
    }

    #[test]
    fn test_crop_outside_frame_is_invalid() {
        let service = PersonCropService::default();
        let boxes = [BoundingBox { x1: 2000.0, y1: 10.0, x2: 2100.0, y2: 90.0 }];
        assert_matches!(
            service.crop_region(&boxes, 1280, 720),
            Err(AnalysisError::InvalidCrop(_))
        );
        assert_matches!(
            service.crop_region(&[], 1280, 720),
            Err(AnalysisError::InvalidCrop(_))
        );
    }

    #[test]
    fn test_crop_csv_round_trips_through_loader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("swing_crop.csv");
        let frames = vec![Some(person(400.0, 500.0)), None, Some(person(410.0, 505.0))];
        write_crop_csv(&frames, &path).unwrap();

        let table = KeypointTableLoader::new().load(&path).unwrap();
        assert_eq!(table.schema, KeypointSchema::Named);
        assert_eq!(table.len(), 3);
        assert!(table.frames[1].is_empty());
        assert_eq!(table.frames[2].get(Joint::LHip).map(|kp| kp.x), Some(410.0));
        // Zeroed joints are treated as undetected
        assert!(table.frames[0].get(Joint::LEye).is_none());
    }

    #[test]
    fn test_read_detector_frames_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("clip_000000000001_keypoints.json"), r#"{"people": []}"#).unwrap();
        let kps: Vec<String> = person(400.0, 500.0)
            .iter()
            .flat_map(|kp| kp.iter().map(|v| v.to_string()))
            .collect();
        fs::write(
            dir.path().join("clip_000000000000_keypoints.json"),
            format!(r#"{{"people": [{{"pose_keypoints_2d": [{}]}}]}}"#, kps.join(",")),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let frames = read_detector_frames(dir.path()).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_some());
        assert!(frames[1].is_none());
    }
}
