/// Keypoint Schema Resolver
///
/// Recognizes the two supported keypoint CSV layouts and ingests a table:
/// - Indexed layout: `x_0..x_16`, `y_0..y_16`, `score_0..score_16`, optional `z_i`
/// - Named layout: `{Joint}_x`, `{Joint}_y`, `{Joint}_c`
/// - Coordinate space detection from the largest finite x value
/// - Missing-value rules applied once, at ingestion
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::keypoint::{
    CoordinateSpace, Joint, Keypoint, KeypointFrame, KeypointSchema, KeypointTable, JOINT_COUNT,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const FRAME_COLUMN: &str = "frame";

/// Determine which layout a header row uses.
///
/// The indexed layout wins when both are complete. A layout is only selected
/// when every one of its 17×3 columns is present.
pub fn resolve_schema<S: AsRef<str>>(headers: &[S]) -> AnalysisResult<KeypointSchema> {
    let present: std::collections::HashSet<&str> =
        headers.iter().map(|h| h.as_ref().trim()).collect();
    let has_all = |columns: Vec<String>| columns.iter().all(|c| present.contains(c.as_str()));

    let indexed = KeypointSchema::Indexed { has_depth: false };
    if has_all(required_columns(&indexed)) {
        let has_depth = Joint::ALL
            .iter()
            .all(|j| present.contains(format!("z_{}", j.index()).as_str()));
        return Ok(KeypointSchema::Indexed { has_depth });
    }

    if has_all(required_columns(&KeypointSchema::Named)) {
        return Ok(KeypointSchema::Named);
    }

    Err(AnalysisError::Schema(
        "expected either indexed columns x_0..x_16, y_0..y_16, score_0..score_16 \
         or named columns Nose_x, Nose_y, Nose_c .. RAnkle_x, RAnkle_y, RAnkle_c"
            .to_string(),
    ))
}

fn required_columns(schema: &KeypointSchema) -> Vec<String> {
    Joint::ALL
        .iter()
        .flat_map(|j| {
            [
                schema.x_column(*j),
                schema.y_column(*j),
                schema.confidence_column(*j),
            ]
        })
        .collect()
}

/// Classify a table from its x values: normalized when the largest finite
/// value is at most 1.0, pixel otherwise (including when nothing is finite).
pub fn detect_coordinate_space<I>(x_values: I) -> CoordinateSpace
where
    I: IntoIterator<Item = f64>,
{
    let max = x_values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

    match max {
        Some(m) if m <= 1.0 => CoordinateSpace::Normalized,
        _ => CoordinateSpace::Pixel,
    }
}

/// Column positions of one resolved layout
struct ColumnMap {
    x: [usize; JOINT_COUNT],
    y: [usize; JOINT_COUNT],
    confidence: [usize; JOINT_COUNT],
    z: Option<[usize; JOINT_COUNT]>,
    frame: Option<usize>,
}

impl ColumnMap {
    fn new(schema: &KeypointSchema, headers: &[String]) -> AnalysisResult<Self> {
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();

        let lookup = |name: String| -> AnalysisResult<usize> {
            positions
                .get(name.as_str())
                .copied()
                .ok_or_else(|| AnalysisError::Schema(format!("missing column {}", name)))
        };

        let mut x = [0; JOINT_COUNT];
        let mut y = [0; JOINT_COUNT];
        let mut confidence = [0; JOINT_COUNT];
        let mut z = schema.has_depth().then_some([0; JOINT_COUNT]);

        for joint in Joint::ALL {
            let i = joint.index();
            x[i] = lookup(schema.x_column(joint))?;
            y[i] = lookup(schema.y_column(joint))?;
            confidence[i] = lookup(schema.confidence_column(joint))?;
            if let (Some(z), Some(column)) = (z.as_mut(), schema.z_column(joint)) {
                z[i] = lookup(column)?;
            }
        }

        Ok(Self {
            x,
            y,
            confidence,
            z,
            frame: positions.get(FRAME_COLUMN).copied(),
        })
    }
}

/// Reads keypoint CSV files into a [`KeypointTable`]
pub struct KeypointTableLoader {
    /// Confidence at or below which a joint is treated as undetected
    confidence_cutoff: f64,
}

impl KeypointTableLoader {
    pub fn new() -> Self {
        Self {
            confidence_cutoff: 0.01,
        }
    }

    /// Set the confidence cutoff
    pub fn with_confidence_cutoff(mut self, cutoff: f64) -> Self {
        self.confidence_cutoff = cutoff.clamp(0.0, 1.0);
        self
    }

    pub fn load(&self, path: &Path) -> AnalysisResult<KeypointTable> {
        let file = File::open(path)?;
        let table = self.read(file)?;
        info!(
            "Loaded keypoint table {:?}: {} frames, {:?}, {:?}",
            path,
            table.len(),
            table.schema,
            table.space
        );
        Ok(table)
    }

    pub fn read<R: Read>(&self, reader: R) -> AnalysisResult<KeypointTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let schema = resolve_schema(&headers)?;
        let columns = ColumnMap::new(&schema, &headers)?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(parse_cell).collect());
        }

        let space = detect_coordinate_space(
            rows.iter()
                .flat_map(|row| columns.x.iter().map(move |&c| cell(row, c))),
        );
        debug!("Detected {:?} coordinates over {} rows", space, rows.len());

        let frames = rows
            .iter()
            .enumerate()
            .map(|(row_index, row)| self.ingest_row(row, row_index, &columns))
            .collect();

        Ok(KeypointTable {
            schema,
            space,
            frames,
        })
    }

    fn ingest_row(&self, row: &[f64], row_index: usize, columns: &ColumnMap) -> KeypointFrame {
        let frame_index = columns
            .frame
            .map(|c| cell(row, c))
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
            .unwrap_or(row_index as i64);

        let mut frame = KeypointFrame::empty(frame_index);
        for joint in Joint::ALL {
            let i = joint.index();
            let z = columns.z.map(|z| cell(row, z[i]));
            let keypoint = Keypoint::from_raw(
                cell(row, columns.x[i]),
                cell(row, columns.y[i]),
                z,
                cell(row, columns.confidence[i]),
                self.confidence_cutoff,
            );
            frame.set(joint, keypoint);
        }
        frame
    }
}

impl Default for KeypointTableLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a keypoint CSV with the given confidence cutoff
pub fn load_keypoint_table(path: &Path, cutoff: f64) -> AnalysisResult<KeypointTable> {
    KeypointTableLoader::new()
        .with_confidence_cutoff(cutoff)
        .load(path)
}

fn parse_cell(value: &str) -> f64 {
    value.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Short rows read as missing values
fn cell(row: &[f64], index: usize) -> f64 {
    row.get(index).copied().unwrap_or(f64::NAN)
}
