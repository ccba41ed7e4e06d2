/// Skeleton overlay rendering
///
/// This service handles:
/// - Projecting keypoints into the pixel space of the output video
/// - Optional relabeling of joints through an external index mapping
/// - Drawing joints and skeleton edges onto decoded frames
/// - Re-encoding the annotated frames with the best available codec
use crate::config::OverlayConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{CoordinateSpace, KeypointFrame, KeypointTable, COCO_CONNECTIONS, JOINT_COUNT};
use crate::services::video_processing_service::{
    fit_within, rounded_fps, VideoCodec, VideoProcessingService,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const JOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const EDGE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Mapping from caller-defined joint labels to canonical joint indices
#[derive(Debug, Clone, PartialEq)]
pub struct JointRemap {
    joint_to_label: BTreeMap<usize, usize>,
    label_count: usize,
}

impl JointRemap {
    /// Build from `(label, canonical index)` pairs. Canonical indices outside
    /// the skeleton are ignored.
    pub fn new(pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut joint_to_label = BTreeMap::new();
        let mut label_count = 0;
        for (label, joint) in pairs {
            if joint >= JOINT_COUNT {
                warn!("Ignoring mapping {} -> {}: not a skeleton joint", label, joint);
                continue;
            }
            joint_to_label.insert(joint, label);
            label_count = label_count.max(label + 1);
        }
        Self {
            joint_to_label,
            label_count,
        }
    }

    /// Parse a JSON object of the form `{"label": index}`
    pub fn from_json(content: &str) -> AnalysisResult<Self> {
        let raw: BTreeMap<String, usize> = serde_json::from_str(content)?;
        let mut pairs = Vec::with_capacity(raw.len());
        for (label, joint) in raw {
            let label: usize = label.trim().parse().map_err(|_| {
                AnalysisError::Config(format!("Joint map label '{}' is not an index", label))
            })?;
            pairs.push((label, joint));
        }
        Ok(Self::new(pairs))
    }

    pub fn load(path: &Path) -> AnalysisResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Size of the label space (largest label + 1)
    pub fn label_count(&self) -> usize {
        self.label_count
    }

    pub fn label_of(&self, joint: usize) -> Option<usize> {
        self.joint_to_label.get(&joint).copied()
    }

    /// Skeleton edges whose endpoints are both mapped, in label space
    pub fn edges(&self) -> Vec<(usize, usize)> {
        COCO_CONNECTIONS
            .iter()
            .filter_map(|&(a, b)| Some((self.label_of(a)?, self.label_of(b)?)))
            .collect()
    }

    /// Move canonical points into label space. Unmapped labels stay empty.
    pub fn apply(&self, points: &[Option<(f64, f64)>]) -> Vec<Option<(f64, f64)>> {
        let mut labeled = vec![None; self.label_count];
        for (&joint, &label) in &self.joint_to_label {
            if let Some(point) = points.get(joint) {
                labeled[label] = *point;
            }
        }
        labeled
    }
}

#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub remap: Option<JointRemap>,
    pub points_only: bool,
    pub joint_radius: i32,
    pub line_thickness: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl OverlayOptions {
    pub fn from_config(config: &OverlayConfig) -> Self {
        Self {
            remap: None,
            points_only: config.points_only,
            joint_radius: config.joint_radius,
            line_thickness: config.line_thickness,
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    pub fn with_remap(mut self, remap: Option<JointRemap>) -> Self {
        self.remap = remap;
        self
    }

    pub fn with_points_only(mut self, points_only: bool) -> Self {
        self.points_only = points_only;
        self
    }

    /// Points and edges to draw for one frame
    fn layout(&self, points: Vec<Option<(f64, f64)>>) -> (Vec<Option<(f64, f64)>>, Vec<(usize, usize)>) {
        match &self.remap {
            Some(remap) => (remap.apply(&points), remap.edges()),
            None => (points, COCO_CONNECTIONS.to_vec()),
        }
    }
}

impl Default for OverlayOptions {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default()).with_points_only(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayOutcome {
    Written {
        path: PathBuf,
        frames: usize,
        annotated: usize,
        codec: VideoCodec,
    },
    /// No usable encoder; nothing was written
    Aborted,
}

/// Project a frame's joints into output pixels. Absent joints are `None`.
pub fn project_frame(
    frame: &KeypointFrame,
    space: CoordinateSpace,
    source_width: u32,
    source_height: u32,
    scale: f64,
) -> Vec<Option<(f64, f64)>> {
    frame
        .joints()
        .iter()
        .map(|joint| {
            joint.map(|kp| {
                let (x, y) = space.to_pixel(kp.x, kp.y, source_width, source_height);
                (x * scale, y * scale)
            })
        })
        .collect()
}

fn drawable(point: Option<(f64, f64)>) -> Option<(f64, f64)> {
    point.filter(|&(x, y)| x >= 0.0 && y >= 0.0)
}

/// Draw edges then joints onto `image`
pub fn annotate_frame(
    image: &mut RgbImage,
    points: &[Option<(f64, f64)>],
    edges: &[(usize, usize)],
    options: &OverlayOptions,
) {
    if !options.points_only {
        for &(a, b) in edges {
            let (Some(start), Some(end)) = (
                points.get(a).and_then(|p| drawable(*p)),
                points.get(b).and_then(|p| drawable(*p)),
            ) else {
                continue;
            };
            draw_thick_line(image, start, end, options.line_thickness);
        }
    }

    for point in points.iter().filter_map(|p| drawable(*p)) {
        draw_filled_circle_mut(
            image,
            (point.0 as i32, point.1 as i32),
            options.joint_radius,
            JOINT_COLOR,
        );
    }
}

fn draw_thick_line(image: &mut RgbImage, start: (f64, f64), end: (f64, f64), thickness: u32) {
    let steep = (end.1 - start.1).abs() > (end.0 - start.0).abs();
    let thickness = thickness.max(1) as i32;
    for offset in 0..thickness {
        let shift = (offset - (thickness - 1) / 2) as f32;
        let (dx, dy) = if steep { (shift, 0.0) } else { (0.0, shift) };
        draw_line_segment_mut(
            image,
            (start.0 as f32 + dx, start.1 as f32 + dy),
            (end.0 as f32 + dx, end.1 as f32 + dy),
            EDGE_COLOR,
        );
    }
}

/// Service that writes annotated copies of videos
pub struct OverlayRenderer {
    video: VideoProcessingService,
}

impl OverlayRenderer {
    pub fn new(video: VideoProcessingService) -> Self {
        Self { video }
    }

    /// Render `table` over `video_path` into `output_path`.
    ///
    /// Frames past the end of the table are copied unannotated. A codec that
    /// fails at any point of the encode hands over to the next one. When no
    /// codec succeeds the run is logged and abandoned with
    /// `OverlayOutcome::Aborted`.
    pub async fn render(
        &self,
        video_path: &Path,
        table: &KeypointTable,
        output_path: &Path,
        options: &OverlayOptions,
    ) -> AnalysisResult<OverlayOutcome> {
        let info = self.video.probe(video_path).await?;
        let fps = rounded_fps(info.fps);
        let (width, height, scale) =
            fit_within(info.width, info.height, options.max_width, options.max_height);
        if scale != 1.0 {
            info!(
                "Rescaling overlay from {} to {}x{}",
                info.resolution_string(),
                width,
                height
            );
        }

        let encoders = self.video.available_encoders().await?;
        let codecs = VideoCodec::supported_by(&encoders);
        if codecs.is_empty() {
            error!(
                "No supported encoder (libx264 or mpeg4) available, skipping overlay for {:?}",
                video_path
            );
            return Ok(OverlayOutcome::Aborted);
        }

        let job = OverlayJob {
            video: self.video.clone(),
            video_path: video_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            table: table.clone(),
            options: options.clone(),
            width,
            height,
            fps,
            source_width: info.width,
            source_height: info.height,
            scale,
        };

        tokio::task::spawn_blocking(move || {
            for codec in codecs {
                match job.encode(codec) {
                    Ok((frames, annotated)) => {
                        debug!("Overlay wrote {} frames ({} annotated)", frames, annotated);
                        info!("Overlay video saved: {:?}", job.output_path);
                        return OverlayOutcome::Written {
                            path: job.output_path,
                            frames,
                            annotated,
                            codec,
                        };
                    }
                    Err(e) => warn!("Encoding with {} failed: {}", codec.encoder_name(), e),
                }
            }

            error!("Could not encode {:?} with any available encoder", job.output_path);
            if let Err(e) = fs::remove_file(&job.output_path) {
                debug!("No partial overlay to remove: {}", e);
            }
            OverlayOutcome::Aborted
        })
        .await
        .map_err(|e| AnalysisError::Video(format!("Overlay task failed: {}", e)))
    }
}

/// One decode, annotate and encode pass, repeated per candidate codec
struct OverlayJob {
    video: VideoProcessingService,
    video_path: PathBuf,
    output_path: PathBuf,
    table: KeypointTable,
    options: OverlayOptions,
    width: u32,
    height: u32,
    fps: u32,
    source_width: u32,
    source_height: u32,
    scale: f64,
}

impl OverlayJob {
    /// Returns (frames written, frames annotated)
    fn encode(&self, codec: VideoCodec) -> AnalysisResult<(usize, usize)> {
        let mut reader = self.video.open_reader(&self.video_path, self.width, self.height)?;
        let mut writer =
            match self.video.open_writer(&self.output_path, self.width, self.height, self.fps, codec) {
                Ok(writer) => writer,
                Err(e) => {
                    reader.finish()?;
                    return Err(e);
                }
            };

        let mut frames = 0;
        let mut annotated = 0;
        let mut stream = || -> AnalysisResult<()> {
            while let Some(mut image) = reader.read_frame()? {
                if let Some(frame) = self.table.frames.get(frames) {
                    let points = project_frame(
                        frame,
                        self.table.space,
                        self.source_width,
                        self.source_height,
                        self.scale,
                    );
                    let (points, edges) = self.options.layout(points);
                    annotate_frame(&mut image, &points, &edges, &self.options);
                    annotated += 1;
                }
                writer.write_frame(&image)?;
                frames += 1;
            }
            Ok(())
        };
        let streamed = stream();

        // Both children are reaped before any error is reported
        let decoded = reader.finish();
        let encoded = writer.finish();
        streamed?;
        encoded?;
        decoded?;
        Ok((frames, annotated))
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(VideoProcessingService::new())
    }
}
