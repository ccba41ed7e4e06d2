use crate::config::ToolsConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::services::person_crop::CropRegion;
use image::RgbImage;
use std::ffi::OsString;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::thread::{self, JoinHandle};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Frame rate used when a video does not report a usable one
pub const DEFAULT_FPS: u32 = 30;

/// Service for video operations backed by the ffmpeg/ffprobe executables
#[derive(Debug, Clone)]
pub struct VideoProcessingService {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl VideoProcessingService {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// Create service with custom FFmpeg paths
    pub fn with_paths(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn from_tools(tools: &ToolsConfig) -> Self {
        Self::with_paths(tools.ffmpeg.clone(), tools.ffprobe.clone())
    }

    /// Read stream metadata (resolution, frame rate, frame count)
    pub async fn probe(&self, video_path: &Path) -> AnalysisResult<VideoInfo> {
        debug!("Probing video: {:?}", video_path);

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,codec_name,r_frame_rate,avg_frame_rate,nb_frames,duration",
                "-of",
                "json",
            ])
            .arg(video_path)
            .output()
            .await
            .map_err(|e| AnalysisError::Video(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(AnalysisError::ExternalProcess {
                step: "ffprobe".to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let metadata: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        parse_video_info(metadata)
    }

    /// Frame rate of the first video stream rounded to a whole number, with
    /// the default used when the stream reports none
    pub async fn frame_rate(&self, video_path: &Path) -> u32 {
        match self.probe(video_path).await {
            Ok(info) => rounded_fps(info.fps),
            Err(e) => {
                warn!("Could not read frame rate of {:?}: {}", video_path, e);
                DEFAULT_FPS
            }
        }
    }

    /// Re-encode to H.264/yuv420p with the moov atom up front
    pub async fn reencode_h264(&self, input_path: &Path, output_path: &Path) -> AnalysisResult<()> {
        info!("Re-encoding video: {:?} -> {:?}", input_path, output_path);

        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), input_path.into()];
        args.extend(VideoCodec::H264.output_args().iter().map(OsString::from));
        args.push(output_path.into());

        self.run_ffmpeg("reencode", args).await
    }

    /// Cut `region` out of every frame
    pub async fn crop(
        &self,
        input_path: &Path,
        output_path: &Path,
        region: &CropRegion,
    ) -> AnalysisResult<()> {
        info!(
            "Cropping video {:?} to {}x{}+{}+{}",
            input_path, region.width, region.height, region.x, region.y
        );

        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input_path.into(),
            "-filter:v".into(),
            region.filter().into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            output_path.into(),
        ];

        self.run_ffmpeg("crop", args).await
    }

    /// Names of the video encoders this ffmpeg build provides
    pub async fn available_encoders(&self) -> AnalysisResult<Vec<String>> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .output()
            .await
            .map_err(|e| AnalysisError::Video(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(AnalysisError::ExternalProcess {
                step: "ffmpeg -encoders".to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Start decoding `video_path` into rgb24 frames of `width`x`height`
    pub fn open_reader(&self, video_path: &Path, width: u32, height: u32) -> AnalysisResult<FrameReader> {
        let mut child = std::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(video_path)
            .args([
                "-vf",
                &format!("scale={}:{}", width, height),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AnalysisError::Video(format!("Failed to spawn ffmpeg decoder: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnalysisError::Video("Failed to capture ffmpeg stdout".to_string()))?;

        Ok(FrameReader {
            child,
            stdout: BufReader::new(stdout),
            width,
            height,
        })
    }

    /// Start encoding rgb24 frames of `width`x`height` into `output_path`
    pub fn open_writer(
        &self,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: VideoCodec,
    ) -> AnalysisResult<FrameWriter> {
        let mut child = std::process::Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", width, height),
                "-r",
                &fps.to_string(),
                "-i",
                "-",
                "-an",
            ])
            .args(codec.output_args())
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AnalysisError::Video(format!("Failed to spawn ffmpeg encoder: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnalysisError::Video("Failed to capture ffmpeg stdin".to_string()))?;

        // Drained while frames are written so a chatty encoder never blocks
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut text) {
                    debug!("Could not read encoder stderr: {}", e);
                }
                String::from_utf8_lossy(&text).into_owned()
            })
        });

        Ok(FrameWriter {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stderr,
            codec,
        })
    }

    async fn run_ffmpeg(&self, step: &str, args: Vec<OsString>) -> AnalysisResult<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AnalysisError::Video(format!("Failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            return Err(AnalysisError::ExternalProcess {
                step: step.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!("ffmpeg {} finished", step);
        Ok(())
    }
}

impl Default for VideoProcessingService {
    fn default() -> Self {
        Self::new()
    }
}

/// Video metadata information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub video_codec: String,
}

impl VideoInfo {
    pub fn resolution_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Output encoders in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    Mpeg4,
}

impl VideoCodec {
    pub const PREFERENCE: [VideoCodec; 2] = [VideoCodec::H264, VideoCodec::Mpeg4];

    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::Mpeg4 => "mpeg4",
        }
    }

    fn output_args(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::H264 => &[
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ],
            VideoCodec::Mpeg4 => &["-c:v", "mpeg4", "-q:v", "3", "-pix_fmt", "yuv420p"],
        }
    }

    /// Codecs from the preference list that appear among `encoders`
    pub fn supported_by(encoders: &[String]) -> Vec<VideoCodec> {
        Self::PREFERENCE
            .into_iter()
            .filter(|codec| encoders.iter().any(|e| e == codec.encoder_name()))
            .collect()
    }
}

/// Decoded rgb24 frames streamed from an ffmpeg child process
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
}

impl FrameReader {
    /// Next frame, or `None` at end of stream
    pub fn read_frame(&mut self) -> AnalysisResult<Option<RgbImage>> {
        let mut buffer = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buffer) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        RgbImage::from_raw(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| AnalysisError::Video("Decoded frame has the wrong size".to_string()))
    }

    pub fn finish(mut self) -> AnalysisResult<()> {
        drop(self.stdout);
        let status = self.child.wait()?;
        if !status.success() {
            warn!("ffmpeg decoder exited with {:?}", status.code());
        }
        Ok(())
    }
}

/// Raw rgb24 frames piped into an ffmpeg encoder
pub struct FrameWriter {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    codec: VideoCodec,
}

impl FrameWriter {
    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> AnalysisResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AnalysisError::Video("Encoder input already closed".to_string()))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    /// Close the input and wait for the encoder to finish the file
    pub fn finish(mut self) -> AnalysisResult<()> {
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };

        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(AnalysisError::ExternalProcess {
                step: format!("ffmpeg encode ({})", self.codec.encoder_name()),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        flushed?;
        Ok(())
    }
}

/// Parse the table printed by `ffmpeg -encoders`, keeping video encoders
pub fn parse_encoder_list(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            let is_flag_column = flags.len() == 6
                && flags.starts_with('V')
                && flags.chars().all(|c| c == '.' || c.is_ascii_uppercase());
            (is_flag_column && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Round a reported frame rate, falling back to the default when it is not
/// a positive finite number
pub fn rounded_fps(rate: f64) -> u32 {
    if rate.is_finite() && rate > 0.0 {
        (rate.round() as u32).max(1)
    } else {
        DEFAULT_FPS
    }
}

/// Largest even-sized resolution that fits within `max_width`x`max_height`.
///
/// Returns the new size and the scale factor, or the input size with a
/// factor of 1 when it already fits.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32, f64) {
    if width <= max_width && height <= max_height {
        return (width, height, 1.0);
    }

    let factor = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let even = |v: f64| ((v as u32) & !1).max(2);
    (even(width as f64 * factor), even(height as f64 * factor), factor)
}

/// Parse frame rate string (e.g., "30/1" -> 30.0)
fn parse_frame_rate(rate_str: &str) -> f64 {
    if let Some((num, den)) = rate_str.split_once('/') {
        if let (Ok(n), Ok(d)) = (num.parse::<f64>(), den.parse::<f64>()) {
            if d != 0.0 {
                return n / d;
            }
        }
        return 0.0;
    }
    rate_str.parse().unwrap_or(0.0)
}

fn parse_video_info(metadata: FfprobeOutput) -> AnalysisResult<VideoInfo> {
    let stream = metadata
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::Video("No video stream found".to_string()))?;

    let mut fps = parse_frame_rate(&stream.r_frame_rate);
    if fps <= 0.0 {
        if let Some(avg) = &stream.avg_frame_rate {
            fps = parse_frame_rate(avg);
        }
    }

    Ok(VideoInfo {
        width: stream.width,
        height: stream.height,
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        duration_seconds: stream.duration.and_then(|d| d.parse().ok()),
        video_codec: stream.codec_name.unwrap_or_default(),
    })
}

// FFprobe JSON output structures
#[derive(Debug, serde::Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, serde::Deserialize)]
struct FfprobeStream {
    width: u32,
    height: u32,
    codec_name: Option<String>,
    #[serde(default)]
    r_frame_rate: String,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}
