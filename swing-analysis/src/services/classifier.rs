/// Swing Classifier
///
/// Binary classification of a swing from its skeleton embedding:
/// - `MlpHead`: dense network evaluated in-process from exported JSON weights
/// - `ExternalClassifier`: a command that prints the classifier JSON
///
/// Classification failures are soft. Callers turn them into a
/// `ClassifierOutput` carrying the error instead of aborting the run.
use crate::config::{ClassifierConfig, ClassifierMode, CommandTemplate};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::result::ClassifierOutput;
use ndarray::{Array1, Array2, ArrayD};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

pub trait SwingClassifier: Send + Sync {
    fn classify(&self, embedding: &Path) -> AnalysisResult<ClassifierOutput>;
}

/// Classify and fold any error into the output
pub fn classify_soft(classifier: &dyn SwingClassifier, embedding: &Path) -> ClassifierOutput {
    match classifier.classify(embedding) {
        Ok(output) => output,
        Err(e) => {
            error!("Classification failed: {}", e);
            ClassifierOutput::failed(e.to_string())
        }
    }
}

/// Build the configured classifier
pub fn build_classifier(config: &ClassifierConfig) -> AnalysisResult<Box<dyn SwingClassifier>> {
    match config.mode {
        ClassifierMode::Mlp => Ok(Box::new(MlpHead::load(&config.weights)?)),
        ClassifierMode::External => {
            let command = config.command.clone().ok_or_else(|| {
                AnalysisError::Config("classifier.command is required in external mode".to_string())
            })?;
            Ok(Box::new(ExternalClassifier::new(command)))
        }
    }
}

/// Read a `.npy` embedding (f32 or f64, any shape) as a flat vector
pub fn load_embedding(path: &Path) -> AnalysisResult<Array1<f64>> {
    let values: Vec<f64> = match ndarray_npy::read_npy::<_, ArrayD<f32>>(path) {
        Ok(array) => array.iter().map(|v| *v as f64).collect(),
        Err(_) => ndarray_npy::read_npy::<_, ArrayD<f64>>(path)
            .map_err(|e| {
                AnalysisError::Classifier(format!("cannot read embedding {:?}: {}", path, e))
            })?
            .iter()
            .copied()
            .collect(),
    };
    Ok(Array1::from(values))
}

// Exported weight file layout
#[derive(Debug, Deserialize)]
struct MlpWeights {
    #[serde(default)]
    scaler: Option<ScalerWeights>,
    layers: Vec<LayerWeights>,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct ScalerWeights {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct LayerWeights {
    /// Row-major `[out][in]`
    weight: Vec<Vec<f64>>,
    bias: Vec<f64>,
    #[serde(default)]
    batch_norm: Option<BatchNormWeights>,
}

#[derive(Debug, Deserialize)]
struct BatchNormWeights {
    gamma: Vec<f64>,
    beta: Vec<f64>,
    running_mean: Vec<f64>,
    running_var: Vec<f64>,
    #[serde(default = "default_eps")]
    eps: f64,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_eps() -> f64 {
    1e-5
}

/// Standardization applied to the embedding before the first layer
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    pub means: Array1<f64>,
    pub stds: Array1<f64>,
}

impl FeatureScaler {
    pub fn transform_single(&self, features: &Array1<f64>) -> Array1<f64> {
        (features - &self.means) / &self.stds
    }
}

/// Inference-mode batch norm folded into a per-unit scale and shift
#[derive(Debug, Clone)]
struct FoldedNorm {
    scale: Array1<f64>,
    shift: Array1<f64>,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weight: Array2<f64>,
    bias: Array1<f64>,
    norm: Option<FoldedNorm>,
}

impl DenseLayer {
    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let out = self.weight.dot(input) + &self.bias;
        match &self.norm {
            Some(norm) => out * &norm.scale + &norm.shift,
            None => out,
        }
    }
}

/// Sequential dense network with ReLU between layers and a two-way softmax
#[derive(Debug, Clone)]
pub struct MlpHead {
    scaler: Option<FeatureScaler>,
    layers: Vec<DenseLayer>,
    threshold: f64,
}

impl MlpHead {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Classifier(format!("model load failed for {:?}: {}", path, e))
        })?;
        let head = Self::from_json(&content)?;
        info!(
            "Loaded MLP head from {:?}: {} layers, input dim {}",
            path,
            head.layers.len(),
            head.input_dim()
        );
        Ok(head)
    }

    pub fn from_json(content: &str) -> AnalysisResult<Self> {
        let weights: MlpWeights = serde_json::from_str(content)
            .map_err(|e| AnalysisError::Classifier(format!("model load failed: {}", e)))?;
        Self::from_weights(weights)
    }

    fn from_weights(weights: MlpWeights) -> AnalysisResult<Self> {
        if weights.layers.is_empty() {
            return Err(AnalysisError::Classifier("model has no layers".to_string()));
        }

        let mut layers = Vec::with_capacity(weights.layers.len());
        let mut expected_in: Option<usize> = None;

        for (i, layer) in weights.layers.into_iter().enumerate() {
            let rows = layer.weight.len();
            let cols = layer.weight.first().map_or(0, Vec::len);
            if rows == 0 || cols == 0 || layer.weight.iter().any(|r| r.len() != cols) {
                return Err(shape_error(i, "weight matrix is empty or ragged"));
            }
            if layer.bias.len() != rows {
                return Err(shape_error(i, "bias length does not match output size"));
            }
            if expected_in.is_some_and(|n| n != cols) {
                return Err(shape_error(i, "input size does not match previous layer"));
            }

            let weight = Array2::from_shape_vec((rows, cols), layer.weight.concat())
                .map_err(|e| shape_error(i, &e.to_string()))?;
            let norm = layer
                .batch_norm
                .map(|bn| fold_batch_norm(bn, rows).ok_or_else(|| shape_error(i, "batch norm size mismatch")))
                .transpose()?;

            layers.push(DenseLayer {
                weight,
                bias: Array1::from(layer.bias),
                norm,
            });
            expected_in = Some(rows);
        }

        if expected_in != Some(2) {
            return Err(AnalysisError::Classifier(
                "final layer must produce two logits".to_string(),
            ));
        }

        let input_dim = layers[0].weight.ncols();
        let scaler = match weights.scaler {
            Some(s) if s.mean.len() != input_dim || s.scale.len() != input_dim => {
                return Err(AnalysisError::Classifier(
                    "scaler size does not match model input".to_string(),
                ))
            }
            Some(s) => Some(FeatureScaler {
                means: Array1::from(s.mean),
                stds: Array1::from(s.scale),
            }),
            None => None,
        };

        Ok(Self {
            scaler,
            layers,
            threshold: weights.threshold,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].weight.ncols()
    }

    /// Class probabilities `[prob_false, prob_true]`
    pub fn probabilities(&self, embedding: &Array1<f64>) -> AnalysisResult<[f64; 2]> {
        if embedding.len() != self.input_dim() {
            return Err(AnalysisError::Classifier(format!(
                "embedding has {} values, model expects {}",
                embedding.len(),
                self.input_dim()
            )));
        }

        let mut x = match &self.scaler {
            Some(scaler) => scaler.transform_single(embedding),
            None => embedding.clone(),
        };

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x);
            if i < last {
                x.mapv_inplace(|v| v.max(0.0));
            }
        }

        Ok(softmax2(x[0], x[1]))
    }

    pub fn predict(&self, embedding: &Array1<f64>) -> AnalysisResult<ClassifierOutput> {
        let [prob_false, prob_true] = self.probabilities(embedding)?;
        debug!("MLP prob_true={:.4}, prob_false={:.4}", prob_true, prob_false);
        Ok(ClassifierOutput::from_probabilities(prob_false, prob_true, self.threshold))
    }
}

impl SwingClassifier for MlpHead {
    fn classify(&self, embedding: &Path) -> AnalysisResult<ClassifierOutput> {
        let x = load_embedding(embedding)?;
        self.predict(&x)
    }
}

fn fold_batch_norm(bn: BatchNormWeights, size: usize) -> Option<FoldedNorm> {
    let sizes = [bn.gamma.len(), bn.beta.len(), bn.running_mean.len(), bn.running_var.len()];
    if sizes.iter().any(|s| *s != size) {
        return None;
    }

    let gamma = Array1::from(bn.gamma);
    let beta = Array1::from(bn.beta);
    let mean = Array1::from(bn.running_mean);
    let std = Array1::from(bn.running_var).mapv(|v| (v + bn.eps).sqrt());

    let scale = gamma / std;
    let shift = beta - &mean * &scale;
    Some(FoldedNorm { scale, shift })
}

fn softmax2(a: f64, b: f64) -> [f64; 2] {
    let max = a.max(b);
    let ea = (a - max).exp();
    let eb = (b - max).exp();
    let sum = ea + eb;
    [ea / sum, eb / sum]
}

fn shape_error(layer: usize, message: &str) -> AnalysisError {
    AnalysisError::Classifier(format!("layer {}: {}", layer, message))
}

/// Runs a classifier command with the embedding path as `{input}` and reads
/// `{"prob_true", "prob_false", "pred"}` from its stdout
pub struct ExternalClassifier {
    template: CommandTemplate,
}

impl ExternalClassifier {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl SwingClassifier for ExternalClassifier {
    fn classify(&self, embedding: &Path) -> AnalysisResult<ClassifierOutput> {
        let input = embedding.to_string_lossy();
        let args: Vec<String> = self
            .template
            .args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", "-"))
            .collect();

        let mut command = Command::new(&self.template.program);
        command
            .args(&args)
            .envs(&self.template.env)
            .stdin(Stdio::null());
        if let Some(cwd) = &self.template.cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .map_err(|e| AnalysisError::Classifier(format!("failed to start classifier: {}", e)))?;
        if !output.status.success() {
            return Err(AnalysisError::Classifier(format!(
                "classifier exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        // The JSON document is the last non-empty line; earlier lines are logs
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| AnalysisError::Classifier("classifier printed nothing".to_string()))?;
        serde_json::from_str(line.trim())
            .map_err(|e| AnalysisError::Classifier(format!("invalid classifier output: {}", e)))
    }
}
