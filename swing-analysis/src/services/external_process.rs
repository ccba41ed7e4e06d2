use crate::config::CommandTemplate;
use crate::error::{AnalysisError, AnalysisResult};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A fully resolved external program invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExternalCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Build from a template, substituting `{input}` and `{output}` in every
    /// argument
    pub fn from_template(template: &CommandTemplate, input: &Path, output: &Path) -> Self {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let args = template
            .args
            .iter()
            .map(|arg| {
                OsString::from(
                    arg.replace("{input}", &input)
                        .replace("{output}", &output),
                )
            })
            .collect();

        Self {
            program: OsString::from(&template.program),
            args,
            env: template.env.clone(),
            cwd: template.cwd.clone(),
        }
    }

    /// Human-readable command line for logs and error records
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. A nonzero exit status is an error carrying the
    /// step name, exit code and stderr.
    pub async fn run(&self, step: &str) -> AnalysisResult<ProcessOutput> {
        info!(stage = step, "Running: {}", self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|e| AnalysisError::ExternalProcess {
            step: step.to_string(),
            code: None,
            stderr: format!("failed to start {}: {}", self.program.to_string_lossy(), e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(AnalysisError::ExternalProcess {
                step: step.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(stage = step, "Finished with {} bytes of output", stdout.len());
        Ok(ProcessOutput { stdout, stderr })
    }
}

/// Retry configuration with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    /// Execute a function with retries and exponential backoff
    pub async fn execute<F, Fut, T>(&self, step: &str, mut func: F) -> AnalysisResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = AnalysisResult<T>>,
    {
        let mut attempt = 0;
        let mut delay_ms = self.initial_delay_ms;

        loop {
            match func().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt >= self.retries {
                        return Err(e);
                    }
                    attempt += 1;

                    warn!(
                        stage = step,
                        "Attempt {} failed, retrying in {}ms: {}", attempt, delay_ms, e
                    );
                    sleep(Duration::from_millis(delay_ms)).await;

                    delay_ms = ((delay_ms as f64 * self.backoff_factor) as u64).min(self.max_delay_ms);
                }
            }
        }
    }
}

/// Run a templated step with the template's retry count
pub async fn run_step(
    template: &CommandTemplate,
    step: &str,
    input: &Path,
    output: &Path,
) -> AnalysisResult<ProcessOutput> {
    let command = ExternalCommand::from_template(template, input, output);
    RetryPolicy::with_retries(template.retries)
        .execute(step, || command.run(step))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_template_substitution() {
        let template = CommandTemplate {
            program: "openpose".to_string(),
            args: vec![
                "--video".to_string(),
                "{input}".to_string(),
                "--write_json".to_string(),
                "{output}".to_string(),
                "--prefix={input}.log".to_string(),
            ],
            cwd: Some(PathBuf::from("/opt/openpose")),
            env: BTreeMap::new(),
            retries: 1,
        };
        let command =
            ExternalCommand::from_template(&template, Path::new("/tmp/a.mp4"), Path::new("/tmp/json"));
        assert_eq!(
            command.display(),
            "openpose --video /tmp/a.mp4 --write_json /tmp/json --prefix=/tmp/a.mp4.log"
        );
        assert_eq!(command.cwd, Some(PathBuf::from("/opt/openpose")));
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = fast_policy(1)
            .execute("detect", || {
                let attempts = attempts_clone.clone();
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 2 {
                        Err(AnalysisError::Video("flaky".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = RetryPolicy::default()
            .execute("embed", || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(AnalysisError::Video("always".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_program_is_process_error() {
        let result = ExternalCommand::new("definitely-not-a-real-program-4821")
            .arg("--help")
            .run("detect")
            .await;
        assert_matches!(
            result,
            Err(AnalysisError::ExternalProcess { ref step, code: None, .. }) if step == "detect"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let result = ExternalCommand::new("sh")
            .arg("-c")
            .arg("echo 'model folder missing' >&2; exit 3")
            .run("detect")
            .await;
        match result {
            Err(AnalysisError::ExternalProcess { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "model folder missing");
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.stdout)),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_captured() {
        let output = ExternalCommand::new("sh")
            .arg("-c")
            .arg("printf '{\"ok\": true}'")
            .run("classify")
            .await
            .unwrap();
        assert_eq!(output.stdout, "{\"ok\": true}");
    }
}
