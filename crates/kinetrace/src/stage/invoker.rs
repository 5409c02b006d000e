use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, info_span};

use super::command::{StageCommand, StageKind};
use super::runner::ProcessRunner;
use crate::sanitize::tail_excerpt;

/// Longest stderr excerpt kept on a failure.
const STDERR_EXCERPT_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct StageSuccess {
    pub stage: StageKind,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process ran and exited non-zero (`None`: killed by a signal).
    ExitCode(Option<i32>),
    /// The process could not be started.
    Spawn(String),
    /// The process exited 0 but its declared output does not exist.
    MissingOutput(PathBuf),
    /// The stage's input was missing, so it was never started.
    MissingInput(PathBuf),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExitCode(Some(code)) => write!(f, "exited with code {}", code),
            FailureReason::ExitCode(None) => f.write_str("terminated by signal"),
            FailureReason::Spawn(msg) => write!(f, "failed to start: {}", msg),
            FailureReason::MissingOutput(path) => {
                write!(f, "declared output '{}' was not produced", path.display())
            }
            FailureReason::MissingInput(path) => {
                write!(f, "input '{}' does not exist", path.display())
            }
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("Stage {stage} {reason}")]
pub struct StageFailure {
    pub stage: StageKind,
    pub reason: FailureReason,
    /// Tail of the captured stderr, for diagnostics only.
    pub stderr: String,
}

impl StageFailure {
    pub fn missing_input(stage: StageKind, path: PathBuf) -> Self {
        Self {
            stage,
            reason: FailureReason::MissingInput(path),
            stderr: String::new(),
        }
    }
}

pub type StageResult = Result<StageSuccess, StageFailure>;

/// Runs stage commands and classifies the outcome. Never retries.
#[derive(Clone)]
pub struct StageInvoker {
    runner: Arc<dyn ProcessRunner>,
}

impl StageInvoker {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    pub fn invoke(&self, command: &StageCommand) -> StageResult {
        let _span = info_span!("stage", stage = %command.stage).entered();
        info!("Running {} stage: {}", command.stage, command.display_line());

        let started = Instant::now();
        let output = match self.runner.run(command) {
            Ok(output) => output,
            Err(e) => {
                error!("{} stage could not be started: {}", command.stage, e);
                return Err(StageFailure {
                    stage: command.stage,
                    reason: FailureReason::Spawn(e.to_string()),
                    stderr: String::new(),
                });
            }
        };
        let elapsed = started.elapsed();

        if !output.success() {
            let stderr = tail_excerpt(&output.stderr, STDERR_EXCERPT_CHARS);
            error!(
                "{} stage failed ({:?}) after {:.2?}: {}",
                command.stage, output.exit_code, elapsed, stderr
            );
            return Err(StageFailure {
                stage: command.stage,
                reason: FailureReason::ExitCode(output.exit_code),
                stderr,
            });
        }

        // Exit code 0 is not enough: the declared artifact must exist.
        if !command.declared_output.exists() {
            error!(
                "{} stage exited 0 but did not produce {}",
                command.stage,
                command.declared_output.display()
            );
            return Err(StageFailure {
                stage: command.stage,
                reason: FailureReason::MissingOutput(command.declared_output.clone()),
                stderr: tail_excerpt(&output.stderr, STDERR_EXCERPT_CHARS),
            });
        }

        info!("{} stage finished in {:.2?}", command.stage, elapsed);
        debug!("{} stage stdout: {}", command.stage, output.stdout.trim());

        Ok(StageSuccess {
            stage: command.stage,
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ProcessOutput;
    use std::ffi::OsString;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedRunner(std::io::Result<ProcessOutput>);

    impl ProcessRunner for FixedRunner {
        fn run(&self, _command: &StageCommand) -> std::io::Result<ProcessOutput> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(e) => Err(std::io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn command(declared_output: &Path) -> StageCommand {
        StageCommand {
            stage: StageKind::PoseEstimation,
            program: OsString::from("python"),
            args: vec![OsString::from("predict.py")],
            working_directory: None,
            declared_output: declared_output.to_path_buf(),
        }
    }

    fn invoker(result: std::io::Result<ProcessOutput>) -> StageInvoker {
        StageInvoker::new(Arc::new(FixedRunner(result)))
    }

    #[test]
    fn test_success_requires_declared_output() {
        let temp = TempDir::new().unwrap();
        let output_file = temp.path().join("v.mp4");
        std::fs::write(&output_file, b"video").unwrap();

        let result = invoker(Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: "done".to_string(),
            stderr: String::new(),
        }))
        .invoke(&command(&output_file));

        let success = result.unwrap();
        assert_eq!(success.stage, StageKind::PoseEstimation);
        assert_eq!(success.stdout, "done");
    }

    #[test]
    fn test_exit_zero_without_output_is_failure() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("never-written.mp4");

        let failure = invoker(Ok(ProcessOutput {
            exit_code: Some(0),
            ..Default::default()
        }))
        .invoke(&command(&missing))
        .unwrap_err();

        assert_eq!(failure.reason, FailureReason::MissingOutput(missing));
    }

    #[test]
    fn test_non_zero_exit_carries_stderr() {
        let temp = TempDir::new().unwrap();
        let failure = invoker(Ok(ProcessOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "RuntimeError: CUDA out of memory\n".to_string(),
        }))
        .invoke(&command(temp.path()))
        .unwrap_err();

        assert_eq!(failure.stage, StageKind::PoseEstimation);
        assert_eq!(failure.reason, FailureReason::ExitCode(Some(1)));
        assert_eq!(failure.stderr, "RuntimeError: CUDA out of memory");
        assert!(failure.to_string().contains("pose_estimation exited with code 1"));
    }

    #[test]
    fn test_signal_termination_is_failure() {
        let temp = TempDir::new().unwrap();
        let failure = invoker(Ok(ProcessOutput {
            exit_code: None,
            ..Default::default()
        }))
        .invoke(&command(temp.path()))
        .unwrap_err();

        assert_eq!(failure.reason, FailureReason::ExitCode(None));
    }

    #[test]
    fn test_spawn_error_is_failure_not_panic() {
        let temp = TempDir::new().unwrap();
        let failure = invoker(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "python: not found",
        )))
        .invoke(&command(temp.path()))
        .unwrap_err();

        assert!(matches!(failure.reason, FailureReason::Spawn(ref msg) if msg.contains("not found")));
    }
}
