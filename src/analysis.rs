use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Infrastructure failures of an analysis run
///
/// Per-script failures never show up here; they are collected into the
/// report's failure list. This enum is only for faults that prevent the run
/// from happening at all.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The uploaded capture file is gone or was never written
    #[error("capture file not found: {0}")]
    CaptureMissing(PathBuf),

    /// The script directory exists but could not be listed
    #[error("failed to read scripts directory {dir}: {source}")]
    ScriptsDirUnreadable {
        /// The configured script directory
        dir: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The script directory contains no scripts with the configured extension
    #[error("no analysis scripts found in {0}")]
    NoScriptsAvailable(PathBuf),
}

/// Configuration options for an analysis run
///
/// Scripts are invoked as `<interpreter> <script> <capture>`, one OS process
/// per script, all concurrently up to `max_parallel` at a time. A script
/// still running after `timeout` is killed and reported as a failure.
#[derive(Clone, Debug)]
pub struct AnalysisOptions {
    /// Directory scanned for analysis scripts
    pub scripts_dir: PathBuf,

    /// Interpreter the scripts are run with
    pub interpreter: String,

    /// File extension that identifies a script
    pub extension: String,

    /// Per-script execution deadline
    pub timeout: Duration,

    /// Maximum number of scripts running at the same time
    pub max_parallel: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("plotting_scripts"),
            interpreter: "python3".to_string(),
            extension: "py".to_string(),
            timeout: Duration::from_secs(300),
            max_parallel: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// One script that exited cleanly, with its captured standard output
#[derive(Debug, Clone, Serialize)]
pub struct ScriptSuccess {
    /// Script file name
    pub script: String,

    /// Complete standard output of the script
    pub output: String,
}

/// One script that did not exit cleanly
#[derive(Debug, Clone, Serialize)]
pub struct ScriptFailure {
    /// Script file name
    pub script: String,

    /// Exit code, if the process got far enough to have one
    pub code: Option<i32>,

    /// Captured standard error, or a description of what went wrong
    pub error: String,
}

/// Aggregated outcome of one analysis run
///
/// Every discovered script lands in exactly one of the two lists. A report
/// full of failures is still a successful run of the pipeline itself.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    /// Scripts that exited with status zero
    pub successes: Vec<ScriptSuccess>,

    /// Scripts that exited nonzero, failed to launch, or timed out
    pub failures: Vec<ScriptFailure>,
}

/// Run every discovered analysis script against an uploaded capture file
///
/// Discovers the scripts in `options.scripts_dir`, spawns all of them
/// concurrently with the capture path as their sole argument, and waits for
/// every one of them to reach a terminal state before returning. There is no
/// short-circuit: one script failing does not stop the others, and the
/// report always accounts for every discovered script.
///
/// The scripts write their plot files to disk on their own; this function
/// neither inspects nor moves those artifacts.
///
/// # Arguments
/// * `capture_path` - Path of the uploaded capture file
/// * `options` - Script discovery and execution options
///
/// # Returns
/// * `Result<AnalysisReport, AnalysisError>` - Per-script outcomes, or an
///   infrastructure error if the run could not start
///
/// # Errors
/// * `CaptureMissing` if the capture file does not exist
/// * `ScriptsDirUnreadable` if the script directory cannot be listed
/// * `NoScriptsAvailable` if no scripts match the configured extension
pub async fn run_analysis(
    capture_path: &Path,
    options: &AnalysisOptions,
) -> Result<AnalysisReport, AnalysisError> {
    if !capture_path.exists() {
        return Err(AnalysisError::CaptureMissing(capture_path.to_path_buf()));
    }

    let scripts = discover_scripts(&options.scripts_dir, &options.extension)?;
    if scripts.is_empty() {
        return Err(AnalysisError::NoScriptsAvailable(
            options.scripts_dir.clone(),
        ));
    }

    // One permit per running process; excess scripts queue on the semaphore.
    let permits = Arc::new(Semaphore::new(options.max_parallel.max(1)));

    let runs = scripts.into_iter().map(|script| {
        let permits = Arc::clone(&permits);
        let capture = capture_path.to_path_buf();
        let interpreter = options.interpreter.clone();
        let deadline = options.timeout;

        async move {
            let _permit = permits.acquire().await.unwrap();
            run_script(&script, &capture, &interpreter, deadline).await
        }
    });

    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for outcome in join_all(runs).await {
        match outcome {
            Ok(success) => successes.push(success),
            Err(failure) => failures.push(failure),
        }
    }

    Ok(AnalysisReport {
        successes,
        failures,
    })
}

/// Run a single script to completion, capturing its output streams
async fn run_script(
    script: &Path,
    capture: &Path,
    interpreter: &str,
    deadline: Duration,
) -> Result<ScriptSuccess, ScriptFailure> {
    let name = script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string());

    let mut command = Command::new(interpreter);
    command.arg(script).arg(capture).kill_on_drop(true);

    let output = match timeout(deadline, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            log::error!("{} failed to launch: {}", name, err);
            return Err(ScriptFailure {
                script: name,
                code: None,
                error: format!("failed to launch: {}", err),
            });
        }
        // Dropping the in-flight future kills the child (kill_on_drop).
        Err(_) => {
            log::error!("{} timed out after {:?}", name, deadline);
            return Err(ScriptFailure {
                script: name,
                code: None,
                error: format!("timed out after {:?} and was killed", deadline),
            });
        }
    };

    if output.status.success() {
        log::info!("{} completed successfully.", name);
        Ok(ScriptSuccess {
            script: name,
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    } else {
        let error = String::from_utf8_lossy(&output.stderr).into_owned();
        log::error!(
            "{} exited with code {:?}. Error: {}",
            name,
            output.status.code(),
            error
        );
        Err(ScriptFailure {
            script: name,
            code: output.status.code(),
            error,
        })
    }
}

fn discover_scripts(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, AnalysisError> {
    let entries = std::fs::read_dir(dir).map_err(|source| AnalysisError::ScriptsDirUnreadable {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut scripts: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(extension)
        })
        .collect();
    scripts.sort();

    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn shell_options(dir: &Path) -> AnalysisOptions {
        AnalysisOptions {
            scripts_dir: dir.to_path_buf(),
            interpreter: "sh".to_string(),
            extension: "sh".to_string(),
            timeout: Duration::from_secs(5),
            max_parallel: 4,
        }
    }

    fn write_script(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn report_accounts_for_every_script() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("trace.pcapng");
        fs::write(&capture, b"capture bytes").unwrap();

        let scripts = dir.path().join("scripts");
        fs::create_dir(&scripts).unwrap();
        write_script(&scripts, "ok.sh", "printf 'analysis ok'\n");
        write_script(&scripts, "bad.sh", "echo boom >&2\nexit 3\n");
        write_script(&scripts, "quiet.sh", "exit 0\n");

        let report = run_analysis(&capture, &shell_options(&scripts))
            .await
            .unwrap();

        assert_eq!(report.successes.len() + report.failures.len(), 3);
        assert_eq!(report.successes.len(), 2);
        assert_eq!(report.failures.len(), 1);

        let ok = report
            .successes
            .iter()
            .find(|s| s.script == "ok.sh")
            .unwrap();
        assert_eq!(ok.output, "analysis ok");

        let bad = &report.failures[0];
        assert_eq!(bad.script, "bad.sh");
        assert_eq!(bad.code, Some(3));
        assert!(bad.error.contains("boom"));
    }

    #[tokio::test]
    async fn capture_path_is_passed_to_each_script() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("trace.pcapng");
        fs::write(&capture, "packet payload").unwrap();

        let scripts = dir.path().join("scripts");
        fs::create_dir(&scripts).unwrap();
        write_script(&scripts, "dump.sh", "cat \"$1\"\n");

        let report = run_analysis(&capture, &shell_options(&scripts))
            .await
            .unwrap();

        assert_eq!(report.successes[0].output, "packet payload");
    }

    #[tokio::test]
    async fn empty_script_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("trace.pcapng");
        fs::write(&capture, b"capture bytes").unwrap();

        let scripts = dir.path().join("scripts");
        fs::create_dir(&scripts).unwrap();

        let err = run_analysis(&capture, &shell_options(&scripts))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoScriptsAvailable(_)));
    }

    #[tokio::test]
    async fn missing_capture_is_an_error() {
        let dir = tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        fs::create_dir(&scripts).unwrap();
        write_script(&scripts, "ok.sh", "exit 0\n");

        let err = run_analysis(&dir.path().join("gone.pcapng"), &shell_options(&scripts))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::CaptureMissing(_)));
    }

    #[tokio::test]
    async fn hung_script_is_killed_and_reported() {
        let dir = tempdir().unwrap();
        let capture = dir.path().join("trace.pcapng");
        fs::write(&capture, b"capture bytes").unwrap();

        let scripts = dir.path().join("scripts");
        fs::create_dir(&scripts).unwrap();
        write_script(&scripts, "hang.sh", "sleep 30\n");

        let mut options = shell_options(&scripts);
        options.timeout = Duration::from_millis(200);

        let report = run_analysis(&capture, &options).await.unwrap();

        assert!(report.successes.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, None);
        assert!(report.failures[0].error.contains("timed out"));
    }
}
