use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Runtime configuration for the dashboard and the sync utility.
///
/// Everything is read once from the environment at startup; the defaults
/// match the directory layout the analysis scripts expect.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the JSON user database.
    pub database_path: PathBuf,

    /// Directory uploaded capture files are stored in.
    pub uploads_dir: PathBuf,

    /// Directory containing the external analysis scripts.
    pub scripts_dir: PathBuf,

    /// Directory the analysis scripts write their result files into.
    pub artifacts_dir: PathBuf,

    /// File recording the email of the most recently logged-in user.
    pub current_user_file: PathBuf,

    /// Number of result slots on a user record.
    pub slot_count: usize,

    /// Interpreter the analysis scripts are run with.
    pub interpreter: String,

    /// File extension that identifies an analysis script.
    pub script_extension: String,

    /// Per-script execution deadline.
    pub script_timeout: Duration,

    /// Maximum number of scripts running at the same time.
    pub max_parallel: usize,
}

impl Config {
    /// Build a configuration from the environment, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            database_path: path_var("PCAPDASH_DB", "database/users.json"),
            uploads_dir: path_var("PCAPDASH_UPLOADS", "uploads"),
            scripts_dir: path_var("PCAPDASH_SCRIPTS", "plotting_scripts"),
            artifacts_dir: path_var("PCAPDASH_ARTIFACTS", "."),
            current_user_file: path_var("PCAPDASH_CURRENT_USER", "currentUser.txt"),
            slot_count: parsed_var("PCAPDASH_SLOTS", 9),
            interpreter: env::var("PCAPDASH_INTERPRETER").unwrap_or_else(|_| "python3".to_string()),
            script_extension: env::var("PCAPDASH_SCRIPT_EXT").unwrap_or_else(|_| "py".to_string()),
            script_timeout: Duration::from_secs(parsed_var("PCAPDASH_SCRIPT_TIMEOUT_SECS", 300)),
            max_parallel: parsed_var("PCAPDASH_MAX_PARALLEL", default_parallelism()),
        }
    }

    /// Path of the artifact file for one result slot.
    pub fn artifact_path(&self, slot: usize) -> PathBuf {
        self.artifacts_dir.join(format!("result{}.html", slot))
    }
}

fn path_var(name: &str, fallback: &str) -> PathBuf {
    env::var(name).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(fallback))
}

fn parsed_var<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
