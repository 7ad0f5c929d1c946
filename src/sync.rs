use crate::config::Config;
use crate::store::{StoreError, UserStore, normalize_email};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a sync pass
///
/// `NoActiveUser` and `NoArtifactsFound` are the two soft outcomes: the pass
/// had nothing to do and touched nothing. The other variants are
/// infrastructure faults.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The current-user file is absent or holds no email
    #[error("no active user recorded in {0}")]
    NoActiveUser(PathBuf),

    /// The current-user file exists but could not be read
    #[error("failed to read current user file {path}: {source}")]
    PointerUnreadable {
        /// The pointer file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No result artifact exists for any configured slot
    #[error("no result artifacts found in {0}")]
    NoArtifactsFound(PathBuf),

    /// An artifact exists but its content could not be read
    #[error("failed to read artifact {path}: {source}")]
    ArtifactUnreadable {
        /// The artifact file path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The user database could not be read or written
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one sync pass did
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Normalized email the artifacts were attributed to
    pub email: String,

    /// Slots for which an artifact was found and ingested
    pub slots: Vec<usize>,

    /// Whether a user record matched the email
    pub matched: bool,

    /// Slots whose artifact file was removed after ingestion
    pub deleted: Vec<usize>,
}

/// Move pending result artifacts into the current user's record
///
/// One pass, invoked out-of-band of any HTTP request: read the current-user
/// file, collect every `result<slot>.html` present on disk, write them to
/// the matched user record as a single batch, then delete the collected
/// files. Whoever is recorded in the current-user file at this moment owns
/// all pending artifacts; that single-tenancy assumption is part of the
/// design.
///
/// Artifacts are deleted once their content has been read, even when the
/// database write fails — the files are never left behind to be attributed
/// to the next user. A store error still propagates after cleanup.
pub fn sync_results(config: &Config) -> Result<SyncReport, SyncError> {
    let email = read_current_user(config)?;
    log::info!("syncing results for {}", email);

    // Collect whichever slots have an artifact on disk.
    let mut updates = BTreeMap::new();
    for slot in 1..=config.slot_count {
        let path = config.artifact_path(slot);
        match fs::read_to_string(&path) {
            Ok(content) => {
                updates.insert(slot, content);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("{} not found, skipping slot {}", path.display(), slot);
            }
            Err(source) => return Err(SyncError::ArtifactUnreadable { path, source }),
        }
    }

    if updates.is_empty() {
        return Err(SyncError::NoArtifactsFound(config.artifacts_dir.clone()));
    }

    let store = UserStore::open(&config.database_path)?;
    let write_result = store.update_results(&email, &updates);

    // Unconditional cleanup: content is in memory, the files must not leak
    // into the next user's pass.
    let mut deleted = Vec::new();
    for slot in updates.keys() {
        let path = config.artifact_path(*slot);
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("{} deleted successfully.", path.display());
                deleted.push(*slot);
            }
            Err(err) => log::error!("failed to delete {}: {}", path.display(), err),
        }
    }

    let matched = write_result?;
    if !matched {
        log::warn!("no user record matched {}", email);
    }

    Ok(SyncReport {
        email,
        slots: updates.keys().copied().collect(),
        matched,
        deleted,
    })
}

fn read_current_user(config: &Config) -> Result<String, SyncError> {
    let path = &config.current_user_file;
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(SyncError::NoActiveUser(path.clone()));
        }
        Err(source) => {
            return Err(SyncError::PointerUnreadable {
                path: path.clone(),
                source,
            });
        }
    };

    let email = normalize_email(&raw);
    if email.is_empty() {
        return Err(SyncError::NoActiveUser(path.clone()));
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserRecord;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(root: &Path) -> Config {
        Config {
            database_path: root.join("users.json"),
            uploads_dir: root.join("uploads"),
            scripts_dir: root.join("scripts"),
            artifacts_dir: root.to_path_buf(),
            current_user_file: root.join("currentUser.txt"),
            slot_count: 9,
            interpreter: "sh".to_string(),
            script_extension: "sh".to_string(),
            script_timeout: Duration::from_secs(5),
            max_parallel: 2,
        }
    }

    fn seed_user(config: &Config, email: &str) {
        let store = UserStore::open(&config.database_path).unwrap();
        let mut record = UserRecord {
            name: "Alice".to_string(),
            email: email.to_string(),
            password: "hunter2".to_string(),
            profile_image: None,
            results: BTreeMap::new(),
        };
        record.results.insert(1, "<p>kept</p>".to_string());
        store.insert(record).unwrap();
    }

    #[test]
    fn missing_pointer_touches_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        seed_user(&config, "alice@x.com");
        fs::write(config.artifact_path(2), "<p>two</p>").unwrap();

        let err = sync_results(&config).unwrap_err();
        assert!(matches!(err, SyncError::NoActiveUser(_)));

        // Artifact untouched, record untouched.
        assert!(config.artifact_path(2).exists());
        let store = UserStore::open(&config.database_path).unwrap();
        let user = store.find_by_email("alice@x.com").unwrap().unwrap();
        assert!(!user.results.contains_key(&2));
    }

    #[test]
    fn blank_pointer_counts_as_no_active_user() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.current_user_file, "   \n").unwrap();

        let err = sync_results(&config).unwrap_err();
        assert!(matches!(err, SyncError::NoActiveUser(_)));
    }

    #[test]
    fn present_slots_are_ingested_and_deleted() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        seed_user(&config, "alice@x.com");

        // Pointer value matches the stored key only after normalization.
        fs::write(&config.current_user_file, " Alice@X.com \n").unwrap();
        fs::write(config.artifact_path(2), "<p>two</p>").unwrap();
        fs::write(config.artifact_path(5), "<p>five</p>").unwrap();

        let report = sync_results(&config).unwrap();
        assert!(report.matched);
        assert_eq!(report.email, "alice@x.com");
        assert_eq!(report.slots, vec![2, 5]);
        assert_eq!(report.deleted, vec![2, 5]);

        assert!(!config.artifact_path(2).exists());
        assert!(!config.artifact_path(5).exists());

        let store = UserStore::open(&config.database_path).unwrap();
        let user = store.find_by_email("alice@x.com").unwrap().unwrap();
        assert_eq!(user.results.get(&1).unwrap(), "<p>kept</p>");
        assert_eq!(user.results.get(&2).unwrap(), "<p>two</p>");
        assert_eq!(user.results.get(&5).unwrap(), "<p>five</p>");
        assert!(!user.results.contains_key(&3));
    }

    #[test]
    fn second_pass_finds_no_artifacts() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        seed_user(&config, "alice@x.com");
        fs::write(&config.current_user_file, "alice@x.com").unwrap();
        fs::write(config.artifact_path(3), "<p>three</p>").unwrap();

        sync_results(&config).unwrap();

        let err = sync_results(&config).unwrap_err();
        assert!(matches!(err, SyncError::NoArtifactsFound(_)));
    }

    #[test]
    fn unmatched_email_is_reported_and_artifacts_still_removed() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        seed_user(&config, "alice@x.com");
        fs::write(&config.current_user_file, "ghost@x.com").unwrap();
        fs::write(config.artifact_path(4), "<p>four</p>").unwrap();

        let report = sync_results(&config).unwrap();
        assert!(!report.matched);
        assert_eq!(report.deleted, vec![4]);
        assert!(!config.artifact_path(4).exists());
    }
}
