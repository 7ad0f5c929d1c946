use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by the user document store
///
/// Anything in here is an infrastructure fault: the database file could not
/// be read or written, or its content is not valid JSON. Lookup misses are
/// not errors; they are reported as `Ok(None)` / `Ok(false)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file or its directory could not be accessed
    #[error("failed to access user database {path}: {source}")]
    Io {
        /// Path of the database file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The database file exists but does not parse as JSON
    #[error("user database {path} is not valid JSON: {source}")]
    Corrupt {
        /// Path of the database file
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },
}

/// A registered dashboard user
///
/// Records are keyed by normalized email. The password is stored as an
/// opaque string and compared verbatim; result slots are a sparse map from
/// slot index to rendered HTML, so the same record shape serves any
/// configured slot count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Display name shown in the dashboard header
    pub name: String,

    /// Email address, stored normalized (trimmed, lowercased)
    pub email: String,

    /// Opaque credential, compared verbatim on login
    pub password: String,

    /// Optional profile picture, served as-is by the image endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<Vec<u8>>,

    /// Result slots: slot index -> rendered HTML
    #[serde(default)]
    pub results: BTreeMap<usize, String>,
}

/// JSON-file document store for user records
///
/// The whole database is one JSON object mapping normalized email to
/// [`UserRecord`]. Every operation is a full read (and, for writers, a full
/// rewrite) of that file under an internal lock, which is what makes the
/// partial slot update atomic per call.
pub struct UserStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Normalize an email address for storage and lookup
///
/// Matching is case- and whitespace-insensitive everywhere, so both sides of
/// every comparison go through this.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl UserStore {
    /// Open (creating if necessary) the user database at the given path
    ///
    /// Creates the parent directory and an empty `{}` database file when
    /// they do not exist yet, so a fresh checkout works without setup.
    ///
    /// # Arguments
    /// * `path` - Location of the JSON database file
    ///
    /// # Returns
    /// * `Result<UserStore, StoreError>` - The opened store or an IO error
    ///
    /// # Errors
    /// * Returns an error if the directory or file cannot be created
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                create_dir_all(dir).map_err(|source| StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        if !path.exists() {
            let mut file = File::create(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            file.write_all(b"{}").map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Look up a user by email
    ///
    /// # Arguments
    /// * `email` - Address to look up; normalized before matching
    ///
    /// # Returns
    /// * `Result<Option<UserRecord>, StoreError>` - The record if one matches
    ///
    /// # Errors
    /// * Returns an error if the database cannot be read or parsed
    pub fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let users = self.load()?;
        Ok(users.get(&normalize_email(email)).cloned())
    }

    /// Insert a new user record
    ///
    /// The record's email is normalized before it becomes the key. Nothing
    /// is written when a record with the same normalized email already
    /// exists.
    ///
    /// # Arguments
    /// * `record` - The record to store
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - True if inserted, false on duplicate
    ///
    /// # Errors
    /// * Returns an error if the database cannot be read or written
    pub fn insert(&self, mut record: UserRecord) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut users = self.load()?;

        let key = normalize_email(&record.email);
        if users.contains_key(&key) {
            return Ok(false);
        }

        record.email = key.clone();
        users.insert(key, record);
        self.save(&users)?;

        Ok(true)
    }

    /// Apply a batch of result-slot updates to one user record
    ///
    /// Sets exactly the provided slots on the matched record; every other
    /// slot and every other field is left untouched. The read-modify-write
    /// happens under the store lock, so the batch lands as a single atomic
    /// update.
    ///
    /// # Arguments
    /// * `email` - Address of the record to update; normalized before matching
    /// * `updates` - Slot index -> new HTML content
    ///
    /// # Returns
    /// * `Result<bool, StoreError>` - True if a record matched, false otherwise
    ///
    /// # Errors
    /// * Returns an error if the database cannot be read or written
    pub fn update_results(
        &self,
        email: &str,
        updates: &BTreeMap<usize, String>,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().unwrap();
        let mut users = self.load()?;

        match users.get_mut(&normalize_email(email)) {
            Some(user) => {
                for (slot, content) in updates {
                    user.results.insert(*slot, content.clone());
                }
                self.save(&users)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load(&self) -> Result<HashMap<String, UserRecord>, StoreError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, users: &HashMap<String, UserRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(users).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(email: &str) -> UserRecord {
        UserRecord {
            name: "Alice".to_string(),
            email: email.to_string(),
            password: "hunter2".to_string(),
            profile_image: None,
            results: BTreeMap::new(),
        }
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db/users.json");

        let store = UserStore::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.find_by_email("nobody@x.com").unwrap().is_none());
    }

    #[test]
    fn insert_rejects_duplicate_normalized_email() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(&dir.path().join("users.json")).unwrap();

        assert!(store.insert(record("alice@x.com")).unwrap());
        assert!(!store.insert(record("  Alice@X.com ")).unwrap());
    }

    #[test]
    fn lookup_is_case_and_whitespace_insensitive() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(&dir.path().join("users.json")).unwrap();
        store.insert(record("alice@x.com")).unwrap();

        let found = store.find_by_email(" Alice@X.com ").unwrap().unwrap();
        assert_eq!(found.email, "alice@x.com");
    }

    #[test]
    fn update_results_sets_only_the_given_slots() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(&dir.path().join("users.json")).unwrap();

        let mut existing = record("alice@x.com");
        existing.results.insert(1, "<p>old one</p>".to_string());
        existing.results.insert(2, "<p>old two</p>".to_string());
        existing.profile_image = Some(vec![0xff, 0xd8]);
        store.insert(existing).unwrap();

        let mut updates = BTreeMap::new();
        updates.insert(2, "<p>new two</p>".to_string());
        updates.insert(5, "<p>new five</p>".to_string());
        assert!(store.update_results("alice@x.com", &updates).unwrap());

        let user = store.find_by_email("alice@x.com").unwrap().unwrap();
        assert_eq!(user.results.get(&1).unwrap(), "<p>old one</p>");
        assert_eq!(user.results.get(&2).unwrap(), "<p>new two</p>");
        assert_eq!(user.results.get(&5).unwrap(), "<p>new five</p>");
        assert_eq!(user.profile_image, Some(vec![0xff, 0xd8]));
        assert_eq!(user.password, "hunter2");
    }

    #[test]
    fn update_results_reports_unmatched_email() {
        let dir = tempdir().unwrap();
        let store = UserStore::open(&dir.path().join("users.json")).unwrap();

        let mut updates = BTreeMap::new();
        updates.insert(1, "<p>orphan</p>".to_string());
        assert!(!store.update_results("ghost@x.com", &updates).unwrap());
    }
}
