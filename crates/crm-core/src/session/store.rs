//! Persistent credential storage.
//!
//! The session lives under three keys of a key-value backend:
//! a composite `crm_auth` record (user + access-token marker), the bare
//! access token and the refresh token. The file backend stores them in
//! `<base>/session.json` with restricted permissions (0600).
//! Tokens are never logged or displayed in full.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::state::{Session, User};
use crate::config::paths;

/// Key of the composite session record.
pub const AUTH_KEY: &str = "crm_auth";
/// Key of the short-lived access token.
pub const ACCESS_KEY: &str = "crm_access";
/// Key of the long-lived refresh token.
pub const REFRESH_KEY: &str = "crm_refresh";

/// Raw string key-value storage.
pub trait StoreBackend: Send + Sync {
    /// # Errors
    /// Returns an error if the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    /// Returns an error if the underlying storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// # Errors
    /// Returns an error if the underlying storage cannot be written.
    fn remove(&self, key: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local backend; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl StoreBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// JSON file backend.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    /// Held by readers and writers alike; a reader never sees a partial file.
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries. A missing file is an empty map.
    fn read_entries(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;

        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session file {}", self.path.display()))
    }

    /// Loads entries for a read-modify-write cycle.
    /// A corrupt file is discarded rather than blocking every future write.
    fn entries_for_update(&self) -> HashMap<String, String> {
        self.read_entries().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "discarding unreadable session file");
            HashMap::new()
        })
    }

    /// Writes to a sibling temp file and renames it over the session file.
    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(entries).context("Failed to serialize session")?;
        let tmp_path = self.path.with_extension("json.tmp");

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp_path)
                .with_context(|| format!("Failed to open {} for writing", tmp_path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", tmp_path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&tmp_path, contents)
                .with_context(|| format!("Failed to write to {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}

impl StoreBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = lock(&self.lock);
        Ok(self.read_entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = lock(&self.lock);
        let mut entries = self.entries_for_update();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = lock(&self.lock);
        let mut entries = self.entries_for_update();
        if entries.remove(key).is_none() && !self.path.exists() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

/// Composite record stored under [`AUTH_KEY`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthRecord {
    user: User,
    #[serde(default)]
    access_token: Option<String>,
}

/// Session-aware view over a [`StoreBackend`].
///
/// Reads fail open: any backend or parse error reads as "nothing stored".
/// Writes are best effort and only logged on failure.
pub struct CredentialStore {
    backend: Box<dyn StoreBackend>,
    location: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            location: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// File-backed store at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            backend: Box::new(FileBackend::new(path.clone())),
            location: Some(path),
        }
    }

    /// File-backed store at `<CRM_HOME>/session.json`.
    pub fn open_default() -> Self {
        Self::file(paths::session_path())
    }

    /// Where the session is persisted, if on disk.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Writes the user record and whichever tokens the session carries.
    pub fn save(&self, session: &Session) {
        if let Some(access) = &session.access_token {
            self.set_access_token(access);
        }
        if let Some(refresh) = &session.refresh_token {
            self.set_refresh_token(refresh);
        }

        match &session.user {
            Some(user) => {
                let record = AuthRecord {
                    user: user.clone(),
                    access_token: session.access_token.clone().or_else(|| self.access_token()),
                };
                match serde_json::to_string(&record) {
                    Ok(json) => self.write(AUTH_KEY, &json),
                    Err(err) => tracing::warn!(error = %err, "failed to serialize session record"),
                }
            }
            None => self.delete(AUTH_KEY),
        }
    }

    /// Returns the last saved user plus the currently stored tokens.
    pub fn load(&self) -> Session {
        let user = self.read(AUTH_KEY).and_then(|raw| {
            serde_json::from_str::<Option<AuthRecord>>(&raw)
                .inspect_err(|err| {
                    tracing::debug!(error = %err, "ignoring malformed session record");
                })
                .ok()
                .flatten()
                .map(|record| record.user)
        });

        Session {
            user,
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        }
    }

    /// Removes every session key.
    pub fn clear(&self) {
        self.delete(AUTH_KEY);
        self.clear_tokens();
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_KEY).filter(|t| !t.is_empty())
    }

    pub fn set_access_token(&self, token: &str) {
        self.write(ACCESS_KEY, token);
    }

    pub fn set_refresh_token(&self, token: &str) {
        self.write(REFRESH_KEY, token);
    }

    /// Removes the access and refresh tokens, keeping the user record.
    pub fn clear_tokens(&self) {
        self.delete(ACCESS_KEY);
        self.delete(REFRESH_KEY);
    }

    fn read(&self, key: &str) -> Option<String> {
        self.backend
            .get(key)
            .inspect_err(|err| tracing::debug!(key, error = %err, "credential store read failed"))
            .ok()
            .flatten()
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(err) = self.backend.set(key, value) {
            tracing::warn!(key, error = %err, "credential store write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(err) = self.backend.remove(key) {
            tracing::warn!(key, error = %err, "credential store delete failed");
        }
    }
}

/// Returns a masked version of a token for display (first 12 chars + ...).
pub fn mask_token(token: &str) -> String {
    if token.chars().count() <= 16 {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(12).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::session::state::Role;

    fn ann() -> User {
        User {
            id: "u1".to_string(),
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            role: Role::Admin,
        }
    }

    fn full_session() -> Session {
        Session {
            user: Some(ann()),
            access_token: Some("A1".to_string()),
            refresh_token: Some("R1".to_string()),
        }
    }

    #[test]
    fn test_load_empty_store_is_anonymous() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.load(), Session::default());
    }

    #[test]
    fn test_save_writes_composite_record_and_tokens() {
        let backend = MemoryBackend::default();
        let store = CredentialStore::new(backend);
        store.save(&full_session());

        assert_eq!(store.access_token().as_deref(), Some("A1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));

        let raw = store.read(AUTH_KEY).unwrap();
        let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["user"]["id"], "u1");
        assert_eq!(record["accessToken"], "A1");

        assert_eq!(store.load(), full_session());
    }

    #[test]
    fn test_save_without_refresh_token_keeps_key_absent() {
        let store = CredentialStore::in_memory();
        store.save(&Session {
            refresh_token: None,
            ..full_session()
        });
        assert!(store.refresh_token().is_none());
        assert!(store.load().user.is_some());
    }

    #[test]
    fn test_malformed_record_loads_as_no_user() {
        let store = CredentialStore::in_memory();
        store.write(AUTH_KEY, "{not json");
        store.set_access_token("A1");

        let session = store.load();
        assert!(session.user.is_none());
        assert_eq!(session.access_token.as_deref(), Some("A1"));
    }

    #[test]
    fn test_null_record_loads_as_no_user() {
        let store = CredentialStore::in_memory();
        store.write(AUTH_KEY, "null");
        assert!(store.load().user.is_none());
    }

    #[test]
    fn test_clear_tokens_keeps_user_record() {
        let store = CredentialStore::in_memory();
        store.save(&full_session());
        store.clear_tokens();

        let session = store.load();
        assert!(session.user.is_some());
        assert!(session.access_token.is_none());
        assert!(session.refresh_token.is_none());
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = CredentialStore::in_memory();
        store.save(&full_session());
        store.clear();
        assert_eq!(store.load(), Session::default());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        CredentialStore::file(&path).save(&full_session());

        let reopened = CredentialStore::file(&path);
        assert_eq!(reopened.load(), full_session());
        assert_eq!(reopened.location(), Some(path.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        CredentialStore::file(&path).set_access_token("A1");

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_fails_open_and_is_rewritable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "\u{0}garbage").unwrap();

        let store = CredentialStore::file(&path);
        assert_eq!(store.load(), Session::default());

        store.set_refresh_token("R1");
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_store_reads_never_observe_partial_writes() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let dir = tempdir().unwrap();
        let store = Arc::new(CredentialStore::file(dir.path().join("session.json")));
        store.save(&full_session());

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut n = 0u64;
                while !done.load(Ordering::Relaxed) {
                    store.set_access_token(&format!("A{n}"));
                    n += 1;
                }
            })
        };

        let misses = (0..2000)
            .filter(|_| store.refresh_token().is_none())
            .count();
        done.store(true, Ordering::Relaxed);
        writer.join().unwrap();

        assert_eq!(misses, 0);
        assert_eq!(store.load().user, Some(ann()));
        assert!(!dir.path().join("session.json.tmp").exists());
    }

    #[test]
    fn test_remove_on_missing_file_does_not_create_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        CredentialStore::file(&path).clear();
        assert!(!path.exists());
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJhbGciOiJI...");
        assert_eq!(mask_token("short"), "***");
    }
}
