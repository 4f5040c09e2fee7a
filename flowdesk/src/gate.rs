//! Credential gate
//!
//! The workflow surface stays locked until a session key has been accepted by
//! the backend. Accepted keys are remembered in a [`SessionStore`] so the
//! next start can re-validate silently.

use crate::api::WorkflowApi;
use crate::board::{MessageArea, SubmitControl};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Storage name of the remembered key
pub const SESSION_KEY_NAME: &str = "groq_api_key";

const VALIDATE_LABEL: &str = "Enter Workflow Builder";
const VALIDATING_LABEL: &str = "Validating...";
const INVALID_KEY: &str = "Invalid API Key";
const EMPTY_KEY: &str = "Please enter an API Key.";

/// An accepted API key
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey(<{} chars>)", self.0.len())
    }
}

/// Session-scoped key/value storage
pub trait SessionStore: Send {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&mut self, name: &str, value: &str) -> io::Result<()>;

    fn remove(&mut self, name: &str) -> io::Result<()>;
}

/// Storage that lives as long as the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.values.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        self.values.remove(name);
        Ok(())
    }
}

/// Storage in a small JSON object file, shared by invocations of the CLI
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Map<String, Value> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to read session file");
                return Map::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Session file is corrupt, ignoring it");
                Map::new()
            }
        }
    }

    /// Replace the file through a private temp file and a rename
    fn write(&self, map: &Map<String, Value>) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(map)?;
        let tmp_path = parent.join(format!(
            ".{}.tmp-{}-{}",
            self.path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("session"),
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        ));

        let written = write_private(&tmp_path, json.as_bytes())
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));
        if written.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        written
    }
}

/// Create `path` readable by the owner only, then fill it
fn write_private(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(content)?;
    file.sync_all()
}

impl SessionStore for FileSessionStore {
    fn get(&self, name: &str) -> Option<String> {
        self.read()
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn set(&mut self, name: &str, value: &str) -> io::Result<()> {
        let mut map = self.read();
        map.insert(name.to_string(), Value::String(value.to_string()));
        self.write(&map)
    }

    fn remove(&mut self, name: &str) -> io::Result<()> {
        let mut map = self.read();
        if map.remove(name).is_some() {
            self.write(&map)?;
        }
        Ok(())
    }
}

/// Which surface is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Gate,
    Main,
}

/// Validates and remembers the session key
pub struct CredentialGate {
    store: Box<dyn SessionStore>,
    key: Option<SessionKey>,
    view: View,
    error: MessageArea,
    button: SubmitControl,
}

impl CredentialGate {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            key: None,
            view: View::Gate,
            error: MessageArea::default(),
            button: SubmitControl::idle(VALIDATE_LABEL),
        }
    }

    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn error(&self) -> &MessageArea {
        &self.error
    }

    pub fn button(&self) -> SubmitControl {
        self.button
    }

    /// Key remembered from an earlier session, if any
    pub fn stored_key(&self) -> Option<String> {
        self.store.get(SESSION_KEY_NAME)
    }

    /// Explicit submission from the gate form
    pub async fn submit(&mut self, api: &dyn WorkflowApi, raw_key: &str) -> bool {
        let key = raw_key.trim();
        if key.is_empty() {
            self.error.show(EMPTY_KEY);
            return false;
        }

        self.error.clear();
        self.button = SubmitControl::busy(VALIDATING_LABEL);
        self.validate(api, key, false).await
    }

    /// Silently re-check a remembered key at startup
    pub async fn restore(&mut self, api: &dyn WorkflowApi) -> bool {
        match self.stored_key() {
            Some(saved) => {
                debug!("Re-validating stored session key");
                self.validate(api, &saved, true).await
            }
            None => false,
        }
    }

    /// Check `key` with the backend.
    ///
    /// On rejection a silent check drops the stored key instead of showing
    /// an error.
    pub async fn validate(&mut self, api: &dyn WorkflowApi, key: &str, silent: bool) -> bool {
        let rejection = match api.validate_key(key).await {
            Ok(verdict) if verdict.valid => None,
            Ok(verdict) => Some(verdict.error.unwrap_or_else(|| INVALID_KEY.to_string())),
            Err(e) => Some(e.to_string()),
        };

        let accepted = match rejection {
            None => {
                self.accept(key);
                true
            }
            Some(message) if silent => {
                info!(reason = %message, "Stored session key no longer valid, forgetting it");
                if let Err(e) = self.store.remove(SESSION_KEY_NAME) {
                    warn!(error = %e, "Failed to clear stored session key");
                }
                false
            }
            Some(message) => {
                self.error.show(message);
                false
            }
        };

        if !silent {
            self.button = SubmitControl::idle(VALIDATE_LABEL);
        }
        accepted
    }

    fn accept(&mut self, key: &str) {
        self.key = Some(SessionKey::new(key));
        if let Err(e) = self.store.set(SESSION_KEY_NAME, key) {
            warn!(error = %e, "Failed to remember session key");
        }
        self.view = View::Main;
        info!("API key accepted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_debug_redacted() {
        let key = SessionKey::new("gsk_secret");
        let shown = format!("{:?}", key);
        assert!(!shown.contains("secret"));
        assert_eq!(key.as_str(), "gsk_secret");
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemorySessionStore::new();
        assert_eq!(store.get(SESSION_KEY_NAME), None);
        store.set(SESSION_KEY_NAME, "k1").unwrap();
        assert_eq!(store.get(SESSION_KEY_NAME).as_deref(), Some("k1"));
        store.remove(SESSION_KEY_NAME).unwrap();
        assert_eq!(store.get(SESSION_KEY_NAME), None);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut store = FileSessionStore::new(&path);

        assert_eq!(store.get(SESSION_KEY_NAME), None);
        store.set(SESSION_KEY_NAME, "k2").unwrap();
        store.set("other", "x").unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.get(SESSION_KEY_NAME).as_deref(), Some("k2"));

        store.remove(SESSION_KEY_NAME).unwrap();
        assert_eq!(reopened.get(SESSION_KEY_NAME), None);
        assert_eq!(reopened.get("other").as_deref(), Some("x"));
    }

    #[test]
    fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let mut store = FileSessionStore::new(&path);
        assert_eq!(store.get(SESSION_KEY_NAME), None);
        store.set(SESSION_KEY_NAME, "k3").unwrap();
        assert_eq!(store.get(SESSION_KEY_NAME).as_deref(), Some("k3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut store = FileSessionStore::new(&path);
        store.set(SESSION_KEY_NAME, "gsk_secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file mode {:o}", mode);
        assert_eq!(store.get(SESSION_KEY_NAME).as_deref(), Some("gsk_secret"));
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileSessionStore::new(&path);
        store.set(SESSION_KEY_NAME, "k4").unwrap();
        store.remove(SESSION_KEY_NAME).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);
    }

    #[test]
    fn test_new_gate_is_locked() {
        let gate = CredentialGate::new(Box::new(MemorySessionStore::new()));
        assert_eq!(gate.view(), View::Gate);
        assert!(gate.key().is_none());
        assert_eq!(gate.button(), SubmitControl::idle("Enter Workflow Builder"));
    }
}
