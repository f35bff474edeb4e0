//! Key-value stores with per-entry expiry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Durable string store. An entry saved with a zero `ttl` is gone at once.
pub trait KeyValueStore {
    fn save(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

fn expiry_from_now(ttl: Duration) -> i64 {
    let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    now_secs().saturating_add(secs)
}

fn is_live(expires_at: i64) -> bool {
    expires_at > now_secs()
}

/// In-process store, handy for tests and throwaway sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, (String, i64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), expiry_from_now(ttl)));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .get(key)
            .filter(|(_, expires_at)| is_live(*expires_at))
            .map(|(value, _)| value.clone()))
    }
}

/// Cross-site sharing policy recorded with each entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// One stored value with its cookie-style attributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JarEntry {
    pub value: String,
    /// Unix seconds after which the entry reads as absent.
    pub expires_at: i64,
    pub path: String,
    pub same_site: SameSite,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Jar {
    #[serde(default)]
    entries: BTreeMap<String, JarEntry>,
}

/// JSON "cookie jar" on disk. Entries are scoped to path `/` with a lax
/// same-site policy; writes go through a temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_jar(&self) -> Result<Option<Jar>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_jar(&self, jar: &Jar) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(jar)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn save(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        // A corrupt jar is replaced rather than blocking the write.
        let mut jar = match self.read_jar() {
            Ok(jar) => jar.unwrap_or_default(),
            Err(StoreError::Corrupt(reason)) => {
                debug!(path = %self.path.display(), %reason, "replacing corrupt jar");
                Jar::default()
            }
            Err(e) => return Err(e),
        };
        jar.entries.retain(|_, e| is_live(e.expires_at));
        jar.entries.insert(
            key.to_string(),
            JarEntry {
                value: value.to_string(),
                expires_at: expiry_from_now(ttl),
                path: "/".to_string(),
                same_site: SameSite::Lax,
            },
        );
        self.write_jar(&jar)
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let Some(jar) = self.read_jar()? else {
            return Ok(None);
        };
        Ok(jar
            .entries
            .get(key)
            .filter(|e| is_live(e.expires_at))
            .map(|e| e.value.clone()))
    }
}
