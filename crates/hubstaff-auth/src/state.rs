//! Persisted client state
//!
//! A single JSON record holds the issuer URL, the API base URL and the current
//! token pair. Every write goes through an atomic temp-file + rename so a crash
//! mid-write leaves the previous record intact. A tokio Mutex serializes
//! writers; readers take the lock briefly to clone what they need.
//!
//! Fields this crate does not know about are kept in `extra` and written back
//! unchanged, so older or newer tools can share the same file.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{DEFAULT_API_BASE_URL, DEFAULT_ISSUER_URL};
use crate::error::{Error, Result};

/// Access/refresh token pair as issued by the token endpoint.
///
/// An empty string stands for an absent token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default, deserialize_with = "null_as_default")]
    pub access_token: Secret<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub refresh_token: Secret<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// The persisted configuration record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub issuer_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_base_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: TokenPair,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StateRecord {
    /// Fill in missing URLs. Returns true when anything changed.
    fn apply_defaults(&mut self) -> bool {
        let mut changed = false;
        if self.issuer_url.trim().is_empty() {
            self.issuer_url = DEFAULT_ISSUER_URL.to_string();
            changed = true;
        }
        if self.api_base_url.trim().is_empty() {
            self.api_base_url = DEFAULT_API_BASE_URL.to_string();
            changed = true;
        }
        changed
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("issuer_url", &self.issuer_url),
            ("api_base_url", &self.api_base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(Error::CorruptState(format!(
                    "{field} must start with http:// or https://, got: {value}"
                )));
            }
        }
        Ok(())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Owner of the persisted state record.
///
/// The file is only touched by `load`, `save` and `update_token`; everything
/// else reads the in-memory copy.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<StateRecord>,
}

impl StateStore {
    /// Load state from the given file path.
    ///
    /// A missing file is a cold start: an empty record is created with the
    /// default URLs. A file that is not a well-formed record fails with
    /// `CorruptState`. Defaults applied to an existing file are saved back
    /// immediately so later loads see the resolved values.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let mut record = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading state file: {e}")))?;
            serde_json::from_str::<StateRecord>(&contents)
                .map_err(|e| Error::CorruptState(format!("parsing state file: {e}")))?
        } else {
            info!(path = %path.display(), "state file not found, starting with empty state");
            StateRecord::default()
        };

        let defaulted = record.apply_defaults();
        record.validate()?;

        if defaulted {
            write_atomic(&path, &record).await?;
        }

        info!(
            path = %path.display(),
            issuer_url = %record.issuer_url,
            api_base_url = %record.api_base_url,
            has_refresh_token = !record.token.refresh_token.is_empty(),
            "loaded state"
        );

        Ok(Self {
            path,
            state: Mutex::new(record),
        })
    }

    /// Persist the current in-memory record to disk.
    pub async fn save(&self) -> Result<()> {
        let state = self.state.lock().await;
        write_atomic(&self.path, &state).await
    }

    /// Replace the token pair and persist it.
    ///
    /// The file is written first; the in-memory record only changes once the
    /// write succeeded, so memory never runs ahead of disk.
    pub async fn update_token(&self, token: TokenPair) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.token = token;
        write_atomic(&self.path, &next).await?;
        *state = next;
        debug!("updated token pair");
        Ok(())
    }

    /// Clone of the full record.
    pub async fn record(&self) -> StateRecord {
        self.state.lock().await.clone()
    }

    /// Clone of the current token pair.
    pub async fn token(&self) -> TokenPair {
        self.state.lock().await.token.clone()
    }

    pub async fn issuer_url(&self) -> String {
        self.state.lock().await.issuer_url.clone()
    }

    pub async fn api_base_url(&self) -> String {
        self.state.lock().await.api_base_url.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write the record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. The file holds tokens, so it is created with 0600 permissions
/// on unix.
async fn write_atomic(path: &Path, record: &StateRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CorruptState(format!("serializing state: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("state path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Io("state path has no file name".into()))?;

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp state file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting state file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp state file: {e}")))?;

    debug!(path = %path.display(), "persisted state");
    Ok(())
}
