use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::{CredentialStore, TokenKind};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionData {
    fn slot(&mut self, kind: TokenKind) -> &mut Option<String> {
        match kind {
            TokenKind::Access => &mut self.access_token,
            TokenKind::Refresh => &mut self.refresh_token,
        }
    }

    fn token(&self, kind: TokenKind) -> Option<&str> {
        match kind {
            TokenKind::Access => self.access_token.as_deref(),
            TokenKind::Refresh => self.refresh_token.as_deref(),
        }
    }

    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Tokens persisted as JSON in the cache directory.
///
/// The file is re-read on every access so several processes sharing a cache
/// directory see each other's writes. It is deleted once both tokens are gone.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    /// Load session from disk
    pub fn load(&self) -> Result<SessionData> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(SessionData::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    /// When the tokens were last written.
    pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load()?.updated_at)
    }

    pub fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path();
        if data.is_empty() {
            return remove_if_exists(&path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        write_private(&path, contents.as_bytes()).context("Failed to write session file")?;
        debug!(path = %path.display(), "Session saved");
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut SessionData)) -> Result<()> {
        let _guard = self.lock.lock();
        let mut data = self.load()?;
        f(&mut data);
        data.updated_at = Some(Utc::now());
        self.save(&data)
    }
}

/// Write a file readable only by the owner on Unix.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        // `mode` only applies on create; tighten a file left by an older build.
        if path.exists() {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    options.open(path)?.write_all(contents)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).context("Failed to remove session file")?;
    }
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.token(kind).map(str::to_string))
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        self.modify(|data| *data.slot(kind) = Some(value.to_string()))
    }

    fn remove(&self, kind: TokenKind) -> Result<()> {
        self.modify(|data| *data.slot(kind) = None)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        remove_if_exists(&self.session_path())
    }
}
