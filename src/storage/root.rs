//! Origin-private file root
//!
//! The sandbox directory the recorder owns. Only files following the
//! `recording-<sessionId>.<extension>` naming scheme are ever created or
//! removed here.

use super::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix shared by every backing file
pub const BACKING_FILE_PREFIX: &str = "recording-";

/// Suffix of the in-progress file used by the streaming-write strategy
pub const SWAP_SUFFIX: &str = ".crswap";

/// Where storage code is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// The host (UI) context
    Main,
    /// A dedicated worker context
    Isolated,
}

/// Write APIs offered by the platform in a given context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCapabilities {
    /// Asynchronous sequential writable stream
    pub streaming_write: bool,
    /// Synchronous offset-addressed access handle
    pub random_access: bool,
}

impl PlatformCapabilities {
    /// Capabilities available in `context`.
    ///
    /// Synchronous access handles block the calling thread, so they are only
    /// offered inside an isolated context.
    pub fn detect(context: ExecutionContext) -> Self {
        match context {
            ExecutionContext::Main => Self {
                streaming_write: true,
                random_access: false,
            },
            ExecutionContext::Isolated => Self {
                streaming_write: true,
                random_access: true,
            },
        }
    }

    pub fn none() -> Self {
        Self {
            streaming_write: false,
            random_access: false,
        }
    }
}

/// Name of the backing file for a session
pub fn backing_file_name(session_id: &str, extension: &str) -> String {
    format!("{BACKING_FILE_PREFIX}{session_id}.{extension}")
}

/// Sandboxed storage directory
#[derive(Debug, Clone)]
pub struct OriginPrivateRoot {
    dir: PathBuf,
}

impl OriginPrivateRoot {
    /// Open (creating if needed) the sandbox directory
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a file inside the root
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read a finalized file back as a whole
    pub async fn read_file(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.file_path(name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List every backing file (finalized or in progress)
    pub fn list_backing_files(&self) -> StorageResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_backing = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKING_FILE_PREFIX));
            if is_backing && path.is_file() {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Remove leftovers of abandoned sessions.
    ///
    /// Best-effort: individual failures are logged and skipped. Returns the
    /// number of files removed.
    pub async fn clear_stale(&self) -> usize {
        let files = match self.list_backing_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Failed to list storage root {:?}: {}", self.dir, e);
                return 0;
            }
        };

        let mut removed = 0;
        for path in files {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::info!("Removed stale recording file {:?}", path);
                    removed += 1;
                }
                Err(e) => tracing::warn!("Failed to remove stale file {:?}: {}", path, e),
            }
        }
        removed
    }
}
