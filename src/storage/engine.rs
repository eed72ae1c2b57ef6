//! Chunked local storage engine
//!
//! Append-only byte sink over the origin-private root. The write strategy is
//! picked once in [`StorageEngine::init`] from the platform capabilities and
//! stays fixed until the file is finalized or cleared.

use super::root::{backing_file_name, OriginPrivateRoot, PlatformCapabilities, SWAP_SUFFIX};
use super::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::PathBuf;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Which write API backs the current file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteStrategyKind {
    Streaming,
    RandomAccess,
}

/// Asynchronous sequential writer.
///
/// Bytes go to a swap file that only replaces the backing file on
/// [`ChunkWriter::finish`], so an aborted session never leaves a half-written
/// backing file behind.
struct StreamingWriter {
    file: tokio::fs::File,
    swap_path: PathBuf,
    final_path: PathBuf,
    /// Length of the swap file covered by accepted chunks
    committed: u64,
}

impl StreamingWriter {
    async fn write_chunk(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let written: io::Result<()> = async {
            self.file.write_all(bytes).await?;
            self.file.flush().await
        }
        .await;

        if let Err(e) = written {
            let committed = self.committed;
            let rollback: io::Result<()> = async {
                self.file.set_len(committed).await?;
                self.file.seek(SeekFrom::Start(committed)).await.map(|_| ())
            }
            .await;
            if let Err(rollback) = rollback {
                tracing::error!("Failed to roll back swap file to {} bytes: {}", committed, rollback);
            }
            return Err(e.into());
        }

        self.committed += bytes.len() as u64;
        Ok(())
    }
}

/// File handle the random-access strategy writes through
trait AccessHandle: Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AccessHandle for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Synchronous positioned writer with an explicit cursor
struct RandomAccessWriter<H = File> {
    file: H,
    cursor: u64,
}

impl<H: AccessHandle> RandomAccessWriter<H> {
    /// Write `bytes` at the cursor. A chunk that fails partway is cut off
    /// again, so the file only ever holds accepted chunks.
    fn write_chunk(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let start = self.cursor;
        if let Err(e) = self.write_at_cursor(bytes) {
            self.cursor = start;
            if let Err(rollback) = self.file.truncate(start) {
                tracing::error!("Failed to roll back partial chunk at offset {}: {}", start, rollback);
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn write_at_cursor(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < bytes.len() {
            self.file.seek(SeekFrom::Start(self.cursor))?;
            let written = self.file.write(&bytes[offset..])?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "access handle accepted zero bytes",
                ));
            }
            self.cursor += written as u64;
            offset += written;
        }
        self.file.sync()
    }
}

enum ChunkWriter {
    Streaming(StreamingWriter),
    RandomAccess(RandomAccessWriter),
}

impl ChunkWriter {
    async fn open(
        root: &OriginPrivateRoot,
        name: &str,
        capabilities: PlatformCapabilities,
    ) -> StorageResult<Self> {
        let final_path = root.file_path(name);

        if capabilities.random_access {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&final_path)?;
            return Ok(ChunkWriter::RandomAccess(RandomAccessWriter { file, cursor: 0 }));
        }

        if capabilities.streaming_write {
            // The backing file exists (empty) from the start, like a created handle.
            tokio::fs::File::create(&final_path).await?;
            let swap_path = root.file_path(&format!("{name}{SWAP_SUFFIX}"));
            let file = tokio::fs::File::create(&swap_path).await?;
            return Ok(ChunkWriter::Streaming(StreamingWriter {
                file,
                swap_path,
                final_path,
                committed: 0,
            }));
        }

        Err(StorageError::Unsupported)
    }

    fn kind(&self) -> WriteStrategyKind {
        match self {
            ChunkWriter::Streaming(_) => WriteStrategyKind::Streaming,
            ChunkWriter::RandomAccess(_) => WriteStrategyKind::RandomAccess,
        }
    }

    async fn append(&mut self, bytes: &[u8]) -> StorageResult<()> {
        match self {
            ChunkWriter::Streaming(w) => w.write_chunk(bytes).await,
            ChunkWriter::RandomAccess(w) => w.write_chunk(bytes),
        }
    }

    async fn finish(self) -> StorageResult<()> {
        match self {
            ChunkWriter::Streaming(mut w) => {
                w.file.flush().await?;
                w.file.set_len(w.committed).await?;
                w.file.sync_all().await?;
                drop(w.file);
                tokio::fs::rename(&w.swap_path, &w.final_path).await?;
            }
            ChunkWriter::RandomAccess(w) => {
                w.file.set_len(w.cursor)?;
                w.file.sync_all()?;
            }
        }
        Ok(())
    }

    /// Drop the handle without committing anything further
    async fn abort(self) {
        if let ChunkWriter::Streaming(w) = self {
            drop(w.file);
            remove_if_present(&w.swap_path).await;
        }
    }
}

enum EngineState {
    Idle,
    Writing { name: String, writer: ChunkWriter },
    Finalized { name: String },
    /// Finalize failed; only `clear` is accepted
    Failed { name: String },
}

/// Append-only storage for a single backing file
pub struct StorageEngine {
    root: OriginPrivateRoot,
    capabilities: PlatformCapabilities,
    state: EngineState,
    bytes_written: u64,
    chunks_written: u64,
}

impl StorageEngine {
    pub fn new(root: OriginPrivateRoot, capabilities: PlatformCapabilities) -> Self {
        Self {
            root,
            capabilities,
            state: EngineState::Idle,
            bytes_written: 0,
            chunks_written: 0,
        }
    }

    /// Open (or create) the backing file for `session_id`
    pub async fn init(&mut self, session_id: &str, extension: &str) -> StorageResult<()> {
        if !matches!(self.state, EngineState::Idle) {
            return Err(StorageError::AlreadyInitialized);
        }
        if !self.capabilities.random_access && !self.capabilities.streaming_write {
            return Err(StorageError::Unsupported);
        }

        let name = backing_file_name(session_id, extension);
        let writer = ChunkWriter::open(&self.root, &name, self.capabilities).await?;

        tracing::info!(
            "Storage initialized: file={}, strategy={:?}",
            name,
            writer.kind()
        );

        self.bytes_written = 0;
        self.chunks_written = 0;
        self.state = EngineState::Writing { name, writer };
        Ok(())
    }

    /// Append `bytes` at the end of the backing file
    pub async fn add_chunk(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let writer = match &mut self.state {
            EngineState::Writing { writer, .. } => writer,
            EngineState::Finalized { .. } | EngineState::Failed { .. } => {
                return Err(StorageError::AlreadyFinalized)
            }
            EngineState::Idle => return Err(StorageError::NotInitialized),
        };

        writer.append(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        self.chunks_written += 1;
        Ok(())
    }

    /// Flush and release the write handle; returns the backing file name
    pub async fn finalize(&mut self) -> StorageResult<String> {
        match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Writing { name, writer } => {
                if let Err(e) = writer.finish().await {
                    tracing::error!("Failed to finalize {}: {}", name, e);
                    self.state = EngineState::Failed { name };
                    return Err(e);
                }
                tracing::info!(
                    "Storage finalized: file={}, chunks={}, bytes={}",
                    name,
                    self.chunks_written,
                    self.bytes_written
                );
                self.state = EngineState::Finalized { name: name.clone() };
                Ok(name)
            }
            EngineState::Finalized { name } => {
                self.state = EngineState::Finalized { name: name.clone() };
                Ok(name)
            }
            EngineState::Failed { name } => {
                self.state = EngineState::Failed { name: name.clone() };
                Err(StorageError::FinalizeFailed(name))
            }
            EngineState::Idle => Err(StorageError::NotInitialized),
        }
    }

    /// Release handles and delete the backing file. Safe to call repeatedly.
    pub async fn clear(&mut self) -> StorageResult<()> {
        match std::mem::replace(&mut self.state, EngineState::Idle) {
            EngineState::Writing { name, writer } => {
                writer.abort().await;
                remove_if_present(&self.root.file_path(&name)).await;
                tracing::info!("Storage cleared (in progress): {}", name);
            }
            EngineState::Finalized { name } => {
                remove_if_present(&self.root.file_path(&name)).await;
                tracing::info!("Storage cleared: {}", name);
            }
            EngineState::Failed { name } => {
                remove_if_present(&self.root.file_path(&format!("{name}{SWAP_SUFFIX}"))).await;
                remove_if_present(&self.root.file_path(&name)).await;
                tracing::info!("Storage cleared (failed finalize): {}", name);
            }
            EngineState::Idle => {}
        }
        self.bytes_written = 0;
        self.chunks_written = 0;
        Ok(())
    }

    /// Whole file content; only valid after [`StorageEngine::finalize`]
    pub async fn read_all(&self) -> StorageResult<Vec<u8>> {
        match &self.state {
            EngineState::Finalized { name } => self.root.read_file(name).await,
            _ => Err(StorageError::NotFinalized),
        }
    }

    /// Strategy of the open file, if any
    pub fn strategy(&self) -> Option<WriteStrategyKind> {
        match &self.state {
            EngineState::Writing { writer, .. } => Some(writer.kind()),
            _ => None,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }
}

async fn remove_if_present(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {:?}: {}", path, e),
    }
}
