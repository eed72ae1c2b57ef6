//! Chunked local storage
//!
//! - [`StorageEngine`]: append-only writer for one backing file, with a
//!   streaming and a random-access strategy
//! - [`StorageBridge`]: the same operations executed by a worker in an
//!   isolated context
//! - [`OriginPrivateRoot`]: the sandbox directory holding backing files

pub mod bridge;
pub mod engine;
pub mod protocol;
pub mod root;

pub use bridge::{run_storage_worker, RequestTracker, StorageBridge};
pub use engine::{StorageEngine, WriteStrategyKind};
pub use protocol::{StorageCommand, StorageOutcome, StorageRequest, StorageResponse};
pub use root::{backing_file_name, ExecutionContext, OriginPrivateRoot, PlatformCapabilities};

use thiserror::Error;

/// Errors raised by the storage engine and the offload bridge
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No supported file write API is available on this platform")]
    Unsupported,

    #[error("Storage is not initialized")]
    NotInitialized,

    #[error("Storage is already initialized")]
    AlreadyInitialized,

    #[error("Storage has been finalized")]
    AlreadyFinalized,

    #[error("Finalizing {0} failed; the file can only be cleared")]
    FinalizeFailed(String),

    #[error("Storage has not been finalized")]
    NotFinalized,

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Storage worker error: {0}")]
    Worker(String),

    #[error("Storage worker terminated")]
    Terminated,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
