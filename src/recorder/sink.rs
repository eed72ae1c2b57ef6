//! Session storage
//!
//! The recorder writes through either the isolated storage worker or an
//! engine running on the host runtime. Which one is decided once per session.

use crate::storage::{
    ExecutionContext, OriginPrivateRoot, PlatformCapabilities, StorageBridge, StorageEngine, StorageResult,
};
use tokio::sync::Mutex;

pub enum SessionStorage {
    /// Engine runs in an isolated context behind the bridge
    Isolated(StorageBridge),
    /// Engine runs on the host runtime with the capabilities available there
    Local(Mutex<StorageEngine>),
}

impl SessionStorage {
    /// Must be called from within a tokio runtime
    pub fn open(root: &OriginPrivateRoot, isolated: bool) -> StorageResult<Self> {
        if isolated {
            return Ok(Self::Isolated(StorageBridge::spawn(root.clone())?));
        }
        let capabilities = PlatformCapabilities::detect(ExecutionContext::Main);
        Ok(Self::Local(Mutex::new(StorageEngine::new(root.clone(), capabilities))))
    }

    pub async fn init(&self, session_id: &str, extension: &str) -> StorageResult<()> {
        match self {
            Self::Isolated(bridge) => bridge.init(session_id, extension).await,
            Self::Local(engine) => engine.lock().await.init(session_id, extension).await,
        }
    }

    pub async fn add_chunk(&self, data: Vec<u8>) -> StorageResult<()> {
        match self {
            Self::Isolated(bridge) => bridge.add_chunk(data).await,
            Self::Local(engine) => engine.lock().await.add_chunk(&data).await,
        }
    }

    pub async fn finalize(&self) -> StorageResult<String> {
        match self {
            Self::Isolated(bridge) => bridge.finalize().await,
            Self::Local(engine) => engine.lock().await.finalize().await,
        }
    }

    pub async fn clear(&self) -> StorageResult<()> {
        match self {
            Self::Isolated(bridge) => bridge.clear().await,
            Self::Local(engine) => engine.lock().await.clear().await,
        }
    }

    /// Release the worker after a clean session
    pub async fn close(&self) {
        if let Self::Isolated(bridge) = self {
            if let Err(e) = bridge.close().await {
                tracing::debug!("Storage worker close failed: {}", e);
                bridge.terminate();
            }
        }
    }

    /// Drop the worker without waiting for anything
    pub fn terminate(&self) {
        if let Self::Isolated(bridge) = self {
            bridge.terminate();
        }
    }

    /// Clear and release, logging instead of failing
    pub async fn discard(&self) {
        if let Err(e) = self.clear().await {
            tracing::warn!("Failed to clear session storage: {}", e);
        }
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_and_isolated_behave_alike() {
        for isolated in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let root = OriginPrivateRoot::open(dir.path()).unwrap();
            let storage = SessionStorage::open(&root, isolated).unwrap();

            storage.init("s1", "webm").await.unwrap();
            storage.add_chunk(b"abc".to_vec()).await.unwrap();
            storage.add_chunk(b"def".to_vec()).await.unwrap();
            let name = storage.finalize().await.unwrap();

            assert_eq!(root.read_file(&name).await.unwrap(), b"abcdef");
            storage.clear().await.unwrap();
            assert!(root.list_backing_files().unwrap().is_empty());
            storage.close().await;
        }
    }
}
