//! Storage offload bridge
//!
//! Presents the storage engine's interface while the engine itself runs in
//! an isolated worker context, where the random-access write strategy is
//! available. Every call becomes a [`StorageRequest`] with a fresh id; the
//! matching [`StorageResponse`] resolves the waiting caller.

use super::engine::StorageEngine;
use super::protocol::{InitParams, StorageCommand, StorageOutcome, StorageRequest, StorageResponse};
use super::root::{ExecutionContext, OriginPrivateRoot, PlatformCapabilities};
use super::{StorageError, StorageResult};
use crate::utils::IsolatedContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type Reply = StorageResult<Option<String>>;

/// Pending-request map owned by one bridge
#[derive(Default)]
pub struct RequestTracker {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
}

impl RequestTracker {
    /// Allocate an id and the receiver its response will arrive on
    pub fn register(&self) -> (u64, oneshot::Receiver<Reply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    pub fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    /// Route a response to its caller. Returns false for unmatched ids.
    pub fn resolve(&self, response: StorageResponse) -> bool {
        let Some(tx) = self.pending.lock().remove(&response.id) else {
            tracing::warn!("Dropping storage response for unknown request id {}", response.id);
            return false;
        };

        let reply = match response.outcome {
            StorageOutcome::Success { data } => Ok(data),
            StorageOutcome::Error { error } => Err(StorageError::Worker(error)),
            StorageOutcome::Unknown => Err(StorageError::Protocol(format!(
                "Unknown response type for request {}",
                response.id
            ))),
        };
        // The caller may have given up waiting; nothing to do then.
        let _ = tx.send(reply);
        true
    }

    /// Forget every pending request
    pub fn abandon_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Message loop of the isolated storage worker.
///
/// Runs until a `close` request is served or the request channel closes.
pub async fn run_storage_worker(
    mut engine: StorageEngine,
    mut requests: mpsc::UnboundedReceiver<StorageRequest>,
    responses: mpsc::UnboundedSender<StorageResponse>,
) {
    while let Some(StorageRequest { id, command }) = requests.recv().await {
        let name = command.name();
        let mut closing = false;

        let result: StorageResult<Option<String>> = match command {
            StorageCommand::Init { data } => engine
                .init(&data.session_id, &data.extension)
                .await
                .map(|_| None),
            StorageCommand::AddChunk { data } => engine.add_chunk(&data).await.map(|_| None),
            StorageCommand::Finalize => engine.finalize().await.map(Some),
            StorageCommand::Clear => engine.clear().await.map(|_| None),
            StorageCommand::Close => {
                closing = true;
                Ok(None)
            }
            StorageCommand::Unknown => Err(StorageError::Protocol(
                "Unknown message type".to_string(),
            )),
        };

        let response = match result {
            Ok(data) => StorageResponse::success(id, data),
            Err(e) => {
                tracing::warn!("Storage worker '{}' request {} failed: {}", name, id, e);
                StorageResponse::error(id, e.to_string())
            }
        };

        if responses.send(response).is_err() {
            tracing::debug!("Storage bridge went away; worker exiting");
            break;
        }
        if closing {
            break;
        }
    }

    // Handles are released with the engine; an unfinalized file stays on disk
    // until the next session sweeps it.
    drop(engine);
}

/// Client side of the storage worker
pub struct StorageBridge {
    outbound: Mutex<Option<mpsc::UnboundedSender<StorageRequest>>>,
    tracker: Arc<RequestTracker>,
    reader: Mutex<Option<JoinHandle<()>>>,
    context: Mutex<Option<IsolatedContext>>,
}

impl StorageBridge {
    /// Start a storage worker in its own isolated context.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(root: OriginPrivateRoot) -> StorageResult<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let context = IsolatedContext::spawn("storage-worker", move || {
            let capabilities = PlatformCapabilities::detect(ExecutionContext::Isolated);
            let engine = StorageEngine::new(root, capabilities);
            run_storage_worker(engine, request_rx, response_tx)
        })?;

        let bridge = Self::with_transport(request_tx, response_rx);
        *bridge.context.lock() = Some(context);
        Ok(bridge)
    }

    /// Build a bridge over an arbitrary request/response transport
    pub fn with_transport(
        requests: mpsc::UnboundedSender<StorageRequest>,
        mut responses: mpsc::UnboundedReceiver<StorageResponse>,
    ) -> Self {
        let tracker = Arc::new(RequestTracker::default());

        let reader_tracker = tracker.clone();
        let reader = tokio::spawn(async move {
            while let Some(response) = responses.recv().await {
                reader_tracker.resolve(response);
            }
            let abandoned = reader_tracker.abandon_all();
            if abandoned > 0 {
                tracing::warn!("Storage worker closed with {} requests in flight", abandoned);
            }
        });

        Self {
            outbound: Mutex::new(Some(requests)),
            tracker,
            reader: Mutex::new(Some(reader)),
            context: Mutex::new(None),
        }
    }

    async fn request(&self, command: StorageCommand) -> Reply {
        let (id, rx) = self.tracker.register();

        let sent = match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(StorageRequest { id, command }).is_ok(),
            None => false,
        };
        if !sent {
            self.tracker.forget(id);
            return Err(StorageError::Terminated);
        }

        rx.await.map_err(|_| StorageError::Terminated)?
    }

    pub async fn init(&self, session_id: &str, extension: &str) -> StorageResult<()> {
        self.request(StorageCommand::Init {
            data: InitParams {
                session_id: session_id.to_string(),
                extension: extension.to_string(),
            },
        })
        .await
        .map(|_| ())
    }

    /// Append a chunk; the buffer is moved to the worker
    pub async fn add_chunk(&self, data: Vec<u8>) -> StorageResult<()> {
        self.request(StorageCommand::AddChunk { data }).await.map(|_| ())
    }

    /// Finalize the file and return its name
    pub async fn finalize(&self) -> StorageResult<String> {
        self.request(StorageCommand::Finalize)
            .await?
            .ok_or_else(|| StorageError::Protocol("finalize returned no file name".to_string()))
    }

    pub async fn clear(&self) -> StorageResult<()> {
        self.request(StorageCommand::Clear).await.map(|_| ())
    }

    /// Ask the worker to exit after releasing its handles
    pub async fn close(&self) -> StorageResult<()> {
        let result = self.request(StorageCommand::Close).await.map(|_| ());
        self.outbound.lock().take();
        if let Some(context) = self.context.lock().take() {
            context.detach();
        }
        result
    }

    /// Discard the worker immediately; pending calls are abandoned
    pub fn terminate(&self) {
        self.outbound.lock().take();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        let abandoned = self.tracker.abandon_all();
        if let Some(context) = self.context.lock().take() {
            context.detach();
        }
        tracing::debug!("Storage bridge terminated ({} pending requests abandoned)", abandoned);
    }

    pub fn is_terminated(&self) -> bool {
        self.outbound.lock().is_none()
    }

    pub fn pending_requests(&self) -> usize {
        self.tracker.pending_count()
    }
}

impl Drop for StorageBridge {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_round_trip_through_worker() {
        let dir = tempdir().unwrap();
        let root = OriginPrivateRoot::open(dir.path()).unwrap();
        let bridge = StorageBridge::spawn(root.clone()).unwrap();

        bridge.init("w1", "webm").await.unwrap();
        bridge.add_chunk(b"hello ".to_vec()).await.unwrap();
        bridge.add_chunk(b"world".to_vec()).await.unwrap();
        let name = bridge.finalize().await.unwrap();
        assert_eq!(name, "recording-w1.webm");
        assert_eq!(root.read_file(&name).await.unwrap(), b"hello world");

        bridge.clear().await.unwrap();
        bridge.clear().await.unwrap();
        bridge.close().await.unwrap();
        assert!(bridge.is_terminated());
    }

    #[tokio::test]
    async fn test_worker_errors_reject_only_their_call() {
        let dir = tempdir().unwrap();
        let bridge = StorageBridge::spawn(OriginPrivateRoot::open(dir.path()).unwrap()).unwrap();

        let err = bridge.add_chunk(b"early".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::Worker(_)));

        bridge.init("w2", "webm").await.unwrap();
        bridge.add_chunk(b"ok".to_vec()).await.unwrap();
        bridge.terminate();
    }

    #[tokio::test]
    async fn test_unmatched_response_id_is_ignored() {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(StorageBridge::with_transport(request_tx, response_rx));

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.finalize().await })
        };

        let request = request_rx.recv().await.unwrap();
        response_tx
            .send(StorageResponse::success(request.id + 100, Some("wrong".into())))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!caller.is_finished());
        assert_eq!(bridge.pending_requests(), 1);

        response_tx
            .send(StorageResponse::success(request.id, Some("recording-x.webm".into())))
            .unwrap();
        assert_eq!(caller.await.unwrap().unwrap(), "recording-x.webm");
    }

    #[tokio::test]
    async fn test_unknown_request_type_is_reported() {
        let dir = tempdir().unwrap();
        let engine = StorageEngine::new(
            OriginPrivateRoot::open(dir.path()).unwrap(),
            PlatformCapabilities::detect(ExecutionContext::Isolated),
        );
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_storage_worker(engine, request_rx, response_tx));

        request_tx
            .send(StorageRequest { id: 5, command: StorageCommand::Unknown })
            .unwrap();
        let response = response_rx.recv().await.unwrap();
        assert_eq!(response.id, 5);
        match response.outcome {
            StorageOutcome::Error { error } => assert!(error.contains("Unknown message type")),
            other => panic!("unexpected outcome {other:?}"),
        }

        drop(request_tx);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_response_type_rejects_call() {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(StorageBridge::with_transport(request_tx, response_rx));

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.clear().await })
        };
        let request = request_rx.recv().await.unwrap();
        response_tx
            .send(StorageResponse { id: request.id, outcome: StorageOutcome::Unknown })
            .unwrap();
        assert!(matches!(
            caller.await.unwrap().unwrap_err(),
            StorageError::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_terminate_abandons_pending_calls() {
        let (request_tx, _request_rx) = mpsc::unbounded_channel();
        let (_response_tx, response_rx) = mpsc::unbounded_channel();
        let bridge = Arc::new(StorageBridge::with_transport(request_tx, response_rx));

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.add_chunk(vec![1, 2, 3]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(bridge.pending_requests(), 1);

        bridge.terminate();
        assert_eq!(bridge.pending_requests(), 0);
        assert!(matches!(
            caller.await.unwrap().unwrap_err(),
            StorageError::Terminated
        ));
        assert!(matches!(
            bridge.clear().await.unwrap_err(),
            StorageError::Terminated
        ));
    }
}
