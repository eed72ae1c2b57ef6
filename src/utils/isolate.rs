//! Isolated execution contexts
//!
//! An isolated context is a dedicated OS thread running its own
//! current-thread tokio runtime. Work scheduled there keeps ticking no matter
//! how busy (or idle) the host runtime is, and blocking file handles can be
//! used inside it without stalling the host.

use std::future::Future;
use std::io;
use std::thread::JoinHandle;

/// Handle to a running isolated context
#[derive(Debug)]
pub struct IsolatedContext {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl IsolatedContext {
    /// Spawn a named context that drives the future produced by `body`.
    ///
    /// The future is built inside the new thread, so it does not need to be
    /// `Send`; only the closure does.
    pub fn spawn<F, Fut>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(name)
            .build()?;

        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                tracing::debug!("Isolated context '{}' started", thread_name);
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, body());
                tracing::debug!("Isolated context '{}' finished", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the context thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Detach from the context without waiting for it.
    ///
    /// The context winds down on its own once its message channel closes.
    pub fn detach(mut self) {
        self.thread.take();
    }

    /// Wait for the context thread to exit.
    pub fn join(mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Isolated context '{}' panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_runs_future_to_completion() {
        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = IsolatedContext::spawn("test-isolate", move || async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            tx.send(42).unwrap();
        })
        .unwrap();
        assert_eq!(ctx.name(), "test-isolate");
        ctx.join();
        assert_eq!(rx.recv().unwrap(), 42);
    }
}
