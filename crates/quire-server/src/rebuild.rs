//! Serialized, coalescing rebuilds.
//!
//! All rebuild requests go through one bounded queue with room for a single pending
//! request, drained by one worker. A request made while a rebuild is running queues
//! exactly one follow-up rebuild; further requests fold into it.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

/// Sending side of the rebuild queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RebuildHandle {
    tx: mpsc::Sender<()>,
}

impl RebuildHandle {
    /// Ask for a rebuild.
    ///
    /// Returns `false` when the request was folded into one that is already pending.
    /// Never blocks, so it is safe to call from the watcher thread.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            Err(TrySendError::Closed(())) => {
                tracing::warn!("Rebuild worker is gone, dropping request");
                false
            }
        }
    }
}

/// Receiving side of the rebuild queue.
#[derive(Debug)]
pub struct RebuildWorker {
    rx: mpsc::Receiver<()>,
}

/// Create a rebuild queue.
pub fn rebuild_queue() -> (RebuildHandle, RebuildWorker) {
    let (tx, rx) = mpsc::channel(1);
    (RebuildHandle { tx }, RebuildWorker { rx })
}

impl RebuildWorker {
    /// Wait for the next request. `false` once every handle is dropped.
    pub async fn next_request(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }

    /// Run `rebuild` once per request, one at a time, until every handle is dropped.
    ///
    /// Rebuilds run on the blocking pool. A panicking rebuild is logged and the worker
    /// keeps going.
    pub async fn run<F>(mut self, rebuild: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let rebuild = Arc::new(rebuild);

        while self.next_request().await {
            let rebuild = Arc::clone(&rebuild);
            if let Err(e) = tokio::task::spawn_blocking(move || rebuild()).await {
                tracing::error!("Rebuild task panicked: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn coalesces_pending_requests() {
        let (handle, worker) = rebuild_queue();
        let count = Arc::new(AtomicUsize::new(0));

        assert!(handle.request());
        for _ in 0..4 {
            assert!(!handle.request());
        }
        drop(handle);

        let counter = Arc::clone(&count);
        worker
            .run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn burst_during_rebuild_triggers_one_more() {
        let (handle, worker) = rebuild_queue();
        let count = Arc::new(AtomicUsize::new(0));

        assert!(handle.request());
        let pending = Arc::new(Mutex::new(Some(handle)));

        let counter = Arc::clone(&count);
        worker
            .run(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                // First rebuild: a burst of changes arrives mid-build, then the watcher goes away.
                if let Some(handle) = pending.lock().unwrap().take() {
                    let accepted = (0..5).filter(|_| handle.request()).count();
                    assert_eq!(accepted, 1);
                }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn survives_panicking_rebuild() {
        let (handle, worker) = rebuild_queue();
        let count = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(Mutex::new(Some(handle.clone())));
        assert!(handle.request());
        drop(handle);

        let counter = Arc::clone(&count);
        worker
            .run(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if let Some(handle) = pending.lock().unwrap().take() {
                    handle.request();
                }
                if n == 0 {
                    panic!("broken build");
                }
            })
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
