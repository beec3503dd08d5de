/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Process lifecycle coordination
//!
//! [`Lifecycle`] is the shutdown rendezvous shared by the main flow, signal
//! handling, listeners and any plugin running background work:
//!
//! - any party may call [`Lifecycle::request_close`]; the first call wins and
//!   its error (if any) becomes the terminal error
//! - the close request is broadcast exactly once to every attached activity
//! - [`Lifecycle::close_wait`] returns once the main flow and every attached
//!   activity have acknowledged
//!
//! Activities attached after a close request are rejected with
//! [`DnsError::Closing`], so the drain never misses a late arrival.

use crate::core::error::{DnsError, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, watch};
use tracing::{debug, warn};

#[derive(Debug)]
struct State {
    closing: bool,
    err: Option<Arc<DnsError>>,
    /// Unacknowledged participants, the main flow included
    pending: usize,
    main_done: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    close_tx: watch::Sender<bool>,
    drained: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic, every update is a single step
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        let remaining = {
            let mut state = self.lock();
            state.pending -= 1;
            state.pending
        };
        if remaining == 0 {
            self.drained.notify_waiters();
        }
    }
}

/// Cloneable handle to the shared shutdown coordinator
#[derive(Debug, Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    closing: false,
                    err: None,
                    pending: 1,
                    main_done: false,
                }),
                close_tx,
                drained: Notify::new(),
            }),
        }
    }

    /// Attach a background activity
    ///
    /// `task` receives a [`DoneHandle`] it must acknowledge and a
    /// [`CloseSignal`] that resolves once close is requested. The returned
    /// future is spawned on the current tokio runtime.
    ///
    /// Returns [`DnsError::Closing`] without running `task` if close was
    /// already requested.
    pub fn attach<F, Fut>(&self, task: F) -> Result<()>
    where
        F: FnOnce(DoneHandle, CloseSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.inner.lock();
            if state.closing {
                return Err(DnsError::Closing);
            }
            state.pending += 1;
        }

        let done = DoneHandle {
            inner: Some(self.inner.clone()),
        };
        tokio::spawn(task(done, self.close_signal()));
        Ok(())
    }

    /// Request a coordinated shutdown
    ///
    /// Only the first call has any effect: it records `err` as the terminal
    /// error and broadcasts the close signal. Returns whether this call was
    /// the one that initiated shutdown.
    pub fn request_close(&self, err: Option<DnsError>) -> bool {
        {
            let mut state = self.inner.lock();
            if state.closing {
                if let Some(err) = err {
                    debug!("ignoring error reported after close was requested: {}", err);
                }
                return false;
            }
            state.closing = true;
            if let Some(err) = err {
                warn!("closing on error: {}", err);
                state.err = Some(Arc::new(err));
            }
        }
        self.inner.close_tx.send_replace(true);
        true
    }

    /// Subscribe to the close-requested broadcast
    pub fn close_signal(&self) -> CloseSignal {
        CloseSignal {
            rx: self.inner.close_tx.subscribe(),
        }
    }

    /// Wait until some party has requested close
    pub async fn wait_close_requested(&self) {
        self.close_signal().recv().await;
    }

    pub fn is_closing(&self) -> bool {
        self.inner.lock().closing
    }

    /// Acknowledge that the main flow has started its own teardown
    ///
    /// Calling it more than once has no further effect.
    pub fn done(&self) {
        {
            let mut state = self.inner.lock();
            if state.main_done {
                return;
            }
            state.main_done = true;
        }
        self.inner.release();
    }

    /// Wait for the main flow and every attached activity to acknowledge
    pub async fn close_wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.inner.lock().pending == 0 {
                return;
            }
            drained.await;
        }
    }

    /// The terminal error, `None` on a clean shutdown
    pub fn err(&self) -> Option<Arc<DnsError>> {
        self.inner.lock().err.clone()
    }
}

/// Acknowledgment owed by an attached activity
///
/// Dropping the handle acknowledges as well, so an activity that panics or
/// returns early never blocks [`Lifecycle::close_wait`].
#[derive(Debug)]
pub struct DoneHandle {
    inner: Option<Arc<Inner>>,
}

impl DoneHandle {
    pub fn done(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl Drop for DoneHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Receiver side of the close-requested broadcast
#[derive(Debug, Clone)]
pub struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    /// Resolve once close has been requested
    pub async fn recv(&mut self) {
        // An error means the coordinator is gone, which also means closed
        let _ = self.rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_first_error_wins() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.request_close(Some(DnsError::runtime("first"))));
        assert!(!lifecycle.request_close(Some(DnsError::runtime("second"))));

        let err = lifecycle.err().unwrap();
        assert_eq!(err.to_string(), "Runtime error: first");
        assert_eq!(lifecycle.err().unwrap().to_string(), err.to_string());
    }

    #[tokio::test]
    async fn test_clean_close_ignores_later_error() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.request_close(None));
        assert!(!lifecycle.request_close(Some(DnsError::runtime("late"))));
        assert!(lifecycle.err().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_request_close_broadcasts_once() {
        let lifecycle = Lifecycle::new();
        let winners = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..32 {
            let lifecycle = lifecycle.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                if lifecycle.request_close(Some(DnsError::runtime(format!("err-{i}")))) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        let first = lifecycle.err().unwrap().to_string();
        assert!(first.starts_with("Runtime error: err-"));
        assert_eq!(lifecycle.err().unwrap().to_string(), first);
    }

    #[tokio::test]
    async fn test_wait_close_requested() {
        let lifecycle = Lifecycle::new();
        assert!(
            timeout(Duration::from_millis(20), lifecycle.wait_close_requested())
                .await
                .is_err()
        );

        let closer = lifecycle.clone();
        tokio::spawn(async move {
            closer.request_close(None);
        });
        timeout(Duration::from_secs(1), lifecycle.wait_close_requested())
            .await
            .unwrap();
        assert!(lifecycle.is_closing());
    }

    #[tokio::test]
    async fn test_close_wait_waits_for_attached_tasks() {
        let lifecycle = Lifecycle::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        lifecycle
            .attach(|done, mut close| async move {
                close.recv().await;
                let _ = release_rx.await;
                done.done();
            })
            .unwrap();

        lifecycle.request_close(None);
        lifecycle.done();

        // Task saw the close signal but has not acknowledged yet
        assert!(
            timeout(Duration::from_millis(50), lifecycle.close_wait())
                .await
                .is_err()
        );

        release_tx.send(()).unwrap();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_wait_requires_main_ack() {
        let lifecycle = Lifecycle::new();
        lifecycle.request_close(None);
        assert!(
            timeout(Duration::from_millis(20), lifecycle.close_wait())
                .await
                .is_err()
        );

        lifecycle.done();
        lifecycle.done();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_attach_after_close_is_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.request_close(None);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_c = ran.clone();
        let result = lifecycle.attach(move |done, _close| async move {
            ran_c.fetch_add(1, Ordering::SeqCst);
            done.done();
        });
        assert!(matches!(result, Err(DnsError::Closing)));

        lifecycle.done();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_task_triggers_close() {
        let lifecycle = Lifecycle::new();
        let reporter = lifecycle.clone();

        lifecycle
            .attach(move |done, _close| async move {
                reporter.request_close(Some(DnsError::runtime("listener died")));
                done.done();
            })
            .unwrap();

        timeout(Duration::from_secs(1), lifecycle.wait_close_requested())
            .await
            .unwrap();
        lifecycle.done();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
        assert_eq!(
            lifecycle.err().unwrap().to_string(),
            "Runtime error: listener died"
        );
    }

    #[tokio::test]
    async fn test_dropped_handle_acknowledges() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .attach(|done, _close| async move {
                drop(done);
            })
            .unwrap();

        lifecycle.request_close(None);
        lifecycle.done();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_signal_observed_by_every_task() {
        let lifecycle = Lifecycle::new();
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let seen = seen.clone();
            lifecycle
                .attach(move |done, mut close| async move {
                    close.recv().await;
                    assert!(close.is_closed());
                    seen.fetch_add(1, Ordering::SeqCst);
                    done.done();
                })
                .unwrap();
        }

        lifecycle.request_close(None);
        lifecycle.done();
        timeout(Duration::from_secs(1), lifecycle.close_wait())
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 8);
    }
}
