//! Delay-coalescing debouncer.
//!
//! Coalesces rapid repeated invocations into one delayed task, fired after
//! the delay elapses from the *last* invocation. Cancellation is explicit
//! and idempotent; an immediate-fire override bypasses the delay. Each
//! invocation gets a monotonically increasing sequence number so an owner
//! can detect that a result raced with a newer pending call.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// A scheduled-but-not-yet-fired call.
struct Pending {
    seq: u64,
    cancel: CancellationToken,
}

/// Coalesces rapid repeated invocations into one delayed call.
///
/// Single-owner cooperative semantics: callers must not invoke the
/// debouncer from inside the executing task.
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Option<Pending>>>,
    invocations: AtomicU64,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(None)),
            invocations: AtomicU64::new(0),
        }
    }

    /// Schedule `task` to run after the delay, superseding any pending call.
    ///
    /// Invoking again within the window discards the previous task and
    /// restarts the delay. Invoking after [`cancel`](Self::cancel)
    /// schedules a fresh delay.
    pub fn call<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let seq = self.next_seq();
        let cancel = CancellationToken::new();
        {
            let mut pending = self.pending.lock();
            if let Some(prev) = pending.take() {
                prev.cancel.cancel();
            }
            *pending = Some(Pending {
                seq,
                cancel: cancel.clone(),
            });
        }

        let delay = self.delay;
        let slot = Arc::clone(&self.pending);
        let _ = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    {
                        let mut pending = slot.lock();
                        match pending.as_ref() {
                            // Still current: consume the slot and fire.
                            Some(p) if p.seq == seq => *pending = None,
                            // Superseded between timer fire and lock.
                            _ => return,
                        }
                    }
                    task.await;
                }
            }
        });
    }

    /// Immediate-fire override: discard any pending call and run `task` now.
    pub fn call_now<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let _ = self.next_seq();
        let _ = tokio::spawn(task);
    }

    /// Discard any pending scheduled call. Idempotent.
    pub fn cancel(&self) {
        if let Some(prev) = self.pending.lock().take() {
            prev.cancel.cancel();
        }
    }

    /// Whether a call is currently scheduled and not yet fired.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Total invocations so far (both delayed and immediate).
    ///
    /// An owner that captured this value when issuing work can tell whether
    /// a completing result raced with a newer invocation.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    fn next_seq(&self) -> u64 {
        self.invocations.fetch_add(1, Ordering::Relaxed) + 1
    }
}
