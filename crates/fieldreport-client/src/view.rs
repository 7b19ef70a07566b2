//! Mount-guarded view state.
//!
//! A [`ViewState`] is the single write path for a screen's state. Readers get
//! the latest committed value through a `watch` channel. Once the view is
//! closed every further commit is dropped, so async work that resolves after
//! unmount cannot touch the state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::trace;

pub(crate) struct ViewState<T> {
    /// `true` while mounted. Held across each commit so close cannot interleave.
    gate: Mutex<bool>,
    tx: watch::Sender<T>,
    revision: AtomicU64,
}

impl<T: Clone> ViewState<T> {
    pub(crate) fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            gate: Mutex::new(true),
            tx,
            revision: AtomicU64::new(0),
        }
    }

    /// Mutate the state if still mounted. Returns whether the write happened.
    pub(crate) fn commit(&self, f: impl FnOnce(&mut T)) -> bool {
        let mounted = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if !*mounted {
            trace!("dropping state write after unmount");
            return false;
        }
        self.tx.send_modify(f);
        self.revision.fetch_add(1, Ordering::AcqRel);
        true
    }

    pub(crate) fn close(&self) {
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    pub(crate) fn is_mounted(&self) -> bool {
        *self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of committed writes since creation.
    pub(crate) fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}
