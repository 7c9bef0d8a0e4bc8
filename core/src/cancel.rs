//! Cooperative cancellation.

use core::iter;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::{Event, EventListener};
use futures::future;

/// A cloneable cancellation signal.
///
/// All clones observe the same state. A [`child`](Self::child) is cancelled whenever its
/// parent is, and can also be cancelled on its own without affecting the parent.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    event: Event,
    parent: Option<Cancellation>,
}

impl core::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Cancellation {
    /// Creates a signal that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal that fires with this one, or on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                event: Event::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Fires the signal and wakes everything waiting on it.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.event.notify(usize::MAX);
        }
    }

    /// Returns `true` once this signal or one of its ancestors has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(Self::is_cancelled)
    }

    /// Completes once the signal fires.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let listeners: Vec<EventListener> = self
                .lineage()
                .map(|cancellation| cancellation.inner.event.listen())
                .collect();
            // Re-check after registering so a concurrent `cancel` is not missed.
            if self.is_cancelled() {
                return;
            }
            future::select_all(listeners).await;
        }
    }

    // This signal followed by its ancestors.
    fn lineage(&self) -> impl Iterator<Item = &Self> {
        iter::successors(Some(self), |cancellation| cancellation.inner.parent.as_ref())
    }
}
