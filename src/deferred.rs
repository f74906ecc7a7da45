//! Placeholders for content that has not arrived yet.
//!
//! A [`Deferred`] starts out pending and settles exactly once. Anyone holding
//! a clone can inspect its status synchronously, which is what the reconciler
//! needs, or wait for it with [`Deferred::settled`], which is what a renderer
//! needs.

use std::fmt;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::FetchError;

/// Opaque debug metadata streamed alongside server content.
///
/// Profiling tools attribute timings to where content was first requested,
/// so the entries collected when a placeholder is created are kept and the
/// entries supplied on resolution are appended after them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugInfo(Vec<Value>);

impl DebugInfo {
    pub fn new(entries: Vec<Value>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn extend(&mut self, other: &DebugInfo) {
        self.0.extend(other.0.iter().cloned());
    }
}

/// Observable state of a [`Deferred`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(FetchError),
}

struct Shared<T> {
    state: State<T>,
    debug_info: DebugInfo,
}

struct Inner<T> {
    shared: Mutex<Shared<T>>,
    notify: Notify,
}

/// A value that will be provided later, by whoever holds a clone of it.
///
/// Settling is one-directional: once fulfilled or rejected, further calls to
/// [`resolve`](Self::resolve) and [`reject`](Self::reject) are ignored, so the
/// first resolution always wins.
pub struct Deferred<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self::with_debug_info(DebugInfo::default())
    }

    pub fn with_debug_info(debug_info: DebugInfo) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    state: State::Pending,
                    debug_info,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        // State transitions can't be observed half-done, a poisoned lock is
        // still consistent.
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Status {
        match self.lock().state {
            State::Pending => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// Debug info given on creation, followed by the debug info given on
    /// resolution.
    pub fn debug_info(&self) -> DebugInfo {
        self.lock().debug_info.clone()
    }

    /// Fulfills the value. Returns `false` if it had already settled, in which
    /// case nothing changes.
    pub fn resolve(&self, value: T, debug_info: Option<&DebugInfo>) -> bool {
        self.settle(State::Fulfilled(value), debug_info)
    }

    /// Rejects the value. Returns `false` if it had already settled, in which
    /// case nothing changes.
    pub fn reject(&self, error: FetchError, debug_info: Option<&DebugInfo>) -> bool {
        self.settle(State::Rejected(error), debug_info)
    }

    fn settle(&self, state: State<T>, debug_info: Option<&DebugInfo>) -> bool {
        let mut shared = self.lock();
        if !matches!(shared.state, State::Pending) {
            return false;
        }

        shared.state = state;
        if let Some(debug_info) = debug_info {
            shared.debug_info.extend(debug_info);
        }
        drop(shared);

        self.inner.notify.notify_waiters();
        true
    }

    /// Whether both handles point at the same placeholder.
    pub fn ptr_eq(&self, other: &Deferred<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Deferred<T> {
    /// The settled outcome, or `None` while still pending.
    pub fn value(&self) -> Option<Result<T, FetchError>> {
        match &self.lock().state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }

    /// Waits until the value settles.
    pub async fn settled(&self) -> Result<T, FetchError> {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            // Register before checking, otherwise a resolution landing in
            // between would never wake us.
            notified.as_mut().enable();

            if let Some(outcome) = self.value() {
                return outcome;
            }

            notified.await;
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Deferred").field(&self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_resolution_wins() {
        let deferred = Deferred::new();
        assert!(deferred.is_pending());

        assert!(deferred.resolve(1, None));
        assert!(!deferred.resolve(2, None));
        assert!(!deferred.reject(FetchError::new(anyhow::anyhow!("late")), None));

        assert_eq!(deferred.status(), Status::Fulfilled);
        assert_eq!(deferred.value().unwrap().unwrap(), 1);
    }

    #[test]
    fn rejection_is_final() {
        let deferred = Deferred::<u8>::new();
        assert!(deferred.reject(FetchError::new(anyhow::anyhow!("offline")), None));
        assert!(!deferred.resolve(1, None));

        assert_eq!(deferred.status(), Status::Rejected);
        let error = deferred.value().unwrap().unwrap_err();
        assert_eq!(error.to_string(), "Failed to fetch route data: offline");
    }

    #[test]
    fn clones_share_state() {
        let deferred = Deferred::new();
        let clone = deferred.clone();
        clone.resolve("a", None);

        assert!(deferred.ptr_eq(&clone));
        assert_eq!(deferred.value().unwrap().unwrap(), "a");
    }

    #[test]
    fn debug_info_keeps_creation_entries_first() {
        let deferred = Deferred::with_debug_info(DebugInfo::new(vec![json!("created")]));
        deferred.resolve((), Some(&DebugInfo::new(vec![json!("resolved")])));
        deferred.resolve((), Some(&DebugInfo::new(vec![json!("ignored")])));

        assert_eq!(
            deferred.debug_info().entries(),
            &[json!("created"), json!("resolved")]
        );
    }

    #[test]
    fn settled_wakes_on_resolution() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let deferred = Deferred::new();
        let waiter = deferred.clone();

        let value = rt.block_on(async move {
            let wait = waiter.settled();
            let resolve = async {
                tokio::task::yield_now().await;
                deferred.resolve(7, None);
            };
            let (value, ()) = futures::join!(wait, resolve);
            value
        });

        assert_eq!(value.unwrap(), 7);
    }
}
