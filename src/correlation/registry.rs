//! Observer registry: every decoded frame is offered to every observer.
//!
//! The link carries one interleaved stream of frames, so each observer sees
//! all of them and decides for itself whether a frame is its own. Observers
//! are held by an [`ObserverGuard`]; dropping the guard detaches the
//! observer, so every exit path of a request (match, timeout, error,
//! cancellation) cleans up.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use xbee_client::correlation::{Disposition, ObserverRegistry};
//! use xbee_client::protocol::{Frame, Module};
//! use bytes::Bytes;
//!
//! let registry = Arc::new(ObserverRegistry::new());
//! let guard = registry.register(Arc::new(|frame: &Frame| {
//!     if frame.id() == Some(7) { Disposition::Detach } else { Disposition::Keep }
//! }));
//! assert_eq!(registry.len(), 1);
//!
//! let frame = Frame::decode(Bytes::from_static(&[0x89, 0x07, 0x00]), Module::ZigBee).unwrap();
//! assert_eq!(registry.dispatch(&frame), 1);
//! assert!(registry.is_empty());
//! drop(guard);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::protocol::Frame;

/// What an observer wants after seeing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not settled, keep observing.
    Keep,
    /// Settled, detach now.
    Detach,
}

/// Something that looks at every inbound frame.
pub trait Observer: Send + Sync + 'static {
    fn observe(&self, frame: &Frame) -> Disposition;
}

impl<F> Observer for F
where
    F: Fn(&Frame) -> Disposition + Send + Sync + 'static,
{
    fn observe(&self, frame: &Frame) -> Disposition {
        self(frame)
    }
}

/// Registry of attached observers, in registration order.
pub struct ObserverRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    next_key: u64,
    closed: bool,
    observers: BTreeMap<u64, Arc<dyn Observer>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_key: 0,
                closed: false,
                observers: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attach an observer. It stays attached until the guard is dropped or
    /// it returns [`Disposition::Detach`].
    ///
    /// A closed registry drops the observer straight away.
    pub fn register(self: &Arc<Self>, observer: Arc<dyn Observer>) -> ObserverGuard {
        let mut inner = self.lock();
        let key = inner.next_key;
        inner.next_key += 1;
        if inner.closed {
            drop(inner);
            drop(observer);
        } else {
            inner.observers.insert(key, observer);
        }

        ObserverGuard {
            registry: Arc::downgrade(self),
            key,
        }
    }

    /// Offer a frame to every attached observer.
    ///
    /// Observers run outside the registry lock, so they may register or
    /// detach others. Returns how many observers detached.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let snapshot: Vec<(u64, Arc<dyn Observer>)> = self
            .lock()
            .observers
            .iter()
            .map(|(key, observer)| (*key, observer.clone()))
            .collect();

        let settled: Vec<u64> = snapshot
            .into_iter()
            .filter(|(_, observer)| observer.observe(frame) == Disposition::Detach)
            .map(|(key, _)| key)
            .collect();

        if !settled.is_empty() {
            let mut inner = self.lock();
            for key in &settled {
                inner.observers.remove(key);
            }
        }

        settled.len()
    }

    /// Detach every observer and refuse new ones. No frame will be
    /// dispatched again.
    pub fn close(&self) {
        let drained = {
            let mut inner = self.lock();
            inner.closed = true;
            std::mem::take(&mut inner.observers)
        };
        tracing::debug!("Registry closed, detaching {} observers", drained.len());
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, key: u64) {
        self.lock().observers.remove(&key);
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps an observer attached. Detaches it on drop.
pub struct ObserverGuard {
    registry: Weak<ObserverRegistry>,
    key: u64,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.key);
        }
    }
}
