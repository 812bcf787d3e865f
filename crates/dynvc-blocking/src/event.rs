use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One-shot cancellation token shared between a connection's owner, its
/// dispatch thread, and any plugin thread blocked on a write.
///
/// Setting the event is sticky. Waiters are woken; a blocked transport read
/// does not observe the event by itself, so the owner is expected to also
/// shut the underlying stream down (see
/// [`ConnectionHandle::stop`](crate::ConnectionHandle::stop)).
#[derive(Clone, Default)]
pub struct StopEvent {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl StopEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event and wakes every waiter.
    pub fn set(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        let _guard = crate::connection::lock(&self.inner.mutex);
        self.inner.condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Parks the calling thread until the event is set or `timeout` elapses.
    /// Returns `true` when the event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        let guard = crate::connection::lock(&self.inner.mutex);
        let (_guard, _result) = self
            .inner
            .condvar
            .wait_timeout(guard, timeout)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.is_set()
    }
}

impl core::fmt::Debug for StopEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StopEvent").field("set", &self.is_set()).finish()
    }
}
