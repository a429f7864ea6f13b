use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// Mutex whose grants expire on their own, so a driver that dies while
/// holding it cannot wedge the others.
#[derive(Debug)]
pub struct LeaseMutex {
    name: String,
    held: Mutex<Option<Lease>>,
    released: Notify,
}

impl LeaseMutex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            held: Mutex::new(None),
            released: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grants the lease if the mutex is free, expired, or already held by
    /// `owner` (which renews it).
    pub fn try_acquire(&self, owner: &str, lease: Duration) -> bool {
        let mut held = self.held.lock();
        let now = Instant::now();
        match held.as_ref() {
            Some(current) if current.expires_at > now && current.owner != owner => false,
            Some(current) => {
                if current.owner != owner {
                    warn!(
                        "Lease on '{}' held by {} expired; granting to {}",
                        self.name, current.owner, owner
                    );
                }
                *held = Some(Lease {
                    owner: owner.to_string(),
                    expires_at: now + lease,
                });
                true
            }
            None => {
                *held = Some(Lease {
                    owner: owner.to_string(),
                    expires_at: now + lease,
                });
                true
            }
        }
    }

    /// Blocks up to `wait` for the lease. `Ok(false)` means the wait ran
    /// out; `Err(ShutDown)` means the coordinator stopped without waiting.
    pub async fn acquire(
        &self,
        owner: &str,
        lease: Duration,
        wait: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let deadline = Instant::now() + wait;

        loop {
            if *shutdown.borrow() {
                return Err(CoordinatorError::ShutDown);
            }

            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire(owner, lease) {
                info!("Lease on '{}' granted to {} for {:?}", self.name, owner, lease);
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("{} gave up waiting for '{}'", owner, self.name);
                return Ok(false);
            }

            let wake_at = self.expires_at().map_or(deadline, |e| e.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Err(CoordinatorError::ShutDown);
                    }
                }
            }
        }
    }

    /// Releases the lease if `owner` still holds it. A lapsed lease is
    /// cleared but reported as not released.
    pub fn release(&self, owner: &str) -> bool {
        let mut held = self.held.lock();
        let released = match held.as_ref() {
            Some(current) if current.owner == owner => {
                let live = current.expires_at > Instant::now();
                *held = None;
                live
            }
            _ => return false,
        };
        drop(held);

        self.released.notify_waiters();
        if released {
            debug!("Lease on '{}' released by {}", self.name, owner);
        } else {
            warn!("Lease on '{}' had already expired for {}", self.name, owner);
        }
        released
    }

    /// Current holder of an unexpired lease.
    pub fn holder(&self) -> Option<String> {
        let held = self.held.lock();
        held.as_ref()
            .filter(|l| l.expires_at > Instant::now())
            .map(|l| l.owner.clone())
    }

    fn expires_at(&self) -> Option<Instant> {
        self.held.lock().as_ref().map(|l| l.expires_at)
    }
}

/// Manual-reset event: once signalled, every waiter passes until reset.
#[derive(Debug)]
pub struct SyncEvent {
    name: String,
    signaled: Mutex<bool>,
    changed: Notify,
}

impl SyncEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signaled: Mutex::new(false),
            changed: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signal(&self) {
        *self.signaled.lock() = true;
        self.changed.notify_waiters();
        debug!("Event '{}' signalled", self.name);
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock()
    }

    /// Waits up to `wait` for the event; returns whether it was signalled.
    pub async fn wait(&self, wait: Duration, shutdown: &mut watch::Receiver<bool>) -> Result<bool> {
        let deadline = Instant::now() + wait;

        loop {
            if *shutdown.borrow() {
                return Err(CoordinatorError::ShutDown);
            }

            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_signaled() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Err(CoordinatorError::ShutDown);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SEC: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_acquire_free_mutex() {
        let (_tx, mut rx) = watch::channel(false);
        let m = LeaseMutex::new("db");
        assert!(m.acquire("a", SEC * 10, SEC, &mut rx).await.unwrap());
        assert_eq!(m.holder().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let (_tx, mut rx) = watch::channel(false);
        let m = LeaseMutex::new("db");
        assert!(m.try_acquire("a", SEC * 60));
        let started = Instant::now();
        assert!(!m.acquire("b", SEC * 10, SEC * 2, &mut rx).await.unwrap());
        assert!(started.elapsed() >= SEC * 2);
        assert_eq!(m.holder().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_is_taken_over() {
        let (_tx, mut rx) = watch::channel(false);
        let m = LeaseMutex::new("db");
        assert!(m.try_acquire("crashed", SEC));
        // Waits past the crashed holder's lease and gets the mutex.
        assert!(m.acquire("b", SEC * 10, SEC * 5, &mut rx).await.unwrap());
        assert_eq!(m.holder().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_wakes_waiter() {
        let (_tx, rx) = watch::channel(false);
        let m = Arc::new(LeaseMutex::new("db"));
        assert!(m.try_acquire("a", SEC * 60));

        let waiter = {
            let m = m.clone();
            let mut rx = rx.clone();
            tokio::spawn(async move { m.acquire("b", SEC * 60, SEC * 30, &mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(m.release("a"));

        assert!(waiter.await.unwrap().unwrap());
        assert_eq!(m.holder().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_by_non_owner_is_ignored() {
        let m = LeaseMutex::new("db");
        assert!(m.try_acquire("a", SEC * 60));
        assert!(!m.release("b"));
        assert_eq!(m.holder().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_expiry_reports_false() {
        let m = LeaseMutex::new("db");
        assert!(m.try_acquire("a", SEC));
        tokio::time::sleep(SEC * 2).await;
        assert!(m.holder().is_none());
        assert!(!m.release("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_renews_lease() {
        let m = LeaseMutex::new("db");
        assert!(m.try_acquire("a", SEC));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(m.try_acquire("a", SEC * 10));
        tokio::time::sleep(SEC * 2).await;
        assert_eq!(m.holder().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_unblocks_waiter() {
        let (tx, rx) = watch::channel(false);
        let m = Arc::new(LeaseMutex::new("db"));
        assert!(m.try_acquire("a", SEC * 600));

        let waiter = {
            let m = m.clone();
            let mut rx = rx.clone();
            tokio::spawn(async move { m.acquire("b", SEC, SEC * 600, &mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(CoordinatorError::ShutDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_wait_and_signal() {
        let (_tx, rx) = watch::channel(false);
        let e = Arc::new(SyncEvent::new("ready"));

        let waiter = {
            let e = e.clone();
            let mut rx = rx.clone();
            tokio::spawn(async move { e.wait(SEC * 30, &mut rx).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        e.signal();
        assert!(waiter.await.unwrap().unwrap());

        // Stays signalled until reset.
        let mut rx = rx.clone();
        assert!(e.wait(Duration::ZERO, &mut rx).await.unwrap());
        e.reset();
        assert!(!e.wait(SEC, &mut rx).await.unwrap());
    }
}
