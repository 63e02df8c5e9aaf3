// Fixed-size pool of upstream client handles.
//
// A `Semaphore` bounds concurrent checkouts and queues waiters in FIFO
// order; a slot bitmap records which handle each checkout owns so a handle
// is never lent to two tasks at once. Guards release on drop, so a slot
// returns to the pool even when the borrowing task errors out.

use std::ops::Deref;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error};

use crate::error::HotelsApiError;

#[derive(Debug)]
pub struct ClientPool<C> {
    clients: Vec<C>,
    in_use: Mutex<Vec<bool>>,
    permits: Semaphore,
    acquire_timeout: Duration,
}

impl<C> ClientPool<C> {
    /// Build a pool from pre-constructed client handles. The pool size is
    /// fixed to `clients.len()` for its lifetime.
    pub fn new(clients: Vec<C>, acquire_timeout: Duration) -> Self {
        assert!(!clients.is_empty(), "pool requires at least one client");
        let size = clients.len();
        Self {
            clients,
            in_use: Mutex::new(vec![false; size]),
            permits: Semaphore::new(size),
            acquire_timeout,
        }
    }

    /// Check out a client, waiting up to the configured timeout for a free
    /// slot. Waiters are served in arrival order.
    pub async fn acquire(&self) -> Result<PoolGuard<'_, C>, HotelsApiError> {
        let permit = match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(HotelsApiError::Internal("client pool is shut down".into()))
            }
            Err(_) => {
                return Err(HotelsApiError::PoolTimeout {
                    waited: self.acquire_timeout,
                })
            }
        };

        let slot = {
            let mut in_use = self.in_use.lock();
            // A permit guarantees a free slot exists.
            let slot = in_use
                .iter()
                .position(|taken| !taken)
                .ok_or_else(|| HotelsApiError::Internal("pool slot accounting broken".into()))?;
            in_use[slot] = true;
            slot
        };
        debug!(slot, "acquired pool client");

        Ok(PoolGuard {
            pool: self,
            slot,
            _permit: permit,
        })
    }

    /// Number of clients currently checked out.
    pub fn active(&self) -> usize {
        self.in_use.lock().iter().filter(|taken| **taken).count()
    }

    pub fn capacity(&self) -> usize {
        self.clients.len()
    }

    /// Shut the pool down: pending and future acquires fail immediately.
    /// Already-issued guards stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }

    fn release(&self, slot: usize) {
        let mut in_use = self.in_use.lock();
        if !in_use[slot] {
            error!(slot, "pool slot released twice");
            return;
        }
        in_use[slot] = false;
        debug!(slot, "released pool client");
    }
}

/// Exclusive borrow of one pooled client. Dropping it returns the slot.
#[derive(Debug)]
pub struct PoolGuard<'a, C> {
    pool: &'a ClientPool<C>,
    slot: usize,
    _permit: SemaphorePermit<'a>,
}

impl<C> Deref for PoolGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.pool.clients[self.slot]
    }
}

impl<C> Drop for PoolGuard<'_, C> {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;
    use std::sync::Arc;

    fn pool(size: usize, timeout_ms: u64) -> ClientPool<usize> {
        ClientPool::new((0..size).collect(), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let pool = pool(2, 100);
        assert_eq!(pool.active(), 0);

        let guard = tokio_test::assert_ok!(pool.acquire().await);
        assert_eq!(pool.active(), 1);
        drop(guard);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn guards_hold_distinct_clients() {
        let pool = pool(3, 100);
        let g1 = pool.acquire().await.unwrap();
        let g2 = pool.acquire().await.unwrap();
        let g3 = pool.acquire().await.unwrap();
        let mut ids = vec![*g1, *g2, *g3];
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_times_out_when_exhausted() {
        let pool = pool(1, 50);
        let _held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err.kind(), "pool_timeout");
    }

    #[tokio::test]
    async fn released_slot_is_reacquirable() {
        let pool = pool(1, 100);
        for _ in 0..10 {
            let guard = pool.acquire().await.unwrap();
            assert_eq!(*guard, 0);
        }
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquires_but_honors_held_guards() {
        let pool = pool(2, 100);
        let guard = pool.acquire().await.unwrap();
        pool.close();

        let err = pool.acquire().await.unwrap_err();
        assert_eq!(err.kind(), "internal");
        // The outstanding guard still works and releases cleanly.
        assert_eq!(*guard, 0);
        drop(guard);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn guard_released_on_task_error() {
        let pool = Arc::new(pool(1, 100));
        let pool2 = Arc::clone(&pool);
        let task = tokio::spawn(async move {
            let _guard = pool2.acquire().await.unwrap();
            panic!("task died holding a client");
        });
        assert!(task.await.is_err());
        // Slot came back despite the panic.
        let guard = pool.acquire().await.unwrap();
        assert_eq!(*guard, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_capacity() {
        let pool = Arc::new(ClientPool::new(
            vec![(); 3],
            Duration::from_secs(5),
        ));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = pool.acquire().await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.active(), 0);
    }
}
