//! Per-name lock store.
//!
//! Resolution serializes per requested name, not globally: two threads
//! asking for the same never-seen name must not both do the defining
//! work, while requests for distinct names proceed fully in parallel.
//! Lock cells are created on demand and reclaimed as soon as the last
//! holder drops its guard, so a long-running process that has resolved
//! millions of distinct names retains none of them here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct LockCell {
    busy: Mutex<bool>,
    cond: Condvar,
    /// Guards in flight for this name, counted under the map shard lock
    /// so reclamation cannot race a new acquisition.
    holders: AtomicUsize,
}

impl LockCell {
    fn acquire(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.cond.wait(&mut busy);
        }
        *busy = true;
    }

    fn release(&self) {
        *self.busy.lock() = false;
        self.cond.notify_one();
    }
}

/// Store handing out one lock per in-flight name.
#[derive(Default)]
pub struct NameLocks {
    cells: DashMap<String, Arc<LockCell>>,
}

/// RAII guard for one name's lock. Dropping releases the lock and, when
/// no other resolution holds the same name, removes its cell.
pub struct NameGuard<'a> {
    store: &'a NameLocks,
    name: String,
    cell: Arc<LockCell>,
}

impl NameLocks {
    pub fn new() -> NameLocks {
        NameLocks::default()
    }

    /// Acquire the lock for `name`, blocking while another resolution of
    /// the same name is in flight.
    pub fn lock(&self, name: &str) -> NameGuard<'_> {
        let cell = {
            // Bump the holder count while the shard entry is held so a
            // concurrent guard drop cannot reclaim the cell in between.
            let entry = self
                .cells
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(LockCell::default()));
            entry.value().holders.fetch_add(1, Ordering::SeqCst);
            entry.value().clone()
        };
        cell.acquire();
        NameGuard {
            store: self,
            name: name.to_string(),
            cell,
        }
    }

    /// Number of names currently holding a lock cell.
    pub fn live_names(&self) -> usize {
        self.cells.len()
    }
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        self.cell.release();
        if self.cell.holders.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Last holder. Re-check under the shard lock; a new lock()
            // call may have bumped the count since the decrement.
            self.store
                .cells
                .remove_if(&self.name, |_, cell| {
                    cell.holders.load(Ordering::SeqCst) == 0
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_lock_and_reclaim() {
        let locks = NameLocks::new();
        {
            let _guard = locks.lock("com.example.Foo");
            assert_eq!(locks.live_names(), 1);
        }
        assert_eq!(locks.live_names(), 0);
    }

    #[test]
    fn test_distinct_names_do_not_block() {
        let locks = Arc::new(NameLocks::new());
        let _a = locks.lock("A");
        // If "B" contended with "A" this would deadlock the test.
        let _b = locks.lock("B");
        assert_eq!(locks.live_names(), 2);
    }

    #[test]
    fn test_same_name_serializes() {
        let locks = Arc::new(NameLocks::new());
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let running = running.clone();
                let peak = peak.clone();
                std::thread::spawn(move || {
                    let _guard = locks.lock("same");
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.live_names(), 0);
    }

    #[test]
    fn test_cell_reused_while_contended() {
        let locks = Arc::new(NameLocks::new());
        let guard = locks.lock("X");
        let waiter = {
            let locks = locks.clone();
            std::thread::spawn(move || {
                let _g = locks.lock("X");
            })
        };
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(locks.live_names(), 1);
        drop(guard);
        waiter.join().unwrap();
        assert_eq!(locks.live_names(), 0);
    }
}
