//! Lazy-init wrapper around a classpath.
//!
//! A loader may be configured with library content that is expensive to
//! open (archives on slow storage, large directory trees). The wrapper
//! defers that one-time copy-in until the first read, guarantees it runs
//! exactly once under concurrent first access, and gets out of the way
//! afterwards: mutations always pass straight through, and once the flag
//! is published reads cost a single atomic load before hitting the real
//! classpath.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata_artifact::Container;
use url::Url;

use super::{ClassPath, ClassPathStats, FoundResource};
use crate::error::ResolveError;

type Setup = Box<dyn FnOnce(&ClassPath) + Send>;

/// Classpath wrapper running a one-time setup before the first read.
pub struct LazyClassPath {
    inner: ClassPath,
    setup: Mutex<Option<Setup>>,
    ready: AtomicBool,
}

impl LazyClassPath {
    /// Wrap `inner`, deferring `setup` until the first read operation.
    pub fn new(inner: ClassPath, setup: Setup) -> LazyClassPath {
        LazyClassPath {
            inner,
            setup: Mutex::new(Some(setup)),
            ready: AtomicBool::new(false),
        }
    }

    /// Wrap `inner` with nothing pending.
    pub fn ready(inner: ClassPath) -> LazyClassPath {
        LazyClassPath {
            inner,
            setup: Mutex::new(None),
            ready: AtomicBool::new(true),
        }
    }

    /// Double-checked init: the atomic fast path is the permanent
    /// "pointer swap"; after it publishes, readers never touch the mutex.
    fn ensure_ready(&self) {
        if self.ready.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.setup.lock();
        if !self.ready.load(Ordering::Relaxed) {
            if let Some(setup) = slot.take() {
                setup(&self.inner);
            }
            self.ready.store(true, Ordering::Release);
        }
    }

    /// Mutations pass through without triggering setup.
    pub fn add_container(&self, container: Arc<Container>) {
        self.inner.add_container(container);
    }

    pub fn resolve_bytes(&self, name: &str) -> Result<Option<FoundResource>, ResolveError> {
        self.ensure_ready();
        self.inner.resolve_bytes(name)
    }

    pub fn resolve_url(&self, name: &str) -> Result<Option<Url>, ResolveError> {
        self.ensure_ready();
        self.inner.resolve_url(name)
    }

    pub fn resolve_all_urls(&self, name: &str) -> Result<Vec<Url>, ResolveError> {
        self.ensure_ready();
        self.inner.resolve_all_urls(name)
    }

    pub fn scan_bytes_uncached(&self, name: &str) -> Result<Option<FoundResource>, ResolveError> {
        self.ensure_ready();
        self.inner.scan_bytes_uncached(name)
    }

    pub fn scan_url_uncached(&self, name: &str) -> Result<Option<Url>, ResolveError> {
        self.ensure_ready();
        self.inner.scan_url_uncached(name)
    }

    /// Relevance checks and diagnostics read the real classpath without
    /// forcing setup; an uninitialized classpath truthfully reports the
    /// containers added so far.
    pub fn contains_container(&self, container: &Arc<Container>) -> bool {
        self.inner.contains_container(container)
    }

    pub fn container_at(&self, position: usize) -> Option<Arc<Container>> {
        self.inner.container_at(position)
    }

    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.inner.containers()
    }

    pub fn outstanding_builds(&self) -> usize {
        self.inner.outstanding_builds()
    }

    pub fn await_index(&self) {
        self.inner.await_index()
    }

    pub fn stats(&self) -> ClassPathStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::index::IndexWorker;
    use crate::classpath::ClassPathConfig;
    use crate::gate::StartupGate;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn inner() -> ClassPath {
        let gate = Arc::new(StartupGate::new());
        gate.signal();
        let worker = Arc::new(IndexWorker::new(gate, Duration::from_secs(5)));
        ClassPath::new(&ClassPathConfig::default(), worker)
    }

    fn counting_lazy(counter: Arc<AtomicUsize>) -> LazyClassPath {
        LazyClassPath::new(
            inner(),
            Box::new(move |cp| {
                counter.fetch_add(1, Ordering::SeqCst);
                cp.add_container(Arc::new(Container::memory(
                    "late",
                    vec![("lib/Late.class".to_string(), vec![0x42])],
                )));
            }),
        )
    }

    #[test]
    fn test_setup_deferred_until_first_read() {
        let ran = Arc::new(AtomicUsize::new(0));
        let lazy = counting_lazy(ran.clone());

        // Mutation does not trigger setup.
        lazy.add_container(Arc::new(Container::memory(
            "early",
            vec![("app/A.class".to_string(), vec![1])],
        )));
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        // First read runs it, and the late container is visible to that
        // very read.
        let found = lazy.resolve_bytes("lib/Late.class").unwrap().unwrap();
        assert_eq!(found.bytes, vec![0x42]);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_setup_runs_once_across_reads() {
        let ran = Arc::new(AtomicUsize::new(0));
        let lazy = counting_lazy(ran.clone());
        for _ in 0..5 {
            let _ = lazy.resolve_url("anything").unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_setup_runs_once_under_concurrency() {
        let ran = Arc::new(AtomicUsize::new(0));
        let lazy = Arc::new(counting_lazy(ran.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = lazy.clone();
                std::thread::spawn(move || {
                    let found = lazy.resolve_bytes("lib/Late.class").unwrap();
                    assert!(found.is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_wrapper_skips_setup() {
        let lazy = LazyClassPath::ready(inner());
        assert!(lazy.resolve_bytes("nothing").unwrap().is_none());
    }
}
