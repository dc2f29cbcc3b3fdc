//! The layered classpath.
//!
//! An append-only ordered list of containers searched front to back,
//! fronted by the resolution cache set (positive URL cache, global
//! negative cache, per-container negative caches) and pruned by the
//! package index once every container's contribution has been merged.

mod lazy;

pub use lazy::LazyClassPath;

pub mod index;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_artifact::{path, Container};
use url::Url;

use crate::cache::{BoundedCache, FifoPolicy, LruPolicy};
use crate::error::ResolveError;
use index::{IndexLookup, IndexWorker, PackageIndex};

/// Cache capacities for one classpath.
///
/// The defaults carry over the original tuning; the numbers are
/// arbitrary-but-proven and only shape performance, never correctness.
#[derive(Debug, Clone)]
pub struct ClassPathConfig {
    /// Positive URL cache entries.
    pub found_capacity: usize,
    /// Global "absent everywhere" entries.
    pub not_found_capacity: usize,
    /// "Not in this container" entries, per container.
    pub container_not_found_capacity: usize,
}

impl Default for ClassPathConfig {
    fn default() -> Self {
        ClassPathConfig {
            found_capacity: 900,
            not_found_capacity: 900,
            container_not_found_capacity: 250,
        }
    }
}

/// A successful byte resolution.
#[derive(Debug)]
pub struct FoundResource {
    pub bytes: Vec<u8>,
    pub url: Option<Url>,
    /// Classpath position of the defining container.
    pub container_position: usize,
}

/// Occupancy snapshot for the diagnostics dump.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassPathStats {
    pub containers: usize,
    pub found_urls: usize,
    pub really_not_found: usize,
    pub container_not_found: Vec<usize>,
    pub container_probes: Vec<usize>,
    pub outstanding_index_builds: usize,
}

struct PathEntry {
    container: Arc<Container>,
    /// Names this container is known not to contain. Only consulted and
    /// only written on scans that did not come through the index.
    not_found: Mutex<BoundedCache<String, ()>>,
    /// How often this container has been probed; diagnostic only.
    probes: AtomicUsize,
}

/// Ordered container list with the resolution cache set and package index.
pub struct ClassPath {
    entries: RwLock<Vec<Arc<PathEntry>>>,
    index: Arc<PackageIndex>,
    worker: Arc<IndexWorker>,
    /// Lock order: `found_urls` before `really_not_found`, always. The
    /// pairing keeps the two caches consistent: no name is ever in both.
    found_urls: Mutex<BoundedCache<String, Url>>,
    really_not_found: Mutex<BoundedCache<String, ()>>,
    container_not_found_capacity: usize,
}

enum Probe<T> {
    Found(T),
    /// The path exists but is container-shaped (or URL-less); keep
    /// scanning, and do not poison the negative cache with it.
    NoValue,
    Absent,
}

impl ClassPath {
    pub fn new(config: &ClassPathConfig, worker: Arc<IndexWorker>) -> ClassPath {
        ClassPath {
            entries: RwLock::new(Vec::new()),
            index: Arc::new(PackageIndex::new()),
            worker,
            found_urls: Mutex::new(BoundedCache::new(
                config.found_capacity,
                Box::new(LruPolicy),
            )),
            really_not_found: Mutex::new(BoundedCache::new(
                config.not_found_capacity,
                Box::new(FifoPolicy),
            )),
            container_not_found_capacity: config.container_not_found_capacity,
        }
    }

    /// Append a container and enqueue its index contribution.
    ///
    /// The container is visible to lookups immediately; until its
    /// contribution is merged the raised outstanding count keeps every
    /// lookup on the full scan path, so nothing is missed.
    pub fn add_container(&self, container: Arc<Container>) {
        let position = {
            let mut entries = self.entries.write();
            entries.push(Arc::new(PathEntry {
                container: container.clone(),
                not_found: Mutex::new(BoundedCache::new(
                    self.container_not_found_capacity,
                    Box::new(FifoPolicy),
                )),
                probes: AtomicUsize::new(0),
            }));
            entries.len() - 1
        };
        tracing::debug!(container = container.path(), position, "classpath container added");
        self.index.begin_contribution();
        let index = self.index.clone();
        self.worker
            .submit(move || index.merge(position, &container));
    }

    /// Resolve the bytes for a resource path.
    pub fn resolve_bytes(&self, name: &str) -> Result<Option<FoundResource>, ResolveError> {
        self.bytes_scan(name, true)
    }

    /// Resolve a resource path to a URL, consulting and feeding the
    /// positive and global negative caches.
    pub fn resolve_url(&self, name: &str) -> Result<Option<Url>, ResolveError> {
        let normalized = path::normalize(name);
        if let Some(url) = self.found_urls.lock().get(&normalized) {
            tracing::trace!(path = %normalized, "positive URL cache hit");
            return Ok(Some(url.clone()));
        }
        if self.really_not_found.lock().contains(&normalized) {
            tracing::trace!(path = %normalized, "negative cache hit");
            return Ok(None);
        }

        match self.url_scan(&normalized, true)? {
            Some(url) => {
                self.record_found(&normalized, url.clone());
                Ok(Some(url))
            }
            None => {
                self.record_really_not_found(&normalized);
                Ok(None)
            }
        }
    }

    /// Resolve every URL for a resource path, one per containing container.
    pub fn resolve_all_urls(&self, name: &str) -> Result<Vec<Url>, ResolveError> {
        let normalized = path::normalize(name);
        if self.really_not_found.lock().contains(&normalized) {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot();
        let mut urls = Vec::new();
        match self.index.candidates(&normalized) {
            IndexLookup::Miss => {
                self.record_really_not_found(&normalized);
                return Ok(Vec::new());
            }
            IndexLookup::Candidates(positions) => {
                for position in positions {
                    if let Some(entry) = snapshot.get(position) {
                        if let Probe::Found(url) = self.probe_url(entry, &normalized)? {
                            urls.push(url);
                        }
                    }
                }
            }
            IndexLookup::Bypass => {
                for entry in snapshot.iter() {
                    if entry.not_found.lock().contains(&normalized) {
                        continue;
                    }
                    match self.probe_url(entry, &normalized)? {
                        Probe::Found(url) => urls.push(url),
                        Probe::NoValue => {}
                        Probe::Absent => self.record_container_miss(entry, &normalized),
                    }
                }
            }
        }
        if urls.is_empty() {
            self.record_really_not_found(&normalized);
        }
        Ok(urls)
    }

    /// Byte scan with every cache ignored; the shadow resolution path.
    ///
    /// Reads the index (reads are side-effect-free) but neither consults
    /// nor writes any cache.
    pub fn scan_bytes_uncached(&self, name: &str) -> Result<Option<FoundResource>, ResolveError> {
        self.bytes_scan(name, false)
    }

    /// URL scan with every cache ignored; the shadow resolution path.
    pub fn scan_url_uncached(&self, name: &str) -> Result<Option<Url>, ResolveError> {
        self.url_scan(&path::normalize(name), false)
    }

    fn bytes_scan(
        &self,
        name: &str,
        use_caches: bool,
    ) -> Result<Option<FoundResource>, ResolveError> {
        let normalized = path::normalize(name);
        let snapshot = self.snapshot();
        match self.index.candidates(&normalized) {
            IndexLookup::Miss => Ok(None),
            IndexLookup::Candidates(positions) => {
                // Index membership already implies plausibility; the
                // per-container negative caches are bypassed here, so
                // entries written before the index went live are dead
                // weight until evicted. That trade is deliberate.
                for position in positions {
                    let Some(entry) = snapshot.get(position) else {
                        continue;
                    };
                    if let Probe::Found(found) = self.probe_bytes(entry, position, &normalized)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            IndexLookup::Bypass => {
                for (position, entry) in snapshot.iter().enumerate() {
                    if use_caches && entry.not_found.lock().contains(&normalized) {
                        continue;
                    }
                    match self.probe_bytes(entry, position, &normalized)? {
                        Probe::Found(found) => return Ok(Some(found)),
                        Probe::NoValue => {}
                        Probe::Absent => {
                            if use_caches {
                                self.record_container_miss(entry, &normalized);
                            }
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    fn url_scan(&self, normalized: &str, use_caches: bool) -> Result<Option<Url>, ResolveError> {
        let snapshot = self.snapshot();
        match self.index.candidates(normalized) {
            IndexLookup::Miss => Ok(None),
            IndexLookup::Candidates(positions) => {
                for position in positions {
                    let Some(entry) = snapshot.get(position) else {
                        continue;
                    };
                    if let Probe::Found(url) = self.probe_url(entry, normalized)? {
                        return Ok(Some(url));
                    }
                }
                Ok(None)
            }
            IndexLookup::Bypass => {
                for entry in snapshot.iter() {
                    if use_caches && entry.not_found.lock().contains(&normalized.to_string()) {
                        continue;
                    }
                    match self.probe_url(entry, normalized)? {
                        Probe::Found(url) => return Ok(Some(url)),
                        Probe::NoValue => {}
                        Probe::Absent => {
                            if use_caches {
                                self.record_container_miss(entry, normalized);
                            }
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    fn probe_bytes(
        &self,
        entry: &PathEntry,
        position: usize,
        normalized: &str,
    ) -> Result<Probe<FoundResource>, ResolveError> {
        entry.probes.fetch_add(1, Ordering::Relaxed);
        match entry.container.entry(normalized) {
            None => Ok(Probe::Absent),
            Some(found) if found.is_container() => Ok(Probe::NoValue),
            Some(found) => {
                let url = found.url();
                let bytes = found
                    .bytes()
                    .map_err(|err| ResolveError::container(entry.container.path(), err))?;
                Ok(Probe::Found(FoundResource {
                    bytes,
                    url,
                    container_position: position,
                }))
            }
        }
    }

    fn probe_url(&self, entry: &PathEntry, normalized: &str) -> Result<Probe<Url>, ResolveError> {
        entry.probes.fetch_add(1, Ordering::Relaxed);
        match entry.container.entry(normalized) {
            None => Ok(Probe::Absent),
            // Resources without a representable URL keep the scan going.
            Some(found) => Ok(found.url().map_or(Probe::NoValue, Probe::Found)),
        }
    }

    fn record_found(&self, normalized: &str, url: Url) {
        let mut found = self.found_urls.lock();
        let mut not_found = self.really_not_found.lock();
        not_found.remove(&normalized.to_string());
        found.insert(normalized.to_string(), url);
    }

    fn record_really_not_found(&self, normalized: &str) {
        let found = self.found_urls.lock();
        let mut not_found = self.really_not_found.lock();
        // A concurrent scan may have found the name since ours gave up;
        // the positive result wins.
        if !found.contains(&normalized.to_string()) {
            not_found.insert(normalized.to_string(), ());
        }
    }

    fn record_container_miss(&self, entry: &PathEntry, normalized: &str) {
        entry.not_found.lock().insert(normalized.to_string(), ());
    }

    fn snapshot(&self) -> Vec<Arc<PathEntry>> {
        self.entries.read().clone()
    }

    /// Whether `container` (by identity) is on this classpath.
    pub fn contains_container(&self, container: &Arc<Container>) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| Arc::ptr_eq(&e.container, container))
    }

    /// The container at a classpath position.
    pub fn container_at(&self, position: usize) -> Option<Arc<Container>> {
        self.entries.read().get(position).map(|e| e.container.clone())
    }

    /// Ordered container list.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.entries.read().iter().map(|e| e.container.clone()).collect()
    }

    /// Index contributions not yet merged.
    pub fn outstanding_builds(&self) -> usize {
        self.index.outstanding()
    }

    /// Block until all submitted index contributions have merged.
    pub fn await_index(&self) {
        self.worker.drain();
    }

    pub fn stats(&self) -> ClassPathStats {
        let entries = self.entries.read();
        ClassPathStats {
            containers: entries.len(),
            found_urls: self.found_urls.lock().len(),
            really_not_found: self.really_not_found.lock().len(),
            container_not_found: entries.iter().map(|e| e.not_found.lock().len()).collect(),
            container_probes: entries
                .iter()
                .map(|e| e.probes.load(Ordering::Relaxed))
                .collect(),
            outstanding_index_builds: self.index.outstanding(),
        }
    }
}
