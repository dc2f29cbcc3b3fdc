//! Package index and its background builder.
//!
//! Linear classpath scanning degrades as the container list grows; the
//! index amortizes that by mapping a hashed directory prefix to the
//! containers that can possibly hold paths under it. Contributions are
//! merged one container at a time on a single background thread, and the
//! index is unreadable while any contribution is outstanding: lookups
//! fall back to the full scan instead of trusting a half-built map.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use strata_artifact::{path, Container};

use crate::gate::StartupGate;

/// Result of asking the index for the candidate containers of a path.
#[derive(Debug, PartialEq, Eq)]
pub enum IndexLookup {
    /// The index cannot be trusted (outstanding builds) or cannot help
    /// (top-level path with no directory component): scan the full list.
    Bypass,
    /// Candidate classpath positions, in classpath order.
    Candidates(Vec<usize>),
    /// The prefix is definitively unknown to every indexed container.
    Miss,
}

/// Map from hashed directory prefix to candidate classpath positions.
///
/// Reads take the shared lock; merges take the exclusive lock. The
/// outstanding-build counter is the authoritative "do not trust me yet"
/// signal: it is incremented before a container is published to readers
/// and decremented only after its contribution is fully merged.
pub struct PackageIndex {
    map: RwLock<FxHashMap<u64, Vec<usize>>>,
    outstanding: AtomicUsize,
}

impl PackageIndex {
    pub fn new() -> PackageIndex {
        PackageIndex {
            map: RwLock::new(FxHashMap::default()),
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_contribution(&self) {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Candidate containers for a normalized resource path.
    pub fn candidates(&self, normalized: &str) -> IndexLookup {
        if self.outstanding() > 0 {
            tracing::debug!(path = normalized, "index build pending, using full classpath");
            return IndexLookup::Bypass;
        }
        // Top-level resources have no directory key; every container is a
        // candidate.
        let Some(prefix) = path::parent_prefix(normalized) else {
            return IndexLookup::Bypass;
        };
        let key = prefix_key(prefix);
        // Narrow window: outstanding was zero above, but a container added
        // since then takes the write lock, so this read blocks until the
        // merge finishes rather than observing a torn map.
        let map = self.map.read();
        match map.get(&key) {
            Some(positions) => IndexLookup::Candidates(positions.clone()),
            None => IndexLookup::Miss,
        }
    }

    /// Merge one container's contribution and retire its outstanding count.
    ///
    /// Every ancestor prefix of every entry is keyed, so a lookup keyed on
    /// any directory level of an indexed path finds the container.
    pub(crate) fn merge(&self, position: usize, container: &Container) {
        let entries = container.walk();
        let mut map = self.map.write();
        for entry in &entries {
            let mut prefix = entry.as_str();
            while let Some(parent) = path::parent_prefix(prefix) {
                let positions = map.entry(prefix_key(parent)).or_default();
                if !positions.contains(&position) {
                    positions.push(position);
                }
                prefix = parent;
            }
        }
        drop(map);
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(
            container = container.path(),
            position,
            entries = entries.len(),
            "package index contribution merged"
        );
    }

    /// Distinct prefixes currently keyed. Diagnostic only.
    pub fn keyed_prefixes(&self) -> usize {
        self.map.read().len()
    }
}

impl Default for PackageIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix_key(prefix: &str) -> u64 {
    let mut hasher = FxHasher::default();
    prefix.hash(&mut hasher);
    hasher.finish()
}

type Job = Box<dyn FnOnce() + Send>;

/// Single background thread running index jobs strictly serialized.
///
/// The worker's first act is a bounded wait on the startup gate so index
/// building does not compete with application startup. A timeout there
/// degrades to building immediately; indexing is an accelerator, not a
/// correctness requirement. Dropping the worker disconnects the channel
/// and the thread exits after the job in hand; any never-run contribution
/// leaves its outstanding count in place, which keeps the index bypassed
/// and therefore safe.
pub struct IndexWorker {
    sender: Sender<Job>,
}

impl IndexWorker {
    pub fn new(gate: Arc<StartupGate>, startup_wait: Duration) -> IndexWorker {
        let (sender, receiver) = unbounded::<Job>();
        let spawned = std::thread::Builder::new()
            .name("strata-index-builder".to_string())
            .spawn(move || {
                if !gate.wait(startup_wait) {
                    tracing::warn!(
                        ?startup_wait,
                        "startup gate never signaled, index builder proceeding"
                    );
                }
                while let Ok(job) = receiver.recv() {
                    job();
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(%err, "failed to spawn index builder, index stays outstanding");
        }
        IndexWorker { sender }
    }

    /// Enqueue a job. Jobs run one at a time in submission order.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        // A send failure means the worker is gone (shutdown); the dropped
        // job's outstanding count keeps the index bypassed.
        let _ = self.sender.send(Box::new(job));
    }

    /// Block until every job submitted before this call has finished.
    pub fn drain(&self) {
        let (ack_tx, ack_rx) = unbounded::<()>();
        let _ = self.sender.send(Box::new(move || {
            let _ = ack_tx.send(());
        }));
        let _ = ack_rx.recv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signaled_gate() -> Arc<StartupGate> {
        let gate = Arc::new(StartupGate::new());
        gate.signal();
        gate
    }

    fn container_with(paths: &[&str]) -> Container {
        Container::memory(
            "fixture",
            paths.iter().map(|p| (p.to_string(), vec![0u8])).collect(),
        )
    }

    #[test]
    fn test_outstanding_forces_bypass() {
        let index = PackageIndex::new();
        index.begin_contribution();
        assert_eq!(index.candidates("a/b/C.class"), IndexLookup::Bypass);
    }

    #[test]
    fn test_top_level_paths_bypass() {
        let index = PackageIndex::new();
        assert_eq!(index.candidates("C.class"), IndexLookup::Bypass);
    }

    #[test]
    fn test_merge_then_hit_on_every_level() {
        let index = PackageIndex::new();
        let container = container_with(&["com/example/deep/Foo.class"]);
        index.begin_contribution();
        index.merge(3, &container);

        assert_eq!(index.outstanding(), 0);
        assert_eq!(
            index.candidates("com/example/deep/Bar.class"),
            IndexLookup::Candidates(vec![3])
        );
        // Ancestor levels are keyed too.
        assert_eq!(
            index.candidates("com/example/Other.class"),
            IndexLookup::Candidates(vec![3])
        );
        assert_eq!(
            index.candidates("com/Anything.class"),
            IndexLookup::Candidates(vec![3])
        );
    }

    #[test]
    fn test_unknown_prefix_is_definitive_miss() {
        let index = PackageIndex::new();
        let container = container_with(&["com/example/Foo.class"]);
        index.begin_contribution();
        index.merge(0, &container);
        assert_eq!(index.candidates("org/other/Foo.class"), IndexLookup::Miss);
    }

    #[test]
    fn test_candidates_keep_classpath_order() {
        let index = PackageIndex::new();
        let first = container_with(&["pkg/A.class"]);
        let second = container_with(&["pkg/B.class"]);
        index.begin_contribution();
        index.merge(0, &first);
        index.begin_contribution();
        index.merge(1, &second);
        assert_eq!(
            index.candidates("pkg/C.class"),
            IndexLookup::Candidates(vec![0, 1])
        );
    }

    #[test]
    fn test_worker_serializes_jobs() {
        let worker = IndexWorker::new(signaled_gate(), Duration::from_secs(1));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            worker.submit(move || order.lock().push(i));
        }
        worker.drain();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_worker_waits_for_gate() {
        let gate = Arc::new(StartupGate::new());
        let worker = IndexWorker::new(gate.clone(), Duration::from_secs(10));
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = ran.clone();
            worker.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        gate.signal();
        worker.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
