//! Canonical loader registry.
//!
//! Nodes live in an arena keyed by [`LoaderId`]; the graph edges
//! (parent, delegates) are ids, resolved through the registry at
//! traversal time. Removing a node drops it once outstanding references
//! release; ids pointing at it simply resolve to absent afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use strata_artifact::Container;

use crate::classpath::index::IndexWorker;
use crate::classpath::{ClassPath, ClassPathConfig, LazyClassPath};
use crate::gate::{StartupGate, DEFAULT_STARTUP_WAIT};
use crate::node::{library_setup, Generator, Library, Loader, Redefiner, SearchOrder};

/// Stable handle to a loader node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct LoaderId(u64);

/// Configuration a node is built from. The `key` is the node's canonical
/// identity; two configurations with the same key denote the same node.
pub struct LoaderConfig {
    pub key: String,
    pub order: SearchOrder,
    pub parent: Option<LoaderId>,
    pub delegates: Vec<LoaderId>,
    pub class_path: ClassPathConfig,
    /// Containers added up front.
    pub containers: Vec<Arc<Container>>,
    /// Library content copied in lazily, on the first read.
    pub libraries: Vec<Library>,
    pub generator: Option<Arc<dyn Generator>>,
    pub redefiner: Option<Arc<dyn Redefiner>>,
}

impl LoaderConfig {
    pub fn new(key: impl Into<String>, order: SearchOrder) -> LoaderConfig {
        LoaderConfig {
            key: key.into(),
            order,
            parent: None,
            delegates: Vec::new(),
            class_path: ClassPathConfig::default(),
            containers: Vec::new(),
            libraries: Vec::new(),
            generator: None,
            redefiner: None,
        }
    }
}

/// Arena of loader nodes plus the engine-wide startup gate and the
/// single index-builder worker every classpath shares.
///
/// The parent/delegate edges must form a DAG; the registry does not
/// detect cycles, and a cyclic graph would deadlock on the per-name
/// locks during traversal.
pub struct LoaderRegistry {
    nodes: DashMap<u64, Arc<Loader>>,
    keys: DashMap<String, LoaderId>,
    next_id: AtomicU64,
    gate: Arc<StartupGate>,
    worker: Arc<IndexWorker>,
}

impl LoaderRegistry {
    pub fn new() -> LoaderRegistry {
        LoaderRegistry::with_startup_wait(DEFAULT_STARTUP_WAIT)
    }

    /// Build a registry whose index worker waits at most `startup_wait`
    /// for the gate before building anyway.
    pub fn with_startup_wait(startup_wait: Duration) -> LoaderRegistry {
        let gate = Arc::new(StartupGate::new());
        let worker = Arc::new(IndexWorker::new(gate.clone(), startup_wait));
        LoaderRegistry {
            nodes: DashMap::new(),
            keys: DashMap::new(),
            next_id: AtomicU64::new(0),
            gate,
            worker,
        }
    }

    /// The gate the embedding application signals once started.
    pub fn startup_gate(&self) -> Arc<StartupGate> {
        self.gate.clone()
    }

    /// Create and store a node. A node stored earlier under the same key
    /// is superseded for key lookups but keeps serving existing ids.
    pub fn store(&self, config: LoaderConfig) -> LoaderId {
        let id = LoaderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let key = config.key.clone();
        let node = self.build(id, config);
        self.nodes.insert(id.0, node);
        self.keys.insert(key, id);
        id
    }

    /// Return the node stored under `key`, creating it from `factory` if
    /// absent. Concurrent callers for the same key observe one creation.
    pub fn retrieve_or_create(
        &self,
        key: &str,
        factory: impl FnOnce() -> LoaderConfig,
    ) -> LoaderId {
        match self.keys.entry(key.to_string()) {
            Entry::Occupied(existing) => *existing.get(),
            Entry::Vacant(vacant) => {
                let mut config = factory();
                config.key = key.to_string();
                let id = LoaderId(self.next_id.fetch_add(1, Ordering::SeqCst));
                let node = self.build(id, config);
                self.nodes.insert(id.0, node);
                vacant.insert(id);
                id
            }
        }
    }

    pub fn get(&self, id: LoaderId) -> Option<Arc<Loader>> {
        self.nodes.get(&id.0).map(|n| n.clone())
    }

    pub fn get_by_key(&self, key: &str) -> Option<Arc<Loader>> {
        self.keys.get(key).and_then(|id| self.get(*id))
    }

    /// Drop a node from the arena. Its id resolves to absent from now
    /// on; in-flight resolutions holding the `Arc` finish undisturbed.
    pub fn remove(&self, id: LoaderId) -> Option<Arc<Loader>> {
        let removed = self.nodes.remove(&id.0).map(|(_, node)| node);
        if let Some(node) = &removed {
            self.keys.remove_if(node.key(), |_, mapped| *mapped == id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> Vec<Arc<Loader>> {
        let mut nodes: Vec<Arc<Loader>> = self.nodes.iter().map(|n| n.clone()).collect();
        nodes.sort_by_key(|n| n.id());
        nodes
    }

    fn build(&self, id: LoaderId, config: LoaderConfig) -> Arc<Loader> {
        let class_path = ClassPath::new(&config.class_path, self.worker.clone());
        for container in config.containers {
            class_path.add_container(container);
        }
        let class_path = if config.libraries.is_empty() {
            LazyClassPath::ready(class_path)
        } else {
            LazyClassPath::new(class_path, library_setup(config.libraries))
        };
        Arc::new(Loader::new(
            id,
            config.key,
            config.parent,
            config.delegates,
            config.order,
            class_path,
            config.generator,
            config.redefiner,
        ))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
