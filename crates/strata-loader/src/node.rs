//! Loader nodes.
//!
//! A loader node answers "give me the class/resource for this name" by
//! consulting, in its configured order, its parent node, its own layered
//! classpath, and its delegate nodes. The node itself keeps no search
//! state; the order is a fixed permutation walked per request, under the
//! per-name lock so concurrent first requests for one name collapse into
//! a single defining pass.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use strata_artifact::{Container, PackageSealing};
use url::Url;

use crate::classpath::{FoundResource, LazyClassPath};
use crate::error::ResolveError;
use crate::locks::NameLocks;
use crate::registry::{LoaderId, LoaderRegistry};

/// The two delegation orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SearchOrder {
    /// PARENT, SELF, DELEGATES. The conventional order: anything the
    /// parent can provide wins.
    ParentFirst,
    /// SELF, DELEGATES, PARENT. Local content shadows the parent.
    ParentLast,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum SearchStep {
    Parent,
    Local,
    Delegates,
}

impl SearchOrder {
    pub(crate) fn steps(self) -> [SearchStep; 3] {
        match self {
            SearchOrder::ParentFirst => {
                [SearchStep::Parent, SearchStep::Local, SearchStep::Delegates]
            }
            SearchOrder::ParentLast => {
                [SearchStep::Local, SearchStep::Delegates, SearchStep::Parent]
            }
        }
    }
}

/// Synthesizes bytes for names the classpath cannot provide, the seam
/// for proxy- and stub-style generated classes.
///
/// Called while the requesting node holds the lock for `name`; an
/// implementation must not resolve the same name through the same node,
/// which would self-deadlock.
pub trait Generator: Send + Sync {
    fn generate(&self, name: &str) -> Option<Vec<u8>>;
}

/// External in-place redefinition collaborator for the hot-update path.
pub trait Redefiner: Send + Sync {
    fn can_redefine(&self) -> bool;
    fn redefine(&self, changes: &[ClassSnapshot]) -> bool;
}

/// One class's replacement bytes handed to a [`Redefiner`].
pub struct ClassSnapshot {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A class this node has defined. Resolution of the same name on the
/// same node always returns the same `Arc`.
#[derive(Debug)]
pub struct DefinedClass {
    pub name: String,
    pub bytes: Arc<[u8]>,
    pub url: Option<Url>,
    /// Package metadata from the defining container's manifest.
    pub sealing: Option<PackageSealing>,
    /// Whether the bytes came from the generator fallback.
    pub generated: bool,
}

/// Library content copied into the classpath by the lazy-init setup.
pub enum Library {
    /// A directory or archive on disk; sniffed at copy-in time. Missing
    /// or unopenable paths log a warning and are skipped.
    Path(PathBuf),
    /// A prebuilt container.
    Container(Arc<Container>),
}

/// One node in the loader graph.
///
/// Parent and delegates are held as registry ids, never as owning
/// references, so arbitrarily deep graphs cannot form ownership cycles.
pub struct Loader {
    id: LoaderId,
    key: String,
    parent: Option<LoaderId>,
    delegates: Vec<LoaderId>,
    order: SearchOrder,
    class_path: LazyClassPath,
    defined: RwLock<FxHashMap<String, Arc<DefinedClass>>>,
    locks: NameLocks,
    generator: Option<Arc<dyn Generator>>,
    pub(crate) redefiner: Option<Arc<dyn Redefiner>>,
}

/// Resource path for a dot-separated class name: `a.b.C` to `a/b/C.class`.
pub fn class_resource_path(name: &str) -> String {
    format!("{}.class", name.replace('.', "/"))
}

/// Resource-style package prefix of a class name: `a.b.C` to `a/b`.
pub fn package_resource_prefix(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(pkg, _)| pkg.replace('.', "/"))
        .filter(|p| !p.is_empty())
}

impl Loader {
    pub(crate) fn new(
        id: LoaderId,
        key: String,
        parent: Option<LoaderId>,
        delegates: Vec<LoaderId>,
        order: SearchOrder,
        class_path: LazyClassPath,
        generator: Option<Arc<dyn Generator>>,
        redefiner: Option<Arc<dyn Redefiner>>,
    ) -> Loader {
        Loader {
            id,
            key,
            parent,
            delegates,
            order,
            class_path,
            defined: RwLock::new(FxHashMap::default()),
            locks: NameLocks::new(),
            generator,
            redefiner,
        }
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn search_order(&self) -> SearchOrder {
        self.order
    }

    pub fn parent(&self) -> Option<LoaderId> {
        self.parent
    }

    pub fn delegates(&self) -> &[LoaderId] {
        &self.delegates
    }

    pub(crate) fn class_path(&self) -> &LazyClassPath {
        &self.class_path
    }

    /// Ordered containers on this node's classpath.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.class_path.containers()
    }

    pub fn class_path_stats(&self) -> crate::classpath::ClassPathStats {
        self.class_path.stats()
    }

    pub fn outstanding_index_builds(&self) -> usize {
        self.class_path.outstanding_builds()
    }

    /// Block until this node's queued index contributions have merged.
    pub fn await_index(&self) {
        self.class_path.await_index()
    }

    /// Append a container to this node's classpath.
    pub fn add_container(&self, container: Arc<Container>) {
        self.class_path.add_container(container);
    }

    /// The class this node has already defined under `name`, if any.
    pub fn defined_class(&self, name: &str) -> Option<Arc<DefinedClass>> {
        self.defined.read().get(name).cloned()
    }

    /// Resolve and define the class `name` (dot-separated).
    ///
    /// Walks the configured search order; each step's failure falls
    /// through to the next, and only after the last step is the name
    /// absent. Runs under the name's lock: concurrent requests for the
    /// same name on this node serialize, distinct names run in parallel.
    pub fn load_class(
        &self,
        registry: &LoaderRegistry,
        name: &str,
    ) -> Result<Option<Arc<DefinedClass>>, ResolveError> {
        if let Some(defined) = self.defined_class(name) {
            return Ok(Some(defined));
        }
        let _guard = self.locks.lock(name);
        // Another thread may have defined it while we waited.
        if let Some(defined) = self.defined_class(name) {
            return Ok(Some(defined));
        }
        for step in self.order.steps() {
            let outcome = match step {
                SearchStep::Parent => self.parent_load(registry, name)?,
                SearchStep::Local => self.local_load(name)?,
                SearchStep::Delegates => self.delegate_load(registry, name)?,
            };
            if let Some(defined) = outcome {
                return Ok(Some(defined));
            }
        }
        Ok(None)
    }

    /// Resolve a resource path to its first URL in search order.
    pub fn resolve_url(
        &self,
        registry: &LoaderRegistry,
        name: &str,
    ) -> Result<Option<Url>, ResolveError> {
        for step in self.order.steps() {
            let outcome = match step {
                SearchStep::Parent => match self.parent_node(registry) {
                    Some(parent) => parent.resolve_url(registry, name)?,
                    None => None,
                },
                SearchStep::Local => self.class_path.resolve_url(name)?,
                SearchStep::Delegates => {
                    let mut found = None;
                    for delegate in self.delegate_nodes(registry) {
                        found = delegate.resolve_url(registry, name)?;
                        if found.is_some() {
                            break;
                        }
                    }
                    found
                }
            };
            if outcome.is_some() {
                return Ok(outcome);
            }
        }
        Ok(None)
    }

    /// Resolve every URL for a resource path across the whole graph,
    /// ordered by the configured search order.
    pub fn resolve_all_urls(
        &self,
        registry: &LoaderRegistry,
        name: &str,
    ) -> Result<Vec<Url>, ResolveError> {
        let mut urls = Vec::new();
        for step in self.order.steps() {
            match step {
                SearchStep::Parent => {
                    if let Some(parent) = self.parent_node(registry) {
                        urls.extend(parent.resolve_all_urls(registry, name)?);
                    }
                }
                SearchStep::Local => {
                    urls.extend(self.class_path.resolve_all_urls(name)?);
                }
                SearchStep::Delegates => {
                    for delegate in self.delegate_nodes(registry) {
                        urls.extend(delegate.resolve_all_urls(registry, name)?);
                    }
                }
            }
        }
        Ok(urls)
    }

    fn parent_node(&self, registry: &LoaderRegistry) -> Option<Arc<Loader>> {
        self.parent.and_then(|id| registry.get(id))
    }

    fn delegate_nodes(&self, registry: &LoaderRegistry) -> Vec<Arc<Loader>> {
        self.delegates
            .iter()
            .filter_map(|id| registry.get(*id))
            .collect()
    }

    fn parent_load(
        &self,
        registry: &LoaderRegistry,
        name: &str,
    ) -> Result<Option<Arc<DefinedClass>>, ResolveError> {
        match self.parent_node(registry) {
            Some(parent) => parent.load_class(registry, name),
            None => Ok(None),
        }
    }

    fn local_load(&self, name: &str) -> Result<Option<Arc<DefinedClass>>, ResolveError> {
        let resource = class_resource_path(name);
        if let Some(found) = self.class_path.resolve_bytes(&resource)? {
            return Ok(Some(self.define(name, found)));
        }
        if let Some(generator) = &self.generator {
            tracing::debug!(name, loader = %self.key, "classpath miss, consulting generator");
            if let Some(bytes) = generator.generate(name) {
                return Ok(Some(self.define_generated(name, bytes)));
            }
        }
        Ok(None)
    }

    fn delegate_load(
        &self,
        registry: &LoaderRegistry,
        name: &str,
    ) -> Result<Option<Arc<DefinedClass>>, ResolveError> {
        for delegate in self.delegate_nodes(registry) {
            if let Some(defined) = delegate.load_class(registry, name)? {
                return Ok(Some(defined));
            }
        }
        Ok(None)
    }

    fn define(&self, name: &str, found: FoundResource) -> Arc<DefinedClass> {
        let sealing = package_resource_prefix(name).and_then(|pkg| {
            self.class_path
                .container_at(found.container_position)
                .and_then(|container| container.manifest().map(|m| m.package_sealing(&pkg)))
        });
        let defined = Arc::new(DefinedClass {
            name: name.to_string(),
            bytes: found.bytes.into(),
            url: found.url,
            sealing,
            generated: false,
        });
        self.defined
            .write()
            .insert(name.to_string(), defined.clone());
        defined
    }

    fn define_generated(&self, name: &str, bytes: Vec<u8>) -> Arc<DefinedClass> {
        let defined = Arc::new(DefinedClass {
            name: name.to_string(),
            bytes: bytes.into(),
            url: None,
            sealing: None,
            generated: true,
        });
        self.defined
            .write()
            .insert(name.to_string(), defined.clone());
        defined
    }

    pub fn defined_count(&self) -> usize {
        self.defined.read().len()
    }

    /// Generator probe for the shadow path: synthesizes bytes without
    /// defining them.
    pub(crate) fn probe_generator(&self, name: &str) -> Option<Vec<u8>> {
        self.generator.as_ref().and_then(|g| g.generate(name))
    }
}

/// Build the lazy-init setup that copies declared libraries in.
pub(crate) fn library_setup(libraries: Vec<Library>) -> Box<dyn FnOnce(&crate::classpath::ClassPath) + Send> {
    Box::new(move |class_path| {
        for library in libraries {
            match library {
                Library::Container(container) => class_path.add_container(container),
                Library::Path(path) => {
                    if !path.exists() {
                        tracing::warn!(path = %path.display(), "library path missing, skipped");
                        continue;
                    }
                    let opened = if path.is_dir() {
                        Container::open_dir(&path)
                    } else {
                        Container::open_archive(&path)
                    };
                    match opened {
                        Ok(container) => class_path.add_container(Arc::new(container)),
                        Err(err) => {
                            tracing::warn!(path = %path.display(), %err, "unreadable library, skipped");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_resource_path() {
        assert_eq!(class_resource_path("com.example.Foo"), "com/example/Foo.class");
        assert_eq!(class_resource_path("TopLevel"), "TopLevel.class");
    }

    #[test]
    fn test_package_resource_prefix() {
        assert_eq!(
            package_resource_prefix("com.example.Foo").as_deref(),
            Some("com/example")
        );
        assert_eq!(package_resource_prefix("TopLevel"), None);
    }

    #[test]
    fn test_search_order_steps() {
        assert!(matches!(
            SearchOrder::ParentFirst.steps(),
            [SearchStep::Parent, SearchStep::Local, SearchStep::Delegates]
        ));
        assert!(matches!(
            SearchOrder::ParentLast.steps(),
            [SearchStep::Local, SearchStep::Delegates, SearchStep::Parent]
        ));
    }
}
