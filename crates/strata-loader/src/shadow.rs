//! Shadow loaders.
//!
//! A shadow loader mirrors a live node for introspection: it replays the
//! same search order over the same containers and answers what the node
//! would resolve, without registering anything in the real node. The
//! defined-class cache is consulted but never populated, classpath scans
//! bypass every cache, generated bytes are probed but never defined, and
//! parent/delegate steps are wrapped in their own shadows so the whole
//! graph is mirrored consistently.
//!
//! The one real-node effect a shadow read shares with any first read is
//! the lazy library copy-in; that setup is exactly-once by construction
//! and observing the node means observing its full classpath.

use std::sync::Arc;

use url::Url;

use crate::error::ResolveError;
use crate::node::{class_resource_path, Loader, SearchOrder, SearchStep};
use crate::registry::{LoaderId, LoaderRegistry};

/// What a node would resolve a class name to.
#[derive(Debug)]
pub struct ShadowClass {
    pub name: String,
    pub bytes: Vec<u8>,
    pub url: Option<Url>,
    /// Whether the real node had already defined this class; when true
    /// the bytes are the defined ones, not a fresh scan.
    pub already_defined: bool,
}

/// A side-effect-free mirror of one loader node.
///
/// Constructed from a live node and meant to be discarded after one
/// introspection pass. Owns no containers and no caches.
pub struct ShadowLoader<'a> {
    registry: &'a LoaderRegistry,
    node: Arc<Loader>,
}

impl<'a> ShadowLoader<'a> {
    pub fn of(registry: &'a LoaderRegistry, id: LoaderId) -> Option<ShadowLoader<'a>> {
        registry.get(id).map(|node| ShadowLoader { registry, node })
    }

    /// Identity passthroughs: the shadow is the node for everything but
    /// resolution side effects.
    pub fn id(&self) -> LoaderId {
        self.node.id()
    }

    pub fn key(&self) -> &str {
        self.node.key()
    }

    pub fn search_order(&self) -> SearchOrder {
        self.node.search_order()
    }

    /// Resolve a class name the way the shadowed node would, leaving the
    /// node's defined-class cache and classpath caches untouched.
    pub fn resolve_class(&self, name: &str) -> Result<Option<ShadowClass>, ResolveError> {
        if let Some(defined) = self.node.defined_class(name) {
            return Ok(Some(ShadowClass {
                name: defined.name.clone(),
                bytes: defined.bytes.to_vec(),
                url: defined.url.clone(),
                already_defined: true,
            }));
        }
        for step in self.node.search_order().steps() {
            let outcome = match step {
                SearchStep::Parent => match self.parent_shadow() {
                    Some(parent) => parent.resolve_class(name)?,
                    None => None,
                },
                SearchStep::Local => self.local_class(name)?,
                SearchStep::Delegates => {
                    let mut found = None;
                    for delegate in self.delegate_shadows() {
                        found = delegate.resolve_class(name)?;
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

    /// Resolve a resource path to a URL without touching any cache.
    pub fn resolve_url(&self, name: &str) -> Result<Option<Url>, ResolveError> {
        for step in self.node.search_order().steps() {
            let outcome = match step {
                SearchStep::Parent => match self.parent_shadow() {
                    Some(parent) => parent.resolve_url(name)?,
                    None => None,
                },
                SearchStep::Local => self.node.class_path().scan_url_uncached(name)?,
                SearchStep::Delegates => {
                    let mut found = None;
                    for delegate in self.delegate_shadows() {
                        found = delegate.resolve_url(name)?;
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

    fn local_class(&self, name: &str) -> Result<Option<ShadowClass>, ResolveError> {
        let resource = class_resource_path(name);
        if let Some(found) = self.node.class_path().scan_bytes_uncached(&resource)? {
            return Ok(Some(ShadowClass {
                name: name.to_string(),
                bytes: found.bytes,
                url: found.url,
                already_defined: false,
            }));
        }
        // Probe the generator without defining its output.
        if let Some(bytes) = self.node.probe_generator(name) {
            return Ok(Some(ShadowClass {
                name: name.to_string(),
                bytes,
                url: None,
                already_defined: false,
            }));
        }
        Ok(None)
    }

    fn parent_shadow(&self) -> Option<ShadowLoader<'a>> {
        self.node
            .parent()
            .and_then(|id| ShadowLoader::of(self.registry, id))
    }

    fn delegate_shadows(&self) -> Vec<ShadowLoader<'a>> {
        self.node
            .delegates()
            .iter()
            .filter_map(|id| ShadowLoader::of(self.registry, *id))
            .collect()
    }
}
