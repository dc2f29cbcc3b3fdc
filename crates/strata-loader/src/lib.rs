//! Layered class and resource resolution engine.
//!
//! Loader nodes answer "give me the bytes/URL for this name" by walking a
//! configured parent/self/delegates order. A node's own content is an
//! ordered list of containers searched through a caching layer and, once
//! the background builder catches up, pruned by a package index keyed on
//! hashed directory prefixes. Resolution is concurrency-safe throughout:
//! identical names serialize per node, distinct names run fully in
//! parallel, and containers can be appended while lookups are in flight.

mod cache;
mod classpath;
mod diag;
mod error;
mod gate;
mod locks;
mod node;
mod redefine;
mod registry;
mod shadow;

pub use cache::{BoundedCache, EvictionPolicy, FifoPolicy, LruPolicy};
pub use classpath::index::{IndexLookup, IndexWorker, PackageIndex};
pub use classpath::{ClassPath, ClassPathConfig, ClassPathStats, FoundResource, LazyClassPath};
pub use diag::{DiagnosticDump, LoaderDiagnostics};
pub use error::ResolveError;
pub use gate::{StartupGate, DEFAULT_STARTUP_WAIT};
pub use locks::{NameGuard, NameLocks};
pub use node::{
    class_resource_path, package_resource_prefix, ClassSnapshot, DefinedClass, Generator, Library,
    Loader, Redefiner, SearchOrder,
};
pub use redefine::{convert_to_class_name, ChangeNotification};
pub use registry::{LoaderConfig, LoaderId, LoaderRegistry};
pub use shadow::{ShadowClass, ShadowLoader};
