//! Read-only containers of addressable entries.
//!
//! This crate provides the artifact layer for the strata loader: a closed
//! [`Container`] abstraction over directory trees, zip archives, and
//! synthetic in-memory bundles, plus manifest parsing and resource path
//! normalization. Containers are immutable and safe to share across
//! threads; only the memoized manifest is populated after construction.

mod archive;
mod container;
mod error;
mod manifest;
mod memory;
pub mod path;

pub use container::{Container, Entry};
pub use error::ArtifactError;
pub use manifest::{Manifest, PackageSealing};
