//! The container abstraction.
//!
//! A [`Container`] is a named, read-only, hierarchical collection of entries:
//! a directory tree, an archive, or a synthetic in-memory bundle. The three
//! backends are a closed set; callers match on nothing and go through the
//! common lookup/walk/manifest surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use url::Url;

use crate::archive::ArchiveSource;
use crate::error::ArtifactError;
use crate::manifest::Manifest;
use crate::memory::MemorySource;
use crate::path;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// A read-only collection of entries addressable by `/`-separated paths.
///
/// Identity is the opaque `path()` string. Containers are immutable after
/// construction except for the lazily loaded, memoized manifest.
#[derive(Debug)]
pub struct Container {
    source: Source,
    path: String,
    is_root: bool,
    /// Memoized manifest; the outer cell distinguishes "never looked" from
    /// the inner `None` sentinel meaning "looked, no manifest".
    manifest: OnceCell<Option<Manifest>>,
}

#[derive(Debug)]
enum Source {
    Dir { root: PathBuf },
    Archive(ArchiveSource),
    Memory(MemorySource),
}

/// A single addressable item inside a container.
#[derive(Debug)]
pub struct Entry<'a> {
    container: &'a Container,
    path: String,
    detail: EntryDetail,
}

#[derive(Debug)]
enum EntryDetail {
    /// A loose file on disk.
    File { file: PathBuf, size: u64 },
    /// A directory on disk, or a directory-shaped archive/memory prefix.
    Directory,
    /// An archive member.
    Member { size: u64 },
    /// An in-memory blob.
    Blob { bytes: Arc<[u8]> },
    /// The container itself, addressed as `""` or `"/"`.
    SelfRef,
}

impl Container {
    /// Open a directory-backed container rooted at `root`.
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Container, ArtifactError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ArtifactError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            )));
        }
        let path = root.display().to_string();
        Ok(Container {
            source: Source::Dir { root },
            path,
            is_root: true,
            manifest: OnceCell::new(),
        })
    }

    /// Open an archive-backed container.
    ///
    /// The central directory is read once here; later lookups and walks are
    /// served from the in-memory entry table.
    pub fn open_archive(file: impl Into<PathBuf>) -> Result<Container, ArtifactError> {
        let file = file.into();
        let path = file.display().to_string();
        let source = ArchiveSource::open(file)?;
        Ok(Container {
            source: Source::Archive(source),
            path,
            is_root: true,
            manifest: OnceCell::new(),
        })
    }

    /// Build a synthetic container from `(path, bytes)` pairs.
    pub fn memory(name: impl Into<String>, entries: Vec<(String, Vec<u8>)>) -> Container {
        let name = name.into();
        Container {
            source: Source::Memory(MemorySource::new(entries)),
            path: name,
            is_root: true,
            manifest: OnceCell::new(),
        }
    }

    /// Mark this container as a nested (non-root) view.
    ///
    /// Non-root containers apply path escape checks: a request whose
    /// normalized path climbs above the container root is absent, not an
    /// escape into the enclosing structure.
    pub fn into_non_root(mut self) -> Container {
        self.is_root = false;
        self
    }

    /// Opaque identity string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether path escape checks are skipped for this container.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Physical filesystem location, when the container has one.
    pub fn physical_path(&self) -> Option<&Path> {
        match &self.source {
            Source::Dir { root } => Some(root),
            Source::Archive(src) => Some(src.file()),
            Source::Memory(_) => None,
        }
    }

    /// Base URL for the container itself.
    pub fn base_url(&self) -> Option<Url> {
        match &self.source {
            Source::Dir { root } => Url::from_directory_path(root).ok(),
            Source::Archive(src) => src.base_url(),
            Source::Memory(_) => Url::parse(&format!("mem:{}!/", self.path)).ok(),
        }
    }

    /// Look up an entry by path.
    ///
    /// Returns `None` for absent paths and for paths that escape a
    /// non-root container. The empty path and `"/"` address the container
    /// itself, which has a URL but no bytes.
    pub fn entry(&self, request: &str) -> Option<Entry<'_>> {
        let normalized = path::normalize(request);
        // A climbing path is absent either way: nothing sits above a
        // root, and a non-root view must not escape into the enclosing
        // structure it was carved from.
        if path::is_escaping(&normalized) {
            return None;
        }
        if normalized.is_empty() {
            return Some(Entry {
                container: self,
                path: normalized,
                detail: EntryDetail::SelfRef,
            });
        }
        let detail = match &self.source {
            Source::Dir { root } => {
                let candidate = root.join(&normalized);
                let meta = std::fs::metadata(&candidate).ok()?;
                if meta.is_dir() {
                    EntryDetail::Directory
                } else {
                    EntryDetail::File {
                        file: candidate,
                        size: meta.len(),
                    }
                }
            }
            Source::Archive(src) => {
                if let Some(size) = src.member_size(&normalized) {
                    EntryDetail::Member { size }
                } else if src.has_dir(&normalized) {
                    EntryDetail::Directory
                } else {
                    return None;
                }
            }
            Source::Memory(src) => {
                if let Some(bytes) = src.get(&normalized) {
                    EntryDetail::Blob { bytes }
                } else if src.has_dir(&normalized) {
                    EntryDetail::Directory
                } else {
                    return None;
                }
            }
        };
        Some(Entry {
            container: self,
            path: normalized,
            detail,
        })
    }

    /// Enumerate every file entry path in the container, relative to its
    /// root, in a stable order.
    pub fn walk(&self) -> Vec<String> {
        match &self.source {
            Source::Dir { root } => {
                let mut out = Vec::new();
                walk_dir(root, root, &mut out);
                out.sort();
                out
            }
            Source::Archive(src) => src.walk(),
            Source::Memory(src) => src.walk(),
        }
    }

    /// The container manifest, if one exists.
    ///
    /// Loaded on first access and memoized, including the absent case.
    /// A present-but-unparseable manifest is treated as absent; that only
    /// costs package metadata, not resolution.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest
            .get_or_init(|| {
                let entry = self.entry(MANIFEST_PATH)?;
                let bytes = match entry.bytes() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::debug!(container = %self.path, %err, "failed reading manifest");
                        return None;
                    }
                };
                match Manifest::parse(&bytes) {
                    Ok(manifest) => Some(manifest),
                    Err(err) => {
                        tracing::debug!(container = %self.path, %err, "unparseable manifest");
                        None
                    }
                }
            })
            .as_ref()
    }
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for dent in read.flatten() {
        let p = dent.path();
        if p.is_dir() {
            walk_dir(root, &p, out);
        } else if let Ok(rel) = p.strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
}

impl Entry<'_> {
    /// Normalized path of this entry within its container.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this entry is a directory or the container itself, rather
    /// than a byte-bearing resource.
    pub fn is_container(&self) -> bool {
        matches!(self.detail, EntryDetail::Directory | EntryDetail::SelfRef)
    }

    /// Entry size in bytes, when known without reading.
    pub fn size(&self) -> Option<u64> {
        match &self.detail {
            EntryDetail::File { size, .. } => Some(*size),
            EntryDetail::Member { size } => Some(*size),
            EntryDetail::Blob { bytes } => Some(bytes.len() as u64),
            EntryDetail::Directory | EntryDetail::SelfRef => None,
        }
    }

    /// Read the full entry contents.
    ///
    /// When the size is known up front the buffer is allocated exactly
    /// once. Failures propagate: a readable container failing mid-read is
    /// a contract violation, not a missing resource.
    pub fn bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        match &self.detail {
            EntryDetail::File { file, .. } => Ok(std::fs::read(file)?),
            EntryDetail::Member { .. } => match &self.container.source {
                Source::Archive(src) => src.read_member(&self.path),
                _ => unreachable!("member entry outside an archive container"),
            },
            EntryDetail::Blob { bytes } => Ok(bytes.to_vec()),
            EntryDetail::Directory | EntryDetail::SelfRef => Err(ArtifactError::Io(
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "container-shaped entry has no bytes",
                ),
            )),
        }
    }

    /// URL for this entry, when one can be formed.
    pub fn url(&self) -> Option<Url> {
        match &self.detail {
            EntryDetail::File { file, .. } => Url::from_file_path(file).ok(),
            EntryDetail::Directory => match &self.container.source {
                Source::Dir { root } => Url::from_directory_path(root.join(&self.path)).ok(),
                Source::Archive(src) => src.member_url(&self.path),
                Source::Memory(_) => {
                    Url::parse(&format!("mem:{}!/{}", self.container.path, self.path)).ok()
                }
            },
            EntryDetail::Member { .. } => match &self.container.source {
                Source::Archive(src) => src.member_url(&self.path),
                _ => None,
            },
            EntryDetail::Blob { .. } => {
                Url::parse(&format!("mem:{}!/{}", self.container.path, self.path)).ok()
            }
            EntryDetail::SelfRef => self.container.base_url(),
        }
    }
}
