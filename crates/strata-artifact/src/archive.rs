//! Zip-archive-backed container source.
//!
//! The archive's central directory is scanned once at open time into an
//! entry table. Lookups and walks are answered from the table; only
//! `read_member` touches the file again, through a shared locked reader.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use url::Url;
use zip::ZipArchive;

use crate::error::ArtifactError;
use crate::path;

#[derive(Debug)]
pub(crate) struct ArchiveSource {
    file: PathBuf,
    /// normalized member path -> (stored name, uncompressed size)
    members: HashMap<String, (String, u64)>,
    /// directory paths, explicit entries plus ancestors of every member
    dirs: BTreeSet<String>,
    reader: Mutex<ZipArchive<BufReader<File>>>,
}

impl ArchiveSource {
    pub(crate) fn open(file: PathBuf) -> Result<ArchiveSource, ArtifactError> {
        let handle = File::open(&file)?;
        let mut archive = ZipArchive::new(BufReader::new(handle))
            .map_err(|e| ArtifactError::archive(&file, e))?;

        let mut members = HashMap::new();
        let mut dirs = BTreeSet::new();
        for i in 0..archive.len() {
            let member = archive
                .by_index_raw(i)
                .map_err(|e| ArtifactError::archive(&file, e))?;
            let stored = member.name().to_string();
            let normalized = path::normalize(&stored);
            if normalized.is_empty() || path::is_escaping(&normalized) {
                continue;
            }
            if member.is_dir() {
                dirs.insert(normalized);
            } else {
                let size = member.size();
                members.insert(normalized.clone(), (stored, size));
                // Archives are not required to carry explicit directory
                // entries, so synthesize the ancestor chain.
                let mut prefix = normalized.as_str();
                while let Some(parent) = path::parent_prefix(prefix) {
                    dirs.insert(parent.to_string());
                    prefix = parent;
                }
            }
        }

        Ok(ArchiveSource {
            file,
            members,
            dirs,
            reader: Mutex::new(archive),
        })
    }

    pub(crate) fn file(&self) -> &Path {
        &self.file
    }

    pub(crate) fn member_size(&self, normalized: &str) -> Option<u64> {
        self.members.get(normalized).map(|(_, size)| *size)
    }

    pub(crate) fn has_dir(&self, normalized: &str) -> bool {
        self.dirs.contains(normalized)
    }

    pub(crate) fn walk(&self) -> Vec<String> {
        let mut out: Vec<String> = self.members.keys().cloned().collect();
        out.sort();
        out
    }

    /// Read one member fully, preallocating from the known size.
    pub(crate) fn read_member(&self, normalized: &str) -> Result<Vec<u8>, ArtifactError> {
        let (stored, size) = self
            .members
            .get(normalized)
            .ok_or_else(|| ArtifactError::archive(&self.file, "member vanished from table"))?;
        let mut archive = self.reader.lock();
        let mut member = archive
            .by_name(stored)
            .map_err(|e| ArtifactError::archive(&self.file, e))?;
        let mut bytes = Vec::with_capacity(*size as usize);
        member.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub(crate) fn base_url(&self) -> Option<Url> {
        let file_url = Url::from_file_path(&self.file).ok()?;
        Url::parse(&format!("jar:{}!/", file_url)).ok()
    }

    pub(crate) fn member_url(&self, normalized: &str) -> Option<Url> {
        let file_url = Url::from_file_path(&self.file).ok()?;
        Url::parse(&format!("jar:{}!/{}", file_url, normalized)).ok()
    }
}

#[cfg(test)]
mod tests {
    use crate::container::Container;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_fixture_archive(dir: &TempDir) -> std::path::PathBuf {
        let archive_path = dir.path().join("fixture.jar");
        let file = std::fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts = SimpleFileOptions::default();
        writer.start_file("com/example/Foo.class", opts).unwrap();
        writer.write_all(&[0x01, 0x02]).unwrap();
        writer.start_file("META-INF/MANIFEST.MF", opts).unwrap();
        writer.write_all(b"Implementation-Title: fixture\n").unwrap();
        writer.finish().unwrap();
        archive_path
    }

    #[test]
    fn test_archive_member_lookup() {
        let tmp = TempDir::new().unwrap();
        let archive = write_fixture_archive(&tmp);
        let c = Container::open_archive(&archive).unwrap();

        let entry = c.entry("com/example/Foo.class").unwrap();
        assert_eq!(entry.size(), Some(2));
        assert_eq!(entry.bytes().unwrap(), vec![0x01, 0x02]);

        let url = entry.url().unwrap();
        assert_eq!(url.scheme(), "jar");
        assert!(url.as_str().ends_with("!/com/example/Foo.class"));
    }

    #[test]
    fn test_archive_synthesized_dirs() {
        let tmp = TempDir::new().unwrap();
        let archive = write_fixture_archive(&tmp);
        let c = Container::open_archive(&archive).unwrap();

        // No explicit directory entries were written; ancestors still
        // resolve as container-shaped entries.
        assert!(c.entry("com/example").unwrap().is_container());
        assert!(c.entry("com").unwrap().is_container());
        assert!(c.entry("org").is_none());
    }

    #[test]
    fn test_archive_walk_and_manifest() {
        let tmp = TempDir::new().unwrap();
        let archive = write_fixture_archive(&tmp);
        let c = Container::open_archive(&archive).unwrap();

        assert_eq!(
            c.walk(),
            vec!["META-INF/MANIFEST.MF", "com/example/Foo.class"]
        );
        let manifest = c.manifest().unwrap();
        assert_eq!(manifest.main_attribute("Implementation-Title"), Some("fixture"));
    }

    #[test]
    fn test_archive_open_garbage() {
        let tmp = TempDir::new().unwrap();
        let bogus = tmp.path().join("bogus.jar");
        std::fs::write(&bogus, b"not a zip at all").unwrap();
        assert!(Container::open_archive(&bogus).is_err());
    }
}
