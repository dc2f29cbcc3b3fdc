//! Container manifest parsing.
//!
//! A manifest is a block of `Key: Value` headers at `META-INF/MANIFEST.MF`.
//! The first blank-line-delimited block holds the main attributes; later
//! blocks are named sections keyed by their `Name` header, which override
//! the main attributes for the package they name. Long values continue on
//! lines starting with a single space.

use std::collections::BTreeMap;

use crate::error::ArtifactError;

const SPEC_TITLE: &str = "Specification-Title";
const SPEC_VERSION: &str = "Specification-Version";
const SPEC_VENDOR: &str = "Specification-Vendor";
const IMPL_TITLE: &str = "Implementation-Title";
const IMPL_VERSION: &str = "Implementation-Version";
const IMPL_VENDOR: &str = "Implementation-Vendor";
const SEALED: &str = "Sealed";

/// A parsed manifest: main attributes plus named per-package sections.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    main: BTreeMap<String, String>,
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// Package metadata assembled from a manifest for one package.
///
/// Section attributes override main attributes field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSealing {
    pub spec_title: Option<String>,
    pub spec_version: Option<String>,
    pub spec_vendor: Option<String>,
    pub impl_title: Option<String>,
    pub impl_version: Option<String>,
    pub impl_vendor: Option<String>,
    pub sealed: bool,
}

impl Manifest {
    /// Parse manifest bytes.
    ///
    /// Returns an error only for non-UTF-8 content or a malformed header
    /// line; unknown keys are kept verbatim.
    pub fn parse(bytes: &[u8]) -> Result<Manifest, ArtifactError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ArtifactError::Manifest(format!("not valid UTF-8: {}", e)))?;

        let mut manifest = Manifest::default();
        let mut current: BTreeMap<String, String> = BTreeMap::new();
        let mut in_main = true;
        let mut last_key: Option<String> = None;

        for raw in text.lines() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                manifest.finish_block(&mut current, &mut in_main);
                last_key = None;
                continue;
            }
            if let Some(cont) = line.strip_prefix(' ') {
                // Continuation of the previous value.
                match &last_key {
                    Some(key) => {
                        if let Some(value) = current.get_mut(key) {
                            value.push_str(cont);
                        }
                    }
                    None => {
                        return Err(ArtifactError::Manifest(format!(
                            "continuation line with no preceding header: {:?}",
                            line
                        )))
                    }
                }
                continue;
            }
            match line.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim().to_string();
                    current.insert(key.clone(), value.trim_start().to_string());
                    last_key = Some(key);
                }
                None => {
                    return Err(ArtifactError::Manifest(format!(
                        "malformed header line: {:?}",
                        line
                    )))
                }
            }
        }
        manifest.finish_block(&mut current, &mut in_main);
        Ok(manifest)
    }

    fn finish_block(&mut self, block: &mut BTreeMap<String, String>, in_main: &mut bool) {
        if block.is_empty() {
            return;
        }
        let attrs = std::mem::take(block);
        if *in_main {
            self.main = attrs;
            *in_main = false;
        } else if let Some(name) = attrs.get("Name").cloned() {
            self.sections.insert(name, attrs);
        }
        // Nameless trailing sections are dropped.
    }

    /// Look up a main attribute.
    pub fn main_attribute(&self, key: &str) -> Option<&str> {
        self.main.get(key).map(String::as_str)
    }

    /// Look up an attribute in the section named `name`.
    pub fn section_attribute(&self, name: &str, key: &str) -> Option<&str> {
        self.sections.get(name).and_then(|s| s.get(key)).map(String::as_str)
    }

    /// Assemble sealing metadata for a package.
    ///
    /// `package_path` is resource style (`a/b`); the matching section name
    /// carries a trailing slash (`a/b/`).
    pub fn package_sealing(&self, package_path: &str) -> PackageSealing {
        let section_name = format!("{}/", package_path.trim_end_matches('/'));
        let get = |key: &str| -> Option<String> {
            self.section_attribute(&section_name, key)
                .or_else(|| self.main_attribute(key))
                .map(str::to_string)
        };
        PackageSealing {
            spec_title: get(SPEC_TITLE),
            spec_version: get(SPEC_VERSION),
            spec_vendor: get(SPEC_VENDOR),
            impl_title: get(IMPL_TITLE),
            impl_version: get(IMPL_VERSION),
            impl_vendor: get(IMPL_VENDOR),
            sealed: get(SEALED).is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }
}
