//! Hot-update path.
//!
//! When files under a container change on disk, the owning node is asked
//! whether it can absorb the change in place. The answer is a plain
//! boolean: callers fall back to a full restart on `false`, so nothing
//! here ever errors. The node is conservative: a changed class it never
//! defined may carry new structural metadata, which an in-place
//! redefinition cannot apply.

use std::sync::Arc;

use strata_artifact::Container;

use crate::node::{ClassSnapshot, Loader};

/// A batch of changed paths inside one container.
pub struct ChangeNotification {
    pub container: Arc<Container>,
    pub paths: Vec<String>,
}

/// Class name for a changed compiled-unit path.
///
/// Strips the `.class` suffix and a `WEB-INF/classes/` style prefix,
/// then maps separators to dots.
pub fn convert_to_class_name(path: &str) -> String {
    let name = path.strip_suffix(".class").unwrap_or(path);
    let name = name.strip_prefix("WEB-INF/classes/").unwrap_or(name);
    let name = name.replace(['/', '\\'], ".");
    name.trim_start_matches('.').to_string()
}

impl Loader {
    /// Absorb a change notification, returning whether every affected
    /// class this node defined could be redefined in place.
    ///
    /// Trivially succeeds when nothing changed, when the container is not
    /// on this node's classpath, or when no compiled units are among the
    /// changed paths. Fails when a changed unit was never defined here
    /// (restart required), when replacement bytes cannot be read, or when
    /// the redefiner rejects the batch.
    pub fn on_entities_changed(&self, change: &ChangeNotification) -> bool {
        if change.paths.is_empty() {
            return true;
        }
        if !self.class_path().contains_container(&change.container) {
            // Not our container; someone else's problem.
            return true;
        }

        let class_paths: Vec<&String> = change
            .paths
            .iter()
            .filter(|p| p.ends_with(".class"))
            .collect();
        if class_paths.is_empty() {
            return true;
        }

        let Some(redefiner) = &self.redefiner else {
            return false;
        };
        if !redefiner.can_redefine() {
            return false;
        }

        let mut snapshots = Vec::new();
        for path in class_paths {
            let name = convert_to_class_name(path);
            if self.defined_class(&name).is_none() {
                // Never defined here: the change may add structural
                // metadata that only a restart can pick up.
                tracing::debug!(class = %name, loader = %self.key(), "undefined class changed, restart required");
                return false;
            }
            let Some(entry) = change.container.entry(path) else {
                return false;
            };
            match entry.bytes() {
                Ok(bytes) => snapshots.push(ClassSnapshot { name, bytes }),
                Err(err) => {
                    tracing::warn!(class = %name, %err, "failed reading replacement bytes");
                    return false;
                }
            }
        }

        let outcome = redefiner.redefine(&snapshots);
        tracing::debug!(
            loader = %self.key(),
            classes = snapshots.len(),
            outcome,
            "redefinition attempted"
        );
        outcome
    }
}
