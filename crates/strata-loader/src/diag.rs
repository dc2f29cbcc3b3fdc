//! Diagnostics dump.
//!
//! A serializable snapshot of the whole loader graph: per node, the
//! ordered classpath, cache occupancy, and the outstanding index build
//! count. Cheap enough to collect from a live engine.

use serde::Serialize;

use crate::classpath::ClassPathStats;
use crate::node::SearchOrder;
use crate::registry::{LoaderId, LoaderRegistry};

#[derive(Debug, Serialize)]
pub struct DiagnosticDump {
    pub loaders: Vec<LoaderDiagnostics>,
}

#[derive(Debug, Serialize)]
pub struct LoaderDiagnostics {
    pub id: LoaderId,
    pub key: String,
    pub search_order: SearchOrder,
    pub parent: Option<LoaderId>,
    pub delegates: Vec<LoaderId>,
    /// Container identities, classpath order.
    pub class_path: Vec<String>,
    /// Container base URLs, classpath order; `None` for URL-less
    /// containers.
    pub class_path_urls: Vec<Option<String>>,
    pub defined_classes: usize,
    pub cache: ClassPathStats,
}

impl DiagnosticDump {
    /// Snapshot every node in the registry, id order.
    pub fn collect(registry: &LoaderRegistry) -> DiagnosticDump {
        let loaders = registry
            .nodes()
            .iter()
            .map(|node| {
                let containers = node.class_path().containers();
                LoaderDiagnostics {
                    id: node.id(),
                    key: node.key().to_string(),
                    search_order: node.search_order(),
                    parent: node.parent(),
                    delegates: node.delegates().to_vec(),
                    class_path: containers.iter().map(|c| c.path().to_string()).collect(),
                    class_path_urls: containers
                        .iter()
                        .map(|c| c.base_url().map(|u| u.to_string()))
                        .collect(),
                    defined_classes: node.defined_count(),
                    cache: node.class_path().stats(),
                }
            })
            .collect();
        DiagnosticDump { loaders }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("dump is always serializable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::SearchOrder;
    use crate::registry::LoaderConfig;
    use std::sync::Arc;
    use strata_artifact::Container;

    #[test]
    fn test_dump_shape() {
        let registry = LoaderRegistry::new();
        registry.startup_gate().signal();

        let mut config = LoaderConfig::new("app", SearchOrder::ParentLast);
        config.containers.push(Arc::new(Container::memory(
            "fixture",
            vec![("pkg/A.class".to_string(), vec![1])],
        )));
        let id = registry.store(config);

        let dump = DiagnosticDump::collect(&registry);
        assert_eq!(dump.loaders.len(), 1);
        let loader = &dump.loaders[0];
        assert_eq!(loader.id, id);
        assert_eq!(loader.class_path, vec!["fixture"]);
        assert_eq!(loader.cache.containers, 1);

        let json = dump.to_json();
        assert_eq!(json["loaders"][0]["key"], "app");
        assert!(json["loaders"][0]["cache"]["outstanding_index_builds"].is_number());
    }
}
