//! Hot-update path: which changes a node can absorb in place.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_artifact::Container;
use strata_loader::{
    ChangeNotification, ClassSnapshot, LoaderConfig, LoaderRegistry, Redefiner, SearchOrder,
};

fn registry() -> LoaderRegistry {
    let registry = LoaderRegistry::new();
    registry.startup_gate().signal();
    registry
}

fn memory(name: &str, entries: &[(&str, &[u8])]) -> Arc<Container> {
    Arc::new(Container::memory(
        name,
        entries
            .iter()
            .map(|(p, b)| (p.to_string(), b.to_vec()))
            .collect(),
    ))
}

struct StubRedefiner {
    able: bool,
    accept: bool,
    calls: AtomicUsize,
}

impl StubRedefiner {
    fn new(able: bool, accept: bool) -> Arc<StubRedefiner> {
        Arc::new(StubRedefiner {
            able,
            accept,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Redefiner for StubRedefiner {
    fn can_redefine(&self) -> bool {
        self.able
    }

    fn redefine(&self, changes: &[ClassSnapshot]) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!changes.is_empty());
        self.accept
    }
}

fn node_with(
    registry: &LoaderRegistry,
    container: Arc<Container>,
    redefiner: Option<Arc<StubRedefiner>>,
) -> Arc<strata_loader::Loader> {
    let mut config = LoaderConfig::new("app", SearchOrder::ParentLast);
    config.containers.push(container);
    if let Some(r) = redefiner {
        config.redefiner = Some(r);
    }
    let id = registry.store(config);
    registry.get(id).unwrap()
}

#[test]
fn test_empty_change_set_succeeds() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let node = node_with(&registry, container.clone(), None);

    assert!(node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec![],
    }));
}

#[test]
fn test_foreign_container_succeeds() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let node = node_with(&registry, container, None);

    let foreign = memory("other", &[("pkg/Foo.class", &[9])]);
    assert!(node.on_entities_changed(&ChangeNotification {
        container: foreign,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
}

#[test]
fn test_non_class_changes_succeed() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1]), ("conf/app.xml", b"<x/>")]);
    let redefiner = StubRedefiner::new(true, true);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    assert!(node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["conf/app.xml".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unresolved_class_requires_restart() {
    // Scenario: a changed class the node never resolved returns false.
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let redefiner = StubRedefiner::new(true, true);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    assert!(!node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_resolved_class_redefines_in_place() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let redefiner = StubRedefiner::new(true, true);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    node.load_class(&registry, "pkg.Foo").unwrap().unwrap();

    assert!(node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejecting_redefiner_fails() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let redefiner = StubRedefiner::new(true, false);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    node.load_class(&registry, "pkg.Foo").unwrap().unwrap();

    assert!(!node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unable_redefiner_fails_without_attempt() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let redefiner = StubRedefiner::new(false, true);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    node.load_class(&registry, "pkg.Foo").unwrap().unwrap();

    assert!(!node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_redefiner_fails() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let node = node_with(&registry, container.clone(), None);

    node.load_class(&registry, "pkg.Foo").unwrap().unwrap();

    assert!(!node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Foo.class".to_string()],
    }));
}

#[test]
fn test_unknown_changed_path_fails() {
    let registry = registry();
    let container = memory("cp", &[("pkg/Foo.class", &[1])]);
    let redefiner = StubRedefiner::new(true, true);
    let node = node_with(&registry, container.clone(), Some(redefiner.clone()));

    node.load_class(&registry, "pkg.Foo").unwrap().unwrap();

    // The notification names a class this node never defined.
    assert!(!node.on_entities_changed(&ChangeNotification {
        container,
        paths: vec!["pkg/Gone.class".to_string()],
    }));
    assert_eq!(redefiner.calls.load(Ordering::SeqCst), 0);
}
