//! Resolving stored addresses under both degrade policies.

mod common;

use common::*;
use edm_core::{
    Collection, CollectionBase, CollectionProvider, DegradePolicy, EdmConfig, EdmError, ErrorKind,
    RawCollection, Registry,
};
use rustc_hash::FxHashMap;

fn written(registry: &Registry) -> (RawCollection, RawCollection, RawCollection) {
    let mut hits = Collection::<Hit>::new();
    hits.set_id(10).unwrap();
    hits.create().unwrap().set_data(HitData { energy: 1.5 });

    let mut links = Collection::<HitClusterLink>::new();
    links.set_id(11).unwrap();
    links.create().unwrap().set_from(&hits.get(0).unwrap());

    let mut selected = Collection::<Hit>::new_subset();
    selected.set_id(12).unwrap();
    selected.push_back(&hits.get(0).unwrap()).unwrap();

    (
        registry.write_collection(&hits).unwrap(),
        registry.write_collection(&links).unwrap(),
        registry.write_collection(&selected).unwrap(),
    )
}

fn strict_registry() -> Registry {
    let mut registry = Registry::with_config(EdmConfig {
        unresolved_references: DegradePolicy::Strict,
        ..EdmConfig::default()
    });
    registry.register_module::<Demo>().unwrap();
    registry
}

#[test]
fn test_unresolved_relation_is_an_error_in_strict_mode() {
    init_tracing();
    let registry = strict_registry();
    let (_, links, selected) = written(&registry);

    let links = registry.read_collection(&links).unwrap().unwrap();
    let selected = registry.read_collection(&selected).unwrap().unwrap();
    let provider: Vec<&dyn CollectionBase> = vec![&*links, &*selected];

    let err = links.set_references(&provider).unwrap_err();
    assert!(matches!(err, EdmError::UnresolvedReference { .. }));
    assert_eq!(err.kind(), ErrorKind::Degraded);

    let err = selected.set_references(&provider).unwrap_err();
    assert!(matches!(err, EdmError::UnresolvedReference { .. }));
}

#[test]
fn test_strict_mode_links_complete_events() {
    let registry = strict_registry();
    let (hits, links, selected) = written(&registry);

    let mut provider: FxHashMap<u32, Box<dyn CollectionBase>> = FxHashMap::default();
    for raw in [&hits, &links, &selected] {
        let collection = registry.read_collection(raw).unwrap().unwrap();
        provider.insert(raw.collection_id, collection);
    }
    for collection in provider.values() {
        assert!(collection.set_references(&provider).unwrap());
    }

    let link = provider[&11]
        .as_any()
        .downcast_ref::<Collection<HitClusterLink>>()
        .unwrap()
        .get(0)
        .unwrap();
    assert_eq!(link.get_from().data().energy, 1.5);
    assert!(!link.get_to().is_available());
    assert_eq!(provider[&11].len(), 1);
}

#[test]
fn test_unresolved_subset_entry_warns() {
    let registry = registry();
    let (_, _, selected) = written(&registry);

    let selected = registry.read_collection(&selected).unwrap().unwrap();
    let empty: Vec<&dyn CollectionBase> = Vec::new();
    assert!(!selected.set_references(&empty).unwrap());

    let selected = selected
        .as_any()
        .downcast_ref::<Collection<Hit>>()
        .unwrap();
    assert_eq!(selected.len(), 1);
    assert!(!selected.get(0).unwrap().is_available());
}

#[test]
fn test_wrong_target_type_is_unresolved() {
    let registry = registry();
    let (hits, links, _) = written(&registry);

    // A cluster collection stored under the id the link expects for hits.
    let mut clusters = Collection::<Cluster>::new();
    clusters.set_id(hits.collection_id).unwrap();
    clusters.create().unwrap();

    let links = registry.read_collection(&links).unwrap().unwrap();
    let provider: Vec<&dyn CollectionBase> = vec![&clusters, &*links];
    assert!(CollectionProvider::get(&provider, hits.collection_id).is_some());
    assert!(!links.set_references(&provider).unwrap());
}
