//! Integration tests for fixture datasets
//!
//! Tests record-by-record writes, lazy index rebuilds, and cache
//! invalidation on mutable test tables.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mastertable_foundation::{Column, ColumnType, ErrorKind, RecordId, Value};
use mastertable_storage::{
    Catalog, ClassScope, ClassSchema, Dataset, DatasetConfig, DatasetMode, MemoryLoader, Record,
    RecordStore,
};

fn catalog(computations: Arc<AtomicUsize>) -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .with_class(
                ClassSchema::new("Weapon")
                    .with_column(Column::id())
                    .with_column(Column::new("type", ColumnType::VariantTag))
                    .with_column(Column::new("rarity", ColumnType::Integer).group_key())
                    .with_column(Column::new("name", ColumnType::String))
                    .with_class_cache("names", move |scope: &ClassScope<'_>| {
                        computations.fetch_add(1, Ordering::Relaxed);
                        scope
                            .all()
                            .iter()
                            .filter_map(|r| r.value("name").as_str().map(str::to_string))
                            .collect::<Vec<_>>()
                    }),
            )
            .with_class(ClassSchema::new("Gun").extends("Weapon"))
            .with_class(ClassSchema::new("Sword").extends("Weapon"))
            .build()
            .unwrap(),
    )
}

fn fixtures() -> (Arc<AtomicUsize>, Dataset) {
    let computations = Arc::new(AtomicUsize::new(0));
    let dataset = Dataset::for_fixtures(catalog(Arc::clone(&computations)));
    (computations, dataset)
}

fn weapon(data: &Dataset, class: &str, id: i64, rarity: i64, name: &str) -> Record {
    data.builder(class)
        .unwrap()
        .with("id", id)
        .unwrap()
        .with("type", class)
        .unwrap()
        .with("rarity", rarity)
        .unwrap()
        .with("name", name)
        .unwrap()
        .build()
        .unwrap()
}

// =============================================================================
// Writes
// =============================================================================

#[test]
fn inserts_reach_every_ancestor() {
    let (_, data) = fixtures();
    assert_eq!(data.mode(), DatasetMode::Fixture);

    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();
    data.insert(weapon(&data, "Sword", 2, 2, "Saber")).unwrap();

    assert_eq!(data.store_by_name("Weapon").unwrap().len(), 2);
    assert_eq!(data.store_by_name("Gun").unwrap().len(), 1);
    assert_eq!(data.store_by_name("Sword").unwrap().len(), 1);
}

#[test]
fn reinserting_as_another_variant_moves_the_record() {
    let (_, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();
    data.insert(weapon(&data, "Sword", 1, 2, "Pistol")).unwrap();

    assert!(data.store_by_name("Gun").unwrap().is_empty());
    assert!(data.store_by_name("Sword").unwrap().exists(RecordId(1)));
    assert_eq!(data.store_by_name("Weapon").unwrap().len(), 1);
}

#[test]
fn removal_clears_every_ancestor() {
    let (_, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();

    let removed = data.remove("Weapon", RecordId(1)).unwrap();
    assert_eq!(removed.map(|r| r.id()), Some(RecordId(1)));
    assert!(data.store_by_name("Gun").unwrap().is_empty());
    assert!(data.remove("Weapon", RecordId(1)).unwrap().is_none());
}

// =============================================================================
// Lazy Indices
// =============================================================================

#[test]
fn group_lookups_see_writes() {
    let (_, data) = fixtures();
    let weapons = data.store_by_name("Weapon").unwrap();

    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();
    assert_eq!(weapons.all_by("rarity", &Value::Int(2)).unwrap().len(), 1);

    data.insert(weapon(&data, "Sword", 2, 2, "Saber")).unwrap();
    assert_eq!(weapons.all_by("rarity", &Value::Int(2)).unwrap().len(), 2);

    data.remove("Weapon", RecordId(1)).unwrap();
    let left: Vec<_> = weapons
        .all_by("rarity", &Value::Int(2))
        .unwrap()
        .iter()
        .map(Record::id)
        .collect();
    assert_eq!(left, vec![RecordId(2)]);
}

#[test]
fn undeclared_group_keys_fail_on_fixtures_too() {
    let (_, data) = fixtures();
    let err = data
        .store_by_name("Weapon")
        .unwrap()
        .all_by("name", &Value::from("Pistol"))
        .unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Class Caches
// =============================================================================

#[test]
fn class_caches_recompute_after_writes() {
    let (computations, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();

    let a: Arc<Vec<String>> = data.class_cache("Weapon", "names").unwrap();
    let b: Arc<Vec<String>> = data.class_cache("Weapon", "names").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(computations.load(Ordering::Relaxed), 1);

    data.insert(weapon(&data, "Sword", 2, 1, "Saber")).unwrap();
    let c: Arc<Vec<String>> = data.class_cache("Weapon", "names").unwrap();
    assert_eq!(*c, vec!["Pistol".to_string(), "Saber".to_string()]);
    assert_eq!(computations.load(Ordering::Relaxed), 2);
}

#[test]
fn record_updated_invalidates_caches() {
    let (computations, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();
    let _: Arc<Vec<String>> = data.class_cache("Weapon", "names").unwrap();

    data.record_updated("Gun").unwrap();
    let _: Arc<Vec<String>> = data.class_cache("Weapon", "names").unwrap();
    assert_eq!(computations.load(Ordering::Relaxed), 2);
}

#[test]
fn wrong_cache_types_are_internal_errors() {
    let (_, data) = fixtures();
    let err = data.class_cache::<u32>("Weapon", "names").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Internal(_)));
    assert!(data.class_cache::<u32>("Weapon", "missing").unwrap_err().is_not_found());
}

// =============================================================================
// Copies
// =============================================================================

#[test]
fn duplicates_are_independent() {
    let (_, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();

    let copy = data.duplicate(None);
    copy.insert(weapon(&copy, "Gun", 2, 3, "Rifle")).unwrap();

    assert_eq!(data.store_by_name("Gun").unwrap().len(), 1);
    assert_eq!(copy.store_by_name("Gun").unwrap().len(), 2);
}

#[test]
fn reloading_fixtures_empties_them() {
    let (_, data) = fixtures();
    data.insert(weapon(&data, "Gun", 1, 2, "Pistol")).unwrap();

    let reloaded = data.reload().unwrap();
    assert_eq!(reloaded.mode(), DatasetMode::Fixture);
    assert!(reloaded.store_by_name("Weapon").unwrap().is_empty());
    assert_eq!(data.store_by_name("Weapon").unwrap().len(), 1);
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn exported_fixtures_reload_as_their_variant() {
    let (_, data) = fixtures();
    let gun = data.builder("Gun").unwrap().with("id", 1_i64).unwrap().build().unwrap();
    data.insert(gun).unwrap();
    data.insert(weapon(&data, "Sword", 2, 1, "Saber")).unwrap();

    let payload = data.export("Weapon").unwrap();
    let tag = payload.column_index("type").unwrap();
    assert_eq!(payload.rows[0][tag], serde_json::json!("Gun"));

    let reloaded = Dataset::new(
        Arc::clone(data.catalog()),
        Arc::new(MemoryLoader::new().with_table("weapons", payload)),
    )
    .with_config(DatasetConfig::for_test())
    .load()
    .unwrap();
    let gun = reloaded.store_by_name("Weapon").unwrap().find(RecordId(1)).unwrap();
    assert_eq!(gun.class_name(), "Gun");
    assert_eq!(reloaded.store_by_name("Gun").unwrap().ids(), vec![RecordId(1)]);
    assert_eq!(reloaded.store_by_name("Sword").unwrap().ids(), vec![RecordId(2)]);
}
