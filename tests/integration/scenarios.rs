//! End-to-end load scenarios
//!
//! Each test walks one complete path: source payload, optional diff, load,
//! and lookups against the published snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use mastertable_foundation::{Column, ColumnType, ErrorKind, RawPayload, RecordId, Value};
use mastertable_storage::{
    Catalog, ClassScope, ClassSchema, Dataset, DatasetConfig, MemoryLoader, Overlay, Record,
    RecordStore,
};
use serde_json::json;

type ByZone = HashMap<i64, Vec<RecordId>>;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .with_class(
                ClassSchema::new("Weapon")
                    .with_column(Column::id())
                    .with_column(Column::new("type", ColumnType::VariantTag))
                    .with_column(Column::new("rarity", ColumnType::Integer).group_key())
                    .with_column(Column::new("attack", ColumnType::Float)),
            )
            .with_class(
                ClassSchema::new("Gun")
                    .extends("Weapon")
                    .with_column(Column::new("bullets", ColumnType::Integer)),
            )
            .with_class(ClassSchema::new("Sword").extends("Weapon"))
            .with_class(
                ClassSchema::new("Enemy")
                    .with_column(Column::id())
                    .with_column(Column::new("zone_id", ColumnType::Integer))
                    .with_class_cache("by_zone", |scope: &ClassScope<'_>| {
                        let mut by_zone = ByZone::new();
                        for enemy in scope.all().iter() {
                            if let Some(zone) = enemy.value("zone_id").as_int() {
                                by_zone.entry(zone).or_default().push(enemy.id());
                            }
                        }
                        by_zone
                    }),
            )
            .build()
            .unwrap(),
    )
}

fn weapons() -> RawPayload {
    RawPayload::with_columns(["id", "type", "rarity", "attack", "bullets"])
        .with_row(vec![json!(1), json!("Gun"), json!(1), json!(5.0), json!(6)])
        .with_row(vec![json!(2), json!("Sword"), json!(2), json!(7.0), json!(null)])
        .with_row(vec![json!(3), json!("Sword"), json!(2), json!(3.0), json!(null)])
}

fn enemies(zone_of_three: i64) -> RawPayload {
    RawPayload::with_columns(["id", "zone_id"])
        .with_row(vec![json!(1), json!(10)])
        .with_row(vec![json!(2), json!(10)])
        .with_row(vec![json!(3), json!(zone_of_three)])
}

fn source() -> (Arc<MemoryLoader>, Dataset) {
    let loader = Arc::new(
        MemoryLoader::new()
            .with_table("weapons", weapons())
            .with_table("enemies", enemies(20)),
    );
    let dataset = Dataset::new(catalog(), loader.clone()).with_config(DatasetConfig::for_test());
    (loader, dataset)
}

fn weapon(data: &Dataset, id: i64) -> Option<Record> {
    data.store_by_name("Weapon").unwrap().find_by_id(RecordId(id))
}

#[test]
fn one_row_per_variant_partitions_the_table() {
    let payload = RawPayload::with_columns(["id", "type"])
        .with_row(vec![json!(1), json!("Gun")])
        .with_row(vec![json!(2), json!("Sword")]);
    let loader = MemoryLoader::new()
        .with_table("weapons", payload)
        .with_table("enemies", RawPayload::with_columns(["id"]));
    let data = Dataset::new(catalog(), Arc::new(loader))
        .with_config(DatasetConfig::for_test())
        .load()
        .unwrap();

    let base = data.store_by_name("Weapon").unwrap();
    let guns = data.store_by_name("Gun").unwrap();
    let swords = data.store_by_name("Sword").unwrap();
    assert_eq!(base.len(), 2);
    assert_eq!(guns.len(), 1);
    assert_eq!(swords.len(), 1);

    let mut union: Vec<_> = guns.ids().into_iter().chain(swords.ids()).collect();
    union.sort_unstable();
    assert_eq!(union, base.ids());
}

#[test]
fn a_patch_replaces_one_record_and_shares_the_rest() {
    let (_, source) = source();
    let before = source.load().unwrap();
    let after = before
        .duplicate(Some(Overlay::parse(r#"{"weapons": {"2": {"attack": 42.0}}}"#).unwrap()))
        .load()
        .unwrap();

    let patched = weapon(&after, 2).unwrap();
    assert_eq!(patched.value("attack"), &Value::Float(42.0));
    assert!(!Record::ptr_eq(&patched, &weapon(&before, 2).unwrap()));
    assert!(Record::ptr_eq(&weapon(&after, 1).unwrap(), &weapon(&before, 1).unwrap()));
}

#[test]
fn a_null_patch_removes_the_record_everywhere() {
    let (_, source) = source();
    let after = source
        .with_diff(Overlay::parse(r#"{"weapons": {"3": null}}"#).unwrap())
        .load()
        .unwrap();

    let base = after.store_by_name("Weapon").unwrap();
    assert!(base.find_by_id(RecordId(3)).is_none());
    assert!(!base.all().iter().any(|r| r.id() == RecordId(3)));
    assert_eq!(after.store_by_name("Sword").unwrap().ids(), vec![RecordId(2)]);
}

#[test]
fn class_aggregates_live_until_the_table_changes() {
    let (loader, source) = source();
    let first = source.load().unwrap();

    let a: Arc<ByZone> = first.class_cache("Enemy", "by_zone").unwrap();
    let b: Arc<ByZone> = first.class_cache("Enemy", "by_zone").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a[&10], vec![RecordId(1), RecordId(2)]);

    let unchanged = first.load().unwrap();
    let c: Arc<ByZone> = unchanged.class_cache("Enemy", "by_zone").unwrap();
    assert!(Arc::ptr_eq(&a, &c));

    loader.insert("enemies", enemies(10));
    let changed = unchanged.load().unwrap();
    let d: Arc<ByZone> = changed.class_cache("Enemy", "by_zone").unwrap();
    assert!(!Arc::ptr_eq(&a, &d));
    assert_eq!(d[&10].len(), 3);
    assert!(!d.contains_key(&20));
    assert_eq!(a[&20], vec![RecordId(3)]);
}

#[test]
fn group_lookups_are_lenient_for_values_and_strict_for_keys() {
    let (_, source) = source();
    let data = source.load().unwrap();
    let weapons = data.store_by_name("Weapon").unwrap();

    let none = weapons.all_by("rarity", &Value::Int(9)).unwrap();
    assert!(none.is_empty());
    let again = weapons.all_by("rarity", &Value::Int(9)).unwrap();
    assert_eq!(none, again);

    let err = weapons.all_by("attack", &Value::Float(5.0)).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotFound(_)));
}

#[test]
fn a_bad_patch_leaves_the_published_snapshot_in_place() {
    let (_, source) = source();
    let published = source.load().unwrap();
    let attempt = published
        .duplicate(Some(Overlay::parse(r#"{"weapons": {"2": {"no_such_column": 1}}}"#).unwrap()))
        .load();

    let err = attempt.unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownColumn { .. }));
    assert_eq!(err.context.as_ref().and_then(|c| c.table.as_deref()), Some("weapons"));

    assert_eq!(weapon(&published, 1).unwrap().value("attack"), &Value::Float(5.0));
    assert_eq!(weapon(&published, 3).unwrap().value("attack"), &Value::Float(3.0));
    assert_eq!(weapon(&published, 2).unwrap().value("attack"), &Value::Float(7.0));
}
