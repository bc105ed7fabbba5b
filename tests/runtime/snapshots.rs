//! Integration tests for dataset snapshots
//!
//! Tests capturing a dataset with its diff merged and restoring it without
//! the original source.

use std::sync::Arc;

use mastertable_foundation::{Column, ColumnType, ErrorKind, RawPayload, RecordId, Value};
use mastertable_runtime::{Snapshot, SnapshotLoader, from_bytes, load_snapshot, save_dataset, to_bytes};
use mastertable_storage::{
    Catalog, ClassSchema, Dataset, DatasetConfig, MemoryLoader, Overlay, RecordStore,
};
use serde_json::json;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .with_class(
                ClassSchema::new("Weapon")
                    .with_column(Column::id())
                    .with_column(Column::new("type", ColumnType::VariantTag))
                    .with_column(Column::new("fired_at", ColumnType::Time))
                    .with_column(Column::new(
                        "element",
                        ColumnType::bitmask(["fire", "ice", "wind"]),
                    )),
            )
            .with_class(
                ClassSchema::new("Gun")
                    .extends("Weapon")
                    .with_column(Column::new("bullets", ColumnType::Integer)),
            )
            .with_class(
                ClassSchema::new("Sword")
                    .extends("Weapon")
                    .with_column(Column::new("edge", ColumnType::String)),
            )
            .build()
            .unwrap(),
    )
}

fn patched() -> Arc<Dataset> {
    let payload = RawPayload::with_columns(["id", "type", "fired_at", "element", "bullets", "edge"])
        .with_row(vec![
            json!(1),
            json!("Gun"),
            json!("2024-03-01 12:00:00"),
            json!(["fire"]),
            json!(6),
            json!(null),
        ])
        .with_row(vec![
            json!(2),
            json!("Sword"),
            json!(null),
            json!(["ice", "wind"]),
            json!(null),
            json!("keen"),
        ]);
    let loader = MemoryLoader::new().with_table("weapons", payload);
    Dataset::new(catalog(), Arc::new(loader))
        .with_config(DatasetConfig::for_test())
        .with_diff(Overlay::new().with_patch("weapons", 1, json!({"bullets": 8})))
        .load()
        .unwrap()
}

fn restore(snapshot: Snapshot) -> Arc<Dataset> {
    Dataset::new(catalog(), Arc::new(SnapshotLoader::new(snapshot)))
        .with_config(DatasetConfig::for_test())
        .load()
        .unwrap()
}

#[test]
fn snapshots_carry_merged_diffs() {
    let snapshot = Snapshot::capture(&patched()).unwrap();
    let restored = restore(snapshot);

    let gun = restored.store_by_name("Gun").unwrap().find(RecordId(1)).unwrap();
    assert_eq!(gun.value("bullets"), &Value::Int(8));
    assert!(restored.diff().is_empty());
}

#[test]
fn every_variant_column_survives() {
    let original = patched();
    let restored = restore(Snapshot::capture(&original).unwrap());

    for id in [1, 2] {
        let before = original.store_by_name("Weapon").unwrap().find(RecordId(id)).unwrap();
        let after = restored.store_by_name("Weapon").unwrap().find(RecordId(id)).unwrap();
        assert_eq!(before.class_name(), after.class_name());
        assert_eq!(before.values(), after.values());
    }

    let sword = restored.store_by_name("Sword").unwrap().find(RecordId(2)).unwrap();
    assert_eq!(sword.flags("element").unwrap(), vec!["ice", "wind"]);
}

#[test]
fn snapshot_files_roundtrip() {
    let path = std::env::temp_dir().join(format!("mastertable_snapshot_{}.msgpack", std::process::id()));
    save_dataset(&patched(), &path).unwrap();

    let snapshot = load_snapshot(&path).unwrap();
    let restored = restore(snapshot.clone());
    assert_eq!(restored.store_by_name("Weapon").unwrap().len(), 2);
    assert_eq!(from_bytes(&to_bytes(&snapshot).unwrap()).unwrap(), snapshot);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_snapshot_files_are_io_errors() {
    let path = std::env::temp_dir().join("mastertable_no_such_snapshot.msgpack");
    let err = load_snapshot(&path).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Io(_)));
}

#[test]
fn garbage_is_a_serialization_error() {
    let err = from_bytes(&[0xc1, 0x00, 0x13]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Serialization(_)));
}
