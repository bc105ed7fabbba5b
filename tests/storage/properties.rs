//! Property tests for published tables
//!
//! Group indices must agree with a linear scan, sub-tables must partition
//! their base table, and merging a diff must not depend on how often it is
//! applied.

use std::sync::Arc;

use mastertable_foundation::{Column, ColumnType, RawPayload, Value};
use mastertable_storage::{
    Catalog, ClassSchema, Dataset, DatasetConfig, MemoryLoader, Overlay, RecordStore,
};
use proptest::prelude::*;
use serde_json::json;

const VARIANTS: [&str; 3] = ["Gun", "Sword", "Bow"];

fn catalog() -> Arc<Catalog> {
    let mut builder = Catalog::builder().with_class(
        ClassSchema::new("Weapon")
            .with_column(Column::id())
            .with_column(Column::new("type", ColumnType::VariantTag))
            .with_column(Column::new("rarity", ColumnType::Integer).group_key())
            .with_column(Column::new("attack", ColumnType::Integer)),
    );
    for variant in VARIANTS {
        builder = builder.with_class(ClassSchema::new(variant).extends("Weapon"));
    }
    Arc::new(builder.build().unwrap())
}

/// Rows as `(id, variant index, rarity, attack)`.
fn weapon_rows() -> impl Strategy<Value = Vec<(i64, usize, i64, i64)>> {
    prop::collection::vec((0_i64..40, 0_usize..3, 0_i64..4, -5_i64..50), 0..40)
}

fn load(rows: &[(i64, usize, i64, i64)]) -> Arc<Dataset> {
    let mut payload = RawPayload::with_columns(["id", "type", "rarity", "attack"]);
    for &(id, variant, rarity, attack) in rows {
        payload = payload.with_row(vec![
            json!(id),
            json!(VARIANTS[variant]),
            json!(rarity),
            json!(attack),
        ]);
    }
    let loader = MemoryLoader::new().with_table("weapons", payload);
    Dataset::new(catalog(), Arc::new(loader))
        .with_config(DatasetConfig::for_test())
        .load()
        .unwrap()
}

proptest! {
    #[test]
    fn group_lookups_match_a_scan(rows in weapon_rows(), probe in 0_i64..5) {
        let data = load(&rows);
        for class in ["Weapon", "Gun", "Sword", "Bow"] {
            let store = data.store_by_name(class).unwrap();
            let value = Value::Int(probe);
            let indexed: Vec<_> = store.all_by("rarity", &value).unwrap().iter().map(|r| r.id()).collect();
            let scanned: Vec<_> = store
                .all()
                .iter()
                .filter(|r| r.value("rarity") == &value)
                .map(|r| r.id())
                .collect();
            prop_assert_eq!(indexed, scanned);
        }
    }

    #[test]
    fn subtables_partition_the_base(rows in weapon_rows()) {
        let data = load(&rows);
        let base = data.store_by_name("Weapon").unwrap();

        let mut total = 0;
        for variant in VARIANTS {
            let sub = data.store_by_name(variant).unwrap();
            total += sub.len();
            for record in sub.all().iter() {
                prop_assert_eq!(record.class_name(), variant);
                prop_assert!(base.exists(record.id()));
            }
        }
        prop_assert_eq!(total, base.len());
    }

    #[test]
    fn ids_are_unique_after_load(rows in weapon_rows()) {
        let data = load(&rows);
        let base = data.store_by_name("Weapon").unwrap();
        let mut ids = base.ids();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), before);
        for id in ids {
            prop_assert_eq!(base.find(id).unwrap().id(), id);
        }
    }

    #[test]
    fn merging_is_idempotent(
        rows in weapon_rows(),
        patches in prop::collection::vec((0_i64..40, prop::option::of(0_i64..100)), 0..10),
    ) {
        let mut overlay = Overlay::new();
        for (id, attack) in patches {
            overlay = match attack {
                Some(attack) => overlay.with_patch("weapons", id, json!({"type": "Gun", "attack": attack})),
                None => overlay.with_deletion("weapons", id),
            };
        }

        let data = load(&rows);
        let once = data.duplicate(Some(overlay.clone())).load().unwrap();
        let twice = once.duplicate(Some(overlay)).load().unwrap();

        let a = once.store_by_name("Weapon").unwrap();
        let b = twice.store_by_name("Weapon").unwrap();
        prop_assert_eq!(a.ids(), b.ids());
        for record in a.all().iter() {
            let other = b.find(record.id()).unwrap();
            prop_assert_eq!(record.values(), other.values());
        }
    }
}
