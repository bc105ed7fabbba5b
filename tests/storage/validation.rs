//! Integration tests for validation
//!
//! Tests built-in rules, custom rules, and failure accumulation across a
//! whole dataset.

use std::sync::Arc;

use mastertable_foundation::{Column, ColumnType, Error, RawPayload, RecordId, Value};
use mastertable_storage::validation::BASE;
use mastertable_storage::{
    Catalog, ClassSchema, Dataset, DatasetConfig, Errors, MemoryLoader, ValidationKind, Validator,
};
use serde_json::json;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::builder()
            .with_class(
                ClassSchema::new("Weapon")
                    .with_column(Column::id())
                    .with_column(Column::new("type", ColumnType::VariantTag))
                    .with_column(Column::new(
                        "rarity",
                        ColumnType::enumeration([("common", 1), ("rare", 2)]),
                    ))
                    .with_column(Column::new("name", ColumnType::String))
                    .with_column(Column::new("attack", ColumnType::Float))
                    .with_validator(Validator::presence("name"))
                    .with_validator(Validator::non_negative("attack"))
                    .with_validator(Validator::uniqueness("name")),
            )
            .with_class(
                ClassSchema::new("Gun")
                    .extends("Weapon")
                    .with_column(Column::new("bullets", ColumnType::Integer))
                    .with_validator(Validator::inclusion(
                        "bullets",
                        [Value::Int(6), Value::Int(30)],
                    )),
            )
            .with_class(
                ClassSchema::new("Sword")
                    .extends("Weapon")
                    .with_validator(Validator::enum_member("rarity"))
                    .with_validator(Validator::custom(|_, record, errors| {
                        if record.id() == RecordId(5) {
                            return Err(Error::not_found("sheath"));
                        }
                        if record.value("attack").as_number().is_some_and(|a| a > 100.0) {
                            errors.add_message("attack", ValidationKind::Invalid, "too sharp");
                        }
                        Ok(())
                    })),
            )
            .build()
            .unwrap(),
    )
}

fn validate(rows: Vec<Vec<serde_json::Value>>) -> Errors {
    let mut payload = RawPayload::with_columns(["id", "type", "rarity", "name", "attack", "bullets"]);
    for row in rows {
        payload = payload.with_row(row);
    }
    let loader = MemoryLoader::new().with_table("weapons", payload);
    Dataset::new(catalog(), Arc::new(loader))
        .with_config(DatasetConfig::for_test())
        .load()
        .unwrap()
        .validate()
}

fn kinds(errors: &Errors, class: &str, id: i64) -> Vec<(String, ValidationKind)> {
    errors
        .of(class, RecordId(id))
        .map(|e| (e.attribute.clone(), e.kind.clone()))
        .collect()
}

#[test]
fn valid_records_produce_no_errors() {
    let errors = validate(vec![
        vec![json!(1), json!("Gun"), json!(1), json!("Pistol"), json!(5.0), json!(6)],
        vec![json!(2), json!("Sword"), json!(2), json!("Saber"), json!(7.0), json!(null)],
    ]);
    assert!(errors.is_empty(), "{:?}", errors.into_vec());
}

#[test]
fn builtin_rules_report_per_attribute() {
    let errors = validate(vec![
        vec![json!(1), json!("Gun"), json!(1), json!(""), json!(-1.0), json!(7)],
    ]);
    let found = kinds(&errors, "Gun", 1);
    assert!(found.contains(&("name".to_string(), ValidationKind::Blank)));
    assert!(found.contains(&("attack".to_string(), ValidationKind::Negative)));
    assert!(found.contains(&("bullets".to_string(), ValidationKind::Inclusion)));
}

#[test]
fn uniqueness_is_checked_within_the_class() {
    let errors = validate(vec![
        vec![json!(1), json!("Sword"), json!(1), json!("Twin"), json!(1.0), json!(null)],
        vec![json!(2), json!("Sword"), json!(1), json!("Twin"), json!(1.0), json!(null)],
        vec![json!(3), json!("Gun"), json!(1), json!("Twin"), json!(1.0), json!(6)],
    ]);
    assert_eq!(kinds(&errors, "Sword", 1), vec![("name".to_string(), ValidationKind::Taken)]);
    assert_eq!(kinds(&errors, "Sword", 2), vec![("name".to_string(), ValidationKind::Taken)]);
    assert!(kinds(&errors, "Gun", 3).is_empty());
}

#[test]
fn variant_rules_apply_only_to_their_variant() {
    let errors = validate(vec![
        vec![json!(1), json!("Gun"), json!(9), json!("Pistol"), json!(1.0), json!(6)],
        vec![json!(2), json!("Sword"), json!(9), json!("Saber"), json!(1.0), json!(null)],
    ]);
    assert!(kinds(&errors, "Gun", 1).is_empty());
    assert_eq!(kinds(&errors, "Sword", 2), vec![("rarity".to_string(), ValidationKind::Inclusion)]);
}

#[test]
fn custom_rules_add_messages() {
    let errors = validate(vec![
        vec![json!(4), json!("Sword"), json!(1), json!("Zanbato"), json!(500.0), json!(null)],
    ]);
    let error = errors.iter().next().unwrap();
    assert_eq!(error.kind, ValidationKind::Invalid);
    assert_eq!(error.to_string(), "Sword#4 attack is invalid: too sharp");
}

#[test]
fn failing_rules_become_base_errors() {
    let errors = validate(vec![
        vec![json!(5), json!("Sword"), json!(1), json!("Cursed"), json!(1.0), json!(null)],
    ]);
    let found: Vec<_> = errors.of("Sword", RecordId(5)).collect();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].attribute, BASE);
    assert!(found[0].message.as_deref().unwrap().contains("sheath"));
}

#[test]
fn accumulators_merge() {
    let mut all = validate(vec![
        vec![json!(1), json!("Gun"), json!(1), json!(""), json!(1.0), json!(6)],
    ]);
    let more = validate(vec![
        vec![json!(2), json!("Gun"), json!(1), json!("ok"), json!(-3.0), json!(6)],
    ]);
    all.merge(more);
    assert_eq!(all.len(), 2);
}
