//! Integration tests for column casts
//!
//! Tests how each column type reads raw source values and writes them back.

use chrono::{TimeZone, Utc};
use mastertable_foundation::{Column, ColumnRole, ColumnType, ErrorKind, Value, ValueInterner};
use serde_json::json;

fn cast(ty: ColumnType, raw: serde_json::Value) -> Value {
    Column::new("col", ty).cast_in("Item", &raw).unwrap()
}

// =============================================================================
// Scalars
// =============================================================================

#[test]
fn integers_parse_permissively() {
    assert_eq!(cast(ColumnType::Integer, json!(7)), Value::Int(7));
    assert_eq!(cast(ColumnType::Integer, json!("12")), Value::Int(12));
    assert_eq!(cast(ColumnType::Integer, json!(3.9)), Value::Int(3));
    assert_eq!(cast(ColumnType::Integer, json!(" ")), Value::Nil);
    assert_eq!(cast(ColumnType::Integer, json!(null)), Value::Nil);
}

#[test]
fn bad_integers_name_class_and_column() {
    let err = Column::new("rarity", ColumnType::Integer)
        .cast_in("Weapon", &json!("lots"))
        .unwrap_err();
    match err.kind {
        ErrorKind::Casting { class, column, .. } => {
            assert_eq!(class, "Weapon");
            assert_eq!(column, "rarity");
        }
        other => panic!("expected a casting error, got {other:?}"),
    }
}

#[test]
fn floats_accept_numbers_and_text() {
    assert_eq!(cast(ColumnType::Float, json!(1.5)), Value::Float(1.5));
    assert_eq!(cast(ColumnType::Float, json!("2.25")), Value::Float(2.25));
    assert_eq!(cast(ColumnType::Float, json!(4)), Value::Float(4.0));
}

#[test]
fn booleans_use_integer_truthiness() {
    assert_eq!(cast(ColumnType::Boolean, json!(1)), Value::Bool(true));
    assert_eq!(cast(ColumnType::Boolean, json!(0)), Value::Bool(false));
    assert_eq!(cast(ColumnType::Boolean, json!("true")), Value::Bool(true));
    assert_eq!(cast(ColumnType::Boolean, json!("no")), Value::Bool(false));

    let column = Column::new("flag", ColumnType::Boolean);
    assert_eq!(column.cast_out(&Value::Bool(true)), json!(1));
}

#[test]
fn strings_stringify_scalars() {
    assert_eq!(cast(ColumnType::String, json!("x")), Value::from("x"));
    assert_eq!(cast(ColumnType::String, json!(5)), Value::from("5"));
    assert!(matches!(cast(ColumnType::Symbol, json!("gun")), Value::Symbol(_)));
}

#[test]
fn json_columns_decode_text() {
    let v = cast(ColumnType::Json, json!(r#"{"speed": 2}"#));
    assert_eq!(v.as_json(), Some(&json!({"speed": 2})));
    assert_eq!(cast(ColumnType::Json, json!("null")), Value::Nil);

    let structured = cast(ColumnType::Json, json!([1, 2]));
    assert_eq!(structured.as_json(), Some(&json!([1, 2])));
    assert!(Column::new("c", ColumnType::Json).cast_in("Item", &json!("{")).is_err());
}

// =============================================================================
// Time
// =============================================================================

#[test]
fn times_truncate_to_seconds() {
    let v = cast(ColumnType::Time, json!("2024-05-01 10:20:30.750"));
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap();
    assert_eq!(v.as_time(), Some(&expected));
}

#[test]
fn times_accept_offsets_and_epochs() {
    let v = cast(ColumnType::Time, json!("2024-05-01T10:20:30+09:00"));
    let expected = Utc.with_ymd_and_hms(2024, 5, 1, 1, 20, 30).unwrap();
    assert_eq!(v.as_time(), Some(&expected));

    let epoch = cast(ColumnType::Time, json!(0));
    assert_eq!(epoch.as_time(), Some(&Utc.timestamp_opt(0, 0).unwrap()));
}

#[test]
fn time_of_day_uses_a_fixed_date() {
    let v = cast(ColumnType::TimeOfDay, json!("2023-09-09 18:45:00"));
    let expected = Utc.with_ymd_and_hms(2000, 1, 1, 18, 45, 0).unwrap();
    assert_eq!(v.as_time(), Some(&expected));

    let column = Column::new("opens_at", ColumnType::TimeOfDay);
    assert_eq!(column.cast_out(&v), json!("18:45:00"));
}

// =============================================================================
// Enum and Bitmask
// =============================================================================

fn rarity() -> ColumnType {
    ColumnType::enumeration([("common", 1), ("rare", 2)])
}

#[test]
fn enums_read_names_and_codes() {
    assert_eq!(cast(rarity(), json!(2)).as_str(), Some("rare"));
    assert_eq!(cast(rarity(), json!("common")).as_str(), Some("common"));
    assert_eq!(cast(rarity(), json!("1")).as_str(), Some("common"));
}

#[test]
fn unknown_enum_codes_read_as_nil() {
    assert_eq!(cast(rarity(), json!(99)), Value::Nil);
    assert!(Column::new("r", rarity()).cast_in("Item", &json!("mythic")).is_err());
}

#[test]
fn enums_write_codes() {
    let column = Column::new("rarity", rarity());
    let rare = cast(rarity(), json!("rare"));
    assert_eq!(column.cast_out(&rare), json!(2));
    assert_eq!(column.caster().as_enum().unwrap().code_of("common"), Some(1));
}

#[test]
fn bitmasks_pack_flag_names() {
    let ty = ColumnType::bitmask(["fire", "ice", "wind"]);
    let column = Column::new("elements", ty.clone());
    let v = cast(ty, json!(["fire", "wind"]));
    assert_eq!(v.as_bits(), Some(0b101));
    assert_eq!(column.caster().as_bitmask().unwrap().names(0b101), vec!["fire", "wind"]);
    assert_eq!(column.cast_out(&v), json!(5));
    assert!(column.cast_in("Item", &json!(["earth"])).is_err());
}

// =============================================================================
// Roles and Interning
// =============================================================================

#[test]
fn roles_follow_the_type() {
    assert_eq!(Column::id().role(), ColumnRole::Id);
    assert_eq!(Column::new("type", ColumnType::VariantTag).role(), ColumnRole::VariantTag);
    assert_eq!(
        Column::new("owner_type", ColumnType::PolymorphicType).role(),
        ColumnRole::PolymorphicType
    );
    assert_eq!(Column::new("name", ColumnType::String).role(), ColumnRole::Data);
}

#[test]
fn interner_shares_equal_casts() {
    let column = Column::new("name", ColumnType::String);
    let mut interner = ValueInterner::new();

    let a = interner.cast("Item", &column, &json!("Potion")).unwrap();
    let b = interner.cast("Item", &column, &json!("Potion")).unwrap();
    assert_eq!(a, b);
    assert_eq!(interner.len(), 1);
    assert_eq!(interner.hits(), 1);

    interner.clear();
    assert!(interner.is_empty());
}
