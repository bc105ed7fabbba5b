//! Integration tests for Value
//!
//! Tests truthiness, accessors, equality, hashing, and ordering.

use mastertable_foundation::{RecordId, Value};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

// =============================================================================
// Accessors
// =============================================================================

#[test]
fn nil_and_false_are_falsy() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Int(0).is_truthy());
    assert!(Value::from("").is_truthy());
}

#[test]
fn numbers_widen_to_f64() {
    assert_eq!(Value::Int(3).as_number(), Some(3.0));
    assert_eq!(Value::Float(2.5).as_number(), Some(2.5));
    assert_eq!(Value::from("3").as_number(), None);
}

#[test]
fn strings_and_symbols_expose_text() {
    assert_eq!(Value::from("sword").as_str(), Some("sword"));
    assert_eq!(Value::Symbol(Arc::from("rare")).as_str(), Some("rare"));
    assert_eq!(Value::Int(1).as_str(), None);
}

#[test]
fn json_values_keep_structure() {
    let v = Value::Json(Arc::new(json!({"speed": 2})));
    assert_eq!(v.as_json(), Some(&json!({"speed": 2})));
    assert_eq!(v.to_string(), r#"{"speed":2}"#);
}

#[test]
fn options_map_to_nil() {
    assert_eq!(Value::from(None::<i64>), Value::Nil);
    assert_eq!(Value::from(Some(4_i64)), Value::Int(4));
}

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn strings_and_symbols_are_distinct() {
    assert_ne!(Value::from("rare"), Value::Symbol(Arc::from("rare")));
}

#[test]
fn ints_and_floats_are_distinct_keys() {
    let mut set = HashSet::new();
    set.insert(Value::Int(1));
    set.insert(Value::Float(1.0));
    set.insert(Value::Int(1));
    assert_eq!(set.len(), 2);
}

#[test]
fn nan_equals_itself_as_a_key() {
    let nan = Value::Float(f64::NAN);
    assert_eq!(nan, nan.clone());
}

#[test]
fn nil_sorts_first() {
    assert!(Value::Nil < Value::Int(-5));
    assert!(Value::Int(1) < Value::Float(1.5));
    assert_eq!(Value::from("a").partial_cmp(&Value::Int(1)), None);
}

// =============================================================================
// Record Identifiers
// =============================================================================

#[test]
fn record_ids_parse_from_diff_keys() {
    let id: RecordId = "42".parse().unwrap();
    assert_eq!(id, RecordId(42));
    assert_eq!(id.get(), 42);
    assert!("forty".parse::<RecordId>().is_err());
}
