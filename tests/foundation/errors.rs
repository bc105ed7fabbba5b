//! Integration tests for errors
//!
//! Tests error kinds, context merging, and messages.

use mastertable_foundation::{Error, ErrorContext, ErrorKind, RecordId};

#[test]
fn context_appears_in_messages() {
    let err = Error::unknown_column("Weapon", "nope")
        .with_context(ErrorContext::new().with_table("weapons").with_record(RecordId(3)));
    let msg = err.to_string();
    assert!(msg.contains("column nope does not exist on Weapon"));
    assert!(msg.contains("table weapons"));
    assert!(msg.contains("id 3"));
}

#[test]
fn inner_context_wins_over_outer() {
    let err = Error::casting("Weapon", "attack", "\"x\"", "not a number")
        .with_context(ErrorContext::new().with_column("attack").with_table("inner"))
        .with_context(ErrorContext::new().with_table("weapons").with_record(RecordId(1)));

    let context = err.context.unwrap();
    assert_eq!(context.table.as_deref(), Some("inner"));
    assert_eq!(context.column.as_deref(), Some("attack"));
    assert_eq!(context.record_id, Some(RecordId(1)));
}

#[test]
fn not_found_is_recognised() {
    assert!(Error::not_found("Weapon#9").is_not_found());
    assert!(!Error::schema("cycle").is_not_found());
    assert!(matches!(
        Error::source_unavailable("weapons", "offline").kind,
        ErrorKind::SourceUnavailable { .. }
    ));
}

#[test]
fn errors_without_context_have_no_suffix() {
    let msg = Error::new(ErrorKind::NoActiveDataset).to_string();
    assert_eq!(msg, "no active dataset in this context");
}
