//! Record validation with an explicit error accumulator.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use mastertable_foundation::{RecordId, Result, Value};

use crate::dataset::ClassScope;
use crate::record::Record;
use crate::store::RecordStore;

/// Attribute name used for errors not tied to a single column.
pub const BASE: &str = "base";

/// Why a validation failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationKind {
    /// The value is nil or blank.
    Blank,
    /// The number is negative.
    Negative,
    /// The value is not in the allowed set.
    Inclusion,
    /// Another record has the same value.
    Taken,
    /// A custom rule rejected the record.
    Invalid,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Blank => "can't be blank",
            Self::Negative => "must be greater than or equal to 0",
            Self::Inclusion => "is not included in the list",
            Self::Taken => "has already been taken",
            Self::Invalid => "is invalid",
        };
        f.write_str(text)
    }
}

/// One validation failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Class of the failing record.
    pub class: Arc<str>,
    /// Id of the failing record.
    pub id: RecordId,
    /// Column name, or [`BASE`].
    pub attribute: String,
    /// The failure category.
    pub kind: ValidationKind,
    /// Extra detail, if any.
    pub message: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {} {}", self.class, self.id, self.attribute, self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Accumulates validation failures across a validation pass.
#[derive(Clone, Debug, Default)]
pub struct Errors {
    errors: Vec<ValidationError>,
}

impl Errors {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Returns a writer that attributes failures to `record`.
    pub fn for_record<'a>(&'a mut self, record: &'a Record) -> RecordErrors<'a> {
        RecordErrors {
            errors: self,
            record,
        }
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over failures in the order they were found.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Returns the failures of one record.
    pub fn of(&self, class: &str, id: RecordId) -> impl Iterator<Item = &ValidationError> {
        self.errors
            .iter()
            .filter(move |e| &*e.class == class && e.id == id)
    }

    /// Moves every failure of `other` into this accumulator.
    pub fn merge(&mut self, other: Errors) {
        self.errors.extend(other.errors);
    }

    /// Consumes the accumulator.
    #[must_use]
    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Failure writer bound to one record.
pub struct RecordErrors<'a> {
    errors: &'a mut Errors,
    record: &'a Record,
}

impl RecordErrors<'_> {
    /// Records a failure on `attribute`.
    pub fn add(&mut self, attribute: &str, kind: ValidationKind) {
        self.push(attribute, kind, None);
    }

    /// Records a failure on `attribute` with a message.
    pub fn add_message(&mut self, attribute: &str, kind: ValidationKind, message: impl Into<String>) {
        self.push(attribute, kind, Some(message.into()));
    }

    fn push(&mut self, attribute: &str, kind: ValidationKind, message: Option<String>) {
        self.errors.push(ValidationError {
            class: Arc::clone(self.record.layout().class_name_arc()),
            id: self.record.id(),
            attribute: attribute.to_string(),
            kind,
            message,
        });
    }
}

/// A custom validation rule.
pub type ValidateFn =
    Arc<dyn Fn(&ClassScope<'_>, &Record, &mut RecordErrors<'_>) -> Result<()> + Send + Sync>;

/// A validation rule attached to a class.
#[derive(Clone)]
pub enum Validator {
    /// The column must not be nil or an empty string.
    Presence(Arc<str>),
    /// A numeric column must not be negative. Nil passes.
    NonNegative(Arc<str>),
    /// The column must hold one of the listed values.
    Inclusion(Arc<str>, Vec<Value>),
    /// An enum column must name a declared variant.
    EnumMember(Arc<str>),
    /// No other record of the class may share the column's value.
    Uniqueness(Arc<str>),
    /// A closure.
    Custom(ValidateFn),
}

impl Validator {
    /// Creates a presence rule.
    #[must_use]
    pub fn presence(column: &str) -> Self {
        Self::Presence(column.into())
    }

    /// Creates a non-negative rule.
    #[must_use]
    pub fn non_negative(column: &str) -> Self {
        Self::NonNegative(column.into())
    }

    /// Creates an inclusion rule.
    #[must_use]
    pub fn inclusion(column: &str, allowed: impl IntoIterator<Item = Value>) -> Self {
        Self::Inclusion(column.into(), allowed.into_iter().collect())
    }

    /// Creates an enum membership rule.
    #[must_use]
    pub fn enum_member(column: &str) -> Self {
        Self::EnumMember(column.into())
    }

    /// Creates a uniqueness rule.
    #[must_use]
    pub fn uniqueness(column: &str) -> Self {
        Self::Uniqueness(column.into())
    }

    /// Creates a custom rule.
    #[must_use]
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&ClassScope<'_>, &Record, &mut RecordErrors<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(check))
    }

    fn check(&self, scope: &ClassScope<'_>, record: &Record, errors: &mut RecordErrors<'_>) -> Result<()> {
        match self {
            Self::Presence(column) => {
                let blank = match record.try_get(column)? {
                    Value::Nil => true,
                    Value::String(s) => s.trim().is_empty(),
                    _ => false,
                };
                if blank {
                    errors.add(column, ValidationKind::Blank);
                }
            }
            Self::NonNegative(column) => {
                if record.try_get(column)?.as_number().is_some_and(|n| n < 0.0) {
                    errors.add(column, ValidationKind::Negative);
                }
            }
            Self::Inclusion(column, allowed) => {
                let value = record.try_get(column)?;
                if !allowed.contains(value) {
                    errors.add_message(column, ValidationKind::Inclusion, value.to_string());
                }
            }
            Self::EnumMember(column) => {
                if record.enum_code(column)?.is_none() {
                    errors.add(column, ValidationKind::Inclusion);
                }
            }
            Self::Uniqueness(column) => {
                let value = record.try_get(column)?;
                let count = match scope.store().all_by(column, value) {
                    Ok(group) => group.len(),
                    Err(_) => scope.all().iter().filter(|r| r.value(column) == value).count(),
                };
                if count != 1 {
                    errors.add_message(column, ValidationKind::Taken, value.to_string());
                }
            }
            Self::Custom(check) => check(scope, record, errors)?,
        }
        Ok(())
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence(c) => f.debug_tuple("Presence").field(c).finish(),
            Self::NonNegative(c) => f.debug_tuple("NonNegative").field(c).finish(),
            Self::Inclusion(c, allowed) => f.debug_tuple("Inclusion").field(c).field(allowed).finish(),
            Self::EnumMember(c) => f.debug_tuple("EnumMember").field(c).finish(),
            Self::Uniqueness(c) => f.debug_tuple("Uniqueness").field(c).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Runs `validators` against one record.
///
/// A rule that returns an error or panics adds a [`BASE`] failure and the
/// remaining rules still run.
pub fn validate_record(
    validators: &[Validator],
    scope: &ClassScope<'_>,
    record: &Record,
    errors: &mut Errors,
) {
    let mut errors = errors.for_record(record);
    for validator in validators {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            validator.check(scope, record, &mut errors)
        }));
        let failure = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => error.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        errors.add_message(
            BASE,
            ValidationKind::Invalid,
            format!("error occurred while validating: {failure}"),
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
