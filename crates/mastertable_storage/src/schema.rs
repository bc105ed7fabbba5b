//! Catalog class declarations.
//!
//! A [`ClassSchema`] declares one catalog class: its columns, its parent in a
//! variant hierarchy, and the caches and validators attached to it. Schemas
//! are resolved into a [`Catalog`](crate::Catalog) by the
//! [`CatalogBuilder`](crate::CatalogBuilder).

use std::fmt;
use std::sync::Arc;

use mastertable_foundation::{Column, Result};

use crate::cache::{CacheValue, cache_value};
use crate::dataset::{ClassScope, Dataset};
use crate::record::Record;
use crate::validation::Validator;

/// Computes one or more class-level aggregates from the published table.
pub type ClassCacheFn = Arc<dyn Fn(&ClassScope<'_>) -> Vec<CacheValue> + Send + Sync>;

/// Computes one per-record derived value.
pub type MethodCacheFn = Arc<dyn Fn(&ClassScope<'_>, &Record) -> CacheValue + Send + Sync>;

/// Runs after every load pass, once indices and caches are refreshed.
pub type AfterLoadFn = Arc<dyn Fn(&Dataset) -> Result<()> + Send + Sync>;

/// A class-level cache declaration producing one value per name.
#[derive(Clone)]
pub struct ClassCacheDef {
    /// Names of the aggregates, in the order `compute` returns them.
    pub names: Vec<Arc<str>>,
    /// The aggregate function.
    pub compute: ClassCacheFn,
}

impl fmt::Debug for ClassCacheDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassCacheDef")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// A per-record cache declaration.
#[derive(Clone)]
pub struct MethodCacheDef {
    /// Accessor name.
    pub name: Arc<str>,
    /// Compute every record's value right after a load publishes.
    pub eager: bool,
    /// The accessor function.
    pub compute: MethodCacheFn,
}

impl fmt::Debug for MethodCacheDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCacheDef")
            .field("name", &self.name)
            .field("eager", &self.eager)
            .finish_non_exhaustive()
    }
}

/// Declaration of one catalog class.
#[derive(Clone, Debug)]
pub struct ClassSchema {
    /// Class name (e.g. `Weapon`, `Gun`).
    pub name: String,
    /// Parent class name for variant classes.
    pub parent: Option<String>,
    /// Explicit table name (base classes only).
    pub table_name: Option<String>,
    /// Abstract classes hold no records of their own.
    pub is_abstract: bool,
    /// Columns declared by this class.
    pub columns: Vec<Column>,
    /// Class-level caches declared by this class.
    pub class_caches: Vec<ClassCacheDef>,
    /// Per-record caches declared by this class.
    pub method_caches: Vec<MethodCacheDef>,
    /// Validators declared by this class.
    pub validators: Vec<Validator>,
}

impl ClassSchema {
    /// Creates a new class schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            table_name: None,
            is_abstract: false,
            columns: Vec::new(),
            class_caches: Vec::new(),
            method_caches: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// Declares this class as a variant of `parent`.
    #[must_use]
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Overrides the derived table name.
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Marks the class abstract.
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds a column.
    #[must_use]
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Declares a single class-level aggregate.
    #[must_use]
    pub fn with_class_cache<T, F>(mut self, name: impl Into<Arc<str>>, compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ClassScope<'_>) -> T + Send + Sync + 'static,
    {
        self.class_caches.push(ClassCacheDef {
            names: vec![name.into()],
            compute: Arc::new(move |scope| vec![cache_value(compute(scope))]),
        });
        self
    }

    /// Declares several class-level aggregates computed together.
    ///
    /// `compute` returns one value per name, in order.
    #[must_use]
    pub fn with_class_caches<I, S, F>(mut self, names: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
        F: Fn(&ClassScope<'_>) -> Vec<CacheValue> + Send + Sync + 'static,
    {
        self.class_caches.push(ClassCacheDef {
            names: names.into_iter().map(Into::into).collect(),
            compute: Arc::new(compute),
        });
        self
    }

    /// Declares a lazily computed per-record accessor.
    #[must_use]
    pub fn with_method_cache<T, F>(self, name: impl Into<Arc<str>>, compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ClassScope<'_>, &Record) -> T + Send + Sync + 'static,
    {
        self.push_method_cache(name.into(), false, compute)
    }

    /// Declares a per-record accessor computed for every record on load.
    #[must_use]
    pub fn with_eager_method_cache<T, F>(self, name: impl Into<Arc<str>>, compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ClassScope<'_>, &Record) -> T + Send + Sync + 'static,
    {
        self.push_method_cache(name.into(), true, compute)
    }

    fn push_method_cache<T, F>(mut self, name: Arc<str>, eager: bool, compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ClassScope<'_>, &Record) -> T + Send + Sync + 'static,
    {
        self.method_caches.push(MethodCacheDef {
            name,
            eager,
            compute: Arc::new(move |scope, record| cache_value(compute(scope, record))),
        });
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }
}

/// Derives a table name from a class name: snake case, then plural.
///
/// `WeaponSkin` becomes `weapon_skins`, `Enemy` becomes `enemies`.
#[must_use]
pub fn table_name_for(class_name: &str) -> String {
    let mut snake = String::with_capacity(class_name.len() + 4);
    let mut prev_lower = false;
    for c in class_name.chars() {
        if c == ':' {
            if !snake.ends_with('_') && !snake.is_empty() {
                snake.push('_');
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() {
            if prev_lower {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            snake.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    let vowel_before_y = word
        .chars()
        .rev()
        .nth(1)
        .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
    if !vowel_before_y {
        if let Some(stem) = word.strip_suffix('y') {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}
