//! The resolved catalog: a static registry of classes.
//!
//! Schemas are resolved once, at build time, into dense [`ClassId`]s with
//! precomputed layouts and ancestry. Everything the engine asks about a class
//! afterwards (its columns, its variant column, whether it descends from
//! another class) is a table lookup.

use std::fmt;
use std::sync::Arc;

use mastertable_foundation::{Column, ColumnRole, Error, Result, Value};
use rustc_hash::FxHashMap;

use crate::schema::{
    AfterLoadFn, ClassCacheDef, ClassSchema, MethodCacheDef, table_name_for,
};
use crate::validation::Validator;

/// Dense identifier of a class within one [`Catalog`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ClassId(u32);

impl ClassId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

// =============================================================================
// Layout
// =============================================================================

/// The resolved column set of one class, shared by all of its records.
pub struct Layout {
    class: ClassId,
    class_name: Arc<str>,
    columns: Vec<Column>,
    slots: FxHashMap<Arc<str>, usize>,
    id_slot: usize,
    variant_slot: Option<usize>,
    variant_tag: Option<Value>,
}

impl Layout {
    fn new(
        class: ClassId,
        class_name: Arc<str>,
        columns: Vec<Column>,
        is_variant: bool,
    ) -> Result<Self> {
        let slots: FxHashMap<Arc<str>, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (Arc::clone(c.name_arc()), i))
            .collect();
        let id_slot = columns
            .iter()
            .position(|c| c.role() == ColumnRole::Id)
            .ok_or_else(|| Error::schema(format!("class {class_name} has no id column")))?;
        let variant_slot = columns.iter().position(|c| c.role() == ColumnRole::VariantTag);
        let variant_tag = (is_variant && variant_slot.is_some())
            .then(|| Value::String(Arc::clone(&class_name)));
        Ok(Self {
            class,
            class_name,
            columns,
            slots,
            id_slot,
            variant_slot,
            variant_tag,
        })
    }

    /// Returns the class this layout belongs to.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the shared class name.
    #[must_use]
    pub fn class_name_arc(&self) -> &Arc<str> {
        &self.class_name
    }

    /// Returns all columns in positional order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the position of a column.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Returns a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.slot(name).map(|i| &self.columns[i])
    }

    /// Returns the position of the identifier column.
    #[must_use]
    pub fn id_slot(&self) -> usize {
        self.id_slot
    }

    /// Returns the variant selector column, if any.
    #[must_use]
    pub fn variant_column(&self) -> Option<&Column> {
        self.variant_slot.map(|i| &self.columns[i])
    }

    /// Returns the position of the variant selector column.
    #[must_use]
    pub fn variant_slot(&self) -> Option<usize> {
        self.variant_slot
    }

    /// Returns the selector value naming this class, for subclasses in a
    /// hierarchy with a variant column.
    #[must_use]
    pub fn variant_tag(&self) -> Option<(usize, &Value)> {
        self.variant_slot.zip(self.variant_tag.as_ref())
    }

    /// Returns the names of columns declared as group keys.
    pub fn group_keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.columns
            .iter()
            .filter(|c| c.is_group_key())
            .map(Column::name_arc)
    }

    /// Returns the initial value for every slot.
    ///
    /// Subclasses start with the variant column naming themselves.
    #[must_use]
    pub fn defaults(&self) -> Vec<Value> {
        let mut values: Vec<Value> =
            self.columns.iter().map(|c| c.default_value().clone()).collect();
        if let Some((slot, tag)) = self.variant_tag() {
            values[slot] = tag.clone();
        }
        values
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("class", &self.class_name)
            .field(
                "columns",
                &self.columns.iter().map(Column::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

// =============================================================================
// ClassDef
// =============================================================================

/// A resolved catalog class.
#[derive(Debug)]
pub struct ClassDef {
    id: ClassId,
    name: Arc<str>,
    parent: Option<ClassId>,
    base: ClassId,
    table_name: Arc<str>,
    is_abstract: bool,
    layout: Arc<Layout>,
    ancestors: Vec<ClassId>,
    descendants: Vec<ClassId>,
    class_caches: Vec<ClassCacheDef>,
    method_caches: Vec<MethodCacheDef>,
    validators: Vec<Validator>,
}

impl ClassDef {
    /// Returns the class id.
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared class name.
    #[must_use]
    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Returns the parent class, if this is a variant.
    #[must_use]
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// Returns the root of this class's hierarchy.
    #[must_use]
    pub fn base(&self) -> ClassId {
        self.base
    }

    /// Returns true if this class is the root of its hierarchy.
    #[must_use]
    pub fn is_base(&self) -> bool {
        self.base == self.id
    }

    /// Returns the table name shared by the whole hierarchy.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Returns true if the class holds no records of its own.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Returns the resolved column layout.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Returns this class followed by its ancestors, nearest first.
    #[must_use]
    pub fn ancestors(&self) -> &[ClassId] {
        &self.ancestors
    }

    /// Returns every concrete descendant, in declaration order.
    #[must_use]
    pub fn descendants(&self) -> &[ClassId] {
        &self.descendants
    }

    /// Returns class-level caches, inherited ones first.
    #[must_use]
    pub fn class_caches(&self) -> &[ClassCacheDef] {
        &self.class_caches
    }

    /// Returns per-record caches, inherited ones first.
    #[must_use]
    pub fn method_caches(&self) -> &[MethodCacheDef] {
        &self.method_caches
    }

    /// Returns a per-record cache declaration by name.
    #[must_use]
    pub fn method_cache(&self, name: &str) -> Option<&MethodCacheDef> {
        self.method_caches.iter().find(|m| m.name.as_ref() == name)
    }

    /// Returns validators, inherited ones first.
    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The static registry of all catalog classes.
pub struct Catalog {
    classes: Vec<ClassDef>,
    by_name: FxHashMap<Arc<str>, ClassId>,
    after_load: Vec<AfterLoadFn>,
}

impl Catalog {
    /// Starts a catalog declaration.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Returns a class by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different catalog.
    #[must_use]
    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.index()]
    }

    /// Returns the id of a class by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Resolves a class name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no class has that name.
    pub fn lookup(&self, name: &str) -> Result<ClassId> {
        self.id_of(name)
            .ok_or_else(|| Error::not_found(format!("class {name}")))
    }

    /// Returns every class in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter()
    }

    /// Returns the root classes, one per table.
    pub fn bases(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.iter().filter(|c| c.is_base())
    }

    /// Returns the number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no classes are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns true if `class` is `ancestor` or descends from it.
    #[must_use]
    pub fn is_a(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.class(class).ancestors.contains(&ancestor)
    }

    /// Returns the base class whose table owns `table_name`.
    #[must_use]
    pub fn class_for_table(&self, table_name: &str) -> Option<ClassId> {
        self.bases()
            .find(|c| c.table_name() == table_name)
            .map(ClassDef::id)
    }

    /// Picks the concrete class for a row of `base`'s table from the value
    /// of its variant column.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVariant` if the tag names a class outside the
    /// hierarchy or an abstract class.
    pub fn resolve_variant(&self, base: ClassId, tag: &Value) -> Result<ClassId> {
        let base_def = self.class(base);
        let name = match tag {
            Value::Nil => None,
            other => other.as_str().filter(|s| !s.is_empty()),
        };
        let Some(name) = name else {
            if base_def.is_abstract {
                return Err(Error::unsupported_variant(base_def.name(), "(none)"));
            }
            return Ok(base);
        };
        match self.id_of(name) {
            Some(id) if self.is_a(id, base) && !self.class(id).is_abstract => Ok(id),
            _ => Err(Error::unsupported_variant(base_def.name(), name)),
        }
    }

    /// Returns hooks to run after every load pass.
    #[must_use]
    pub fn after_load_hooks(&self) -> &[AfterLoadFn] {
        &self.after_load
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field(
                "classes",
                &self.classes.iter().map(ClassDef::name).collect::<Vec<_>>(),
            )
            .field("after_load", &self.after_load.len())
            .finish()
    }
}

// =============================================================================
// CatalogBuilder
// =============================================================================

/// Collects class schemas and resolves them into a [`Catalog`].
///
/// A variant class must be declared after its parent.
#[derive(Default)]
pub struct CatalogBuilder {
    schemas: Vec<ClassSchema>,
    after_load: Vec<AfterLoadFn>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    #[must_use]
    pub fn with_class(mut self, schema: ClassSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Registers a hook to run after every load pass.
    #[must_use]
    pub fn after_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&crate::Dataset) -> Result<()> + Send + Sync + 'static,
    {
        self.after_load.push(Arc::new(hook));
        self
    }

    /// Resolves every schema.
    ///
    /// # Errors
    ///
    /// Returns `Schema` for duplicate classes, undeclared parents, missing
    /// id columns, table names on variants, or a hierarchy without a
    /// variant column.
    pub fn build(self) -> Result<Catalog> {
        let mut classes: Vec<ClassDef> = Vec::with_capacity(self.schemas.len());
        let mut by_name: FxHashMap<Arc<str>, ClassId> = FxHashMap::default();

        for schema in self.schemas {
            let id = ClassId(
                u32::try_from(classes.len())
                    .map_err(|_| Error::schema("too many catalog classes"))?,
            );
            let name: Arc<str> = schema.name.as_str().into();
            if by_name.contains_key(&name) {
                return Err(Error::schema(format!("class {name} is declared twice")));
            }

            let parent = match &schema.parent {
                Some(parent_name) => Some(by_name.get(parent_name.as_str()).copied().ok_or_else(
                    || {
                        Error::schema(format!(
                            "parent {parent_name} of {name} must be declared before it"
                        ))
                    },
                )?),
                None => None,
            };

            let def = match parent {
                Some(parent_id) => {
                    if schema.table_name.is_some() {
                        return Err(Error::schema(format!(
                            "variant class {name} cannot set its own table name"
                        )));
                    }
                    resolve_variant_class(id, name.clone(), &classes[parent_id.index()], schema)?
                }
                None => resolve_base_class(id, name.clone(), schema)?,
            };

            by_name.insert(name, id);
            classes.push(def);
        }

        // Register concrete descendants on every ancestor.
        for index in 0..classes.len() {
            let (id, concrete) = (classes[index].id, !classes[index].is_abstract);
            if !concrete {
                continue;
            }
            let ancestors: Vec<ClassId> = classes[index].ancestors[1..].to_vec();
            for ancestor in ancestors {
                classes[ancestor.index()].descendants.push(id);
            }
        }

        for class in &classes {
            if class.is_base() && !class.descendants.is_empty() && class.layout.variant_slot.is_none()
            {
                return Err(Error::schema(format!(
                    "class {} has variants but no variant tag column",
                    class.name
                )));
            }
        }

        Ok(Catalog {
            classes,
            by_name,
            after_load: self.after_load,
        })
    }
}

fn resolve_base_class(id: ClassId, name: Arc<str>, schema: ClassSchema) -> Result<ClassDef> {
    let mut columns: Vec<Column> = Vec::with_capacity(schema.columns.len());
    merge_columns(&mut columns, schema.columns);
    let table_name: Arc<str> = schema
        .table_name
        .unwrap_or_else(|| table_name_for(&name))
        .into();

    Ok(ClassDef {
        id,
        layout: Arc::new(Layout::new(id, name.clone(), columns, false)?),
        name,
        parent: None,
        base: id,
        table_name,
        is_abstract: schema.is_abstract,
        ancestors: vec![id],
        descendants: Vec::new(),
        class_caches: schema.class_caches,
        method_caches: schema.method_caches,
        validators: schema.validators,
    })
}

fn resolve_variant_class(
    id: ClassId,
    name: Arc<str>,
    parent: &ClassDef,
    schema: ClassSchema,
) -> Result<ClassDef> {
    let mut columns = parent.layout.columns.clone();
    merge_columns(&mut columns, schema.columns);

    let mut ancestors = Vec::with_capacity(parent.ancestors.len() + 1);
    ancestors.push(id);
    ancestors.extend_from_slice(&parent.ancestors);

    let mut class_caches = parent.class_caches.clone();
    class_caches.extend(schema.class_caches);

    let mut method_caches = parent.method_caches.clone();
    for def in schema.method_caches {
        match method_caches.iter_mut().find(|m| m.name == def.name) {
            Some(existing) => *existing = def,
            None => method_caches.push(def),
        }
    }

    let mut validators = parent.validators.clone();
    validators.extend(schema.validators);

    Ok(ClassDef {
        id,
        layout: Arc::new(Layout::new(id, name.clone(), columns, true)?),
        name,
        parent: Some(parent.id),
        base: parent.base,
        table_name: parent.table_name.clone(),
        is_abstract: schema.is_abstract,
        ancestors,
        descendants: Vec::new(),
        class_caches,
        method_caches,
        validators,
    })
}

/// Appends new columns and replaces redefined ones in place.
fn merge_columns(columns: &mut Vec<Column>, declared: Vec<Column>) {
    for column in declared {
        match columns.iter_mut().find(|c| c.name() == column.name()) {
            Some(existing) => *existing = column,
            None => columns.push(column),
        }
    }
}
