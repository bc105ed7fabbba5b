//! Column descriptors and typed casting.
//!
//! Every column kind implements [`ColumnCast`]. The implementation is chosen
//! once, when a [`Column`] is declared, and is then shared by every record of
//! the class through an `Arc<dyn ColumnCast>`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::{Error, Result};
use crate::raw::{RawValue, render};
use crate::value::Value;

/// Declared type of a column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Record identifier.
    Id,
    /// 64-bit integer with permissive parsing.
    Integer,
    /// 64-bit float with permissive parsing.
    Float,
    /// Text.
    String,
    /// Symbolic name.
    Symbol,
    /// Boolean with integer truthiness.
    Boolean,
    /// Structured value decoded from its textual form.
    Json,
    /// Timestamp, truncated to whole seconds.
    Time,
    /// Time of day, stored on the fixed date 2000-01-01.
    TimeOfDay,
    /// Enumerated value: `(name, code)` pairs.
    Enum(Vec<(String, i64)>),
    /// Multi-valued flags, bit `i` is the `i`-th name.
    Bitmask(Vec<String>),
    /// Discriminator selecting the concrete class of a row.
    VariantTag,
    /// Name of the catalog class a polymorphic reference points to.
    PolymorphicType,
}

impl ColumnType {
    /// Creates an enum type from `(name, code)` pairs.
    #[must_use]
    pub fn enumeration<I, S>(variants: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self::Enum(variants.into_iter().map(|(n, c)| (n.into(), c)).collect())
    }

    /// Creates a bitmask type from flag names.
    #[must_use]
    pub fn bitmask<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Bitmask(flags.into_iter().map(Into::into).collect())
    }

    /// Selects the cast implementation for this type.
    #[must_use]
    pub fn caster(&self) -> Arc<dyn ColumnCast> {
        match self {
            Self::Id => Arc::new(IntegerCast { id: true }),
            Self::Integer => Arc::new(IntegerCast { id: false }),
            Self::Float => Arc::new(FloatCast),
            Self::String => Arc::new(StringCast { symbol: false }),
            Self::Symbol => Arc::new(StringCast { symbol: true }),
            Self::Boolean => Arc::new(BooleanCast),
            Self::Json => Arc::new(JsonCast),
            Self::Time => Arc::new(TimeCast { time_of_day: false }),
            Self::TimeOfDay => Arc::new(TimeCast { time_of_day: true }),
            Self::Enum(variants) => Arc::new(EnumCast::new(variants)),
            Self::Bitmask(flags) => Arc::new(BitmaskCast::new(flags)),
            Self::VariantTag => Arc::new(TypeNameCast {
                role: ColumnRole::VariantTag,
            }),
            Self::PolymorphicType => Arc::new(TypeNameCast {
                role: ColumnRole::PolymorphicType,
            }),
        }
    }
}

/// What a column means to the storage engine beyond its value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnRole {
    /// Ordinary data.
    Data,
    /// The record identifier.
    Id,
    /// The variant selector of a type hierarchy.
    VariantTag,
    /// The class half of a polymorphic reference.
    PolymorphicType,
}

/// Casting contract shared by all column kinds.
pub trait ColumnCast: Send + Sync + fmt::Debug {
    /// Short type name for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Converts a raw value into its internal representation.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value cannot be cast.
    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String>;

    /// Converts an internal value back to its storage/wire form.
    fn cast_out(&self, value: &Value) -> RawValue;

    /// Whether equal raw inputs may share one internal value.
    fn internable(&self) -> bool {
        false
    }

    /// The role this column plays for the engine.
    fn role(&self) -> ColumnRole {
        ColumnRole::Data
    }

    /// Returns the enum cast, if this is an enum column.
    fn as_enum(&self) -> Option<&EnumCast> {
        None
    }

    /// Returns the bitmask cast, if this is a bitmask column.
    fn as_bitmask(&self) -> Option<&BitmaskCast> {
        None
    }
}

/// Column descriptor: name, cast implementation, and index flags.
#[derive(Clone)]
pub struct Column {
    name: Arc<str>,
    ty: ColumnType,
    cast: Arc<dyn ColumnCast>,
    group_key: bool,
    default: Value,
}

impl Column {
    /// Creates a column of the given type.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, ty: ColumnType) -> Self {
        let cast = ty.caster();
        Self {
            name: name.into(),
            ty,
            cast,
            group_key: false,
            default: Value::Nil,
        }
    }

    /// Shorthand for the identifier column `id`.
    #[must_use]
    pub fn id() -> Self {
        Self::new("id", ColumnType::Id)
    }

    /// Marks this column as a group key.
    #[must_use]
    pub fn group_key(mut self) -> Self {
        self.group_key = true;
        self
    }

    /// Sets whether this column is a group key.
    #[must_use]
    pub fn with_group_key(mut self, group_key: bool) -> Self {
        self.group_key = group_key;
        self
    }

    /// Sets the value a freshly built record starts with.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Returns a copy with a different type, keeping name and flags.
    #[must_use]
    pub fn with_type(&self, ty: ColumnType) -> Self {
        Self {
            cast: ty.caster(),
            ty,
            ..self.clone()
        }
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared column name.
    #[must_use]
    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub fn ty(&self) -> &ColumnType {
        &self.ty
    }

    /// Returns the cast implementation.
    #[must_use]
    pub fn caster(&self) -> &dyn ColumnCast {
        self.cast.as_ref()
    }

    /// Identifies the cast implementation. Columns sharing one (clones of
    /// an inherited column) cast identically.
    pub(crate) fn cast_identity(&self) -> usize {
        Arc::as_ptr(&self.cast).cast::<()>().addr()
    }

    /// Returns true if a group index is kept for this column.
    #[must_use]
    pub fn is_group_key(&self) -> bool {
        self.group_key
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Returns the column role.
    #[must_use]
    pub fn role(&self) -> ColumnRole {
        self.cast.role()
    }

    /// Returns true if casts of this column may be interned.
    #[must_use]
    pub fn is_internable(&self) -> bool {
        self.cast.internable()
    }

    /// Casts a raw value, tagging failures with class and column.
    ///
    /// # Errors
    ///
    /// Returns a casting error naming `class`, the column, and the value.
    pub fn cast_in(&self, class: &str, raw: &RawValue) -> Result<Value> {
        self.cast
            .cast_in(raw)
            .map_err(|reason| Error::casting(class, self.name(), render(raw), reason))
    }

    /// Converts a value to its wire form.
    #[must_use]
    pub fn cast_out(&self, value: &Value) -> RawValue {
        if value.is_nil() {
            return RawValue::Null;
        }
        self.cast.cast_out(value)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("type", &self.cast.type_name())
            .field("group_key", &self.group_key)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.ty == other.ty
            && self.group_key == other.group_key
            && self.default == other.default
    }
}

// =============================================================================
// Scalar casts
// =============================================================================

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_int(f: f64) -> std::result::Result<i64, String> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Ok(f.trunc() as i64)
    } else {
        Err(format!("{f} is out of integer range"))
    }
}

#[derive(Debug)]
struct IntegerCast {
    id: bool,
}

impl ColumnCast for IntegerCast {
    fn type_name(&self) -> &'static str {
        if self.id { "id" } else { "integer" }
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            RawValue::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => float_to_int(n.as_f64().unwrap_or(f64::NAN)).map(Value::Int),
            },
            RawValue::String(s) if blank(s) => Ok(Value::Nil),
            RawValue::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                s.parse::<f64>()
                    .map_err(|_| format!("{s:?} is not an integer"))
                    .and_then(float_to_int)
                    .map(Value::Int)
            }
            other => Err(format!("expected an integer, got {other}")),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        match value {
            Value::Int(i) => RawValue::from(*i),
            other => RawValue::String(other.to_string()),
        }
    }

    fn role(&self) -> ColumnRole {
        if self.id {
            ColumnRole::Id
        } else {
            ColumnRole::Data
        }
    }
}

#[derive(Debug)]
struct FloatCast;

impl ColumnCast for FloatCast {
    fn type_name(&self) -> &'static str {
        "float"
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            RawValue::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| format!("{n} is not a float")),
            RawValue::String(s) if blank(s) => Ok(Value::Nil),
            RawValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("{s:?} is not a number")),
            other => Err(format!("expected a number, got {other}")),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        value
            .as_number()
            .and_then(serde_json::Number::from_f64)
            .map_or(RawValue::Null, RawValue::Number)
    }
}

#[derive(Debug)]
struct BooleanCast;

impl ColumnCast for BooleanCast {
    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        Ok(match raw {
            RawValue::Null => Value::Nil,
            RawValue::Bool(b) => Value::Bool(*b),
            RawValue::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            RawValue::String(s) => Value::Bool(s.eq_ignore_ascii_case("true") || s == "1"),
            RawValue::Array(_) | RawValue::Object(_) => Value::Bool(true),
        })
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        match value {
            Value::Bool(true) => RawValue::from(1),
            Value::Bool(false) => RawValue::from(0),
            _ => RawValue::Null,
        }
    }
}

#[derive(Debug)]
struct StringCast {
    symbol: bool,
}

impl ColumnCast for StringCast {
    fn type_name(&self) -> &'static str {
        if self.symbol { "symbol" } else { "string" }
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        let text: Arc<str> = match raw {
            RawValue::Null => return Ok(Value::Nil),
            RawValue::String(s) => s.as_str().into(),
            other => other.to_string().into(),
        };
        Ok(if self.symbol {
            Value::Symbol(text)
        } else {
            Value::String(text)
        })
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        RawValue::String(value.to_string())
    }

    fn internable(&self) -> bool {
        !self.symbol
    }
}

#[derive(Debug)]
struct JsonCast;

impl ColumnCast for JsonCast {
    fn type_name(&self) -> &'static str {
        "json"
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            RawValue::String(text) => {
                let decoded: RawValue =
                    serde_json::from_str(text).map_err(|e| format!("invalid json: {e}"))?;
                if decoded.is_null() {
                    Ok(Value::Nil)
                } else {
                    Ok(Value::Json(Arc::new(decoded)))
                }
            }
            structured => Ok(Value::Json(Arc::new(structured.clone()))),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        match value {
            Value::Json(v) => RawValue::String(v.to_string()),
            _ => RawValue::Null,
        }
    }

    fn internable(&self) -> bool {
        true
    }
}

// =============================================================================
// Time
// =============================================================================

const TIME_OF_DAY_DATE: (i32, u32, u32) = (2000, 1, 1);

#[derive(Debug)]
struct TimeCast {
    time_of_day: bool,
}

impl TimeCast {
    fn parse(&self, text: &str) -> std::result::Result<DateTime<Utc>, String> {
        let text = text.trim();
        if self.time_of_day {
            return parse_time_of_day(text);
        }
        parse_datetime(text).ok_or_else(|| format!("{text:?} is not a time"))
    }
}

fn truncate(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(t) = DateTime::parse_from_str(text, format) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

fn parse_time_of_day(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    // A full datetime keeps only its clock part.
    let clock = match text.char_indices().nth(10) {
        Some((i, 'T' | ' ')) if NaiveDate::parse_from_str(&text[..i], "%Y-%m-%d").is_ok() => {
            &text[i + 1..]
        }
        _ => text,
    };
    let clock = clock.trim_end_matches('Z');
    let time = NaiveTime::parse_from_str(clock, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(clock, "%H:%M"))
        .map_err(|_| format!("{text:?} is not a time of day"))?;
    let (y, m, d) = TIME_OF_DAY_DATE;
    NaiveDate::from_ymd_opt(y, m, d)
        .map(|date| date.and_time(time).and_utc())
        .ok_or_else(|| "invalid base date".to_string())
}

impl ColumnCast for TimeCast {
    fn type_name(&self) -> &'static str {
        if self.time_of_day { "time_of_day" } else { "time" }
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        let time = match raw {
            RawValue::Null => return Ok(Value::Nil),
            RawValue::String(s) if blank(s) => return Ok(Value::Nil),
            RawValue::String(s) => self.parse(s)?,
            RawValue::Number(n) => {
                let secs = n
                    .as_i64()
                    .ok_or_else(|| format!("{n} is not an epoch second"))?;
                DateTime::from_timestamp(secs, 0).ok_or_else(|| format!("{secs} is out of range"))?
            }
            other => return Err(format!("expected a time, got {other}")),
        };
        Ok(Value::Time(truncate(time)))
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        let Some(t) = value.as_time() else {
            return RawValue::Null;
        };
        let format = if self.time_of_day {
            "%H:%M:%S"
        } else {
            "%Y-%m-%d %H:%M:%S"
        };
        RawValue::String(t.format(format).to_string())
    }

    fn internable(&self) -> bool {
        true
    }
}

// =============================================================================
// Enum and bitmask
// =============================================================================

/// Enumerated column: values addressable by name or integer code.
#[derive(Debug)]
pub struct EnumCast {
    variants: Vec<(Arc<str>, i64)>,
}

impl EnumCast {
    fn new(variants: &[(String, i64)]) -> Self {
        Self {
            variants: variants
                .iter()
                .map(|(name, code)| (Arc::from(name.as_str()), *code))
                .collect(),
        }
    }

    /// Returns the name for an integer code.
    #[must_use]
    pub fn name_of(&self, code: i64) -> Option<&Arc<str>> {
        self.variants
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name)
    }

    /// Returns the integer code for a name.
    #[must_use]
    pub fn code_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, code)| *code)
    }

    /// Returns all `(name, code)` pairs in declaration order.
    #[must_use]
    pub fn variants(&self) -> &[(Arc<str>, i64)] {
        &self.variants
    }
}

impl ColumnCast for EnumCast {
    fn type_name(&self) -> &'static str {
        "enum"
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            // Unknown integer codes read as nil.
            RawValue::Number(n) => Ok(n
                .as_i64()
                .and_then(|code| self.name_of(code))
                .map_or(Value::Nil, |name| Value::Symbol(name.clone()))),
            RawValue::String(s) => {
                if let Some((name, _)) = self.variants.iter().find(|(n, _)| n.as_ref() == s) {
                    return Ok(Value::Symbol(name.clone()));
                }
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|code| self.name_of(code))
                    .map(|name| Value::Symbol(name.clone()))
                    .ok_or_else(|| format!("unsupported enum value {s:?}"))
            }
            other => Err(format!("unsupported enum value {other}")),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        value
            .as_str()
            .and_then(|name| self.code_of(name))
            .map_or(RawValue::Null, RawValue::from)
    }

    fn internable(&self) -> bool {
        true
    }

    fn as_enum(&self) -> Option<&EnumCast> {
        Some(self)
    }
}

/// Bitmask column: a packed integer addressable as a list of flag names.
#[derive(Debug)]
pub struct BitmaskCast {
    flags: Vec<Arc<str>>,
}

impl BitmaskCast {
    fn new(flags: &[String]) -> Self {
        Self {
            flags: flags.iter().map(|f| Arc::from(f.as_str())).collect(),
        }
    }

    fn bit_of(&self, flag: &str) -> std::result::Result<u64, String> {
        self.flags
            .iter()
            .position(|f| f.as_ref() == flag)
            .filter(|&i| i < 64)
            .map(|i| 1u64 << i)
            .ok_or_else(|| format!("unknown flag {flag:?}"))
    }

    /// Returns the names of the flags set in `bits`, in declaration order.
    #[must_use]
    pub fn names(&self, bits: u64) -> Vec<&str> {
        self.flags
            .iter()
            .take(64)
            .enumerate()
            .filter(|(i, _)| bits & (1u64 << i) != 0)
            .map(|(_, name)| name.as_ref())
            .collect()
    }

    /// Returns the declared flag names.
    #[must_use]
    pub fn flags(&self) -> &[Arc<str>] {
        &self.flags
    }
}

impl ColumnCast for BitmaskCast {
    fn type_name(&self) -> &'static str {
        "bitmask"
    }

    #[allow(clippy::cast_sign_loss)]
    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            RawValue::Number(n) => n
                .as_u64()
                .or_else(|| n.as_i64().map(|i| i as u64))
                .map(Value::Bits)
                .ok_or_else(|| format!("{n} is not a bitmask")),
            RawValue::String(s) => match s.trim().parse::<u64>() {
                Ok(bits) => Ok(Value::Bits(bits)),
                Err(_) => self.bit_of(s).map(Value::Bits),
            },
            RawValue::Array(items) => {
                let mut bits = 0;
                for item in items {
                    let flag = item
                        .as_str()
                        .ok_or_else(|| format!("flag {item} is not a name"))?;
                    bits |= self.bit_of(flag)?;
                }
                Ok(Value::Bits(bits))
            }
            other => Err(format!("expected flags, got {other}")),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        value.as_bits().map_or(RawValue::Null, RawValue::from)
    }

    fn internable(&self) -> bool {
        true
    }

    fn as_bitmask(&self) -> Option<&BitmaskCast> {
        Some(self)
    }
}

// =============================================================================
// Type-name columns
// =============================================================================

#[derive(Debug)]
struct TypeNameCast {
    role: ColumnRole,
}

impl ColumnCast for TypeNameCast {
    fn type_name(&self) -> &'static str {
        match self.role {
            ColumnRole::VariantTag => "variant_tag",
            _ => "polymorphic_type",
        }
    }

    fn cast_in(&self, raw: &RawValue) -> std::result::Result<Value, String> {
        match raw {
            RawValue::Null => Ok(Value::Nil),
            RawValue::String(s) if s.is_empty() && self.role == ColumnRole::PolymorphicType => {
                Ok(Value::Nil)
            }
            RawValue::String(s) => Ok(Value::String(s.as_str().into())),
            other => Err(format!("expected a class name, got {other}")),
        }
    }

    fn cast_out(&self, value: &Value) -> RawValue {
        RawValue::String(value.to_string())
    }

    fn internable(&self) -> bool {
        true
    }

    fn role(&self) -> ColumnRole {
        self.role
    }
}
