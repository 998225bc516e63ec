//! Dtype names for Arrow data types.
//!
//! Contracts name their column types with short strings (`int64`,
//! `timestamp[us, tz=UTC]`, `list<string>`). This module parses those names
//! into Arrow [`DataType`]s, renders the canonical name back, and provides
//! the serde representation used by declarations and violation reports.
//!
//! Every dtype [`parse_dtype`] accepts round-trips through [`dtype_name`].
//! Nested types without a short name (structs, dictionaries, fixed-size
//! lists) are written in the object form of [`DTypeSpec`].
//! Unknown names are errors: there is no fallback type.

use arrow::datatypes::{DataType, Field, Fields, TimeUnit};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while resolving a dtype name or object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DTypeError {
    #[error("dtype is empty")]
    Empty,
    #[error("unsupported dtype '{0}'")]
    Unsupported(String),
    #[error("invalid time unit '{unit}' for '{dtype}'")]
    InvalidUnit { dtype: String, unit: String },
    #[error("'{0}' is not a valid IANA timezone")]
    InvalidTimezone(String),
    #[error("invalid decimal '{dtype}': {reason}")]
    InvalidDecimal { dtype: String, reason: String },
    #[error("dtype kind '{kind}' requires '{field}'")]
    MissingField { kind: String, field: &'static str },
    #[error("dictionary key must be an integer type, got '{0}'")]
    InvalidDictionaryKey(String),
}

/// Parse a dtype name into an Arrow data type.
///
/// Accepts the canonical names produced by [`dtype_name`] as well as the
/// spellings commonly seen in dataframe libraries (`int`, `double`,
/// `datetime64[ns, UTC]`, `Datetime(time_unit='us', time_zone=None)`).
pub fn parse_dtype(raw: &str) -> Result<DataType, DTypeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DTypeError::Empty);
    }

    if let Some(inner) = strip_wrapped(trimmed, "large_list<", '>') {
        return Ok(DataType::new_large_list(parse_dtype(list_item(inner))?, true));
    }
    if let Some(inner) = strip_wrapped(trimmed, "list<", '>') {
        return Ok(DataType::new_list(parse_dtype(list_item(inner))?, true));
    }
    if let Some(dt) = parse_parameterized(trimmed)? {
        return Ok(dt);
    }

    let dt = match trimmed.to_ascii_lowercase().as_str() {
        "null" => DataType::Null,
        "bool" | "boolean" => DataType::Boolean,
        "int8" | "i8" => DataType::Int8,
        "int16" | "i16" => DataType::Int16,
        "int32" | "i32" => DataType::Int32,
        "int64" | "i64" | "int" | "integer" => DataType::Int64,
        "uint8" | "u8" => DataType::UInt8,
        "uint16" | "u16" => DataType::UInt16,
        "uint32" | "u32" => DataType::UInt32,
        "uint64" | "u64" => DataType::UInt64,
        "float16" | "halffloat" | "f16" => DataType::Float16,
        // "float" is single precision, "double" is double precision.
        "float32" | "float" | "f32" => DataType::Float32,
        "float64" | "double" | "f64" => DataType::Float64,
        "string" | "str" | "utf8" | "text" => DataType::Utf8,
        "large_string" | "large_utf8" => DataType::LargeUtf8,
        "binary" | "bytes" => DataType::Binary,
        "large_binary" => DataType::LargeBinary,
        "date32" | "date" => DataType::Date32,
        "date64" => DataType::Date64,
        "timestamp" | "datetime" => DataType::Timestamp(TimeUnit::Microsecond, None),
        "time" | "time64" => DataType::Time64(TimeUnit::Microsecond),
        "time32" => DataType::Time32(TimeUnit::Millisecond),
        "duration" => DataType::Duration(TimeUnit::Microsecond),
        _ => return Err(DTypeError::Unsupported(trimmed.to_string())),
    };
    Ok(dt)
}

/// Canonical name of a data type.
///
/// Types outside the parseable set fall back to Arrow's own display form,
/// which is fine for messages but will not parse back.
pub fn dtype_name(dt: &DataType) -> String {
    match dt {
        DataType::Null => "null".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::Int8 => "int8".to_string(),
        DataType::Int16 => "int16".to_string(),
        DataType::Int32 => "int32".to_string(),
        DataType::Int64 => "int64".to_string(),
        DataType::UInt8 => "uint8".to_string(),
        DataType::UInt16 => "uint16".to_string(),
        DataType::UInt32 => "uint32".to_string(),
        DataType::UInt64 => "uint64".to_string(),
        DataType::Float16 => "float16".to_string(),
        DataType::Float32 => "float32".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::Utf8 => "string".to_string(),
        DataType::LargeUtf8 => "large_string".to_string(),
        DataType::Binary => "binary".to_string(),
        DataType::LargeBinary => "large_binary".to_string(),
        DataType::FixedSizeBinary(size) => format!("fixed_size_binary[{}]", size),
        DataType::Date32 => "date32".to_string(),
        DataType::Date64 => "date64".to_string(),
        DataType::Timestamp(unit, None) => format!("timestamp[{}]", unit_name(unit)),
        DataType::Timestamp(unit, Some(tz)) => {
            format!("timestamp[{}, tz={}]", unit_name(unit), tz)
        }
        DataType::Time32(unit) => format!("time32[{}]", unit_name(unit)),
        DataType::Time64(unit) => format!("time64[{}]", unit_name(unit)),
        DataType::Duration(unit) => format!("duration[{}]", unit_name(unit)),
        DataType::Decimal128(precision, scale) => format!("decimal128({}, {})", precision, scale),
        DataType::Decimal256(precision, scale) => format!("decimal256({}, {})", precision, scale),
        DataType::List(item) => format!("list<{}>", dtype_name(item.data_type())),
        DataType::LargeList(item) => format!("large_list<{}>", dtype_name(item.data_type())),
        other => other.to_string(),
    }
}

/// Compare two time zone names, treating the common UTC aliases as equal.
pub fn same_timezone(a: &str, b: &str) -> bool {
    normalize_tz(a) == normalize_tz(b)
}

fn normalize_tz(value: &str) -> String {
    let lower = value.trim().to_ascii_lowercase();
    match lower.as_str() {
        "utc" | "etc/utc" | "gmt" | "etc/gmt" | "z" => "utc".to_string(),
        _ => lower,
    }
}

fn is_valid_timezone(tz: &str) -> bool {
    if tz.eq_ignore_ascii_case("utc") || is_fixed_offset(tz) {
        return true;
    }
    tz.parse::<chrono_tz::Tz>().is_ok()
}

/// `+05:00`, `-0330` or `+05`, as Arrow accepts them.
fn is_fixed_offset(tz: &str) -> bool {
    let Some(rest) = tz.strip_prefix('+').or_else(|| tz.strip_prefix('-')) else {
        return false;
    };
    let digits: String = match rest.split_once(':') {
        Some((hours, minutes)) if hours.len() == 2 && minutes.len() == 2 => {
            format!("{}{}", hours, minutes)
        }
        Some(_) => return false,
        None => rest.to_string(),
    };
    if !(digits.len() == 2 || digits.len() == 4) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let hours: u32 = digits[..2].parse().unwrap_or(99);
    let minutes: u32 = digits.get(2..).and_then(|m| m.parse().ok()).unwrap_or(0);
    hours < 24 && minutes < 60
}

fn parse_unit(dtype: &str, raw: &str) -> Result<TimeUnit, DTypeError> {
    match raw.trim_matches(|c| c == '\'' || c == '"').to_ascii_lowercase().as_str() {
        "s" | "second" => Ok(TimeUnit::Second),
        "ms" | "millisecond" => Ok(TimeUnit::Millisecond),
        "us" | "microsecond" => Ok(TimeUnit::Microsecond),
        "ns" | "nanosecond" => Ok(TimeUnit::Nanosecond),
        _ => Err(DTypeError::InvalidUnit {
            dtype: dtype.to_string(),
            unit: raw.to_string(),
        }),
    }
}

fn unit_name(unit: &TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Second => "s",
        TimeUnit::Millisecond => "ms",
        TimeUnit::Microsecond => "us",
        TimeUnit::Nanosecond => "ns",
    }
}

fn strip_wrapped<'a>(value: &'a str, prefix: &str, close: char) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) || !value.ends_with(close) {
        return None;
    }
    value.get(prefix.len()..value.len() - close.len_utf8())
}

/// `list<item: string>` is how Arrow prints list types; accept it.
fn list_item(inner: &str) -> &str {
    let inner = inner.trim();
    for label in ["item:", "element:"] {
        if let Some(rest) = inner.strip_prefix(label) {
            return rest.trim();
        }
    }
    inner
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '\'' || c == '"')
}

fn keyword<'a>(args: &[&'a str], key: &str) -> Option<&'a str> {
    args.iter().find_map(|arg| {
        let (k, v) = arg.split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(unquote(v))
        } else {
            None
        }
    })
}

fn positional<'a>(args: &[&'a str], index: usize) -> Option<&'a str> {
    args.iter()
        .filter(|arg| !arg.contains('='))
        .nth(index)
        .map(|arg| unquote(arg))
}

fn timezone(raw: Option<&str>) -> Result<Option<Arc<str>>, DTypeError> {
    match raw {
        None => Ok(None),
        Some(tz) if tz.is_empty() || tz.eq_ignore_ascii_case("none") || tz.eq_ignore_ascii_case("null") => {
            Ok(None)
        }
        Some(tz) => {
            if !is_valid_timezone(tz) {
                return Err(DTypeError::InvalidTimezone(tz.to_string()));
            }
            Ok(Some(Arc::from(tz)))
        }
    }
}

fn parse_parameterized(raw: &str) -> Result<Option<DataType>, DTypeError> {
    let Some(open) = raw.find(|c| c == '[' || c == '(') else {
        return Ok(None);
    };
    let close = if raw[open..].starts_with('[') { ']' } else { ')' };
    if !raw.ends_with(close) || raw.len() < open + 2 {
        return Err(DTypeError::Unsupported(raw.to_string()));
    }

    let head = raw[..open].trim().to_ascii_lowercase();
    let args: Vec<&str> = raw[open + 1..raw.len() - 1]
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .collect();

    let dt = match head.as_str() {
        "timestamp" | "datetime64" => {
            let unit = positional(&args, 0)
                .or_else(|| keyword(&args, "unit"))
                .ok_or_else(|| DTypeError::Unsupported(raw.to_string()))?;
            let tz = keyword(&args, "tz").or_else(|| positional(&args, 1));
            DataType::Timestamp(parse_unit(raw, unit)?, timezone(tz)?)
        }
        // polars: Datetime(time_unit='us', time_zone=None)
        "datetime" => {
            let unit = keyword(&args, "time_unit").unwrap_or("us");
            let tz = keyword(&args, "time_zone");
            DataType::Timestamp(parse_unit(raw, unit)?, timezone(tz)?)
        }
        "time32" => match parse_unit(raw, positional(&args, 0).unwrap_or("ms"))? {
            unit @ (TimeUnit::Second | TimeUnit::Millisecond) => DataType::Time32(unit),
            _ => {
                return Err(DTypeError::InvalidUnit {
                    dtype: raw.to_string(),
                    unit: args.first().copied().unwrap_or_default().to_string(),
                })
            }
        },
        "time64" => match parse_unit(raw, positional(&args, 0).unwrap_or("us"))? {
            unit @ (TimeUnit::Microsecond | TimeUnit::Nanosecond) => DataType::Time64(unit),
            _ => {
                return Err(DTypeError::InvalidUnit {
                    dtype: raw.to_string(),
                    unit: args.first().copied().unwrap_or_default().to_string(),
                })
            }
        },
        "duration" => DataType::Duration(parse_unit(raw, positional(&args, 0).unwrap_or("us"))?),
        "fixed_size_binary" => {
            let size = positional(&args, 0)
                .and_then(|size| size.parse::<i32>().ok())
                .filter(|size| *size >= 0)
                .ok_or_else(|| DTypeError::Unsupported(raw.to_string()))?;
            DataType::FixedSizeBinary(size)
        }
        "decimal" | "decimal128" | "decimal256" => {
            let precision = keyword(&args, "precision").or_else(|| positional(&args, 0));
            let scale = keyword(&args, "scale").or_else(|| positional(&args, 1));
            decimal(raw, head == "decimal256", precision, scale)?
        }
        _ => return Err(DTypeError::Unsupported(raw.to_string())),
    };
    Ok(Some(dt))
}

fn decimal(
    raw: &str,
    wide: bool,
    precision: Option<&str>,
    scale: Option<&str>,
) -> Result<DataType, DTypeError> {
    let invalid = |reason: &str| DTypeError::InvalidDecimal {
        dtype: raw.to_string(),
        reason: reason.to_string(),
    };
    let precision = precision
        .ok_or_else(|| invalid("precision is required"))?
        .parse::<u8>()
        .map_err(|_| invalid("precision must be an integer"))?;
    let scale = match scale {
        Some(scale) => scale
            .parse::<i8>()
            .map_err(|_| invalid("scale must be an integer"))?,
        None => 0,
    };
    decimal_type(raw, wide, precision, scale)
}

fn decimal_type(raw: &str, wide: bool, precision: u8, scale: i8) -> Result<DataType, DTypeError> {
    let max = if wide { 76 } else { 38 };
    if precision == 0 || precision > max {
        return Err(DTypeError::InvalidDecimal {
            dtype: raw.to_string(),
            reason: format!("precision must be between 1 and {}", max),
        });
    }
    if scale.unsigned_abs() > precision {
        return Err(DTypeError::InvalidDecimal {
            dtype: raw.to_string(),
            reason: "scale must not exceed precision".to_string(),
        });
    }
    if wide {
        Ok(DataType::Decimal256(precision, scale))
    } else {
        Ok(DataType::Decimal128(precision, scale))
    }
}

/// A dtype as written in a declaration, before it is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DTypeSpec {
    Name(String),
    Object(DTypeObject),
}

/// Structured dtype form: `{"kind": "timestamp", "unit": "ms", "tz": "UTC"}`.
///
/// Also the only way to write structs (`fields`), dictionaries (`key`,
/// `value`) and fixed-size lists (`item`, `size`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DTypeObject {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<DTypeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Box<DTypeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<DTypeSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,
}

/// A named child of a struct dtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub dtype: DTypeSpec,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl DTypeSpec {
    pub fn resolve(self) -> Result<DataType, DTypeError> {
        match self {
            DTypeSpec::Name(raw) => parse_dtype(&raw),
            DTypeSpec::Object(obj) => obj.resolve(),
        }
    }
}

impl From<&DataType> for DTypeSpec {
    fn from(dt: &DataType) -> Self {
        let object = |kind: &str| DTypeObject {
            kind: kind.to_string(),
            ..Default::default()
        };
        match dt {
            DataType::Struct(fields) => DTypeSpec::Object(DTypeObject {
                fields: Some(
                    fields
                        .iter()
                        .map(|f| FieldSpec {
                            name: f.name().clone(),
                            dtype: DTypeSpec::from(f.data_type()),
                            nullable: f.is_nullable(),
                        })
                        .collect(),
                ),
                ..object("struct")
            }),
            DataType::Dictionary(key, value) => DTypeSpec::Object(DTypeObject {
                key: Some(Box::new(DTypeSpec::from(key.as_ref()))),
                value: Some(Box::new(DTypeSpec::from(value.as_ref()))),
                ..object("dictionary")
            }),
            DataType::FixedSizeList(item, size) => DTypeSpec::Object(DTypeObject {
                item: Some(Box::new(DTypeSpec::from(item.data_type()))),
                size: Some(*size),
                ..object("fixed_size_list")
            }),
            DataType::List(item) | DataType::LargeList(item) => {
                match DTypeSpec::from(item.data_type()) {
                    DTypeSpec::Name(_) => DTypeSpec::Name(dtype_name(dt)),
                    nested => DTypeSpec::Object(DTypeObject {
                        item: Some(Box::new(nested)),
                        ..object(if matches!(dt, DataType::List(_)) {
                            "list"
                        } else {
                            "large_list"
                        })
                    }),
                }
            }
            _ => DTypeSpec::Name(dtype_name(dt)),
        }
    }
}

impl DTypeObject {
    fn resolve(self) -> Result<DataType, DTypeError> {
        let kind = self.kind.trim().to_ascii_lowercase();
        let missing = |field: &'static str| DTypeError::MissingField {
            kind: kind.clone(),
            field,
        };
        match kind.as_str() {
            "timestamp" => {
                let unit = parse_unit(&kind, self.unit.as_deref().unwrap_or("us"))?;
                Ok(DataType::Timestamp(unit, timezone(self.tz.as_deref())?))
            }
            "time32" | "time64" | "duration" => {
                let unit = self.unit.ok_or_else(|| missing("unit"))?;
                parse_dtype(&format!("{}[{}]", kind, unit))
            }
            "decimal" | "decimal128" | "decimal256" => {
                let precision = self.precision.ok_or_else(|| missing("precision"))?;
                decimal_type(&kind, kind == "decimal256", precision, self.scale.unwrap_or(0))
            }
            "list" | "large_list" => {
                let item = self.item.ok_or_else(|| missing("item"))?.resolve()?;
                if kind == "list" {
                    Ok(DataType::new_list(item, true))
                } else {
                    Ok(DataType::new_large_list(item, true))
                }
            }
            "fixed_size_list" => {
                let item = self.item.ok_or_else(|| missing("item"))?.resolve()?;
                let size = self.size.ok_or_else(|| missing("size"))?;
                Ok(DataType::new_fixed_size_list(item, size, true))
            }
            "fixed_size_binary" => {
                let size = self.size.ok_or_else(|| missing("size"))?;
                Ok(DataType::FixedSizeBinary(size))
            }
            "dictionary" => {
                let key = self.key.ok_or_else(|| missing("key"))?.resolve()?;
                let value = self.value.ok_or_else(|| missing("value"))?.resolve()?;
                if !key.is_dictionary_key_type() {
                    return Err(DTypeError::InvalidDictionaryKey(dtype_name(&key)));
                }
                Ok(DataType::Dictionary(Box::new(key), Box::new(value)))
            }
            "struct" => {
                let fields = self
                    .fields
                    .ok_or_else(|| missing("fields"))?
                    .into_iter()
                    .map(|f| f.dtype.resolve().map(|dt| Field::new(f.name, dt, f.nullable)))
                    .collect::<Result<Vec<_>, DTypeError>>()?;
                Ok(DataType::Struct(Fields::from(fields)))
            }
            _ => parse_dtype(&kind),
        }
    }
}

/// Serde adapter for `DataType` fields: `#[serde(with = "serde_dtype")]`.
///
/// Serializes as the canonical name; deserializes from a name string or a
/// `{"kind": ...}` object.
pub mod serde_dtype {
    use super::*;

    pub fn serialize<S>(dt: &DataType, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dtype_name(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DataType, D::Error>
    where
        D: Deserializer<'de>,
    {
        DTypeSpec::deserialize(deserializer)?
            .resolve()
            .map_err(serde::de::Error::custom)
    }
}
