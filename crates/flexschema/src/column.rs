//! Column descriptors: one declared column of a contract.

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field};
use flexschema_types::{dtype_name, ColumnKind, Nullability};
use serde_json::Value;
use std::sync::Arc;

use crate::coercion::checked_cast;
use crate::error::ContractError;

/// A declared column: name, semantic type, kind, and nullability class.
///
/// Descriptors are plain data. They are checked for validity when the
/// owning contract is built (see [`ContractBuilder::build`]).
///
/// [`ContractBuilder::build`]: crate::contract::ContractBuilder::build
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    name: String,
    dtype: DataType,
    kind: ColumnKind,
    /// Explicit override; `None` means the kind-dependent default applies
    nullability: Option<Nullability>,
    default: Option<Value>,
    description: Option<String>,
}

impl ColumnDescriptor {
    /// A column that must be present in every input.
    pub fn required(name: impl Into<String>, dtype: DataType) -> Self {
        Self::new(name, dtype, ColumnKind::Required)
    }

    /// A column that may be absent from an input.
    pub fn optional(name: impl Into<String>, dtype: DataType) -> Self {
        Self::new(name, dtype, ColumnKind::Optional)
    }

    pub fn new(name: impl Into<String>, dtype: DataType, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            dtype,
            kind,
            nullability: None,
            default: None,
            description: None,
        }
    }

    /// Override the kind-dependent nullability default.
    pub fn with_nullability(mut self, nullability: impl Into<Nullability>) -> Self {
        self.nullability = Some(nullability.into());
        self
    }

    /// Set a default value (bool, number, or string literal).
    ///
    /// Only OPTIONAL columns may carry a default; an absent column with a
    /// default is synthesized filled with it rather than with nulls.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.kind == ColumnKind::Required
    }

    pub fn is_optional(&self) -> bool {
        self.kind == ColumnKind::Optional
    }

    /// Effective nullability class.
    pub fn nullability(&self) -> Nullability {
        self.nullability
            .unwrap_or_else(|| Nullability::default_for(self.kind, self.default.is_some()))
    }

    /// The nullability given at declaration time, if any.
    pub fn nullability_override(&self) -> Option<Nullability> {
        self.nullability
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether alignment may create this column when an input lacks it.
    ///
    /// REQUIRED columns are only synthesizable when their class is ALL.
    pub fn is_synthesizable(&self) -> bool {
        self.is_optional() || self.nullability().is_synthesizable()
    }

    /// The Arrow field a conforming table carries for this column.
    pub fn arrow_field(&self) -> Field {
        Field::new(
            self.name.clone(),
            self.dtype.clone(),
            self.nullability() != Nullability::None,
        )
    }

    /// The default as a single-element array of the declared type.
    pub(crate) fn default_array(&self) -> Result<Option<ArrayRef>, ContractError> {
        let Some(value) = &self.default else {
            return Ok(None);
        };
        let invalid = |reason: String| ContractError::InvalidDefault {
            column: self.name.clone(),
            dtype: dtype_name(&self.dtype),
            reason,
        };

        let literal: ArrayRef = match value {
            Value::Bool(b) => Arc::new(BooleanArray::from(vec![*b])),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arc::new(Int64Array::from(vec![i]))
                } else if let Some(u) = n.as_u64() {
                    Arc::new(UInt64Array::from(vec![u]))
                } else if self.dtype.is_integer() {
                    return Err(invalid(format!("{} is not an integer", n)));
                } else {
                    let f = n
                        .as_f64()
                        .ok_or_else(|| invalid(format!("{} is not representable", n)))?;
                    Arc::new(Float64Array::from(vec![f]))
                }
            }
            Value::String(s) => Arc::new(StringArray::from(vec![s.as_str()])),
            other => {
                return Err(invalid(format!(
                    "unsupported default literal {}; use a bool, number, or string",
                    other
                )))
            }
        };

        checked_cast(&literal, &self.dtype)
            .map(Some)
            .map_err(|e| invalid(e.to_string()))
    }
}
