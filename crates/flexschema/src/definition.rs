//! Contract declarations in JSON or TOML.
//!
//! ```toml
//! name = "events"
//! allow_extra_columns = false
//!
//! [[columns]]
//! name = "subject_id"
//! dtype = "int64"
//! nullable = false
//!
//! [[columns]]
//! name = "numeric_value"
//! dtype = "float32"
//! optional = true
//! ```

use flexschema_types::{ColumnKind, DTypeSpec, Nullability};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column::ColumnDescriptor;
use crate::contract::SchemaContract;
use crate::error::ContractError;

/// Name given to a contract declared as a bare list of columns.
pub const DEFAULT_CONTRACT_NAME: &str = "contract";

/// Serializable form of a [`SchemaContract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    pub name: String,
    #[serde(default = "default_allow_extra")]
    pub allow_extra_columns: bool,
    pub columns: Vec<ColumnDefinition>,
}

fn default_allow_extra() -> bool {
    true
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(alias = "type", alias = "data_type")]
    pub dtype: DTypeSpec,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<NullableSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// `nullable = true | false | "none" | "some" | "all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NullableSpec {
    /// `true` admits any nulls (ALL); `false` admits none (NONE)
    Flag(bool),
    Class(Nullability),
}

impl From<NullableSpec> for Nullability {
    fn from(nullable: NullableSpec) -> Self {
        match nullable {
            NullableSpec::Flag(flag) => Nullability::from(flag),
            NullableSpec::Class(class) => class,
        }
    }
}

impl ContractDefinition {
    /// Parse a JSON declaration: a contract object, or a bare array of
    /// columns (named [`DEFAULT_CONTRACT_NAME`], extra columns allowed).
    pub fn from_json_str(raw: &str) -> Result<Self, ContractError> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| ContractError::Declaration(format!("not valid JSON: {}", e)))?;

        if value.is_array() {
            let columns: Vec<ColumnDefinition> = serde_json::from_value(value)
                .map_err(|e| ContractError::Declaration(format!("invalid columns: {}", e)))?;
            return Ok(Self {
                name: DEFAULT_CONTRACT_NAME.to_string(),
                allow_extra_columns: true,
                columns,
            });
        }

        serde_json::from_value(value).map_err(|e| ContractError::Declaration(e.to_string()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ContractError> {
        toml::from_str(raw).map_err(|e| ContractError::Declaration(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, ContractError> {
        serde_json::to_string_pretty(self).map_err(|e| ContractError::Declaration(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ContractError> {
        toml::to_string_pretty(self).map_err(|e| ContractError::Declaration(e.to_string()))
    }
}

impl TryFrom<ColumnDefinition> for ColumnDescriptor {
    type Error = ContractError;

    fn try_from(def: ColumnDefinition) -> Result<Self, Self::Error> {
        let dtype = def
            .dtype
            .resolve()
            .map_err(|source| ContractError::InvalidDType {
                column: def.name.clone(),
                source,
            })?;
        let kind = if def.optional {
            ColumnKind::Optional
        } else {
            ColumnKind::Required
        };

        let mut col = ColumnDescriptor::new(def.name, dtype, kind);
        if let Some(nullable) = def.nullable {
            col = col.with_nullability(nullable);
        }
        if let Some(default) = def.default {
            col = col.with_default(default);
        }
        if let Some(description) = def.description {
            col = col.with_description(description);
        }
        Ok(col)
    }
}

impl From<&ColumnDescriptor> for ColumnDefinition {
    fn from(col: &ColumnDescriptor) -> Self {
        Self {
            name: col.name().to_string(),
            dtype: DTypeSpec::from(col.dtype()),
            optional: col.is_optional(),
            nullable: col.nullability_override().map(NullableSpec::Class),
            default: col.default_value().cloned(),
            description: col.description().map(str::to_string),
        }
    }
}

impl TryFrom<ContractDefinition> for SchemaContract {
    type Error = ContractError;

    fn try_from(def: ContractDefinition) -> Result<Self, Self::Error> {
        let columns = def
            .columns
            .into_iter()
            .map(ColumnDescriptor::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        SchemaContract::builder(def.name)
            .allow_extra_columns(def.allow_extra_columns)
            .columns(columns)
            .build()
    }
}

impl SchemaContract {
    /// Build a contract from a JSON declaration.
    pub fn from_json_str(raw: &str) -> Result<Self, ContractError> {
        ContractDefinition::from_json_str(raw)?.try_into()
    }

    /// Build a contract from a TOML declaration.
    pub fn from_toml_str(raw: &str) -> Result<Self, ContractError> {
        ContractDefinition::from_toml_str(raw)?.try_into()
    }

    /// The declaration this contract was built from.
    pub fn definition(&self) -> ContractDefinition {
        ContractDefinition {
            name: self.name().to_string(),
            allow_extra_columns: self.allow_extra_columns(),
            columns: self.columns().iter().map(ColumnDefinition::from).collect(),
        }
    }
}
