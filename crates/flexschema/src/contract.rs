//! Schema Contract
//!
//! A contract is built once from its column declarations and is immutable
//! afterwards. Everything derived from the declaration (lookup index,
//! per-column constants, default arrays, the JSON Schema document, the
//! content hash) is computed in [`ContractBuilder::build`] and never again.

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use flexschema_types::{dtype_name, DTypeSpec};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::column::ColumnDescriptor;
use crate::error::ContractError;
use crate::json_schema;

/// Name and type of one declared column, for programmatic access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnConstants {
    pub name: String,
    pub dtype: DataType,
}

/// An immutable, declared set of column rules.
///
/// Contracts hold no interior mutability and are `Send + Sync`; share one
/// behind an `Arc` across any number of callers.
#[derive(Debug, Clone)]
pub struct SchemaContract {
    name: String,
    columns: Vec<ColumnDescriptor>,
    allow_extra_columns: bool,
    index: HashMap<String, usize>,
    constants: Vec<ColumnConstants>,
    /// One-element default arrays, parallel to `columns`
    defaults: Vec<Option<ArrayRef>>,
    json_schema: Value,
    content_hash: String,
}

impl SchemaContract {
    /// Start declaring a contract.
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.position(name).map(|pos| &self.columns[pos])
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_required())
    }

    pub fn optional_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_optional())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(ColumnDescriptor::name).collect()
    }

    pub fn column_type(&self, name: &str) -> Option<&DataType> {
        self.column(name).map(ColumnDescriptor::dtype)
    }

    pub fn allow_extra_columns(&self) -> bool {
        self.allow_extra_columns
    }

    /// Per-column name/type constants, in declaration order.
    pub fn constants(&self) -> &[ColumnConstants] {
        &self.constants
    }

    pub fn constant(&self, name: &str) -> Option<&ColumnConstants> {
        self.position(name).map(|pos| &self.constants[pos])
    }

    /// The schema of a conforming table with no extra columns.
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(ColumnDescriptor::arrow_field)
                .collect::<Vec<_>>(),
        ))
    }

    /// The contract as a JSON Schema document.
    pub fn to_json_schema(&self) -> &Value {
        &self.json_schema
    }

    /// The JSON Schema document, pretty-printed with sorted keys.
    pub fn to_json_schema_string(&self) -> String {
        format!("{:#}", self.json_schema)
    }

    /// BLAKE3 fingerprint of the declaration (16 hex chars).
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn default_array(&self, pos: usize) -> Option<&ArrayRef> {
        self.defaults.get(pos).and_then(Option::as_ref)
    }

    fn compute_hash(name: &str, allow_extra_columns: bool, columns: &[ColumnDescriptor]) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0u8, allow_extra_columns as u8]);
        for col in columns {
            hasher.update(&[0u8]);
            hasher.update(col.name().as_bytes());
            hasher.update(&[0u8]);
            hasher.update(dtype_name(col.dtype()).as_bytes());
            hasher.update(&[0u8]);
            hasher.update(col.kind().as_str().as_bytes());
            hasher.update(&[0u8]);
            hasher.update(col.nullability().as_str().as_bytes());
            if let Some(default) = col.default_value() {
                hasher.update(&[0u8]);
                hasher.update(default.to_string().as_bytes());
            }
        }
        hasher.finalize().to_hex()[..16].to_string()
    }
}

impl PartialEq for SchemaContract {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.allow_extra_columns == other.allow_extra_columns
            && self.columns == other.columns
    }
}

/// Collects column declarations for a [`SchemaContract`].
#[derive(Debug, Clone)]
pub struct ContractBuilder {
    name: String,
    allow_extra_columns: bool,
    columns: Vec<ColumnDescriptor>,
}

impl ContractBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_extra_columns: true,
            columns: Vec::new(),
        }
    }

    /// Whether undeclared input columns are tolerated (default: true).
    pub fn allow_extra_columns(mut self, allow: bool) -> Self {
        self.allow_extra_columns = allow;
        self
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDescriptor>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Check the declaration and derive everything the contract serves.
    pub fn build(self) -> Result<SchemaContract, ContractError> {
        let ContractBuilder {
            name,
            allow_extra_columns,
            columns,
        } = self;

        if name.trim().is_empty() {
            return Err(ContractError::EmptyContractName);
        }

        let mut seen = HashSet::new();
        let mut defaults = Vec::with_capacity(columns.len());
        for col in &columns {
            if col.name().is_empty() {
                return Err(ContractError::EmptyColumnName(name));
            }
            if !seen.insert(col.name()) {
                return Err(ContractError::DuplicateColumn(name, col.name().to_string()));
            }
            if col.is_required() && col.default_value().is_some() {
                return Err(ContractError::RequiredWithDefault(col.name().to_string()));
            }
            defaults.push(col.default_array()?);
        }

        let json_schema = json_schema::contract_document(&columns, allow_extra_columns)?;
        // Every built contract must survive `definition()` and back.
        for col in &columns {
            let declared = DTypeSpec::from(col.dtype()).resolve().ok();
            if declared.as_ref() != Some(col.dtype()) {
                return Err(ContractError::UndeclarableType {
                    column: col.name().to_string(),
                    dtype: dtype_name(col.dtype()),
                });
            }
        }
        let content_hash = SchemaContract::compute_hash(&name, allow_extra_columns, &columns);

        let index = columns
            .iter()
            .enumerate()
            .map(|(pos, col)| (col.name().to_string(), pos))
            .collect();
        let constants = columns
            .iter()
            .map(|col| ColumnConstants {
                name: col.name().to_string(),
                dtype: col.dtype().clone(),
            })
            .collect();

        debug!(
            contract = %name,
            columns = columns.len(),
            allow_extra_columns,
            hash = %content_hash,
            "Built schema contract"
        );

        Ok(SchemaContract {
            name,
            columns,
            allow_extra_columns,
            index,
            constants,
            defaults,
            json_schema,
            content_hash,
        })
    }
}
