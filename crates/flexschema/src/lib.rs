//! Declared Tabular Contracts
//!
//! A contract is a named, typed, nullability-annotated set of columns. Once
//! built it is used three ways:
//!
//! 1. **Validate**: does an Arrow table (or schema) conform? Every violation
//!    is reported together.
//! 2. **Align**: repair a table into conformance by reordering columns,
//!    widening types along a fixed allow-list, and synthesizing absent
//!    optional columns. Nothing else happens automatically.
//! 3. **Export**: the contract as a JSON Schema document.
//!
//! ```no_run
//! use arrow::datatypes::{DataType, TimeUnit};
//! use flexschema::{ColumnDescriptor, SchemaContract};
//!
//! let contract = SchemaContract::builder("events")
//!     .column(ColumnDescriptor::required("subject_id", DataType::Int64).with_nullability(false))
//!     .column(ColumnDescriptor::required("time", DataType::Timestamp(TimeUnit::Microsecond, None)))
//!     .column(ColumnDescriptor::optional("numeric_value", DataType::Float32))
//!     .build()?;
//! println!("{}", contract.to_json_schema_string());
//! # Ok::<(), flexschema::ContractError>(())
//! ```
//!
//! # Modules
//!
//! - [`column`]: Column descriptors
//! - [`contract`]: The contract registry and its builder
//! - [`coercion`]: Type compatibility and the safe-widening allow-list
//! - [`reconcile`]: Validation and alignment
//! - [`json_schema`]: JSON Schema export
//! - [`definition`]: JSON/TOML declarations
//! - [`record`]: Single-row records

pub mod coercion;
pub mod column;
pub mod contract;
pub mod definition;
pub mod error;
pub mod json_schema;
pub mod reconcile;
pub mod record;
pub mod table;

pub use coercion::{CoercionPolicy, TypeRelation};
pub use column::ColumnDescriptor;
pub use contract::{ColumnConstants, ContractBuilder, SchemaContract};
pub use definition::{ColumnDefinition, ContractDefinition, NullableSpec};
pub use error::{AlignError, ContractError, ValidationError, ValidationMode, Violation, ViolationKind};
pub use reconcile::{AlignOptions, Reconciler, StructuralConformance};
pub use record::Row;
pub use table::{SchemaView, TableView};

// Vocabulary shared with the types crate
pub use flexschema_types::{
    dtype_name, parse_dtype, ColumnKind, DTypeError, DTypeObject, DTypeSpec, FieldSpec, NullPattern,
    Nullability,
};
