//! Column vocabulary shared by flexschema contracts.
//!
//! Semantic column types are Arrow [`DataType`](arrow::datatypes::DataType)s;
//! this crate names them, parses them from declarations, and defines the
//! nullability lattice that contracts are checked against.

pub mod dtype;
pub mod nullability;

pub use dtype::{
    dtype_name, parse_dtype, same_timezone, serde_dtype, DTypeError, DTypeObject, DTypeSpec,
    FieldSpec,
};
pub use nullability::{ColumnKind, NullPattern, Nullability};
