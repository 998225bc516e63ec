//! The table boundary: what the reconciler reads from its inputs.
//!
//! A [`SchemaView`] exposes column names and types only; a [`TableView`]
//! adds row counts and observed null patterns. Arrow schemas are schema
//! views, record batches are both.

use arrow::array::Array;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use flexschema_types::NullPattern;

/// Column names and types, in input order.
pub trait SchemaView {
    fn column_names(&self) -> Vec<&str>;

    fn column_type(&self, name: &str) -> Option<&DataType>;
}

/// A schema view backed by concrete values.
pub trait TableView: SchemaView {
    fn num_rows(&self) -> usize;

    /// Observed null pattern of a column, or `None` if it is absent.
    fn null_pattern(&self, name: &str) -> Option<NullPattern>;
}

impl SchemaView for Schema {
    fn column_names(&self) -> Vec<&str> {
        self.fields().iter().map(|f| f.name().as_str()).collect()
    }

    fn column_type(&self, name: &str) -> Option<&DataType> {
        self.field_with_name(name).ok().map(|f| f.data_type())
    }
}

impl SchemaView for SchemaRef {
    fn column_names(&self) -> Vec<&str> {
        Schema::column_names(self)
    }

    fn column_type(&self, name: &str) -> Option<&DataType> {
        Schema::column_type(self, name)
    }
}

impl SchemaView for RecordBatch {
    fn column_names(&self) -> Vec<&str> {
        Schema::column_names(self.schema_ref())
    }

    fn column_type(&self, name: &str) -> Option<&DataType> {
        Schema::column_type(self.schema_ref(), name)
    }
}

impl TableView for RecordBatch {
    fn num_rows(&self) -> usize {
        RecordBatch::num_rows(self)
    }

    fn null_pattern(&self, name: &str) -> Option<NullPattern> {
        self.column_by_name(name)
            .map(|array| NullPattern::from_counts(observed_nulls(array.as_ref()), array.len()))
    }
}

/// Logical null count of an array. A `Null`-typed array carries no
/// validity buffer but every slot is null; dictionary, run-end and union
/// arrays can hold nulls their own validity buffer does not show.
pub(crate) fn observed_nulls(array: &dyn Array) -> usize {
    if array.data_type() == &DataType::Null {
        array.len()
    } else {
        array.logical_null_count()
    }
}
