//! Reconciler: validation and alignment of inputs against a contract.
//!
//! Validation collects every violation before failing. Alignment plans the
//! whole output (keep, cast, synthesize, pass through) and reports all
//! planning violations at once; only a plan with zero violations is
//! executed, and a failing cast aborts without returning partial output.

use arrow::array::{new_null_array, Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, FieldRef, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use flexschema_types::{dtype_name, NullPattern, Nullability};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::coercion::{checked_cast, classify, may_coerce, CoercionPolicy, TypeRelation};
use crate::column::ColumnDescriptor;
use crate::contract::SchemaContract;
use crate::error::{AlignError, ValidationError, ValidationMode, Violation};
use crate::table::{observed_nulls, SchemaView, TableView};

/// Knobs for alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignOptions {
    pub coercion: CoercionPolicy,
}

impl AlignOptions {
    /// Attempt any cast Arrow supports, in checked mode.
    pub fn permissive() -> Self {
        Self {
            coercion: CoercionPolicy::Permissive,
        }
    }
}

/// Outcome of a schema-only validation.
///
/// Presence and types conform, but null patterns were never observed:
/// columns declared NONE are listed as unverified.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuralConformance {
    unverified_nullability: Vec<String>,
}

impl StructuralConformance {
    /// Present columns whose NONE nullability could not be checked.
    pub fn unverified_nullability(&self) -> &[String] {
        &self.unverified_nullability
    }

    /// True when no declared constraint was left unchecked.
    pub fn fully_verified(&self) -> bool {
        self.unverified_nullability.is_empty()
    }
}

/// A contract paired with alignment options.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'c> {
    contract: &'c SchemaContract,
    options: AlignOptions,
}

/// How one output column of an alignment is produced.
enum Step<'c> {
    Keep {
        col: &'c ColumnDescriptor,
        source: usize,
    },
    Cast {
        col: &'c ColumnDescriptor,
        source: usize,
    },
    Synthesize {
        col: &'c ColumnDescriptor,
        pos: usize,
    },
    PassThrough {
        source: usize,
    },
}

impl<'c> Reconciler<'c> {
    pub fn new(contract: &'c SchemaContract) -> Self {
        Self {
            contract,
            options: AlignOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AlignOptions) -> Self {
        self.options = options;
        self
    }

    pub fn contract(&self) -> &'c SchemaContract {
        self.contract
    }

    pub fn options(&self) -> AlignOptions {
        self.options
    }

    /// Check presence, types, and null patterns of a concrete table.
    pub fn validate<T: TableView + ?Sized>(&self, table: &T) -> Result<(), ValidationError> {
        let violations = self.check(table, |name| table.null_pattern(name));
        self.finish(ValidationMode::Table, violations)?;
        debug!(contract = %self.contract.name(), rows = table.num_rows(), "Table conforms");
        Ok(())
    }

    /// Check presence and types only.
    ///
    /// Null patterns cannot be observed from a schema, so nullability is not
    /// checked; the returned value names the columns this leaves unverified.
    pub fn validate_schema<S: SchemaView + ?Sized>(
        &self,
        schema: &S,
    ) -> Result<StructuralConformance, ValidationError> {
        let violations = self.check(schema, |_| None);
        self.finish(ValidationMode::SchemaOnly, violations)?;

        let unverified_nullability: Vec<String> = self
            .contract
            .columns()
            .iter()
            .filter(|col| {
                col.nullability() == Nullability::None && schema.column_type(col.name()).is_some()
            })
            .map(|col| col.name().to_string())
            .collect();
        debug!(
            contract = %self.contract.name(),
            unverified = ?unverified_nullability,
            "Schema conforms structurally"
        );
        Ok(StructuralConformance {
            unverified_nullability,
        })
    }

    /// Produce a conforming copy of `batch`: declared columns first, in
    /// declaration order, then any extra columns in input order.
    pub fn align(&self, batch: &RecordBatch) -> Result<RecordBatch, AlignError> {
        let steps = self.plan(batch)?;
        let num_rows = batch.num_rows();
        let input_fields = batch.schema_ref().fields();

        let mut fields: Vec<FieldRef> = Vec::with_capacity(steps.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                Step::Keep { col, source } => {
                    fields.push(Arc::new(col.arrow_field()));
                    arrays.push(Arc::clone(batch.column(source)));
                }
                Step::Cast { col, source } => {
                    let array = batch.column(source);
                    let cast = checked_cast(array, col.dtype()).map_err(|source| {
                        AlignError::UncoercibleType {
                            column: col.name().to_string(),
                            from_type: dtype_name(array.data_type()),
                            to_type: dtype_name(col.dtype()),
                            source,
                        }
                    })?;
                    debug!(
                        column = %col.name(),
                        from = %dtype_name(array.data_type()),
                        to = %dtype_name(col.dtype()),
                        "Cast column"
                    );
                    fields.push(Arc::new(col.arrow_field()));
                    arrays.push(cast);
                }
                Step::Synthesize { col, pos } => {
                    let array = match self.contract.default_array(pos) {
                        Some(default) => {
                            let indices = UInt32Array::from(vec![0u32; num_rows]);
                            take(default.as_ref(), &indices, None)?
                        }
                        None => new_null_array(col.dtype(), num_rows),
                    };
                    debug!(
                        column = %col.name(),
                        dtype = %dtype_name(col.dtype()),
                        rows = num_rows,
                        from_default = self.contract.default_array(pos).is_some(),
                        "Synthesized missing column"
                    );
                    fields.push(Arc::new(col.arrow_field()));
                    arrays.push(array);
                }
                Step::PassThrough { source } => {
                    fields.push(Arc::clone(&input_fields[source]));
                    arrays.push(Arc::clone(batch.column(source)));
                }
            }
        }

        // Re-check what was produced, not what was planned.
        let residual: Vec<Violation> = self
            .contract
            .columns()
            .iter()
            .zip(arrays.iter())
            .filter_map(|(col, array)| {
                let observed = NullPattern::from_counts(observed_nulls(array.as_ref()), array.len());
                nullability_violation(col, observed)
            })
            .collect();
        self.finish(ValidationMode::Table, residual)?;

        let schema = Schema::new_with_metadata(fields, batch.schema_ref().metadata().clone());
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let aligned = RecordBatch::try_new_with_options(Arc::new(schema), arrays, &options)?;
        Ok(aligned)
    }

    /// Align each batch; fails on the first batch that cannot be aligned.
    pub fn align_batches(&self, batches: &[RecordBatch]) -> Result<Vec<RecordBatch>, AlignError> {
        batches.iter().map(|batch| self.align(batch)).collect()
    }

    /// Violations shared by table and schema validation. `pattern` yields
    /// observed null patterns when values are available.
    fn check<S, F>(&self, input: &S, pattern: F) -> Vec<Violation>
    where
        S: SchemaView + ?Sized,
        F: Fn(&str) -> Option<NullPattern>,
    {
        let mut violations = Vec::new();
        for col in self.contract.columns() {
            let Some(observed) = input.column_type(col.name()) else {
                if col.is_required() {
                    violations.push(Violation::MissingRequiredColumn {
                        column: col.name().to_string(),
                    });
                }
                continue;
            };
            if !classify(observed, col.dtype()).is_compatible() {
                violations.push(type_mismatch(col, observed));
            }
            if let Some(v) = pattern(col.name()).and_then(|p| nullability_violation(col, p)) {
                violations.push(v);
            }
        }
        violations.extend(self.extra_violations(input));
        violations
    }

    /// Undeclared columns of a closed contract. Only the first occurrence
    /// of a declared name is matched; repeats are extras.
    fn extra_violations<S: SchemaView + ?Sized>(&self, input: &S) -> Vec<Violation> {
        if self.contract.allow_extra_columns() {
            return Vec::new();
        }
        let mut matched = HashSet::new();
        input
            .column_names()
            .into_iter()
            .filter(|name| self.contract.column(name).is_none() || !matched.insert(*name))
            .map(|name| Violation::UnexpectedExtraColumn {
                column: name.to_string(),
            })
            .collect()
    }

    /// Decide how every output column is produced, or report every reason
    /// the table cannot be aligned.
    fn plan(&self, batch: &RecordBatch) -> Result<Vec<Step<'c>>, AlignError> {
        let input_fields = batch.schema_ref().fields();
        let num_rows = batch.num_rows();

        let mut sources: HashMap<&str, usize> = HashMap::with_capacity(input_fields.len());
        for (idx, field) in input_fields.iter().enumerate() {
            sources.entry(field.name().as_str()).or_insert(idx);
        }

        let mut steps = Vec::with_capacity(input_fields.len().max(self.contract.columns().len()));
        let mut violations = Vec::new();
        let mut matched = vec![false; input_fields.len()];

        for (pos, col) in self.contract.columns().iter().enumerate() {
            let Some(&source) = sources.get(col.name()) else {
                if !col.is_synthesizable() {
                    violations.push(Violation::MissingRequiredColumn {
                        column: col.name().to_string(),
                    });
                    continue;
                }
                let filled = if self.contract.default_array(pos).is_some() {
                    0
                } else {
                    num_rows
                };
                if let Some(v) = nullability_violation(col, NullPattern::from_counts(filled, num_rows)) {
                    violations.push(v);
                }
                steps.push(Step::Synthesize { col, pos });
                continue;
            };

            matched[source] = true;
            let array = batch.column(source);
            let observed = array.data_type();
            match classify(observed, col.dtype()) {
                TypeRelation::Identical => steps.push(Step::Keep { col, source }),
                _ if may_coerce(observed, col.dtype(), self.options.coercion) => {
                    steps.push(Step::Cast { col, source })
                }
                _ => violations.push(type_mismatch(col, observed)),
            }

            let pattern = NullPattern::from_counts(observed_nulls(array.as_ref()), array.len());
            if let Some(v) = nullability_violation(col, pattern) {
                violations.push(v);
            }
        }

        let allow_extra = self.contract.allow_extra_columns();
        for (idx, field) in input_fields.iter().enumerate() {
            if matched[idx] {
                continue;
            }
            if allow_extra {
                steps.push(Step::PassThrough { source: idx });
            } else {
                violations.push(Violation::UnexpectedExtraColumn {
                    column: field.name().clone(),
                });
            }
        }

        self.finish(ValidationMode::Table, violations)?;
        Ok(steps)
    }

    fn finish(&self, mode: ValidationMode, violations: Vec<Violation>) -> Result<(), ValidationError> {
        if violations.is_empty() {
            return Ok(());
        }
        debug!(
            contract = %self.contract.name(),
            %mode,
            violations = violations.len(),
            "Input does not conform"
        );
        Err(ValidationError::new(self.contract.name(), mode, violations))
    }
}

fn type_mismatch(col: &ColumnDescriptor, observed: &DataType) -> Violation {
    Violation::TypeMismatch {
        column: col.name().to_string(),
        expected: col.dtype().clone(),
        observed: observed.clone(),
    }
}

fn nullability_violation(col: &ColumnDescriptor, observed: NullPattern) -> Option<Violation> {
    let declared = col.nullability();
    (!declared.admits(observed)).then(|| Violation::NullabilityViolation {
        column: col.name().to_string(),
        declared,
        observed,
    })
}

impl SchemaContract {
    /// A reconciler over this contract with default options.
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self)
    }

    /// See [`Reconciler::validate`].
    pub fn validate<T: TableView + ?Sized>(&self, table: &T) -> Result<(), ValidationError> {
        self.reconciler().validate(table)
    }

    /// See [`Reconciler::validate_schema`].
    pub fn validate_schema<S: SchemaView + ?Sized>(
        &self,
        schema: &S,
    ) -> Result<StructuralConformance, ValidationError> {
        self.reconciler().validate_schema(schema)
    }

    /// See [`Reconciler::align`].
    pub fn align(&self, batch: &RecordBatch) -> Result<RecordBatch, AlignError> {
        self.reconciler().align(batch)
    }

    pub fn align_with(
        &self,
        batch: &RecordBatch,
        options: AlignOptions,
    ) -> Result<RecordBatch, AlignError> {
        self.reconciler().with_options(options).align(batch)
    }

    pub fn align_batches(&self, batches: &[RecordBatch]) -> Result<Vec<RecordBatch>, AlignError> {
        self.reconciler().align_batches(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Int32Array, Int64Array, NullArray, StringArray};
    use crate::error::ViolationKind;

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    fn contract(allow_extra: bool) -> SchemaContract {
        SchemaContract::builder("measurements")
            .allow_extra_columns(allow_extra)
            .column(ColumnDescriptor::required("id", DataType::Int64).with_nullability(false))
            .column(ColumnDescriptor::optional("value", DataType::Float32))
            .build()
            .unwrap()
    }

    #[test]
    fn test_validate_accepts_widening() {
        let input = batch(vec![
            ("id", Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef),
            ("value", Arc::new(Int64Array::from(vec![Some(3), None])) as ArrayRef),
        ]);
        contract(false).validate(&input).unwrap();
    }

    #[test]
    fn test_validate_reports_nulls_in_none_column() {
        let input = batch(vec![(
            "id",
            Arc::new(Int64Array::from(vec![Some(1), None])) as ArrayRef,
        )]);
        let err = contract(true).validate(&input).unwrap_err();
        assert_eq!(err.mode(), ValidationMode::Table);
        assert_eq!(err.nullability_violations(), vec!["id"]);
    }

    #[test]
    fn test_validate_schema_skips_nullability() {
        let input = batch(vec![(
            "id",
            Arc::new(Int64Array::from(vec![Some(1), None])) as ArrayRef,
        )]);
        let contract = contract(true);
        let outcome = contract.validate_schema(input.schema_ref()).unwrap();
        assert_eq!(outcome.unverified_nullability(), &["id".to_string()]);
        assert!(!outcome.fully_verified());

        let wrong = batch(vec![("id", Arc::new(StringArray::from(vec!["x"])) as ArrayRef)]);
        let err = contract.validate_schema(&wrong).unwrap_err();
        assert_eq!(err.mode(), ValidationMode::SchemaOnly);
        assert_eq!(err.mistyped_columns(), vec!["id"]);
    }

    #[test]
    fn test_align_casts_and_reorders() {
        let input = batch(vec![
            ("note", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
            ("value", Arc::new(Int32Array::from(vec![Some(7), None])) as ArrayRef),
            ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
        ]);
        let aligned = contract(true).align(&input).unwrap();
        let names: Vec<&str> = aligned
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["id", "value", "note"]);

        let value = aligned
            .column(1)
            .as_any()
            .downcast_ref::<Float32Array>()
            .unwrap();
        assert_eq!(value.value(0), 7.0);
        assert!(value.is_null(1));
        assert!(!aligned.schema_ref().field(0).is_nullable());
    }

    #[test]
    fn test_align_synthesizes_from_default() {
        let contract = SchemaContract::builder("c")
            .column(ColumnDescriptor::required("id", DataType::Int64))
            .column(
                ColumnDescriptor::optional("unit", DataType::Utf8)
                    .with_nullability(Nullability::None)
                    .with_default("mg"),
            )
            .build()
            .unwrap();
        let input = batch(vec![("id", Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef)]);
        let aligned = contract.align(&input).unwrap();
        let unit = aligned
            .column_by_name("unit")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(unit.len(), 3);
        assert!((0..3).all(|i| unit.value(i) == "mg"));
    }

    #[test]
    fn test_align_rejects_unsynthesizable_none_column() {
        let contract = SchemaContract::builder("c")
            .column(ColumnDescriptor::required("id", DataType::Int64))
            .column(ColumnDescriptor::optional("flag", DataType::Boolean).with_nullability(false))
            .build()
            .unwrap();
        let input = batch(vec![("id", Arc::new(Int64Array::from(vec![1])) as ArrayRef)]);
        let err = contract.align(&input).unwrap_err();
        let err = err.validation().unwrap();
        assert_eq!(err.nullability_violations(), vec!["flag"]);
    }

    #[test]
    fn test_align_null_typed_input() {
        let input = batch(vec![
            ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            ("value", Arc::new(NullArray::new(2)) as ArrayRef),
        ]);
        let aligned = contract(true).align(&input).unwrap();
        let value = aligned.column_by_name("value").unwrap();
        assert_eq!(value.data_type(), &DataType::Float32);
        assert_eq!(value.null_count(), 2);
    }

    #[test]
    fn test_align_permissive_cast() {
        let input = batch(vec![("id", Arc::new(StringArray::from(vec!["1", "2"])) as ArrayRef)]);
        let contract = contract(true);

        let err = contract.align(&input).unwrap_err();
        let kinds: Vec<ViolationKind> = err
            .validation()
            .unwrap()
            .violations()
            .iter()
            .map(Violation::kind)
            .collect();
        assert_eq!(kinds, vec![ViolationKind::TypeMismatch]);

        let aligned = contract.align_with(&input, AlignOptions::permissive()).unwrap();
        assert_eq!(aligned.column(0).data_type(), &DataType::Int64);

        let bad = batch(vec![("id", Arc::new(StringArray::from(vec!["1", "x"])) as ArrayRef)]);
        let err = contract.align_with(&bad, AlignOptions::permissive()).unwrap_err();
        assert!(matches!(err, AlignError::UncoercibleType { ref column, .. } if column == "id"));
    }

    fn repeated_id() -> RecordBatch {
        batch(vec![
            ("id", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            ("id", Arc::new(Int64Array::from(vec![3, 4])) as ArrayRef),
        ])
    }

    #[test]
    fn test_repeated_column_passes_through_open_contract() {
        let input = repeated_id();
        let contract = contract(true);
        contract.validate(&input).unwrap();

        let aligned = contract.align(&input).unwrap();
        assert_eq!(aligned.num_columns(), 3);
        let names: Vec<&str> = aligned
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, vec!["id", "value", "id"]);
        let first = aligned.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let repeat = aligned.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!((first.value(0), first.value(1)), (1, 2));
        assert_eq!((repeat.value(0), repeat.value(1)), (3, 4));
    }

    #[test]
    fn test_repeated_column_is_extra_in_closed_contract() {
        let input = repeated_id();
        let contract = contract(false);

        let err = contract.validate(&input).unwrap_err();
        assert_eq!(
            err.violations(),
            &[Violation::UnexpectedExtraColumn {
                column: "id".to_string()
            }]
        );
        let err = contract.validate_schema(input.schema_ref()).unwrap_err();
        assert_eq!(err.violations().len(), 1);

        let err = contract.align(&input).unwrap_err();
        let kinds: Vec<ViolationKind> = err
            .validation()
            .unwrap()
            .violations()
            .iter()
            .map(Violation::kind)
            .collect();
        assert_eq!(kinds, vec![ViolationKind::UnexpectedExtraColumn]);
    }

    #[test]
    fn test_align_batches() {
        let contract = contract(true);
        let batches = vec![
            batch(vec![("id", Arc::new(Int64Array::from(vec![1])) as ArrayRef)]),
            batch(vec![("id", Arc::new(Int32Array::from(vec![2, 3])) as ArrayRef)]),
        ];
        let aligned = contract.align_batches(&batches).unwrap();
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].schema(), aligned[1].schema());
        assert_eq!(aligned[1].num_rows(), 2);
    }
}
