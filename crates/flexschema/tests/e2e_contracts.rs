//! End-to-end contract tests over Arrow record batches.
//!
//! Covers the clinical-events example (subject_id, time, code), extra-column
//! policy, synthesis, coercion, aggregated violations, and export.

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, NullArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use flexschema::{
    AlignError, AlignOptions, ColumnDescriptor, ContractError, Nullability, SchemaContract,
    ValidationMode, ViolationKind,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flexschema=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn ts() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

fn events_contract(allow_extra: bool) -> SchemaContract {
    SchemaContract::builder("events")
        .allow_extra_columns(allow_extra)
        .column(ColumnDescriptor::required("subject_id", DataType::Int64).with_nullability(false))
        .column(ColumnDescriptor::required("time", ts()))
        .column(ColumnDescriptor::required("code", DataType::Utf8).with_nullability(false))
        .build()
        .unwrap()
}

fn events_with_value() -> SchemaContract {
    SchemaContract::builder("events")
        .column(ColumnDescriptor::required("subject_id", DataType::Int64).with_nullability(false))
        .column(ColumnDescriptor::required("time", ts()))
        .column(ColumnDescriptor::required("code", DataType::Utf8).with_nullability(false))
        .column(ColumnDescriptor::optional("numeric_value", DataType::Float32))
        .build()
        .unwrap()
}

/// Columns in the order {subject_id, code, time, extra_1, extra_2}.
fn shuffled_events() -> RecordBatch {
    let columns: Vec<(&str, ArrayRef)> = vec![
        ("subject_id", Arc::new(Int64Array::from(vec![1, 1, 2]))),
        ("code", Arc::new(StringArray::from(vec!["ADMIT", "LAB", "ADMIT"]))),
        (
            "time",
            Arc::new(TimestampMicrosecondArray::from(vec![
                Some(1_600_000_000_000_000),
                None,
                Some(1_600_000_360_000_000),
            ])),
        ),
        ("extra_1", Arc::new(StringArray::from(vec!["a", "b", "c"]))),
        ("extra_2", Arc::new(Float64Array::from(vec![0.1, 0.2, 0.3]))),
    ];
    RecordBatch::try_from_iter(columns).unwrap()
}

fn field_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

#[test]
fn test_open_contract_appends_extras_in_input_order() {
    init_tracing();
    let contract = events_contract(true);
    let input = shuffled_events();

    contract.validate(&input).unwrap();
    let aligned = contract.align(&input).unwrap();

    assert_eq!(
        field_names(&aligned),
        vec!["subject_id", "time", "code", "extra_1", "extra_2"]
    );
    assert_eq!(aligned.num_rows(), 3);
    assert_eq!(
        aligned.column_by_name("extra_2").unwrap().data_type(),
        &DataType::Float64
    );
}

#[test]
fn test_closed_contract_rejects_extras() {
    let contract = events_contract(false);
    let input = shuffled_events();

    let err = contract.validate(&input).unwrap_err();
    assert_eq!(err.unexpected_extra_columns(), vec!["extra_1", "extra_2"]);
    assert!(err.missing_required_columns().is_empty());
    assert!(err.to_string().contains("extra_1, extra_2"));

    let err = contract.align(&input).unwrap_err();
    assert_eq!(
        err.validation().unwrap().unexpected_extra_columns(),
        vec!["extra_1", "extra_2"]
    );
}

/// A second `code` column of another type, after the declared one.
fn events_with_repeated_code() -> RecordBatch {
    let columns: Vec<(&str, ArrayRef)> = vec![
        ("subject_id", Arc::new(Int64Array::from(vec![1, 2]))),
        ("time", Arc::new(TimestampMicrosecondArray::from(vec![Some(0), Some(1)]))),
        ("code", Arc::new(StringArray::from(vec!["ADMIT", "LAB"]))),
        ("code", Arc::new(Int32Array::from(vec![Some(7), None]))),
    ];
    RecordBatch::try_from_iter(columns).unwrap()
}

#[test]
fn test_repeated_column_name_is_never_dropped() {
    init_tracing();
    let input = events_with_repeated_code();

    let open = events_contract(true);
    open.validate(&input).unwrap();
    let aligned = open.align(&input).unwrap();
    assert_eq!(field_names(&aligned), vec!["subject_id", "time", "code", "code"]);
    assert_eq!(aligned.column(2).data_type(), &DataType::Utf8);
    assert_eq!(aligned.column(3).data_type(), &DataType::Int32);
    assert_eq!(aligned.column(3).null_count(), 1);

    let closed = events_contract(false);
    let err = closed.validate(&input).unwrap_err();
    assert_eq!(err.unexpected_extra_columns(), vec!["code"]);
    assert!(err.mistyped_columns().is_empty());

    let err = closed.validate_schema(input.schema_ref()).unwrap_err();
    assert_eq!(err.unexpected_extra_columns(), vec!["code"]);

    let err = closed.align(&input).unwrap_err();
    assert_eq!(err.validation().unwrap().unexpected_extra_columns(), vec!["code"]);
}

#[test]
fn test_absent_optional_column_is_synthesized() {
    let contract = events_with_value();
    let aligned = contract.align(&shuffled_events()).unwrap();

    let value = aligned.column_by_name("numeric_value").unwrap();
    assert_eq!(value.data_type(), &DataType::Float32);
    assert_eq!(value.len(), 3);
    assert_eq!(value.null_count(), 3);
    assert_eq!(
        field_names(&aligned),
        vec!["subject_id", "time", "code", "numeric_value", "extra_1", "extra_2"]
    );
}

#[test]
fn test_synthesis_on_empty_table() {
    let contract = events_with_value();
    let schema = Arc::new(Schema::new(vec![
        Field::new("subject_id", DataType::Int64, false),
        Field::new("time", ts(), true),
        Field::new("code", DataType::Utf8, false),
    ]));
    let empty = RecordBatch::new_empty(schema);
    let aligned = contract.align(&empty).unwrap();
    assert_eq!(aligned.num_rows(), 0);
    assert_eq!(aligned.num_columns(), 4);
}

#[test]
fn test_integer_to_float_aligns_float_to_integer_fails() {
    let contract = SchemaContract::builder("m")
        .column(ColumnDescriptor::required("x", DataType::Float32))
        .build()
        .unwrap();
    let ints = RecordBatch::try_from_iter(vec![(
        "x",
        Arc::new(Int32Array::from(vec![Some(1), None, Some(3)])) as ArrayRef,
    )])
    .unwrap();
    let aligned = contract.align(&ints).unwrap();
    let x = aligned
        .column(0)
        .as_any()
        .downcast_ref::<Float32Array>()
        .unwrap();
    assert_eq!(x.value(2), 3.0);
    assert!(x.is_null(1));

    let contract = SchemaContract::builder("m")
        .column(ColumnDescriptor::required("x", DataType::Int64))
        .build()
        .unwrap();
    let floats = RecordBatch::try_from_iter(vec![(
        "x",
        Arc::new(Float64Array::from(vec![1.0, 2.5])) as ArrayRef,
    )])
    .unwrap();
    let err = contract.align(&floats).unwrap_err();
    assert_eq!(err.validation().unwrap().mistyped_columns(), vec!["x"]);
    assert!(contract.validate(&floats).is_err());
}

#[test]
fn test_every_violation_is_reported() {
    let contract = events_contract(true);
    let input = RecordBatch::try_from_iter(vec![(
        "time",
        Arc::new(StringArray::from(vec!["2021-01-01"])) as ArrayRef,
    )])
    .unwrap();

    let err = contract.validate(&input).unwrap_err();
    assert_eq!(err.violations().len(), 3);
    assert_eq!(err.missing_required_columns(), vec!["subject_id", "code"]);
    assert_eq!(err.mistyped_columns(), vec!["time"]);

    let err = contract.align(&input).unwrap_err();
    assert_eq!(err.validation().unwrap().violations().len(), 3);
}

#[test]
fn test_nullability_lattice() {
    let contract = SchemaContract::builder("lattice")
        .column(ColumnDescriptor::required("none", DataType::Int64).with_nullability(Nullability::None))
        .column(ColumnDescriptor::required("some", DataType::Int64).with_nullability(Nullability::Some))
        .column(ColumnDescriptor::required("all", DataType::Int64).with_nullability(Nullability::All))
        .build()
        .unwrap();

    let table = |none: Vec<Option<i64>>, some: Vec<Option<i64>>, all: Vec<Option<i64>>| {
        RecordBatch::try_from_iter(vec![
            ("none", Arc::new(Int64Array::from(none)) as ArrayRef),
            ("some", Arc::new(Int64Array::from(some)) as ArrayRef),
            ("all", Arc::new(Int64Array::from(all)) as ArrayRef),
        ])
        .unwrap()
    };

    // SOME and ALL accept every pattern, including all-null
    contract
        .validate(&table(vec![Some(1), Some(2)], vec![None, None], vec![None, None]))
        .unwrap();
    contract
        .validate(&table(vec![Some(1), Some(2)], vec![Some(1), None], vec![Some(1), Some(2)]))
        .unwrap();

    let err = contract
        .validate(&table(vec![Some(1), None], vec![None, None], vec![None, None]))
        .unwrap_err();
    assert_eq!(err.nullability_violations(), vec!["none"]);

    // Only the ALL column may be synthesized when absent
    let only_none = RecordBatch::try_from_iter(vec![
        ("none", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
    ])
    .unwrap();
    let err = contract.align(&only_none).unwrap_err();
    assert_eq!(err.validation().unwrap().missing_required_columns(), vec!["some"]);

    let without_all = table(vec![Some(1)], vec![None], vec![None]);
    let without_all = without_all.project(&[0, 1]).unwrap();
    let aligned = contract.align(&without_all).unwrap();
    assert_eq!(aligned.column_by_name("all").unwrap().null_count(), 1);
}

#[test]
fn test_required_none_with_null_typed_column() {
    let contract = events_contract(true);
    let input = RecordBatch::try_from_iter(vec![
        ("subject_id", Arc::new(NullArray::new(2)) as ArrayRef),
        ("time", Arc::new(NullArray::new(2)) as ArrayRef),
        ("code", Arc::new(StringArray::from(vec!["A", "B"])) as ArrayRef),
    ])
    .unwrap();

    let err = contract.align(&input).unwrap_err();
    let err = err.validation().unwrap();
    assert_eq!(err.nullability_violations(), vec!["subject_id"]);
    assert!(err.mistyped_columns().is_empty());
}

#[test]
fn test_schema_only_validation() {
    let contract = events_contract(false);
    let schema = Schema::new(vec![
        Field::new("code", DataType::Utf8, true),
        Field::new("time", ts(), true),
        Field::new("subject_id", DataType::Int32, true),
    ]);
    let outcome = contract.validate_schema(&schema).unwrap();
    assert_eq!(
        outcome.unverified_nullability(),
        &["subject_id".to_string(), "code".to_string()]
    );

    let schema = Schema::new(vec![Field::new("time", DataType::Int64, true)]);
    let err = contract.validate_schema(&schema).unwrap_err();
    assert_eq!(err.mode(), ValidationMode::SchemaOnly);
    let kinds: Vec<ViolationKind> = err.violations().iter().map(|v| v.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ViolationKind::MissingRequiredColumn,
            ViolationKind::TypeMismatch,
            ViolationKind::MissingRequiredColumn,
        ]
    );
}

#[test]
fn test_permissive_coercion_is_checked() {
    let contract = SchemaContract::builder("m")
        .column(ColumnDescriptor::required("x", DataType::Int64))
        .build()
        .unwrap();
    let words = RecordBatch::try_from_iter(vec![(
        "x",
        Arc::new(StringArray::from(vec!["10", "eleven"])) as ArrayRef,
    )])
    .unwrap();

    match contract.align_with(&words, AlignOptions::permissive()) {
        Err(AlignError::UncoercibleType {
            column,
            from_type,
            to_type,
            ..
        }) => {
            assert_eq!(column, "x");
            assert_eq!(from_type, "string");
            assert_eq!(to_type, "int64");
        }
        other => panic!("expected UncoercibleType, got {:?}", other),
    }
}

#[test]
fn test_schema_metadata_is_preserved() {
    let contract = events_contract(true);
    let input = shuffled_events();
    let metadata = HashMap::from([("source".to_string(), "ehr".to_string())]);
    let schema = Arc::new(input.schema_ref().as_ref().clone().with_metadata(metadata.clone()));
    let input = input.with_schema(schema).unwrap();

    let aligned = contract.align(&input).unwrap();
    assert_eq!(aligned.schema_ref().metadata(), &metadata);
}

#[test]
fn test_export_is_deterministic() {
    let contract = events_with_value();
    let first = contract.to_json_schema_string();
    let second = contract.to_json_schema_string();
    assert_eq!(first, second);

    let rebuilt = events_with_value();
    assert_eq!(first, rebuilt.to_json_schema_string());

    assert_eq!(
        contract.to_json_schema(),
        &json!({
            "type": "object",
            "properties": {
                "subject_id": {"type": "integer"},
                "time": {"type": "string", "format": "date-time"},
                "code": {"type": "string"},
                "numeric_value": {"type": "number"}
            },
            "required": ["subject_id", "time", "code"],
            "additionalProperties": true
        })
    );
}

#[test]
fn test_unmapped_type_fails_at_build() {
    let err = SchemaContract::builder("m")
        .column(ColumnDescriptor::required(
            "m",
            DataType::Map(
                Arc::new(Field::new(
                    "entries",
                    DataType::Struct(
                        vec![
                            Field::new("key", DataType::Utf8, false),
                            Field::new("value", DataType::Int64, true),
                        ]
                        .into(),
                    ),
                    false,
                )),
                false,
            ),
        ))
        .build()
        .unwrap_err();
    assert!(matches!(err, ContractError::UnsupportedSemanticType { .. }));
}

#[test]
fn test_constants_match_declaration() {
    let contract = events_with_value();
    let names: Vec<&str> = contract.constants().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, contract.column_names());
    assert_eq!(contract.constant("time").unwrap().dtype, ts());
    assert_eq!(contract.constant("numeric_value").unwrap().dtype, DataType::Float32);
}

#[test]
fn test_declared_contract_end_to_end() {
    let contract = SchemaContract::from_json_str(
        r#"{
            "name": "events",
            "allow_extra_columns": false,
            "columns": [
                {"name": "subject_id", "dtype": "int64", "nullable": false},
                {"name": "time", "dtype": "timestamp[us]"},
                {"name": "code", "dtype": "string", "nullable": false},
                {"name": "numeric_value", "dtype": "float32", "optional": true}
            ]
        }"#,
    )
    .unwrap();

    let input = shuffled_events().project(&[0, 1, 2]).unwrap();
    let aligned = contract.align(&input).unwrap();
    assert_eq!(
        field_names(&aligned),
        vec!["subject_id", "time", "code", "numeric_value"]
    );
    contract.validate(&aligned).unwrap();
}
