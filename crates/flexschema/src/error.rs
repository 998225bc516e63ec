//! Error types for contract construction, validation, and alignment.
//!
//! Validation never stops at the first problem: every violation found in an
//! input is collected into one [`ValidationError`] so a table can be fixed
//! in a single pass.

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use flexschema_types::{dtype_name, serde_dtype, DTypeError, NullPattern, Nullability};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while declaring or loading a contract.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Contract name cannot be empty")]
    EmptyContractName,
    #[error("Contract '{0}' has a column with empty name")]
    EmptyColumnName(String),
    #[error("Contract '{0}' has duplicate column '{1}'")]
    DuplicateColumn(String, String),
    #[error("Required column '{0}' cannot have a default value")]
    RequiredWithDefault(String),
    #[error("Default for column '{column}' is not a valid {dtype}: {reason}")]
    InvalidDefault {
        column: String,
        dtype: String,
        reason: String,
    },
    #[error("Column '{column}' has type {dtype}, which has no JSON Schema mapping")]
    UnsupportedSemanticType { column: String, dtype: String },
    #[error("Column '{column}' has type {dtype}, which cannot be written back as a declaration")]
    UndeclarableType { column: String, dtype: String },
    #[error("Invalid dtype for column '{column}': {source}")]
    InvalidDType {
        column: String,
        #[source]
        source: DTypeError,
    },
    #[error("Invalid contract declaration: {0}")]
    Declaration(String),
}

/// The category of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A REQUIRED column is absent from the input
    MissingRequiredColumn,

    /// An undeclared column appeared in an input to a closed contract
    UnexpectedExtraColumn,

    /// A column's type is neither the declared type nor safely widenable to it
    TypeMismatch,

    /// A column's null pattern exceeds its declared nullability class
    NullabilityViolation,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::MissingRequiredColumn => write!(f, "Missing required column"),
            ViolationKind::UnexpectedExtraColumn => write!(f, "Unexpected extra column"),
            ViolationKind::TypeMismatch => write!(f, "Type mismatch"),
            ViolationKind::NullabilityViolation => write!(f, "Nullability violation"),
        }
    }
}

/// A single way in which an input fails to conform to a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingRequiredColumn {
        column: String,
    },
    UnexpectedExtraColumn {
        column: String,
    },
    TypeMismatch {
        column: String,
        #[serde(with = "serde_dtype")]
        expected: DataType,
        #[serde(with = "serde_dtype")]
        observed: DataType,
    },
    NullabilityViolation {
        column: String,
        declared: Nullability,
        observed: NullPattern,
    },
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::MissingRequiredColumn { .. } => ViolationKind::MissingRequiredColumn,
            Violation::UnexpectedExtraColumn { .. } => ViolationKind::UnexpectedExtraColumn,
            Violation::TypeMismatch { .. } => ViolationKind::TypeMismatch,
            Violation::NullabilityViolation { .. } => ViolationKind::NullabilityViolation,
        }
    }

    /// Name of the offending column.
    pub fn column(&self) -> &str {
        match self {
            Violation::MissingRequiredColumn { column }
            | Violation::UnexpectedExtraColumn { column }
            | Violation::TypeMismatch { column, .. }
            | Violation::NullabilityViolation { column, .. } => column,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingRequiredColumn { column }
            | Violation::UnexpectedExtraColumn { column } => {
                write!(f, "{}: '{}'", self.kind(), column)
            }
            Violation::TypeMismatch {
                column,
                expected,
                observed,
            } => write!(
                f,
                "{}: '{}' expected {}, got {}",
                self.kind(),
                column,
                dtype_name(expected),
                dtype_name(observed)
            ),
            Violation::NullabilityViolation {
                column,
                declared,
                observed,
            } => write!(
                f,
                "{}: '{}' declared nullability {}, found {}",
                self.kind(),
                column,
                declared,
                observed
            ),
        }
    }
}

/// What kind of input a validation looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Concrete data: presence, types, and null patterns were checked.
    Table,
    /// A bare schema: presence and types only, nullability was not checked.
    SchemaOnly,
    /// A single row record.
    Row,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Table => write!(f, "Table"),
            ValidationMode::SchemaOnly => write!(f, "Schema"),
            ValidationMode::Row => write!(f, "Row"),
        }
    }
}

/// Every violation found while checking one input against one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    contract: String,
    mode: ValidationMode,
    violations: Vec<Violation>,
}

impl ValidationError {
    pub(crate) fn new(
        contract: impl Into<String>,
        mode: ValidationMode,
        violations: Vec<Violation>,
    ) -> Self {
        Self {
            contract: contract.into(),
            mode,
            violations,
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    /// Columns of the given kind, in the order they were reported.
    pub fn columns_of(&self, kind: ViolationKind) -> Vec<&str> {
        self.violations
            .iter()
            .filter(|v| v.kind() == kind)
            .map(Violation::column)
            .collect()
    }

    pub fn missing_required_columns(&self) -> Vec<&str> {
        self.columns_of(ViolationKind::MissingRequiredColumn)
    }

    pub fn unexpected_extra_columns(&self) -> Vec<&str> {
        self.columns_of(ViolationKind::UnexpectedExtraColumn)
    }

    pub fn mistyped_columns(&self) -> Vec<&str> {
        self.columns_of(ViolationKind::TypeMismatch)
    }

    pub fn nullability_violations(&self) -> Vec<&str> {
        self.columns_of(ViolationKind::NullabilityViolation)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} does not conform to contract '{}'",
            self.mode, self.contract
        )?;

        let mut parts = Vec::new();
        let missing = self.missing_required_columns();
        if !missing.is_empty() {
            parts.push(format!("Missing required columns: {}", missing.join(", ")));
        }
        let extra = self.unexpected_extra_columns();
        if !extra.is_empty() {
            parts.push(format!("Disallowed extra columns: {}", extra.join(", ")));
        }
        let mistyped: Vec<String> = self
            .violations
            .iter()
            .filter_map(|v| match v {
                Violation::TypeMismatch {
                    column,
                    expected,
                    observed,
                } => Some(format!(
                    "{} (want {}, got {})",
                    column,
                    dtype_name(expected),
                    dtype_name(observed)
                )),
                _ => None,
            })
            .collect();
        if !mistyped.is_empty() {
            parts.push(format!("Columns with incorrect types: {}", mistyped.join(", ")));
        }
        let nulls: Vec<String> = self
            .violations
            .iter()
            .filter_map(|v| match v {
                Violation::NullabilityViolation {
                    column,
                    declared,
                    observed,
                } => Some(format!("{} (declared {}, found {})", column, declared, observed)),
                _ => None,
            })
            .collect();
        if !nulls.is_empty() {
            parts.push(format!("Columns with disallowed nulls: {}", nulls.join(", ")));
        }

        if !parts.is_empty() {
            write!(f, ": {}", parts.join(". "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised by alignment.
///
/// Alignment either returns a complete table or one of these; it never
/// hands back a partially aligned table.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Column '{column}' could not be coerced from {from_type} to {to_type}: {source}")]
    UncoercibleType {
        column: String,
        from_type: String,
        to_type: String,
        #[source]
        source: ArrowError,
    },
    #[error("Failed to assemble aligned table: {0}")]
    Arrow(#[from] ArrowError),
}

impl AlignError {
    /// The aggregated violations, when the failure was a conformance failure.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            AlignError::Validation(err) => Some(err),
            _ => None,
        }
    }
}
