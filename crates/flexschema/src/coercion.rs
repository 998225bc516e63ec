//! Type compatibility and the safe-widening allow-list.
//!
//! The allow-list is fixed: only the pairs in [`is_safe_widening`] are ever
//! cast without an explicit opt-in. Float to integer, string to numeric,
//! integer narrowing, and timestamp unit changes are never performed under
//! [`CoercionPolicy::SafeOnly`].

use arrow::array::{new_null_array, Array, ArrayRef};
use arrow::compute::{can_cast_types, cast_with_options, CastOptions};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use flexschema_types::same_timezone;
use std::sync::Arc;

/// Which casts alignment is allowed to attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercionPolicy {
    /// Only casts along the safe-widening allow-list.
    #[default]
    SafeOnly,
    /// Also attempt any cast Arrow supports. Values that do not convert
    /// are an error, never silently nulled.
    Permissive,
}

/// How an observed column type relates to a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRelation {
    /// Exactly the declared type.
    Identical,
    /// The same logical type spelled differently (list item field name,
    /// time zone alias). Aligned by a metadata-only cast.
    Equivalent,
    /// A lossless widening from the allow-list.
    SafeWidening,
    /// Anything else.
    Incompatible,
}

impl TypeRelation {
    /// Whether validation accepts a column with this relation.
    pub fn is_compatible(&self) -> bool {
        !matches!(self, TypeRelation::Incompatible)
    }
}

/// Relate an observed type to the declared type.
pub fn classify(observed: &DataType, declared: &DataType) -> TypeRelation {
    if observed == declared {
        TypeRelation::Identical
    } else if types_equivalent(observed, declared) {
        TypeRelation::Equivalent
    } else if is_safe_widening(observed, declared) {
        TypeRelation::SafeWidening
    } else {
        TypeRelation::Incompatible
    }
}

/// Logical equality: lists compare by item type, timestamps by unit and
/// normalized zone.
pub fn types_equivalent(a: &DataType, b: &DataType) -> bool {
    use DataType as D;

    match (a, b) {
        (D::List(x), D::List(y)) | (D::LargeList(x), D::LargeList(y)) => {
            types_equivalent(x.data_type(), y.data_type())
        }
        (D::Timestamp(unit_a, Some(tz_a)), D::Timestamp(unit_b, Some(tz_b))) => {
            unit_a == unit_b && same_timezone(tz_a, tz_b)
        }
        _ => a == b,
    }
}

/// The safe-widening allow-list.
pub fn is_safe_widening(from: &DataType, to: &DataType) -> bool {
    use DataType as D;

    match (from, to) {
        // An all-null column carries no values to lose.
        (D::Null, _) => true,
        (D::Int8, D::Int16 | D::Int32 | D::Int64) => true,
        (D::Int16, D::Int32 | D::Int64) => true,
        (D::Int32, D::Int64) => true,
        (D::UInt8, D::UInt16 | D::UInt32 | D::UInt64 | D::Int16 | D::Int32 | D::Int64) => true,
        (D::UInt16, D::UInt32 | D::UInt64 | D::Int32 | D::Int64) => true,
        (D::UInt32, D::UInt64 | D::Int64) => true,
        (int, D::Float32 | D::Float64) if int.is_integer() => true,
        (D::Float16, D::Float32 | D::Float64) => true,
        (D::Float32, D::Float64) => true,
        (D::Utf8, D::LargeUtf8) => true,
        (D::Binary, D::LargeBinary) => true,
        (D::Date32, D::Date64) => true,
        (D::Decimal128(p1, s1), D::Decimal128(p2, s2)) => {
            s2 >= s1 && (*p2 as i16 - *s2 as i16) >= (*p1 as i16 - *s1 as i16)
        }
        _ => false,
    }
}

/// Whether alignment under `policy` may cast `observed` to `declared`.
pub fn may_coerce(observed: &DataType, declared: &DataType, policy: CoercionPolicy) -> bool {
    match classify(observed, declared) {
        TypeRelation::Incompatible => {
            policy == CoercionPolicy::Permissive && can_cast_types(observed, declared)
        }
        _ => true,
    }
}

/// Cast in checked mode: a value that cannot be represented is an error.
pub(crate) fn checked_cast(array: &ArrayRef, to: &DataType) -> Result<ArrayRef, ArrowError> {
    if array.data_type() == to {
        return Ok(Arc::clone(array));
    }
    if array.data_type() == &DataType::Null {
        return Ok(new_null_array(to, array.len()));
    }
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    cast_with_options(array, to, &options)
}
