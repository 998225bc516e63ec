//! JSON Schema export.
//!
//! The dtype mapping is total over the supported set: a type without a
//! mapping fails contract construction with
//! [`ContractError::UnsupportedSemanticType`] instead of falling back to
//! `string`.

use arrow::datatypes::DataType;
use flexschema_types::dtype_name;
use serde_json::{json, Map, Value};

use crate::column::ColumnDescriptor;
use crate::error::ContractError;

/// The JSON Schema property for a dtype, or `None` when it has no mapping.
pub fn property_for(dtype: &DataType) -> Option<Value> {
    use DataType as D;

    let mut prop = Map::new();
    let (json_type, format) = match dtype {
        D::Null => ("null", None),
        D::Boolean => ("boolean", None),
        D::Int8 | D::Int16 | D::Int32 | D::Int64 => ("integer", None),
        D::UInt8 | D::UInt16 | D::UInt32 | D::UInt64 => ("integer", None),
        D::Float16 | D::Float32 | D::Float64 => ("number", None),
        D::Decimal128(_, _) | D::Decimal256(_, _) => ("number", None),
        D::Utf8 | D::LargeUtf8 => ("string", None),
        D::Binary | D::LargeBinary | D::FixedSizeBinary(_) => {
            prop.insert("contentEncoding".to_string(), json!("base64"));
            ("string", None)
        }
        D::Date32 | D::Date64 => ("string", Some("date")),
        D::Timestamp(_, _) => ("string", Some("date-time")),
        D::Time32(_) | D::Time64(_) => ("string", Some("time")),
        D::Duration(_) => ("string", Some("duration")),
        D::List(item) | D::LargeList(item) | D::FixedSizeList(item, _) => {
            prop.insert("items".to_string(), property_for(item.data_type())?);
            ("array", None)
        }
        D::Struct(fields) => {
            let mut properties = Map::new();
            for field in fields.iter() {
                properties.insert(field.name().clone(), property_for(field.data_type())?);
            }
            prop.insert("properties".to_string(), Value::Object(properties));
            ("object", None)
        }
        D::Dictionary(_, value) => return property_for(value),
        _ => return None,
    };

    prop.insert("type".to_string(), json!(json_type));
    if let Some(format) = format {
        prop.insert("format".to_string(), json!(format));
    }
    Some(Value::Object(prop))
}

/// Build the document for a contract's columns.
pub(crate) fn contract_document(
    columns: &[ColumnDescriptor],
    allow_extra_columns: bool,
) -> Result<Value, ContractError> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for col in columns {
        let mut prop =
            property_for(col.dtype()).ok_or_else(|| ContractError::UnsupportedSemanticType {
                column: col.name().to_string(),
                dtype: dtype_name(col.dtype()),
            })?;
        if let (Some(description), Value::Object(map)) = (col.description(), &mut prop) {
            map.insert("description".to_string(), json!(description));
        }
        properties.insert(col.name().to_string(), prop);

        if col.is_required() {
            required.push(json!(col.name()));
        }
    }

    Ok(json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": allow_extra_columns,
    }))
}
