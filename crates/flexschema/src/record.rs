//! Single-row records checked against a contract.

use flexschema_types::NullPattern;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::contract::SchemaContract;
use crate::error::{ValidationError, ValidationMode, Violation};

/// One record: declared columns in declaration order, then extras.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row as a JSON object, omitting null values.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl SchemaContract {
    /// Check a record against this contract.
    ///
    /// Absent optional columns take their default (or null). Values are not
    /// type-checked; a row is a presence and null check only.
    pub fn row(&self, mut record: Map<String, Value>) -> Result<Row, ValidationError> {
        let mut violations = Vec::new();
        let mut values = Vec::with_capacity(record.len().max(self.columns().len()));

        for col in self.columns() {
            let value = match record.remove(col.name()) {
                Some(value) => value,
                None if col.is_required() => {
                    violations.push(Violation::MissingRequiredColumn {
                        column: col.name().to_string(),
                    });
                    continue;
                }
                None => col.default_value().cloned().unwrap_or(Value::Null),
            };

            let observed = if value.is_null() {
                NullPattern::AllNulls
            } else {
                NullPattern::NoNulls
            };
            if !col.nullability().admits(observed) {
                violations.push(Violation::NullabilityViolation {
                    column: col.name().to_string(),
                    declared: col.nullability(),
                    observed,
                });
            }
            values.push((col.name().to_string(), value));
        }

        for (key, value) in record {
            if self.allow_extra_columns() {
                values.push((key, value));
            } else {
                violations.push(Violation::UnexpectedExtraColumn { column: key });
            }
        }

        if !violations.is_empty() {
            return Err(ValidationError::new(self.name(), ValidationMode::Row, violations));
        }
        Ok(Row { values })
    }
}
