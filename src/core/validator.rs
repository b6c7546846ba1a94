//! LZ-003: Schema validation of raw documents.
//!
//! Walks a `serde_yaml_ng::Value` against an [`ObjectSchema`] and collects
//! every violation. Types must match exactly: a quoted `"true"` is a string,
//! `1.0` is not an integer.

use super::error::{ValidationError, ValidationErrorKind};
use super::schema::{FieldType, ObjectSchema};
use serde_yaml_ng::Value;

const MAX_SHOWN_CHARS: usize = 40;

/// Validate a document against a schema. Returns every error found.
pub fn validate(document: &Value, schema: &ObjectSchema) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_object(document, schema, "", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

fn mismatch(path: &str, expected: impl Into<String>, actual: &Value) -> ValidationError {
    ValidationError::new(
        display_path(path),
        ValidationErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: describe(actual),
        },
    )
}

/// Human-readable description of a value, for error messages.
pub fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => {
            if s.chars().count() > MAX_SHOWN_CHARS {
                let head: String = s.chars().take(MAX_SHOWN_CHARS).collect();
                format!("string \"{}...\"", head)
            } else {
                format!("string \"{}\"", s)
            }
        }
        Value::Sequence(seq) => format!("sequence of {} item(s)", seq.len()),
        Value::Mapping(_) => "mapping".to_string(),
        Value::Tagged(t) => format!("tagged value {}", t.tag),
    }
}

fn check_object(value: &Value, schema: &ObjectSchema, path: &str, errors: &mut Vec<ValidationError>) {
    let map = match value {
        Value::Mapping(m) => m,
        other => {
            errors.push(mismatch(path, "mapping", other));
            return;
        }
    };

    for (key, field_value) in map {
        let Some(name) = key.as_str() else {
            errors.push(mismatch(path, "string key", key));
            continue;
        };
        let field_path = join_path(path, name);
        match schema.fields.get(name) {
            None => errors.push(ValidationError::new(
                field_path,
                ValidationErrorKind::UnknownField,
            )),
            Some(spec) => {
                // Optional fields are nullable
                if field_value.is_null() && !spec.required {
                    continue;
                }
                check_value(field_value, &spec.field_type, &field_path, errors);
            }
        }
    }

    for (name, spec) in &schema.fields {
        if spec.required && map.get(name.as_str()).is_none() {
            errors.push(ValidationError::new(
                join_path(path, name),
                ValidationErrorKind::MissingField,
            ));
        }
    }
}

fn check_value(value: &Value, field_type: &FieldType, path: &str, errors: &mut Vec<ValidationError>) {
    match field_type {
        FieldType::String => {
            if !value.is_string() {
                errors.push(mismatch(path, "string", value));
            }
        }
        FieldType::NonEmptyString => match value.as_str() {
            Some(s) if s.trim().is_empty() => errors.push(ValidationError::new(
                path,
                ValidationErrorKind::EmptyString,
            )),
            Some(_) => {}
            None => errors.push(mismatch(path, "non-empty string", value)),
        },
        FieldType::Integer { min, max } => check_integer(value, *min, *max, path, errors),
        FieldType::Boolean => {
            if !value.is_bool() {
                errors.push(mismatch(path, "boolean", value));
            }
        }
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => {}
            Some(s) => errors.push(ValidationError::new(
                path,
                ValidationErrorKind::NotInEnum {
                    value: s.to_string(),
                    allowed: allowed.clone(),
                },
            )),
            None => errors.push(mismatch(path, "string", value)),
        },
        FieldType::Array(inner) => match value.as_sequence() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_value(item, inner, &format!("{}[{}]", path, i), errors);
                }
            }
            None => errors.push(mismatch(path, "sequence", value)),
        },
        FieldType::Map(inner) => match value.as_mapping() {
            Some(map) => {
                for (key, item) in map {
                    match key.as_str() {
                        Some(k) => check_value(item, inner, &join_path(path, k), errors),
                        None => errors.push(mismatch(path, "string key", key)),
                    }
                }
            }
            None => errors.push(mismatch(path, "mapping", value)),
        },
        FieldType::Object(schema) => check_object(value, schema, path, errors),
    }
}

fn check_integer(value: &Value, min: i64, max: i64, path: &str, errors: &mut Vec<ValidationError>) {
    let n = match value {
        Value::Number(n) if n.is_f64() => None,
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    match n {
        Some(n) if n < min || n > max => errors.push(ValidationError::new(
            path,
            ValidationErrorKind::OutOfRange { value: n, min, max },
        )),
        Some(_) => {}
        None => errors.push(mismatch(path, "integer", value)),
    }
}
