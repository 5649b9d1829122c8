//! # Parameter schema declared by a backend script.
//!
//! Each script lists its parameters as `[name, type]` pairs where `type` is a
//! small integer from a fixed set. [`ParamType`] is that set; [`Param`] is one
//! validated entry.

use serde_json::{Map, Value};

use crate::error::ProtoError;

/// Declared type of a configuration parameter.
///
/// The numeric codes are part of the script self-description format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Any value.
    Unspec,
    /// JSON array.
    Array,
    /// JSON object.
    Table,
    /// String.
    String,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit signed integer.
    Int32,
    /// 16-bit signed integer.
    Int16,
    /// 8-bit integer, also used for booleans.
    Int8,
    /// Floating point number.
    Double,
}

impl ParamType {
    /// Alias: booleans share the 8-bit integer code.
    pub const BOOL: ParamType = ParamType::Int8;

    /// Maps a schema type code to a [`ParamType`].
    ///
    /// Returns `None` for codes outside the known set.
    pub fn from_code(code: i64) -> Option<Self> {
        let kind = match code {
            0 => ParamType::Unspec,
            1 => ParamType::Array,
            2 => ParamType::Table,
            3 => ParamType::String,
            4 => ParamType::Int64,
            5 => ParamType::Int32,
            6 => ParamType::Int16,
            7 => ParamType::Int8,
            8 => ParamType::Double,
            _ => return None,
        };
        Some(kind)
    }

    /// Returns the schema type code.
    pub fn code(self) -> u8 {
        match self {
            ParamType::Unspec => 0,
            ParamType::Array => 1,
            ParamType::Table => 2,
            ParamType::String => 3,
            ParamType::Int64 => 4,
            ParamType::Int32 => 5,
            ParamType::Int16 => 6,
            ParamType::Int8 => 7,
            ParamType::Double => 8,
        }
    }

    /// Returns `true` if `value` is acceptable for a parameter of this type.
    ///
    /// Integer types are range-checked; `Int8` also accepts booleans.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::Unspec => true,
            ParamType::Array => value.is_array(),
            ParamType::Table => value.is_object(),
            ParamType::String => value.is_string(),
            ParamType::Int64 => value.is_i64(),
            ParamType::Int32 => in_range(value, i32::MIN.into(), i32::MAX.into()),
            ParamType::Int16 => in_range(value, i16::MIN.into(), i16::MAX.into()),
            ParamType::Int8 => {
                value.is_boolean() || in_range(value, i8::MIN.into(), u8::MAX.into())
            }
            ParamType::Double => value.is_number(),
        }
    }
}

fn in_range(value: &Value, min: i64, max: i64) -> bool {
    value.as_i64().is_some_and(|n| (min..=max).contains(&n))
}

/// One declared configuration parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name (unique within a schema).
    pub name: String,
    /// Declared type.
    pub kind: ParamType,
}

impl Param {
    /// Creates a new parameter declaration.
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Checks an attach payload against a schema.
///
/// The payload must be an object; keys declared in the schema must carry a
/// value of the declared type. Keys the schema does not mention pass through.
pub(crate) fn validate_config(
    schema: &[Param],
    config: &Value,
) -> Result<Map<String, Value>, ProtoError> {
    let Some(map) = config.as_object() else {
        return Err(ProtoError::invalid_config("config must be an object"));
    };

    for param in schema {
        if let Some(value) = map.get(&param.name) {
            if !param.kind.matches(value) {
                return Err(ProtoError::invalid_config(format!(
                    "parameter {:?} is not of type {:?}",
                    param.name, param.kind
                )));
            }
        }
    }
    Ok(map.clone())
}
