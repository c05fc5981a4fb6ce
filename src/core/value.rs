// Host-side values held by the handle table, and the UTF-16 text type used across the boundary.
use std::fmt;

use serde_json::{Number, Value};

use crate::core::error::{Error, ErrorKind};

/// Host-native string: raw UTF-16 code units, unpaired surrogates included.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Utf16Text(Vec<u16>);

impl Utf16Text {
    pub fn from_units(units: impl Into<Vec<u16>>) -> Self {
        Self(units.into())
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    pub fn into_units(self) -> Vec<u16> {
        self.0
    }

    /// Length in code units, which is the count written to the heap header.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    pub fn to_string_strict(&self) -> Result<String, Error> {
        String::from_utf16(&self.0).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("text contains unpaired surrogates")
                .with_source(err)
        })
    }
}

impl From<&str> for Utf16Text {
    fn from(s: &str) -> Self {
        Self(s.encode_utf16().collect())
    }
}

impl From<String> for Utf16Text {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl fmt::Display for Utf16Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// A host object referenced from the sandbox through a handle.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum HostValue {
    #[default]
    Undefined,
    Bool(bool),
    Number(f64),
    Text(Utf16Text),
    List(Vec<HostValue>),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Bool(_) => "bool",
            HostValue::Number(_) => "number",
            HostValue::Text(_) => "text",
            HostValue::List(_) => "list",
        }
    }

    pub fn as_text(&self) -> Option<&Utf16Text> {
        match self {
            HostValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            HostValue::Undefined => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            HostValue::Text(text) => Value::String(text.to_string_lossy()),
            HostValue::List(items) => Value::Array(items.iter().map(HostValue::to_json).collect()),
        }
    }

    pub fn from_json(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(HostValue::Undefined),
            Value::Bool(b) => Ok(HostValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(HostValue::Number).ok_or_else(|| {
                Error::new(ErrorKind::Usage).with_message("number is not representable as f64")
            }),
            Value::String(s) => Ok(HostValue::Text(Utf16Text::from(s.as_str()))),
            Value::Array(items) => items
                .iter()
                .map(HostValue::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(HostValue::List),
            Value::Object(_) => Err(Error::new(ErrorKind::Usage)
                .with_message("objects are not supported as host values")
                .with_hint("Use null, bool, number, string, or array.")),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

macro_rules! host_value_from_numeric {
    ( $( $type:ty ),+ ) => {
        $(
            impl From<$type> for HostValue {
                fn from(v: $type) -> Self {
                    HostValue::Number(v as f64)
                }
            }
        )+
    };
}

host_value_from_numeric!(isize, usize, i32, u32, i16, u16, i8, u8, f32, f64);

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Text(Utf16Text::from(s))
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Text(Utf16Text::from(s))
    }
}

impl From<Utf16Text> for HostValue {
    fn from(text: Utf16Text) -> Self {
        HostValue::Text(text)
    }
}

impl<T> From<Vec<T>> for HostValue
where
    HostValue: From<T>,
{
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(HostValue::from).collect())
    }
}

fn type_mismatch(expected: &str, value: &HostValue) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!(
        "expected {expected}, found {}",
        value.type_name()
    ))
}

impl TryFrom<&HostValue> for f64 {
    type Error = Error;

    fn try_from(value: &HostValue) -> Result<Self, Self::Error> {
        match value {
            HostValue::Number(n) => Ok(*n),
            other => Err(type_mismatch("number", other)),
        }
    }
}

impl TryFrom<&HostValue> for bool {
    type Error = Error;

    fn try_from(value: &HostValue) -> Result<Self, Self::Error> {
        match value {
            HostValue::Bool(b) => Ok(*b),
            HostValue::Number(n) => Ok(*n != 0.0),
            other => Err(type_mismatch("bool", other)),
        }
    }
}

impl TryFrom<&HostValue> for String {
    type Error = Error;

    fn try_from(value: &HostValue) -> Result<Self, Self::Error> {
        match value {
            HostValue::Text(text) => Ok(text.to_string_lossy()),
            other => Err(type_mismatch("text", other)),
        }
    }
}
