//! Closed type tags and the tagged `Value` union bound to arguments and piped
//! between chain steps.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates the shapes of data an argument holds or a chain step emits.
pub enum TypeTag {
    /// No data. As an output type, nothing flows to the next step.
    Empty,
    Text,
    Integer,
    Long,
    Double,
    Boolean,
    Enum,
    /// An ordered set of temporary files.
    Files,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "nothing",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Double => "number",
            Self::Boolean => "boolean",
            Self::Enum => "choice",
            Self::Files => "files",
        }
    }

    /// Returns true for tags carried by [`Value`].
    pub fn is_value(self) -> bool {
        !matches!(self, Self::Empty | Self::Files)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Typed argument or piped value.
pub enum Value {
    Text(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Enum { index: usize, name: String },
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Text(_) => TypeTag::Text,
            Self::Integer(_) => TypeTag::Integer,
            Self::Long(_) => TypeTag::Long,
            Self::Double(_) => TypeTag::Double,
            Self::Boolean(_) => TypeTag::Boolean,
            Self::Enum { .. } => TypeTag::Enum,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Integer view of `Integer` and `Long` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(i64::from(*value)),
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// Floating view of any numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Integer(value) => Some(f64::from(*value)),
            Self::Long(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Ordinal and symbolic name of an `Enum` value.
    pub fn as_enum(&self) -> Option<(usize, &str)> {
        match self {
            Self::Enum { index, name } => Some((*index, name)),
            _ => None,
        }
    }

    /// Canonical textual form; feeding it back through [`coerce_value`] with the
    /// same tag yields an equal value.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Long(value) => value.to_string(),
            Self::Double(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::Enum { name, .. } => name.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Converts raw argument text into a value of type `tag`.
///
/// Returns `None` when the text is not a valid `tag` literal. Booleans accept the
/// exact tokens `true` and `false`; an empty string (a bare flag) is `true`.
/// Enums accept an ordinal into `choices` or a case-insensitive choice name.
pub fn coerce_value(raw: &str, tag: TypeTag, choices: &[String]) -> Option<Value> {
    match tag {
        TypeTag::Text => Some(Value::Text(raw.to_string())),
        TypeTag::Integer => raw.trim().parse::<i32>().ok().map(Value::Integer),
        TypeTag::Long => raw.trim().parse::<i64>().ok().map(Value::Long),
        TypeTag::Double => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Double),
        TypeTag::Boolean => match raw.trim() {
            "" | "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },
        TypeTag::Enum => {
            let token = raw.trim();
            if let Ok(index) = token.parse::<usize>() {
                return choices.get(index).map(|name| Value::Enum {
                    index,
                    name: name.clone(),
                });
            }
            choices
                .iter()
                .position(|choice| choice.eq_ignore_ascii_case(token))
                .map(|index| Value::Enum {
                    index,
                    name: choices[index].clone(),
                })
        }
        TypeTag::Empty | TypeTag::Files => None,
    }
}
