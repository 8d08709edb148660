//! Binds raw argument text to a command's typed argument schema.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    definition::{ArgumentSpec, CommandDefinition},
    error::CommandError,
    raw_parser::RawCommand,
    value::{coerce_value, Value},
};

#[derive(Debug, Clone, Default, PartialEq)]
/// Typed arguments of one invocation.
pub struct BoundArguments {
    values: BTreeMap<String, Value>,
    /// Keys supplied by the user rather than filled from defaults.
    explicit: BTreeSet<String>,
    /// Positional text not consumed by a default key.
    default_argument: String,
}

impl BoundArguments {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn choice(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_enum).map(|(_, name)| name)
    }

    /// Positional text left over when the command declares no default key.
    pub fn default_argument(&self) -> &str {
        &self.default_argument
    }

    pub fn is_explicit(&self, key: &str) -> bool {
        self.explicit.contains(key)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Substitutes a predecessor's output for the default key.
    ///
    /// Text the user typed for the default key takes precedence over the piped
    /// value. Commands without a default key ignore piped values.
    pub fn apply_piped_value(
        &mut self,
        definition: &CommandDefinition,
        piped: &Value,
    ) -> Result<(), CommandError> {
        let Some(spec) = definition.default_argument_spec() else {
            return Ok(());
        };
        if self.explicit.contains(&spec.key) {
            return Ok(());
        }
        let rendered = piped.render();
        let value = coerce_value(&rendered, spec.tag, &spec.choices).ok_or_else(|| {
            CommandError::InvalidArgument {
                command: definition.name.clone(),
                key: spec.key.clone(),
                value: rendered.clone(),
                expected: spec.tag,
            }
        })?;
        self.values.insert(spec.key.clone(), value);
        Ok(())
    }
}

/// Binds `raw` against `definition`.
///
/// When `piped` is true the default key may be left unbound: the predecessor's
/// output fills it at execution time.
pub fn bind_arguments(
    raw: &RawCommand,
    definition: &CommandDefinition,
    piped: bool,
) -> Result<BoundArguments, CommandError> {
    for key in raw.named_arguments.keys() {
        if definition.argument(key).is_none() {
            tracing::debug!(
                command = %definition.name,
                key = %key,
                "ignoring undeclared named argument"
            );
        }
    }

    let default_key = definition.default_key.as_deref();
    let mut bound = BoundArguments::default();
    let mut default_consumed = false;

    for spec in &definition.arguments {
        let is_default_key = default_key == Some(spec.key.as_str());
        let source = match raw.named_arguments.get(&spec.key) {
            Some(text) => Some(text.as_str()),
            None if is_default_key && !raw.default_argument.is_empty() => {
                default_consumed = true;
                Some(raw.default_argument.as_str())
            }
            None => None,
        };

        let supplied = match source {
            Some(text) => coerce_argument(definition, spec, text)?,
            None => None,
        };
        if supplied.is_some() {
            bound.explicit.insert(spec.key.clone());
        }

        match supplied.or_else(|| spec.default.clone()) {
            Some(value) => {
                bound.values.insert(spec.key.clone(), value);
            }
            None if spec.required && !(is_default_key && piped) => {
                return Err(CommandError::MissingArgument {
                    command: definition.name.clone(),
                    key: spec.key.clone(),
                });
            }
            None => {}
        }
    }

    if !default_consumed {
        bound.default_argument = raw.default_argument.clone();
    }
    Ok(bound)
}

fn coerce_argument(
    definition: &CommandDefinition,
    spec: &ArgumentSpec,
    text: &str,
) -> Result<Option<Value>, CommandError> {
    match coerce_value(text, spec.tag, &spec.choices) {
        Some(value) => Ok(Some(value)),
        None if spec.required => Err(CommandError::InvalidArgument {
            command: definition.name.clone(),
            key: spec.key.clone(),
            value: text.to_string(),
            expected: spec.tag,
        }),
        None => {
            tracing::debug!(
                command = %definition.name,
                key = %spec.key,
                value = %text,
                expected = %spec.tag,
                "discarding unparseable optional argument"
            );
            Ok(None)
        }
    }
}
