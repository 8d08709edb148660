//! Canonical re-serialization of a bound invocation.
//!
//! The typed form of an invocation re-parses and re-binds to the same values,
//! which lets logs and help output show exactly what a command ran with.

use crate::{
    binder::BoundArguments,
    definition::CommandDefinition,
    raw_parser::{GrammarConfig, ENTITY_SEPARATOR},
};

/// Renders `arguments` as command text for `definition`.
///
/// The default key is written positionally, other bound values follow as named
/// arguments in declaration order.
pub fn typed_form(
    grammar: GrammarConfig,
    definition: &CommandDefinition,
    entity_id: Option<&str>,
    arguments: &BoundArguments,
) -> String {
    let mut rendered = format!("{}{}", grammar.prefix, definition.name);
    if let Some(entity_id) = entity_id {
        rendered.push(ENTITY_SEPARATOR);
        rendered.push_str(entity_id);
    }

    let default_value = definition
        .default_key
        .as_deref()
        .and_then(|key| arguments.get(key).map(|value| (key, value.render())));
    // An empty default value has no positional spelling; it is written as a bare
    // named flag instead.
    let positional_key = default_value
        .as_ref()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, _)| *key);
    let positional = match (&default_value, positional_key) {
        (Some((_, value)), Some(_)) => value.clone(),
        (Some(_), None) => String::new(),
        (None, _) => arguments.default_argument().to_string(),
    };
    if !positional.is_empty() {
        rendered.push(' ');
        rendered.push_str(&positional);
    }

    for spec in &definition.arguments {
        if Some(spec.key.as_str()) == positional_key {
            continue;
        }
        if default_value.is_none() && definition.default_key.as_deref() == Some(spec.key.as_str())
        {
            continue;
        }
        let Some(value) = arguments.get(&spec.key) else {
            continue;
        };
        rendered.push(' ');
        rendered.push(grammar.named_prefix);
        rendered.push_str(&spec.key);
        let value = value.render();
        if !value.is_empty() {
            rendered.push(' ');
            rendered.push_str(&value);
        }
    }
    rendered
}
