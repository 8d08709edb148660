//! Chain type checking.
//!
//! The whole chain is validated before any step runs, so a rejected chain has
//! no side effects.

use crate::{
    binder::BoundArguments,
    definition::CommandDefinition,
    error::CommandError,
    registry::RegisteredCommand,
    value::TypeTag,
};

#[derive(Debug, Clone)]
/// One resolved, bound, executable chain step.
pub struct CommandConfig {
    pub command: RegisteredCommand,
    pub entity_id: Option<String>,
    pub arguments: BoundArguments,
}

impl CommandConfig {
    pub fn definition(&self) -> &CommandDefinition {
        &self.command.definition
    }
}

/// True iff `from`'s output type equals `to`'s input type. No widening.
pub fn is_compatible(from: &CommandDefinition, to: &CommandDefinition) -> bool {
    from.output_type == to.input_type
}

/// Validates a chain of configured steps. See [`validate_definitions`].
pub fn validate_chain(
    chain: &[CommandConfig],
    seed: Option<TypeTag>,
    max_length: usize,
) -> Result<(), CommandError> {
    let definitions = chain
        .iter()
        .map(CommandConfig::definition)
        .collect::<Vec<_>>();
    validate_definitions(&definitions, seed, max_length)
}

/// Checks chain length, the first step's input requirement against `seed` (the
/// type of the data the chain starts with), and every adjacent pair.
///
/// A step whose predecessor produces nothing fails with
/// [`CommandError::MissingInput`]; other mismatches fail with
/// [`CommandError::IncompatibleChain`].
pub fn validate_definitions(
    definitions: &[&CommandDefinition],
    seed: Option<TypeTag>,
    max_length: usize,
) -> Result<(), CommandError> {
    if definitions.len() > max_length {
        return Err(CommandError::ChainTooLong {
            length: definitions.len(),
            max: max_length,
        });
    }

    if let Some(first) = definitions.first() {
        if first.require_input && seed != Some(first.input_type) {
            return Err(CommandError::InputRequired {
                command: first.name.clone(),
            });
        }
    }

    for pair in definitions.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if is_compatible(from, to) {
            continue;
        }
        if from.output_type == TypeTag::Empty {
            return Err(CommandError::MissingInput {
                command: to.name.clone(),
                previous: from.name.clone(),
            });
        }
        return Err(CommandError::IncompatibleChain {
            from: from.name.clone(),
            output: from.output_type,
            to: to.name.clone(),
            input: to.input_type,
        });
    }
    Ok(())
}

/// Whether the step at `index` receives its default key from the predecessor.
pub fn is_piped(definitions: &[&CommandDefinition], index: usize) -> bool {
    index > 0 && definitions[index].input_type.is_value()
}
