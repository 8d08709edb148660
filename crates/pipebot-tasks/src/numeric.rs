use anyhow::{Context, Result};
use async_trait::async_trait;
use pipebot_command::{
    ArgumentSpec, BoundArguments, CommandDefinition, CommandTask, TaskContext, TaskData,
    TaskOutput, TypeTag, UserFacingError, Value,
};

/// `add`: integer arithmetic with a long offset.
pub struct AddTask;

impl AddTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("add", TypeTag::Integer, TypeTag::Integer)
            .with_description("Adds an amount to a whole number.")
            .with_default_argument(ArgumentSpec::required("value", TypeTag::Integer))
            .with_argument(
                ArgumentSpec::optional("amount", TypeTag::Long).with_default(Value::Long(1)),
            )
    }
}

#[async_trait]
impl CommandTask for AddTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let value = arguments
            .integer("value")
            .context("argument 'value' is not bound")?;
        let amount = arguments.integer("amount").unwrap_or(1);
        let sum = value
            .checked_add(amount)
            .and_then(|sum| i32::try_from(sum).ok())
            .ok_or_else(|| UserFacingError::new("The result does not fit in a whole number."))?;
        Ok(TaskOutput::value(Value::Integer(sum)))
    }
}
