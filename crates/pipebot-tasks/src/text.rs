//! Text transformers: `echo`, `upper`, `reverse`, `case`, `repeat`, `length`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pipebot_command::{
    ArgumentSpec, BoundArguments, CommandDefinition, CommandTask, TaskContext, TaskData,
    TaskOutput, TypeTag, UserFacingError, Value,
};

const MAX_REPEAT_TIMES: i64 = 100;
const CASE_MODES: [&str; 3] = ["upper", "lower", "title"];

pub(crate) fn text_argument() -> ArgumentSpec {
    ArgumentSpec::required("text", TypeTag::Text).with_description("text to work on")
}

pub(crate) fn bound_text<'a>(arguments: &'a BoundArguments, key: &str) -> Result<&'a str> {
    arguments
        .text(key)
        .with_context(|| format!("argument '{key}' is not bound"))
}

pub struct EchoTask;

impl EchoTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("echo", TypeTag::Empty, TypeTag::Text)
            .with_description("Replies with the given text.")
            .with_default_argument(text_argument())
    }
}

#[async_trait]
impl CommandTask for EchoTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        Ok(TaskOutput::text(bound_text(&arguments, "text")?).suppressing_embeds())
    }
}

pub struct UpperTask;

impl UpperTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("upper", TypeTag::Text, TypeTag::Text)
            .with_description("Upper-cases text.")
            .with_default_argument(text_argument())
    }
}

#[async_trait]
impl CommandTask for UpperTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        Ok(TaskOutput::text(bound_text(&arguments, "text")?.to_uppercase()))
    }
}

pub struct ReverseTask;

impl ReverseTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("reverse", TypeTag::Text, TypeTag::Text)
            .with_description("Reverses text character by character.")
            .with_default_argument(text_argument())
    }
}

#[async_trait]
impl CommandTask for ReverseTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let reversed = bound_text(&arguments, "text")?.chars().rev().collect::<String>();
        Ok(TaskOutput::text(reversed))
    }
}

pub struct CaseTask;

impl CaseTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("case", TypeTag::Text, TypeTag::Text)
            .with_description("Changes the case of text.")
            .with_default_argument(text_argument())
            .with_argument(
                ArgumentSpec::optional("mode", TypeTag::Enum)
                    .with_choices(CASE_MODES)
                    .with_default(Value::Enum {
                        index: 0,
                        name: CASE_MODES[0].to_string(),
                    })
                    .with_description("upper, lower or title"),
            )
    }
}

#[async_trait]
impl CommandTask for CaseTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let text = bound_text(&arguments, "text")?;
        let converted = match arguments.choice("mode").unwrap_or(CASE_MODES[0]) {
            "lower" => text.to_lowercase(),
            "title" => title_case(text),
            _ => text.to_uppercase(),
        };
        Ok(TaskOutput::text(converted))
    }
}

fn title_case(text: &str) -> String {
    let mut converted = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            at_word_start = true;
            converted.push(ch);
        } else if at_word_start {
            at_word_start = false;
            converted.extend(ch.to_uppercase());
        } else {
            converted.extend(ch.to_lowercase());
        }
    }
    converted
}

pub struct RepeatTask;

impl RepeatTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("repeat", TypeTag::Text, TypeTag::Text)
            .with_description("Repeats text.")
            .with_default_argument(text_argument())
            .with_argument(
                ArgumentSpec::optional("times", TypeTag::Integer)
                    .with_default(Value::Integer(2))
                    .with_description("number of copies, 1 to 100"),
            )
            .with_argument(
                ArgumentSpec::optional("separator", TypeTag::Text)
                    .with_default(Value::Text(" ".to_string())),
            )
    }
}

#[async_trait]
impl CommandTask for RepeatTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let text = bound_text(&arguments, "text")?;
        let times = arguments.integer("times").unwrap_or(2);
        if !(1..=MAX_REPEAT_TIMES).contains(&times) {
            return Err(UserFacingError::new(format!(
                "`times` must be between 1 and {MAX_REPEAT_TIMES}."
            ))
            .into());
        }
        let separator = arguments.text("separator").unwrap_or(" ");
        let repeated = vec![text; times as usize].join(separator);
        Ok(TaskOutput::text(repeated))
    }
}

pub struct LengthTask;

impl LengthTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("length", TypeTag::Text, TypeTag::Integer)
            .with_description("Counts the characters of text.")
            .with_default_argument(text_argument())
    }
}

#[async_trait]
impl CommandTask for LengthTask {
    async fn run(
        &self,
        _context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let count = bound_text(&arguments, "text")?.chars().count();
        let count = i32::try_from(count)
            .map_err(|_| UserFacingError::new("That text is too long to count."))?;
        Ok(TaskOutput::value(Value::Integer(count)))
    }
}
