//! Tokenizer turning chat text into raw command records.
//!
//! A command starts at the prefix character when it sits at the start of the
//! text or right after whitespace and is immediately followed by a valid name.
//! Everything up to the next such start belongs to the segment. Parsing never
//! fails: malformed prefixes are treated as plain text.

use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEFAULT_COMMAND_PREFIX: char = '%';
pub const DEFAULT_NAMED_ARGUMENT_PREFIX: char = '-';
pub const ENTITY_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Prefix characters of the command grammar.
pub struct GrammarConfig {
    pub prefix: char,
    pub named_prefix: char,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_COMMAND_PREFIX,
            named_prefix: DEFAULT_NAMED_ARGUMENT_PREFIX,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// One command segment as written by the user, before any resolution.
pub struct RawCommand {
    pub name: String,
    /// Scoping id from a `name:id` suffix; never part of `name`.
    pub entity_id: Option<String>,
    pub default_argument: String,
    pub named_arguments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawCommandParser {
    grammar: GrammarConfig,
}

impl RawCommandParser {
    pub fn new(grammar: GrammarConfig) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> GrammarConfig {
        self.grammar
    }

    /// Lazily yields the commands found in `text`, in input order.
    pub fn parse<'a>(&self, text: &'a str) -> RawCommands<'a> {
        RawCommands {
            text,
            cursor: 0,
            grammar: self.grammar,
        }
    }
}

/// Iterator returned by [`RawCommandParser::parse`].
#[derive(Debug, Clone)]
pub struct RawCommands<'a> {
    text: &'a str,
    cursor: usize,
    grammar: GrammarConfig,
}

impl Iterator for RawCommands<'_> {
    type Item = RawCommand;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(start) = find_command_start(self.text, self.cursor, self.grammar.prefix) else {
            self.cursor = self.text.len();
            return None;
        };
        let segment_end = find_command_start(self.text, start.token_end, self.grammar.prefix)
            .map(|next| next.offset)
            .unwrap_or(self.text.len());
        self.cursor = segment_end;

        let (default_argument, named_arguments) = split_segment_arguments(
            &self.text[start.token_end..segment_end],
            self.grammar.named_prefix,
        );
        Some(RawCommand {
            name: start.name.to_string(),
            entity_id: start.entity_id.map(str::to_string),
            default_argument,
            named_arguments,
        })
    }
}

impl std::iter::FusedIterator for RawCommands<'_> {}

struct CommandStart<'a> {
    offset: usize,
    token_end: usize,
    name: &'a str,
    entity_id: Option<&'a str>,
}

fn find_command_start(text: &str, from: usize, prefix: char) -> Option<CommandStart<'_>> {
    for (index, ch) in text[from..].char_indices() {
        if ch != prefix {
            continue;
        }
        let offset = from + index;
        let at_boundary = text[..offset]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        if !at_boundary {
            continue;
        }
        let token_start = offset + ch.len_utf8();
        let token_end = text[token_start..]
            .find(char::is_whitespace)
            .map_or(text.len(), |position| token_start + position);
        if let Some((name, entity_id)) = split_command_token(&text[token_start..token_end]) {
            return Some(CommandStart {
                offset,
                token_end,
                name,
                entity_id,
            });
        }
    }
    None
}

fn split_command_token(token: &str) -> Option<(&str, Option<&str>)> {
    let (name, entity_id) = match token.split_once(ENTITY_SEPARATOR) {
        Some((name, entity_id)) => (name, Some(entity_id).filter(|id| !id.is_empty())),
        None => (token, None),
    };
    is_valid_command_name(name).then_some((name, entity_id))
}

/// Returns true when `name` starts with a letter and continues with letters,
/// digits, or underscores.
pub fn is_valid_command_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => {
            chars.all(|ch| ch.is_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

fn named_argument_key(token: &str, named_prefix: char) -> Option<&str> {
    let key = token.strip_prefix(named_prefix)?;
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() => chars
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-')
            .then_some(key),
        _ => None,
    }
}

fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut token_start = None;
    for (index, ch) in text.char_indices() {
        match (ch.is_whitespace(), token_start) {
            (true, Some(start)) => {
                spans.push((start, index));
                token_start = None;
            }
            (false, None) => token_start = Some(index),
            _ => {}
        }
    }
    if let Some(start) = token_start {
        spans.push((start, text.len()));
    }
    spans
}

fn split_segment_arguments(
    segment: &str,
    named_prefix: char,
) -> (String, BTreeMap<String, String>) {
    let markers = token_spans(segment)
        .into_iter()
        .filter_map(|(start, end)| {
            named_argument_key(&segment[start..end], named_prefix).map(|key| (start, end, key))
        })
        .collect::<Vec<_>>();

    let default_end = markers.first().map_or(segment.len(), |(start, _, _)| *start);
    let default_argument = segment[..default_end].trim().to_string();

    let mut named_arguments = BTreeMap::new();
    for (index, (_, key_end, key)) in markers.iter().enumerate() {
        let value_end = markers
            .get(index + 1)
            .map_or(segment.len(), |(next_start, _, _)| *next_start);
        named_arguments.insert(
            (*key).to_string(),
            segment[*key_end..value_end].trim().to_string(),
        );
    }
    (default_argument, named_arguments)
}
