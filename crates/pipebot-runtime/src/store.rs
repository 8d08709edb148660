//! Persistence seam for bans and user-defined command templates.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// A stored command body invoked by name, e.g. `%intro:42`.
pub struct CommandTemplate {
    pub name: String,
    /// Guild or entity the template belongs to; `None` for global templates.
    #[serde(default)]
    pub scope_id: Option<String>,
    /// Command text; `{input}` is replaced by the invocation's positional text.
    pub body: String,
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    async fn is_banned(&self, author_id: &str, guild_id: Option<&str>) -> Result<bool>;

    /// Looks up a template by name within `scope_id`, falling back to global templates.
    async fn find_template(
        &self,
        name: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<CommandTemplate>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCommandStore {
    banned_users: HashSet<String>,
    banned_guilds: HashSet<String>,
    templates: Vec<CommandTemplate>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_banned_user(mut self, user_id: impl Into<String>) -> Self {
        self.banned_users.insert(user_id.into());
        self
    }

    pub fn with_banned_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.banned_guilds.insert(guild_id.into());
        self
    }

    pub fn with_template(mut self, template: CommandTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }
}

#[async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn is_banned(&self, author_id: &str, guild_id: Option<&str>) -> Result<bool> {
        if self.banned_users.contains(author_id) {
            return Ok(true);
        }
        Ok(guild_id.is_some_and(|guild_id| self.banned_guilds.contains(guild_id)))
    }

    async fn find_template(
        &self,
        name: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<CommandTemplate>> {
        let scoped = scope_id.and_then(|scope_id| {
            self.templates.iter().find(|template| {
                template.name == name && template.scope_id.as_deref() == Some(scope_id)
            })
        });
        let found = scoped.or_else(|| {
            self.templates
                .iter()
                .find(|template| template.name == name && template.scope_id.is_none())
        });
        Ok(found.cloned())
    }
}
