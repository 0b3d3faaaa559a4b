//! System prompts built from the profile templates.

use std::sync::LazyLock;
use blockmind_commands::render_inventory;
use blockmind_config::ProfileConfig;
use blockmind_core::error::WorldError;
use blockmind_core::turn::{Turn, stringify_turns};
use blockmind_core::world::World;
use regex_lite::Regex;
use tracing::warn;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[A-Z_]+").expect("placeholder pattern is valid"));

/// Fills `$PLACEHOLDERS` in the profile's prompt templates.
#[derive(Debug, Clone)]
pub struct Prompter {
    profile: ProfileConfig,
    command_docs: String,
}

impl Prompter {
    pub fn new(profile: ProfileConfig, command_docs: impl Into<String>) -> Self {
        Self {
            profile,
            command_docs: command_docs.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.profile.name
    }

    /// System prompt for a conversation turn.
    pub async fn conversing(&self, world: &dyn World, goal: Option<&str>) -> Result<String, WorldError> {
        let template = &self.profile.conversing;
        let mut prompt = self.fill_static(template);

        if template.contains("$STATS") {
            prompt = prompt.replace("$STATS", &world.stats().await?);
        }
        if template.contains("$INVENTORY") {
            let inventory = world.inventory().await?;
            prompt = prompt.replace("$INVENTORY", &render_inventory(&inventory));
        }
        if template.contains("$SELF_PROMPT") {
            let goal = goal
                .map(|g| format!("YOUR CURRENT ASSIGNED GOAL: \"{g}\"\n"))
                .unwrap_or_default();
            prompt = prompt.replace("$SELF_PROMPT", &goal);
        }

        Ok(checked(prompt))
    }

    /// System prompt for the request that summarizes `turns`.
    pub fn saving_memory(&self, turns: &[Turn]) -> String {
        let template = &self.profile.saving_memory;
        let mut prompt = self.fill_static(template);
        if template.contains("$TO_SUMMARIZE") {
            prompt = prompt.replace("$TO_SUMMARIZE", &stringify_turns(turns));
        }
        checked(prompt)
    }

    /// The user-turn text of a self-prompt turn.
    pub fn self_prompt_message(&self, goal: &str) -> String {
        let prompt = self.fill_static(&self.profile.self_prompt).replace("$SELF_PROMPT", goal);
        checked(prompt)
    }

    fn fill_static(&self, template: &str) -> String {
        let mut prompt = template.to_string();
        if template.contains("$NAME") {
            prompt = prompt.replace("$NAME", &self.profile.name);
        }
        if template.contains("$COMMAND_DOCS") {
            prompt = prompt.replace("$COMMAND_DOCS", &self.command_docs);
        }
        prompt
    }
}

fn checked(prompt: String) -> String {
    let leftover: Vec<&str> = PLACEHOLDER.find_iter(&prompt).map(|m| m.as_str()).collect();
    if !leftover.is_empty() {
        warn!(placeholders = ?leftover, "Unknown prompt placeholders");
    }
    prompt
}
