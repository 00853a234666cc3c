//! System prompt rendering.
//!
//! A system prompt is a template with `{variable}` placeholders, resolved
//! against the variables of the [`ExecutionContext`]. Dotted names such as
//! `{user.name}` walk into nested JSON. Placeholders without a matching
//! variable are left as written.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::pipeline::{PipelineRunner, RuntimeHandlers, events};

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}").ok());

/// Payload of `agent.system_prompt.before_build` and `after_build`.
///
/// Before the build `prompt` is the raw template with sections appended;
/// after the build it is the rendered text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPromptPayload {
    /// Key of the agent being prompted.
    pub agent: String,
    /// Template or rendered prompt.
    pub prompt: String,
    /// Variables available to placeholders.
    pub variables: Map<String, Value>,
    /// Execution metadata.
    pub metadata: Map<String, Value>,
}

/// Renders agent system prompts, with optional extra sections.
///
/// ```rust,ignore
/// let prompt = SystemPromptBuilder::new()
///     .add_section("Tone", "Friendly and brief.")
///     .render_template("You help {user.name}.", &variables);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SystemPromptBuilder {
    sections: Vec<(String, String)>,
}

impl SystemPromptBuilder {
    /// Create a builder with no sections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section rendered as `## {title}` after the base prompt.
    /// A section with the same title is replaced in place.
    #[must_use]
    pub fn add_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        let content = content.into();
        match self.sections.iter_mut().find(|(t, _)| *t == title) {
            Some(existing) => existing.1 = content,
            None => self.sections.push((title, content)),
        }
        self
    }

    /// Drop a section.
    #[must_use]
    pub fn remove_section(mut self, title: &str) -> Self {
        self.sections.retain(|(t, _)| t != title);
        self
    }

    /// Whether a section with `title` exists.
    #[must_use]
    pub fn has_section(&self, title: &str) -> bool {
        self.sections.iter().any(|(t, _)| t == title)
    }

    /// Section titles in order.
    #[must_use]
    pub fn section_titles(&self) -> Vec<&str> {
        self.sections.iter().map(|(t, _)| t.as_str()).collect()
    }

    /// The base template followed by every section.
    #[must_use]
    pub fn template(&self, base: &str) -> String {
        let mut out = base.to_owned();
        for (title, content) in &self.sections {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("## ");
            out.push_str(title);
            out.push('\n');
            out.push_str(content);
        }
        out
    }

    /// Interpolate `template` with `variables`, sections included.
    #[must_use]
    pub fn render_template(&self, template: &str, variables: &Map<String, Value>) -> String {
        interpolate(&self.template(template), variables)
    }

    /// Render the system prompt for `agent`, running the build pipelines.
    pub(crate) async fn build(
        &self,
        runner: &PipelineRunner,
        runtime: &RuntimeHandlers,
        agent: &str,
        template: &str,
        context: &ExecutionContext,
    ) -> Result<String> {
        let payload = SystemPromptPayload {
            agent: agent.to_owned(),
            prompt: self.template(template),
            variables: context.variables().clone(),
            metadata: context.metadata().clone(),
        };
        let mut payload = runner
            .run_with(events::AGENT_SYSTEM_PROMPT_BEFORE_BUILD, payload, runtime)
            .await?;

        payload.prompt = interpolate(&payload.prompt, &payload.variables);
        trace!(agent, chars = payload.prompt.len(), "system prompt rendered");

        let payload = runner
            .run_with(events::AGENT_SYSTEM_PROMPT_AFTER_BUILD, payload, runtime)
            .await?;
        Ok(payload.prompt)
    }
}

/// Replace `{name}` placeholders with values from `variables`.
#[must_use]
pub fn interpolate(template: &str, variables: &Map<String, Value>) -> String {
    let Some(pattern) = PLACEHOLDER.as_ref() else {
        return template.to_owned();
    };
    pattern
        .replace_all(template, |caps: &Captures<'_>| {
            lookup(variables, &caps[1]).map_or_else(|| caps[0].to_owned(), display)
        })
        .into_owned()
}

fn lookup<'a>(variables: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = variables.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::pipeline::{PipelineRegistry, handler_fn};

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    mod interpolation {
        use super::*;

        #[test]
        fn replaces_known_and_keeps_unknown() {
            let out = interpolate(
                "Hello {name}, you have {count} items. {missing} stays.",
                &vars(json!({"name": "Ada", "count": 3})),
            );
            assert_eq!(out, "Hello Ada, you have 3 items. {missing} stays.");
        }

        #[test]
        fn dotted_keys_walk_nested_values() {
            let variables = vars(json!({
                "user": {"name": "Grace", "roles": ["admin", "dev"]},
                "flat.key": "direct"
            }));
            assert_eq!(
                interpolate("{user.name} / {user.roles.1} / {flat.key} / {user.age}", &variables),
                "Grace / dev / direct / {user.age}"
            );
        }

        #[test]
        fn non_placeholders_are_untouched() {
            let out = interpolate(r#"Reply as {"json": true} or { }"#, &Map::new());
            assert_eq!(out, r#"Reply as {"json": true} or { }"#);
        }

        #[test]
        fn null_renders_empty() {
            assert_eq!(interpolate("[{v}]", &vars(json!({"v": null}))), "[]");
        }
    }

    mod sections {
        use super::*;

        #[test]
        fn sections_follow_the_base_prompt() {
            let builder = SystemPromptBuilder::new()
                .add_section("Tone", "Be brief.")
                .add_section("Rules", "Never guess {topic}.");
            let out = builder.render_template("You are helpful.", &vars(json!({"topic": "prices"})));
            assert_eq!(
                out,
                "You are helpful.\n\n## Tone\nBe brief.\n\n## Rules\nNever guess prices."
            );
        }

        #[test]
        fn same_title_replaces_and_remove_drops() {
            let builder = SystemPromptBuilder::new()
                .add_section("Tone", "a")
                .add_section("Extra", "b")
                .add_section("Tone", "c");
            assert_eq!(builder.section_titles(), vec!["Tone", "Extra"]);
            assert!(builder.template("").starts_with("## Tone\nc"));

            let builder = builder.remove_section("Tone");
            assert!(!builder.has_section("Tone"));
        }
    }

    mod pipelines {
        use super::*;

        #[tokio::test]
        async fn build_runs_before_and_after_handlers() {
            let registry = Arc::new(PipelineRegistry::new());
            registry.register(
                events::AGENT_SYSTEM_PROMPT_BEFORE_BUILD,
                handler_fn(|mut p: SystemPromptPayload| {
                    p.variables.insert("name".into(), json!("Injected"));
                    Ok(p)
                }),
                0,
            );
            registry.register(
                events::AGENT_SYSTEM_PROMPT_AFTER_BUILD,
                handler_fn(|mut p: SystemPromptPayload| {
                    p.prompt.push_str(" [checked]");
                    Ok(p)
                }),
                0,
            );
            let runner = PipelineRunner::new(registry);

            let prompt = SystemPromptBuilder::new()
                .build(
                    &runner,
                    &RuntimeHandlers::new(),
                    "support",
                    "Hi {name}",
                    &ExecutionContext::new(),
                )
                .await
                .unwrap();
            assert_eq!(prompt, "Hi Injected [checked]");
        }
    }
}
