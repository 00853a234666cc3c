//! Integration tests for atlas.

#![allow(clippy::unwrap_used, clippy::panic, clippy::clone_on_ref_ptr)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use atlas::pipeline::events::{self, ProxyStage};
use atlas::prelude::*;
use atlas::proxy::{ProxyMethod, ProxyModule, ProxyOutput};
use atlas::tool::ToolExecution;
use serde::Deserialize;
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Deserialize)]
struct ForecastArgs {
    city: String,
}

/// Reports a fixed forecast.
#[derive(Debug, Clone, Copy, Default)]
struct Forecast;

#[async_trait]
impl Tool for Forecast {
    const NAME: &'static str = "forecast";
    type Args = ForecastArgs;
    type Output = serde_json::Value;
    type Error = ToolError;

    fn description(&self) -> String {
        "Get the forecast for a city".to_string()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "city": { "type": "string", "description": "City name" }
            },
            "required": ["city"]
        })
    }

    async fn call(&self, args: Self::Args, _ctx: &ToolContext) -> std::result::Result<Self::Output, Self::Error> {
        Ok(json!({ "city": args.city, "sky": "clear" }))
    }
}

/// Records the payload labels it sees.
#[derive(Debug, Clone, Default)]
struct Audit {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Audit {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineHandler<AgentExecution> for Audit {
    async fn handle(&self, data: AgentExecution, next: Next<'_, AgentExecution>) -> Result<AgentExecution> {
        let stage = if data.response.is_some() { "after" } else { "before" };
        self.seen.lock().unwrap().push(format!("{stage}:{}", data.agent));
        next.run(data).await
    }
}

#[async_trait]
impl PipelineHandler<ToolExecution> for Audit {
    async fn handle(&self, data: ToolExecution, next: Next<'_, ToolExecution>) -> Result<ToolExecution> {
        let data = next.run(data).await?;
        self.seen.lock().unwrap().push(format!("tool:{}", data.tool));
        Ok(data)
    }
}

fn weather_atlas(config: &str) -> Atlas {
    let config = AtlasConfig::from_toml_str(config).unwrap();
    Atlas::builder()
        .config(config)
        .agent(
            Agent::new("weather")
                .description("Answers weather questions")
                .system_prompt("You are a forecaster for {user.name} in {user.city}.")
                .tool("forecast"),
        )
        .tool(Forecast)
        .build()
        .unwrap()
}

#[tokio::test]
async fn agent_round_trip_with_tools_and_hooks() {
    init_tracing();
    let atlas = weather_atlas(
        r#"
        default_provider = "openai"
        default_model = "gpt-4o"
        "#,
    );
    let fake = atlas.fake().sequence(
        FakeResponseSequence::new()
            .then(FakeResponse::tool_call("forecast", json!({ "city": "Oslo" })))
            .then(FakeResponse::text("Clear skies in Oslo.")),
    );

    let audit = Audit::default();
    atlas.pipelines().register::<AgentExecution, _>(events::AGENT_BEFORE_EXECUTE, audit.clone(), 0);
    atlas.pipelines().register::<AgentExecution, _>(events::AGENT_AFTER_EXECUTE, audit.clone(), 0);
    atlas.pipelines().register::<ToolExecution, _>(events::TOOL_AFTER_EXECUTE, audit.clone(), 0);

    let response = atlas
        .agent("weather")
        .unwrap()
        .with_variables(
            json!({ "user": { "name": "Ada", "city": "Oslo" } })
                .as_object()
                .cloned()
                .unwrap(),
        )
        .chat("Will it rain?")
        .await
        .unwrap();

    assert_eq!(response.text(), "Clear skies in Oslo.");
    assert_eq!(response.steps, 2);
    assert_eq!(response.tool_calls[0].name, "forecast");
    assert_eq!(response.tool_calls[0].result.to_text(), r#"{"city":"Oslo","sky":"clear"}"#);
    assert_eq!(audit.seen(), ["before:weather", "tool:forecast", "after:weather"]);

    fake.assert_called_times(2);
    fake.assert_agent_called("weather");
    fake.assert_sent(|request| request.model() == "gpt-4o");
    let first = &fake.recorded()[0];
    assert_eq!(first.system_prompt(), Some("You are a forecaster for Ada in Oslo."));
    assert_eq!(first.prompt(), Some("Will it rain?"));
}

#[tokio::test]
async fn step_limit_returns_the_last_response() {
    let atlas = weather_atlas(
        r"
        [agents]
        max_steps = 2
        ",
    );
    let fake = atlas.fake().sequence(
        FakeResponseSequence::new()
            .then(FakeResponse::tool_call("forecast", json!({ "city": "Rome" })))
            .repeat_last(),
    );

    let response = atlas.agent("weather").unwrap().chat("Loop forever").await.unwrap();
    assert_eq!(response.steps, 2);
    assert!(response.hit_step_limit());
    assert_eq!(response.tool_calls.len(), 1);
    fake.assert_called_times(2);
}

#[tokio::test]
async fn conditional_handlers_only_touch_matching_agents() {
    let atlas = weather_atlas("");
    let _fake = atlas.fake().respond_with(FakeResponse::text("ok"));

    atlas.pipelines().register(
        events::AGENT_AFTER_EXECUTE,
        handler_fn(|mut data: AgentExecution| {
            if let Some(response) = data.response.as_mut() {
                response.text = Some("rewritten".to_owned());
            }
            Ok(data)
        })
        .when(|data: &AgentExecution| data.agent == "weather"),
        10,
    );

    let weather = atlas.agent("weather").unwrap().chat("hi").await.unwrap();
    let other = atlas.agent_with(Agent::new("other")).chat("hi").await.unwrap();
    assert_eq!(weather.text(), "rewritten");
    assert_eq!(other.text(), "ok");
}

#[tokio::test]
async fn text_proxy_hooks_and_disabled_pipelines() {
    let atlas = weather_atlas(
        r#"
        [pipelines]
        disabled = ["text.after_text"]
        "#,
    );
    let fake = atlas.fake().respond_with(FakeResponse::text("plain"));

    atlas.pipelines().register(
        events::proxy_event(ProxyModule::Text, ProxyStage::Before, ProxyMethod::Text),
        handler_fn(|mut data: ProxyRequest| {
            data.request.system_prompt = Some("Be terse.".to_owned());
            Ok(data)
        }),
        0,
    );
    atlas.pipelines().register(
        events::proxy_event(ProxyModule::Text, ProxyStage::After, ProxyMethod::Text),
        handler_fn(|mut data: ProxyResponse| {
            if let ProxyOutput::Text(text) = &mut data.output {
                text.text = "never".to_owned();
            }
            Ok(data)
        }),
        0,
    );

    let response = tokio_test::assert_ok!(
        atlas
            .text()
            .using("openai", "gpt-4o-mini")
            .with_prompt("Summarise the Odyssey")
            .as_text()
            .await
    );

    assert_eq!(response.text, "plain");
    let recorded = fake.recorded();
    assert_eq!(recorded[0].model(), "gpt-4o-mini");
    assert_eq!(recorded[0].system_prompt(), Some("Be terse."));
}

#[tokio::test]
async fn structured_and_embedding_proxies() {
    let atlas = Atlas::default();
    let fake = atlas
        .fake()
        .respond_with(FakeResponse::structured(json!({ "title": "Odyssey", "year": -700 })));

    let book = atlas
        .structured()
        .with_schema(
            Schema::object("book", "A book")
                .string("title", "Title")
                .integer("year", "Year written"),
        )
        .with_prompt("Name an epic")
        .as_structured()
        .await
        .unwrap();
    assert_eq!(book.structured["title"], "Odyssey");

    let vectors = atlas
        .embeddings()
        .with_input(["alpha", "beta"])
        .with_dimensions(3)
        .as_embeddings()
        .await
        .unwrap();
    assert_eq!(vectors.embeddings, vec![vec![0.0; 3], vec![0.0; 3]]);
    fake.assert_called_times(2);
}

#[tokio::test]
async fn provider_failures_reach_the_caller() {
    let atlas = weather_atlas("");
    let fake = atlas
        .fake()
        .respond_with(FakeResponse::error(ProviderError::rate_limited("fake")));

    let err = atlas.agent("weather").unwrap().chat("hi").await.unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
    assert!(err.is_retryable());
    fake.assert_called();
}
