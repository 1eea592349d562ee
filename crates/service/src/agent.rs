//! Script generation agent
//!
//! The agent turns a URL and a natural-language request into an action
//! script. The Anthropic implementation forces a single tool call whose input
//! is the script, then runs it through the schema validator like any other
//! client-supplied script.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use momos_common::{
    ActionScript, Error, GenerateRequest, GenerateResponse, Result, MAX_SLEEP_MS, SUPPORTED_VERSION,
};

use crate::config::AgentConfig;

const API_VERSION: &str = "2023-06-01";
const TOOL_NAME: &str = "submit_script";
const WEB_FETCH_TOOL: &str = "web_fetch_20250910";
const WEB_FETCH_BETA: &str = "web-fetch-2025-09-10";
/// Resends allowed when a server tool pauses the turn
const MAX_CONTINUATIONS: usize = 3;

/// Produces action scripts from natural-language requests
#[async_trait]
pub trait GenerationAgent: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}

/// Check a request before it reaches the model.
pub fn validate_request(request: &GenerateRequest) -> Result<()> {
    let url = Url::parse(&request.url)
        .map_err(|e| Error::InvalidRequest(format!("url: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidRequest("url: must be an absolute URL".to_string()));
    }
    if request.prompt.trim().is_empty() {
        return Err(Error::InvalidRequest("prompt: must not be empty".to_string()));
    }
    Ok(())
}

const SYSTEM_PROMPT: &str = "\
You write browser checks for uptime monitoring and synthetic testing.

Given a website URL and a description of what to verify, produce an action \
script that a headless Chromium replays step by step. A screenshot is taken \
after every action.

Available actions:
- goto: navigate to an absolute URL. The first action should normally be a \
goto to the provided URL.
- click: click the first element matching a Playwright selector. Prefer \
stable selectors: data-testid, aria labels, visible text (e.g. \
`text=Sign in`), then CSS.
- sleep: wait for a number of milliseconds. Use it sparingly, after actions \
that trigger slow page updates.

When the web_fetch tool is available, fetch the page first and pick \
selectors that actually appear in it.

Keep scripts short and focused on the requested flow. Dismiss cookie banners \
only when they would block a later click.

Always answer by calling the submit_script tool. Put a one or two sentence \
summary of what the script does, and any assumptions you made, in `message`.";

/// Tool input schema: `{message, script}`
pub fn tool_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": "Short explanation of the script for the user"
            },
            "script": {
                "type": "object",
                "properties": {
                    "version": { "type": "string", "enum": [SUPPORTED_VERSION] },
                    "actions": {
                        "type": "array",
                        "items": {
                            "oneOf": [
                                {
                                    "type": "object",
                                    "properties": {
                                        "type": { "const": "goto" },
                                        "url": { "type": "string" }
                                    },
                                    "required": ["type", "url"]
                                },
                                {
                                    "type": "object",
                                    "properties": {
                                        "type": { "const": "click" },
                                        "selector": { "type": "string" }
                                    },
                                    "required": ["type", "selector"]
                                },
                                {
                                    "type": "object",
                                    "properties": {
                                        "type": { "const": "sleep" },
                                        "milliseconds": { "type": "integer", "minimum": 0, "maximum": MAX_SLEEP_MS }
                                    },
                                    "required": ["type", "milliseconds"]
                                }
                            ]
                        }
                    }
                },
                "required": ["version", "actions"]
            }
        },
        "required": ["message", "script"]
    })
}

/// Tools offered to the model. The page fetcher runs on the API side; only
/// `submit_script` comes back to us.
pub fn tools(config: &AgentConfig) -> Vec<Value> {
    let mut tools = vec![json!({
        "name": TOOL_NAME,
        "description": "Submit the generated action script",
        "input_schema": tool_input_schema(),
    })];
    if config.web_fetch {
        tools.push(json!({
            "type": WEB_FETCH_TOOL,
            "name": "web_fetch",
            "max_uses": config.web_fetch_max_uses,
        }));
    }
    tools
}

/// Forcing `submit_script` would rule out fetching the page first, so with
/// the fetcher enabled any tool is accepted.
pub fn tool_choice(config: &AgentConfig) -> Value {
    if config.web_fetch {
        json!({ "type": "any" })
    } else {
        json!({ "type": "tool", "name": TOOL_NAME })
    }
}

/// User turn for a request, including the script being revised if any.
pub fn user_prompt(request: &GenerateRequest) -> String {
    let mut prompt = format!("URL - {}\n{}", request.url, request.prompt);
    if let Some(previous) = &request.previous_script {
        prompt.push_str(
            "\n\nRevise this existing script according to the request above. \
             Keep the steps that still apply.\n",
        );
        prompt.push_str(&previous.to_value().to_string());
    }
    prompt
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ApiMessage],
    tools: &'a [Value],
    tool_choice: Value,
}

/// One conversation turn; `content` is a string or a list of blocks
#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse { name: String, input: Value },
    #[serde(other)]
    Other,
}

/// Pull `{message, script}` out of a Messages API response body.
pub fn parse_tool_response(body: &Value) -> Result<GenerateResponse> {
    let response: ApiResponse = serde_json::from_value(body.clone())
        .map_err(|e| Error::Generation(format!("unexpected response: {}", e)))?;

    let input = response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == TOOL_NAME => Some(input),
            _ => None,
        })
        .ok_or_else(|| Error::Generation("model did not call the script tool".to_string()))?;

    let message = input
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let script_value = input
        .get("script")
        .ok_or_else(|| Error::Generation("tool input has no script".to_string()))?;
    let script = ActionScript::from_value(script_value)
        .map_err(|e| Error::Generation(format!("model produced an invalid script: {}", e)))?;

    Ok(GenerateResponse { message, script })
}

/// Generation agent backed by the Anthropic Messages API
pub struct AnthropicAgent {
    client: reqwest::Client,
    config: AgentConfig,
    api_key: String,
}

impl AnthropicAgent {
    pub fn new(config: AgentConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    /// Read the API key from the configured environment variable.
    pub fn from_env(config: AgentConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::InvalidConfig(format!("{} is not set", config.api_key_env)))?;
        Ok(Self::new(config, api_key))
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one Messages API request and return the decoded body.
    async fn send(&self, messages: &[ApiMessage], tools: &[Value]) -> Result<Value> {
        let api_request = ApiRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: SYSTEM_PROMPT,
            messages,
            tools,
            tool_choice: tool_choice(&self.config),
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);
        if self.config.web_fetch {
            builder = builder.header("anthropic-beta", WEB_FETCH_BETA);
        }

        let response = builder
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        if !status.is_success() {
            let message = api_error_message(&text);
            warn!("Model API returned {}: {}", status, message);
            return Err(Error::Generation(format!("{}: {}", status, message)));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Generation(format!("undecodable response: {}", e)))
    }
}

/// `error.message` of an API error body, or the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

fn paused(body: &Value) -> bool {
    body["stop_reason"].as_str() == Some("pause_turn")
}

#[async_trait]
impl GenerationAgent for AnthropicAgent {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        validate_request(request)?;

        let offered = tools(&self.config);
        let mut messages = vec![ApiMessage {
            role: "user",
            content: Value::String(user_prompt(request)),
        }];

        debug!("Requesting script from {}", self.config.model);
        let mut body = self.send(&messages, &offered).await?;
        for _ in 0..MAX_CONTINUATIONS {
            if !paused(&body) {
                break;
            }
            debug!("Model paused after a server tool call, resuming");
            messages.push(ApiMessage {
                role: "assistant",
                content: body["content"].clone(),
            });
            body = self.send(&messages, &offered).await?;
        }

        parse_tool_response(&body)
    }
}

/// Stand-in used when no model is configured; every request fails.
pub struct DisabledAgent {
    reason: String,
}

impl DisabledAgent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl GenerationAgent for DisabledAgent {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        validate_request(request)?;
        Err(Error::Generation(format!("generation disabled: {}", self.reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momos_common::Action;
    use test_case::test_case;

    fn request(url: &str, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            url: url.into(),
            prompt: prompt.into(),
            previous_script: None,
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&request("https://example.com", "check the homepage")).is_ok());
    }

    #[test_case("example.com" ; "relative")]
    #[test_case("mailto:ops@example.com" ; "not a base")]
    #[test_case("" ; "empty")]
    fn test_rejects_bad_url(url: &str) {
        assert!(matches!(
            validate_request(&request(url, "check")),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_rejects_blank_prompt() {
        assert!(matches!(
            validate_request(&request("https://example.com", "  \n")),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_user_prompt_includes_previous_script() {
        let mut req = request("https://example.com", "also open pricing");
        assert_eq!(user_prompt(&req), "URL - https://example.com\nalso open pricing");

        req.previous_script = Some(ActionScript::new(vec![Action::Goto {
            url: "https://example.com".into(),
        }]));
        let prompt = user_prompt(&req);
        assert!(prompt.contains("Revise this existing script"));
        assert!(prompt.contains(r#""type":"goto""#));
    }

    #[test]
    fn test_parse_tool_response() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "content": [
                { "type": "text", "text": "Here you go." },
                {
                    "type": "tool_use",
                    "id": "toolu_01",
                    "name": "submit_script",
                    "input": {
                        "message": "Opens the homepage and clicks Sign in.",
                        "script": {
                            "version": "1.0.0",
                            "actions": [
                                { "type": "goto", "url": "https://example.com" },
                                { "type": "click", "selector": "text=Sign in" }
                            ]
                        }
                    }
                }
            ],
            "stop_reason": "tool_use"
        });

        let response = parse_tool_response(&body).unwrap();
        assert_eq!(response.message, "Opens the homepage and clicks Sign in.");
        assert_eq!(response.script.actions.len(), 2);
    }

    #[test]
    fn test_parse_rejects_invalid_script() {
        let body = json!({
            "content": [{
                "type": "tool_use",
                "id": "toolu_01",
                "name": "submit_script",
                "input": {
                    "message": "",
                    "script": { "version": "1.0.0", "actions": [{ "type": "hover", "selector": "a" }] }
                }
            }]
        });
        assert!(matches!(parse_tool_response(&body), Err(Error::Generation(_))));
    }

    #[test]
    fn test_parse_requires_tool_call() {
        let body = json!({ "content": [{ "type": "text", "text": "I cannot help." }] });
        assert!(matches!(parse_tool_response(&body), Err(Error::Generation(_))));
    }

    #[test]
    fn test_schema_pins_version() {
        let schema = tool_input_schema();
        assert_eq!(
            schema["properties"]["script"]["properties"]["version"]["enum"][0],
            SUPPORTED_VERSION
        );
    }

    #[test]
    fn test_tool_choice_follows_web_fetch() {
        let mut config = AgentConfig::default();
        assert_eq!(tool_choice(&config), json!({ "type": "any" }));
        assert_eq!(tools(&config)[1]["type"], WEB_FETCH_TOOL);

        config.web_fetch = false;
        assert_eq!(tool_choice(&config), json!({ "type": "tool", "name": TOOL_NAME }));
        assert_eq!(tools(&config).len(), 1);
    }

    mod http_tests {
        use super::*;
        use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

        fn agent(server: &MockServer, web_fetch: bool) -> AnthropicAgent {
            let config = AgentConfig {
                base_url: server.uri(),
                web_fetch,
                ..Default::default()
            };
            AnthropicAgent::new(config, "test-key")
        }

        fn tool_use_body() -> Value {
            json!({
                "id": "msg_01",
                "type": "message",
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": "toolu_01",
                    "name": "submit_script",
                    "input": {
                        "message": "Opens the pricing page.",
                        "script": {
                            "version": "1.0.0",
                            "actions": [
                                { "type": "goto", "url": "https://example.com" },
                                { "type": "click", "selector": "text=Pricing" }
                            ]
                        }
                    }
                }],
                "stop_reason": "tool_use"
            })
        }

        fn generation_error(result: Result<GenerateResponse>) -> String {
            match result {
                Err(Error::Generation(message)) => message,
                other => panic!("expected a generation error, got {:?}", other.map(|r| r.message)),
            }
        }

        #[tokio::test]
        async fn test_generate_success() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .and(matchers::path("/v1/messages"))
                .and(matchers::header("x-api-key", "test-key"))
                .and(matchers::header("anthropic-version", API_VERSION))
                .and(matchers::body_partial_json(json!({
                    "model": "claude-opus-4-5",
                    "tool_choice": { "type": "tool", "name": "submit_script" },
                    "messages": [{ "role": "user", "content": "URL - https://example.com\nopen pricing" }]
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
                .expect(1)
                .mount(&server)
                .await;

            let response = agent(&server, false)
                .generate(&request("https://example.com", "open pricing"))
                .await
                .unwrap();
            assert_eq!(response.message, "Opens the pricing page.");
            assert_eq!(response.script.actions.len(), 2);
        }

        #[tokio::test]
        async fn test_api_error_message_is_reported() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "type": "error",
                    "error": { "type": "invalid_request_error", "message": "max_tokens: too large" }
                })))
                .mount(&server)
                .await;

            let message = generation_error(
                agent(&server, false)
                    .generate(&request("https://example.com", "check"))
                    .await,
            );
            assert!(message.contains("400"));
            assert!(message.contains("max_tokens: too large"));
        }

        #[tokio::test]
        async fn test_plain_text_error_body() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(529).set_body_string("overloaded\n"))
                .mount(&server)
                .await;

            let message = generation_error(
                agent(&server, false)
                    .generate(&request("https://example.com", "check"))
                    .await,
            );
            assert!(message.ends_with(": overloaded"));
        }

        #[tokio::test]
        async fn test_undecodable_body() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
                .mount(&server)
                .await;

            let message = generation_error(
                agent(&server, false)
                    .generate(&request("https://example.com", "check"))
                    .await,
            );
            assert!(message.starts_with("undecodable response"));
        }

        #[tokio::test]
        async fn test_missing_tool_call() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "content": [{ "type": "text", "text": "I cannot browse that site." }],
                    "stop_reason": "end_turn"
                })))
                .mount(&server)
                .await;

            let message = generation_error(
                agent(&server, false)
                    .generate(&request("https://example.com", "check"))
                    .await,
            );
            assert_eq!(message, "model did not call the script tool");
        }

        #[tokio::test]
        async fn test_invalid_request_never_calls_api() {
            let server = MockServer::start().await;
            Mock::given(matchers::any())
                .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
                .expect(0)
                .mount(&server)
                .await;

            let result = agent(&server, false).generate(&request("example.com", "check")).await;
            assert!(matches!(result, Err(Error::InvalidRequest(_))));
        }

        #[tokio::test]
        async fn test_web_fetch_pause_is_resumed() {
            let server = MockServer::start().await;
            let paused = json!({
                "content": [{
                    "type": "server_tool_use",
                    "id": "srvtoolu_01",
                    "name": "web_fetch",
                    "input": { "url": "https://example.com" }
                }],
                "stop_reason": "pause_turn"
            });
            Mock::given(matchers::method("POST"))
                .and(matchers::header("anthropic-beta", WEB_FETCH_BETA))
                .and(matchers::body_partial_json(json!({ "tool_choice": { "type": "any" } })))
                .respond_with(ResponseTemplate::new(200).set_body_json(paused))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(matchers::method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
                .mount(&server)
                .await;

            let response = agent(&server, true)
                .generate(&request("https://example.com", "open pricing"))
                .await
                .unwrap();
            assert_eq!(response.script.actions.len(), 2);

            let requests = server.received_requests().await.unwrap();
            assert_eq!(requests.len(), 2);
            let resumed: Value = requests[1].body_json().unwrap();
            let messages = resumed["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[1]["role"], "assistant");
            assert_eq!(messages[1]["content"][0]["type"], "server_tool_use");
            assert_eq!(resumed["tools"][1]["name"], "web_fetch");
        }
    }
}
