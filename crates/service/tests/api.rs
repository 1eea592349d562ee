//! Router tests with a stub agent and an in-memory sandbox

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use momos_common::{
    Action, ActionScript, Frame, GenerateRequest, GenerateResponse, RawExecutionOutput,
    Result,
};
use momos_runner::{BackoffPolicy, Sandbox, SandboxProvider};
use momos_service::agent::{validate_request, DisabledAgent, GenerationAgent};
use momos_service::config::ServiceConfig;
use momos_service::server::{router, AppState};

struct StubAgent;

#[async_trait]
impl GenerationAgent for StubAgent {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        validate_request(request)?;
        let mut actions = request
            .previous_script
            .as_ref()
            .map(|s| s.actions.clone())
            .unwrap_or_default();
        actions.push(Action::Goto {
            url: request.url.clone(),
        });
        Ok(GenerateResponse {
            message: format!("Visits {}", request.url),
            script: ActionScript::new(actions),
        })
    }
}

/// Healthy after `failures` refused health checks; the program prints `stdout`.
struct FakeSandbox {
    failures: Mutex<u32>,
    stdout: String,
    commands: Mutex<Vec<String>>,
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn name(&self) -> &str {
        "fake"
    }

    async fn exec(&self, command: &str) -> Result<RawExecutionOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        if command.starts_with("curl") {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Ok(RawExecutionOutput {
                    exit_code: 7,
                    ..Default::default()
                });
            }
            return Ok(RawExecutionOutput {
                stdout: r#"{"webSocketDebuggerUrl":"ws://localhost:9222/devtools/browser/1"}"#.into(),
                ..Default::default()
            });
        }
        Ok(RawExecutionOutput {
            stdout: self.stdout.clone(),
            stderr: "warning: slow page\n".into(),
            exit_code: 0,
        })
    }

    async fn write_file(&self, _path: &str, _contents: &str) -> Result<()> {
        Ok(())
    }
}

struct FakeProvider(Arc<FakeSandbox>);

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn acquire(&self, _name: &str) -> Result<Arc<dyn Sandbox>> {
        Ok(self.0.clone())
    }
}

fn app_with(sandbox: Arc<FakeSandbox>, agent: Arc<dyn GenerationAgent>) -> axum::Router {
    let mut config = ServiceConfig::default();
    config.sandbox.backoff = BackoffPolicy {
        initial_delay_ms: 1,
        max_attempts: 2,
    };
    let runner = momos_service::build_runner(&config, Arc::new(FakeProvider(sandbox)));
    router(Arc::new(AppState { runner, agent }))
}

fn sandbox(failures: u32, stdout: &str) -> Arc<FakeSandbox> {
    Arc::new(FakeSandbox {
        failures: Mutex::new(failures),
        stdout: stdout.to_string(),
        commands: Mutex::new(Vec::new()),
    })
}

fn app() -> axum::Router {
    app_with(sandbox(0, ""), Arc::new(StubAgent))
}

async fn send(app: axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "service": "momos-service" }));
}

#[tokio::test]
async fn test_generate() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/generate",
        Some(json!({
            "url": "https://example.com",
            "prompt": "open the homepage",
            "previousScript": {
                "version": "1.0.0",
                "actions": [{ "type": "sleep", "milliseconds": 5 }]
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Visits https://example.com");
    assert_eq!(body["script"]["version"], "1.0.0");
    assert_eq!(body["script"]["actions"][0]["type"], "sleep");
    assert_eq!(body["script"]["actions"][1]["url"], "https://example.com");
}

#[tokio::test]
async fn test_generate_rejects_relative_url() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/generate",
        Some(json!({ "url": "example.com", "prompt": "open it" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("url"));
}

#[tokio::test]
async fn test_generation_failure_is_generic() {
    let app = app_with(sandbox(0, ""), Arc::new(DisabledAgent::new("ANTHROPIC_API_KEY is not set")));
    let (status, body) = send(
        app,
        Method::POST,
        "/generate",
        Some(json!({ "url": "https://example.com", "prompt": "open it" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "error": "Failed to generate script" }));
}

#[tokio::test]
async fn test_run_returns_demuxed_result() {
    let trace = json!({
        "startTime": 100,
        "endTime": 350,
        "duration": 250,
        "success": true,
        "error": null,
        "steps": [{
            "index": 0,
            "action": "goto",
            "details": "https://example.com",
            "timestamp": 340,
            "screenshot": "/9j/4AAQ",
            "url": "https://example.com/"
        }]
    });
    let stdout = format!(
        "[page] hello\n{}\n{}\n",
        Frame::Trace.wrap(&trace.to_string()),
        Frame::Spotlight.wrap(r#"[{"envelopeId":"e1","type":"transaction","timestamp":300,"data":{}}]"#)
    );
    let sb = sandbox(1, &stdout);
    let app = app_with(sb.clone(), Arc::new(StubAgent));

    let (status, body) = send(
        app,
        Method::POST,
        "/run",
        Some(json!({
            "script": {
                "version": "1.0.0",
                "actions": [{ "type": "goto", "url": "https://example.com" }]
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exitCode"], 0);
    assert_eq!(body["stdout"], "[page] hello");
    assert_eq!(body["stderr"], "warning: slow page\n");
    assert_eq!(body["trace"]["success"], true);
    assert_eq!(body["trace"]["steps"][0]["action"], "goto");
    assert_eq!(body["spotlight"][0]["type"], "transaction");

    let commands = sb.commands.lock().unwrap().clone();
    assert_eq!(commands.len(), 3, "two health checks then the program");
}

#[tokio::test]
async fn test_run_sandbox_unavailable() {
    let app = app_with(sandbox(5, ""), Arc::new(StubAgent));
    let (status, body) = send(
        app,
        Method::POST,
        "/run",
        Some(json!({ "script": { "version": "1.0.0", "actions": [] } })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_run_rejects_invalid_script() {
    let sb = sandbox(0, "");
    let app = app_with(sb.clone(), Arc::new(StubAgent));
    let (status, body) = send(
        app,
        Method::POST,
        "/run",
        Some(json!({
            "script": {
                "version": "1.0.0",
                "actions": [{ "type": "click" }]
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("actions[0].selector"));
    assert!(sb.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_rejects_unsupported_version() {
    let (status, _) = send(
        app(),
        Method::POST,
        "/run",
        Some(json!({ "script": { "version": "2.0.0", "actions": [] } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_rejects_non_json_body() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/run")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_compile() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/compile",
        Some(json!({
            "script": {
                "version": "1.0.0",
                "actions": [{ "type": "click", "selector": "button[name='go']" }]
            }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let program = body["program"].as_str().unwrap();
    assert!(program.contains(r"await page.click('button[name=\'go\']');"));
    assert!(program.contains("connectOverCDP(CDP_ENDPOINT)"));
}
