//! Program assembly
//!
//! Wraps a compiled block in a complete Node program that connects to the
//! sandbox browser over CDP, records a screenshot trace, optionally collects
//! telemetry envelopes posted by the page, and prints both results to stdout
//! between sentinel markers (see [`momos_common::Frame`]).

use serde::{Deserialize, Serialize};
use std::fmt;

use momos_common::Frame;

use crate::compiler::CompiledBlock;
use crate::js::{string_literal, JsWriter};

/// Knobs for the generated program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerOptions {
    /// JPEG quality for step screenshots (1-100)
    pub screenshot_quality: u8,
    pub telemetry: TelemetryOptions,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            screenshot_quality: 60,
            telemetry: TelemetryOptions::default(),
        }
    }
}

/// Telemetry ("spotlight") capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryOptions {
    pub enabled: bool,
    /// Port of the in-process envelope receiver
    pub port: u16,
    /// Envelopes kept before the oldest are evicted
    pub buffer_capacity: usize,
    /// Scripts injected into the page after every navigation
    pub sentry_bundles: Vec<String>,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8969,
            buffer_capacity: 1000,
            sentry_bundles: vec![
                "https://browser.sentry-cdn.com/10.33.0/bundle.tracing.min.js".to_string(),
                "https://browser.sentry-cdn.com/10.33.0/spotlight.min.js".to_string(),
            ],
        }
    }
}

impl TelemetryOptions {
    /// URL the page's Sentry SDK posts envelopes to.
    pub fn sidecar_url(&self) -> String {
        format!("http://localhost:{}/stream", self.port)
    }
}

/// Source text of an assembled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program(String);

impl Program {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds programs from compiled blocks
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    options: AssemblerOptions,
}

impl Assembler {
    pub fn new(options: AssemblerOptions) -> Self {
        Self { options }
    }

    /// Assemble a program that drives the browser at `connection_target`
    /// (a CDP websocket URL).
    pub fn assemble(&self, block: &CompiledBlock, connection_target: &str) -> Program {
        let telemetry = &self.options.telemetry;
        let mut w = JsWriter::new();

        w.line("import { chromium } from 'playwright';");
        w.line("import http from 'node:http';");
        w.blank();
        w.line(&format!("const CDP_ENDPOINT = {};", string_literal(connection_target)));
        w.line(&format!("const TRACE_START = {};", string_literal(Frame::Trace.start())));
        w.line(&format!("const TRACE_END = {};", string_literal(Frame::Trace.end())));
        w.line(&format!("const SPOTLIGHT_START = {};", string_literal(Frame::Spotlight.start())));
        w.line(&format!("const SPOTLIGHT_END = {};", string_literal(Frame::Spotlight.end())));
        w.line(&format!(
            "const SCREENSHOT_QUALITY = {};",
            self.options.screenshot_quality.clamp(1, 100)
        ));
        w.line(&format!("const SPOTLIGHT_ENABLED = {};", telemetry.enabled));
        w.line(&format!("const SPOTLIGHT_PORT = {};", telemetry.port));
        w.line(&format!("const SPOTLIGHT_URL = {};", string_literal(&telemetry.sidecar_url())));
        w.line(&format!("const SPOTLIGHT_BUFFER_SIZE = {};", telemetry.buffer_capacity.max(1)));
        let bundles: Vec<String> = telemetry.sentry_bundles.iter().map(|b| string_literal(b)).collect();
        w.line(&format!("const SENTRY_BUNDLES = [{}];", bundles.join(", ")));
        w.blank();
        w.block(HELPERS);
        w.blank();

        w.line("async function main() {");
        w.indent();
        w.block(MAIN_SETUP);
        w.blank();
        w.line("try {");
        w.indent();
        for stmt in &block.statements {
            w.statement(stmt);
        }
        w.line("trace.success = true;");
        w.dedent();
        w.block(FAILURE_BOUNDARY);
        w.blank();
        w.block(MAIN_TEARDOWN);
        w.dedent();
        w.line("}");
        w.blank();
        w.block(ENTRY_POINT);

        Program(w.finish())
    }
}

/// Assemble with default options.
pub fn assemble(block: &CompiledBlock, connection_target: &str) -> Program {
    Assembler::default().assemble(block, connection_target)
}

const HELPERS: &str = r#"let page;
let trace;
const spotlightBuffer = [];

function startSpotlightReceiver() {
  return new Promise((resolve) => {
    const server = http.createServer((req, res) => {
      res.setHeader('Access-Control-Allow-Origin', '*');
      res.setHeader('Access-Control-Allow-Headers', '*');
      res.setHeader('Access-Control-Allow-Methods', 'POST, OPTIONS');
      if (req.method === 'OPTIONS') {
        res.writeHead(204);
        res.end();
        return;
      }
      if (req.method !== 'POST') {
        res.writeHead(405);
        res.end();
        return;
      }
      const chunks = [];
      req.on('data', (chunk) => chunks.push(chunk));
      req.on('end', () => {
        spotlightBuffer.push({
          body: Buffer.concat(chunks).toString('utf8'),
          contentType: String(req.headers['content-type'] || ''),
          receivedAt: Date.now(),
        });
        while (spotlightBuffer.length > SPOTLIGHT_BUFFER_SIZE) {
          spotlightBuffer.shift();
        }
        res.writeHead(200);
        res.end();
      });
    });
    server.on('error', (err) => {
      console.error('[spotlight] receiver unavailable: ' + err.message);
      resolve(null);
    });
    server.listen(SPOTLIGHT_PORT, '127.0.0.1', () => resolve(server));
  });
}

async function addSpotlight(target) {
  if (!SPOTLIGHT_ENABLED) {
    return;
  }
  try {
    for (const url of SENTRY_BUNDLES) {
      await target.addScriptTag({ url, type: 'text/javascript' });
    }
    await target.evaluate((sidecarUrl) => {
      Sentry.init({
        dsn: '',
        sendDefaultPii: true,
        spotlight: sidecarUrl,
        enableLogs: true,
        integrations: [
          Sentry.browserTracingIntegration(),
          Sentry.spotlightBrowserIntegration({ sidecarUrl }),
        ],
        tracesSampleRate: 1.0,
      });
    }, SPOTLIGHT_URL);
  } catch (err) {
    console.error('[spotlight] injection failed: ' + err.message);
  }
}

function toSpotlightEvent(entry) {
  const lines = entry.body.split('\n');
  let header = {};
  try {
    header = JSON.parse(lines[0] || '{}');
  } catch {
    header = {};
  }
  const items = [];
  let i = 1;
  while (i < lines.length) {
    if (!lines[i].trim()) {
      i += 1;
      continue;
    }
    let itemHeader;
    try {
      itemHeader = JSON.parse(lines[i]);
    } catch {
      i += 1;
      continue;
    }
    const raw = lines[i + 1] ?? '';
    let payload;
    try {
      payload = JSON.parse(raw);
    } catch {
      payload = raw;
    }
    items.push({ header: itemHeader, payload });
    i += 2;
  }
  const types = items.map((item) => item.header && item.header.type).filter(Boolean);
  return {
    envelopeId: header.event_id,
    type: types.length > 0 ? types.join(',') : 'unknown',
    timestamp: entry.receivedAt,
    data: { header, items },
    headers: { 'content-type': entry.contentType },
  };
}

async function captureStep(index, action, details) {
  try {
    const image = await page.screenshot({ type: 'jpeg', quality: SCREENSHOT_QUALITY });
    trace.steps.push({
      index,
      action,
      details,
      timestamp: Date.now(),
      screenshot: image.toString('base64'),
      url: page.url(),
    });
  } catch (err) {
    console.error('[trace] screenshot failed for step ' + index + ': ' + err.message);
  }
}"#;

const MAIN_SETUP: &str = r#"const browser = await chromium.connectOverCDP(CDP_ENDPOINT);
const context = browser.contexts()[0] || (await browser.newContext());
page = context.pages()[0] || (await context.newPage());
page.on('console', (msg) => console.log(msg.text()));

trace = {
  startTime: Date.now(),
  endTime: 0,
  duration: 0,
  success: false,
  error: null,
  steps: [],
};

const spotlightServer = SPOTLIGHT_ENABLED ? await startSpotlightReceiver() : null;"#;

const FAILURE_BOUNDARY: &str = r#"} catch (err) {
  trace.success = false;
  trace.error = err && err.message ? err.message : String(err);
  await captureStep(trace.steps.length, 'error', trace.error);
} finally {
  trace.endTime = Date.now();
  trace.duration = trace.endTime - trace.startTime;
}"#;

const MAIN_TEARDOWN: &str = r#"console.log(TRACE_START + JSON.stringify(trace) + TRACE_END);

if (SPOTLIGHT_ENABLED) {
  const events = spotlightBuffer.splice(0).map(toSpotlightEvent);
  console.log(SPOTLIGHT_START + JSON.stringify(events) + SPOTLIGHT_END);
}

await browser.close().catch((err) => console.error('[browser] close failed: ' + err.message));
if (spotlightServer) {
  await new Promise((resolve) => spotlightServer.close(() => resolve()));
}"#;

const ENTRY_POINT: &str = r#"main().catch((err) => {
  console.error(err);
  process.exitCode = 1;
});"#;
