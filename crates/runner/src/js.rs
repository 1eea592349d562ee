//! JavaScript rendering
//!
//! Every value that ends up inside generated code goes through
//! [`string_literal`]. Selectors and URLs come straight from user (or model)
//! input, so nothing else in the crate is allowed to build a quoted literal.

use crate::compiler::Statement;

/// Escape `value` for use inside a single- or double-quoted JS string.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Render `value` as a single-quoted JS string literal.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Line-oriented writer for generated programs
#[derive(Debug, Default)]
pub struct JsWriter {
    buf: String,
    indent: usize,
}

impl JsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing at a fixed indentation level (two spaces per level).
    pub fn with_indent(indent: usize) -> Self {
        Self {
            buf: String::new(),
            indent,
        }
    }

    pub fn line(&mut self, code: &str) {
        for _ in 0..self.indent {
            self.buf.push_str("  ");
        }
        self.buf.push_str(code);
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write each line of a pre-rendered block at the current indentation.
    pub fn block(&mut self, code: &str) {
        for line in code.lines() {
            if line.is_empty() {
                self.blank();
            } else {
                self.line(line);
            }
        }
    }

    pub fn statement(&mut self, stmt: &Statement) {
        let code = render_statement(stmt);
        self.line(&code);
        if matches!(stmt, Statement::CaptureStep { .. }) {
            self.blank();
        }
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Render a single statement without indentation or trailing newline.
pub fn render_statement(stmt: &Statement) -> String {
    match stmt {
        Statement::Navigate { url } => format!("await page.goto({});", string_literal(url)),
        Statement::Click { selector } => format!("await page.click({});", string_literal(selector)),
        Statement::Sleep { milliseconds } => format!("await page.waitForTimeout({});", milliseconds),
        Statement::InjectTelemetry => "await addSpotlight(page);".to_string(),
        Statement::CaptureStep {
            index,
            action,
            details,
        } => format!(
            "await captureStep({}, {}, {});",
            index,
            string_literal(action.as_str()),
            string_literal(details)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momos_common::ActionKind;
    use test_case::test_case;

    #[test_case("plain", "plain")]
    #[test_case("it's", "it\\'s")]
    #[test_case(r#"a[title="x"]"#, r#"a[title=\"x\"]"#)]
    #[test_case("C:\\temp", "C:\\\\temp")]
    #[test_case("line1\nline2", "line1\\nline2")]
    #[test_case("cr\rlf", "cr\\rlf")]
    #[test_case("sep\u{2028}", "sep\\u2028")]
    fn test_escape(input: &str, expected: &str) {
        assert_eq!(escape(input), expected);
    }

    #[test]
    fn test_breakout_attempt_stays_quoted() {
        let literal = string_literal("'); process.exit(1); ('");
        assert_eq!(literal, "'\\'); process.exit(1); (\\''");
    }

    #[test]
    fn test_writer_indentation() {
        let mut w = JsWriter::with_indent(1);
        w.line("try {");
        w.indent();
        w.block("a();\n\nb();");
        w.dedent();
        w.line("}");
        assert_eq!(w.finish(), "  try {\n    a();\n\n    b();\n  }\n");
    }

    #[test]
    fn test_capture_step_followed_by_blank_line() {
        let mut w = JsWriter::new();
        w.statement(&Statement::Sleep { milliseconds: 10 });
        w.statement(&Statement::CaptureStep {
            index: 0,
            action: ActionKind::Sleep,
            details: "10ms".into(),
        });
        assert_eq!(
            w.finish(),
            "await page.waitForTimeout(10);\nawait captureStep(0, 'sleep', '10ms');\n\n"
        );
    }
}
