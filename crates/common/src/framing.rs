//! Sentinel framing for structured payloads embedded in program stdout.
//!
//! A payload is written as `<start><json><end>` anywhere in the output. The
//! markers are assumed never to appear in page console output or script side
//! effects.

/// A structured payload carried in stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Trace,
    Spotlight,
}

impl Frame {
    pub fn start(&self) -> &'static str {
        match self {
            Frame::Trace => "__TRACE_START__",
            Frame::Spotlight => "__SPOTLIGHT_START__",
        }
    }

    pub fn end(&self) -> &'static str {
        match self {
            Frame::Trace => "__TRACE_END__",
            Frame::Spotlight => "__SPOTLIGHT_END__",
        }
    }

    /// Wrap an already serialized payload.
    pub fn wrap(&self, json: &str) -> String {
        format!("{}{}{}", self.start(), json, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_exact() {
        assert_eq!(Frame::Trace.wrap("{}"), "__TRACE_START__{}__TRACE_END__");
        assert_eq!(Frame::Spotlight.wrap("[]"), "__SPOTLIGHT_START__[]__SPOTLIGHT_END__");
    }
}
