//! Recover framed payloads from program stdout

use serde::de::DeserializeOwned;
use tracing::warn;

use momos_common::{Frame, SpotlightData, TraceData};

/// Stdout split into its structured and free-form parts
#[derive(Debug, Clone, PartialEq)]
pub struct Demuxed {
    pub trace: Option<TraceData>,
    pub spotlight: Option<SpotlightData>,
    /// Remaining output, trimmed
    pub clean_stdout: String,
}

/// Split `stdout` into the trace, the spotlight events and the remaining
/// text.
///
/// A malformed payload is dropped (the field is `None`) but its framed span is
/// still removed. A start marker without a following end marker is left in
/// place.
pub fn demux(stdout: &str) -> Demuxed {
    let mut text = stdout.to_string();
    let trace = take_frame(&mut text, Frame::Trace).and_then(|body| parse_payload(Frame::Trace, &body));
    let spotlight =
        take_frame(&mut text, Frame::Spotlight).and_then(|body| parse_payload(Frame::Spotlight, &body));

    Demuxed {
        trace,
        spotlight,
        clean_stdout: text.trim().to_string(),
    }
}

/// Remove the first `start ... end` span for `frame` and return its body.
fn take_frame(text: &mut String, frame: Frame) -> Option<String> {
    let start = text.find(frame.start())?;
    let body_start = start + frame.start().len();
    let body_end = body_start + text[body_start..].find(frame.end())?;
    let body = text[body_start..body_end].to_string();
    text.replace_range(start..body_end + frame.end().len(), "");
    Some(body)
}

fn parse_payload<T: DeserializeOwned>(frame: Frame, body: &str) -> Option<T> {
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "Discarding malformed {} payload ({} bytes): {}",
                frame.start(),
                body.len(),
                e
            );
            None
        }
    }
}
