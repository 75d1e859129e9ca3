//! Pipeline description rendering.
//!
//! The tap always asks the engine for the same linear chain:
//! RTSP source, automatic decoder, colorspace converter, raw caps filter, optional
//! queue, and a named appsink that emits a signal per sample.

use std::fmt;

use crate::config::TapConfig;

/// Name of the sink element the frame callback is attached to.
pub const APPSINK_NAME: &str = "appsink";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDescription(String);

impl PipelineDescription {
    pub fn new(config: &TapConfig) -> Self {
        let mut parts = Vec::with_capacity(6);

        let mut source = format!("rtspsrc location={}", quote_value(&config.url));
        if let Some(latency) = config.latency_ms {
            source.push_str(&format!(" latency={}", latency));
        }
        parts.push(source);
        parts.push("decodebin".to_string());
        parts.push("videoconvert".to_string());
        parts.push(format!("video/x-raw,format={}", config.expected_format));
        if config.queue {
            parts.push("queue".to_string());
        }
        parts.push(format!("appsink emit-signals=true name={}", APPSINK_NAME));

        Self(parts.join(" ! "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quote a property value when it would otherwise split the description.
fn quote_value(value: &str) -> String {
    if value.chars().any(|c| c.is_whitespace() || c == '!' || c == '"') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
