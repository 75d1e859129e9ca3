//! Pipeline construction and frame delivery.
//!
//! - `pipeline`: renders the textual pipeline description handed to the engine
//! - `rtsp`: `Pipeline`, backed by GStreamer (feature: rtsp-gstreamer) or by a
//!   synthetic frame generator for `stub://` URLs
//!
//! Decoding, RTSP transport and colorspace conversion all happen inside the engine.
//! This layer only wires the frame callback and surfaces bus messages.

pub mod pipeline;
pub mod rtsp;

pub use pipeline::{PipelineDescription, APPSINK_NAME};
pub use rtsp::{Pipeline, StubSettings};
