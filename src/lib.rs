//! RTSP frame tap
//!
//! Pulls decoded frames out of an RTSP stream and logs their array layout.
//!
//! All media work (RTSP transport, jitter buffering, decoding, colorspace conversion)
//! happens inside GStreamer. This crate builds the pipeline, attaches one typed frame
//! callback to its appsink, and runs the bus loop that handles EOS, errors and
//! interrupts.
//!
//! # Module Structure
//!
//! - `config`: Resolved settings (defaults, JSON file, environment, command line)
//! - `format`: Raw video formats, channel counts and element types
//! - `frame`: Frame layout, borrowed pixel views and reshaped arrays
//! - `sink`: The per-frame callback and its shared counters
//! - `bus`: Bus messages and how the loop reacts to each
//! - `ingest`: Pipeline description and the GStreamer / synthetic backends
//! - `consumer`: The consume loop with interrupt draining

pub mod bus;
pub mod config;
pub mod consumer;
pub mod format;
pub mod frame;
pub mod ingest;
pub mod sink;

pub use bus::{BusAction, BusMessage, PipelineState, StopReason};
pub use config::{TapConfig, TapOverrides};
pub use consumer::{consume, ConsumeReport, Outcome, ShutdownSignal};
pub use format::{ElementType, PixelFormat};
pub use frame::{FrameArray, FrameLayout, FrameView};
pub use ingest::{Pipeline, PipelineDescription, StubSettings, APPSINK_NAME};
pub use sink::{FlowStatus, FrameSample, FrameSink, FrameStats, SampleCaps};
