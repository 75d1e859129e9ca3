//! Frame sink callback.
//!
//! The pipeline engine invokes `FrameSink::on_sample` once per decoded frame on its
//! streaming thread. The sink inspects the negotiated format, builds a view over the
//! pixel bytes, reshapes it and logs the result. The returned `FlowStatus` tells the
//! engine whether to keep delivering frames.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::format::PixelFormat;
use crate::frame::{FrameArray, FrameLayout, FrameView};

/// Flow status handed back to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStatus {
    Ok,
    Error,
}

/// Negotiated caps fields the sink reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleCaps {
    /// `format` field of the `video/x-raw` structure (e.g. "RGB").
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Row stride of plane 0, when the engine reports one.
    pub stride: Option<usize>,
}

/// A pulled frame: caps, timestamps and the mapped buffer bytes.
#[derive(Clone, Debug)]
pub struct FrameSample<'a> {
    pub caps: SampleCaps,
    pub pts: Option<Duration>,
    pub dts: Option<Duration>,
    pub data: &'a [u8],
}

/// Counters shared between the streaming thread and the consumer loop.
#[derive(Debug, Default)]
pub struct FrameStats {
    frames: AtomicU64,
    bytes: AtomicU64,
    flow_errors: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStatsSnapshot {
    pub frames: u64,
    pub bytes: u64,
    pub flow_errors: u64,
}

impl FrameStats {
    pub fn snapshot(&self) -> FrameStatsSnapshot {
        FrameStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            flow_errors: self.flow_errors.load(Ordering::Relaxed),
        }
    }
}

/// Callback registered on the raw RGB sink.
#[derive(Clone, Debug)]
pub struct FrameSink {
    expected: PixelFormat,
    stats: Arc<FrameStats>,
}

impl FrameSink {
    pub fn new(expected: PixelFormat) -> Self {
        Self {
            expected,
            stats: Arc::new(FrameStats::default()),
        }
    }

    pub fn expected_format(&self) -> PixelFormat {
        self.expected
    }

    pub fn stats(&self) -> Arc<FrameStats> {
        Arc::clone(&self.stats)
    }

    /// Handle one pulled sample. `None` means the pull did not yield a sample.
    pub fn on_sample(&self, sample: Option<&FrameSample<'_>>) -> FlowStatus {
        let Some(sample) = sample else {
            log::error!("appsink signalled a new sample but none could be pulled");
            return self.fail();
        };

        log::debug!(
            "PTS: {}, DTS: {}",
            format_clock(sample.pts),
            format_clock(sample.dts)
        );

        match self.inspect(sample) {
            Ok(array) => {
                let frame_no = self.stats.frames.fetch_add(1, Ordering::Relaxed) + 1;
                self.stats
                    .bytes
                    .fetch_add(sample.data.len() as u64, Ordering::Relaxed);
                log::info!(
                    "received frame #{}: array with shape {:?} of type {}",
                    frame_no,
                    array.shape(),
                    array.dtype()
                );
                FlowStatus::Ok
            }
            Err(err) => {
                log::error!("frame rejected: {:#}", err);
                self.fail()
            }
        }
    }

    fn inspect(&self, sample: &FrameSample<'_>) -> Result<FrameArray> {
        let format = PixelFormat::from_caps_str(&sample.caps.format)?;
        if format != self.expected {
            return Err(anyhow!(
                "negotiated format {} does not match requested {}",
                format,
                self.expected
            ));
        }
        let mut layout = FrameLayout::new(sample.caps.width, sample.caps.height, format);
        if let Some(stride) = sample.caps.stride {
            layout = layout.with_stride(stride)?;
        }
        let view = FrameView::new(layout, sample.data);
        view.to_array()
    }

    fn fail(&self) -> FlowStatus {
        self.stats.flow_errors.fetch_add(1, Ordering::Relaxed);
        FlowStatus::Error
    }
}

fn format_clock(ts: Option<Duration>) -> String {
    match ts {
        Some(ts) => ts.as_nanos().to_string(),
        None => "none".to_string(),
    }
}
