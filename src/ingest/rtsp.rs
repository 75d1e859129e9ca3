//! RTSP pipeline.
//!
//! `Pipeline` owns a running media pipeline and its bus. The frame callback is
//! registered at launch and runs on the engine's streaming thread; the consumer
//! loop only sees bus messages.
//!
//! Backends:
//! - GStreamer (feature: rtsp-gstreamer) for real RTSP URLs
//! - Synthetic generator for `stub://` URLs (tests and demos)
//!
//! `shutdown()` always returns the pipeline to the NULL state, and runs on drop
//! if the caller did not do so explicitly.

#[cfg(feature = "rtsp-gstreamer")]
use anyhow::Context;
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use url::Url;

use super::pipeline::PipelineDescription;
#[cfg(feature = "rtsp-gstreamer")]
use super::pipeline::APPSINK_NAME;
use crate::bus::{BusMessage, PipelineState};
use crate::config::TapConfig;
use crate::format::PixelFormat;
use crate::sink::{FlowStatus, FrameSample, FrameSink, SampleCaps};

/// A launched pipeline with the frame sink attached.
pub struct Pipeline {
    description: PipelineDescription,
    backend: PipelineBackend,
    state: PipelineState,
}

enum PipelineBackend {
    Synthetic(SyntheticPipeline),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerPipeline),
}

impl Pipeline {
    /// Build the pipeline for `config.url` and register `sink` as the frame callback.
    pub fn launch(config: &TapConfig, sink: FrameSink) -> Result<Self> {
        let description = PipelineDescription::new(config);
        let backend = if config.is_stub() {
            let settings = StubSettings::parse(&config.url, sink.expected_format())?;
            PipelineBackend::Synthetic(SyntheticPipeline::new(settings, sink))
        } else {
            #[cfg(feature = "rtsp-gstreamer")]
            {
                PipelineBackend::Gstreamer(GstreamerPipeline::new(&description, sink)?)
            }
            #[cfg(not(feature = "rtsp-gstreamer"))]
            {
                let _ = sink;
                anyhow::bail!("RTSP requires the rtsp-gstreamer feature")
            }
        };
        log::debug!("pipeline: {}", description);
        Ok(Self {
            description,
            backend,
            state: PipelineState::Null,
        })
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Transition to PLAYING. Frames start flowing into the sink.
    pub fn play(&mut self) -> Result<()> {
        // A failed transition can leave some elements running; shutdown must still reset them.
        self.state = PipelineState::Paused;
        match &mut self.backend {
            PipelineBackend::Synthetic(backend) => backend.play()?,
            #[cfg(feature = "rtsp-gstreamer")]
            PipelineBackend::Gstreamer(backend) => backend.play()?,
        }
        self.state = PipelineState::Playing;
        Ok(())
    }

    /// Wait up to `timeout` for the next bus message.
    pub fn poll(&mut self, timeout: Duration) -> Option<BusMessage> {
        match &mut self.backend {
            PipelineBackend::Synthetic(backend) => backend.poll(timeout),
            #[cfg(feature = "rtsp-gstreamer")]
            PipelineBackend::Gstreamer(backend) => backend.poll(timeout),
        }
    }

    /// Inject an end-of-stream event; EOS shows up on the bus once it has drained.
    pub fn send_eos(&mut self) -> Result<()> {
        match &mut self.backend {
            PipelineBackend::Synthetic(backend) => backend.send_eos(),
            #[cfg(feature = "rtsp-gstreamer")]
            PipelineBackend::Gstreamer(backend) => backend.send_eos(),
        }
    }

    /// Tear down to NULL. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == PipelineState::Null {
            return Ok(());
        }
        match &mut self.backend {
            PipelineBackend::Synthetic(backend) => backend.shutdown()?,
            #[cfg(feature = "rtsp-gstreamer")]
            PipelineBackend::Gstreamer(backend) => backend.shutdown()?,
        }
        self.state = PipelineState::Null;
        log::debug!("pipeline set to {}", self.state);
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("pipeline teardown failed: {:#}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic pipeline (stub://) for tests
// ----------------------------------------------------------------------------

const DEFAULT_STUB_FRAMES: u64 = 30;
const DEFAULT_STUB_WIDTH: u32 = 640;
const DEFAULT_STUB_HEIGHT: u32 = 480;
const DEFAULT_STUB_FPS: u32 = 30;

/// Parameters of a synthetic stream, read from the `stub://` URL query.
///
/// `stub://front?frames=5&width=64&height=48&format=RGB&fps=0`
/// - `frames=0` streams until EOS is requested
/// - `fps=0` delivers frames back to back
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubSettings {
    pub name: String,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fps: u32,
}

impl StubSettings {
    pub fn parse(url: &str, default_format: PixelFormat) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| anyhow!("invalid stub URL {:?}: {}", url, e))?;
        if parsed.scheme() != "stub" {
            return Err(anyhow!("not a stub URL: {}", url));
        }
        let mut settings = Self {
            name: parsed.host_str().unwrap_or("stub").to_string(),
            frames: DEFAULT_STUB_FRAMES,
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            format: default_format,
            fps: DEFAULT_STUB_FPS,
        };
        for (key, value) in parsed.query_pairs() {
            match &*key {
                "frames" => settings.frames = parse_query(&key, &value)?,
                "width" => settings.width = parse_query(&key, &value)?,
                "height" => settings.height = parse_query(&key, &value)?,
                "fps" => settings.fps = parse_query(&key, &value)?,
                "format" => settings.format = PixelFormat::from_caps_str(&value)?,
                other => log::warn!("ignoring unknown stub parameter {:?}", other),
            }
        }
        Ok(settings)
    }

    fn frame_interval(&self) -> Duration {
        if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.fps
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.pixel_stride()
    }
}

fn parse_query<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter {} has invalid value {:?}", key, value))
}

struct SyntheticPipeline {
    settings: StubSettings,
    sink: FrameSink,
    tx: Sender<BusMessage>,
    rx: Receiver<BusMessage>,
    eos_requested: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticPipeline {
    fn new(settings: StubSettings, sink: FrameSink) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            settings,
            sink,
            tx,
            rx,
            eos_requested: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn play(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let source = Some(self.settings.name.clone());
        let transitions = [
            (PipelineState::Null, PipelineState::Ready),
            (PipelineState::Ready, PipelineState::Paused),
        ];
        for (old, current) in transitions {
            self.post(BusMessage::StateChanged {
                source: source.clone(),
                old,
                current,
            });
        }
        self.post(BusMessage::NewClock);
        self.post(BusMessage::StreamStart);
        self.post(BusMessage::AsyncDone);
        self.post(BusMessage::StateChanged {
            source,
            old: PipelineState::Paused,
            current: PipelineState::Playing,
        });

        let settings = self.settings.clone();
        let sink = self.sink.clone();
        let tx = self.tx.clone();
        let eos_requested = Arc::clone(&self.eos_requested);
        let worker = std::thread::Builder::new()
            .name(format!("stub-{}", settings.name))
            .spawn(move || run_synthetic_stream(settings, sink, tx, eos_requested))
            .map_err(|e| anyhow!("failed to spawn synthetic stream thread: {}", e))?;
        self.worker = Some(worker);
        log::info!(
            "Pipeline: streaming {} (synthetic {}x{} {})",
            self.settings.name,
            self.settings.width,
            self.settings.height,
            self.settings.format
        );
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<BusMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    fn send_eos(&mut self) -> Result<()> {
        self.eos_requested.store(true, Ordering::SeqCst);
        if self.worker.is_none() {
            self.post(BusMessage::Eos);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.eos_requested.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("synthetic stream thread panicked"))?;
        }
        Ok(())
    }

    fn post(&self, message: BusMessage) {
        // The receiver lives in `self`, so the send cannot fail while we hold it.
        let _ = self.tx.send(message);
    }
}

fn run_synthetic_stream(
    settings: StubSettings,
    sink: FrameSink,
    tx: Sender<BusMessage>,
    eos_requested: Arc<AtomicBool>,
) {
    let interval = settings.frame_interval();
    let pts_step = if interval.is_zero() {
        Duration::from_secs(1) / DEFAULT_STUB_FPS
    } else {
        interval
    };
    let caps = SampleCaps {
        format: settings.format.as_caps_str().to_string(),
        width: settings.width,
        height: settings.height,
        stride: None,
    };
    let mut pixels = vec![0u8; settings.frame_len()];
    let mut frame_count: u64 = 0;

    while !eos_requested.load(Ordering::SeqCst) {
        if settings.frames > 0 && frame_count >= settings.frames {
            break;
        }
        fill_synthetic_pixels(&mut pixels, frame_count);
        let sample = FrameSample {
            caps: caps.clone(),
            pts: Some(synthetic_pts(pts_step, frame_count)),
            dts: None,
            data: &pixels,
        };
        if sink.on_sample(Some(&sample)) == FlowStatus::Error {
            let _ = tx.send(BusMessage::Error {
                source: Some(super::pipeline::APPSINK_NAME.to_string()),
                message: "Internal data stream error.".to_string(),
                debug: Some("streaming stopped, reason error (-5)".to_string()),
            });
            return;
        }
        frame_count += 1;
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }

    let _ = tx.send(BusMessage::Eos);
}

/// Presentation time of frame `frame_count`, saturating instead of wrapping.
fn synthetic_pts(step: Duration, frame_count: u64) -> Duration {
    let step_ns = u64::try_from(step.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(step_ns.saturating_mul(frame_count))
}

/// Moving gradient so consecutive frames differ.
fn fill_synthetic_pixels(pixels: &mut [u8], frame_count: u64) {
    for (i, pixel) in pixels.iter_mut().enumerate() {
        *pixel = ((i as u64 + frame_count) % 256) as u8;
    }
}

// ----------------------------------------------------------------------------
// Production pipeline using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerPipeline {
    pipeline: gstreamer::Pipeline,
    bus: gstreamer::Bus,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerPipeline {
    fn new(description: &PipelineDescription, sink: FrameSink) -> Result<Self> {
        use gstreamer::prelude::*;

        gstreamer::init().context("initialize gstreamer")?;

        let pipeline = gstreamer::parse::launch(description.as_str())
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name(APPSINK_NAME)
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| match pull_and_handle(appsink, &sink) {
                    FlowStatus::Ok => Ok(gstreamer::FlowSuccess::Ok),
                    FlowStatus::Error => Err(gstreamer::FlowError::Error),
                })
                .build(),
        );

        let bus = pipeline.bus().context("pipeline has no bus")?;
        Ok(Self { pipeline, bus })
    }

    fn play(&mut self) -> Result<()> {
        use gstreamer::prelude::*;

        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Option<BusMessage> {
        let timeout = gstreamer::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let message = self.bus.timed_pop(timeout)?;
        Some(convert_message(&message))
    }

    fn send_eos(&mut self) -> Result<()> {
        use gstreamer::prelude::*;

        if !self.pipeline.send_event(gstreamer::event::Eos::new()) {
            anyhow::bail!("pipeline refused the EOS event");
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        use gstreamer::prelude::*;

        self.pipeline
            .set_state(gstreamer::State::Null)
            .context("set RTSP pipeline to Null")?;
        Ok(())
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn pull_and_handle(appsink: &gstreamer_app::AppSink, sink: &FrameSink) -> FlowStatus {
    let sample = match appsink.pull_sample() {
        Ok(sample) => sample,
        Err(err) => {
            log::error!("pull-sample failed: {}", err);
            return sink.on_sample(None);
        }
    };
    match with_frame_sample(&sample, |frame| sink.on_sample(Some(frame))) {
        Ok(status) => status,
        Err(err) => {
            log::error!("sample unreadable: {:#}", err);
            sink.on_sample(None)
        }
    }
}

/// Map the sample's buffer and expose it to `f` as a borrowed `FrameSample`.
#[cfg(feature = "rtsp-gstreamer")]
fn with_frame_sample<R>(
    sample: &gstreamer::Sample,
    f: impl FnOnce(&FrameSample<'_>) -> R,
) -> Result<R> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let structure = caps.structure(0).context("RTSP caps have no structure")?;

    let format = structure
        .get::<&str>("format")
        .context("RTSP caps missing format")?;
    let width = structure
        .get::<i32>("width")
        .context("RTSP caps missing width")?;
    let height = structure
        .get::<i32>("height")
        .context("RTSP caps missing height")?;

    // Buffer meta describes the actual memory layout; caps only give the default one.
    let stride = buffer
        .meta::<gstreamer_video::VideoMeta>()
        .and_then(|meta| meta.stride().first().copied())
        .or_else(|| {
            gstreamer_video::VideoInfo::from_caps(caps)
                .ok()
                .and_then(|info| info.stride().first().copied())
        })
        .and_then(|stride| usize::try_from(stride).ok());

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let frame = FrameSample {
        caps: SampleCaps {
            format: format.to_string(),
            width: u32::try_from(width).context("negative frame width")?,
            height: u32::try_from(height).context("negative frame height")?,
            stride,
        },
        pts: buffer.pts().map(|ts| Duration::from_nanos(ts.nseconds())),
        dts: buffer.dts().map(|ts| Duration::from_nanos(ts.nseconds())),
        data: map.as_slice(),
    };
    Ok(f(&frame))
}

#[cfg(feature = "rtsp-gstreamer")]
fn convert_message(message: &gstreamer::Message) -> BusMessage {
    use gstreamer::prelude::*;
    use gstreamer::MessageView;

    let source = message.src().map(|src| src.path_string().to_string());
    match message.view() {
        MessageView::Eos(..) => BusMessage::Eos,
        MessageView::Error(err) => BusMessage::Error {
            source,
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        },
        MessageView::Warning(warning) => BusMessage::Warning {
            source,
            message: warning.error().to_string(),
            debug: warning.debug().map(|d| d.to_string()),
        },
        MessageView::StateChanged(change) => BusMessage::StateChanged {
            source,
            old: convert_state(change.old()),
            current: convert_state(change.current()),
        },
        MessageView::StreamStatus(..) => BusMessage::StreamStatus,
        MessageView::StreamStart(..) => BusMessage::StreamStart,
        MessageView::Progress(..) => BusMessage::Progress,
        MessageView::AsyncDone(..) => BusMessage::AsyncDone,
        MessageView::NewClock(..) => BusMessage::NewClock,
        MessageView::Tag(..) => BusMessage::Tag,
        _ => BusMessage::Other(format!("{:?}", message.type_())),
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn convert_state(state: gstreamer::State) -> PipelineState {
    match state {
        gstreamer::State::Null => PipelineState::Null,
        gstreamer::State::Ready => PipelineState::Ready,
        gstreamer::State::Paused => PipelineState::Paused,
        gstreamer::State::Playing => PipelineState::Playing,
        _ => PipelineState::VoidPending,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
