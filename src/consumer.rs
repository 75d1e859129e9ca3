//! Consume loop: launch, play, poll the bus, react to EOS / ERROR / interrupt,
//! and always tear the pipeline down to NULL.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::bus::{BusAction, BusMessage, StopReason};
use crate::config::TapConfig;
use crate::ingest::Pipeline;
use crate::sink::FrameSink;

/// Interrupt flag shared between a signal handler and the consume loop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a consume run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    EndOfStream,
    Failed(String),
    /// Interrupted by the caller; `drained` is false when EOS never came back.
    Interrupted { drained: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumeReport {
    pub outcome: Outcome,
    pub frames: u64,
    pub bytes: u64,
    pub flow_errors: u64,
}

impl ConsumeReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed(_))
    }
}

/// Consume `config.url` until end of stream, a pipeline error, or `shutdown` fires.
pub fn consume(config: &TapConfig, shutdown: &ShutdownSignal) -> Result<ConsumeReport> {
    log::debug!("Consume {}", config.url);

    let sink = FrameSink::new(config.expected_format);
    let stats = sink.stats();
    let mut pipeline = Pipeline::launch(config, sink)?;

    let outcome = run(&mut pipeline, config, shutdown);
    let teardown = pipeline.shutdown();
    let outcome = outcome?;
    teardown?;

    let snapshot = stats.snapshot();
    log::info!(
        "stream finished: {:?}, frames={} bytes={} flow_errors={}",
        outcome,
        snapshot.frames,
        snapshot.bytes,
        snapshot.flow_errors
    );
    Ok(ConsumeReport {
        outcome,
        frames: snapshot.frames,
        bytes: snapshot.bytes,
        flow_errors: snapshot.flow_errors,
    })
}

fn run(pipeline: &mut Pipeline, config: &TapConfig, shutdown: &ShutdownSignal) -> Result<Outcome> {
    pipeline.play()?;

    loop {
        if shutdown.is_triggered() {
            log::info!("interrupted, sending EOS");
            if let Err(err) = pipeline.send_eos() {
                log::warn!("could not send EOS: {:#}", err);
                return Ok(Outcome::Interrupted { drained: false });
            }
            let drained = drain_until_eos(pipeline, config);
            return Ok(Outcome::Interrupted { drained });
        }

        let Some(message) = pipeline.poll(config.poll_interval) else {
            continue;
        };
        match message.dispatch() {
            BusAction::Continue => {}
            BusAction::Stop(StopReason::EndOfStream) => return Ok(Outcome::EndOfStream),
            BusAction::Stop(StopReason::Error(message)) => return Ok(Outcome::Failed(message)),
        }
    }
}

/// Poll until EOS arrives, an error makes it unreachable, or the drain timeout expires.
fn drain_until_eos(pipeline: &mut Pipeline, config: &TapConfig) -> bool {
    let deadline = Instant::now() + config.drain_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match pipeline.poll(remaining.min(config.poll_interval)) {
            Some(message) if message.is_eos() => {
                log::info!("EOS");
                return true;
            }
            Some(BusMessage::Error { message, .. }) => {
                log::error!("pipeline error while draining: {}", message);
                return false;
            }
            Some(other) => log::debug!("draining, skipped {:?}", other),
            None => {}
        }
    }
    log::warn!(
        "no EOS within {:?}, tearing down anyway",
        config.drain_timeout
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;
    use std::time::Duration;

    #[test]
    fn shutdown_signal_is_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let handler_copy = signal.clone();
        assert!(!signal.is_triggered());
        handler_copy.trigger();
        assert!(signal.is_triggered());
    }

    #[test]
    fn finite_stream_ends_with_eos() -> Result<()> {
        let cfg = TapConfig::new("stub://cam?frames=5&width=16&height=8&fps=0")?;
        let report = consume(&cfg, &ShutdownSignal::new())?;
        assert_eq!(report.outcome, Outcome::EndOfStream);
        assert_eq!(report.frames, 5);
        assert_eq!(report.bytes, 5 * 16 * 8 * 3);
        assert!(report.is_success());
        Ok(())
    }

    #[test]
    fn format_mismatch_fails_the_run() -> Result<()> {
        let cfg = TapConfig::new("stub://cam?frames=5&width=16&height=8&fps=0&format=RGBA")?;
        let report = consume(&cfg, &ShutdownSignal::new())?;
        assert!(matches!(report.outcome, Outcome::Failed(_)));
        assert_eq!(report.flow_errors, 1);
        assert!(!report.is_success());
        Ok(())
    }

    #[test]
    fn pre_triggered_signal_drains_to_eos() -> Result<()> {
        let cfg = TapConfig::new("stub://cam?frames=0&width=4&height=4&fps=100")?;
        let signal = ShutdownSignal::new();
        signal.trigger();
        let report = consume(&cfg, &signal)?;
        assert_eq!(report.outcome, Outcome::Interrupted { drained: true });
        Ok(())
    }

    #[test]
    fn drain_gives_up_after_timeout() -> Result<()> {
        let mut cfg = TapConfig::new("stub://cam?frames=1&width=4&height=4&fps=0")?;
        cfg.drain_timeout = Duration::from_millis(300);
        let mut pipeline = Pipeline::launch(&cfg, FrameSink::new(cfg.expected_format))?;
        pipeline.play()?;
        while let Some(message) = pipeline.poll(Duration::from_secs(2)) {
            if message.is_eos() {
                break;
            }
        }

        let started = Instant::now();
        assert!(!drain_until_eos(&mut pipeline, &cfg));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(2));
        Ok(())
    }

    #[test]
    fn drain_stops_early_on_pipeline_error() -> Result<()> {
        let mut cfg = TapConfig::new("stub://cam?frames=0&width=4&height=4&fps=0&format=BGR")?;
        cfg.drain_timeout = Duration::from_secs(5);
        let mut pipeline = Pipeline::launch(&cfg, FrameSink::new(PixelFormat::Rgb))?;
        pipeline.play()?;

        let started = Instant::now();
        assert!(!drain_until_eos(&mut pipeline, &cfg));
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn interrupt_mid_stream_drains_to_eos() -> Result<()> {
        let mut cfg = TapConfig::new("stub://cam?frames=0&width=4&height=4&fps=100")?;
        cfg.drain_timeout = Duration::from_secs(2);
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            trigger.trigger();
        });

        let report = consume(&cfg, &signal)?;
        handle.join().expect("trigger thread");
        assert_eq!(report.outcome, Outcome::Interrupted { drained: true });
        assert!(report.frames > 0);
        Ok(())
    }
}
