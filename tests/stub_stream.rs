//! End-to-end consume runs against the synthetic `stub://` pipeline.

use std::time::Duration;

use rtsp_frame_tap::{
    consume, BusAction, BusMessage, FrameSink, Outcome, Pipeline, ShutdownSignal, TapConfig,
};

fn stub(url: &str) -> TapConfig {
    TapConfig::new(url).expect("stub config")
}

#[test]
fn consumes_every_frame_of_a_finite_stream() {
    let cfg = stub("stub://front_camera?frames=12&width=32&height=24&fps=0");
    let report = consume(&cfg, &ShutdownSignal::new()).expect("consume");

    assert_eq!(report.outcome, Outcome::EndOfStream);
    assert_eq!(report.frames, 12);
    assert_eq!(report.bytes, 12 * 32 * 24 * 3);
    assert_eq!(report.flow_errors, 0);
}

#[test]
fn gray_stream_is_consumed_when_requested() {
    let mut cfg = stub("stub://ir_camera?frames=3&width=8&height=8&fps=0&format=GRAY16_LE");
    cfg.expected_format = rtsp_frame_tap::PixelFormat::Gray16Le;
    let report = consume(&cfg, &ShutdownSignal::new()).expect("consume");

    assert_eq!(report.outcome, Outcome::EndOfStream);
    assert_eq!(report.bytes, 3 * 8 * 8 * 2);
}

#[test]
fn negotiated_format_mismatch_stops_with_error() {
    let cfg = stub("stub://front_camera?frames=12&width=32&height=24&fps=0&format=BGRx");
    let report = consume(&cfg, &ShutdownSignal::new()).expect("consume");

    assert!(matches!(report.outcome, Outcome::Failed(ref m) if m.contains("data stream error")));
    assert_eq!(report.frames, 0);
}

#[test]
fn interrupt_sends_eos_and_drains() {
    let cfg = stub("stub://front_camera?frames=0&width=16&height=16&fps=50");
    let signal = ShutdownSignal::new();
    let trigger = signal.clone();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        trigger.trigger();
    });

    let report = consume(&cfg, &signal).expect("consume");
    interrupter.join().expect("interrupter thread");

    assert_eq!(report.outcome, Outcome::Interrupted { drained: true });
    assert!(report.is_success());
}

#[test]
fn pipeline_reports_state_transitions_before_frames() {
    let cfg = stub("stub://front_camera?frames=1&width=4&height=4&fps=0");
    let mut pipeline = Pipeline::launch(&cfg, FrameSink::new(cfg.expected_format)).expect("launch");
    pipeline.play().expect("play");

    let mut messages = Vec::new();
    while let Some(message) = pipeline.poll(Duration::from_millis(500)) {
        let done = message.dispatch() != BusAction::Continue;
        messages.push(message);
        if done {
            break;
        }
    }
    pipeline.shutdown().expect("shutdown");

    assert!(matches!(messages.first(), Some(BusMessage::StateChanged { .. })));
    assert!(messages.contains(&BusMessage::AsyncDone));
    assert_eq!(messages.last(), Some(&BusMessage::Eos));
    assert!(pipeline
        .description()
        .as_str()
        .ends_with("appsink emit-signals=true name=appsink"));
}
