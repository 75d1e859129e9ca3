//! Pipeline bus messages and how the consumer loop reacts to them.

use std::fmt;

/// Pipeline states the tap observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::VoidPending => "VOID_PENDING",
            PipelineState::Null => "NULL",
            PipelineState::Ready => "READY",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
        };
        f.write_str(name)
    }
}

/// A message popped off the pipeline bus, detached from the engine's types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
    Eos,
    Error {
        source: Option<String>,
        message: String,
        debug: Option<String>,
    },
    Warning {
        source: Option<String>,
        message: String,
        debug: Option<String>,
    },
    StateChanged {
        source: Option<String>,
        old: PipelineState,
        current: PipelineState,
    },
    StreamStatus,
    StreamStart,
    Progress,
    AsyncDone,
    NewClock,
    Tag,
    /// Any other message type, carried by name.
    Other(String),
}

/// Why the consumer loop stopped polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusAction {
    Continue,
    Stop(StopReason),
}

impl BusMessage {
    /// Log the message and decide whether the loop keeps running.
    pub fn dispatch(&self) -> BusAction {
        match self {
            BusMessage::Eos => {
                log::info!("EOS");
                BusAction::Stop(StopReason::EndOfStream)
            }
            BusMessage::Error {
                source,
                message,
                debug,
            } => {
                log::error!(
                    "Error from {}: {}, {}",
                    source.as_deref().unwrap_or("pipeline"),
                    message,
                    debug.as_deref().unwrap_or("no debug info")
                );
                BusAction::Stop(StopReason::Error(message.clone()))
            }
            BusMessage::Warning {
                source,
                message,
                debug,
            } => {
                log::warn!(
                    "Warning from {}: {}, {}",
                    source.as_deref().unwrap_or("pipeline"),
                    message,
                    debug.as_deref().unwrap_or("no debug info")
                );
                BusAction::Continue
            }
            BusMessage::StateChanged {
                source,
                old,
                current,
            } => {
                log::debug!(
                    "{} state changed {} -> {}",
                    source.as_deref().unwrap_or("pipeline"),
                    old,
                    current
                );
                BusAction::Continue
            }
            BusMessage::StreamStatus
            | BusMessage::StreamStart
            | BusMessage::Progress
            | BusMessage::AsyncDone
            | BusMessage::NewClock
            | BusMessage::Tag => BusAction::Continue,
            BusMessage::Other(kind) => {
                log::warn!("Unknown message: {}", kind);
                BusAction::Continue
            }
        }
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, BusMessage::Eos)
    }
}
