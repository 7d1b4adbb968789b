use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::SessionMessage;
use crate::status::Status;
use crate::tools::ToolInvocation;
use crate::ExchangeOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// Receives every observable mutation of the engine. The UI implements this;
/// the engine only calls it.
pub trait RenderSink: Send + Sync {
    /// Carries the full accumulated text, never just the delta.
    fn on_content_update(&self, full_text: &str);
    fn on_tool_opened(&self, invocation: &ToolInvocation);
    fn on_tool_closed(&self, invocation: &ToolInvocation);
    fn on_status_changed(&self, status: Status);
    fn on_system_message(&self, text: &str, severity: Severity);

    /// Prior messages restored from a persisted session.
    fn on_history(&self, _messages: &[SessionMessage]) {}

    /// Final outcome of an exchange, after the engine is idle again.
    fn on_exchange_end(&self, _outcome: &ExchangeOutcome) {}
}

/// Discards everything.
pub struct NoopSink;

impl RenderSink for NoopSink {
    fn on_content_update(&self, _: &str) {}
    fn on_tool_opened(&self, _: &ToolInvocation) {}
    fn on_tool_closed(&self, _: &ToolInvocation) {}
    fn on_status_changed(&self, _: Status) {}
    fn on_system_message(&self, _: &str, _: Severity) {}
}

/// Sink notifications as values, for consumers that prefer a channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Content { full_text: String },
    ToolOpened(ToolInvocation),
    ToolClosed(ToolInvocation),
    Status(Status),
    System { text: String, severity: Severity },
    History(Vec<SessionMessage>),
    ExchangeEnd(ExchangeOutcome),
}

/// Forwards notifications into an unbounded channel. A dropped receiver is
/// ignored.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

impl RenderSink for ChannelSink {
    fn on_content_update(&self, full_text: &str) {
        self.emit(EngineEvent::Content {
            full_text: full_text.to_string(),
        });
    }

    fn on_tool_opened(&self, invocation: &ToolInvocation) {
        self.emit(EngineEvent::ToolOpened(invocation.clone()));
    }

    fn on_tool_closed(&self, invocation: &ToolInvocation) {
        self.emit(EngineEvent::ToolClosed(invocation.clone()));
    }

    fn on_status_changed(&self, status: Status) {
        self.emit(EngineEvent::Status(status));
    }

    fn on_system_message(&self, text: &str, severity: Severity) {
        self.emit(EngineEvent::System {
            text: text.to_string(),
            severity,
        });
    }

    fn on_history(&self, messages: &[SessionMessage]) {
        self.emit(EngineEvent::History(messages.to_vec()));
    }

    fn on_exchange_end(&self, outcome: &ExchangeOutcome) {
        self.emit(EngineEvent::ExchangeEnd(outcome.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.on_status_changed(Status::Thinking);
        sink.on_content_update("Hi");
        sink.on_system_message("oops", Severity::Error);

        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Status(Status::Thinking))));
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::Content { full_text }) if full_text == "Hi"
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::System { severity: Severity::Error, .. })
        ));
    }

    #[test]
    fn closed_receiver_is_not_an_error() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.on_content_update("ignored");
    }
}
