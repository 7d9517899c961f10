//! Outbound event channel shared by the scanner and the connection manager.

use crate::domain::models::{LinkEvent, MessageSeverity, StatusMessage};
use tokio::sync::mpsc;

/// Optional sender of [`LinkEvent`]s. A closed or missing receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that drops every event
    pub fn none() -> Self {
        Self::default()
    }

    pub fn send(&self, event: LinkEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn log(&self, message: impl Into<String>, severity: MessageSeverity) {
        self.send(LinkEvent::LogMessage(StatusMessage {
            message: message.into(),
            severity,
        }));
    }
}
