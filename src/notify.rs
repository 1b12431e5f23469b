use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

pub type BroadcastSender = broadcast::Sender<String>;

pub const NOTIFY_EVENT: &str = "notify";
pub const STATE_EVENT: &str = "workflow.state";
pub const REVEAL_EVENT: &str = "workflow.reveal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Error,
}

pub fn message_bus() -> (BroadcastSender, broadcast::Receiver<String>) {
    broadcast::channel(256)
}

pub fn encode_message(event: &str, payload: Value) -> String {
    json!({
        "event": event,
        "payload": payload,
    })
    .to_string()
}

pub fn broadcast_json(sender: &BroadcastSender, event: &str, payload: Value) {
    let message = encode_message(event, payload);
    // No subscribers is fine; notifications are fire-and-forget.
    let _ = sender.send(message);
}

/// Panel-scoped handle onto the notification surface.
#[derive(Clone)]
pub struct Notifier {
    panel: String,
    sender: BroadcastSender,
}

impl Notifier {
    pub fn new(panel: impl Into<String>, sender: BroadcastSender) -> Self {
        Self {
            panel: panel.into(),
            sender,
        }
    }

    pub fn notify(&self, severity: Severity, message: &str) {
        broadcast_json(
            &self.sender,
            NOTIFY_EVENT,
            json!({
                "panel": self.panel,
                "severity": severity,
                "message": message,
            }),
        );
    }

    pub fn success(&self, message: &str) {
        self.notify(Severity::Success, message);
    }

    pub fn info(&self, message: &str) {
        self.notify(Severity::Info, message);
    }

    pub fn error(&self, message: &str) {
        self.notify(Severity::Error, message);
    }

    pub fn event(&self, event: &str, mut payload: Value) {
        if let Value::Object(map) = &mut payload {
            map.insert("panel".to_string(), json!(self.panel));
        }
        broadcast_json(&self.sender, event, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_carry_panel_and_severity() {
        let (sender, mut rx) = message_bus();
        let notifier = Notifier::new("gherkin", sender);

        notifier.error("Please enter text or upload a file");

        let raw = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], NOTIFY_EVENT);
        assert_eq!(value["payload"]["panel"], "gherkin");
        assert_eq!(value["payload"]["severity"], "error");
        assert_eq!(value["payload"]["message"], "Please enter text or upload a file");
    }

    #[test]
    fn sending_without_subscribers_does_not_fail() {
        let (sender, rx) = message_bus();
        drop(rx);
        Notifier::new("api-tests", sender).info("This feature is coming soon!");
    }
}
