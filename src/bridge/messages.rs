//! Message contract between the controller, page contexts and the
//! dashboard. The serde form is the JSON wire form.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::page::PageHandle;
use crate::store::Severity;
use crate::tasks::{FailureReason, Outcome, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Controller to page: start a run.
    RunAutomation { task: Task },
    /// Page to controller: terminal outcome of the run.
    AutomationResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<FailureReason>,
    },
    /// Page to controller: activity line, fire-and-forget.
    Log {
        message: String,
        #[serde(rename = "logType", alias = "severity", default)]
        severity: Severity,
    },
    /// Dashboard to controller: refill and advance now.
    CheckNow,
    /// Dashboard to controller: empty the activity log.
    ClearLogs,
}

impl Message {
    pub fn result(outcome: Outcome) -> Self {
        Self::AutomationResult {
            success: outcome.success,
            error: outcome.error,
        }
    }

    pub fn log(message: impl Into<String>, severity: Severity) -> Self {
        Self::Log {
            message: message.into(),
            severity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunAutomation { .. } => "RUN_AUTOMATION",
            Self::AutomationResult { .. } => "AUTOMATION_RESULT",
            Self::Log { .. } => "LOG",
            Self::CheckNow => "CHECK_NOW",
            Self::ClearLogs => "CLEAR_LOGS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyReason {
    Busy,
}

/// Answer to `RUN_AUTOMATION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAck {
    pub received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BusyReason>,
}

impl RunAck {
    pub fn accepted() -> Self {
        Self {
            received: true,
            reason: None,
        }
    }

    pub fn busy() -> Self {
        Self {
            received: false,
            reason: Some(BusyReason::Busy),
        }
    }
}

/// Reply carried back over an envelope's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Run(RunAck),
    Ack { success: bool },
}

impl Reply {
    pub fn ok() -> Self {
        Self::Ack { success: true }
    }
}

/// A message plus its origin and an optional reply channel.
#[derive(Debug)]
pub struct Envelope {
    pub origin: Option<PageHandle>,
    pub message: Message,
    pub reply: Option<oneshot::Sender<Reply>>,
}

impl Envelope {
    /// Fire-and-forget message with no origin page.
    pub fn new(message: Message) -> Self {
        Self {
            origin: None,
            message,
            reply: None,
        }
    }

    pub fn from_page(origin: PageHandle, message: Message) -> Self {
        Self {
            origin: Some(origin),
            message,
            reply: None,
        }
    }

    /// Envelope expecting a reply, and the receiver for it.
    pub fn request(message: Message) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                origin: None,
                message,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Answer the sender, if it is still waiting.
    pub fn respond(&mut self, reply: Reply) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(reply);
        }
    }
}

/// Send `message` and wait for its reply.
pub async fn request(inbox: &mpsc::Sender<Envelope>, message: Message) -> Result<Reply> {
    let (envelope, rx) = Envelope::request(message);
    inbox
        .send(envelope)
        .await
        .map_err(|_| Error::ChannelClosed("request inbox"))?;
    rx.await.map_err(|_| Error::ChannelClosed("reply"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_uses_type_tag() {
        assert_eq!(
            serde_json::to_value(Message::CheckNow).unwrap(),
            json!({"type": "CHECK_NOW"})
        );
        let result = Message::result(Outcome::failed(FailureReason::DialogTimeout));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"type": "AUTOMATION_RESULT", "success": false, "error": {"reason": "DialogTimeout"}})
        );
        assert_eq!(result.kind(), "AUTOMATION_RESULT");
    }

    #[test]
    fn log_accepts_page_field_name() {
        let msg: Message =
            serde_json::from_value(json!({"type": "LOG", "message": "hi", "logType": "action"}))
                .unwrap();
        assert_eq!(msg, Message::log("hi", Severity::Action));
    }

    #[test]
    fn acks_serialize_like_the_page_contract() {
        assert_eq!(
            serde_json::to_value(Reply::Run(RunAck::busy())).unwrap(),
            json!({"received": false, "reason": "busy"})
        );
        assert_eq!(
            serde_json::to_value(Reply::Run(RunAck::accepted())).unwrap(),
            json!({"received": true})
        );
        assert_eq!(serde_json::to_value(Reply::ok()).unwrap(), json!({"success": true}));
    }

    #[tokio::test]
    async fn request_round_trip() {
        let (tx, mut rx) = mpsc::channel(4);
        let server = tokio::spawn(async move {
            let mut env: Envelope = rx.recv().await.unwrap();
            assert_eq!(env.message, Message::ClearLogs);
            env.respond(Reply::ok());
        });
        assert_eq!(request(&tx, Message::ClearLogs).await.unwrap(), Reply::ok());
        server.await.unwrap();
    }
}
