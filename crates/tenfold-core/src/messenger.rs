//! Outbound messaging seam.
//!
//! The chat transport lives outside this crate. Batch jobs only need to hand
//! it a text plus optional interactive controls and learn whether the
//! recipient is permanently gone.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Interactive control attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Offer to replace today's question; `remaining` changes are left.
    ChangeQuestion { remaining: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<Control>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Recipient blocked the sender or the account is deactivated.
    #[error("recipient unreachable")]
    Unreachable,

    /// Anything else; the next batch will try again.
    #[error("delivery failed: {0}")]
    Transient(String),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, user_id: i64, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}

/// Writes every delivery to the log. Used when no transport is attached.
#[derive(Debug, Default)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send(&self, user_id: i64, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        info!(
            user_id,
            controls = message.controls.len(),
            text = %message.text,
            "deliver"
        );
        Ok(())
    }
}

/// Keeps every delivery in memory. Users listed as unreachable fail with
/// [`DeliveryError::Unreachable`].
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(i64, OutgoingMessage)>>,
    unreachable: Vec<i64>,
    failing: Vec<i64>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(mut self, user_id: i64) -> Self {
        self.unreachable.push(user_id);
        self
    }

    pub fn with_failing(mut self, user_id: i64) -> Self {
        self.failing.push(user_id);
        self
    }

    pub fn sent(&self) -> Vec<(i64, OutgoingMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn recipients(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.sent().into_iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, user_id: i64, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        if self.unreachable.contains(&user_id) {
            return Err(DeliveryError::Unreachable);
        }
        if self.failing.contains(&user_id) {
            return Err(DeliveryError::Transient("connection reset".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((user_id, message.clone()));
        }
        Ok(())
    }
}
