//! Messages exchanged between documents and the service worker.

use crate::geolocation::PositionRecord;
use serde::{Deserialize, Serialize};

/// Commands a document posts to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Leave the waiting state now.
    SkipWaiting,
    /// Delete every cache and acknowledge on the reply port.
    ClearCache,
    /// Remember the last known position for offline reads.
    SyncGeolocation { payload: PositionRecord },
    /// Anything else; ignored.
    #[serde(other)]
    Unknown,
}

impl WorkerMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Notices the worker broadcasts to the documents it controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// A new version activated and took control.
    SwUpdated,
}

/// Completion signal for [`WorkerMessage::ClearCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheAck {
    pub success: bool,
}

/// Reply channel supplied alongside a command.
pub trait ReplyPort {
    fn post_ack(&self, ack: ClearCacheAck);
}
