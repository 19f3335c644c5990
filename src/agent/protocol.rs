//! Agent wire protocol.
//!
//! JSON text frames with a `type` tag:
//!
//! ```text
//! agent -> hub   {"type":"hello","device":"emulator-5554","application_id":"com.example","api_level":34}
//! hub -> agent   {"type":"welcome","version":"0.1.0"}
//! hub -> agent   {"type":"apply_patch","id":7,"patch":{...}}
//! agent -> hub   {"type":"patch_result","id":7,"ok":false,"error":"schema change"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::push::PatchRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    Hello {
        device: String,
        application_id: String,
        api_level: u32,
        #[serde(default)]
        emulator: bool,
    },
    Welcome {
        version: String,
    },
    ApplyPatch {
        id: u64,
        patch: PatchRequest,
    },
    PatchResult {
        id: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentMessage {
    pub fn welcome() -> Self {
        Self::Welcome {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, AgentError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self, AgentError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("expected hello, got {0}")]
    UnexpectedMessage(String),

    #[error("agent did not introduce itself in time")]
    HelloTimeout,

    #[error("invalid agent message: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
