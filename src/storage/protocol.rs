//! Storage offload message protocol
//!
//! Requests travel from the bridge to the isolated storage worker, responses
//! travel back. `id` correlates the two one-to-one. Chunk payloads are owned
//! by the message, so sending one moves the buffer instead of copying it.

use serde::{Deserialize, Serialize};

/// Parameters of an `init` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitParams {
    pub session_id: String,
    pub extension: String,
}

/// Operation carried by a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StorageCommand {
    Init { data: InitParams },
    AddChunk { data: Vec<u8> },
    Finalize,
    Clear,
    Close,
    /// Any type this side does not understand
    #[serde(other)]
    Unknown,
}

impl StorageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StorageCommand::Init { .. } => "init",
            StorageCommand::AddChunk { .. } => "addChunk",
            StorageCommand::Finalize => "finalize",
            StorageCommand::Clear => "clear",
            StorageCommand::Close => "close",
            StorageCommand::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRequest {
    pub id: u64,
    #[serde(flatten)]
    pub command: StorageCommand,
}

/// Result carried by a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StorageOutcome {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    Error {
        error: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageResponse {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: StorageOutcome,
}

impl StorageResponse {
    pub fn success(id: u64, data: Option<String>) -> Self {
        Self {
            id,
            outcome: StorageOutcome::Success { data },
        }
    }

    pub fn error(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: StorageOutcome::Error {
                error: error.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = StorageRequest {
            id: 3,
            command: StorageCommand::Init {
                data: InitParams {
                    session_id: "abc".into(),
                    extension: "webm".into(),
                },
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "init");
        assert_eq!(json["id"], 3);
        assert_eq!(json["data"]["sessionId"], "abc");
    }

    #[test]
    fn test_unknown_request_type_decodes_as_unknown() {
        let request: StorageRequest =
            serde_json::from_str(r#"{"type":"compact","id":9}"#).unwrap();
        assert_eq!(request.id, 9);
        assert_eq!(request.command, StorageCommand::Unknown);
    }

    #[test]
    fn test_unknown_response_type_decodes_as_unknown() {
        let response: StorageResponse =
            serde_json::from_str(r#"{"type":"progress","id":1}"#).unwrap();
        assert_eq!(response.outcome, StorageOutcome::Unknown);
    }

    #[test]
    fn test_error_response_shape() {
        let json = serde_json::to_value(StorageResponse::error(4, "disk full")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "disk full");
    }
}
