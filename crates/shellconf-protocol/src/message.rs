//! Messages flowing from the host back to the core.

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogFeed;
use crate::document::SettingsDocument;
use crate::error::HostError;

/// Synchronous reply to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResponse {
    pub protocol_version: i32,
    /// Request ID echoed from the request.
    pub request_id: String,
    pub ok: bool,
    /// Success payload (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error details (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HostError>,
}

impl HostResponse {
    pub fn success(protocol_version: i32, request_id: String, payload: serde_json::Value) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(protocol_version: i32, request_id: String, error: HostError) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Asynchronous push from the host.
///
/// Persist results and change notifications share one ordered stream so the
/// core sees them in the order the host produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostMessage {
    /// A persist request settled.
    PersistResult {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<HostError>,
    },
    /// The persisted document changed, for whatever reason.
    Changed { document: SettingsDocument },
    /// A resource catalog was refreshed.
    CatalogUpdated { feed: CatalogFeed },
}

impl HostMessage {
    pub fn persisted(request_id: impl Into<String>) -> Self {
        Self::PersistResult {
            request_id: request_id.into(),
            ok: true,
            error: None,
        }
    }

    pub fn persist_failed(request_id: impl Into<String>, error: HostError) -> Self {
        Self::PersistResult {
            request_id: request_id.into(),
            ok: false,
            error: Some(error),
        }
    }
}
