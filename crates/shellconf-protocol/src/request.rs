//! Requests sent from the core to the host.

use serde::{Deserialize, Serialize};

use crate::document::SettingsDocument;
use crate::{ops, PROTOCOL_MAX};

/// Request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRequest {
    pub protocol_version: i32,
    /// Operation name.
    pub op: String,
    /// Caller-chosen request ID for correlation.
    pub request_id: String,
    /// Operation-specific payload.
    pub payload: serde_json::Value,
}

impl HostRequest {
    /// Ask the host for the full document, optionally at a non-default location.
    pub fn load(request_id: impl Into<String>, path: Option<&str>) -> Self {
        Self {
            protocol_version: PROTOCOL_MAX,
            op: ops::LOAD.to_string(),
            request_id: request_id.into(),
            payload: match path {
                Some(p) => serde_json::json!({ "path": p }),
                None => serde_json::json!({}),
            },
        }
    }

    /// Hand the full document to the host for durable storage.
    pub fn persist(
        request_id: impl Into<String>,
        document: &SettingsDocument,
        digest: &str,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            protocol_version: PROTOCOL_MAX,
            op: ops::PERSIST.to_string(),
            request_id: request_id.into(),
            payload: serde_json::json!({
                "document": serde_json::to_value(document)?,
                "digest": digest,
            }),
        })
    }

    /// Location argument of a load request.
    pub fn path(&self) -> Option<&str> {
        self.payload.get("path").and_then(|p| p.as_str())
    }

    /// Document carried by a persist request.
    pub fn document(&self) -> Result<Option<SettingsDocument>, serde_json::Error> {
        match self.payload.get("document") {
            Some(doc) => serde_json::from_value(doc.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Digest carried by a persist request.
    pub fn digest(&self) -> Option<&str> {
        self.payload.get("digest").and_then(|d| d.as_str())
    }
}
