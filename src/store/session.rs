//! Session-only state.
//!
//! Lives next to the document but is never persisted, and survives both
//! restore-to-last-loaded and external replacement of the document.

use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Settings page currently open in the UI
    pub route: Option<String>,

    /// Accent palette cached from the system
    pub palette: Option<Value>,
}
