//! File-backed host
//!
//! Keeps the document as pretty-printed JSON on local disk. Writes go through
//! a sibling temp file and a rename so readers never see a torn document.
//! Edits made to the file by anyone else are detected on `recv` by digest
//! and pushed as change notifications.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shellconf_protocol::{
    ops, HostError, HostMessage, HostRequest, HostResponse, SettingsDocument, PROTOCOL_MAX,
};
use tracing::{debug, warn};

use super::transport::{HostTransport, TransportError};

#[derive(Debug)]
struct FileHostState {
    path: PathBuf,
    inbox: VecDeque<HostMessage>,
    /// Digest of the document last read or written by this host
    last_digest: Option<String>,
}

/// Host persisting the document to a JSON file
#[derive(Debug)]
pub struct FileHost {
    state: Mutex<FileHostState>,
}

impl FileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(FileHostState {
                path: path.into(),
                inbox: VecDeque::new(),
                last_digest: None,
            }),
        }
    }

    /// Get the default document path (~/.config/shellconf/settings.json)
    pub fn default_path() -> Result<PathBuf, TransportError> {
        let home = std::env::var("HOME").map_err(|_| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            ))
        })?;
        Ok(PathBuf::from(home).join(".config/shellconf/settings.json"))
    }

    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FileHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_document(path: &Path) -> Result<SettingsDocument, TransportError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_document(path: &Path, document: &SettingsDocument) -> Result<(), TransportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn digest_of(document: &SettingsDocument) -> Result<String, TransportError> {
        document
            .digest()
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    /// Load the document, creating a default one when the file is absent
    fn load(state: &mut FileHostState, path: Option<&str>) -> Result<SettingsDocument, TransportError> {
        if let Some(path) = path {
            state.path = PathBuf::from(path);
        }

        let document = if state.path.exists() {
            Self::read_document(&state.path)?
        } else {
            debug!(path = %state.path.display(), "no settings file, writing defaults");
            let document = SettingsDocument::default();
            Self::write_document(&state.path, &document)?;
            document
        };

        state.last_digest = Some(Self::digest_of(&document)?);
        Ok(document)
    }

    fn persist(state: &mut FileHostState, request: &HostRequest) -> Result<(), HostError> {
        let document = request
            .document()
            .map_err(|e| HostError::invalid_request(e.to_string()))?
            .ok_or_else(|| HostError::invalid_request("persist without document"))?;

        let digest = Self::digest_of(&document).map_err(|e| HostError::invalid_request(e.to_string()))?;
        if request.digest() != Some(digest.as_str()) {
            return Err(HostError::invalid_request("document digest mismatch"));
        }

        Self::write_document(&state.path, &document)
            .map_err(|e| HostError::storage_failure(e.to_string()))?;
        state.last_digest = Some(digest);
        state.inbox.push_back(HostMessage::Changed { document });
        Ok(())
    }

    /// Push a change notification if the file no longer matches what this
    /// host last read or wrote.
    fn detect_external_edit(state: &mut FileHostState) {
        if state.last_digest.is_none() || !state.path.exists() {
            return;
        }

        let document = match Self::read_document(&state.path) {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %state.path.display(), error = %e, "ignoring unreadable settings file");
                return;
            }
        };
        let digest = match Self::digest_of(&document) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "could not digest settings file");
                return;
            }
        };

        if state.last_digest.as_deref() != Some(digest.as_str()) {
            debug!(path = %state.path.display(), "settings file changed on disk");
            state.last_digest = Some(digest);
            state.inbox.push_back(HostMessage::Changed { document });
        }
    }
}

impl HostTransport for FileHost {
    fn request(&self, request: &HostRequest) -> Result<HostResponse, TransportError> {
        let request_id = request.request_id.clone();
        if request.op != ops::LOAD {
            return Ok(HostResponse::error(
                PROTOCOL_MAX,
                request_id,
                HostError::unknown_operation(&request.op),
            ));
        }

        let mut state = self.lock();
        match Self::load(&mut state, request.path()) {
            Ok(document) => {
                let payload = serde_json::json!({ "document": serde_json::to_value(&document)? });
                Ok(HostResponse::success(PROTOCOL_MAX, request_id, payload))
            }
            Err(e) => Ok(HostResponse::error(
                PROTOCOL_MAX,
                request_id,
                HostError::storage_failure(e.to_string()),
            )),
        }
    }

    fn submit(&self, request: &HostRequest) -> Result<(), TransportError> {
        if request.op != ops::PERSIST {
            return Err(HostError::unknown_operation(&request.op).into());
        }

        let mut state = self.lock();
        let message = match Self::persist(&mut state, request) {
            Ok(()) => HostMessage::persisted(request.request_id.clone()),
            Err(error) => HostMessage::persist_failed(request.request_id.clone(), error),
        };
        state.inbox.push_back(message);
        Ok(())
    }

    fn recv(&self, _timeout: Duration) -> Result<Option<HostMessage>, TransportError> {
        let mut state = self.lock();
        if state.inbox.is_empty() {
            Self::detect_external_edit(&mut state);
        }
        Ok(state.inbox.pop_front())
    }
}
