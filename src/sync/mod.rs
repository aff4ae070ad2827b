//! Synchronization between the store and the host
//!
//! Protocol:
//! 1. Startup: fetch the full document; it becomes both state and snapshot.
//! 2. Save (explicit, never per patch): send the whole document, arming the
//!    echo guard before the request leaves.
//! 3. Inbound change: while the guard awaits an echo, the first change is our
//!    own save coming back and is dropped, protecting edits made while the
//!    save was in flight. An echo that trails its persist result is matched
//!    by digest. Otherwise the store is replaced wholesale.
//!
//! Persist results and change notifications arrive on one ordered stream and
//! are fed through [`SyncBridge::handle_message`], the only path by which the
//! host can mutate the store.

mod guard;

pub use guard::{EchoGuard, InFlightSave, Inbound, SettledSave};

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shellconf_protocol::{HostError, HostMessage, HostRequest, ResourceKind, SettingsDocument};
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::host::{HostTransport, TransportError};
use crate::integrity::Reference;
use crate::store::{ConfigStore, StoreError};

/// Sync tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Age after which an armed echo guard is cleared (None = never)
    pub echo_timeout: Option<Duration>,
    /// How long a blocking save waits for its persist result
    pub persist_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            echo_timeout: Some(Duration::from_secs(30)),
            persist_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&CoreConfig> for SyncConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            echo_timeout: config.echo_timeout(),
            persist_timeout: config.persist_timeout(),
        }
    }
}

/// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Initial load failed; fatal to the session
    #[error("Load failed: {0}")]
    Load(String),

    /// Save failed; local edits stay dirty and the caller may retry
    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Persist request {request_id} not settled within {timeout:?}")]
    PersistTimedOut {
        request_id: String,
        timeout: Duration,
    },

    #[error("Save {0} is still in flight")]
    SaveInFlight(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What handling one host message did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    EchoSuppressed {
        request_id: String,
    },
    ExternalReplaced {
        revision: Option<u64>,
        repaired: Vec<Reference>,
    },
    SaveConfirmed {
        request_id: String,
    },
    SaveFailed {
        request_id: String,
        error: HostError,
    },
    /// Result for a request the guard no longer tracks
    StaleResult {
        request_id: String,
    },
    CatalogApplied {
        kind: ResourceKind,
        pruned: Vec<Reference>,
    },
}

/// Counters and timestamps for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub last_loaded_at: Option<DateTime<Utc>>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_external_change_at: Option<DateTime<Utc>>,
    pub saves_confirmed: u64,
    pub save_failures: u64,
    pub echoes_suppressed: u64,
    pub external_changes: u64,
    pub guards_expired: u64,
}

/// Bidirectional sync between a [`ConfigStore`] and the host
pub struct SyncBridge {
    transport: Arc<dyn HostTransport>,
    config: SyncConfig,
    guard: EchoGuard,
    request_counter: u64,
    status: SyncStatus,
}

impl SyncBridge {
    pub fn new(transport: Arc<dyn HostTransport>) -> Self {
        Self::with_config(transport, SyncConfig::default())
    }

    pub fn with_config(transport: Arc<dyn HostTransport>, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            guard: EchoGuard::Idle,
            request_counter: 0,
            status: SyncStatus::default(),
        }
    }

    pub fn guard(&self) -> &EchoGuard {
        &self.guard
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    fn next_request_id(&mut self) -> String {
        self.request_counter += 1;
        format!("req-{:06}", self.request_counter)
    }

    /// Fetch the document from the host and install it in `store`.
    pub fn load(
        &mut self,
        store: &mut ConfigStore,
        path: Option<&Path>,
    ) -> Result<Vec<Reference>, SyncError> {
        let path = path.map(|p| p.to_string_lossy().into_owned());
        let request = HostRequest::load(self.next_request_id(), path.as_deref());

        let response = self
            .transport
            .request(&request)
            .map_err(|e| SyncError::Load(e.to_string()))?;

        if !response.ok {
            let message = response
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "host returned ok=false without error".to_string());
            return Err(SyncError::Load(message));
        }

        let document_value = response
            .payload
            .and_then(|mut p| p.get_mut("document").map(serde_json::Value::take))
            .ok_or_else(|| SyncError::Load("load response carries no document".to_string()))?;
        let document: SettingsDocument = serde_json::from_value(document_value)
            .map_err(|e| SyncError::Load(format!("host document is malformed: {}", e)))?;

        let repaired = store.load_document(document);
        self.status.last_loaded_at = Some(Utc::now());
        info!(request_id = %request.request_id, repaired = repaired.len(), "settings loaded from host");
        Ok(repaired)
    }

    /// Send the current document to the host without waiting for the result.
    ///
    /// Returns the request id whose [`SyncOutcome::SaveConfirmed`] or
    /// [`SyncOutcome::SaveFailed`] will later come out of `handle_message`.
    pub fn begin_save(&mut self, store: &ConfigStore) -> Result<String, SyncError> {
        if let Some(expired) = self.guard.expire(self.config.echo_timeout, Instant::now()) {
            self.note_expired(&expired);
        }
        if let Some(settled) = self.guard.late_echo() {
            debug!(request_id = %settled.request_id, "new save replaces pending late echo");
        }
        if let Some(save) = self.guard.in_flight() {
            return Err(SyncError::SaveInFlight(save.request_id.clone()));
        }

        let document = store.get()?;
        let digest = document
            .digest()
            .map_err(|e| SyncError::Persist(e.to_string()))?;
        let request_id = self.next_request_id();
        let request = HostRequest::persist(request_id.clone(), &document, &digest)
            .map_err(TransportError::from)?;

        // Armed before the request leaves so an early echo is recognized.
        self.guard
            .arm(InFlightSave::new(request_id.clone(), digest.clone(), document));

        if let Err(e) = self.transport.submit(&request) {
            self.guard.clear();
            self.status.save_failures += 1;
            warn!(request_id = %request_id, error = %e, "save could not be sent");
            return Err(SyncError::Persist(e.to_string()));
        }

        info!(request_id = %request_id, digest = %digest, "save issued");
        Ok(request_id)
    }

    /// Save and wait until the host settles the request.
    ///
    /// Messages that arrive meanwhile are handled normally. If the request
    /// does not settle in time the guard stays armed until it does, or until
    /// the echo timeout clears it.
    pub fn save(&mut self, store: &mut ConfigStore) -> Result<(), SyncError> {
        let request_id = self.begin_save(store)?;
        let deadline = Instant::now() + self.config.persist_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = match self.transport.recv(remaining)? {
                Some(message) => message,
                None => {
                    warn!(request_id = %request_id, "save not settled in time");
                    return Err(SyncError::PersistTimedOut {
                        request_id,
                        timeout: self.config.persist_timeout,
                    });
                }
            };

            match self.handle_message(store, message)? {
                SyncOutcome::SaveConfirmed { request_id: id } if id == request_id => return Ok(()),
                SyncOutcome::SaveFailed { request_id: id, error } if id == request_id => {
                    return Err(SyncError::Persist(error.to_string()))
                }
                _ => {}
            }
        }
    }

    /// Drain every message the host has pushed so far
    pub fn pump(&mut self, store: &mut ConfigStore) -> Result<Vec<SyncOutcome>, SyncError> {
        let mut outcomes = Vec::new();
        while let Some(message) = self.transport.recv(Duration::ZERO)? {
            outcomes.push(self.handle_message(store, message)?);
        }
        Ok(outcomes)
    }

    /// Apply one host message to `store`
    pub fn handle_message(
        &mut self,
        store: &mut ConfigStore,
        message: HostMessage,
    ) -> Result<SyncOutcome, SyncError> {
        match message {
            HostMessage::PersistResult {
                request_id,
                ok,
                error,
            } => self.on_persist_result(store, request_id, ok, error),
            HostMessage::Changed { document } => Ok(self.on_changed(store, document)),
            HostMessage::CatalogUpdated { feed } => {
                let pruned = store.apply_catalog(&feed);
                debug!(kind = ?feed.kind, entries = feed.entries.len(), pruned = pruned.len(), "catalog applied");
                Ok(SyncOutcome::CatalogApplied {
                    kind: feed.kind,
                    pruned,
                })
            }
        }
    }

    fn on_persist_result(
        &mut self,
        store: &mut ConfigStore,
        request_id: String,
        ok: bool,
        error: Option<HostError>,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(save) = self.guard.settle(&request_id) else {
            debug!(request_id = %request_id, ok, "result for untracked request");
            return Ok(SyncOutcome::StaleResult { request_id });
        };

        if ok && save.superseded {
            // The host already holds a newer document and the store was
            // replaced with it.
            self.status.saves_confirmed += 1;
            self.status.last_saved_at = Some(Utc::now());
            info!(request_id = %request_id, "save confirmed but superseded by external change");
            Ok(SyncOutcome::SaveConfirmed { request_id })
        } else if ok {
            if !save.echo_seen {
                self.guard.await_late_echo(&save, Instant::now());
            }
            store.mark_saved(save.document)?;
            self.status.saves_confirmed += 1;
            self.status.last_saved_at = Some(Utc::now());
            info!(request_id = %request_id, dirty = store.is_dirty(), "save confirmed");
            Ok(SyncOutcome::SaveConfirmed { request_id })
        } else {
            let error = error.unwrap_or_else(|| HostError::storage_failure("host reported failure without details"));
            self.status.save_failures += 1;
            warn!(request_id = %request_id, error = %error, "save failed");
            Ok(SyncOutcome::SaveFailed { request_id, error })
        }
    }

    fn on_changed(&mut self, store: &mut ConfigStore, document: SettingsDocument) -> SyncOutcome {
        let digest = document.digest().ok();

        match self
            .guard
            .classify(digest.as_deref(), self.config.echo_timeout, Instant::now())
        {
            Inbound::Echo {
                request_id,
                digest_matches,
            } => {
                if !digest_matches {
                    warn!(request_id = %request_id, "echo differs from the saved document; discarding anyway");
                }
                self.status.echoes_suppressed += 1;
                debug!(request_id = %request_id, "echo suppressed");
                SyncOutcome::EchoSuppressed { request_id }
            }
            Inbound::External => self.replace(store, document),
            Inbound::ExternalAfterExpiry { request_id } => {
                self.status.guards_expired += 1;
                warn!(request_id = %request_id, "echo guard expired before change arrived");
                self.replace(store, document)
            }
        }
    }

    fn replace(&mut self, store: &mut ConfigStore, document: SettingsDocument) -> SyncOutcome {
        let repaired = store.replace_from_host(document);
        self.status.external_changes += 1;
        self.status.last_external_change_at = Some(Utc::now());
        info!(revision = ?store.revision(), "settings replaced by external change");
        SyncOutcome::ExternalReplaced {
            revision: store.revision(),
            repaired,
        }
    }

    fn note_expired(&mut self, request_id: &str) {
        self.status.guards_expired += 1;
        warn!(request_id = %request_id, "echo guard expired before its echo arrived");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use serde_json::json;

    fn setup() -> (MockHost, SyncBridge, ConfigStore) {
        let host = MockHost::new(SettingsDocument::default());
        let mut bridge = SyncBridge::new(Arc::new(host.clone()));
        let mut store = ConfigStore::new();
        bridge.load(&mut store, None).unwrap();
        (host, bridge, store)
    }

    #[test]
    fn test_load_installs_snapshot() {
        let (_host, bridge, store) = setup();
        assert!(store.is_loaded());
        assert!(!store.is_dirty());
        assert!(bridge.status().last_loaded_at.is_some());
    }

    #[test]
    fn test_load_failure_is_fatal_error() {
        let host = MockHost::default();
        host.fail_load(HostError::storage_failure("disk gone"));
        let mut bridge = SyncBridge::new(Arc::new(host));
        let mut store = ConfigStore::new();

        let err = bridge.load(&mut store, None).unwrap_err();
        assert!(matches!(err, SyncError::Load(_)));
        assert!(!store.is_loaded());
    }

    #[test]
    fn test_save_round_trip() {
        let (host, mut bridge, mut store) = setup();
        store.patch("", json!({"language": "ko"})).unwrap();

        bridge.save(&mut store).unwrap();
        assert!(!store.is_dirty());
        assert!(bridge.guard().is_idle());
        assert_eq!(host.document().language, "ko");
        assert_eq!(bridge.status().echoes_suppressed, 1);
    }

    #[test]
    fn test_second_save_while_in_flight_rejected() {
        let (_host, mut bridge, store) = setup();
        let first = bridge.begin_save(&store).unwrap();
        match bridge.begin_save(&store) {
            Err(SyncError::SaveInFlight(id)) => assert_eq!(id, first),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_catalog_message_prunes() {
        let (host, mut bridge, mut store) = setup();
        store
            .patch("", json!({"activeThemes": ["a", "b", "c"]}))
            .unwrap();

        host.push_catalog(shellconf_protocol::CatalogFeed::from_ids(
            ResourceKind::Theme,
            ["a", "c"],
        ));
        let outcomes = bridge.pump(&mut store).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(store.get().unwrap().active_themes, vec!["a", "c"]);
    }
}
