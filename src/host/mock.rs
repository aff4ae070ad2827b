//! In-process mock host
//!
//! Stores the document in memory and pushes messages the way a real host
//! would: a successful persist produces a change notification (the echo)
//! followed by the persist result. Tests can reorder, withhold or fail any
//! of these to force the races the sync protocol has to survive.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shellconf_protocol::{
    ops, CatalogFeed, HostError, HostMessage, HostRequest, HostResponse, SettingsDocument,
    PROTOCOL_MAX, PROTOCOL_MIN,
};

use super::transport::{HostTransport, TransportError};

#[derive(Debug, Default)]
struct MockHostState {
    document: SettingsDocument,
    inbox: VecDeque<HostMessage>,
    held: VecDeque<HostMessage>,
    paused: bool,
    drop_echoes: bool,
    drop_results: bool,
    result_first: bool,
    persist_failures: VecDeque<HostError>,
    load_failure: Option<HostError>,
    persisted: Vec<SettingsDocument>,
    requests: Vec<HostRequest>,
}

impl MockHostState {
    fn push(&mut self, message: HostMessage) {
        if self.paused {
            self.held.push_back(message);
        } else {
            self.inbox.push_back(message);
        }
    }
}

/// Mock host; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockHostState>>,
}

impl MockHost {
    /// Create a mock host serving `document`
    pub fn new(document: SettingsDocument) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockHostState {
                document,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Public API for test configuration ===

    /// Document currently held by the host
    pub fn document(&self) -> SettingsDocument {
        self.lock().document.clone()
    }

    /// Every document accepted by persist, oldest first
    pub fn persisted(&self) -> Vec<SettingsDocument> {
        self.lock().persisted.clone()
    }

    /// Every request received, oldest first
    pub fn requests(&self) -> Vec<HostRequest> {
        self.lock().requests.clone()
    }

    /// Messages waiting to be received
    pub fn pending(&self) -> usize {
        self.lock().inbox.len()
    }

    /// Hold back every pushed message until [`MockHost::resume`]
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Release held messages in their original order
    pub fn resume(&self) {
        let mut state = self.lock();
        state.paused = false;
        let held: Vec<HostMessage> = state.held.drain(..).collect();
        state.inbox.extend(held);
    }

    /// Persist without emitting the change notification
    pub fn set_drop_echoes(&self, drop: bool) {
        self.lock().drop_echoes = drop;
    }

    /// Persist without ever settling the request
    pub fn set_drop_results(&self, drop: bool) {
        self.lock().drop_results = drop;
    }

    /// Settle each persist before emitting its change notification
    pub fn set_result_before_echo(&self, result_first: bool) {
        self.lock().result_first = result_first;
    }

    /// Fail the next persist with `error`
    pub fn fail_next_persist(&self, error: HostError) {
        self.lock().persist_failures.push_back(error);
    }

    /// Fail every load with `error`
    pub fn fail_load(&self, error: HostError) {
        self.lock().load_failure = Some(error);
    }

    /// Simulate another writer changing the persisted document
    pub fn push_external_change(&self, document: SettingsDocument) {
        let mut state = self.lock();
        state.document = document.clone();
        state.push(HostMessage::Changed { document });
    }

    /// Simulate a catalog refresh
    pub fn push_catalog(&self, feed: CatalogFeed) {
        self.lock().push(HostMessage::CatalogUpdated { feed });
    }

    // === Request handling ===

    fn check_version(request: &HostRequest) -> Result<(), HostError> {
        if request.protocol_version < PROTOCOL_MIN || request.protocol_version > PROTOCOL_MAX {
            return Err(HostError::unsupported_protocol(
                request.protocol_version,
                PROTOCOL_MIN,
                PROTOCOL_MAX,
            ));
        }
        Ok(())
    }

    fn handle_persist(state: &mut MockHostState, request: &HostRequest) {
        let request_id = request.request_id.clone();

        let document = match request.document() {
            Ok(Some(document)) => document,
            Ok(None) => {
                state.push(HostMessage::persist_failed(
                    request_id,
                    HostError::invalid_request("persist without document"),
                ));
                return;
            }
            Err(e) => {
                state.push(HostMessage::persist_failed(
                    request_id,
                    HostError::invalid_request(e.to_string()),
                ));
                return;
            }
        };

        let digest_ok = match (request.digest(), document.digest()) {
            (Some(claimed), Ok(actual)) => claimed == actual,
            _ => false,
        };
        if !digest_ok {
            state.push(HostMessage::persist_failed(
                request_id,
                HostError::invalid_request("document digest mismatch"),
            ));
            return;
        }

        if let Some(error) = state.persist_failures.pop_front() {
            state.push(HostMessage::persist_failed(request_id, error));
            return;
        }

        state.document = document.clone();
        state.persisted.push(document.clone());
        let echo = (!state.drop_echoes).then(|| HostMessage::Changed { document });
        let result = (!state.drop_results).then(|| HostMessage::persisted(request_id));
        let ordered = if state.result_first {
            [result, echo]
        } else {
            [echo, result]
        };
        for message in ordered.into_iter().flatten() {
            state.push(message);
        }
    }
}

impl HostTransport for MockHost {
    fn request(&self, request: &HostRequest) -> Result<HostResponse, TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let request_id = request.request_id.clone();
        if let Err(e) = Self::check_version(request) {
            return Ok(HostResponse::error(PROTOCOL_MAX, request_id, e));
        }

        if request.op != ops::LOAD {
            return Ok(HostResponse::error(
                request.protocol_version,
                request_id,
                HostError::unknown_operation(&request.op),
            ));
        }

        if let Some(error) = state.load_failure.clone() {
            return Ok(HostResponse::error(request.protocol_version, request_id, error));
        }

        let payload = serde_json::json!({ "document": serde_json::to_value(&state.document)? });
        Ok(HostResponse::success(request.protocol_version, request_id, payload))
    }

    fn submit(&self, request: &HostRequest) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        Self::check_version(request)?;
        if request.op != ops::PERSIST {
            return Err(HostError::unknown_operation(&request.op).into());
        }

        Self::handle_persist(&mut state, request);
        Ok(())
    }

    fn recv(&self, _timeout: Duration) -> Result<Option<HostMessage>, TransportError> {
        Ok(self.lock().inbox.pop_front())
    }
}
