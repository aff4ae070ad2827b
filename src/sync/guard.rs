//! Echo suppression guard
//!
//! Guard states: IDLE → AWAITING_ECHO → IDLE
//!               IDLE → AWAITING_ECHO → AWAITING_LATE_ECHO → IDLE
//!
//! Armed when a save is issued, cleared when that save's persist request
//! settles (success or failure), or when it has been armed longer than the
//! configured timeout. While armed, the first inbound change is taken to be
//! the host echoing our own save back; any further change before the request
//! settles is genuine.
//!
//! A host may confirm a save before its echo arrives. The guard then keeps
//! the confirmed digest and suppresses one inbound change carrying exactly
//! that digest. Any other change is genuine and clears it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shellconf_protocol::SettingsDocument;

/// A save whose persist request has not settled yet
#[derive(Debug, Clone)]
pub struct InFlightSave {
    pub request_id: String,
    /// Digest of the document handed to the host
    pub digest: String,
    pub document: Arc<SettingsDocument>,
    pub armed_at: Instant,
    /// Whether the echo of this save has already been consumed
    pub echo_seen: bool,
    /// An external change arrived after the echo, so the host no longer
    /// holds this document
    pub superseded: bool,
}

impl InFlightSave {
    pub fn new(request_id: String, digest: String, document: Arc<SettingsDocument>) -> Self {
        Self {
            request_id,
            digest,
            document,
            armed_at: Instant::now(),
            echo_seen: false,
            superseded: false,
        }
    }
}

/// A confirmed save whose echo has not come back yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledSave {
    pub request_id: String,
    pub digest: String,
    pub settled_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub enum EchoGuard {
    #[default]
    Idle,
    AwaitingEcho(InFlightSave),
    AwaitingLateEcho(SettledSave),
}

/// How an inbound change notification is to be treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Round-trip confirmation of our own save; discard
    Echo {
        request_id: String,
        /// Whether the inbound document hashes to what we sent
        digest_matches: bool,
    },
    /// Change made by someone else
    External,
    /// Guard had been armed past its timeout and was cleared first
    ExternalAfterExpiry { request_id: String },
}

impl EchoGuard {
    pub fn is_idle(&self) -> bool {
        matches!(self, EchoGuard::Idle)
    }

    pub fn in_flight(&self) -> Option<&InFlightSave> {
        match self {
            EchoGuard::AwaitingEcho(save) => Some(save),
            _ => None,
        }
    }

    pub fn late_echo(&self) -> Option<&SettledSave> {
        match self {
            EchoGuard::AwaitingLateEcho(settled) => Some(settled),
            _ => None,
        }
    }

    /// Arm for a new save; replaces a pending late echo
    pub fn arm(&mut self, save: InFlightSave) {
        *self = EchoGuard::AwaitingEcho(save);
    }

    pub fn clear(&mut self) -> Option<InFlightSave> {
        match std::mem::take(self) {
            EchoGuard::AwaitingEcho(save) => Some(save),
            _ => None,
        }
    }

    /// Wait for the echo of a save the host confirmed before echoing it.
    ///
    /// Only takes effect when the guard is idle.
    pub fn await_late_echo(&mut self, save: &InFlightSave, now: Instant) {
        if self.is_idle() {
            *self = EchoGuard::AwaitingLateEcho(SettledSave {
                request_id: save.request_id.clone(),
                digest: save.digest.clone(),
                settled_at: now,
            });
        }
    }

    /// Clear the guard if it belongs to `request_id`.
    ///
    /// A result for any other request leaves the guard untouched.
    pub fn settle(&mut self, request_id: &str) -> Option<InFlightSave> {
        let matches = self
            .in_flight()
            .is_some_and(|save| save.request_id == request_id);
        if matches {
            self.clear()
        } else {
            None
        }
    }

    /// Clear the guard if it has been waiting for at least `timeout`.
    ///
    /// Returns the request id the guard was held for.
    pub fn expire(&mut self, timeout: Option<Duration>, now: Instant) -> Option<String> {
        let since = match self {
            EchoGuard::Idle => return None,
            EchoGuard::AwaitingEcho(save) => save.armed_at,
            EchoGuard::AwaitingLateEcho(settled) => settled.settled_at,
        };
        let timeout = timeout?;
        if now.saturating_duration_since(since) < timeout {
            return None;
        }
        match std::mem::take(self) {
            EchoGuard::Idle => None,
            EchoGuard::AwaitingEcho(save) => Some(save.request_id),
            EchoGuard::AwaitingLateEcho(settled) => Some(settled.request_id),
        }
    }

    /// Classify an inbound change notification carrying `inbound_digest`
    pub fn classify(
        &mut self,
        inbound_digest: Option<&str>,
        timeout: Option<Duration>,
        now: Instant,
    ) -> Inbound {
        if let Some(request_id) = self.expire(timeout, now) {
            return Inbound::ExternalAfterExpiry { request_id };
        }

        let inbound = match self {
            EchoGuard::Idle => Inbound::External,
            EchoGuard::AwaitingEcho(save) if save.echo_seen => {
                save.superseded = true;
                return Inbound::External;
            }
            EchoGuard::AwaitingEcho(save) => {
                save.echo_seen = true;
                return Inbound::Echo {
                    request_id: save.request_id.clone(),
                    digest_matches: inbound_digest == Some(save.digest.as_str()),
                };
            }
            EchoGuard::AwaitingLateEcho(settled) if inbound_digest == Some(settled.digest.as_str()) => {
                Inbound::Echo {
                    request_id: settled.request_id.clone(),
                    digest_matches: true,
                }
            }
            EchoGuard::AwaitingLateEcho(_) => Inbound::External,
        };
        *self = EchoGuard::Idle;
        inbound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed(at: Instant) -> EchoGuard {
        let mut guard = EchoGuard::Idle;
        let mut save = InFlightSave::new(
            "req-1".to_string(),
            "abc".to_string(),
            Arc::new(SettingsDocument::default()),
        );
        save.armed_at = at;
        guard.arm(save);
        guard
    }

    #[test]
    fn test_idle_means_external() {
        let mut guard = EchoGuard::Idle;
        assert_eq!(guard.classify(None, None, Instant::now()), Inbound::External);
    }

    #[test]
    fn test_first_inbound_is_echo_second_is_external() {
        let now = Instant::now();
        let mut guard = armed(now);

        assert_eq!(
            guard.classify(Some("abc"), None, now),
            Inbound::Echo {
                request_id: "req-1".to_string(),
                digest_matches: true
            }
        );
        assert_eq!(guard.classify(Some("abc"), None, now), Inbound::External);
        assert!(!guard.is_idle());
        assert!(guard.in_flight().unwrap().superseded);
    }

    #[test]
    fn test_digest_mismatch_still_echo() {
        let now = Instant::now();
        let mut guard = armed(now);
        match guard.classify(Some("other"), None, now) {
            Inbound::Echo { digest_matches, .. } => assert!(!digest_matches),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_settle_only_matching_request() {
        let mut guard = armed(Instant::now());
        assert!(guard.settle("req-0").is_none());
        assert!(!guard.is_idle());
        assert!(guard.settle("req-1").is_some());
        assert!(guard.is_idle());
    }

    #[test]
    fn test_timeout_expires_guard() {
        let start = Instant::now();
        let mut guard = armed(start);
        let timeout = Some(Duration::from_secs(30));

        assert!(guard.expire(timeout, start + Duration::from_secs(29)).is_none());
        assert_eq!(
            guard.classify(Some("abc"), timeout, start + Duration::from_secs(30)),
            Inbound::ExternalAfterExpiry {
                request_id: "req-1".to_string()
            }
        );
        assert!(guard.is_idle());
    }

    fn awaiting_late_echo(at: Instant) -> EchoGuard {
        let mut guard = armed(at);
        let save = guard.settle("req-1").unwrap();
        guard.await_late_echo(&save, at);
        guard
    }

    #[test]
    fn test_late_echo_with_matching_digest_is_suppressed() {
        let now = Instant::now();
        let mut guard = awaiting_late_echo(now);
        assert_eq!(guard.late_echo().unwrap().request_id, "req-1");

        assert_eq!(
            guard.classify(Some("abc"), None, now),
            Inbound::Echo {
                request_id: "req-1".to_string(),
                digest_matches: true
            }
        );
        assert!(guard.is_idle());
        assert_eq!(guard.classify(Some("abc"), None, now), Inbound::External);
    }

    #[test]
    fn test_late_echo_other_digest_is_external() {
        let now = Instant::now();
        let mut guard = awaiting_late_echo(now);
        assert_eq!(guard.classify(Some("other"), None, now), Inbound::External);
        assert!(guard.is_idle());
    }

    #[test]
    fn test_late_echo_expires() {
        let start = Instant::now();
        let mut guard = awaiting_late_echo(start);
        let timeout = Some(Duration::from_secs(30));

        assert_eq!(
            guard.expire(timeout, start + Duration::from_secs(30)).as_deref(),
            Some("req-1")
        );
        assert!(guard.is_idle());
    }

    #[test]
    fn test_late_echo_only_from_idle() {
        let now = Instant::now();
        let mut guard = armed(now);
        let other = InFlightSave::new(
            "req-0".to_string(),
            "zzz".to_string(),
            Arc::new(SettingsDocument::default()),
        );
        guard.await_late_echo(&other, now);
        assert_eq!(guard.in_flight().unwrap().request_id, "req-1");
    }

    #[test]
    fn test_no_timeout_never_expires() {
        let start = Instant::now();
        let mut guard = armed(start);
        assert!(guard
            .expire(None, start + Duration::from_secs(86_400))
            .is_none());
    }
}
