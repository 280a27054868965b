//! Reconnect-relevant session identity tracked across the lifetime of a
//! [`Connection`](crate::connection::Connection).

/// Mutable session bookkeeping, updated only in response to inbound gateway
/// traffic.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Session identifier handed out in the READY dispatch.
    session_id: Option<Box<str>>,
    /// Last sequence number observed on an inbound DISPATCH.
    sequence: Option<u64>,
    /// Gateway URL to use for a RESUME, as supplied by READY.
    resume_gateway_url: Option<Box<str>>,
    /// Heartbeat interval in seconds, as supplied by HELLO.
    heartbeat_interval: Option<u64>,
    /// Whether the most recently sent heartbeat has been acknowledged.
    acknowledged: bool,
    /// Whether a close has been initiated locally or observed from the peer.
    closing: bool,
    /// Whether the underlying transport has fully closed.
    closed: bool,
    /// Number of `reconnect()` calls since the last HELLO.
    reconnect_attempts: u32,
    /// Classification of the most recent close, if any.
    last_close: Option<crate::close::CloseClassification>,
}

impl SessionState {
    /// Construct a fresh session with no prior identity.
    pub fn new() -> Self {
        Self {
            acknowledged: true,
            ..Self::default()
        }
    }

    /// Session identifier, if a READY has been received.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Last observed sequence number.
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Gateway URL to resume against, if known.
    pub fn resume_gateway_url(&self) -> Option<&str> {
        self.resume_gateway_url.as_deref()
    }

    /// Heartbeat interval in seconds, if HELLO has been received.
    pub const fn heartbeat_interval(&self) -> Option<u64> {
        self.heartbeat_interval
    }

    /// Whether the most recently sent heartbeat has been acknowledged.
    pub const fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    /// Whether a close handshake is in progress.
    pub const fn closing(&self) -> bool {
        self.closing
    }

    /// Whether the connection has fully closed.
    pub const fn closed(&self) -> bool {
        self.closed
    }

    /// Number of reconnection attempts made since the last HELLO.
    pub const fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the next identification should be a RESUME rather than an
    /// IDENTIFY.
    pub fn should_resume(&self) -> bool {
        self.session_id.is_some()
            && self.sequence.is_some()
            && matches!(self.last_close, Some(class) if class.is_resumable())
    }

    /// Whether `Connection::reconnect` may still be called.
    pub fn should_reconnect(&self) -> bool {
        match self.last_close {
            Some(class) => class.should_reconnect(),
            None => true,
        }
    }

    /// Classification of the most recent resolved close, if any.
    pub const fn last_close(&self) -> Option<crate::close::CloseClassification> {
        self.last_close
    }

    pub(crate) fn record_hello(&mut self, heartbeat_interval_ms: u64) {
        self.heartbeat_interval = Some(heartbeat_interval_ms / 1000);
        self.reconnect_attempts = 0;
        self.acknowledged = true;
    }

    pub(crate) fn record_dispatch(&mut self, sequence: u64, event_name: &str, ready_session_id: Option<&str>, ready_resume_url: Option<&str>) {
        self.sequence = Some(self.sequence.map_or(sequence, |prev| prev.max(sequence)));

        if event_name == "READY" {
            self.session_id = ready_session_id.map(Into::into);
            self.resume_gateway_url = ready_resume_url.map(Into::into);
        }
    }

    pub(crate) fn record_heartbeat_sent(&mut self) {
        self.acknowledged = false;
    }

    pub(crate) fn record_heartbeat_ack(&mut self) {
        self.acknowledged = true;
    }

    pub(crate) fn record_invalid_session(&mut self, resumable: bool) {
        if !resumable {
            self.session_id = None;
            self.sequence = None;
        }
    }

    pub(crate) fn begin_closing(&mut self) {
        self.closing = true;
    }

    pub(crate) fn finish_closed(&mut self, class: crate::close::CloseClassification) {
        self.closing = true;
        self.closed = true;
        self.last_close = Some(class);
    }

    pub(crate) fn reset_for_reconnect(&mut self, class: crate::close::CloseClassification) {
        self.closing = false;
        self.closed = false;
        self.acknowledged = true;
        self.heartbeat_interval = None;

        if class == crate::close::CloseClassification::Graceful {
            self.reconnect_attempts = 0;
        } else {
            self.reconnect_attempts += 1;
        }

        if !class.is_resumable() {
            self.session_id = None;
            self.sequence = None;
            self.resume_gateway_url = None;
        }
    }
}

/// Read-only projection of [`SessionState`] safe to observe from another
/// thread without holding the same lock used for mutation.
///
/// See the crate-level concurrency notes for which fields this covers.
#[derive(Clone, Copy, Debug)]
pub struct SessionView {
    /// Whether a close handshake is in progress.
    pub closing: bool,
    /// Whether the connection has fully closed.
    pub closed: bool,
    /// Heartbeat interval in seconds, if known.
    pub heartbeat_interval: Option<u64>,
}

impl From<&SessionState> for SessionView {
    fn from(state: &SessionState) -> Self {
        Self {
            closing: state.closing,
            closed: state.closed,
            heartbeat_interval: state.heartbeat_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState;
    use crate::close::CloseClassification;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(SessionState: Clone, Debug, Send, Sync);

    #[test]
    fn fresh_session_has_no_identity() {
        let session = SessionState::new();
        assert!(session.session_id().is_none());
        assert!(session.sequence().is_none());
        assert!(session.acknowledged());
        assert!(!session.should_resume());
    }

    #[test]
    fn hello_resets_attempts_and_acknowledgement() {
        let mut session = SessionState::new();
        session.reconnect_attempts = 3;
        session.acknowledged = false;
        session.record_hello(41_250);
        assert_eq!(Some(41), session.heartbeat_interval());
        assert_eq!(0, session.reconnect_attempts());
        assert!(session.acknowledged());
    }

    #[test]
    fn dispatch_updates_sequence_monotonically() {
        let mut session = SessionState::new();
        session.record_dispatch(5, "MESSAGE_CREATE", None, None);
        session.record_dispatch(3, "MESSAGE_CREATE", None, None);
        assert_eq!(Some(5), session.sequence());
    }

    #[test]
    fn ready_captures_identity() {
        let mut session = SessionState::new();
        session.record_dispatch(1, "READY", Some("abc123"), Some("wss://resume.example"));
        assert_eq!(Some("abc123"), session.session_id());
        assert_eq!(Some("wss://resume.example"), session.resume_gateway_url());
    }

    #[test]
    fn resumable_close_then_reconnect_preserves_identity() {
        let mut session = SessionState::new();
        session.record_dispatch(1, "READY", Some("abc123"), Some("wss://resume.example"));
        session.finish_closed(CloseClassification::ResumableDisconnect);
        assert!(session.should_resume());

        session.reset_for_reconnect(CloseClassification::ResumableDisconnect);
        assert_eq!(Some("abc123"), session.session_id());
        assert_eq!(1, session.reconnect_attempts());
    }

    #[test]
    fn non_resumable_close_clears_identity() {
        let mut session = SessionState::new();
        session.record_dispatch(1, "READY", Some("abc123"), Some("wss://resume.example"));
        session.reset_for_reconnect(CloseClassification::NonResumableDisconnect);
        assert!(session.session_id().is_none());
        assert!(session.sequence().is_none());
    }
}
