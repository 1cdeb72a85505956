use std::collections::VecDeque;

use crate::protocol::Frame;

/// Where a connection stands in the BCP handshake.
///
/// `AwaitingStatus` is the interlock: after a DELIVER is written, no
/// further queued frame flows to that client until its STATUS arrives.
/// `Failed` and `Closing` are terminal; a session never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, REGISTER not yet seen
    PreRegister,
    /// Registered and idle
    Available,
    /// A DELIVER is unacknowledged; outbound traffic is gated
    AwaitingStatus,
    /// Protocol or I/O error observed; a STATUS(1) farewell is owed
    Failed,
    /// Teardown in progress
    Closing,
}

/// Per-connection record: identity, state, activity stamp, and the FIFO
/// queue of frames owed to the client.
#[derive(Debug)]
pub struct Session {
    pub(crate) username: Option<String>,
    pub(crate) state: SessionState,
    pub(crate) last_active: u64,
    pub(crate) stat_msg: String,
    pub(crate) tx_queue: VecDeque<Frame>,
}

impl Session {
    pub(crate) fn new(now: u64) -> Self {
        Session {
            username: None,
            state: SessionState::PreRegister,
            last_active: now,
            stat_msg: String::new(),
            tx_queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Name used in the "has left" notice for this session.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("An unregistered user")
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Failed | SessionState::Closing)
    }

    pub(crate) fn is_expired(&self, now: u64, timeout_secs: u64) -> bool {
        now.saturating_sub(self.last_active) > timeout_secs
    }

    pub(crate) fn queue_frame(&mut self, frame: Frame) {
        self.tx_queue.push_back(frame);
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.tx_queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_pre_register() {
        let session = Session::new(100);
        assert_eq!(session.state(), SessionState::PreRegister);
        assert_eq!(session.username(), None);
        assert!(!session.has_pending());
    }

    #[test]
    fn test_expiry_boundary() {
        let session = Session::new(100);
        assert!(!session.is_expired(160, 60));
        assert!(session.is_expired(161, 60));
    }

    #[test]
    fn test_display_name_fallback() {
        let mut session = Session::new(0);
        assert_eq!(session.display_name(), "An unregistered user");
        session.username = Some("alice".to_string());
        assert_eq!(session.display_name(), "alice");
    }
}
