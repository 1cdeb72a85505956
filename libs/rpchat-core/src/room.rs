//! The chat room: connection registry, per-session frame dispatch, and
//! broadcast fan-out.
//!
//! A runtime holds the room behind one mutex and calls into it from every
//! connection task. Cross-connection effects (registration uniqueness,
//! broadcasts, leave notices) are serialized by that mutex; per-connection
//! frame order is the order of each session's own queue.

use std::collections::BTreeMap;

use log::info;

use crate::error::RoomError;
use crate::protocol::{Deliver, Frame, Status, MAX_STR};
use crate::sanitize::sanitize;
use crate::session::{Session, SessionState};
use crate::SessionId;

/// Sender name used for system notices.
pub const SERVER_IDENTITY: &str = "[Server]";

pub struct Room {
    /// Sessions in attach order (ids are monotonic).
    sessions: BTreeMap<SessionId, Session>,
    server_name: String,
    timeout_secs: u64,
    max_clients: usize,
}

impl Room {
    pub fn new(timeout_secs: u64, max_clients: usize) -> Self {
        Room {
            sessions: BTreeMap::new(),
            server_name: SERVER_IDENTITY.to_string(),
            timeout_secs,
            max_clients,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Admit a freshly accepted connection in `PreRegister` state.
    pub fn attach(&mut self, id: SessionId, now: u64) -> Result<(), RoomError> {
        if self.sessions.len() >= self.max_clients {
            return Err(RoomError::AtCapacity {
                max: self.max_clients,
            });
        }
        self.sessions.insert(id, Session::new(now));
        Ok(())
    }

    /// Dispatch one inbound frame against the session's state machine.
    ///
    /// On failure the session is marked `Failed` with the human-readable
    /// reason seeded for the farewell STATUS, and the error is returned so
    /// the caller can begin teardown.
    pub fn handle_frame(
        &mut self,
        id: SessionId,
        frame: Frame,
        now: u64,
    ) -> Result<(), RoomError> {
        let state = {
            let session = self
                .sessions
                .get_mut(&id)
                .ok_or(RoomError::UnknownSession { id })?;
            session.last_active = now;
            session.state
        };

        let result = match state {
            SessionState::PreRegister => match frame {
                Frame::Register(register) => self.handle_register(id, &register.username),
                other => Err(RoomError::UnexpectedFrame {
                    opcode: other.opcode(),
                    state,
                }),
            },
            SessionState::Available => match frame {
                Frame::Send(send) => self.handle_send(id, &send.message),
                other => Err(RoomError::UnexpectedFrame {
                    opcode: other.opcode(),
                    state,
                }),
            },
            SessionState::AwaitingStatus => match frame {
                Frame::Status(status) if status.is_ok() => {
                    self.set_state(id, SessionState::Available);
                    Ok(())
                }
                Frame::Status(status) => Err(RoomError::DeliveryRejected { code: status.code }),
                other => Err(RoomError::UnexpectedFrame {
                    opcode: other.opcode(),
                    state,
                }),
            },
            // teardown already owns the session; late frames are dropped
            SessionState::Failed | SessionState::Closing => Ok(()),
        };

        if let Err(err) = &result {
            self.fail(id, err.to_string());
        }
        result
    }

    fn handle_register(&mut self, id: SessionId, raw_username: &[u8]) -> Result<(), RoomError> {
        let username = sanitize(raw_username, false);
        if username.is_empty() {
            return Err(RoomError::EmptyUsername);
        }
        if self
            .sessions
            .values()
            .any(|session| session.username.as_deref() == Some(username.as_str()))
        {
            return Err(RoomError::DuplicateUsername { username });
        }

        {
            let session = self
                .sessions
                .get_mut(&id)
                .ok_or(RoomError::UnknownSession { id })?;
            session.username = Some(username.clone());
            session.state = SessionState::Available;
        }

        // private login notice, sent right after the acknowledgment
        let mut login_msg = format!("Logged in as {}.\nCurrent Clients: \n", username);
        if self.registered_count() > 1 {
            login_msg.push_str(&self.list_users());
        }
        login_msg.truncate(MAX_STR);
        let server_name = self.server_name.clone();
        if let Some(session) = self.sessions.get_mut(&id) {
            // handshake frames go ahead of any broadcast held while the
            // session was still unregistered
            session
                .tx_queue
                .push_front(Frame::Deliver(Deliver::new(&server_name, &login_msg)));
            session.tx_queue.push_front(Frame::Status(Status::ok()));
        }

        let join_msg = format!("{} has joined the server.", username);
        self.broadcast(id, &server_name, &join_msg);
        Ok(())
    }

    fn handle_send(&mut self, id: SessionId, raw_message: &[u8]) -> Result<(), RoomError> {
        let sender = self
            .sessions
            .get(&id)
            .and_then(|session| session.username.clone())
            .ok_or(RoomError::UnknownSession { id })?;
        let message = sanitize(raw_message, true);

        if let Some(session) = self.sessions.get_mut(&id) {
            session.queue_frame(Frame::Status(Status::ok()));
        }
        self.broadcast(id, &sender, &message);
        Ok(())
    }

    /// Queue a DELIVER against every live session except the sender.
    ///
    /// Sessions in `Failed` or `Closing` are skipped; `PreRegister`
    /// sessions queue the frame but their gate holds it until they
    /// register.
    fn broadcast(&mut self, sender: SessionId, from: &str, message: &str) {
        info!("{}: {}", from, message);
        for (id, session) in self.sessions.iter_mut() {
            if *id == sender || session.is_terminal() {
                continue;
            }
            session.queue_frame(Frame::Deliver(Deliver::new(from, message)));
        }
    }

    /// Pop the next frame permitted to flow to this client.
    ///
    /// Only an `Available` session yields frames. Popping a DELIVER arms
    /// the interlock: the session moves to `AwaitingStatus` and yields
    /// nothing further until the client's STATUS is handled.
    pub fn next_outbound(&mut self, id: SessionId) -> Option<Frame> {
        let session = self.sessions.get_mut(&id)?;
        if session.state != SessionState::Available {
            return None;
        }
        let frame = session.tx_queue.pop_front()?;
        if matches!(frame, Frame::Deliver(_)) {
            session.state = SessionState::AwaitingStatus;
        }
        Some(frame)
    }

    pub fn has_pending(&self, id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .map(Session::has_pending)
            .unwrap_or(false)
    }

    /// Ids of every session with at least one queued frame.
    pub fn sessions_with_pending(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.has_pending())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Mark a session fatally broken, seeding the farewell reason.
    ///
    /// No-op once the session is already terminal, so the first recorded
    /// reason wins.
    pub fn fail(&mut self, id: SessionId, reason: impl Into<String>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            if !session.is_terminal() {
                session.state = SessionState::Failed;
                session.stat_msg = reason.into();
            }
        }
    }

    pub fn session_failed(&self, id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .map(|session| session.state == SessionState::Failed)
            .unwrap_or(false)
    }

    /// Consume the farewell STATUS for a failed session and move it to
    /// `Closing`. Sessions torn down without a failure (clean shutdown)
    /// move to `Closing` with no farewell.
    pub fn close_status(&mut self, id: SessionId) -> Option<Frame> {
        let session = self.sessions.get_mut(&id)?;
        let farewell = match session.state {
            SessionState::Failed => {
                let reason = std::mem::take(&mut session.stat_msg);
                Some(Frame::Status(Status::error(reason)))
            }
            _ => None,
        };
        session.state = SessionState::Closing;
        farewell
    }

    /// Hand over everything still queued for a session about to close.
    ///
    /// The interlock is waived: the connection is going away, so there is
    /// no further STATUS to wait for. Unregistered and failed sessions
    /// yield nothing, matching the outbound gate.
    pub fn drain_parting(&mut self, id: SessionId) -> Vec<Frame> {
        match self.sessions.get_mut(&id) {
            Some(session)
                if matches!(
                    session.state,
                    SessionState::Available | SessionState::AwaitingStatus
                ) =>
            {
                session.tx_queue.drain(..).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Sessions whose inactivity exceeds the configured timeout.
    pub fn expired(&self, now: u64) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|(_, session)| {
                !session.is_terminal() && session.is_expired(now, self.timeout_secs)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Remove the session and announce its departure to everyone left.
    ///
    /// Returns the ids of sessions that now hold queued frames, so the
    /// caller can wake their handlers. Every teardown path funnels through
    /// here, keeping the leave notice uniform.
    pub fn detach(&mut self, id: SessionId) -> Vec<SessionId> {
        let Some(session) = self.sessions.remove(&id) else {
            return Vec::new();
        };
        let notice = format!("{} has left the server.", session.display_name());
        let server_name = self.server_name.clone();
        self.broadcast(id, &server_name, &notice);
        self.sessions_with_pending()
    }

    fn set_state(&mut self, id: SessionId, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = state;
        }
    }

    fn registered_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.username.is_some())
            .count()
    }

    /// Comma-separated registered usernames, in attach order.
    fn list_users(&self) -> String {
        let mut output = String::new();
        for session in self.sessions.values() {
            if let Some(name) = &session.username {
                if !output.is_empty() {
                    output.push_str(", ");
                }
                output.push_str(name);
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Register, Send};

    fn frame_register(username: &[u8]) -> Frame {
        Frame::Register(Register {
            username: username.to_vec(),
        })
    }

    fn frame_send(message: &[u8]) -> Frame {
        Frame::Send(Send {
            message: message.to_vec(),
        })
    }

    fn register(room: &mut Room, id: SessionId, username: &[u8]) {
        room.attach(id, 0).unwrap();
        room.handle_frame(id, frame_register(username), 0).unwrap();
        // drain the registration handshake: STATUS(OK) then the login DELIVER
        assert!(matches!(
            room.next_outbound(id),
            Some(Frame::Status(status)) if status.is_ok()
        ));
        assert!(matches!(room.next_outbound(id), Some(Frame::Deliver(_))));
        room.handle_frame(id, Frame::Status(Status::ok()), 0).unwrap();
    }

    #[test]
    fn test_registration_queues_status_then_login_notice() {
        let mut room = Room::new(60, 16);
        room.attach(1, 0).unwrap();
        room.handle_frame(1, frame_register(b"alice"), 0).unwrap();

        assert_eq!(room.session(1).unwrap().username(), Some("alice"));
        assert_eq!(room.session(1).unwrap().state(), SessionState::Available);

        match room.next_outbound(1).unwrap() {
            Frame::Status(status) => assert!(status.is_ok()),
            other => panic!("expected STATUS first, got {:?}", other),
        }
        match room.next_outbound(1).unwrap() {
            Frame::Deliver(deliver) => {
                assert_eq!(deliver.from, SERVER_IDENTITY.as_bytes());
                assert_eq!(
                    deliver.message,
                    b"Logged in as alice.\nCurrent Clients: \n"
                );
            }
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_second_registration_lists_current_clients() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");

        room.attach(2, 0).unwrap();
        room.handle_frame(2, frame_register(b"bob"), 0).unwrap();
        let _status = room.next_outbound(2).unwrap();
        match room.next_outbound(2).unwrap() {
            Frame::Deliver(deliver) => {
                assert_eq!(
                    deliver.message,
                    b"Logged in as bob.\nCurrent Clients: \nalice, bob"
                );
            }
            other => panic!("expected DELIVER, got {:?}", other),
        }
        // alice was told about bob
        match room.next_outbound(1).unwrap() {
            Frame::Deliver(deliver) => {
                assert_eq!(deliver.message, b"bob has joined the server.");
            }
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"eve");

        room.attach(2, 0).unwrap();
        let err = room.handle_frame(2, frame_register(b"eve"), 0).unwrap_err();
        assert_eq!(
            err,
            RoomError::DuplicateUsername {
                username: "eve".to_string()
            }
        );
        assert!(room.session_failed(2));
    }

    #[test]
    fn test_near_duplicate_username_accepted() {
        // byte-exact comparison: a prefix is a different name
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"eve");
        room.attach(2, 0).unwrap();
        room.handle_frame(2, frame_register(b"ev"), 0).unwrap();
        assert_eq!(room.session(2).unwrap().username(), Some("ev"));
    }

    #[test]
    fn test_unsanitizable_username_rejected() {
        let mut room = Room::new(60, 16);
        room.attach(1, 0).unwrap();
        let err = room
            .handle_frame(1, frame_register(&[0x01, 0x02, 0x03, 0x04]), 0)
            .unwrap_err();
        assert_eq!(err, RoomError::EmptyUsername);
        assert!(room.session_failed(1));
    }

    #[test]
    fn test_send_broadcasts_to_everyone_but_sender() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        register(&mut room, 3, b"carol");
        // clear the join notices queued during registration
        for id in [1, 2] {
            while room.next_outbound(id).is_some() {
                room.handle_frame(id, Frame::Status(Status::ok()), 0).unwrap();
            }
        }

        room.handle_frame(2, frame_send(b"hello"), 0).unwrap();

        // bob gets only the acknowledgment
        match room.next_outbound(2).unwrap() {
            Frame::Status(status) => assert!(status.is_ok()),
            other => panic!("expected STATUS, got {:?}", other),
        }
        assert!(room.next_outbound(2).is_none());

        // alice and carol each get the message exactly once
        for id in [1, 3] {
            match room.next_outbound(id).unwrap() {
                Frame::Deliver(deliver) => {
                    assert_eq!(deliver.from, b"bob");
                    assert_eq!(deliver.message, b"hello");
                }
                other => panic!("expected DELIVER, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_send_message_is_sanitized() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        while room.next_outbound(1).is_some() {
            room.handle_frame(1, Frame::Status(Status::ok()), 0).unwrap();
        }

        room.handle_frame(2, frame_send(b"hi\x01 there\x07\n"), 0)
            .unwrap();
        match room.next_outbound(1) {
            Some(Frame::Deliver(deliver)) => assert_eq!(deliver.message, b"hi there\n"),
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_interlock_gates_second_deliver() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        while room.next_outbound(1).is_some() {
            room.handle_frame(1, Frame::Status(Status::ok()), 0).unwrap();
        }

        room.handle_frame(2, frame_send(b"one"), 0).unwrap();
        room.handle_frame(2, frame_send(b"two"), 0).unwrap();

        // first deliver arms the interlock
        assert!(matches!(room.next_outbound(1), Some(Frame::Deliver(_))));
        assert_eq!(room.session(1).unwrap().state(), SessionState::AwaitingStatus);
        assert!(room.next_outbound(1).is_none());
        assert!(room.has_pending(1));

        // the client's STATUS releases the second
        room.handle_frame(1, Frame::Status(Status::ok()), 0).unwrap();
        match room.next_outbound(1) {
            Some(Frame::Deliver(deliver)) => assert_eq!(deliver.message, b"two"),
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_status_is_fatal() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        room.handle_frame(2, frame_send(b"hello"), 0).unwrap();
        assert!(matches!(room.next_outbound(1), Some(Frame::Deliver(_))));

        let err = room
            .handle_frame(
                1,
                Frame::Status(Status {
                    code: 7,
                    message: Vec::new(),
                }),
                0,
            )
            .unwrap_err();
        assert_eq!(err, RoomError::DeliveryRejected { code: 7 });
        assert!(room.session_failed(1));
    }

    #[test]
    fn test_unsolicited_status_is_fatal() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        let err = room
            .handle_frame(1, Frame::Status(Status::ok()), 0)
            .unwrap_err();
        assert!(matches!(err, RoomError::UnexpectedFrame { .. }));
    }

    #[test]
    fn test_second_register_is_fatal() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        let err = room
            .handle_frame(1, frame_register(b"alice2"), 0)
            .unwrap_err();
        assert!(matches!(err, RoomError::UnexpectedFrame { .. }));
        assert!(room.session_failed(1));
    }

    #[test]
    fn test_pre_register_gate_holds_broadcasts() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        room.attach(2, 0).unwrap();
        room.handle_frame(1, frame_send(b"early"), 0).unwrap();

        // queued for the unregistered session, but the gate holds it
        assert!(room.has_pending(2));
        assert!(room.next_outbound(2).is_none());

        room.handle_frame(2, frame_register(b"bob"), 0).unwrap();
        // now the handshake frames come first, then the held broadcast
        assert!(matches!(room.next_outbound(2), Some(Frame::Status(_))));
        assert!(matches!(room.next_outbound(2), Some(Frame::Deliver(_))));
        room.handle_frame(2, Frame::Status(Status::ok()), 0).unwrap();
        match room.next_outbound(2) {
            Some(Frame::Deliver(deliver)) => assert_eq!(deliver.message, b"early"),
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_audit_and_farewell() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        room.handle_frame(2, frame_send(b"keepalive"), 100).unwrap();

        // alice last spoke at t=0, bob at t=100
        let expired = room.expired(100);
        assert_eq!(expired, vec![1]);

        room.fail(1, "Disconnected for inactivity.");
        match room.close_status(1) {
            Some(Frame::Status(status)) => {
                assert!(!status.is_ok());
                assert_eq!(status.message, b"Disconnected for inactivity.");
            }
            other => panic!("expected STATUS farewell, got {:?}", other),
        }
        assert_eq!(room.session(1).unwrap().state(), SessionState::Closing);
        // terminal sessions no longer show up in the audit
        assert!(room.expired(1000).iter().all(|id| *id != 1));
    }

    #[test]
    fn test_detach_announces_departure() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        while room.next_outbound(1).is_some() {
            room.handle_frame(1, Frame::Status(Status::ok()), 0).unwrap();
        }

        room.fail(2, "gone");
        room.close_status(2);
        let notified = room.detach(2);
        assert!(notified.contains(&1));
        match room.next_outbound(1) {
            Some(Frame::Deliver(deliver)) => {
                assert_eq!(deliver.from, SERVER_IDENTITY.as_bytes());
                assert_eq!(deliver.message, b"bob has left the server.");
            }
            other => panic!("expected DELIVER, got {:?}", other),
        }
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_unregistered_departure_name() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        room.attach(2, 0).unwrap();
        let _ = room.handle_frame(2, frame_register(b"alice"), 0);
        room.close_status(2);
        room.detach(2);
        match room.next_outbound(1) {
            Some(Frame::Deliver(deliver)) => {
                assert_eq!(
                    deliver.message,
                    b"An unregistered user has left the server."
                );
            }
            other => panic!("expected DELIVER, got {:?}", other),
        }
    }

    #[test]
    fn test_drain_parting_waives_interlock() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        register(&mut room, 2, b"bob");
        room.handle_frame(2, frame_send(b"one"), 0).unwrap();
        room.handle_frame(2, frame_send(b"two"), 0).unwrap();

        // the gate would stop after the first deliver; parting drain does not
        assert!(matches!(room.next_outbound(1), Some(Frame::Deliver(_))));
        let parting = room.drain_parting(1);
        assert_eq!(parting.len(), 2);
        assert!(room.drain_parting(1).is_empty());
    }

    #[test]
    fn test_capacity_limit() {
        let mut room = Room::new(60, 2);
        room.attach(1, 0).unwrap();
        room.attach(2, 0).unwrap();
        let err = room.attach(3, 0).unwrap_err();
        assert_eq!(err, RoomError::AtCapacity { max: 2 });
    }

    #[test]
    fn test_usernames_stay_unique_across_states() {
        let mut room = Room::new(60, 16);
        register(&mut room, 1, b"alice");
        room.fail(1, "broken");
        // "alice" is still attached (Failed), so the name stays reserved
        room.attach(2, 0).unwrap();
        let err = room.handle_frame(2, frame_register(b"alice"), 0).unwrap_err();
        assert!(matches!(err, RoomError::DuplicateUsername { .. }));
        // once detached, the name frees up
        room.close_status(1);
        room.detach(1);
        room.attach(3, 0).unwrap();
        room.handle_frame(3, frame_register(b"alice"), 0).unwrap();
    }
}
