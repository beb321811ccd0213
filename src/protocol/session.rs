//! Session state (spec §3 "Session", §4.6 state machine).

use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauth,
    /// `USER` accepted, awaiting `PASS` (spec §4.6 `UNAUTH -> (USER/PASS) -> AUTH`).
    AwaitingPassword,
    Auth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    StreamingListing,
    Uploading,
    Downloading,
    TlsNegotiating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveMode {
    Full,
    Half,
}

pub struct Session {
    pub auth_state: AuthState,
    pub stream_state: StreamState,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub pending_username: Option<String>,
    pub current_room: Option<i64>,
    pub current_message_pos: i64,
    pub keepalive_mode: KeepaliveMode,
    pub instant_message_queue: u32,
    pub preferred_mime_types: Vec<String>,
    pub last_activity: u64,
    pub tls_active: bool,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            auth_state: AuthState::Unauth,
            stream_state: StreamState::Idle,
            user_id: None,
            username: None,
            pending_username: None,
            current_room: None,
            current_message_pos: 0,
            keepalive_mode: KeepaliveMode::Full,
            instant_message_queue: 0,
            preferred_mime_types: Vec::new(),
            last_activity: now_secs(),
            tls_active: false,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Session {
    pub fn touch(&mut self) {
        self.last_activity = now_secs();
    }

    pub fn is_idle_past(&self, timeout_secs: u64) -> bool {
        now_secs().saturating_sub(self.last_activity) > timeout_secs
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_state == AuthState::Auth
    }

    /// Only one streaming sub-state may be active at a time (spec §4.6);
    /// starting a new one while another is active is a protocol violation.
    pub fn begin_stream(&mut self, state: StreamState) -> Result<(), crate::error::CitadelError> {
        if self.stream_state != StreamState::Idle {
            return Err(crate::error::CitadelError::Protocol(format!(
                "cannot enter {state:?} while {:?} is active",
                self.stream_state
            )));
        }
        self.stream_state = state;
        Ok(())
    }

    pub fn end_stream(&mut self) {
        self.stream_state = StreamState::Idle;
    }

    /// A failed `GOTO` leaves the session in its prior room (spec §4.5).
    pub fn enter_room(&mut self, room_number: i64) {
        self.current_room = Some(room_number);
        self.current_message_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_stream_state_at_a_time() {
        let mut s = Session::default();
        s.begin_stream(StreamState::StreamingListing).unwrap();
        let err = s.begin_stream(StreamState::Uploading);
        assert!(err.is_err());
        s.end_stream();
        assert!(s.begin_stream(StreamState::Uploading).is_ok());
    }

    #[test]
    fn idle_past_timeout_detected() {
        let mut s = Session::default();
        s.last_activity = 0;
        assert!(s.is_idle_past(1));
    }
}
