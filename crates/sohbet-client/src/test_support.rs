//! In-memory mock collaborators for the session-core tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use sohbet_media::adapter::{
    CallGeneration, ConnectionEvent, LocalCapture, MediaAdapter, MediaError, PeerConnection,
};
use sohbet_shared::protocol::{IceCandidate, SdpKind, SessionDescription};
use sohbet_shared::types::PeerId;

use crate::directory::{DirectoryClient, Friend, FriendRequest, HistoryMessage};

pub fn offer() -> SessionDescription {
    SessionDescription {
        kind: SdpKind::Offer,
        sdp: "mock-remote-offer".into(),
    }
}

#[derive(Default)]
pub struct MockState {
    pub captures_opened: AtomicUsize,
    pub capture_stops: AtomicUsize,
    pub connections_opened: AtomicUsize,
    pub connection_closes: AtomicUsize,
    pub candidates_added: Mutex<Vec<IceCandidate>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    /// Events channel of the most recently created connection, used by
    /// tests to inject candidates/tracks as the media stack would.
    events: Mutex<Option<(CallGeneration, mpsc::Sender<ConnectionEvent>)>>,
}

#[derive(Clone, Default)]
pub struct MockMedia {
    pub state: Arc<MockState>,
    fail_capture: bool,
}

impl MockMedia {
    pub fn failing_capture() -> Self {
        Self {
            state: Arc::default(),
            fail_capture: true,
        }
    }

    pub async fn emit_local_candidate(&self, candidate: IceCandidate) {
        let slot = self.state.events.lock().unwrap().clone();
        let (generation, tx) = slot.expect("no connection created yet");
        tx.send(ConnectionEvent::LocalCandidate {
            generation,
            candidate,
        })
        .await
        .unwrap();
    }

    pub async fn emit_remote_track(&self, stream_id: &str) {
        let slot = self.state.events.lock().unwrap().clone();
        let (generation, tx) = slot.expect("no connection created yet");
        tx.send(ConnectionEvent::RemoteTrack {
            generation,
            stream_id: stream_id.into(),
        })
        .await
        .unwrap();
    }
}

pub struct MockCapture {
    state: Arc<MockState>,
}

impl LocalCapture for MockCapture {
    fn stop(&mut self) {
        self.state.capture_stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
    remote_set: bool,
}

#[async_trait]
impl PeerConnection for MockConnection {
    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError> {
        Ok(SessionDescription {
            kind: SdpKind::Offer,
            sdp: "mock-offer".into(),
        })
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError> {
        if !self.remote_set {
            return Err(MediaError::NoRemoteDescription);
        }
        Ok(SessionDescription {
            kind: SdpKind::Answer,
            sdp: "mock-answer".into(),
        })
    }

    async fn set_local_description(
        &mut self,
        _description: SessionDescription,
    ) -> Result<(), MediaError> {
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        self.remote_set = true;
        self.state
            .remote_descriptions
            .lock()
            .unwrap()
            .push(description);
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError> {
        if !self.remote_set {
            return Err(MediaError::NoRemoteDescription);
        }
        self.state.candidates_added.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&mut self) {
        self.state.connection_closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaAdapter for MockMedia {
    type Capture = MockCapture;
    type Connection = MockConnection;

    async fn open_capture(&self, _device: Option<&str>) -> Result<Self::Capture, MediaError> {
        if self.fail_capture {
            return Err(MediaError::CaptureUnavailable("permission denied".into()));
        }
        self.state.captures_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockCapture {
            state: self.state.clone(),
        })
    }

    async fn create_connection(
        &self,
        _capture: &Self::Capture,
        generation: CallGeneration,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self::Connection, MediaError> {
        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        *self.state.events.lock().unwrap() = Some((generation, events));
        Ok(MockConnection {
            state: self.state.clone(),
            remote_set: false,
        })
    }
}

#[derive(Clone, Default)]
pub struct MockDirectory {
    pub histories: Arc<Mutex<HashMap<i64, Vec<HistoryMessage>>>>,
    pub friends: Arc<Mutex<Vec<Friend>>>,
    pub requests: Arc<Mutex<Vec<FriendRequest>>>,
    pub added: Arc<Mutex<Vec<String>>>,
    pub accepted: Arc<Mutex<Vec<i64>>>,
}

impl MockDirectory {
    pub fn with_history(peer: PeerId, messages: Vec<HistoryMessage>) -> Self {
        let dir = Self::default();
        dir.histories.lock().unwrap().insert(peer.0, messages);
        dir
    }
}

#[async_trait]
impl DirectoryClient for MockDirectory {
    async fn message_history(&self, peer: PeerId) -> anyhow::Result<Vec<HistoryMessage>> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(&peer.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn friends(&self) -> anyhow::Result<Vec<Friend>> {
        Ok(self.friends.lock().unwrap().clone())
    }

    async fn pending_requests(&self) -> anyhow::Result<Vec<FriendRequest>> {
        Ok(self.requests.lock().unwrap().clone())
    }

    async fn add_friend(&self, username: &str) -> anyhow::Result<()> {
        self.added.lock().unwrap().push(username.to_owned());
        Ok(())
    }

    async fn accept_request(&self, request_id: i64) -> anyhow::Result<()> {
        self.accepted.lock().unwrap().push(request_id);
        self.requests
            .lock()
            .unwrap()
            .retain(|r| r.id != request_id);
        Ok(())
    }
}
