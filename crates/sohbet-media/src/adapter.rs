//! Contract towards the platform media stack (capture + peer connection).
//!
//! The session core drives these traits; a real implementation wraps the
//! browser/OS WebRTC primitives, tests use in-memory mocks. Asynchronous
//! results coming back from the stack (local ICE candidates, remote
//! tracks) are delivered over a tokio mpsc channel and tagged with the
//! call generation they belong to, so the core can discard anything that
//! resolves after its call was torn down.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use sohbet_shared::protocol::{IceCandidate, SessionDescription};

/// Monotonically increasing id of a call attempt. Bumped on every
/// cleanup; media events carrying a stale generation are ignored.
pub type CallGeneration = u64;

#[derive(Error, Debug)]
pub enum MediaError {
    /// Microphone unavailable or permission denied.
    #[error("Audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Offer/answer creation or description application failed.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// A candidate was handed to a connection with no remote description.
    #[error("No remote description set")]
    NoRemoteDescription,

    /// Candidate ingestion failed. Non-fatal for the call.
    #[error("Candidate rejected: {0}")]
    Candidate(String),
}

/// Asynchronous events produced by a live peer connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The local agent gathered a connectivity candidate to forward to
    /// the remote peer.
    LocalCandidate {
        generation: CallGeneration,
        candidate: IceCandidate,
    },

    /// The remote audio track arrived and can be routed to playback.
    RemoteTrack {
        generation: CallGeneration,
        stream_id: String,
    },
}

/// A held microphone capture. Dropping without `stop` leaks the device
/// on some platforms, so the call manager stops it explicitly.
pub trait LocalCapture: Send {
    /// Release the capture device. Safe to call more than once.
    fn stop(&mut self);
}

/// One negotiating or active media transport session with a remote peer.
#[async_trait]
pub trait PeerConnection: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), MediaError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), MediaError>;

    /// Ingest a remote candidate. Fails with [`MediaError::NoRemoteDescription`]
    /// when negotiation has not progressed far enough; callers treat any
    /// failure here as non-fatal.
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), MediaError>;

    /// Tear the connection down. Safe to call more than once.
    async fn close(&mut self);
}

/// Factory for captures and peer connections.
#[async_trait]
pub trait MediaAdapter: Send + Sync {
    type Capture: LocalCapture + 'static;
    type Connection: PeerConnection + 'static;

    /// Acquire the local microphone, optionally constrained to a
    /// specific device id chosen in the settings UI.
    async fn open_capture(&self, device: Option<&str>) -> Result<Self::Capture, MediaError>;

    /// Create a peer connection with the capture's tracks attached.
    /// Connection events are delivered on `events`, tagged with
    /// `generation`.
    async fn create_connection(
        &self,
        capture: &Self::Capture,
        generation: CallGeneration,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self::Connection, MediaError>;
}
