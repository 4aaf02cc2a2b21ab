//! Call coordinator: drives the media adapter and the relay protocol
//! around the pure signaling state machine.
//!
//! Owns the single call slot's resources (capture + peer connection) and
//! releases them on every path back to idle. Remote ICE candidates that
//! arrive before the remote description is applied are buffered and
//! flushed afterwards; candidates and tracks from a torn-down call
//! generation are discarded.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sohbet_media::adapter::{
    CallGeneration, ConnectionEvent, LocalCapture, MediaAdapter, MediaError, PeerConnection,
};
use sohbet_media::signaling::{CallPhase, OfferDisposition, SignalingSession};
use sohbet_shared::protocol::{ClientEvent, IceCandidate, SessionDescription};

use crate::events::SessionNotification;

pub struct CallManager<M: MediaAdapter> {
    adapter: M,
    signaling: SignalingSession,
    generation: CallGeneration,
    capture: Option<M::Capture>,
    connection: Option<M::Connection>,
    /// Remote candidates waiting for the remote description.
    pending_candidates: Vec<IceCandidate>,
    remote_description_applied: bool,
    input_device: Option<String>,
    output_device: Option<String>,
    connection_events: mpsc::Sender<ConnectionEvent>,
    outbound: mpsc::Sender<ClientEvent>,
    notifications: mpsc::Sender<SessionNotification>,
}

impl<M: MediaAdapter> CallManager<M> {
    pub fn new(
        adapter: M,
        connection_events: mpsc::Sender<ConnectionEvent>,
        outbound: mpsc::Sender<ClientEvent>,
        notifications: mpsc::Sender<SessionNotification>,
    ) -> Self {
        Self {
            adapter,
            signaling: SignalingSession::new(),
            generation: 0,
            capture: None,
            connection: None,
            pending_candidates: Vec::new(),
            remote_description_applied: false,
            input_device: None,
            output_device: None,
            connection_events,
            outbound,
            notifications,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.signaling.phase()
    }

    pub fn peer(&self) -> Option<&str> {
        self.signaling.peer()
    }

    pub fn set_audio_devices(&mut self, input: Option<String>, output: Option<String>) {
        debug!(?input, ?output, "Audio devices selected");
        self.input_device = input;
        self.output_device = output;
    }

    /// Dial `peer`: acquire the microphone, negotiate an offer and send
    /// it via the relay. Rejected while a call is in progress.
    pub async fn start_call(&mut self, peer: &str) {
        if let Err(e) = self.signaling.begin_outgoing(peer) {
            warn!(peer, error = %e, "Rejected start_call");
            self.notify(SessionNotification::Notice("Already in a call".into()))
                .await;
            return;
        }

        match self.adapter.open_capture(self.input_device.as_deref()).await {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => {
                warn!(error = %e, "Could not acquire microphone");
                self.signaling.reset();
                self.notify(SessionNotification::Notice(
                    "Microphone unavailable or access denied".into(),
                ))
                .await;
                return;
            }
        }

        if let Err(e) = self.dial(peer).await {
            warn!(peer, error = %e, "Offer negotiation failed");
            self.notify(SessionNotification::Notice(format!(
                "Could not start the call: {e}"
            )))
            .await;
            self.cleanup().await;
            return;
        }

        info!(peer, "Calling");
        self.notify_phase().await;
    }

    async fn dial(&mut self, peer: &str) -> Result<(), MediaError> {
        let generation = self.generation;
        let events = self.connection_events.clone();
        let Some(capture) = self.capture.as_ref() else {
            return Err(MediaError::CaptureUnavailable("capture handle missing".into()));
        };
        let mut connection = self
            .adapter
            .create_connection(capture, generation, events)
            .await?;

        let negotiated: Result<SessionDescription, MediaError> = async {
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            Ok(offer)
        }
        .await;

        // Stored regardless of the outcome so cleanup can close it.
        self.connection = Some(connection);
        let offer = negotiated?;

        self.emit(ClientEvent::CallUser {
            user_to_call: peer.to_owned(),
            signal_data: offer,
        })
        .await;
        Ok(())
    }

    /// A call offer arrived from the relay. While busy it is dropped
    /// with no outbound signal; the caller's UI times out on its own.
    pub async fn handle_incoming_call(&mut self, from: &str, signal: SessionDescription) {
        match self.signaling.offer_received(from, signal) {
            OfferDisposition::Ring => self.notify_phase().await,
            OfferDisposition::Busy => {}
        }
    }

    /// Accept the ringing call: acquire the microphone, apply the stashed
    /// offer, answer back through the relay.
    pub async fn accept_call(&mut self) {
        let (caller, offer) = match self.signaling.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Rejected accept_call");
                return;
            }
        };

        match self.adapter.open_capture(self.input_device.as_deref()).await {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => {
                warn!(error = %e, "Could not acquire microphone");
                self.notify(SessionNotification::Notice(
                    "Microphone unavailable or access denied".into(),
                ))
                .await;
                self.cleanup().await;
                return;
            }
        }

        if let Err(e) = self.answer(&caller, offer).await {
            warn!(caller = %caller, error = %e, "Answer negotiation failed");
            self.notify(SessionNotification::Notice(format!(
                "Could not answer the call: {e}"
            )))
            .await;
            self.cleanup().await;
            return;
        }

        info!(caller = %caller, "Call accepted");
        self.notify_phase().await;
    }

    async fn answer(
        &mut self,
        caller: &str,
        offer: SessionDescription,
    ) -> Result<(), MediaError> {
        let generation = self.generation;
        let events = self.connection_events.clone();
        let Some(capture) = self.capture.as_ref() else {
            return Err(MediaError::CaptureUnavailable("capture handle missing".into()));
        };
        let mut connection = self
            .adapter
            .create_connection(capture, generation, events)
            .await?;

        let negotiated: Result<SessionDescription, MediaError> = async {
            connection.set_remote_description(offer).await?;
            let answer = connection.create_answer().await?;
            connection.set_local_description(answer.clone()).await?;
            Ok(answer)
        }
        .await;

        self.connection = Some(connection);
        let answer = negotiated?;

        self.remote_description_applied = true;
        self.flush_candidates().await;
        self.emit(ClientEvent::AnswerCall {
            to: caller.to_owned(),
            signal: answer,
        })
        .await;
        Ok(())
    }

    /// The remote peer answered our outgoing call.
    pub async fn handle_call_accepted(&mut self, signal: SessionDescription) {
        if let Err(e) = self.signaling.answer_received() {
            warn!(error = %e, "Unexpected call-accepted event");
            return;
        }

        let applied = match self.connection.as_mut() {
            Some(connection) => connection.set_remote_description(signal).await,
            None => Err(MediaError::Negotiation("no live peer connection".into())),
        };
        if let Err(e) = applied {
            warn!(error = %e, "Applying remote answer failed");
            self.notify(SessionNotification::Notice("Call setup failed".into()))
                .await;
            self.cleanup().await;
            return;
        }

        self.remote_description_applied = true;
        self.flush_candidates().await;
        info!(peer = ?self.signaling.peer(), "Call connected");
        self.notify_phase().await;
    }

    /// Ingest a remote ICE candidate, buffering until the remote
    /// description is in place. Failures are logged and never fatal.
    pub async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.signaling.phase() == CallPhase::Idle {
            debug!("Dropping ICE candidate with no call in progress");
            return;
        }
        if !self.remote_description_applied || self.connection.is_none() {
            debug!("Buffering early ICE candidate");
            self.pending_candidates.push(candidate);
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            if let Err(e) = connection.add_ice_candidate(candidate).await {
                warn!(error = %e, "Failed to add remote ICE candidate");
            }
        }
    }

    async fn flush_candidates(&mut self) {
        if self.pending_candidates.is_empty() {
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let buffered = std::mem::take(&mut self.pending_candidates);
        debug!(count = buffered.len(), "Flushing buffered ICE candidates");
        for candidate in buffered {
            if let Err(e) = connection.add_ice_candidate(candidate).await {
                warn!(error = %e, "Failed to add buffered ICE candidate");
            }
        }
    }

    /// Events from the live peer connection. Anything tagged with a
    /// superseded generation belongs to a torn-down call and is dropped.
    pub async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::LocalCandidate {
                generation,
                candidate,
            } => {
                if generation != self.generation {
                    debug!(generation, "Discarding candidate from a stale call");
                    return;
                }
                let Some(target) = self.signaling.peer().map(str::to_owned) else {
                    return;
                };
                self.emit(ClientEvent::IceCandidate { target, candidate }).await;
            }
            ConnectionEvent::RemoteTrack {
                generation,
                stream_id,
            } => {
                if generation != self.generation {
                    debug!(generation, "Discarding remote track from a stale call");
                    return;
                }
                self.notify(SessionNotification::RemoteStreamAttached {
                    stream_id,
                    output_device: self.output_device.clone(),
                })
                .await;
            }
        }
    }

    /// Hang up locally: tell the peer, then tear down. Callable from any
    /// phase; from idle there is no peer to signal and only cleanup runs.
    pub async fn end_call(&mut self) {
        if let Some(target) = self.signaling.peer().map(str::to_owned) {
            self.emit(ClientEvent::EndCall { target }).await;
        }
        self.cleanup().await;
    }

    /// The remote peer hung up. No outbound signal.
    pub async fn handle_call_ended(&mut self) {
        self.cleanup().await;
    }

    /// Release the call slot. Idempotent and safe from any phase: the
    /// capture and connection handles are taken out of their slots, so
    /// each is released at most once, and the generation bump invalidates
    /// whatever the old connection still resolves.
    pub async fn cleanup(&mut self) {
        let was_active = self.signaling.phase() != CallPhase::Idle
            || self.capture.is_some()
            || self.connection.is_some();

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
        self.pending_candidates.clear();
        self.remote_description_applied = false;
        self.signaling.reset();
        self.generation += 1;

        if was_active {
            info!("Call resources released");
            self.notify(SessionNotification::RemoteStreamCleared).await;
            self.notify_phase().await;
        }
    }

    async fn notify_phase(&self) {
        self.notify(SessionNotification::CallStateChanged {
            phase: self.signaling.phase(),
            peer: self.signaling.peer().map(str::to_owned),
        })
        .await;
    }

    async fn emit(&self, event: ClientEvent) {
        if self.outbound.send(event).await.is_err() {
            warn!("Transport channel closed, dropping outbound event");
        }
    }

    async fn notify(&self, notification: SessionNotification) {
        if self.notifications.send(notification).await.is_err() {
            debug!("Notification channel closed");
        }
    }
}
