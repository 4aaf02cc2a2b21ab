//! Pure call-signaling state machine.
//!
//! No I/O happens here: transitions only mutate the session and tell the
//! caller what to do next. The call manager in `sohbet-client` owns the
//! side effects (media adapter calls, relay events).

use thiserror::Error;
use tracing::debug;

use sohbet_shared::protocol::SessionDescription;

/// Call lifecycle. `Idle -> Outgoing -> Connected` on the caller side,
/// `Idle -> Incoming -> Connected` on the receiver side; every phase can
/// drop back to `Idle` through reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    Idle,
    Outgoing,
    Incoming,
    Connected,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignalingError {
    #[error("Already in a call")]
    Busy,

    #[error("No incoming call to accept")]
    NotRinging,

    #[error("Not awaiting an answer")]
    NotAwaitingAnswer,
}

/// What to do with a received call offer.
#[derive(Debug, PartialEq, Eq)]
pub enum OfferDisposition {
    /// We were idle: ring locally, the offer is stashed for `accept`.
    Ring,
    /// We are busy: drop the offer, send nothing back.
    Busy,
}

/// Signaling state for the single process-wide call slot.
#[derive(Debug, Default)]
pub struct SignalingSession {
    phase: Option<Phase>,
}

#[derive(Debug)]
enum Phase {
    Outgoing {
        peer: String,
    },
    Incoming {
        peer: String,
        offer: SessionDescription,
    },
    Connected {
        peer: String,
    },
}

impl SignalingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CallPhase {
        match self.phase {
            None => CallPhase::Idle,
            Some(Phase::Outgoing { .. }) => CallPhase::Outgoing,
            Some(Phase::Incoming { .. }) => CallPhase::Incoming,
            Some(Phase::Connected { .. }) => CallPhase::Connected,
        }
    }

    /// Display name of the current call peer, if any.
    pub fn peer(&self) -> Option<&str> {
        match &self.phase {
            None => None,
            Some(Phase::Outgoing { peer })
            | Some(Phase::Incoming { peer, .. })
            | Some(Phase::Connected { peer }) => Some(peer),
        }
    }

    /// Start dialing `peer`. Only legal from idle.
    pub fn begin_outgoing(&mut self, peer: &str) -> Result<(), SignalingError> {
        if self.phase.is_some() {
            return Err(SignalingError::Busy);
        }
        debug!(peer, "Dialing");
        self.phase = Some(Phase::Outgoing { peer: peer.into() });
        Ok(())
    }

    /// A call offer arrived from the relay. While busy the offer is
    /// dropped without touching the current call and without signaling
    /// the caller back.
    pub fn offer_received(&mut self, from: &str, offer: SessionDescription) -> OfferDisposition {
        if self.phase.is_some() {
            debug!(from, "Ignoring call offer while busy");
            return OfferDisposition::Busy;
        }
        debug!(from, "Incoming call ringing");
        self.phase = Some(Phase::Incoming {
            peer: from.into(),
            offer,
        });
        OfferDisposition::Ring
    }

    /// Accept the ringing call, yielding the caller's name and the
    /// stashed offer so negotiation can proceed.
    pub fn accept(&mut self) -> Result<(String, SessionDescription), SignalingError> {
        match self.phase.take() {
            Some(Phase::Incoming { peer, offer }) => {
                debug!(peer = %peer, "Call accepted locally");
                self.phase = Some(Phase::Connected { peer: peer.clone() });
                Ok((peer, offer))
            }
            other => {
                self.phase = other;
                Err(SignalingError::NotRinging)
            }
        }
    }

    /// The remote peer answered our outgoing call.
    pub fn answer_received(&mut self) -> Result<(), SignalingError> {
        match self.phase.take() {
            Some(Phase::Outgoing { peer }) => {
                debug!(peer = %peer, "Call answered by remote");
                self.phase = Some(Phase::Connected { peer });
                Ok(())
            }
            other => {
                self.phase = other;
                Err(SignalingError::NotAwaitingAnswer)
            }
        }
    }

    /// Drop back to idle from any phase. Idempotent.
    pub fn reset(&mut self) {
        self.phase = None;
    }
}
