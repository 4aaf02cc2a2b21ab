use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SDP negotiation payload, shaped like an RTCSessionDescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque ICE connectivity proposal. The core never inspects it, it is
/// carried verbatim between the relay and the media adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

/// Events emitted by the session core towards the relay.
///
/// Fire-and-forget: the core never waits for acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "send_message")]
    SendMessage {
        receiver: String,
        content: String,
        #[serde(rename = "messageId")]
        message_id: Uuid,
    },

    #[serde(rename = "call-user")]
    CallUser {
        #[serde(rename = "userToCall")]
        user_to_call: String,
        #[serde(rename = "signalData")]
        signal_data: SessionDescription,
    },

    #[serde(rename = "answer-call")]
    AnswerCall {
        to: String,
        signal: SessionDescription,
    },

    #[serde(rename = "ice-candidate")]
    IceCandidate {
        target: String,
        candidate: IceCandidate,
    },

    #[serde(rename = "end-call")]
    EndCall { target: String },
}

/// Events the relay forwards to the session core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "receive_message")]
    ReceiveMessage {
        sender: String,
        content: String,
        timestamp: DateTime<Utc>,
        /// Correlation id echoed back by the relay. Older relays omit it;
        /// the chat manager then falls back to comparing sender names.
        #[serde(rename = "messageId", default)]
        message_id: Option<Uuid>,
    },

    #[serde(rename = "incoming-call")]
    IncomingCall {
        from: String,
        signal: SessionDescription,
    },

    #[serde(rename = "call-accepted")]
    CallAccepted { signal: SessionDescription },

    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: IceCandidate },

    #[serde(rename = "call-ended")]
    CallEnded {},

    #[serde(rename = "friend_request")]
    FriendRequest {},
}
