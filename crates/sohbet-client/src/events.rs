//! Notifications the session core pushes to the embedding UI.

use serde::Serialize;

use sohbet_media::signaling::CallPhase;
use sohbet_shared::types::{Message, PeerId};

use crate::directory::{Friend, FriendRequest};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum SessionNotification {
    /// A conversation was opened and its history loaded; render it once.
    ConversationOpened {
        peer_id: PeerId,
        peer_name: String,
        messages: Vec<Message>,
    },

    /// A message was appended to the open conversation's log.
    MessageAppended(Message),

    /// The call slot changed phase.
    CallStateChanged {
        phase: CallPhase,
        peer: Option<String>,
    },

    /// Remote audio arrived; route `stream_id` to playback, on
    /// `output_device` if one is configured.
    RemoteStreamAttached {
        stream_id: String,
        output_device: Option<String>,
    },

    /// Remote audio is gone (call ended or torn down).
    RemoteStreamCleared,

    FriendsUpdated(Vec<Friend>),

    FriendRequestsUpdated(Vec<FriendRequest>),

    /// User-facing notice, e.g. a denied microphone.
    Notice(String),
}
