//! Chat session manager: the active conversation, its message log, and
//! reconciliation of locally-sent messages with their relay echoes.
//!
//! Sent messages are not appended optimistically; the relay echoes them
//! back and the echo is what lands in the log. Each outbound message
//! carries a freshly generated correlation id so the echo is recognised
//! without relying on username string comparison; the comparison remains
//! as a fallback for relays that do not echo the id.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use sohbet_shared::protocol::ClientEvent;
use sohbet_shared::types::{Conversation, Direction, Message, PeerId};

use crate::directory::HistoryMessage;

/// Token tying an in-flight history fetch to the conversation it was
/// started for. A fetch resolving after the conversation changed is
/// discarded in [`ChatSession::complete_open`].
#[derive(Debug)]
pub struct FetchTicket {
    peer_id: PeerId,
}

pub struct ChatSession {
    local_username: String,
    active: Option<Conversation>,
    log: Vec<Message>,
    /// Correlation ids of messages sent but not yet echoed back.
    pending_echoes: HashSet<Uuid>,
}

impl ChatSession {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self {
            local_username: local_username.into(),
            active: None,
            log: Vec::new(),
            pending_echoes: HashSet::new(),
        }
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    /// Make `peer` the active conversation (last open wins) and hand
    /// back the ticket the history fetch must present to apply.
    pub fn begin_open(&mut self, peer_id: PeerId, peer_name: &str) -> FetchTicket {
        debug!(peer = %peer_id, name = peer_name, "Opening conversation");
        self.active = Some(Conversation {
            peer_id,
            peer_name: peer_name.to_owned(),
        });
        FetchTicket { peer_id }
    }

    /// Replace the log with the fetched history, oldest first. Returns
    /// `false` without touching the log when the ticket's conversation
    /// is no longer the active one.
    pub fn complete_open(&mut self, ticket: FetchTicket, history: Vec<HistoryMessage>) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        if active.peer_id != ticket.peer_id {
            debug!(
                stale = %ticket.peer_id,
                current = %active.peer_id,
                "Discarding history fetch for a superseded conversation"
            );
            return false;
        }

        let peer_id = active.peer_id;
        let peer_name = active.peer_name.clone();
        let local = self.local_username.clone();
        self.log = history
            .into_iter()
            .map(|m| {
                let direction = if m.sender_id == peer_id {
                    Direction::Received
                } else {
                    Direction::Sent
                };
                Message {
                    sender: match direction {
                        Direction::Received => peer_name.clone(),
                        Direction::Sent => local.clone(),
                    },
                    content: m.content,
                    timestamp: m.timestamp,
                    direction,
                }
            })
            .collect();
        true
    }

    /// Build the outbound chat event for `content`, or `None` when the
    /// content is blank or no conversation is open.
    pub fn send_message(&mut self, content: &str) -> Option<ClientEvent> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let Some(active) = &self.active else {
            debug!("Dropping send_message with no open conversation");
            return None;
        };

        let message_id = Uuid::new_v4();
        self.pending_echoes.insert(message_id);
        Some(ClientEvent::SendMessage {
            receiver: active.peer_name.clone(),
            content: content.to_owned(),
            message_id,
        })
    }

    /// Reconcile a relayed message into the log.
    ///
    /// Direction resolution, in order: a known correlation id marks our
    /// own echo (`Sent`); a sender matching the local username is a
    /// self-echo without an id (`Sent`); a sender matching the active
    /// peer is `Received`. Anything else belongs to a conversation that
    /// is not open and is dropped — it will be fetched with the history
    /// the next time that conversation opens.
    pub fn on_incoming(
        &mut self,
        sender: &str,
        content: &str,
        timestamp: DateTime<Utc>,
        message_id: Option<Uuid>,
    ) -> Option<Message> {
        if self.active.is_none() {
            debug!(sender, "Dropping message with no open conversation");
            return None;
        }

        let echoed = message_id.is_some_and(|id| self.pending_echoes.remove(&id));
        let direction = if echoed || sender == self.local_username {
            Direction::Sent
        } else if self
            .active
            .as_ref()
            .is_some_and(|c| c.peer_name == sender)
        {
            Direction::Received
        } else {
            debug!(sender, "Dropping message for an inactive conversation");
            return None;
        };

        let message = Message {
            sender: sender.to_owned(),
            content: content.to_owned(),
            timestamp,
            direction,
        };
        self.log.push(message.clone());
        Some(message)
    }
}
