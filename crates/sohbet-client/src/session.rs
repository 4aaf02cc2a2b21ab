//! Session dispatch with the tokio mpsc command/notification pattern.
//!
//! The session core runs in a dedicated tokio task. The UI talks to it
//! through a command channel and listens on a notification channel; the
//! transport collaborator forwards the outbound channel to the relay and
//! pushes relay events into the inbound channel. Every transition runs
//! to completion before the next command or event is taken, so the chat
//! and call state never see reentrancy.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sohbet_media::adapter::MediaAdapter;
use sohbet_shared::protocol::{ClientEvent, ServerEvent};
use sohbet_shared::types::PeerId;

use crate::call::CallManager;
use crate::chat::ChatSession;
use crate::config::SessionConfig;
use crate::directory::DirectoryClient;
use crate::events::SessionNotification;

/// Commands sent *into* the session task.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Make this contact the open conversation and load its history.
    OpenConversation { peer_id: PeerId, peer_name: String },
    /// Send a chat message to the open conversation.
    SendMessage { content: String },
    /// Start a voice call with the open conversation's peer.
    StartCall,
    /// Accept the ringing incoming call.
    AcceptCall,
    /// Hang up the current call.
    EndCall,
    /// Select capture/playback devices for subsequent calls.
    SetAudioDevices {
        input: Option<String>,
        output: Option<String>,
    },
    /// Re-fetch the friend list from the directory service.
    RefreshFriends,
    /// Send a friend request.
    AddFriend { username: String },
    /// Accept a pending friend request.
    AcceptFriendRequest { request_id: i64 },
    /// Gracefully shut the session down.
    Shutdown,
}

/// Channel endpoints returned by [`spawn_session`].
pub struct SessionChannels {
    /// Commands into the session task.
    pub commands: mpsc::Sender<SessionCommand>,
    /// Notifications for the embedding UI.
    pub notifications: mpsc::Receiver<SessionNotification>,
    /// Where the transport pushes relay events.
    pub inbound: mpsc::Sender<ServerEvent>,
    /// What the transport forwards to the relay, fire-and-forget.
    pub outbound: mpsc::Receiver<ClientEvent>,
}

/// Spawn the session core in a background tokio task.
pub fn spawn_session<M, D>(config: SessionConfig, adapter: M, directory: D) -> SessionChannels
where
    M: MediaAdapter + 'static,
    D: DirectoryClient + 'static,
    <M as MediaAdapter>::Capture: Sync,
    <M as MediaAdapter>::Connection: Sync,
{
    let capacity = config.channel_capacity;
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(capacity);
    let (notif_tx, notif_rx) = mpsc::channel::<SessionNotification>(capacity);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<ServerEvent>(capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel::<ClientEvent>(capacity);
    let (conn_tx, mut conn_rx) = mpsc::channel(capacity);

    let mut core = SessionCore {
        chat: ChatSession::new(&config.local_username),
        calls: {
            let mut calls =
                CallManager::new(adapter, conn_tx, outbound_tx.clone(), notif_tx.clone());
            calls.set_audio_devices(config.input_device, config.output_device);
            calls
        },
        directory,
        outbound: outbound_tx,
        notifications: notif_tx,
    };

    tokio::spawn(async move {
        info!(user = %config.local_username, "Session core started");

        loop {
            tokio::select! {
                // --- UI commands ---
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::OpenConversation { peer_id, peer_name }) => {
                        core.open_conversation(peer_id, peer_name).await;
                    }
                    Some(SessionCommand::SendMessage { content }) => {
                        core.send_chat_message(&content).await;
                    }
                    Some(SessionCommand::StartCall) => core.start_call().await,
                    Some(SessionCommand::AcceptCall) => core.calls.accept_call().await,
                    Some(SessionCommand::EndCall) => core.calls.end_call().await,
                    Some(SessionCommand::SetAudioDevices { input, output }) => {
                        core.calls.set_audio_devices(input, output);
                    }
                    Some(SessionCommand::RefreshFriends) => core.refresh_friends().await,
                    Some(SessionCommand::AddFriend { username }) => {
                        core.add_friend(&username).await;
                    }
                    Some(SessionCommand::AcceptFriendRequest { request_id }) => {
                        core.accept_friend_request(request_id).await;
                    }
                    Some(SessionCommand::Shutdown) => {
                        info!("Session shutdown requested");
                        break;
                    }
                    None => {
                        info!("Command channel closed, shutting down session");
                        break;
                    }
                },

                // --- Relay events ---
                event = inbound_rx.recv() => match event {
                    Some(event) => core.handle_server_event(event).await,
                    None => {
                        info!("Relay channel closed, shutting down session");
                        break;
                    }
                },

                // --- Media stack events ---
                Some(event) = conn_rx.recv() => {
                    core.calls.handle_connection_event(event).await;
                }
            }
        }

        // Release any call resources on the way out.
        core.calls.cleanup().await;
    });

    SessionChannels {
        commands: cmd_tx,
        notifications: notif_rx,
        inbound: inbound_tx,
        outbound: outbound_rx,
    }
}

struct SessionCore<M: MediaAdapter, D: DirectoryClient> {
    chat: ChatSession,
    calls: CallManager<M>,
    directory: D,
    outbound: mpsc::Sender<ClientEvent>,
    notifications: mpsc::Sender<SessionNotification>,
}

impl<M: MediaAdapter, D: DirectoryClient> SessionCore<M, D> {
    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveMessage {
                sender,
                content,
                timestamp,
                message_id,
            } => {
                if let Some(message) =
                    self.chat.on_incoming(&sender, &content, timestamp, message_id)
                {
                    self.notify(SessionNotification::MessageAppended(message))
                        .await;
                }
            }
            ServerEvent::IncomingCall { from, signal } => {
                self.calls.handle_incoming_call(&from, signal).await;
            }
            ServerEvent::CallAccepted { signal } => {
                self.calls.handle_call_accepted(signal).await;
            }
            ServerEvent::IceCandidate { candidate } => {
                self.calls.handle_remote_candidate(candidate).await;
            }
            ServerEvent::CallEnded {} => self.calls.handle_call_ended().await,
            ServerEvent::FriendRequest {} => self.refresh_requests().await,
        }
    }

    async fn open_conversation(&mut self, peer_id: PeerId, peer_name: String) {
        let ticket = self.chat.begin_open(peer_id, &peer_name);

        let history = match self.directory.message_history(peer_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "History fetch failed");
                self.notify(SessionNotification::Notice(
                    "Could not load message history".into(),
                ))
                .await;
                Vec::new()
            }
        };

        if self.chat.complete_open(ticket, history) {
            self.notify(SessionNotification::ConversationOpened {
                peer_id,
                peer_name,
                messages: self.chat.log().to_vec(),
            })
            .await;
        }
    }

    async fn send_chat_message(&mut self, content: &str) {
        if let Some(event) = self.chat.send_message(content) {
            if self.outbound.send(event).await.is_err() {
                warn!("Transport channel closed, dropping outbound message");
            }
        }
    }

    async fn start_call(&mut self) {
        let Some(peer) = self.chat.active().map(|c| c.peer_name.clone()) else {
            debug!("start_call with no open conversation");
            self.notify(SessionNotification::Notice(
                "Open a conversation before calling".into(),
            ))
            .await;
            return;
        };
        self.calls.start_call(&peer).await;
    }

    async fn refresh_friends(&mut self) {
        match self.directory.friends().await {
            Ok(friends) => {
                self.notify(SessionNotification::FriendsUpdated(friends))
                    .await;
            }
            Err(e) => warn!(error = %e, "Friend list fetch failed"),
        }
    }

    async fn refresh_requests(&mut self) {
        match self.directory.pending_requests().await {
            Ok(requests) => {
                self.notify(SessionNotification::FriendRequestsUpdated(requests))
                    .await;
            }
            Err(e) => warn!(error = %e, "Pending request fetch failed"),
        }
    }

    async fn add_friend(&mut self, username: &str) {
        match self.directory.add_friend(username).await {
            Ok(()) => {
                self.notify(SessionNotification::Notice("Friend request sent".into()))
                    .await;
            }
            Err(e) => {
                warn!(username, error = %e, "Add friend failed");
                self.notify(SessionNotification::Notice(format!(
                    "Could not send friend request: {e}"
                )))
                .await;
            }
        }
    }

    async fn accept_friend_request(&mut self, request_id: i64) {
        if let Err(e) = self.directory.accept_request(request_id).await {
            warn!(request_id, error = %e, "Accepting friend request failed");
            self.notify(SessionNotification::Notice(
                "Could not accept the friend request".into(),
            ))
            .await;
            return;
        }
        self.refresh_friends().await;
        self.refresh_requests().await;
    }

    async fn notify(&self, notification: SessionNotification) {
        if self.notifications.send(notification).await.is_err() {
            debug!("Notification channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{FriendRequest, HistoryMessage};
    use crate::test_support::{offer, MockDirectory, MockMedia};
    use chrono::{TimeZone, Utc};
    use sohbet_media::signaling::CallPhase;
    use sohbet_shared::protocol::SdpKind;
    use sohbet_shared::types::Direction;

    fn channels_with(dir: MockDirectory) -> SessionChannels {
        spawn_session(SessionConfig::new("alice"), MockMedia::default(), dir)
    }

    #[tokio::test]
    async fn test_open_conversation_and_message_roundtrip() {
        let timestamp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let dir = MockDirectory::with_history(
            PeerId(42),
            vec![HistoryMessage {
                sender_id: PeerId(42),
                content: "hello".into(),
                timestamp,
            }],
        );
        let mut ch = channels_with(dir);

        ch.commands
            .send(SessionCommand::OpenConversation {
                peer_id: PeerId(42),
                peer_name: "bob".into(),
            })
            .await
            .unwrap();

        match ch.notifications.recv().await.unwrap() {
            SessionNotification::ConversationOpened {
                peer_id,
                peer_name,
                messages,
            } => {
                assert_eq!(peer_id, PeerId(42));
                assert_eq!(peer_name, "bob");
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].direction, Direction::Received);
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        // Send a message; it only shows up once the relay echoes it.
        ch.commands
            .send(SessionCommand::SendMessage { content: "yo".into() })
            .await
            .unwrap();
        let sent = ch.outbound.recv().await.unwrap();
        let ClientEvent::SendMessage {
            receiver,
            content,
            message_id,
        } = sent
        else {
            panic!("expected SendMessage");
        };
        assert_eq!(receiver, "bob");
        assert_eq!(content, "yo");

        ch.inbound
            .send(ServerEvent::ReceiveMessage {
                sender: "alice".into(),
                content: "yo".into(),
                timestamp,
                message_id: Some(message_id),
            })
            .await
            .unwrap();
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::MessageAppended(message) => {
                assert_eq!(message.direction, Direction::Sent);
                assert_eq!(message.content, "yo");
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receiver_call_path_over_channels() {
        let mut ch = channels_with(MockDirectory::default());

        ch.inbound
            .send(ServerEvent::IncomingCall {
                from: "bob".into(),
                signal: offer(),
            })
            .await
            .unwrap();
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::CallStateChanged { phase, peer } => {
                assert_eq!(phase, CallPhase::Incoming);
                assert_eq!(peer.as_deref(), Some("bob"));
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        ch.commands.send(SessionCommand::AcceptCall).await.unwrap();
        let answered = ch.outbound.recv().await.unwrap();
        match &answered {
            ClientEvent::AnswerCall { to, signal } => {
                assert_eq!(to, "bob");
                assert_eq!(signal.kind, SdpKind::Answer);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::CallStateChanged { phase, .. } => {
                assert_eq!(phase, CallPhase::Connected);
            }
            other => panic!("unexpected notification: {other:?}"),
        }

        ch.inbound.send(ServerEvent::CallEnded {}).await.unwrap();
        assert_eq!(
            ch.notifications.recv().await.unwrap(),
            SessionNotification::RemoteStreamCleared
        );
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::CallStateChanged { phase, peer } => {
                assert_eq!(phase, CallPhase::Idle);
                assert_eq!(peer, None);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_busy_offer_produces_no_traffic() {
        let mut ch = channels_with(MockDirectory::default());

        ch.inbound
            .send(ServerEvent::IncomingCall {
                from: "bob".into(),
                signal: offer(),
            })
            .await
            .unwrap();
        ch.notifications.recv().await.unwrap();

        // Second caller while ringing: silently dropped.
        ch.inbound
            .send(ServerEvent::IncomingCall {
                from: "mallory".into(),
                signal: offer(),
            })
            .await
            .unwrap();

        ch.commands.send(SessionCommand::AcceptCall).await.unwrap();
        let answered = ch.outbound.recv().await.unwrap();
        match &answered {
            ClientEvent::AnswerCall { to, .. } => assert_eq!(to, "bob"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(
            ch.outbound.try_recv().is_err(),
            "busy rejection must emit nothing"
        );
    }

    #[tokio::test]
    async fn test_start_call_without_conversation_notices() {
        let mut ch = channels_with(MockDirectory::default());

        ch.commands.send(SessionCommand::StartCall).await.unwrap();
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::Notice(_) => {}
            other => panic!("unexpected notification: {other:?}"),
        }
        assert!(ch.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_friend_request_event_refreshes_pending_list() {
        let dir = MockDirectory::default();
        dir.requests.lock().unwrap().push(FriendRequest {
            id: 3,
            sender: "carol".into(),
        });
        let mut ch = channels_with(dir);

        ch.inbound.send(ServerEvent::FriendRequest {}).await.unwrap();
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::FriendRequestsUpdated(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].sender, "carol");
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accept_friend_request_refreshes_both_lists() {
        let dir = MockDirectory::default();
        dir.requests.lock().unwrap().push(FriendRequest {
            id: 3,
            sender: "carol".into(),
        });
        let mut ch = channels_with(dir.clone());

        ch.commands
            .send(SessionCommand::AcceptFriendRequest { request_id: 3 })
            .await
            .unwrap();

        match ch.notifications.recv().await.unwrap() {
            SessionNotification::FriendsUpdated(_) => {}
            other => panic!("unexpected notification: {other:?}"),
        }
        match ch.notifications.recv().await.unwrap() {
            SessionNotification::FriendRequestsUpdated(requests) => {
                assert!(requests.is_empty());
            }
            other => panic!("unexpected notification: {other:?}"),
        }
        assert_eq!(dir.accepted.lock().unwrap().as_slice(), &[3]);
    }

    #[tokio::test]
    async fn test_shutdown_releases_call_resources() {
        let media = MockMedia::default();
        let dir = MockDirectory::with_history(PeerId(42), Vec::new());
        let mut ch = spawn_session(SessionConfig::new("alice"), media.clone(), dir);

        ch.commands
            .send(SessionCommand::OpenConversation {
                peer_id: PeerId(42),
                peer_name: "bob".into(),
            })
            .await
            .unwrap();
        ch.notifications.recv().await.unwrap();

        ch.commands.send(SessionCommand::StartCall).await.unwrap();
        let _ = ch.outbound.recv().await.unwrap();

        ch.commands.send(SessionCommand::Shutdown).await.unwrap();
        // The task cleans up on exit; the notification channel closing
        // after the teardown notifications marks completion.
        let mut cleared = false;
        while let Some(n) = ch.notifications.recv().await {
            if n == SessionNotification::RemoteStreamCleared {
                cleared = true;
            }
        }
        assert!(cleared);
        assert_eq!(
            media
                .state
                .capture_stops
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
