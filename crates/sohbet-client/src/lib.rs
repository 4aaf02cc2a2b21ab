// Client-side session core: the open conversation's message log and the
// voice-call signaling slot, driven by a single event-dispatch task.

pub mod call;
pub mod chat;
pub mod config;
pub mod directory;
pub mod events;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use call::CallManager;
pub use chat::ChatSession;
pub use config::SessionConfig;
pub use directory::{DirectoryClient, Friend, FriendRequest, HistoryMessage};
pub use events::SessionNotification;
pub use session::{spawn_session, SessionChannels, SessionCommand};
