// Shared types and relay wire protocol for the Sohbet session core.

pub mod protocol;
pub mod types;

pub use protocol::{ClientEvent, IceCandidate, SdpKind, ServerEvent, SessionDescription};
pub use types::{Conversation, Direction, Message, PeerId};
