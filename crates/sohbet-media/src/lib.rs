// Media boundary for voice calls: the adapter contract towards the
// platform media/NAT-traversal stack, and the pure signaling state machine.

pub mod adapter;
pub mod signaling;

pub use adapter::{
    CallGeneration, ConnectionEvent, LocalCapture, MediaAdapter, MediaError, PeerConnection,
};
pub use signaling::{CallPhase, OfferDisposition, SignalingError, SignalingSession};
