/// Configuration for spawning a session core.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name the local user is known by at the relay. Used to
    /// recognise self-echoed messages when the relay omits the
    /// correlation id.
    pub local_username: String,

    /// Capacity of the command/notification/transport channels.
    pub channel_capacity: usize,

    /// Preferred audio capture device id, `None` for the platform default.
    pub input_device: Option<String>,

    /// Preferred audio output device id, forwarded to the playback
    /// collaborator when a remote stream attaches.
    pub output_device: Option<String>,
}

impl SessionConfig {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self {
            local_username: local_username.into(),
            channel_capacity: 256,
            input_device: None,
            output_device: None,
        }
    }
}
