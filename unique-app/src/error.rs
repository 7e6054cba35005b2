use std::time::Duration;

/// Errors raised while registering, forwarding or serving forwarded calls
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid application id '{0}'")]
    InvalidAppId(String),

    /// The name could not be claimed for a reason other than it being taken
    #[error("Failed to register '{name}': {reason}")]
    Registration { name: String, reason: String },

    /// Lost the registration but no primary instance owns the name
    #[error("No primary instance owns '{0}'")]
    Resolution(String),

    /// A remote call could not be delivered
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?} waiting for the primary instance")]
    SessionTimeout(Duration),

    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Invalid file reference '{0}'")]
    InvalidFile(String),

    /// Forwarding was requested but this instance is the primary
    #[error("This instance is not a secondary instance")]
    NotRemote,
}

impl From<zbus::Error> for Error {
    fn from(e: zbus::Error) -> Self {
        Error::Transport(format!("zbus error: {}", e))
    }
}

impl From<zbus::fdo::Error> for Error {
    fn from(e: zbus::fdo::Error) -> Self {
        Error::Transport(format!("D-Bus error: {}", e))
    }
}
