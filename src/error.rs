use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum HubError {
    // Connection errors
    ConnectionNotFound(String),

    // Protocol preconditions
    AuthRequired,
    NotInRoom(String),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionNotFound(id) => write!(f, "Connection not found: {}", id),
            Self::AuthRequired => write!(f, "Identity required before this operation"),
            Self::NotInRoom(room_id) => write!(f, "Not a member of room: {}", room_id),
        }
    }
}

impl Error for HubError {}

impl HubError {
    /// Stable wire code for typed rejection replies
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionNotFound(_) => "connection_not_found",
            Self::AuthRequired => "auth_required",
            Self::NotInRoom(_) => "not_in_room",
        }
    }
}

// Generic result type for the hub
pub type Result<T> = std::result::Result<T, HubError>;
