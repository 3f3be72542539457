use crate::models::SlotId;

/// How an error is treated by the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network failure; safe to retry pull reads.
    Transport,
    /// Malformed or unexpected response shape. Handled like `Transport`.
    Protocol,
    /// Server-reported rejection, surfaced verbatim.
    Business,
    /// Local cache disagrees with the server; healed by a forced resync.
    Consistency,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Transport(_) | ApiError::InvalidUrl(_) => ErrorClass::Transport,
            ApiError::Status { .. } | ApiError::Decode(_) => ErrorClass::Protocol,
            ApiError::Rejected(_) => ErrorClass::Business,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transport | ErrorClass::Protocol)
    }
}

/// A realtime frame that could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection not available")]
    NotConnected,

    #[error("channel closed")]
    Closed,

    #[error("invalid channel url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session closed")]
pub struct SessionClosed;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("booking already in progress")]
    AlreadyInProgress,

    #[error("connection not available")]
    ConnectionUnavailable,

    #[error("slot {0} is not available")]
    SlotNotAvailable(SlotId),

    #[error("no teacher selected")]
    NoTeacherSelected,

    #[error("only students can book slots")]
    WrongRole,

    #[error("session closed")]
    SessionClosed,
}

impl From<SessionClosed> for BookingError {
    fn from(_: SessionClosed) -> Self {
        BookingError::SessionClosed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("time must be in HH:MM format (24-hour): {0}")]
    InvalidTime(String),

    #[error("end time must be after start time")]
    EndBeforeStart,

    #[error("connection not available")]
    ConnectionUnavailable,

    #[error("only teachers can add slots")]
    WrongRole,

    #[error("session closed")]
    SessionClosed,
}

impl From<SessionClosed> for SlotError {
    fn from(_: SessionClosed) -> Self {
        SlotError::SessionClosed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("booking {0} is already paid")]
    AlreadyPaid(i64),

    #[error("payment was unsuccessful: {0}")]
    Checkout(String),

    #[error("payment verification failed: {0}")]
    Verification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_classes() {
        assert_eq!(
            ApiError::Decode("not a list".into()).class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            ApiError::Rejected("Teacher not found".into()).class(),
            ErrorClass::Business
        );
        assert!(ApiError::Status { status: 502, body: String::new() }.is_retryable());
        assert!(!ApiError::Rejected("nope".into()).is_retryable());
    }

    #[test]
    fn test_user_visible_messages() {
        assert_eq!(
            BookingError::AlreadyInProgress.to_string(),
            "booking already in progress"
        );
        assert_eq!(
            BookingError::ConnectionUnavailable.to_string(),
            "connection not available"
        );
    }
}
