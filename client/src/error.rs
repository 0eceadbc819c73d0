use thiserror::Error;

/// Fallback shown to the user when the backend gave no usable message.
pub const GENERIC_BACKEND_MESSAGE: &str = "The server could not process the request";

/// Fallback shown to the user when the backend could not be reached at all.
pub const GENERIC_NETWORK_MESSAGE: &str = "Could not reach the server. Check your connection";

/// Failure surface of every backend call made through [`crate::ApiClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The authentication endpoint rejected the attempt, or a sign-in could
    /// not be completed. Carries a user-displayable message.
    #[error("{message}")]
    Authentication { message: String },

    /// Non-2xx backend response outside the login endpoint. A 401 here has
    /// already cleared the session as a side effect; a 403 has not.
    #[error("backend error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced an HTTP response (DNS, connect, timeout,
    /// malformed body). Not retried automatically.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// HTTP status of the backend response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for direct display in an alert.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Authentication { message } | ApiError::Api { message, .. } => {
                message.clone()
            }
            ApiError::Transport(_) => GENERIC_NETWORK_MESSAGE.to_owned(),
        }
    }
}
