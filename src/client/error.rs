use reqwest::StatusCode;

/// Failures surfaced by the client layer. `user_message` is what a UI shows;
/// the `Display` text is for logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("not signed in")]
    Auth,

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("payload too large")]
    TooLarge,

    #[error("rejected: {0}")]
    Validation(String),

    #[error("client not configured: {0}")]
    Config(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ClientError {
    /// Map a non-success response. `detail` is the server's message, kept
    /// for logs only except for validation errors.
    pub fn from_status(status: StatusCode, detail: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ClientError::Auth,
            StatusCode::FORBIDDEN => ClientError::Permission(detail),
            StatusCode::PAYLOAD_TOO_LARGE => ClientError::TooLarge,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation(detail),
            StatusCode::REQUEST_TIMEOUT | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => ClientError::Network(detail),
            _ => ClientError::Unexpected(format!("{}: {}", status, detail)),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ClientError::Auth => "Please sign in again".into(),
            ClientError::Permission(_) => "Permission denied".into(),
            ClientError::Network(_) => "Network problem, please check your connection and retry".into(),
            ClientError::TooLarge => "Please use a smaller photo".into(),
            ClientError::Validation(msg) => msg.clone(),
            ClientError::Config(_) => "The app is not configured correctly".into(),
            ClientError::Unexpected(_) => "Something went wrong, please try again".into(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ClientError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::from_status(status, e.to_string())
        } else if e.is_decode() {
            ClientError::Unexpected(format!("bad response: {}", e))
        } else {
            ClientError::Network(e.to_string())
        }
    }
}
