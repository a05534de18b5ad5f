use thiserror::Error;

/// Failure class, assigned once at the request-layer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Validation,
    NotFound,
    /// Any other client-side refusal, e.g. 403 or 429.
    Rejected,
    Server,
    Network,
    Decode,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?} ({}): {message}", status_label(.status))]
pub struct RequestError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status to its failure class.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => ErrorKind::Unauthorized,
            400 | 409 | 422 => ErrorKind::Validation,
            404 => ErrorKind::NotFound,
            402..=499 => ErrorKind::Rejected,
            _ => ErrorKind::Server,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    /// The one classifier every mutation path consults before deciding on
    /// the login redirect.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "-".to_string(), |s| s.to_string())
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return RequestError::from_status(status.as_u16(), e.to_string());
        }
        let kind = if e.is_decode() {
            ErrorKind::Decode
        } else {
            ErrorKind::Network
        };
        RequestError::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(e: serde_json::Error) -> Self {
        RequestError::new(ErrorKind::Decode, e.to_string())
    }
}
