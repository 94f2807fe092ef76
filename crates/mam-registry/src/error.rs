use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Timeout, connection failure or a gateway-style status (502, 503, 504).
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// The registry answered but refused the request, or answered with something unusable.
    #[error("Registry rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryError::Unavailable(format!("request timed out: {}", err))
        } else if err.is_decode() {
            RegistryError::Rejected {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                body: format!("invalid response body: {}", err),
            }
        } else {
            RegistryError::Unavailable(err.to_string())
        }
    }
}
