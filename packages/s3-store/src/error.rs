use polystore_core::BackendError;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("Request signing failed: {0}")]
    Signing(#[from] polystore_core::Error),

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },
}

impl From<Error> for BackendError {
    fn from(error: Error) -> Self {
        match error {
            Error::Http(e) => BackendError::Transport(Box::new(e)),
            other => BackendError::other(other.to_string()),
        }
    }
}
