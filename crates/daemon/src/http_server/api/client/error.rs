use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("driver error: {0}")]
    Driver(String),
}
