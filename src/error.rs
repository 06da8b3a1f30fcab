use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Webhook rejected notification with HTTP {0}")]
    Webhook(u16),
}

impl Error {
    /// Wraps a transport error, keeping timeouts distinguishable from other failures.
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(url.to_string())
        } else {
            Error::HttpRequest(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::HttpRequest(e) => e.is_timeout(),
            _ => false,
        }
    }
}
