// Error types for the comment downloader

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network timeout while talking to YouTube
    #[error("Network timeout: YouTube is not responding")]
    NetworkTimeout,

    /// Non-200 answer from YouTube (403/413/429 included)
    #[error("HTTP error {status} from YouTube")]
    Http { status: u16 },

    /// Connection-level failure (DNS, TLS, reset...)
    #[error("Network error: {0}")]
    Network(String),

    /// The consent interstitial came back after it was already acknowledged
    #[error("Consent page returned again after acknowledging it")]
    ConsentLoop,

    /// A well-known page anchor (ytcfg, ytInitialData) was not found
    #[error("Page data not found: {0}")]
    MissingAnchor(&'static str),

    /// Page data was found but did not have the expected shape
    #[error("Parse error: {0}")]
    ParseError(String),

    /// YouTube returned an explicit error message in the page data
    #[error("Error returned from server: {0}")]
    ServerMessage(String),

    /// Invalid YouTube URL or id
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Stop requested by the user
    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DownloadError {
    /// Whether the error came from the network rather than from the page contents
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::Http { .. } | Self::Network(_) | Self::ConsentLoop
        )
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::NetworkTimeout;
        }

        if let Some(status) = e.status() {
            return Self::Http {
                status: status.as_u16(),
            };
        }

        if e.is_decode() {
            return Self::ParseError(e.to_string());
        }

        Self::Network(e.to_string())
    }
}
