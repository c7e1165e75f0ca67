// Seams between the downloader core and its collaborators

use async_trait::async_trait;
use serde_json::Value;

use super::errors::DownloadError;
use super::models::{Comment, VideoMetadata};

/// A fetched HTML page together with the URL it was finally served from
/// (after redirects).
#[derive(Debug, Clone)]
pub struct HtmlPage {
    pub url: String,
    pub body: String,
}

impl HtmlPage {
    /// The consent interstitial is recognized by its URL, not its content
    pub fn is_consent(&self) -> bool {
        self.url.contains("consent")
    }
}

/// HTTP access used by the paginator and the playlist expander
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name of the transport (for logging)
    fn name(&self) -> &'static str;

    /// GET a page, following redirects
    async fn get_page(&self, url: &str) -> Result<HtmlPage, DownloadError>;

    /// POST with query parameters and no body, following redirects
    async fn post_form(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HtmlPage, DownloadError>;

    /// POST a JSON body and decode the JSON answer. Non-200 is an error.
    async fn post_json(
        &self,
        url: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> Result<Value, DownloadError>;
}

/// Receives the finalized comment list of one job (HTML/TXT/JSON renderers)
pub trait CommentSink: Send + Sync {
    /// Name of the renderer (for logging)
    fn name(&self) -> &'static str;

    /// `filter_label` names the author filter that produced `comments`, if any
    fn write(
        &self,
        video: &VideoMetadata,
        comments: &[Comment],
        filter_label: Option<&str>,
    ) -> Result<(), DownloadError>;
}

/// Known-channel directory (channel id → display name)
pub trait ChannelDirectory: Send + Sync {
    /// Register a newly observed channel. Fire-and-forget: failures are the
    /// directory's business.
    fn register(&self, channel_id: &str, display_name: &str);

    /// Resolve a display name for a channel id
    fn display_name(&self, channel_id: &str) -> Option<String>;
}
