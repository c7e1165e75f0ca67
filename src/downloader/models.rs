// Common data models for the comment downloader

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::errors::DownloadError;

pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";
pub const YOUTUBE_CONSENT_URL: &str = "https://consent.youtube.com/save";
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/79.0.3945.130 Safari/537.36";

/// A single comment as read from the page data.
///
/// Serialized with the short keys used by the JSON export (`cid`, `channel`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "cid")]
    pub id: String,
    pub text: String,
    #[serde(rename = "time")]
    pub relative_time_text: String,
    #[serde(rename = "author")]
    pub author_display_name: String,
    #[serde(rename = "channel")]
    pub author_channel_id: String,
    #[serde(rename = "votes")]
    pub vote_count: String,
    #[serde(rename = "replies", default)]
    pub reply_count: String,
    #[serde(rename = "photo", default)]
    pub photo_url: String,
    #[serde(rename = "heart")]
    pub is_hearted: bool,
    #[serde(rename = "reply")]
    pub is_reply: bool,
    /// Unix timestamp estimated from `relative_time_text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_parsed: Option<i64>,
}

impl Comment {
    /// Id of the parent comment, derived by dropping the last dot-segment.
    ///
    /// Only meaningful for replies; root comments return `None`.
    pub fn parent_id(&self) -> Option<&str> {
        if !self.is_reply {
            return None;
        }
        self.id.rsplit_once('.').map(|(parent, _)| parent)
    }
}

/// Comment sort order offered by the comments section menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Popular,
    #[default]
    Recent,
}

impl SortOrder {
    /// Index of this order in `sortFilterSubMenuRenderer.subMenuItems`
    pub fn menu_index(&self) -> usize {
        match self {
            Self::Popular => 0,
            Self::Recent => 1,
        }
    }
}

impl FromStr for SortOrder {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "popular" | "top" | "0" => Ok(Self::Popular),
            "recent" | "newest" | "1" => Ok(Self::Recent),
            other => Err(DownloadError::ParseError(format!("unknown sort order: {}", other))),
        }
    }
}

/// What a comment section hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Video,
    /// Community post (`/post/<id>`)
    Post,
}

impl ContentKind {
    /// Export folder under the creator's directory
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Post => "posts",
        }
    }
}

/// Information read from the watch page or the community post page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video id, or post id for community posts
    pub video_id: String,
    #[serde(default)]
    pub kind: ContentKind,
    pub title: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    /// Comment count shown in the comments header, 0 when unknown
    pub comment_count: u64,
    /// Full post text (posts only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Attached image URLs, largest rendition (posts only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// One member of a playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

/// Network configuration for the page client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin used for watch, playlist and continuation requests
    pub base_url: String,
    /// Endpoint the consent form is posted to
    pub consent_url: String,
    pub user_agent: String,
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: YOUTUBE_BASE_URL.to_string(),
            consent_url: YOUTUBE_CONSENT_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            proxy: None,
            timeout_seconds: 30,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_consent_url(mut self, url: impl Into<String>) -> Self {
        self.consent_url = url.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn watch_url(&self, video_id: &str) -> String {
        format!("{}/watch?v={}", self.base_url, video_id)
    }

    pub fn playlist_url(&self, playlist_id: &str) -> String {
        format!("{}/playlist?list={}", self.base_url, playlist_id)
    }

    pub fn post_url(&self, post_id: &str) -> String {
        format!("{}/post/{}", self.base_url, post_id)
    }

    /// Landing page of a video or post
    pub fn landing_url(&self, kind: ContentKind, id: &str) -> String {
        match kind {
            ContentKind::Video => self.watch_url(id),
            ContentKind::Post => self.post_url(id),
        }
    }
}

/// Where the queue snapshot (and other state files) live
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl StorageConfig {
    pub const QUEUE_FILE: &'static str = "queue_state.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$YTCD_HOME`, or `~/.youtube_comment_downloader`
    pub fn default_root() -> PathBuf {
        if let Ok(dir) = std::env::var("YTCD_HOME") {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".youtube_comment_downloader")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.root.join(Self::QUEUE_FILE)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}
