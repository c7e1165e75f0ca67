// Playlist expansion into individual videos

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{ClientConfig, PlaylistEntry};
use super::paginator::fetch_landing;
use super::traits::Transport;
use super::utils::{extract_initial_data, extract_playlist_id, search_dict, text_of};

pub struct PlaylistExpander {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl PlaylistExpander {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Check if URL contains a playlist
    pub fn is_playlist(url: &str) -> bool {
        url.contains("list=")
    }

    pub fn extract_id(url: &str) -> Option<String> {
        extract_playlist_id(url)
    }

    /// Members of a playlist, in playlist order.
    ///
    /// Only the first page of the playlist is read (the initial data carries
    /// the first batch of videos).
    pub async fn list_members(&self, playlist_id: &str) -> Result<Vec<PlaylistEntry>, DownloadError> {
        let url = self.config.playlist_url(playlist_id);
        let landing = fetch_landing(
            self.transport.as_ref(),
            &self.config,
            &url,
            &CancellationToken::new(),
        )
        .await?;
        let data = extract_initial_data(&landing.body)?;

        let entries: Vec<PlaylistEntry> = search_dict(&data, "playlistVideoRenderer")
            .filter_map(|renderer| self.entry(renderer))
            .collect();

        tracing::info!(
            "[Playlist] {} video(s) in playlist {}",
            entries.len(),
            playlist_id
        );
        Ok(entries)
    }

    fn entry(&self, renderer: &Value) -> Option<PlaylistEntry> {
        let video_id = renderer.get("videoId")?.as_str()?.to_string();
        let title = renderer
            .get("title")
            .and_then(|title| {
                title
                    .pointer("/runs/0/text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| text_of(title))
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        Some(PlaylistEntry {
            url: self.config.watch_url(&video_id),
            video_id,
            title,
        })
    }
}
