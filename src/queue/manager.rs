// Persistent download queue with a per-item status state machine

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::downloader::errors::DownloadError;
use crate::downloader::export::write_atomic;
use crate::downloader::models::{ContentKind, StorageConfig};
use crate::downloader::utils::extract_post_id;

pub const DEFAULT_TITLE: &str = "Loading...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    #[default]
    Pending,
    Downloading,
    Paused,
    Complete,
    Skipped,
    Error,
}

impl QueueStatus {
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        match (self, next) {
            (Pending, Downloading) | (Pending, Skipped) => true,
            (Downloading, Complete)
            | (Downloading, Error)
            | (Downloading, Paused)
            | (Downloading, Skipped) => true,
            // resume, or recovery of an item interrupted by a crash
            (Paused, Pending) | (Downloading, Pending) => true,
            // retry
            (Error, Pending) => true,
            (Pending, _) | (Downloading, _) | (Paused, _) => false,
            (Complete, _) | (Skipped, _) | (Error, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub video_id: String,
    pub video_url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub status: QueueStatus,
    #[serde(default)]
    pub comments_downloaded: u64,
    /// Estimate read from the landing page; 0 when unknown
    #[serde(default)]
    pub total_comments: u64,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl QueueItem {
    pub fn new(video_id: &str, video_url: &str, title: Option<&str>) -> Self {
        Self {
            video_id: video_id.to_string(),
            video_url: video_url.to_string(),
            title: title
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .unwrap_or_else(default_title),
            status: QueueStatus::Pending,
            comments_downloaded: 0,
            total_comments: 0,
            error_message: None,
        }
    }

    /// Community posts are told apart by their URL
    pub fn kind(&self) -> ContentKind {
        if extract_post_id(&self.video_url).is_some() {
            ContentKind::Post
        } else {
            ContentKind::Video
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueSnapshot {
    queue: Vec<QueueItem>,
    #[serde(default)]
    settings: Map<String, Value>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Ordered queue of jobs, unique by video id.
///
/// Every mutation writes the whole snapshot back to `queue_state.json`.
/// Single writer: no locking.
pub struct QueueManager {
    storage: StorageConfig,
    items: Vec<QueueItem>,
    settings: Map<String, Value>,
}

impl QueueManager {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            items: Vec::new(),
            settings: Map::new(),
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.storage.queue_file()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, video_id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.video_id == video_id)
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Settings are saved with the next persisted mutation (or `persist`)
    pub fn settings_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.settings
    }

    /// Append a pending item. `false` (and no change) if the id is queued already.
    pub fn enqueue(&mut self, video_id: &str, video_url: &str, title: Option<&str>) -> bool {
        if self.get(video_id).is_some() {
            tracing::debug!("[Queue] {} already queued", video_id);
            return false;
        }

        self.items.push(QueueItem::new(video_id, video_url, title));
        tracing::info!("[Queue] Added {} ({} item(s))", video_id, self.items.len());
        self.save();
        true
    }

    /// Out-of-range indexes are ignored
    pub fn dequeue_at(&mut self, index: usize) -> Option<QueueItem> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.save();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.save();
    }

    /// First pending item in queue order. The status is left alone.
    pub fn next_pending(&self) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|item| item.status == QueueStatus::Pending)
    }

    pub fn has_pending_or_paused(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item.status, QueueStatus::Pending | QueueStatus::Paused))
    }

    /// Mark a pending item as downloading. `false` if the item is unknown or
    /// not pending (already claimed, paused, finished).
    pub fn claim(&mut self, video_id: &str) -> bool {
        let pending = self
            .get(video_id)
            .is_some_and(|item| item.status == QueueStatus::Pending);
        pending && self.set_status(video_id, QueueStatus::Downloading, None)
    }

    /// Move an item to `status`. `error_message` is kept only for `Error`.
    ///
    /// Returns `false` for an unknown id or a transition the state machine
    /// does not allow.
    pub fn set_status(
        &mut self,
        video_id: &str,
        status: QueueStatus,
        error_message: Option<String>,
    ) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.video_id == video_id) else {
            return false;
        };

        if item.status != status && !item.status.can_transition_to(status) {
            tracing::warn!(
                "[Queue] Refusing {:?} -> {:?} for {}",
                item.status,
                status,
                video_id
            );
            return false;
        }

        item.status = status;
        item.error_message = match status {
            QueueStatus::Error => error_message,
            _ => None,
        };
        self.save();
        true
    }

    pub fn set_title(&mut self, video_id: &str, title: &str) -> bool {
        let Some(item) = self.items.iter_mut().find(|i| i.video_id == video_id) else {
            return false;
        };
        item.title = title.to_string();
        self.save();
        true
    }

    /// Update progress counters; `comments_downloaded` never goes down
    pub fn record_progress(&mut self, video_id: &str, downloaded: u64, total: Option<u64>) {
        let Some(item) = self.items.iter_mut().find(|i| i.video_id == video_id) else {
            return;
        };

        let downloaded = item.comments_downloaded.max(downloaded);
        let total = total.unwrap_or(item.total_comments);
        if (downloaded, total) == (item.comments_downloaded, item.total_comments) {
            return;
        }
        item.comments_downloaded = downloaded;
        item.total_comments = total;
        self.save();
    }

    /// Put paused items (and items left downloading by an interrupted run)
    /// back to pending. Returns how many were reset.
    pub fn reset_paused(&mut self) -> usize {
        let mut count = 0;
        for item in &mut self.items {
            if matches!(item.status, QueueStatus::Paused | QueueStatus::Downloading) {
                item.status = QueueStatus::Pending;
                count += 1;
            }
        }
        if count > 0 {
            tracing::info!("[Queue] Resuming {} item(s)", count);
            self.save();
        }
        count
    }

    /// Write the whole queue and the settings bag to the snapshot file
    pub fn persist(&self) -> Result<(), DownloadError> {
        fs::create_dir_all(&self.storage.root)?;

        let snapshot = QueueSnapshot {
            queue: self.items.clone(),
            settings: self.settings.clone(),
            last_updated: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        };
        write_atomic(
            &self.storage.queue_file(),
            &serde_json::to_vec_pretty(&snapshot)?,
        )
    }

    /// Replace queue and settings with the saved snapshot.
    ///
    /// `false` when there is no snapshot or it cannot be read; in-memory
    /// state is then left untouched.
    pub fn restore(&mut self) -> bool {
        let path = self.storage.queue_file();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        match serde_json::from_slice::<QueueSnapshot>(&bytes) {
            Ok(snapshot) => {
                let mut seen = HashSet::new();
                let total = snapshot.queue.len();
                self.items = snapshot
                    .queue
                    .into_iter()
                    .filter(|item| seen.insert(item.video_id.clone()))
                    .collect();
                if self.items.len() < total {
                    tracing::warn!(
                        "[Queue] Dropped {} duplicate item(s) from {}",
                        total - self.items.len(),
                        path.display()
                    );
                }
                self.settings = snapshot.settings;
                tracing::info!(
                    "[Queue] Restored {} item(s) from {}",
                    self.items.len(),
                    path.display()
                );
                true
            }
            Err(e) => {
                tracing::warn!("[Queue] Ignoring unreadable snapshot {}: {}", path.display(), e);
                false
            }
        }
    }

    fn save(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!("[Queue] Failed to save queue state: {}", e);
        }
    }
}
