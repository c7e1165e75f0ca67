// Sequential queue worker with cooperative pause and stop

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use super::manager::{QueueItem, QueueManager, QueueStatus};
use crate::downloader::errors::DownloadError;
use crate::downloader::filters::{AuthorFilter, AuthorIdentity, DateFilter, DatePreset};
use crate::downloader::models::{Comment, SortOrder};
use crate::downloader::paginator::ContinuationPaginator;
use crate::downloader::playlist::PlaylistExpander;
use crate::downloader::threads::ThreadBuilder;
use crate::downloader::traits::{ChannelDirectory, CommentSink};
use crate::downloader::utils::{extract_post_id, extract_video_id};

/// Pause and stop requests shared between the worker and whoever drives it.
///
/// Stop is final for this control; start a new one to resume.
#[derive(Debug, Default)]
pub struct WorkerControl {
    stop: CancellationToken,
    pause: AtomicBool,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the current item as soon as it checks; it is left paused
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Finish the current item, then stop claiming new ones
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// Per-job options read from the queue's settings bag
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub sort: SortOrder,
    pub language: Option<String>,
    pub author: AuthorIdentity,
    /// Keep only the video owner's comments (with their parents)
    pub filter_video_author: bool,
    pub date: DateFilter,
    pub limit: Option<usize>,
    pub output_dir: Option<PathBuf>,
}

impl JobOptions {
    /// Unknown or malformed values fall back to defaults
    pub fn from_settings(settings: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let sort = text("sort")
            .and_then(|s| s.parse::<SortOrder>().ok())
            .unwrap_or_default();
        let preset = text("date_preset")
            .and_then(|s| s.parse::<DatePreset>().ok())
            .unwrap_or_default();
        let limit = settings
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|&n| n > 0)
            .map(|n| n as usize);

        Self {
            sort,
            language: text("language").map(str::to_string),
            author: text("author").map(AuthorIdentity::parse).unwrap_or_default(),
            filter_video_author: settings
                .get("filter_video_author")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            date: DateFilter::preset(preset),
            limit,
            output_dir: text("output_dir").map(PathBuf::from),
        }
    }
}

/// Counts for one `QueueWorker::run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub paused: bool,
    pub stopped: bool,
}

pub struct QueueWorker {
    paginator: ContinuationPaginator,
    sink: Arc<dyn CommentSink>,
    directory: Arc<dyn ChannelDirectory>,
    control: Arc<WorkerControl>,
}

impl QueueWorker {
    pub fn new(
        paginator: ContinuationPaginator,
        sink: Arc<dyn CommentSink>,
        directory: Arc<dyn ChannelDirectory>,
        control: Arc<WorkerControl>,
    ) -> Self {
        Self {
            paginator,
            sink,
            directory,
            control,
        }
    }

    /// Process pending items one at a time until none is left, a pause is
    /// requested (checked between items) or a stop is requested (checked
    /// inside the item, which is then left paused).
    pub async fn run(&self, queue: &mut QueueManager) -> RunSummary {
        let mut summary = RunSummary::default();

        loop {
            if self.control.is_stopped() {
                summary.stopped = true;
                break;
            }
            if self.control.is_paused() {
                tracing::info!("[Worker] Paused");
                summary.paused = true;
                break;
            }

            let Some(item) = queue.next_pending().cloned() else {
                tracing::info!("[Worker] Queue finished");
                break;
            };

            if !queue.claim(&item.video_id) {
                tracing::warn!("[Worker] Could not claim {}; stopping", item.video_id);
                break;
            }
            tracing::info!("[Worker] Processing {} ({})", item.video_id, item.title);
            let options = JobOptions::from_settings(queue.settings());

            match self.process(queue, &item, &options).await {
                Ok(written) => {
                    tracing::info!("[Worker] ✓ {}: {} comment(s)", item.video_id, written);
                    finish(queue, &item.video_id, QueueStatus::Complete, None);
                    summary.completed += 1;
                }
                Err(DownloadError::Cancelled) => {
                    tracing::info!("[Worker] Stopped during {}", item.video_id);
                    finish(queue, &item.video_id, QueueStatus::Paused, None);
                    summary.stopped = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!("[Worker] ✗ {}: {}", item.video_id, e);
                    finish(queue, &item.video_id, QueueStatus::Error, Some(e.to_string()));
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    async fn process(
        &self,
        queue: &mut QueueManager,
        item: &QueueItem,
        options: &JobOptions,
    ) -> Result<usize, DownloadError> {
        let video_id = item.video_id.as_str();
        let (metadata, mut stream) = self
            .paginator
            .open(
                item.kind(),
                video_id,
                options.sort,
                options.language.as_deref(),
                self.control.token(),
            )
            .await?;

        if let Some(title) = &metadata.title {
            queue.set_title(video_id, title);
        }
        queue.record_progress(video_id, 0, Some(metadata.comment_count));

        let mut seen_channels = HashSet::new();
        if let (Some(id), Some(name)) = (&metadata.channel_id, &metadata.channel_name) {
            self.directory.register(id, name);
            seen_channels.insert(id.clone());
        }

        let mut comments: Vec<Comment> = Vec::new();
        let mut pages_recorded = 0;
        while let Some(comment) = stream.next().await {
            if seen_channels.insert(comment.author_channel_id.clone()) {
                self.directory
                    .register(&comment.author_channel_id, &comment.author_display_name);
            }
            comments.push(comment);

            // once per fetched page
            if stream.pages_fetched() != pages_recorded {
                pages_recorded = stream.pages_fetched();
                queue.record_progress(video_id, comments.len() as u64, None);
            }

            if self.control.is_stopped() {
                return Err(DownloadError::Cancelled);
            }
            if options.limit.is_some_and(|limit| comments.len() >= limit) {
                tracing::debug!("[Worker] Limit reached for {}", video_id);
                break;
            }
        }
        queue.record_progress(video_id, comments.len() as u64, None);

        match stream.take_error() {
            Some(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
            Some(e) if comments.is_empty() => return Err(e),
            Some(e) => tracing::warn!(
                "[Worker] Keeping {} comment(s) for {} after: {}",
                comments.len(),
                video_id,
                e
            ),
            None => {}
        }

        let comments = if options.date.is_active() {
            let before = comments.len();
            let kept = options.date.apply(comments, OffsetDateTime::now_utc());
            tracing::debug!(
                "[Worker] Date filter kept {} of {} comment(s)",
                kept.len(),
                before
            );
            kept
        } else {
            comments
        };

        let identity = if options.filter_video_author {
            metadata
                .channel_id
                .clone()
                .map(AuthorIdentity::ChannelId)
                .unwrap_or_default()
        } else {
            options.author.clone()
        };
        let label = match &identity {
            AuthorIdentity::Any => None,
            AuthorIdentity::ChannelId(id) => {
                Some(self.directory.display_name(id).unwrap_or_else(|| id.clone()))
            }
            AuthorIdentity::DisplayName(name) => Some(name.clone()),
        };
        let comments = AuthorFilter::apply(&comments, &identity);

        tracing::debug!(
            "[Worker] {}: {} comment(s) in {} thread(s)",
            video_id,
            comments.len(),
            ThreadBuilder::build(&comments).len()
        );

        if self.control.is_stopped() {
            return Err(DownloadError::Cancelled);
        }
        tracing::debug!("[Worker] Handing {} to the {} renderer", video_id, self.sink.name());
        self.sink.write(&metadata, &comments, label.as_deref())?;
        Ok(comments.len())
    }
}

fn finish(queue: &mut QueueManager, video_id: &str, status: QueueStatus, message: Option<String>) {
    if !queue.set_status(video_id, status, message) {
        tracing::warn!("[Worker] Could not mark {} as {:?}", video_id, status);
    }
}

/// Queue a video, a community post, or every member of a playlist. Returns
/// how many items were added; ids already queued are skipped.
pub async fn enqueue_url(
    queue: &mut QueueManager,
    expander: &PlaylistExpander,
    url: &str,
) -> Result<usize, DownloadError> {
    if PlaylistExpander::is_playlist(url) {
        if let Some(playlist_id) = PlaylistExpander::extract_id(url) {
            return enqueue_playlist(queue, expander, &playlist_id).await;
        }
    }

    if let Some(post_id) = extract_post_id(url) {
        return Ok(usize::from(queue.enqueue(&post_id, url, None)));
    }

    let video_id =
        extract_video_id(url).ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;
    Ok(usize::from(queue.enqueue(&video_id, url, None)))
}

pub async fn enqueue_playlist(
    queue: &mut QueueManager,
    expander: &PlaylistExpander,
    playlist_id: &str,
) -> Result<usize, DownloadError> {
    let members = expander.list_members(playlist_id).await?;
    let added = members
        .iter()
        .filter(|entry| queue.enqueue(&entry.video_id, &entry.url, Some(&entry.title)))
        .count();
    tracing::info!(
        "[Queue] Added {} of {} playlist video(s)",
        added,
        members.len()
    );
    Ok(added)
}
