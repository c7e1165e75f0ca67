// Continuation-token pagination over the watch/post page and the comments API
//
// Flow:
// 1. GET the landing page (acknowledging the consent interstitial once if needed)
// 2. Scan it for the session config (ytcfg) and the initial data blob
// 3. Pick the sort menu entry; its endpoint is the first continuation
// 4. POST each continuation; responses carry comment records plus more
//    continuations (next thread page, reply pages, "show more replies")

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{ClientConfig, Comment, ContentKind, SortOrder, VideoMetadata};
use super::traits::{HtmlPage, Transport};
use super::utils::{
    extract_hidden_inputs, extract_initial_data, extract_ytcfg, parse_count, parse_relative_time,
    search_dict, text_of,
};

/// Action targets whose items are comment threads (as opposed to replies)
const THREAD_TARGETS: [&str; 3] = [
    "comments-section",
    "engagement-panel-comments-section",
    "shorts-engagement-panel-comments-section",
];
const REPLIES_TARGET_PREFIX: &str = "comment-replies-item";
const HEARTED_STATE: &str = "TOOLBAR_HEART_STATE_HEARTED";
const DEFAULT_POST_TITLE: &str = "Community Post";
const POST_TITLE_CHARS: usize = 100;

/// Where a continuation goes in the pending work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    /// Next page of threads or a thread's reply list: runs after pending work
    Thread,
    /// "Show more replies": runs before anything else pending
    Replies,
}

/// Opaque continuation handle plus the session config needed to resubmit it
#[derive(Debug, Clone)]
pub struct Continuation {
    endpoint: Value,
    session: Arc<Value>,
    pub kind: ContinuationKind,
}

impl Continuation {
    fn token(&self) -> Option<&str> {
        self.endpoint
            .get("continuationCommand")
            .and_then(|c| c.get("token"))
            .and_then(Value::as_str)
    }
}

/// One page of raw records
#[derive(Debug, Default)]
pub struct Page {
    pub comments: Vec<Comment>,
    /// Empty when this page was the last one
    pub continuations: Vec<Continuation>,
}

#[derive(Debug)]
pub struct FirstPage {
    pub metadata: VideoMetadata,
    pub page: Page,
}

/// GET `url`, acknowledging the consent interstitial exactly once.
///
/// `cancel` is checked again before the consent form is posted.
pub async fn fetch_landing(
    transport: &dyn Transport,
    config: &ClientConfig,
    url: &str,
    cancel: &CancellationToken,
) -> Result<HtmlPage, DownloadError> {
    tracing::debug!("[Paginator] GET {} via {}", url, transport.name());
    let page = transport.get_page(url).await?;
    if !page.is_consent() {
        return Ok(page);
    }

    tracing::debug!("[Paginator] Consent interstitial at {}", page.url);
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    let overrides = [
        ("continue", url),
        ("set_eom", "false"),
        ("set_ytc", "true"),
        ("set_apyt", "true"),
    ];
    let mut params: Vec<(String, String)> = extract_hidden_inputs(&page.body)
        .into_iter()
        .filter(|(name, _)| !overrides.iter().any(|(key, _)| key == name))
        .collect();
    params.extend(
        overrides
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string())),
    );

    let page = transport.post_form(&config.consent_url, &params).await?;
    if page.is_consent() {
        return Err(DownloadError::ConsentLoop);
    }
    Ok(page)
}

#[derive(Clone)]
pub struct ContinuationPaginator {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl ContinuationPaginator {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    /// Read the watch page and resolve the first continuation for `sort`.
    ///
    /// An empty continuation list means comments are disabled (or absent).
    pub async fn fetch_first_page(
        &self,
        video_id: &str,
        sort: SortOrder,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FirstPage, DownloadError> {
        self.fetch_first(ContentKind::Video, video_id, sort, language, cancel)
            .await
    }

    /// Same as [`fetch_first_page`](Self::fetch_first_page) for a community post
    pub async fn fetch_post_first_page(
        &self,
        post_id: &str,
        sort: SortOrder,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FirstPage, DownloadError> {
        self.fetch_first(ContentKind::Post, post_id, sort, language, cancel)
            .await
    }

    async fn fetch_first(
        &self,
        kind: ContentKind,
        id: &str,
        sort: SortOrder,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FirstPage, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let url = self.config.landing_url(kind, id);
        let landing = fetch_landing(self.transport.as_ref(), &self.config, &url, cancel).await?;

        let mut ytcfg = extract_ytcfg(&landing.body)?;
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            if let Some(Value::Object(client)) = ytcfg.pointer_mut("/INNERTUBE_CONTEXT/client") {
                client.insert("hl".to_string(), Value::String(language.to_string()));
            }
        }
        let session = Arc::new(ytcfg);

        let data = extract_initial_data(&landing.body)?;
        let metadata = match kind {
            ContentKind::Video => read_metadata(id, &data),
            ContentKind::Post => read_post_metadata(id, &data),
        };
        let comments = parse_comments(&data);

        let Some(section_endpoint) = item_section_continuation(&data) else {
            tracing::info!("[Paginator] No comment section for {} (comments disabled?)", id);
            return Ok(FirstPage {
                metadata,
                page: Page {
                    comments,
                    continuations: Vec::new(),
                },
            });
        };

        let mut sort_menu = sort_menu_items(&data);
        if sort_menu.is_empty() {
            // Sort menu is not on the landing page; it comes with the first section page.
            let first = search_dict(&data, "sectionListRenderer")
                .next()
                .and_then(|list| search_dict(list, "continuationEndpoint").next())
                .cloned();
            if let Some(endpoint) = first {
                if cancel.is_cancelled() {
                    return Err(DownloadError::Cancelled);
                }
                let section = Continuation {
                    endpoint,
                    session: session.clone(),
                    kind: ContinuationKind::Thread,
                };
                match self.ajax(&section).await {
                    Ok(response) => sort_menu = sort_menu_items(&response),
                    Err(e) => tracing::warn!("[Paginator] Sort menu request failed: {}", e),
                }
            }
        }

        let endpoint = match sort_menu
            .get(sort.menu_index())
            .and_then(|item| item.get("serviceEndpoint"))
        {
            Some(endpoint) => endpoint.clone(),
            None => {
                tracing::warn!(
                    "[Paginator] No sort menu for {}; using default comment order",
                    id
                );
                section_endpoint
            }
        };

        Ok(FirstPage {
            metadata,
            page: Page {
                comments,
                continuations: vec![Continuation {
                    endpoint,
                    session,
                    kind: ContinuationKind::Thread,
                }],
            },
        })
    }

    /// Submit one continuation and collect its records and follow-ups
    pub async fn fetch_next_page(&self, continuation: &Continuation) -> Result<Page, DownloadError> {
        let response = self.ajax(continuation).await?;

        if let Some(message) = search_dict(&response, "externalErrorMessage").next() {
            let message = message
                .as_str()
                .map(str::to_string)
                .or_else(|| text_of(message))
                .unwrap_or_default();
            return Err(DownloadError::ServerMessage(message));
        }

        let mut continuations = Vec::new();
        let actions = search_dict(&response, "reloadContinuationItemsCommand")
            .chain(search_dict(&response, "appendContinuationItemsAction"));

        for action in actions {
            let target = action.get("targetId").and_then(Value::as_str).unwrap_or("");
            let Some(items) = action.get("continuationItems").and_then(Value::as_array) else {
                continue;
            };

            for item in items {
                if THREAD_TARGETS.contains(&target) {
                    continuations.extend(search_dict(item, "continuationEndpoint").map(|ep| {
                        Continuation {
                            endpoint: ep.clone(),
                            session: continuation.session.clone(),
                            kind: ContinuationKind::Thread,
                        }
                    }));
                }

                if target.starts_with(REPLIES_TARGET_PREFIX)
                    && item.get("continuationItemRenderer").is_some()
                {
                    let command = search_dict(item, "buttonRenderer")
                        .next()
                        .and_then(|button| button.get("command"));
                    if let Some(command) = command {
                        continuations.push(Continuation {
                            endpoint: command.clone(),
                            session: continuation.session.clone(),
                            kind: ContinuationKind::Replies,
                        });
                    }
                }
            }
        }

        Ok(Page {
            comments: parse_comments(&response),
            continuations,
        })
    }

    /// Fetch the first page of a video or post and wrap the rest of the
    /// pagination in a lazy stream
    pub async fn open(
        &self,
        kind: ContentKind,
        id: &str,
        sort: SortOrder,
        language: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<(VideoMetadata, CommentStream), DownloadError> {
        let first = self.fetch_first(kind, id, sort, language, &cancel).await?;
        let mut stream = CommentStream {
            paginator: self.clone(),
            buffer: VecDeque::new(),
            pending: Vec::new(),
            cancel,
            error: None,
            pages_fetched: 1,
        };
        stream.absorb(first.page);
        Ok((first.metadata, stream))
    }

    async fn ajax(&self, continuation: &Continuation) -> Result<Value, DownloadError> {
        let api_url = continuation
            .endpoint
            .pointer("/commandMetadata/webCommandMetadata/apiUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| DownloadError::ParseError("continuation has no apiUrl".into()))?;
        let token = continuation
            .token()
            .ok_or_else(|| DownloadError::ParseError("continuation has no token".into()))?;
        let api_key = continuation
            .session
            .get("INNERTUBE_API_KEY")
            .and_then(Value::as_str)
            .ok_or_else(|| DownloadError::ParseError("ytcfg has no INNERTUBE_API_KEY".into()))?;
        let context = continuation
            .session
            .get("INNERTUBE_CONTEXT")
            .cloned()
            .ok_or_else(|| DownloadError::ParseError("ytcfg has no INNERTUBE_CONTEXT".into()))?;

        let url = format!("{}{}", self.config.base_url, api_url);
        let body = json!({ "context": context, "continuation": token });
        let query = [("key".to_string(), api_key.to_string())];

        let response = self.transport.post_json(&url, &query, &body).await?;
        match &response {
            Value::Object(map) if !map.is_empty() => Ok(response),
            _ => Err(DownloadError::ParseError("empty continuation response".into())),
        }
    }
}

/// Lazy, single-pass sequence of raw comments for one video.
///
/// Pages are fetched on demand, strictly one after another. Any failure ends
/// the stream; comments already yielded stay valid and the cause is kept in
/// [`CommentStream::error`].
pub struct CommentStream {
    paginator: ContinuationPaginator,
    buffer: VecDeque<Comment>,
    pending: Vec<Continuation>,
    cancel: CancellationToken,
    error: Option<DownloadError>,
    pages_fetched: usize,
}

impl CommentStream {
    pub async fn next(&mut self) -> Option<Comment> {
        loop {
            if let Some(comment) = self.buffer.pop_front() {
                return Some(comment);
            }

            let continuation = self.pending.pop()?;

            if self.cancel.is_cancelled() {
                self.finish(DownloadError::Cancelled);
                return None;
            }

            match self.paginator.fetch_next_page(&continuation).await {
                Ok(page) => {
                    self.pages_fetched += 1;
                    self.absorb(page);
                }
                Err(e) => {
                    let cause = if e.is_transport() { "network" } else { "page data" };
                    tracing::warn!(
                        "[Paginator] Stopping after {} page(s), {} error: {}",
                        self.pages_fetched,
                        cause,
                        e
                    );
                    self.finish(e);
                    return None;
                }
            }
        }
    }

    /// Why the stream ended early, if it did
    pub fn error(&self) -> Option<&DownloadError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<DownloadError> {
        self.error.take()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn finish(&mut self, error: DownloadError) {
        self.pending.clear();
        self.buffer.clear();
        self.error = Some(error);
    }

    fn absorb(&mut self, page: Page) {
        self.buffer.extend(page.comments);

        // `pending` is a stack: the last element runs next. Thread-level
        // continuations keep document order below everything pending.
        let (threads, replies): (Vec<_>, Vec<_>) = page
            .continuations
            .into_iter()
            .partition(|c| c.kind == ContinuationKind::Thread);
        self.pending.splice(0..0, threads.into_iter().rev());
        self.pending.extend(replies);
    }
}

// Post pages put the post itself in an item section ahead of the comments one.
fn item_section_continuation(data: &Value) -> Option<Value> {
    search_dict(data, "itemSectionRenderer").find_map(|section| {
        let renderer = search_dict(section, "continuationItemRenderer").next()?;
        renderer
            .get("continuationEndpoint")
            .or_else(|| renderer.pointer("/button/buttonRenderer/command"))
            .cloned()
    })
}

fn sort_menu_items(data: &Value) -> Vec<Value> {
    search_dict(data, "sortFilterSubMenuRenderer")
        .next()
        .and_then(|menu| menu.get("subMenuItems"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn read_metadata(video_id: &str, data: &Value) -> VideoMetadata {
    let title = search_dict(data, "videoPrimaryInfoRenderer")
        .next()
        .and_then(|r| r.get("title"))
        .and_then(text_of);

    let owner = search_dict(data, "videoOwnerRenderer").next();
    let channel_name = owner.and_then(|o| o.get("title")).and_then(text_of);
    let channel_id = owner
        .and_then(|o| o.pointer("/navigationEndpoint/browseEndpoint/browseId"))
        .and_then(Value::as_str)
        .map(str::to_string);

    VideoMetadata {
        video_id: video_id.to_string(),
        kind: ContentKind::Video,
        title,
        channel_id,
        channel_name,
        comment_count: read_comment_count(data),
        ..VideoMetadata::default()
    }
}

fn read_post_metadata(post_id: &str, data: &Value) -> VideoMetadata {
    let post = search_dict(data, "backstagePostRenderer").next();

    let content = post.and_then(|p| p.get("contentText")).and_then(text_of);
    let title = content
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(|text| text.chars().take(POST_TITLE_CHARS).collect::<String>())
        .unwrap_or_else(|| DEFAULT_POST_TITLE.to_string());

    let channel_name = post
        .and_then(|p| p.pointer("/authorText/runs/0/text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| post.and_then(|p| p.get("authorText")).and_then(text_of));
    let channel_id = post
        .and_then(|p| p.pointer("/authorEndpoint/browseEndpoint/browseId"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let images = post
        .and_then(|p| p.pointer("/backstageAttachment/backstageImageRenderer/image/thumbnails"))
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|thumb| thumb.get("url"))
        .and_then(Value::as_str)
        .map(|url| vec![url.to_string()])
        .unwrap_or_default();

    VideoMetadata {
        video_id: post_id.to_string(),
        kind: ContentKind::Post,
        title: Some(title),
        channel_id,
        channel_name,
        comment_count: read_comment_count(data),
        content,
        images,
    }
}

fn read_comment_count(data: &Value) -> u64 {
    search_dict(data, "commentsEntryPointHeaderRenderer")
        .next()
        .and_then(|r| r.get("commentCount"))
        .and_then(text_of)
        .or_else(|| {
            search_dict(data, "commentsHeaderRenderer")
                .next()
                .and_then(|r| r.get("countText"))
                .and_then(text_of)
        })
        .map(|text| parse_count(&text))
        .unwrap_or(0)
}

/// Comment records of a page, in document order.
///
/// Current pages carry `commentEntityPayload` mutations; older layouts (and
/// community posts) use `commentRenderer`.
fn parse_comments(data: &Value) -> Vec<Comment> {
    let now = OffsetDateTime::now_utc();

    let toolbar_states: HashMap<&str, &Value> =
        search_dict(data, "engagementToolbarStateEntityPayload")
            .filter_map(|state| Some((state.get("key")?.as_str()?, state)))
            .collect();

    let entities: Vec<Comment> = search_dict(data, "commentEntityPayload")
        .filter_map(|entity| parse_entity(entity, &toolbar_states, now))
        .collect();
    if !entities.is_empty() {
        return entities;
    }

    search_dict(data, "commentRenderer")
        .filter_map(|renderer| parse_renderer(renderer, now))
        .collect()
}

fn parse_entity(
    entity: &Value,
    toolbar_states: &HashMap<&str, &Value>,
    now: OffsetDateTime,
) -> Option<Comment> {
    let properties = entity.get("properties")?;
    let id = properties.get("commentId")?.as_str()?.to_string();
    let author = entity.get("author");
    let toolbar = entity.get("toolbar");

    let str_at = |value: Option<&Value>, key: &str| -> String {
        value
            .and_then(|v| v.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    let relative_time_text = str_at(Some(properties), "publishedTime");
    let votes = str_at(toolbar, "likeCountNotliked").trim().to_string();
    let is_hearted = properties
        .get("toolbarStateKey")
        .and_then(Value::as_str)
        .and_then(|key| toolbar_states.get(key))
        .and_then(|state| state.get("heartState"))
        .and_then(Value::as_str)
        == Some(HEARTED_STATE);

    Some(Comment {
        text: properties
            .pointer("/content/content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        time_parsed: estimate_time(&relative_time_text, now),
        relative_time_text,
        author_display_name: str_at(author, "displayName"),
        author_channel_id: str_at(author, "channelId"),
        vote_count: if votes.is_empty() { "0".to_string() } else { votes },
        reply_count: str_at(toolbar, "replyCount"),
        photo_url: str_at(author, "avatarThumbnailUrl"),
        is_hearted,
        is_reply: id.contains('.'),
        id,
    })
}

fn parse_renderer(renderer: &Value, now: OffsetDateTime) -> Option<Comment> {
    let id = renderer.get("commentId")?.as_str()?.to_string();
    let text_at = |key: &str| renderer.get(key).and_then(text_of).unwrap_or_default();

    let relative_time_text = text_at("publishedTimeText");
    let votes = text_at("voteCount").trim().to_string();
    let photo_url = renderer
        .pointer("/authorThumbnail/thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|thumb| thumb.get("url"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let is_hearted = match renderer.get("creatorHeart") {
        Some(heart) => heart
            .pointer("/creatorHeartRenderer/isHearted")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        None => false,
    };

    Some(Comment {
        text: text_at("contentText"),
        time_parsed: estimate_time(&relative_time_text, now),
        relative_time_text,
        author_display_name: text_at("authorText"),
        author_channel_id: renderer
            .pointer("/authorEndpoint/browseEndpoint/browseId")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        vote_count: if votes.is_empty() { "0".to_string() } else { votes },
        reply_count: renderer
            .get("replyCount")
            .map(|count| match count {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        photo_url,
        is_hearted,
        is_reply: id.contains('.'),
        id,
    })
}

fn estimate_time(relative: &str, now: OffsetDateTime) -> Option<i64> {
    // "3 days ago (edited)"
    let relative = relative.split('(').next().unwrap_or("").trim();
    parse_relative_time(relative, now).map(|t| t.unix_timestamp())
}
