// Scripted transport and page builders for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::DownloadError;
use super::models::{ClientConfig, Comment};
use super::traits::{HtmlPage, Transport};

pub const OWNER_CHANNEL: &str = "UCowner000000000000000000";

pub fn config() -> ClientConfig {
    ClientConfig::default()
}

pub fn watch_url(video_id: &str) -> String {
    config().watch_url(video_id)
}

/// In-memory transport: pages by URL, continuation responses by token.
/// Unscripted pages answer HTTP 404, unscripted continuations HTTP 500.
#[derive(Default)]
pub struct FakeTransport {
    pages: Mutex<HashMap<String, HtmlPage>>,
    consent_response: Mutex<Option<HtmlPage>>,
    responses: Mutex<HashMap<String, Value>>,
    forms: Mutex<Vec<Vec<(String, String)>>>,
    tokens: Mutex<Vec<String>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeTransport {
    pub fn add_page(&self, url: &str, body: String) {
        self.add_raw_page(
            url,
            HtmlPage {
                url: url.to_string(),
                body,
            },
        );
    }

    pub fn add_raw_page(&self, url: &str, page: HtmlPage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    pub fn set_consent_response(&self, page: HtmlPage) {
        *self.consent_response.lock().unwrap() = Some(page);
    }

    pub fn add_response(&self, token: &str, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(token.to_string(), response);
    }

    /// Cancel `token` while serving the page URL or continuation token `key`
    pub fn cancel_during(&self, key: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((key.to_string(), token));
    }

    fn trip(&self, key: &str) {
        if let Some((wanted, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if wanted == key {
                token.cancel();
            }
        }
    }

    pub fn forms(&self) -> Vec<Vec<(String, String)>> {
        self.forms.lock().unwrap().clone()
    }

    pub fn posted_tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_page(&self, url: &str) -> Result<HtmlPage, DownloadError> {
        self.trip(url);
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(DownloadError::Http { status: 404 })
    }

    async fn post_form(
        &self,
        _url: &str,
        params: &[(String, String)],
    ) -> Result<HtmlPage, DownloadError> {
        self.forms.lock().unwrap().push(params.to_vec());
        self.consent_response
            .lock()
            .unwrap()
            .clone()
            .ok_or(DownloadError::Http { status: 404 })
    }

    async fn post_json(
        &self,
        _url: &str,
        _query: &[(String, String)],
        body: &Value,
    ) -> Result<Value, DownloadError> {
        let token = body["continuation"].as_str().unwrap_or("").to_string();
        self.tokens.lock().unwrap().push(token.clone());
        self.trip(&token);
        self.responses
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or(DownloadError::Http { status: 500 })
    }
}

pub fn endpoint(token: &str) -> Value {
    json!({
        "commandMetadata": {"webCommandMetadata": {"apiUrl": "/youtubei/v1/next"}},
        "continuationCommand": {"token": token}
    })
}

pub fn ytcfg() -> Value {
    json!({
        "INNERTUBE_API_KEY": "test-key",
        "INNERTUBE_CONTEXT": {"client": {"clientName": "WEB", "hl": "en"}}
    })
}

pub fn html(ytcfg: &Value, initial_data: &Value) -> String {
    format!(
        "<html><script>ytcfg.set({});</script><script>var ytInitialData = {};</script></html>",
        ytcfg, initial_data
    )
}

pub fn sort_menu_data() -> Value {
    json!({"header": {"sortFilterSubMenuRenderer": {"subMenuItems": [
        {"title": "Top comments", "serviceEndpoint": endpoint("sort-popular")},
        {"title": "Newest first", "serviceEndpoint": endpoint("sort-recent")}
    ]}}})
}

/// Watch page with title, owner, comment count, comment section and sort menu
pub fn watch_page(title: &str) -> String {
    let data = json!({
        "contents": {"twoColumnWatchNextResults": {"results": {"results": {"contents": [
            {"videoPrimaryInfoRenderer": {"title": {"runs": [{"text": title}]}}},
            {"videoSecondaryInfoRenderer": {"owner": {"videoOwnerRenderer": {
                "title": {"runs": [{"text": "Owner"}]},
                "navigationEndpoint": {"browseEndpoint": {"browseId": OWNER_CHANNEL}}
            }}}},
            {"itemSectionRenderer": {
                "sectionIdentifier": "comment-item-section",
                "contents": [{"continuationItemRenderer": {"continuationEndpoint": endpoint("section")}}]
            }}
        ]}}}},
        "engagementPanels": [
            {"commentsEntryPointHeaderRenderer": {"commentCount": {"simpleText": "1.2K"}}},
            sort_menu_data()
        ]
    });
    html(&ytcfg(), &data)
}

/// Community post page: post text, author, one image, comment section without sort menu
pub fn post_page(text: &str) -> String {
    let data = json!({
        "contents": {"twoColumnBrowseResultsRenderer": {"tabs": [{"tabRenderer": {"content": {
            "sectionListRenderer": {"contents": [
                {"itemSectionRenderer": {"contents": [{"backstagePostThreadRenderer": {"post": {
                    "backstagePostRenderer": {
                        "postId": "UgkxPost",
                        "authorText": {"runs": [{"text": "Owner"}]},
                        "authorEndpoint": {"browseEndpoint": {"browseId": OWNER_CHANNEL}},
                        "contentText": {"runs": [{"text": text}]},
                        "backstageAttachment": {"backstageImageRenderer": {"image": {"thumbnails": [
                            {"url": "https://yt3/small"}, {"url": "https://yt3/large"}
                        ]}}}
                    }
                }}}]}},
                {"itemSectionRenderer": {
                    "sectionIdentifier": "comment-item-section",
                    "contents": [{"continuationItemRenderer": {"continuationEndpoint": endpoint("post-section")}}]
                }}
            ]}
        }}}]}}
    });
    html(&ytcfg(), &data)
}

/// Legacy `commentThreadRenderer` page as served for community posts
pub fn legacy_thread_page(ids: &[&str], next: Option<&str>) -> Value {
    let mut items: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({"commentThreadRenderer": {"comment": {"commentRenderer": {
                "commentId": id,
                "authorText": {"simpleText": "Alice"},
                "authorEndpoint": {"browseEndpoint": {"browseId": "UCalice"}},
                "contentText": {"runs": [{"text": format!("text of {}", id)}]},
                "publishedTimeText": {"runs": [{"text": "1 week ago"}]},
                "voteCount": {"simpleText": "4"}
            }}}})
        })
        .collect();
    if let Some(next) = next {
        items.push(json!({"continuationItemRenderer": {"continuationEndpoint": endpoint(next)}}));
    }

    json!({"onResponseReceivedEndpoints": [
        {"appendContinuationItemsAction": {"targetId": "comments-section", "continuationItems": items}}
    ]})
}

/// `commentEntityPayload` for a comment written by `author`
pub fn entity(id: &str, author: &str, channel: &str) -> Value {
    json!({
        "properties": {
            "commentId": id,
            "content": {"content": format!("text of {}", id)},
            "publishedTime": "3 days ago",
            "toolbarStateKey": format!("ts-{}", id)
        },
        "author": {"displayName": author, "channelId": channel, "avatarThumbnailUrl": "https://yt3/photo"},
        "toolbar": {"likeCountNotliked": " ", "replyCount": ""}
    })
}

fn mutations(entities: &[Value]) -> Value {
    let mut mutations = Vec::new();
    for entity in entities {
        let key = entity["properties"]["toolbarStateKey"].clone();
        mutations.push(json!({"payload": {"commentEntityPayload": entity}}));
        mutations.push(json!({"payload": {"engagementToolbarStateEntityPayload": {
            "key": key,
            "heartState": "TOOLBAR_HEART_STATE_HEARTED"
        }}}));
    }
    json!({"entityBatchUpdate": {"mutations": mutations}})
}

/// Thread-level response: one thread per reply token, then the next-page placeholder
pub fn thread_page(entities: &[Value], reply_tokens: &[&str], next: Option<&str>) -> Value {
    let mut items: Vec<Value> = reply_tokens
        .iter()
        .map(|token| {
            json!({"commentThreadRenderer": {"replies": {"commentRepliesRenderer": {"contents": [
                {"continuationItemRenderer": {"continuationEndpoint": endpoint(token)}}
            ]}}}})
        })
        .collect();
    if let Some(next) = next {
        items.push(json!({"continuationItemRenderer": {"continuationEndpoint": endpoint(next)}}));
    }

    json!({
        "onResponseReceivedEndpoints": [
            {"appendContinuationItemsAction": {"targetId": "comments-section", "continuationItems": items}}
        ],
        "frameworkUpdates": mutations(entities)
    })
}

/// Reply-level response, optionally with a "show more replies" button
pub fn reply_page(entities: &[Value], more: Option<&str>) -> Value {
    let mut items = Vec::new();
    if let Some(more) = more {
        items.push(json!({"continuationItemRenderer": {"button": {"buttonRenderer": {
            "text": {"simpleText": "Show more replies"},
            "command": endpoint(more)
        }}}}));
    }

    json!({
        "onResponseReceivedEndpoints": [
            {"appendContinuationItemsAction": {"targetId": "comment-replies-item-abc", "continuationItems": items}}
        ],
        "frameworkUpdates": mutations(entities)
    })
}

/// Bare comment for algorithm tests
pub fn comment(id: &str, author: &str, is_reply: bool) -> Comment {
    Comment {
        id: id.to_string(),
        text: format!("text of {}", id),
        relative_time_text: "1 day ago".to_string(),
        author_display_name: author.to_string(),
        author_channel_id: format!("UC{}", author),
        vote_count: "0".to_string(),
        reply_count: String::new(),
        photo_url: String::new(),
        is_hearted: false,
        is_reply,
        time_parsed: None,
    }
}
