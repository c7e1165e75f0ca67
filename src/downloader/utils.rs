// Helper functions shared by the paginator, playlist expander and exporters

use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

use super::errors::DownloadError;
use super::models::ContentKind;

lazy_static::lazy_static! {
    static ref YT_CFG_RE: Regex = Regex::new(r"ytcfg\.set\s*\(\s*(\{.+?\})\s*\)\s*;").unwrap();
    static ref YT_INITIAL_DATA_RE: Regex = Regex::new(
        r#"(?:window\s*\[\s*["']ytInitialData["']\s*\]|ytInitialData)\s*=\s*(\{.+?\})\s*;\s*(?:var\s+meta|</script|\n)"#
    ).unwrap();
    static ref YT_HIDDEN_INPUT_RE: Regex = Regex::new(
        r#"<input\s+type="hidden"\s+name="([A-Za-z0-9_]+)"\s+value="([A-Za-z0-9_\-\.]*)"\s*(?:required|)\s*>"#
    ).unwrap();
    static ref VIDEO_PATH_RE: Regex = Regex::new(
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})"
    ).unwrap();
    static ref VIDEO_PARAM_RE: Regex = Regex::new(r"youtube\.com/.*[?&]v=([a-zA-Z0-9_-]{11})").unwrap();
    static ref BARE_ID_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap();
    static ref PLAYLIST_ID_RE: Regex = Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").unwrap();
    static ref POST_ID_RE: Regex = Regex::new(r"youtube\.com/(?:post/|.*[?&]lb=)([A-Za-z0-9_-]+)").unwrap();
    static ref RELATIVE_TIME_RE: Regex = Regex::new(
        r"(?i)(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago"
    ).unwrap();
    static ref INVALID_FILENAME_RE: Regex = Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Lazily yields every value stored under `key` anywhere in `root`.
///
/// Depth-first over an explicit stack, in document order. A matched value is
/// yielded as-is and not searched further. There is no cycle detection;
/// `serde_json::Value` trees cannot be cyclic.
pub fn search_dict<'a>(root: &'a Value, key: &'a str) -> SearchDict<'a> {
    SearchDict {
        key,
        stack: vec![Frame::Visit(root)],
    }
}

enum Frame<'a> {
    Visit(&'a Value),
    Yield(&'a Value),
}

pub struct SearchDict<'a> {
    key: &'a str,
    stack: Vec<Frame<'a>>,
}

impl<'a> Iterator for SearchDict<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Yield(value) => return Some(value),
                Frame::Visit(Value::Object(map)) => {
                    for (k, v) in map.iter().rev() {
                        if k == self.key {
                            self.stack.push(Frame::Yield(v));
                        } else {
                            self.stack.push(Frame::Visit(v));
                        }
                    }
                }
                Frame::Visit(Value::Array(items)) => {
                    self.stack.extend(items.iter().rev().map(Frame::Visit));
                }
                Frame::Visit(_) => {}
            }
        }
        None
    }
}

/// Session configuration blob (`ytcfg.set({...});`)
pub fn extract_ytcfg(html: &str) -> Result<Value, DownloadError> {
    extract_json(html, &YT_CFG_RE, "ytcfg")
}

/// Initial page data blob (`ytInitialData = {...};`)
pub fn extract_initial_data(html: &str) -> Result<Value, DownloadError> {
    extract_json(html, &YT_INITIAL_DATA_RE, "ytInitialData")
}

fn extract_json(html: &str, re: &Regex, anchor: &'static str) -> Result<Value, DownloadError> {
    let raw = re
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(DownloadError::MissingAnchor(anchor))?;

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| DownloadError::ParseError(format!("{} is not valid JSON: {}", anchor, e)))?;

    match value {
        Value::Object(ref map) if !map.is_empty() => Ok(value),
        _ => Err(DownloadError::MissingAnchor(anchor)),
    }
}

/// Hidden `<input>` fields of the consent interstitial, in page order
pub fn extract_hidden_inputs(html: &str) -> Vec<(String, String)> {
    YT_HIDDEN_INPUT_RE
        .captures_iter(html)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Extract the 11-character video id from a URL, or accept a bare id.
///
/// Supports watch, youtu.be, embed, legacy `/v/` and shorts URLs, plus any
/// youtube.com URL carrying a `v=` query parameter.
pub fn extract_video_id(url_or_id: &str) -> Option<String> {
    let input = url_or_id.trim();

    for re in [&*VIDEO_PATH_RE, &*VIDEO_PARAM_RE] {
        if let Some(caps) = re.captures(input) {
            return Some(caps[1].to_string());
        }
    }

    if BARE_ID_RE.is_match(input) {
        return Some(input.to_string());
    }

    None
}

/// Id of a community post URL (`youtube.com/post/<id>`, or the older
/// `.../community?lb=<id>` form)
pub fn extract_post_id(url: &str) -> Option<String> {
    POST_ID_RE.captures(url).map(|caps| caps[1].to_string())
}

/// Value of the `list` query parameter
pub fn extract_playlist_id(url: &str) -> Option<String> {
    PLAYLIST_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Concatenate `runs[].text`, or fall back to `simpleText`
pub fn text_of(value: &Value) -> Option<String> {
    if let Some(simple) = value.get("simpleText").and_then(Value::as_str) {
        return Some(simple.to_string());
    }

    let runs = value.get("runs")?.as_array()?;
    let text: String = runs
        .iter()
        .filter_map(|run| run.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

/// Parse a displayed count such as "1,234", "1.2K" or "3M" (0 when unreadable)
pub fn parse_count(text: &str) -> u64 {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let digits_end = cleaned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(cleaned.len());
    let (number, rest) = cleaned.split_at(digits_end);
    let Ok(value) = number.parse::<f64>() else {
        return 0;
    };
    let multiplier = match rest.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('K') => 1_000.0,
        Some('M') => 1_000_000.0,
        Some('B') => 1_000_000_000.0,
        _ => 1.0,
    };
    (value * multiplier).round() as u64
}

/// Estimate the publish time of "3 weeks ago" style text.
///
/// Months count as 30 days and years as 365. Returns `None` when the text
/// has no recognizable relative time.
pub fn parse_relative_time(text: &str, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let lowered = text.to_lowercase();
    if lowered.contains("just now") {
        return Some(now);
    }

    let caps = RELATIVE_TIME_RE.captures(&lowered)?;
    let amount: i32 = caps[1].parse().ok()?;
    let unit = match &caps[2] {
        "second" => Duration::seconds(1),
        "minute" => Duration::minutes(1),
        "hour" => Duration::hours(1),
        "day" => Duration::days(1),
        "week" => Duration::weeks(1),
        "month" => Duration::days(30),
        "year" => Duration::days(365),
        _ => return None,
    };

    now.checked_sub(unit.checked_mul(amount)?)
}

/// Make a string safe to use as a single path segment
pub fn sanitize_filename(name: &str) -> String {
    const MAX_LENGTH: usize = 200;

    let cleaned = INVALID_FILENAME_RE.replace_all(name, "");
    let collapsed = WHITESPACE_RE.replace_all(&cleaned, " ");
    let mut result: String = collapsed.trim().to_string();

    if result.chars().count() > MAX_LENGTH {
        result = result.chars().take(MAX_LENGTH).collect::<String>().trim().to_string();
    }

    if result.is_empty() {
        return "untitled".to_string();
    }

    result
}

/// `<base>/<creator>/<videos|posts>/<title> - comments[ - filtered].<ext>`
pub fn export_path(
    base: &Path,
    creator: &str,
    title: &str,
    extension: &str,
    kind: ContentKind,
    is_filtered: bool,
) -> PathBuf {
    let suffix = if is_filtered { " - filtered" } else { "" };
    base.join(sanitize_filename(creator))
        .join(kind.folder())
        .join(format!(
            "{} - comments{}.{}",
            sanitize_filename(title),
            suffix,
            extension
        ))
}
