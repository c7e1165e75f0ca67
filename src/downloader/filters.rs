// Comment filters: by author (keeping reply context) and by date

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

use super::errors::DownloadError;
use super::models::Comment;

/// Who to keep when filtering by author
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthorIdentity {
    /// No filtering
    #[default]
    Any,
    /// Stable channel id, matched exactly
    ChannelId(String),
    /// Display name or handle, matched case-insensitively without a leading `@`
    DisplayName(String),
}

impl AuthorIdentity {
    /// `UC` + 22 id characters is a channel id, anything else a display name,
    /// blank input means no filter.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::Any;
        }

        let looks_like_channel = trimmed.len() == 24
            && trimmed.starts_with("UC")
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if looks_like_channel {
            Self::ChannelId(trimmed.to_string())
        } else {
            Self::DisplayName(trimmed.to_string())
        }
    }

    fn normalized_name(name: &str) -> String {
        let name = name.trim();
        name.strip_prefix('@').unwrap_or(name).to_lowercase()
    }

    fn matcher(&self) -> Option<Box<dyn Fn(&Comment) -> bool + '_>> {
        match self {
            Self::Any => None,
            Self::ChannelId(id) if id.is_empty() => None,
            Self::ChannelId(id) => Some(Box::new(move |c: &Comment| c.author_channel_id == *id)),
            Self::DisplayName(name) => {
                let wanted = Self::normalized_name(name);
                if wanted.is_empty() {
                    return None;
                }
                Some(Box::new(move |c: &Comment| {
                    Self::normalized_name(&c.author_display_name) == wanted
                }))
            }
        }
    }
}

impl fmt::Display for AuthorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "everyone"),
            Self::ChannelId(id) => write!(f, "{}", id),
            Self::DisplayName(name) => write!(f, "{}", name),
        }
    }
}

pub struct AuthorFilter;

impl AuthorFilter {
    /// Comments written by `identity`, each reply preceded by its parent.
    ///
    /// The parent is pulled in even when someone else wrote it, as long as it
    /// is part of `comments`. Relative order of matches is kept and nothing
    /// is output twice. `AuthorIdentity::Any` returns the input unchanged.
    pub fn apply(comments: &[Comment], identity: &AuthorIdentity) -> Vec<Comment> {
        let Some(matches) = identity.matcher() else {
            return comments.to_vec();
        };

        let by_id: HashMap<&str, &Comment> = comments
            .iter()
            .rev()
            .map(|c| (c.id.as_str(), c))
            .collect();

        let mut result: Vec<Comment> = Vec::new();
        let mut selected: HashSet<&str> = HashSet::new();

        for comment in comments.iter().filter(|c| matches(c)) {
            let position = if selected.insert(comment.id.as_str()) {
                result.push(comment.clone());
                result.len() - 1
            } else {
                match result.iter().position(|c| c.id == comment.id) {
                    Some(position) => position,
                    None => continue,
                }
            };

            let parent = comment.parent_id().and_then(|id| by_id.get(id));
            if let Some(parent) = parent {
                if selected.insert(parent.id.as_str()) {
                    result.insert(position, (*parent).clone());
                }
            }
        }

        result
    }
}

/// Date window presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePreset {
    #[default]
    All,
    Day,
    Week,
    Month,
    Year,
    Custom,
}

impl DatePreset {
    fn window(&self) -> Option<Duration> {
        match self {
            Self::All | Self::Custom => None,
            Self::Day => Some(Duration::days(1)),
            Self::Week => Some(Duration::weeks(1)),
            Self::Month => Some(Duration::days(30)),
            Self::Year => Some(Duration::days(365)),
        }
    }
}

impl FromStr for DatePreset {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "custom" => Ok(Self::Custom),
            other => Err(DownloadError::ParseError(format!("unknown date preset: {}", other))),
        }
    }
}

/// Keeps comments whose estimated publish time falls in a window
#[derive(Debug, Clone, Default)]
pub struct DateFilter {
    pub preset: DatePreset,
    pub after: Option<OffsetDateTime>,
    pub before: Option<OffsetDateTime>,
}

impl DateFilter {
    pub fn preset(preset: DatePreset) -> Self {
        Self {
            preset,
            ..Self::default()
        }
    }

    pub fn custom(after: Option<OffsetDateTime>, before: Option<OffsetDateTime>) -> Self {
        Self {
            preset: DatePreset::Custom,
            after,
            before,
        }
    }

    pub fn is_active(&self) -> bool {
        self.range(OffsetDateTime::now_utc()) != (None, None)
    }

    fn range(&self, now: OffsetDateTime) -> (Option<OffsetDateTime>, Option<OffsetDateTime>) {
        match self.preset {
            DatePreset::Custom => (self.after, self.before),
            preset => (preset.window().map(|window| now - window), None),
        }
    }

    /// Comments without a parseable time are dropped while a window is set
    pub fn apply(&self, comments: Vec<Comment>, now: OffsetDateTime) -> Vec<Comment> {
        let (after, before) = self.range(now);
        if after.is_none() && before.is_none() {
            return comments;
        }

        let after = after.map(OffsetDateTime::unix_timestamp);
        let before = before.map(OffsetDateTime::unix_timestamp);

        comments
            .into_iter()
            .filter(|c| match c.time_parsed {
                Some(ts) => after.map_or(true, |a| ts >= a) && before.map_or(true, |b| ts <= b),
                None => false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::comment;

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    fn name(n: &str) -> AuthorIdentity {
        AuthorIdentity::DisplayName(n.to_string())
    }

    #[test]
    fn test_parent_inserted_before_matching_reply() {
        let comments = vec![comment("a", "W", false), comment("a.1", "X", true)];

        let result = AuthorFilter::apply(&comments, &name("X"));
        assert_eq!(ids(&result), vec!["a", "a.1"]);
    }

    #[test]
    fn test_channel_id_exact_match() {
        let comments = vec![
            comment("1", "Author", false),
            comment("2", "User", false),
            comment("3", "Author", false),
        ];

        let result = AuthorFilter::apply(&comments, &AuthorIdentity::ChannelId("UCAuthor".into()));
        assert_eq!(ids(&result), vec!["1", "3"]);

        let result = AuthorFilter::apply(&comments, &AuthorIdentity::ChannelId("ucauthor".into()));
        assert!(result.is_empty());
    }

    #[test]
    fn test_display_name_case_and_at_sign() {
        let comments = vec![
            comment("1", "John Doe", false),
            comment("2", "jane smith", false),
            comment("3", "@John Doe", false),
        ];

        assert_eq!(ids(&AuthorFilter::apply(&comments, &name("john doe"))), vec!["1", "3"]);
        assert_eq!(ids(&AuthorFilter::apply(&comments, &name("JOHN DOE"))), vec!["1", "3"]);
        assert_eq!(ids(&AuthorFilter::apply(&comments, &name("@John Doe"))), vec!["1", "3"]);
        assert_eq!(ids(&AuthorFilter::apply(&comments, &name("Jane Smith"))), vec!["2"]);
    }

    #[test]
    fn test_parent_not_duplicated_when_author_matches_too() {
        let comments = vec![
            comment("a", "X", false),
            comment("a.1", "X", true),
            comment("a.2", "X", true),
        ];

        let result = AuthorFilter::apply(&comments, &name("X"));
        assert_eq!(ids(&result), vec!["a", "a.1", "a.2"]);
    }

    #[test]
    fn test_parent_shared_by_two_matching_replies() {
        let comments = vec![
            comment("a", "W", false),
            comment("b", "X", false),
            comment("a.1", "X", true),
            comment("a.2", "X", true),
        ];

        let result = AuthorFilter::apply(&comments, &name("X"));
        assert_eq!(ids(&result), vec!["b", "a", "a.1", "a.2"]);
    }

    #[test]
    fn test_missing_parent_keeps_reply_alone() {
        let comments = vec![comment("z.1", "X", true)];
        let result = AuthorFilter::apply(&comments, &name("X"));
        assert_eq!(ids(&result), vec!["z.1"]);
    }

    #[test]
    fn test_empty_identity_is_identity_function() {
        let comments = vec![comment("a", "W", false), comment("a.1", "X", true)];

        assert_eq!(AuthorFilter::apply(&comments, &AuthorIdentity::Any), comments);
        assert_eq!(AuthorFilter::apply(&comments, &AuthorIdentity::parse("")), comments);
        assert_eq!(AuthorFilter::apply(&comments, &name("  @ ")), comments);
    }

    #[test]
    fn test_idempotent() {
        let comments = vec![
            comment("a", "W", false),
            comment("a.1", "X", true),
            comment("b", "X", false),
            comment("c", "Y", false),
            comment("c.1", "X", true),
        ];

        let once = AuthorFilter::apply(&comments, &name("X"));
        let twice = AuthorFilter::apply(&once, &name("X"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_every_reply_preceded_by_parent() {
        let comments = vec![
            comment("c.1", "X", true),
            comment("a", "W", false),
            comment("b.1", "X", true),
            comment("a.1", "X", true),
            comment("c", "Y", false),
            comment("b", "Z", false),
        ];

        let result = AuthorFilter::apply(&comments, &name("X"));
        for (pos, reply) in result.iter().enumerate().filter(|(_, c)| c.is_reply) {
            let parent = reply.parent_id().unwrap();
            if comments.iter().any(|c| c.id == parent) {
                let parent_pos = result.iter().position(|c| c.id == parent).unwrap();
                assert!(parent_pos < pos, "{} must come after {}", reply.id, parent);
            }
        }
        let unique: HashSet<&str> = ids(&result).into_iter().collect();
        assert_eq!(unique.len(), result.len());
    }

    #[test]
    fn test_identity_parsing() {
        assert_eq!(AuthorIdentity::parse("  "), AuthorIdentity::Any);
        assert_eq!(
            AuthorIdentity::parse("UCuAXFkgsw1L7xaCfnd5JJOw"),
            AuthorIdentity::ChannelId("UCuAXFkgsw1L7xaCfnd5JJOw".into())
        );
        assert_eq!(
            AuthorIdentity::parse("@SomeHandle"),
            AuthorIdentity::DisplayName("@SomeHandle".into())
        );
    }

    #[test]
    fn test_date_filter_presets() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut recent = comment("recent", "U", false);
        recent.time_parsed = Some((now - Duration::hours(3)).unix_timestamp());
        let mut old = comment("old", "U", false);
        old.time_parsed = Some((now - Duration::days(40)).unix_timestamp());
        let unknown = comment("unknown", "U", false);
        let comments = vec![recent, old, unknown];

        assert_eq!(DateFilter::default().apply(comments.clone(), now).len(), 3);
        assert_eq!(
            ids(&DateFilter::preset(DatePreset::Day).apply(comments.clone(), now)),
            vec!["recent"]
        );
        assert_eq!(
            ids(&DateFilter::preset(DatePreset::Year).apply(comments.clone(), now)),
            vec!["recent", "old"]
        );
        assert_eq!(
            ids(&DateFilter::custom(None, Some(now - Duration::days(1))).apply(comments, now)),
            vec!["old"]
        );
    }

    #[test]
    fn test_date_preset_parsing() {
        assert_eq!("Week".parse::<DatePreset>().unwrap(), DatePreset::Week);
        assert!("fortnight".parse::<DatePreset>().is_err());
        assert!(!DateFilter::default().is_active());
        assert!(DateFilter::preset(DatePreset::Month).is_active());
    }
}
