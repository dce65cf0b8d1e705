//! Data model for crawled articles and their comment threads.
//!
//! This module defines the records the crawler materializes:
//! - [`Article`]: one post, with metadata, body, and comment thread
//! - [`Comment`]: one push/boo/arrow entry under an article
//! - [`CommentKind`]: the three comment markers the service supports
//!
//! Serialization is schema-stable: every field is always present in the
//! output, and an absent `ip` serializes as `null` rather than being
//! omitted, so downstream consumers never have to probe for keys.

use serde::{Deserialize, Serialize};

use crate::utils::parse_remote_timestamp;

/// One article as fetched from the remote board.
///
/// `index` is the board-local ordinal: positive, monotonically increasing
/// with posting time (with rare out-of-order anomalies that the search
/// logic tolerates), and stable once assigned. `aid` is the remote's
/// content hash for the post and survives board reorganizations; `index`
/// does not survive deletions below it going unnoticed, which is why the
/// two are both kept.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Article {
    /// Board the article lives on.
    pub board: String,
    /// Remote-assigned article id (content hash), e.g. `M.1759583808.A.1B2`.
    pub aid: String,
    /// Board-local ordinal of the article.
    pub index: u32,
    /// Author in the remote's `account (display-name)` form.
    pub author: String,
    /// Article title, including any reply/forward markers.
    pub title: String,
    /// Posting timestamp exactly as the remote renders it,
    /// e.g. `Sat Oct  4 21:16:48 2025`. Parse via [`Article::posted_at`].
    pub date: String,
    /// Article body with header and comment lines stripped.
    pub content: String,
    /// Posting IP when the remote exposes it.
    pub ip: Option<String>,
    /// Comment thread in remote-assigned order.
    pub comments: Vec<Comment>,
}

impl Article {
    /// Posting time parsed out of the free-form `date` field.
    ///
    /// `None` means the remote handed back something unparseable; such
    /// articles never match a time or date window.
    pub fn posted_at(&self) -> Option<chrono::NaiveDateTime> {
        parse_remote_timestamp(&self.date)
    }

    /// Whether any comment's content contains `keyword`, case-insensitively.
    pub fn has_comment_containing(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        self.comments
            .iter()
            .any(|c| c.content.to_lowercase().contains(&needle))
    }

    /// Whether `author` left at least one comment, case-insensitively.
    pub fn has_comment_by(&self, author: &str) -> bool {
        self.comments
            .iter()
            .any(|c| c.author.eq_ignore_ascii_case(author))
    }
}

/// One comment under an article.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Comment {
    /// Push, boo, or neutral arrow.
    #[serde(rename = "type")]
    pub kind: CommentKind,
    /// Commenting account.
    pub author: String,
    /// Comment text.
    pub content: String,
    /// Remote-local `MM/DD HH:MM` stamp, no year. Kept verbatim; comments
    /// carry no ordering guarantee beyond remote-assigned order.
    pub time: String,
}

/// The three comment markers the service renders as 推 / 噓 / →.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Push,
    Boo,
    Arrow,
}

impl CommentKind {
    /// Map the rendered marker glyph to a kind. Unknown markers fall back
    /// to [`CommentKind::Arrow`], matching how the service renders edits.
    pub fn from_marker(marker: &str) -> Self {
        match marker.trim() {
            "推" => CommentKind::Push,
            "噓" => CommentKind::Boo,
            _ => CommentKind::Arrow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> Article {
        Article {
            board: "Gossiping".to_string(),
            aid: "M.1759583808.A.1B2".to_string(),
            index: 7,
            author: "someuser (Some User)".to_string(),
            title: "[問卦] test".to_string(),
            date: "Sat Oct  4 21:16:48 2025".to_string(),
            content: "body".to_string(),
            ip: None,
            comments: vec![
                Comment {
                    kind: CommentKind::Push,
                    author: "fanone".to_string(),
                    content: "推 好文".to_string(),
                    time: "10/04 21:20".to_string(),
                },
                Comment {
                    kind: CommentKind::Boo,
                    author: "hater".to_string(),
                    content: "噓".to_string(),
                    time: "10/04 21:21".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_posted_at_parses_remote_format() {
        let article = sample_article();
        let dt = article.posted_at().unwrap();
        assert_eq!(
            dt,
            chrono::NaiveDate::from_ymd_opt(2025, 10, 4)
                .unwrap()
                .and_hms_opt(21, 16, 48)
                .unwrap()
        );
    }

    #[test]
    fn test_posted_at_unparseable_is_none() {
        let mut article = sample_article();
        article.date = "???".to_string();
        assert!(article.posted_at().is_none());
    }

    #[test]
    fn test_has_comment_containing_is_case_insensitive() {
        let mut article = sample_article();
        article.comments[0].content = "GG easy".to_string();
        assert!(article.has_comment_containing("gg"));
        assert!(!article.has_comment_containing("missing"));
    }

    #[test]
    fn test_has_comment_containing_cjk() {
        let article = sample_article();
        assert!(article.has_comment_containing("推"));
    }

    #[test]
    fn test_has_comment_by() {
        let article = sample_article();
        assert!(article.has_comment_by("FanOne"));
        assert!(!article.has_comment_by("nobody"));
    }

    #[test]
    fn test_missing_ip_serializes_as_null() {
        let article = sample_article();
        let json = serde_json::to_value(&article).unwrap();
        assert!(json.get("ip").is_some());
        assert!(json["ip"].is_null());
    }

    #[test]
    fn test_comment_kind_field_name_and_casing() {
        let article = sample_article();
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["comments"][0]["type"], "push");
        assert_eq!(json["comments"][1]["type"], "boo");
    }

    #[test]
    fn test_comment_kind_from_marker() {
        assert_eq!(CommentKind::from_marker("推"), CommentKind::Push);
        assert_eq!(CommentKind::from_marker("噓 "), CommentKind::Boo);
        assert_eq!(CommentKind::from_marker("→"), CommentKind::Arrow);
        assert_eq!(CommentKind::from_marker("?"), CommentKind::Arrow);
    }

    #[test]
    fn test_article_round_trip() {
        let article = sample_article();
        let json = serde_json::to_string(&article).unwrap();
        let back: Article = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, article.index);
        assert_eq!(back.comments.len(), 2);
        assert_eq!(back.comments[0].kind, CommentKind::Push);
    }
}
