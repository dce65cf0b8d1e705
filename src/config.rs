//! Task configuration and credential loading.
//!
//! A crawl run is described by one JSON file:
//!
//! ```json
//! {
//!   "tasks": [
//!     { "type": "get_articles", "board": "Gossiping", "count": 10,
//!       "output": "out/latest.json" },
//!     { "type": "search_comment", "board": "Gossiping", "keyword": "推",
//!       "start_time": "21:00", "end_time": "22:00",
//!       "output": "out/pushed.json" }
//!   ],
//!   "options": { "delay_between_requests": 0.5 }
//! }
//! ```
//!
//! Tasks are decoded one at a time so a single malformed entry (unknown
//! `type`, missing field) fails that task alone; the rest of the batch
//! still runs. Credentials live in a separate JSON file
//! (`{"account": ..., "password": ...}`) and never appear in the task file.

use serde::Deserialize;
use std::error::Error;
use std::time::Duration;
use tracing::info;

use crate::error::TaskError;

/// Login material for transports that need it.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

/// Load credentials from a JSON file.
pub fn load_credentials(path: &str) -> Result<Credentials, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    let creds: Credentials = serde_json::from_str(&raw)?;
    info!(account = %creds.account, "Loaded credentials");
    Ok(creds)
}

/// One task from the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    /// Board the task runs against.
    pub board: String,
    /// Result sink path. Tasks without one only log their result count.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(flatten)]
    pub kind: TaskKind,
}

/// The task variants, tagged by `type` in the config file.
///
/// `count` is fallback-only: when a task carries both a time window and a
/// `count`, the window wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Most recent `count` articles, or everything inside the clock window.
    GetArticles {
        #[serde(default = "default_fetch_count")]
        count: usize,
        #[serde(default)]
        start_time: Option<String>,
        #[serde(default)]
        end_time: Option<String>,
    },
    /// Native title search.
    SearchTitle {
        keyword: String,
        #[serde(default = "default_fetch_count")]
        count: usize,
        #[serde(default)]
        start_time: Option<String>,
        #[serde(default)]
        end_time: Option<String>,
    },
    /// Native author search.
    SearchAuthor {
        author: String,
        #[serde(default = "default_fetch_count")]
        count: usize,
        #[serde(default)]
        start_time: Option<String>,
        #[serde(default)]
        end_time: Option<String>,
    },
    /// Articles with a keyword somewhere in the comment thread. The remote
    /// cannot search comment bodies, so this is the slow custom scan.
    SearchComment {
        keyword: String,
        #[serde(default = "default_comment_scan_count")]
        count: usize,
        #[serde(default)]
        start_time: Option<String>,
        #[serde(default)]
        end_time: Option<String>,
    },
    /// Articles a given account has commented on. Slow custom scan as well.
    SearchCommentsByAuthor {
        author: String,
        #[serde(default = "default_comment_author_scan_count")]
        count: usize,
        #[serde(default)]
        start_time: Option<String>,
        #[serde(default)]
        end_time: Option<String>,
    },
    /// A single article by index.
    GetArticle { index: u32 },
    /// Articles whose calendar date falls in `[start_date, end_date]`.
    GetArticlesByDate {
        start_date: String,
        end_date: String,
    },
}

fn default_fetch_count() -> usize {
    10
}
fn default_comment_scan_count() -> usize {
    50
}
fn default_comment_author_scan_count() -> usize {
    100
}

impl Task {
    /// The config-file tag for this task, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            TaskKind::GetArticles { .. } => "get_articles",
            TaskKind::SearchTitle { .. } => "search_title",
            TaskKind::SearchAuthor { .. } => "search_author",
            TaskKind::SearchComment { .. } => "search_comment",
            TaskKind::SearchCommentsByAuthor { .. } => "search_comments_by_author",
            TaskKind::GetArticle { .. } => "get_article",
            TaskKind::GetArticlesByDate { .. } => "get_articles_by_date",
        }
    }
}

/// Global crawl options.
#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Seconds to wait before every remote call. Politeness policy, not a
    /// tunable to race: the remote rate-limits aggressive sessions.
    #[serde(default = "default_delay")]
    pub delay_between_requests: f64,
}

fn default_delay() -> f64 {
    0.5
}

impl Default for Options {
    fn default() -> Self {
        Options {
            delay_between_requests: default_delay(),
        }
    }
}

impl Options {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_between_requests.max(0.0))
    }
}

/// A parsed config file: per-task parse results plus global options.
#[derive(Debug)]
pub struct CrawlConfig {
    pub tasks: Vec<Result<Task, TaskError>>,
    pub options: Options,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    tasks: Vec<serde_json::Value>,
    #[serde(default)]
    options: Options,
}

/// Load the task file. The file itself must be valid JSON with the
/// `tasks`/`options` shape; individual task entries are allowed to fail.
pub fn load_config(path: &str) -> Result<CrawlConfig, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)?;
    parse_config(&raw)
}

fn parse_config(raw: &str) -> Result<CrawlConfig, Box<dyn Error>> {
    let raw: RawConfig = serde_json::from_str(raw)?;
    let tasks = raw
        .tasks
        .into_iter()
        .map(|value| {
            serde_json::from_value::<Task>(value.clone())
                .map_err(|e| TaskError::InvalidConfig(format!("{e} in task {value}")))
        })
        .collect::<Vec<_>>();
    info!(
        tasks = tasks.len(),
        delay_secs = raw.options.delay_between_requests,
        "Loaded task configuration"
    );
    Ok(CrawlConfig {
        tasks,
        options: raw.options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let cfg = parse_config(
            r#"{
                "tasks": [
                    {"type": "get_articles", "board": "Gossiping", "count": 5,
                     "output": "out/a.json"},
                    {"type": "search_title", "board": "Stock", "keyword": "台積電"},
                    {"type": "search_comment", "board": "Gossiping", "keyword": "推",
                     "start_time": "21:00", "end_time": "22:00"},
                    {"type": "get_article", "board": "Gossiping", "index": 12345},
                    {"type": "get_articles_by_date", "board": "Gossiping",
                     "start_date": "2025-10-01", "end_date": "2025-10-04"}
                ],
                "options": {"delay_between_requests": 1.5}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.tasks.len(), 5);
        assert!(cfg.tasks.iter().all(|t| t.is_ok()));
        assert_eq!(cfg.options.delay(), Duration::from_secs_f64(1.5));

        let first = cfg.tasks[0].as_ref().unwrap();
        assert_eq!(first.board, "Gossiping");
        assert_eq!(first.output.as_deref(), Some("out/a.json"));
        match first.kind {
            TaskKind::GetArticles { count, .. } => assert_eq!(count, 5),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_count_defaults_per_kind() {
        let cfg = parse_config(
            r#"{"tasks": [
                {"type": "get_articles", "board": "b"},
                {"type": "search_comment", "board": "b", "keyword": "k"},
                {"type": "search_comments_by_author", "board": "b", "author": "a"}
            ]}"#,
        )
        .unwrap();

        let counts: Vec<usize> = cfg
            .tasks
            .iter()
            .map(|t| match t.as_ref().unwrap().kind {
                TaskKind::GetArticles { count, .. } => count,
                TaskKind::SearchComment { count, .. } => count,
                TaskKind::SearchCommentsByAuthor { count, .. } => count,
                _ => panic!("wrong variant"),
            })
            .collect();
        assert_eq!(counts, vec![10, 50, 100]);
    }

    #[test]
    fn test_unknown_type_fails_only_that_task() {
        let cfg = parse_config(
            r#"{"tasks": [
                {"type": "mine_bitcoin", "board": "b"},
                {"type": "get_articles", "board": "b"}
            ]}"#,
        )
        .unwrap();

        assert!(matches!(cfg.tasks[0], Err(TaskError::InvalidConfig(_))));
        assert!(cfg.tasks[1].is_ok());
    }

    #[test]
    fn test_missing_required_field_fails_only_that_task() {
        let cfg = parse_config(
            r#"{"tasks": [
                {"type": "search_title", "board": "b"},
                {"type": "get_article", "board": "b", "index": 1}
            ]}"#,
        )
        .unwrap();

        assert!(cfg.tasks[0].is_err());
        assert!(cfg.tasks[1].is_ok());
    }

    #[test]
    fn test_options_default_when_absent() {
        let cfg = parse_config(r#"{"tasks": []}"#).unwrap();
        assert_eq!(cfg.options.delay(), Duration::from_secs_f64(0.5));
    }

    #[test]
    fn test_negative_delay_clamps_to_zero() {
        let opts = Options {
            delay_between_requests: -1.0,
        };
        assert_eq!(opts.delay(), Duration::ZERO);
    }

    #[test]
    fn test_credentials_shape() {
        let creds: Credentials =
            serde_json::from_str(r#"{"account": "cooluser", "password": "hunter2"}"#).unwrap();
        assert_eq!(creds.account, "cooluser");
        assert_eq!(creds.password, "hunter2");
    }
}
