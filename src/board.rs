//! The remote-board session contract and request pacing.
//!
//! # Architecture
//!
//! The module uses a trait-based design so the engine never touches a
//! concrete transport:
//! - [`RemoteBoard`]: the three operations the engine needs from a logged-in
//!   session, modeled as an explicitly passed capability object
//! - [`PacedBoard`]: decorator that adds the politeness delay and transient
//!   retry to any `RemoteBoard` implementation
//! - `fixture` (test builds): an in-memory board for exercising the engine
//!   offline
//!
//! # Pacing & retry strategy
//!
//! A single session issues one request at a time. Before every remote call
//! the configured delay is slept, plus 0–250 ms of jitter so long crawls
//! don't hit the remote on a metronome. A call that fails transiently is
//! retried up to 3 attempts total, each attempt paying the same delay;
//! after that the error surfaces and the caller skips the candidate.
//! `NotFound` and `Auth` are never retried.

use rand::{Rng, rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::BoardError;
use crate::models::Article;

/// Which native search the remote runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Title keyword search (the service's `/` search).
    Title,
    /// Author search (the service's `a` search).
    Author,
}

/// One authenticated session against the remote board service.
///
/// Methods take `&mut self`: a session is process-wide mutable state and
/// requests on it never overlap.
///
/// Contract, uniform across implementations:
/// - `latest_index` returns the highest article index currently on the
///   board (indices start at 1);
/// - `fetch_article` returns the full article including its comment
///   thread, or `NotFound` for deleted/absent indices;
/// - `native_search` returns matching article indices in **ascending
///   order**; `limit`, when given, caps the result to the newest `limit`
///   matches. Results are candidates only — callers re-validate against
///   the fetched article.
pub trait RemoteBoard {
    async fn latest_index(&mut self, board: &str) -> Result<u32, BoardError>;

    async fn fetch_article(&mut self, board: &str, index: u32) -> Result<Article, BoardError>;

    async fn native_search(
        &mut self,
        board: &str,
        mode: SearchMode,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<u32>, BoardError>;
}

/// Decorator that adds the inter-request delay and transient retry to any
/// [`RemoteBoard`] implementation.
///
/// The engine only ever talks to the remote through one of these; wrapping
/// happens once, right after connect.
pub struct PacedBoard<B> {
    inner: B,
    delay: Duration,
    max_attempts: usize,
}

/// Total attempts per call, first try included.
const MAX_ATTEMPTS: usize = 3;

impl<B: RemoteBoard> PacedBoard<B> {
    pub fn new(inner: B, delay: Duration) -> Self {
        PacedBoard {
            inner,
            delay,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Sleep the politeness delay plus jitter. A zero delay skips the pause
    /// entirely (fixture runs).
    async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        sleep(self.delay + Duration::from_millis(jitter_ms)).await;
    }
}

impl<B: RemoteBoard> RemoteBoard for PacedBoard<B> {
    async fn latest_index(&mut self, board: &str) -> Result<u32, BoardError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            self.pause().await;
            match self.inner.latest_index(board).await {
                Ok(idx) => return Ok(idx),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(board, attempt, max = self.max_attempts, error = %e,
                        "latest_index failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_article(&mut self, board: &str, index: u32) -> Result<Article, BoardError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            self.pause().await;
            match self.inner.fetch_article(board, index).await {
                Ok(article) => return Ok(article),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(board, index, attempt, max = self.max_attempts, error = %e,
                        "fetch_article failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn native_search(
        &mut self,
        board: &str,
        mode: SearchMode,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<u32>, BoardError> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            self.pause().await;
            match self.inner.native_search(board, mode, query, limit).await {
                Ok(indices) => return Ok(indices),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(board, ?mode, query, attempt, max = self.max_attempts, error = %e,
                        "native_search failed; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! In-memory board with failure injection, for engine tests.

    use std::collections::{BTreeMap, HashMap};

    use super::{RemoteBoard, SearchMode};
    use crate::error::BoardError;
    use crate::models::{Article, Comment, CommentKind};

    #[derive(Default)]
    pub struct FixtureBoard {
        boards: HashMap<String, BTreeMap<u32, Article>>,
        /// Remaining transient failures to inject, per (board, index).
        flaky: HashMap<(String, u32), u32>,
        /// When set, every operation fails with `Auth` (expired session).
        dead: bool,
        /// Remote calls issued so far, for cost assertions.
        pub calls: usize,
    }

    impl FixtureBoard {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, article: Article) {
            self.boards
                .entry(article.board.clone())
                .or_default()
                .insert(article.index, article);
        }

        pub fn with_articles(articles: Vec<Article>) -> Self {
            let mut board = Self::new();
            for article in articles {
                board.insert(article);
            }
            board
        }

        /// Make the next `times` fetches of `(board, index)` fail transiently.
        pub fn fail_transient(&mut self, board: &str, index: u32, times: u32) {
            self.flaky.insert((board.to_string(), index), times);
        }

        /// Expire the session: every subsequent operation fails with `Auth`.
        pub fn kill_session(&mut self) {
            self.dead = true;
        }

        fn check_session(&self) -> Result<(), BoardError> {
            if self.dead {
                Err(BoardError::Auth {
                    reason: "session expired".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn io_timeout() -> BoardError {
            BoardError::transient(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "injected timeout",
            ))
        }
    }

    impl RemoteBoard for FixtureBoard {
        async fn latest_index(&mut self, board: &str) -> Result<u32, BoardError> {
            self.calls += 1;
            self.check_session()?;
            Ok(self
                .boards
                .get(board)
                .and_then(|b| b.keys().next_back().copied())
                .unwrap_or(0))
        }

        async fn fetch_article(&mut self, board: &str, index: u32) -> Result<Article, BoardError> {
            self.calls += 1;
            self.check_session()?;
            let key = (board.to_string(), index);
            if let Some(remaining) = self.flaky.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Self::io_timeout());
                }
            }
            self.boards
                .get(board)
                .and_then(|b| b.get(&index))
                .cloned()
                .ok_or_else(|| BoardError::NotFound {
                    board: board.to_string(),
                    index,
                })
        }

        async fn native_search(
            &mut self,
            board: &str,
            mode: SearchMode,
            query: &str,
            limit: Option<usize>,
        ) -> Result<Vec<u32>, BoardError> {
            self.calls += 1;
            self.check_session()?;
            let needle = query.to_lowercase();
            let mut hits: Vec<u32> = self
                .boards
                .get(board)
                .map(|b| {
                    b.values()
                        .filter(|a| match mode {
                            SearchMode::Title => a.title.to_lowercase().contains(&needle),
                            SearchMode::Author => a
                                .author
                                .split_whitespace()
                                .next()
                                .is_some_and(|acct| acct.eq_ignore_ascii_case(query)),
                        })
                        .map(|a| a.index)
                        .collect()
                })
                .unwrap_or_default();
            hits.sort_unstable();
            if let Some(limit) = limit {
                if hits.len() > limit {
                    hits = hits.split_off(hits.len() - limit);
                }
            }
            Ok(hits)
        }
    }

    /// Build a bare article for fixtures. `date` uses the remote's
    /// ctime-style format, e.g. `"Sat Oct  4 21:16:48 2025"`.
    pub fn article(board: &str, index: u32, date: &str, author: &str, title: &str) -> Article {
        Article {
            board: board.to_string(),
            aid: format!("M.{index}.A.000"),
            index,
            author: format!("{author} ({author})"),
            title: title.to_string(),
            date: date.to_string(),
            content: format!("content of {title}"),
            ip: Some("127.0.0.1".to_string()),
            comments: Vec::new(),
        }
    }

    pub fn comment(author: &str, content: &str) -> Comment {
        Comment {
            kind: CommentKind::Push,
            author: author.to_string(),
            content: content.to_string(),
            time: "10/04 21:30".to_string(),
        }
    }
}
