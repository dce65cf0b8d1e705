//! Selection strategies: turn a task into a fetch plan.
//!
//! Each task variant resolves to a [`Plan`] — which indices to examine, in
//! what order, when to stop, and which post-hoc filter decides membership.
//! Resolution itself only spends cheap remote calls (`latest_index`, the
//! native search, and the locator's sparse probes); all article fetching
//! happens when the assembler executes the plan.
//!
//! Candidate sources per variant:
//!
//! | variant | candidates | stop |
//! |---|---|---|
//! | `get_articles` | window bracket, else last `count` indices | exhausted |
//! | `search_title` / `search_author` | native search, intersected with the bracket when a window is set | exhausted |
//! | `search_comment` / `search_comments_by_author` | window bracket, else backward scan from newest | exhausted / `count` matches |
//! | `get_article` | the single index | exhausted |
//! | `get_articles_by_date` | backward scan from newest | scan passed `start_date` |
//!
//! The comment variants cannot use native search at all — the remote
//! cannot see into comment bodies — which is what makes them the slow,
//! custom paths.

use chrono::{NaiveDate, NaiveTime};
use tracing::{info, instrument};

use crate::board::{RemoteBoard, SearchMode};
use crate::config::{Task, TaskKind};
use crate::error::TaskError;
use crate::locator::{self, SearchWindow};
use crate::utils::{parse_clock, parse_date};

/// The index sequence a plan examines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// A known, finite index set (fetched in ascending order).
    Fixed(Vec<u32>),
    /// Scan backward from `from` down to index 1, newest first, relying on
    /// the stop rule to terminate early.
    BackwardScan { from: u32 },
}

/// When plan execution stops early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRule {
    /// Run through every candidate.
    Exhausted,
    /// Stop once this many articles matched the filter.
    AfterMatches(usize),
    /// Stop once the scan has moved past this calendar date (two
    /// consecutive older articles, tolerating one out-of-order post).
    PastDate(NaiveDate),
}

/// Predicate over an article's comment thread. Always re-validated against
/// the freshly fetched article — candidates are never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentPredicate {
    ContentContains(String),
    AuthoredBy(String),
}

/// A clock window `[start, end)` pinned to one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWindow {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Post-hoc membership filter applied to every fetched article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub clock: Option<ClockWindow>,
    /// Inclusive calendar-date bounds.
    pub dates: Option<(NaiveDate, NaiveDate)>,
    pub comment: Option<CommentPredicate>,
}

/// A resolved task: candidates, stop rule, and membership filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub candidates: Candidates,
    pub stop: StopRule,
    pub filter: ArticleFilter,
}

impl Plan {
    fn empty() -> Self {
        Plan {
            candidates: Candidates::Fixed(Vec::new()),
            stop: StopRule::Exhausted,
            filter: ArticleFilter::default(),
        }
    }

    fn fixed(indices: Vec<u32>, filter: ArticleFilter) -> Self {
        Plan {
            candidates: Candidates::Fixed(indices),
            stop: StopRule::Exhausted,
            filter,
        }
    }
}

/// Parse the optional clock window off a task. Both bounds or neither;
/// `end` must be after `start` (windows never span midnight).
fn checked_window(
    start_time: &Option<String>,
    end_time: &Option<String>,
) -> Result<Option<(NaiveTime, NaiveTime)>, TaskError> {
    match (start_time, end_time) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) => {
            let start = parse_clock(s)
                .ok_or_else(|| TaskError::InvalidConfig(format!("bad start_time {s:?}")))?;
            let end = parse_clock(e)
                .ok_or_else(|| TaskError::InvalidConfig(format!("bad end_time {e:?}")))?;
            if end <= start {
                return Err(TaskError::InvalidConfig(format!(
                    "end_time {e} must be after start_time {s}"
                )));
            }
            Ok(Some((start, end)))
        }
        _ => Err(TaskError::InvalidConfig(
            "start_time and end_time must be given together".to_string(),
        )),
    }
}

fn clock_filter(today: NaiveDate, window: (NaiveTime, NaiveTime)) -> ArticleFilter {
    ArticleFilter {
        clock: Some(ClockWindow {
            date: today,
            start: window.0,
            end: window.1,
        }),
        ..ArticleFilter::default()
    }
}

/// Bracket a clock window, or `None` when nothing can match.
async fn bracket<B: RemoteBoard>(
    board: &mut B,
    name: &str,
    today: NaiveDate,
    window: (NaiveTime, NaiveTime),
) -> Result<Option<SearchWindow>, TaskError> {
    Ok(locator::locate(board, name, today, window.0, window.1).await?)
}

/// Resolve `task` into a [`Plan`].
///
/// `today` pins clock windows to a calendar date; production passes the
/// current local date, tests pass a fixed one.
#[instrument(level = "info", skip(board, task), fields(board = %task.board, kind = task.kind_name()))]
pub async fn resolve<B: RemoteBoard>(
    board: &mut B,
    task: &Task,
    today: NaiveDate,
) -> Result<Plan, TaskError> {
    let name = task.board.as_str();
    let plan = match &task.kind {
        TaskKind::GetArticles {
            count,
            start_time,
            end_time,
        } => match checked_window(start_time, end_time)? {
            Some(window) => match bracket(board, name, today, window).await? {
                Some(w) => Plan::fixed((w.lo..=w.hi).collect(), clock_filter(today, window)),
                None => Plan::empty(),
            },
            None => {
                let latest = board.latest_index(name).await?;
                if latest == 0 || *count == 0 {
                    Plan::empty()
                } else {
                    let first = latest.saturating_sub(*count as u32 - 1).max(1);
                    Plan::fixed((first..=latest).collect(), ArticleFilter::default())
                }
            }
        },

        TaskKind::SearchTitle {
            keyword,
            count,
            start_time,
            end_time,
        } => {
            resolve_native(
                board,
                name,
                today,
                SearchMode::Title,
                keyword,
                *count,
                checked_window(start_time, end_time)?,
            )
            .await?
        }

        TaskKind::SearchAuthor {
            author,
            count,
            start_time,
            end_time,
        } => {
            resolve_native(
                board,
                name,
                today,
                SearchMode::Author,
                author,
                *count,
                checked_window(start_time, end_time)?,
            )
            .await?
        }

        TaskKind::SearchComment {
            keyword,
            count,
            start_time,
            end_time,
        } => {
            resolve_comment_scan(
                board,
                name,
                today,
                CommentPredicate::ContentContains(keyword.clone()),
                *count,
                checked_window(start_time, end_time)?,
            )
            .await?
        }

        TaskKind::SearchCommentsByAuthor {
            author,
            count,
            start_time,
            end_time,
        } => {
            resolve_comment_scan(
                board,
                name,
                today,
                CommentPredicate::AuthoredBy(author.clone()),
                *count,
                checked_window(start_time, end_time)?,
            )
            .await?
        }

        TaskKind::GetArticle { index } => {
            if *index == 0 {
                return Err(TaskError::InvalidConfig(
                    "article index must be positive".to_string(),
                ));
            }
            Plan::fixed(vec![*index], ArticleFilter::default())
        }

        TaskKind::GetArticlesByDate {
            start_date,
            end_date,
        } => {
            let start = parse_date(start_date)
                .ok_or_else(|| TaskError::InvalidConfig(format!("bad start_date {start_date:?}")))?;
            let end = parse_date(end_date)
                .ok_or_else(|| TaskError::InvalidConfig(format!("bad end_date {end_date:?}")))?;
            if end < start {
                return Err(TaskError::InvalidConfig(format!(
                    "end_date {end_date} precedes start_date {start_date}"
                )));
            }
            let latest = board.latest_index(name).await?;
            if latest == 0 {
                Plan::empty()
            } else {
                Plan {
                    candidates: Candidates::BackwardScan { from: latest },
                    stop: StopRule::PastDate(start),
                    filter: ArticleFilter {
                        dates: Some((start, end)),
                        ..ArticleFilter::default()
                    },
                }
            }
        }
    };

    info!(?plan.stop, "resolved plan");
    Ok(plan)
}

/// Title/author search: candidates come from the remote's native search;
/// a clock window intersects them with the locator bracket.
async fn resolve_native<B: RemoteBoard>(
    board: &mut B,
    name: &str,
    today: NaiveDate,
    mode: SearchMode,
    query: &str,
    count: usize,
    window: Option<(NaiveTime, NaiveTime)>,
) -> Result<Plan, TaskError> {
    match window {
        Some(window) => {
            let Some(w) = bracket(board, name, today, window).await? else {
                return Ok(Plan::empty());
            };
            let hits = board.native_search(name, mode, query, None).await?;
            let in_bracket: Vec<u32> = hits.into_iter().filter(|i| w.contains(*i)).collect();
            Ok(Plan::fixed(in_bracket, clock_filter(today, window)))
        }
        None => {
            // The contract pins native results ascending, so the newest
            // `count` matches are the tail.
            let mut hits = board.native_search(name, mode, query, Some(count)).await?;
            if hits.len() > count {
                hits = hits.split_off(hits.len() - count);
            }
            Ok(Plan::fixed(hits, ArticleFilter::default()))
        }
    }
}

/// Comment scans: no native help, so either refine the locator bracket or
/// walk backward from the newest article until `count` matches accumulate.
async fn resolve_comment_scan<B: RemoteBoard>(
    board: &mut B,
    name: &str,
    today: NaiveDate,
    predicate: CommentPredicate,
    count: usize,
    window: Option<(NaiveTime, NaiveTime)>,
) -> Result<Plan, TaskError> {
    match window {
        Some(window) => {
            let Some(w) = bracket(board, name, today, window).await? else {
                return Ok(Plan::empty());
            };
            let mut filter = clock_filter(today, window);
            filter.comment = Some(predicate);
            Ok(Plan::fixed((w.lo..=w.hi).collect(), filter))
        }
        None => {
            let latest = board.latest_index(name).await?;
            if latest == 0 {
                return Ok(Plan::empty());
            }
            Ok(Plan {
                candidates: Candidates::BackwardScan { from: latest },
                stop: StopRule::AfterMatches(count),
                filter: ArticleFilter {
                    comment: Some(predicate),
                    ..ArticleFilter::default()
                },
            })
        }
    }
}
