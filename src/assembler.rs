//! Plan execution: fetch candidates, filter, order.
//!
//! The assembler owns every article fetch in the system. Candidates are
//! deduplicated first (strategies may hand in the same index twice at
//! bracket boundaries), each fetch goes through the paced board, and the
//! plan's filter is evaluated against the article that actually came back
//! — native search results and locator brackets are untrusted candidates,
//! never final answers. A missing article is skipped, an article whose
//! transient retries ran out is skipped, and the result set always comes
//! out ascending by index no matter which direction the scan walked.

use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

use crate::board::RemoteBoard;
use crate::error::{BoardError, TaskError};
use crate::models::Article;
use crate::strategy::{ArticleFilter, Candidates, CommentPredicate, Plan, StopRule};

/// Consecutive pre-window articles a date scan sees before concluding the
/// window is truly behind it. One lone out-of-order post must not end the
/// scan.
const DATE_SCAN_PATIENCE: u32 = 2;

/// Whether a fetched article belongs in the result set.
fn matches_filter(article: &Article, filter: &ArticleFilter) -> bool {
    if filter.clock.is_some() || filter.dates.is_some() {
        let Some(dt) = article.posted_at() else {
            return false;
        };
        if let Some(w) = &filter.clock {
            if dt.date() != w.date || dt.time() < w.start || dt.time() >= w.end {
                return false;
            }
        }
        if let Some((lo, hi)) = &filter.dates {
            if dt.date() < *lo || dt.date() > *hi {
                return false;
            }
        }
    }
    match &filter.comment {
        Some(CommentPredicate::ContentContains(keyword)) => article.has_comment_containing(keyword),
        Some(CommentPredicate::AuthoredBy(author)) => article.has_comment_by(author),
        None => true,
    }
}

/// Execute `plan` against `name`, returning matching articles ascending by
/// index.
#[instrument(level = "info", skip(board, plan), fields(board = %name))]
pub async fn assemble<B: RemoteBoard>(
    board: &mut B,
    name: &str,
    plan: &Plan,
) -> Result<Vec<Article>, TaskError> {
    let order: Vec<u32> = match &plan.candidates {
        Candidates::Fixed(indices) => {
            let mut list: Vec<u32> = indices.iter().copied().unique().collect();
            list.sort_unstable();
            list
        }
        Candidates::BackwardScan { from } => (1..=*from).rev().collect(),
    };

    if let StopRule::AfterMatches(0) = plan.stop {
        return Ok(Vec::new());
    }

    let mut matched: Vec<Article> = Vec::new();
    let mut examined = 0usize;
    let mut older_streak = 0u32;

    for index in order {
        let article = match board.fetch_article(name, index).await {
            Ok(article) => article,
            Err(e @ BoardError::Auth { .. }) => return Err(e.into()),
            Err(BoardError::NotFound { .. }) => {
                debug!(index, "article gone; skipping");
                continue;
            }
            Err(e) => {
                warn!(index, error = %e, "fetch failed after retries; skipping");
                continue;
            }
        };
        examined += 1;

        // Date scans terminate once the board is clearly behind the window.
        if let StopRule::PastDate(start) = plan.stop {
            match article.posted_at() {
                Some(dt) if dt.date() < start => {
                    older_streak += 1;
                    if older_streak >= DATE_SCAN_PATIENCE {
                        debug!(index, "scan passed the window start; stopping");
                        break;
                    }
                    continue;
                }
                Some(_) => older_streak = 0,
                None => {}
            }
        }

        if matches_filter(&article, &plan.filter) {
            matched.push(article);
            if let StopRule::AfterMatches(count) = plan.stop {
                if matched.len() >= count {
                    debug!(index, count, "accumulated enough matches; stopping");
                    break;
                }
            }
        }
    }

    let mut result: Vec<Article> = matched.into_iter().unique_by(|a| a.index).collect();
    result.sort_by_key(|a| a.index);
    info!(examined, matched = result.len(), "assembled result set");
    Ok(result)
}
