//! Coarse time-window location over a board's index space.
//!
//! Given a clock window `[start, end)` on the current date, find an index
//! bracket guaranteed to contain every article posted inside the window,
//! without scanning the whole board. The index space is sampled backward
//! from the newest article at [`SAMPLE_INTERVAL`] steps, fetching only one
//! article per probe, until a probe lands before the window start
//! (overshoot) or index 1 is reached. The bracket is then
//! `[overshoot, smallest probe at-or-after the window end]` at probe
//! granularity.
//!
//! The refinement pass — fetching every index inside the bracket and
//! keeping the exact `[start, end)` matches — is the assembler's fetch
//! loop; collapsing probing into a binary search instead would be unsafe
//! because remote timestamps are not strictly monotonic across day
//! boundaries, and a plain backward scan from the newest article would
//! cost one fetch per article skipped.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, instrument, warn};

use crate::board::RemoteBoard;
use crate::error::BoardError;

/// Index distance between coarse probes.
pub const SAMPLE_INTERVAL: u32 = 100;

/// Safety cap on probe count (10k articles per day is an active board's
/// worth; 100k is runaway).
const MAX_PROBES: usize = 1_000;

/// Resolved index bracket, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub lo: u32,
    pub hi: u32,
}

impl SearchWindow {
    pub fn contains(&self, index: u32) -> bool {
        self.lo <= index && index <= self.hi
    }
}

/// Whether a probed timestamp falls before the window start. Anything
/// dated before `today` is past the window no matter its clock time, so a
/// backward scan cannot wander into yesterday's articles.
fn before_window(dt: NaiveDateTime, today: NaiveDate, start: NaiveTime) -> bool {
    dt.date() < today || (dt.date() == today && dt.time() < start)
}

/// Whether a probed timestamp is at or past the window end.
fn past_window(dt: NaiveDateTime, today: NaiveDate, end: NaiveTime) -> bool {
    dt.date() > today || (dt.date() == today && dt.time() >= end)
}

/// Locate the index bracket for `[start, end)` on `today`.
///
/// `Ok(None)` means the window is invalid or the board is empty — an empty
/// result, not an error. Probe fetches that fail with `NotFound` or an
/// exhausted transient retry are skipped; the bracket just stays coarser.
#[instrument(level = "info", skip(board), fields(board = %name, %start, %end))]
pub async fn locate<B: RemoteBoard>(
    board: &mut B,
    name: &str,
    today: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<Option<SearchWindow>, BoardError> {
    if end <= start {
        warn!("window end precedes start; nothing can match");
        return Ok(None);
    }

    let latest = board.latest_index(name).await?;
    if latest == 0 {
        info!("board has no articles");
        return Ok(None);
    }
    debug!(latest, "probing backward from newest index");

    // Coarse sampling: one timestamp per SAMPLE_INTERVAL indices.
    let mut probes: Vec<(u32, NaiveDateTime)> = Vec::new();
    let mut overshoot: Option<u32> = None;
    let mut index = latest;
    loop {
        match board.fetch_article(name, index).await {
            Ok(article) => {
                if let Some(dt) = article.posted_at() {
                    debug!(index, time = %dt, "probe");
                    probes.push((index, dt));
                    if before_window(dt, today, start) {
                        overshoot = Some(index);
                        break;
                    }
                } else {
                    warn!(index, date = %article.date, "probe timestamp unparseable; skipping");
                }
            }
            Err(e @ BoardError::Auth { .. }) => return Err(e),
            Err(e) => {
                warn!(index, error = %e, "probe fetch failed; skipping");
            }
        }

        if index <= 1 || probes.len() >= MAX_PROBES {
            break;
        }
        index = index.saturating_sub(SAMPLE_INTERVAL).max(1);
    }

    // No probe fell before the window: the bracket extends to index 1.
    let lo = overshoot.unwrap_or(1);

    // The smallest probe at or past the window end bounds the bracket from
    // above; if every probe is still inside (or before) the window, the
    // newest article itself is the bound.
    let hi = probes
        .iter()
        .filter(|(_, dt)| past_window(*dt, today, end))
        .map(|(i, _)| *i)
        .min()
        .unwrap_or(latest);

    let window = SearchWindow {
        lo: lo.min(hi),
        hi,
    };
    info!(
        lo = window.lo,
        hi = window.hi,
        probes = probes.len(),
        "located coarse bracket"
    );
    Ok(Some(window))
}
