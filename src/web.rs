//! Web front-end transport: [`RemoteBoard`] over `www.ptt.cc`.
//!
//! The web rendering of a board is a paginated listing: numbered pages
//! `index1.html..indexN.html` of 20 entries each, plus the unnumbered
//! newest page `index.html`. Deleted articles keep their listing slot
//! (title without a link), so the slot arithmetic below gives every
//! article a stable board-local index:
//!
//! ```text
//! index i  ->  page (i-1)/20 + 1, slot (i-1)%20        (numbered pages)
//! latest   =   prev_page_number * 20 + newest-page entry count
//! ```
//!
//! Boards behind the age gate answer with a redirect to `/ask/over18`;
//! the handshake is performed once per board and the consent cookie rides
//! the session from then on.
//!
//! Native search (`/bbs/{board}/search`) returns hit pages newest-first
//! but without board indices, so hits are resolved by walking recent
//! listing pages and matching article filenames. That makes search cheap
//! only for recent hits; the engine treats the results as untrusted
//! candidates either way.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::board::{RemoteBoard, SearchMode};
use crate::config::Credentials;
use crate::error::BoardError;
use crate::models::{Article, Comment, CommentKind};
use crate::utils::truncate_for_log;

/// The public front end.
pub const DEFAULT_BASE_URL: &str = "https://www.ptt.cc";

const ENTRIES_PER_PAGE: u32 = 20;

/// Listing pages to walk when resolving search hits back to indices
/// (300 pages = 6000 articles of history).
const SEARCH_RESOLVE_PAGE_BUDGET: u32 = 300;

/// Search result pages to read before giving up on finding more hits.
const SEARCH_PAGE_BUDGET: u32 = 50;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

static ROW_OR_SEP_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.r-ent, div.r-list-sep").unwrap());
static TITLE_LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("div.title a").unwrap());
static PAGING_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.btn-group-paging a").unwrap());
static META_TAG_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.article-meta-tag").unwrap());
static META_VALUE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.article-meta-value").unwrap());
static MAIN_CONTENT_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("#main-content").unwrap());
static PUSH_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("div.push").unwrap());
static PUSH_TAG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span.push-tag").unwrap());
static PUSH_USER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.push-userid").unwrap());
static PUSH_CONTENT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.push-content").unwrap());
static PUSH_TIME_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.push-ipdatetime").unwrap());

static INDEX_PAGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"index(\d+)\.html").unwrap());
static FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(M\.\d+\.[A-Z]\.[0-9A-F]+)\.html").unwrap());
static IP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"來自:\s*([0-9A-Fa-f.:]+)").unwrap());
static PUSH_CLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{2}/\d{2} \d{2}:\d{2}").unwrap());

fn parse_failure(what: &str) -> BoardError {
    BoardError::transient(std::io::Error::other(what.to_string()))
}

/// Page geometry of a board listing at one point in time.
#[derive(Debug, Clone, Copy)]
struct BoardShape {
    /// Page number the newest page's "previous" button points at; pages
    /// `1..=prev_page` are full.
    prev_page: u32,
    /// Entries on the unnumbered newest page (pinned posts excluded).
    newest_count: u32,
}

impl BoardShape {
    fn latest_index(&self) -> u32 {
        self.prev_page * ENTRIES_PER_PAGE + self.newest_count
    }
}

/// One listing row: `None` for a deleted article's empty slot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingEntry {
    filename: String,
    href: String,
}

/// A connected session against the web front end.
pub struct WebBoard {
    http: reqwest::Client,
    base: Url,
    credentials: Option<Credentials>,
    verified: HashSet<String>,
    shapes: HashMap<String, BoardShape>,
}

impl WebBoard {
    /// Build the session and verify the front end is reachable.
    ///
    /// Credentials are attached as HTTP basic auth on every request for
    /// gateways that front boards with it; the public front end needs
    /// none. The age-gate handshake happens lazily, per board.
    #[instrument(level = "info", skip_all, fields(base = %base_url))]
    pub async fn connect(
        base_url: &str,
        credentials: Option<Credentials>,
    ) -> Result<WebBoard, BoardError> {
        let base = Url::parse(base_url)
            .map_err(|e| parse_failure(&format!("invalid base url {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(BoardError::transient)?;

        let board = WebBoard {
            http,
            base,
            credentials,
            verified: HashSet::new(),
            shapes: HashMap::new(),
        };
        let resp = board.get(board.base.clone()).await?;
        if !resp.status().is_success() {
            return Err(BoardError::Auth {
                reason: format!("front end answered {}", resp.status()),
            });
        }
        info!("connected");
        Ok(board)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, BoardError> {
        debug!(%url, "GET");
        let mut req = self.http.get(url);
        if let Some(creds) = &self.credentials {
            req = req.basic_auth(&creds.account, Some(&creds.password));
        }
        let resp = req.send().await.map_err(BoardError::transient)?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BoardError::Auth {
                reason: format!("{} from {}", resp.status(), resp.url()),
            }),
            status if status.is_server_error() => Err(BoardError::transient(
                resp.error_for_status().unwrap_err(),
            )),
            _ => Ok(resp),
        }
    }

    fn board_url(&self, board: &str, file: &str) -> Result<Url, BoardError> {
        self.base
            .join(&format!("/bbs/{board}/{file}"))
            .map_err(|e| parse_failure(&format!("bad board path {board}/{file}: {e}")))
    }

    /// Run the age-gate handshake for `board` once per session.
    async fn ensure_access(&mut self, board: &str) -> Result<(), BoardError> {
        if self.verified.contains(board) {
            return Ok(());
        }
        let index_url = self.board_url(board, "index.html")?;
        let resp = self.get(index_url.clone()).await?;
        let gated = resp.url().path().contains("over18");
        if gated {
            info!(board, "board is age-gated; submitting consent");
            let consent = self
                .base
                .join("/ask/over18")
                .map_err(|e| parse_failure(&format!("bad consent path: {e}")))?;
            let mut req = self.http.post(consent).form(&[
                ("from", format!("/bbs/{board}/index.html")),
                ("yes", "yes".to_string()),
            ]);
            if let Some(creds) = &self.credentials {
                req = req.basic_auth(&creds.account, Some(&creds.password));
            }
            req.send()
                .await
                .map_err(BoardError::transient)?
                .error_for_status()
                .map_err(BoardError::transient)?;

            let retry = self.get(index_url).await?;
            if retry.url().path().contains("over18") {
                return Err(BoardError::Auth {
                    reason: format!("age verification rejected for board {board}"),
                });
            }
        }
        self.verified.insert(board.to_string());
        Ok(())
    }

    /// Fetch and parse the newest listing page, caching the geometry.
    async fn refresh_shape(&mut self, board: &str) -> Result<BoardShape, BoardError> {
        self.ensure_access(board).await?;
        let url = self.board_url(board, "index.html")?;
        let resp = self.get(url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BoardError::NotFound {
                board: board.to_string(),
                index: 0,
            });
        }
        let html = resp.text().await.map_err(BoardError::transient)?;
        // A board small enough to fit one page has no usable previous-page
        // button; everything then lives on the newest page.
        let prev_page = parse_prev_page(&html).unwrap_or(0);
        let newest_count = parse_listing(&html).len() as u32;
        let shape = BoardShape {
            prev_page,
            newest_count,
        };
        debug!(board, prev_page, newest_count, "board shape");
        self.shapes.insert(board.to_string(), shape);
        Ok(shape)
    }

    async fn shape(&mut self, board: &str) -> Result<BoardShape, BoardError> {
        if let Some(shape) = self.shapes.get(board) {
            return Ok(*shape);
        }
        self.refresh_shape(board).await
    }

    /// The listing entry that owns `index`, or `NotFound`.
    async fn listing_entry(&mut self, board: &str, index: u32) -> Result<ListingEntry, BoardError> {
        let not_found = || BoardError::NotFound {
            board: board.to_string(),
            index,
        };
        if index == 0 {
            return Err(not_found());
        }

        let shape = self.shape(board).await?;
        let (file, slot) = if index > shape.prev_page * ENTRIES_PER_PAGE {
            ("index.html".to_string(), index - shape.prev_page * ENTRIES_PER_PAGE - 1)
        } else {
            let page = (index - 1) / ENTRIES_PER_PAGE + 1;
            (format!("index{page}.html"), (index - 1) % ENTRIES_PER_PAGE)
        };

        let resp = self.get(self.board_url(board, &file)?).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        let html = resp.text().await.map_err(BoardError::transient)?;
        let entries = parse_listing(&html);
        match entries.into_iter().nth(slot as usize) {
            Some(Some(entry)) => Ok(entry),
            // Deleted article or an index past the end of the board.
            _ => Err(not_found()),
        }
    }

    /// Map search-hit filenames to board indices by walking listing pages
    /// newest-first. Hits older than the page budget are dropped.
    async fn resolve_filenames(
        &mut self,
        board: &str,
        wanted: &HashSet<String>,
    ) -> Result<HashMap<String, u32>, BoardError> {
        let shape = self.refresh_shape(board).await?;
        let mut resolved: HashMap<String, u32> = HashMap::new();

        // Newest page first, then numbered pages downward.
        let mut page_files: Vec<(String, u32)> = vec![("index.html".to_string(), shape.prev_page)];
        let lowest_page = shape.prev_page.saturating_sub(SEARCH_RESOLVE_PAGE_BUDGET) + 1;
        for page in (lowest_page..=shape.prev_page).rev() {
            page_files.push((format!("index{page}.html"), page - 1));
        }

        for (file, full_pages_below) in page_files {
            if resolved.len() == wanted.len() {
                break;
            }
            let resp = self.get(self.board_url(board, &file)?).await?;
            if resp.status() == StatusCode::NOT_FOUND {
                continue;
            }
            let html = resp.text().await.map_err(BoardError::transient)?;
            for (slot, entry) in parse_listing(&html).into_iter().enumerate() {
                if let Some(entry) = entry {
                    if wanted.contains(&entry.filename) {
                        let index = full_pages_below * ENTRIES_PER_PAGE + slot as u32 + 1;
                        resolved.insert(entry.filename, index);
                    }
                }
            }
        }

        if resolved.len() < wanted.len() {
            warn!(
                board,
                wanted = wanted.len(),
                resolved = resolved.len(),
                "some search hits are older than the resolution budget; dropping them"
            );
        }
        Ok(resolved)
    }
}

impl RemoteBoard for WebBoard {
    #[instrument(level = "debug", skip(self))]
    async fn latest_index(&mut self, board: &str) -> Result<u32, BoardError> {
        Ok(self.refresh_shape(board).await?.latest_index())
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch_article(&mut self, board: &str, index: u32) -> Result<Article, BoardError> {
        let entry = self.listing_entry(board, index).await?;
        let url = self
            .base
            .join(&entry.href)
            .map_err(|e| parse_failure(&format!("bad article href {}: {e}", entry.href)))?;
        let resp = self.get(url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BoardError::NotFound {
                board: board.to_string(),
                index,
            });
        }
        let html = resp.text().await.map_err(BoardError::transient)?;
        parse_article(&html, board, index, &entry.filename).inspect_err(|e| {
            warn!(board, index, error = %e, preview = %truncate_for_log(&html, 200),
                "article page did not parse");
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn native_search(
        &mut self,
        board: &str,
        mode: SearchMode,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<u32>, BoardError> {
        self.ensure_access(board).await?;
        let query = match mode {
            SearchMode::Title => query.to_string(),
            SearchMode::Author => format!("author:{query}"),
        };
        let cap = limit.unwrap_or(usize::MAX);

        // Search result pages are newest-first, so the first `cap` hits
        // are the newest matches.
        let mut hits: Vec<String> = Vec::new();
        for page in 1..=SEARCH_PAGE_BUDGET {
            if hits.len() >= cap {
                break;
            }
            let file = format!("search?page={page}&q={}", urlencoding::encode(&query));
            let resp = self.get(self.board_url(board, &file)?).await?;
            if resp.status() == StatusCode::NOT_FOUND {
                break;
            }
            let html = resp.text().await.map_err(BoardError::transient)?;
            let entries: Vec<ListingEntry> = parse_listing(&html).into_iter().flatten().collect();
            if entries.is_empty() {
                break;
            }
            hits.extend(entries.into_iter().map(|e| e.filename));
        }
        hits.truncate(cap);
        debug!(board, hits = hits.len(), "search hits collected");

        let wanted: HashSet<String> = hits.into_iter().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let resolved = self.resolve_filenames(board, &wanted).await?;
        let mut indices: Vec<u32> = resolved.into_values().collect();
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Page number behind the newest page's "previous" button.
fn parse_prev_page(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    for link in doc.select(&PAGING_SEL) {
        let label = link.text().collect::<String>();
        if label.contains("上頁") {
            let href = link.value().attr("href")?;
            let caps = INDEX_PAGE_RE.captures(href)?;
            return caps[1].parse().ok();
        }
    }
    None
}

/// Listing rows in page order, `None` for slots whose article is deleted.
/// Rows after the pinned-post separator are not part of the index space.
fn parse_listing(html: &str) -> Vec<Option<ListingEntry>> {
    let doc = Html::parse_document(html);
    let mut rows = Vec::new();
    for el in doc.select(&ROW_OR_SEP_SEL) {
        if el.value().classes().any(|c| c == "r-list-sep") {
            break;
        }
        let entry = el
            .select(&TITLE_LINK_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| {
                FILENAME_RE.captures(href).map(|caps| ListingEntry {
                    filename: caps[1].to_string(),
                    href: href.to_string(),
                })
            });
        rows.push(entry);
    }
    rows
}

/// Body text of `#main-content` with the meta header and push lines
/// dropped, the way the terminal renders the article body.
fn article_body(main: ElementRef<'_>) -> String {
    let mut body = String::new();
    for child in main.children() {
        if let Some(el) = ElementRef::wrap(child) {
            let classes: Vec<_> = el.value().classes().collect();
            if classes.iter().any(|c| {
                *c == "article-metaline" || *c == "article-metaline-right" || *c == "push"
            }) {
                continue;
            }
            body.push_str(&el.text().collect::<String>());
        } else if let Some(text) = child.value().as_text() {
            body.push_str(text);
        }
    }
    body.trim().to_string()
}

fn parse_article(html: &str, board: &str, index: u32, aid: &str) -> Result<Article, BoardError> {
    let doc = Html::parse_document(html);
    let main = doc
        .select(&MAIN_CONTENT_SEL)
        .next()
        .ok_or_else(|| parse_failure("article page without main content"))?;

    let mut author = String::new();
    let mut title = String::new();
    let mut date = String::new();
    for (tag, value) in main.select(&META_TAG_SEL).zip(main.select(&META_VALUE_SEL)) {
        let tag_text = tag.text().collect::<String>();
        let value_text = value.text().collect::<String>().trim().to_string();
        match tag_text.trim() {
            "作者" => author = value_text,
            "標題" => title = value_text,
            "時間" => date = value_text,
            _ => {}
        }
    }
    if date.is_empty() {
        return Err(parse_failure("article page without a time header"));
    }

    let content = article_body(main);
    let ip = IP_RE
        .captures(&content)
        .map(|caps| caps[1].to_string());

    let comments = main
        .select(&PUSH_SEL)
        .filter_map(|push| {
            let marker = push.select(&PUSH_TAG_SEL).next()?.text().collect::<String>();
            let user = push.select(&PUSH_USER_SEL).next()?.text().collect::<String>();
            let content = push
                .select(&PUSH_CONTENT_SEL)
                .next()?
                .text()
                .collect::<String>();
            let stamp = push
                .select(&PUSH_TIME_SEL)
                .next()
                .map(|t| t.text().collect::<String>())
                .unwrap_or_default();
            // The stamp column may carry the commenter's IP before the
            // clock; keep only the MM/DD HH:MM part when present.
            let time = PUSH_CLOCK_RE
                .find(&stamp)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| stamp.trim().to_string());
            Some(Comment {
                kind: CommentKind::from_marker(&marker),
                author: user.trim().to_string(),
                content: content.trim().trim_start_matches(':').trim().to_string(),
                time,
            })
        })
        .collect();

    Ok(Article {
        board: board.to_string(),
        aid: aid.to_string(),
        index,
        author,
        title,
        date,
        content,
        ip,
        comments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_PAGE: &str = r#"
        <div class="btn-group btn-group-paging">
          <a class="btn wide" href="/bbs/Test/index1.html">最舊</a>
          <a class="btn wide" href="/bbs/Test/index4321.html">&lsaquo; 上頁</a>
          <a class="btn wide disabled">下頁 &rsaquo;</a>
        </div>
        <div class="r-list-container">
          <div class="r-ent">
            <div class="title"><a href="/bbs/Test/M.1759583808.A.1B2.html">[問卦] first</a></div>
            <div class="author">alice</div>
          </div>
          <div class="r-ent">
            <div class="title">(本文已被刪除) [bob]</div>
            <div class="author">-</div>
          </div>
          <div class="r-ent">
            <div class="title"><a href="/bbs/Test/M.1759583999.A.0FF.html">Re: [問卦] first</a></div>
            <div class="author">carol</div>
          </div>
          <div class="r-list-sep"></div>
          <div class="r-ent">
            <div class="title"><a href="/bbs/Test/M.1700000000.A.AAA.html">[公告] pinned</a></div>
            <div class="author">sysop</div>
          </div>
        </div>"#;

    const ARTICLE_PAGE: &str = r#"
        <div id="main-content" class="bbs-screen bbs-content">
          <div class="article-metaline">
            <span class="article-meta-tag">作者</span>
            <span class="article-meta-value">alice (Alice)</span>
          </div>
          <div class="article-metaline-right">
            <span class="article-meta-tag">看板</span>
            <span class="article-meta-value">Test</span>
          </div>
          <div class="article-metaline">
            <span class="article-meta-tag">標題</span>
            <span class="article-meta-value">[問卦] first</span>
          </div>
          <div class="article-metaline">
            <span class="article-meta-tag">時間</span>
            <span class="article-meta-value">Sat Oct  4 21:16:48 2025</span>
          </div>
          body line one
          body line two
          ※ 發信站: 批踢踢實業坊(ptt.cc), 來自: 1.2.3.4 (臺灣)
          <div class="push">
            <span class="push-tag">推 </span>
            <span class="push-userid">fanone</span>
            <span class="push-content">: 推 好文</span>
            <span class="push-ipdatetime"> 5.6.7.8 10/04 21:20</span>
          </div>
          <div class="push">
            <span class="push-tag">噓 </span>
            <span class="push-userid">hater</span>
            <span class="push-content">: 不推</span>
            <span class="push-ipdatetime"> 10/04 21:21</span>
          </div>
        </div>"#;

    #[test]
    fn test_parse_prev_page() {
        assert_eq!(parse_prev_page(LISTING_PAGE), Some(4321));
        assert_eq!(parse_prev_page("<div></div>"), None);
    }

    #[test]
    fn test_parse_listing_keeps_slots_and_stops_at_separator() {
        let rows = parse_listing(LISTING_PAGE);
        assert_eq!(rows.len(), 3, "pinned posts are not index slots");
        assert_eq!(
            rows[0].as_ref().unwrap().filename,
            "M.1759583808.A.1B2"
        );
        assert!(rows[1].is_none(), "deleted article keeps an empty slot");
        assert_eq!(rows[2].as_ref().unwrap().filename, "M.1759583999.A.0FF");
    }

    #[test]
    fn test_parse_article_meta_and_body() {
        let article = parse_article(ARTICLE_PAGE, "Test", 86423, "M.1759583808.A.1B2").unwrap();
        assert_eq!(article.board, "Test");
        assert_eq!(article.index, 86423);
        assert_eq!(article.aid, "M.1759583808.A.1B2");
        assert_eq!(article.author, "alice (Alice)");
        assert_eq!(article.title, "[問卦] first");
        assert_eq!(article.date, "Sat Oct  4 21:16:48 2025");
        assert!(article.content.contains("body line one"));
        assert!(
            !article.content.contains("作者"),
            "meta header must not leak into the body"
        );
        assert!(!article.content.contains("好文"), "pushes are not body text");
        assert!(article.posted_at().is_some());
    }

    #[test]
    fn test_parse_article_ip_and_pushes() {
        let article = parse_article(ARTICLE_PAGE, "Test", 1, "M.1759583808.A.1B2").unwrap();
        assert_eq!(article.ip.as_deref(), Some("1.2.3.4"));

        assert_eq!(article.comments.len(), 2);
        let first = &article.comments[0];
        assert_eq!(first.kind, CommentKind::Push);
        assert_eq!(first.author, "fanone");
        assert_eq!(first.content, "推 好文");
        assert_eq!(first.time, "10/04 21:20");
        assert_eq!(article.comments[1].kind, CommentKind::Boo);
        assert_eq!(article.comments[1].time, "10/04 21:21");
    }

    #[test]
    fn test_parse_article_without_time_header_fails() {
        let err = parse_article("<div id=\"main-content\"></div>", "Test", 1, "aid").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_board_shape_latest_index() {
        let shape = BoardShape {
            prev_page: 4321,
            newest_count: 3,
        };
        assert_eq!(shape.latest_index(), 4321 * 20 + 3);
    }

    #[test]
    fn test_filename_regex_shapes() {
        assert!(FILENAME_RE.is_match("/bbs/Test/M.1759583808.A.1B2.html"));
        assert!(!FILENAME_RE.is_match("/bbs/Test/index123.html"));
    }
}
