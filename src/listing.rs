//! Listing and ranking rules shared by every storage backend.
//!
//! Postgres pushes the same ordering down into SQL; the in-memory store calls
//! [`rank_threads`], [`rank_replies`] and [`Page::paginate`] directly. Both
//! must agree on:
//!
//! * tombstoned rows never appear,
//! * `popular` ties fall back to `(created_at, id)` in the requested direction,
//! * a search overrides the sort and keeps titles whose trigram similarity is
//!   strictly above [`SIMILARITY_THRESHOLD`],
//! * pages are 1-indexed, [`PER_PAGE`] long, and out-of-range requests clamp.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::{Id, Reply, ReplySummary, ThreadSummary};
use crate::repo::{ReplyRepo, RepoResult};

pub const PER_PAGE: i64 = 10;
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Latest,
    Popular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Raw query string of a listing request. Unknown values fall back to the
/// listing's defaults instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// `latest` or `popular`
    pub sort: Option<String>,
    /// `asc` or `desc`
    pub order: Option<String>,
    /// Fuzzy title search (threads only)
    pub search: Option<String>,
    /// 1-indexed page number
    pub page: Option<String>,
}

impl ListParams {
    fn sort(&self) -> Option<SortKey> {
        match self.sort.as_deref() {
            Some("latest") => Some(SortKey::Latest),
            Some("popular") => Some(SortKey::Popular),
            _ => None,
        }
    }

    fn order(&self) -> Option<Order> {
        match self.order.as_deref() {
            Some("asc") => Some(Order::Asc),
            Some("desc") => Some(Order::Desc),
            _ => None,
        }
    }

    fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
    }

    /// Thread listing defaults to newest first.
    pub fn thread_query(&self, category_slug: Option<String>) -> ThreadQuery {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        ThreadQuery {
            category_slug,
            sort: self.sort().unwrap_or(SortKey::Latest),
            order: self.order().unwrap_or(Order::Desc),
            search,
            page: self.page(),
        }
    }

    /// Reply listing defaults to conversation order, oldest first.
    pub fn reply_query(&self) -> ReplyQuery {
        ReplyQuery {
            sort: self.sort().unwrap_or(SortKey::Latest),
            order: self.order().unwrap_or(Order::Asc),
            page: self.page(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadQuery {
    pub category_slug: Option<String>,
    pub sort: SortKey,
    pub order: Order,
    pub search: Option<String>,
    pub page: i64,
}

impl Default for ThreadQuery {
    fn default() -> Self {
        ListParams::default().thread_query(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyQuery {
    pub sort: SortKey,
    pub order: Order,
    pub page: i64,
}

impl Default for ReplyQuery {
    fn default() -> Self {
        ListParams::default().reply_query()
    }
}

/// Position of a requested page inside `total` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub total_pages: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Clamps `requested` into `1..=total_pages`; an empty listing still has one (empty) page.
    pub fn locate(total: i64, requested: i64) -> Self {
        let total_pages = ((total.max(0) + PER_PAGE - 1) / PER_PAGE).max(1);
        let page = requested.clamp(1, total_pages);
        Self { page, total_pages, offset: (page - 1) * PER_PAGE }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_pages: i64,
    pub total_items: i64,
    pub per_page: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn from_window(items: Vec<T>, window: PageWindow, total_items: i64) -> Self {
        Self {
            items,
            page: window.page,
            total_pages: window.total_pages,
            total_items,
            per_page: PER_PAGE,
            has_next: window.page < window.total_pages,
            has_previous: window.page > 1,
        }
    }

    /// Cuts one page out of an already ordered list.
    pub fn paginate(all: Vec<T>, requested: i64) -> Self {
        let total = all.len() as i64;
        let window = PageWindow::locate(total, requested);
        let items = all
            .into_iter()
            .skip(window.offset as usize)
            .take(PER_PAGE as usize)
            .collect();
        Self::from_window(items, window, total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            total_pages: self.total_pages,
            total_items: self.total_items,
            per_page: self.per_page,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

/// 1-indexed page holding a reply preceded by `preceding` visible replies.
pub fn reply_page_number(preceding: i64) -> i64 {
    preceding.max(0) / PER_PAGE + 1
}

/// Page a reply lands on in its thread's default listing, ignoring any search
/// or sort the viewer may have applied.
pub async fn reply_page_index<R>(repo: &R, reply: &Reply) -> RepoResult<i64>
where
    R: ReplyRepo + ?Sized,
{
    let preceding = repo.count_visible_replies_before(reply).await?;
    Ok(reply_page_number(preceding))
}

/// Page for every id in `ordered_ids` (default reply order, oldest first).
pub fn reply_page_map(ordered_ids: &[Id]) -> Vec<(Id, i64)> {
    ordered_ids
        .iter()
        .enumerate()
        .map(|(idx, id)| (*id, reply_page_number(idx as i64)))
        .collect()
}

/// Trigram set of a string following pg_trgm: lowercase, split on
/// non-alphanumerics, pad each word with two leading and one trailing space.
pub fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut out = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain(" ".chars())
            .collect();
        for w in padded.windows(3) {
            out.insert([w[0], w[1], w[2]]);
        }
    }
    out
}

/// pg_trgm `similarity(a, b)`: shared trigrams over the union of trigrams.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}

/// Applies category filter, search, sort and tombstone rules to every thread.
pub fn rank_threads(rows: Vec<ThreadSummary>, q: &ThreadQuery) -> Vec<ThreadSummary> {
    let visible = rows.into_iter().filter(|t| {
        !t.thread.is_deleted
            && q.category_slug.as_deref().map_or(true, |slug| t.category_slug == slug)
    });

    if let Some(term) = q.search.as_deref() {
        let mut scored: Vec<(f64, ThreadSummary)> = visible
            .map(|t| (trigram_similarity(&t.thread.title, term), t))
            .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| b.thread.created_at.cmp(&a.thread.created_at))
                .then_with(|| b.thread.id.cmp(&a.thread.id))
        });
        return scored.into_iter().map(|(_, t)| t).collect();
    }

    let mut v: Vec<_> = visible.collect();
    v.sort_by(|a, b| {
        let by_time = a
            .thread
            .created_at
            .cmp(&b.thread.created_at)
            .then_with(|| a.thread.id.cmp(&b.thread.id));
        let ord = match q.sort {
            SortKey::Latest => by_time,
            SortKey::Popular => a.upvote_count.cmp(&b.upvote_count).then(by_time),
        };
        q.order.apply(ord)
    });
    v
}

/// Sorts the visible replies of one thread.
pub fn rank_replies(rows: Vec<ReplySummary>, q: &ReplyQuery) -> Vec<ReplySummary> {
    let mut v: Vec<_> = rows.into_iter().filter(|r| !r.reply.is_deleted).collect();
    v.sort_by(|a, b| {
        let by_time = a
            .reply
            .created_at
            .cmp(&b.reply.created_at)
            .then_with(|| a.reply.id.cmp(&b.reply.id));
        let ord = match q.sort {
            SortKey::Latest => by_time,
            SortKey::Popular => a.upvote_count.cmp(&b.upvote_count).then(by_time),
        };
        q.order.apply(ord)
    });
    v
}
