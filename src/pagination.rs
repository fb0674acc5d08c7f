//! Incremental, de-duplicating pagination.
//!
//! The feed is loaded one page at a time and appended to a growing list. The
//! first page pins a watermark, `max_no`: the highest post number the server saw
//! when the session started. Every later request carries it, so posts crawled
//! after the session began cannot push older rows onto the next page. The
//! session also drops any post it has already shown, which covers servers that
//! ignore the watermark and orders that move between fetches (views, likes).

use std::collections::HashSet;

use tracing::debug;

use crate::client::{ClientError, FeedApi};
use crate::models::{FeedQuery, PageRequest, Post, PostPage};

/// An issued page request. Hand it back to [`FeedSession::apply`] or
/// [`FeedSession::fail`] once the fetch finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    pub request: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied {
        appended: usize,
        dropped: usize,
        exhausted: bool,
    },
    /// The ticket belongs to an earlier query or was already applied.
    Stale,
}

#[derive(Debug, Clone)]
pub struct FeedSession {
    query: FeedQuery,
    page_size: i64,
    next_page: i64,
    max_no: Option<i64>,
    posts: Vec<Post>,
    seen: HashSet<i64>,
    exhausted: bool,
    in_flight: bool,
    generation: u64,
}

impl FeedSession {
    pub fn new(query: FeedQuery, page_size: i64) -> Self {
        Self {
            query,
            page_size: page_size.max(1),
            next_page: 1,
            max_no: None,
            posts: Vec::new(),
            seen: HashSet::new(),
            exhausted: false,
            in_flight: false,
            generation: 0,
        }
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn max_no(&self) -> Option<i64> {
        self.max_no
    }

    pub fn next_page(&self) -> i64 {
        self.next_page
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Starts over for `query`. Responses to tickets issued before the reset
    /// are ignored.
    pub fn reset(&mut self, query: FeedQuery) {
        self.query = query;
        self.next_page = 1;
        self.max_no = None;
        self.posts.clear();
        self.seen.clear();
        self.exhausted = false;
        self.in_flight = false;
        self.generation += 1;
    }

    pub fn set_page_size(&mut self, page_size: i64) {
        self.page_size = page_size.max(1);
        let query = self.query.clone();
        self.reset(query);
    }

    /// The next page to fetch, or `None` when everything is loaded or a fetch
    /// is already running.
    pub fn next_request(&mut self) -> Option<Ticket> {
        if self.exhausted || self.in_flight {
            return None;
        }
        self.in_flight = true;

        Some(Ticket {
            generation: self.generation,
            request: PageRequest {
                query: self.query.clone(),
                page: self.next_page,
                page_size: self.page_size,
                max_no: self.max_no,
            },
        })
    }

    pub fn apply(&mut self, ticket: &Ticket, page: PostPage) -> ApplyOutcome {
        if ticket.generation != self.generation || ticket.request.page != self.next_page {
            debug!(
                "Discarding stale page {} (generation {})",
                ticket.request.page, ticket.generation
            );
            return ApplyOutcome::Stale;
        }

        if self.next_page == 1 {
            self.max_no = page.max_no;
        }

        let max_no = self.max_no;
        let mut appended = 0;
        let mut dropped = 0;
        for post in page.posts.iter() {
            let beyond_watermark = max_no.map_or(false, |max| post.no > max);
            if beyond_watermark || !self.seen.insert(post.no) {
                dropped += 1;
                continue;
            }
            self.posts.push(post.clone());
            appended += 1;
        }

        if dropped > 0 {
            debug!(
                "Dropped {} already-seen or newer posts from page {}",
                dropped, ticket.request.page
            );
        }

        self.exhausted = !page.has_more || page.posts.is_empty();
        self.next_page += 1;
        self.in_flight = false;

        ApplyOutcome::Applied {
            appended,
            dropped,
            exhausted: self.exhausted,
        }
    }

    /// Releases a failed ticket. The same page is requested again next time.
    pub fn fail(&mut self, ticket: &Ticket) {
        if ticket.generation == self.generation {
            self.in_flight = false;
        }
    }

    /// Fetches and applies the next page. `Ok(None)` means nothing was fetched.
    pub async fn load_more<A: FeedApi + ?Sized>(
        &mut self,
        api: &A,
    ) -> Result<Option<ApplyOutcome>, ClientError> {
        let Some(ticket) = self.next_request() else {
            return Ok(None);
        };

        match api.fetch_posts(&ticket.request).await {
            Ok(page) => Ok(Some(self.apply(&ticket, page))),
            Err(e) => {
                self.fail(&ticket);
                Err(e)
            }
        }
    }
}
