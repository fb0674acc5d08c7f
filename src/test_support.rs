//! In-memory stand-in for the feed API, used by the client-side tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{ClientError, FeedApi};
use crate::models::{PageRequest, Post, PostPage};

pub fn make_post(no: i64) -> Post {
    Post {
        no,
        site_id: 1,
        site_slug: "devforum".to_string(),
        site_name: "Dev Forum".to_string(),
        source_id: format!("src-{}", no),
        title: format!("Post {}", no),
        url: format!("https://devforum.example.com/{}", no),
        author: None,
        views: 0,
        likes: 0,
        comments: 0,
        posted_at: None,
        crawled_at: "2026-01-01T00:00:00+00:00".to_string(),
        hidden: false,
    }
}

/// Serves posts newest-first, mimicking the server's watermark handling.
pub struct FakeApi {
    posts: Mutex<Vec<Post>>,
    honour_max_no: bool,
    fail_next: Mutex<bool>,
    pub requests: Mutex<Vec<PageRequest>>,
    pub views: Mutex<Vec<i64>>,
}

impl FakeApi {
    pub fn with_posts(count: i64) -> Self {
        Self {
            posts: Mutex::new((1..=count).map(make_post).collect()),
            honour_max_no: true,
            fail_next: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }

    /// A server that recomputes the page set on every call.
    pub fn ignoring_max_no(count: i64) -> Self {
        Self {
            honour_max_no: false,
            ..Self::with_posts(count)
        }
    }

    /// Simulates the crawler inserting `count` fresh posts upstream.
    pub fn insert_new(&self, count: i64) {
        let mut posts = self.posts.lock().unwrap();
        let next = posts.iter().map(|p| p.no).max().unwrap_or(0) + 1;
        posts.extend((next..next + count).map(make_post));
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl FeedApi for FakeApi {
    async fn fetch_posts(&self, request: &PageRequest) -> Result<PostPage, ClientError> {
        self.requests.lock().unwrap().push(request.clone());

        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(ClientError::Status {
                status: 503,
                message: "unavailable".to_string(),
            });
        }

        let mut posts: Vec<Post> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| match &request.query.site {
                Some(site) => &p.site_slug == site,
                None => true,
            })
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.no.cmp(&a.no));

        let current_max = posts.first().map(|p| p.no);
        let max_no = if self.honour_max_no {
            request.max_no.or(current_max)
        } else {
            current_max
        };
        if self.honour_max_no {
            if let Some(max) = max_no {
                posts.retain(|p| p.no <= max);
            }
        }

        let total = posts.len() as i64;
        let offset = PostPage::offset(request.page, request.page_size).unwrap_or(i64::MAX) as usize;
        let page_posts = posts
            .into_iter()
            .skip(offset)
            .take(request.page_size as usize)
            .collect();

        Ok(PostPage {
            posts: page_posts,
            page: request.page,
            page_size: request.page_size,
            total,
            max_no,
            has_more: PostPage::has_more(request.page, request.page_size, total),
        })
    }

    async fn record_view(&self, no: i64) -> Result<(), ClientError> {
        self.views.lock().unwrap().push(no);
        Ok(())
    }
}
