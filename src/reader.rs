//! The reader client: persisted settings, read history and the paginated feed
//! behind one handle.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{ClientError, FeedApi};
use crate::models::{FeedQuery, Post, Sort};
use crate::pagination::{ApplyOutcome, FeedSession};
use crate::reads::{ReadTracker, DEFAULT_CAPACITY};
use crate::settings::{Bootstrap, BootstrapError, Phase, Settings, Theme};
use crate::storage::{KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

pub type Loaded = Result<Option<ApplyOutcome>, ReaderError>;

pub struct Reader<S: KeyValueStore, A: FeedApi> {
    store: S,
    api: A,
    bootstrap: Bootstrap,
    settings: Settings,
    session: FeedSession,
    reads: ReadTracker,
    read_capacity: usize,
}

impl<S: KeyValueStore, A: FeedApi> Reader<S, A> {
    pub fn new(store: S, api: A) -> Self {
        Self::with_read_capacity(store, api, DEFAULT_CAPACITY)
    }

    pub fn with_read_capacity(store: S, api: A, read_capacity: usize) -> Self {
        let settings = Settings::default();
        let session = FeedSession::new(FeedQuery::default(), settings.page_size);
        Self {
            store,
            api,
            bootstrap: Bootstrap::new(),
            settings,
            session,
            reads: ReadTracker::new(read_capacity),
            read_capacity,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &FeedSession {
        &self.session
    }

    pub fn reads(&self) -> &ReadTracker {
        &self.reads
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn is_started(&self) -> bool {
        self.bootstrap.phase() == Phase::Launched
    }

    /// Restores settings and read history, layers `url_query` on top and
    /// fetches the first page. Only the first call does anything.
    pub async fn start(&mut self, url_query: &str) -> Loaded {
        if self.bootstrap.phase() != Phase::Start {
            debug!("Reader already started, ignoring start");
            return Ok(None);
        }

        self.settings = self.bootstrap.restore(&self.store)?.clone();
        self.reads = ReadTracker::load(&self.store, self.read_capacity);
        self.bootstrap.apply_url(url_query)?;

        let Some(query) = self.bootstrap.launch()? else {
            return Ok(None);
        };
        info!(
            "Starting feed: site={:?} keyword={:?} sort={:?}",
            query.site, query.keyword, query.sort
        );
        self.session = FeedSession::new(query, self.settings.page_size);
        Ok(self.session.load_more(&self.api).await?)
    }

    fn ensure_started(&self, step: &'static str) -> Result<(), ReaderError> {
        if !self.is_started() {
            return Err(BootstrapError::OutOfOrder {
                step,
                phase: self.bootstrap.phase(),
            }
            .into());
        }
        Ok(())
    }

    pub async fn load_more(&mut self) -> Loaded {
        self.ensure_started("load more posts")?;
        Ok(self.session.load_more(&self.api).await?)
    }

    async fn restart(&mut self, query: FeedQuery) -> Loaded {
        self.session.reset(query.normalized());
        Ok(self.session.load_more(&self.api).await?)
    }

    /// All loaded posts, minus read ones when `hide_read` is on.
    pub fn visible_posts(&self) -> Vec<&Post> {
        self.session
            .posts()
            .iter()
            .filter(|p| !(self.settings.hide_read && self.reads.is_read(p.no)))
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.reads.unread_count(self.session.posts())
    }

    /// Marks `no` read and counts a view. Returns true when it was unread.
    /// A failed view count is logged and otherwise ignored.
    pub async fn open(&mut self, no: i64) -> Result<bool, ReaderError> {
        let newly_read = self.reads.mark_read(&mut self.store, no)?;
        if let Err(e) = self.api.record_view(no).await {
            warn!("Failed to record view for post {}: {}", no, e);
        }
        Ok(newly_read)
    }

    pub fn mark_all_read(&mut self) -> Result<usize, ReaderError> {
        Ok(self.reads.mark_all(&mut self.store, self.session.posts())?)
    }

    pub fn clear_reads(&mut self) -> Result<(), ReaderError> {
        Ok(self.reads.clear(&mut self.store)?)
    }

    pub async fn set_sort(&mut self, sort: Sort) -> Loaded {
        self.ensure_started("change the sort")?;
        self.settings.sort = sort;
        self.settings.save(&mut self.store)?;

        let query = FeedQuery {
            sort,
            ..self.session.query().clone()
        };
        self.restart(query).await
    }

    pub async fn set_site(&mut self, site: Option<&str>) -> Loaded {
        self.ensure_started("change the site")?;
        self.settings.site = site.map(str::to_string).filter(|s| !s.trim().is_empty());
        self.settings.save(&mut self.store)?;

        let query = FeedQuery {
            site: self.settings.site.clone(),
            ..self.session.query().clone()
        };
        self.restart(query).await
    }

    /// Searches within the current site and sort. Keywords are not persisted.
    pub async fn search(&mut self, keyword: &str) -> Loaded {
        self.ensure_started("search")?;
        let query = FeedQuery {
            keyword: Some(keyword.to_string()),
            ..self.session.query().clone()
        };
        self.restart(query).await
    }

    pub async fn set_page_size(&mut self, page_size: i64) -> Loaded {
        self.ensure_started("change the page size")?;
        self.settings.page_size = page_size.max(1);
        self.settings.save(&mut self.store)?;
        self.session.set_page_size(self.settings.page_size);
        Ok(self.session.load_more(&self.api).await?)
    }

    pub fn set_hide_read(&mut self, hide_read: bool) -> Result<(), ReaderError> {
        self.settings.hide_read = hide_read;
        Ok(self.settings.save(&mut self.store)?)
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, ReaderError> {
        self.settings.theme = self.settings.theme.toggled();
        self.settings.save(&mut self.store)?;
        Ok(self.settings.theme)
    }
}
