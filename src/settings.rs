//! Reader settings and the startup sequence that restores them.
//!
//! Startup is order-sensitive. Persisted settings are restored first, URL
//! parameters are layered on top, and only then is the first page requested,
//! exactly once. [`Bootstrap`] enforces that order.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{FeedQuery, Sort};
use crate::storage::{KeyValueStore, StoreError};

pub const SETTINGS_KEY: &str = "settings";
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    pub sort: Sort,
    pub page_size: i64,
    pub site: Option<String>,
    pub hide_read: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            sort: Sort::default(),
            page_size: DEFAULT_PAGE_SIZE,
            site: None,
            hide_read: false,
        }
    }
}

impl Settings {
    /// Reads persisted settings. Missing or unreadable data yields the defaults.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        let Some(raw) = store.get(SETTINGS_KEY) else {
            return Self::default();
        };

        let mut settings = match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings: {}", e);
                return Self::default();
            }
        };
        if settings.page_size < 1 {
            settings.page_size = DEFAULT_PAGE_SIZE;
        }
        settings
    }

    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        store.set(SETTINGS_KEY, serde_json::to_string(self)?)
    }

    pub fn feed_query(&self) -> FeedQuery {
        FeedQuery {
            site: self.site.clone(),
            keyword: None,
            sort: self.sort,
        }
    }
}

/// Feed parameters carried in a shareable URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UrlParams {
    pub site: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
}

impl UrlParams {
    /// Parses a query string, with or without the leading `?`. Malformed input
    /// is treated as empty.
    pub fn parse(query_string: &str) -> Self {
        let query_string = query_string.trim_start_matches('?');
        serde_urlencoded::from_str(query_string).unwrap_or_else(|e| {
            warn!("Ignoring malformed URL parameters: {}", e);
            Self::default()
        })
    }

    /// Overrides `query` with whatever the URL specifies. An unknown sort is ignored.
    pub fn apply(&self, mut query: FeedQuery) -> FeedQuery {
        if let Some(site) = &self.site {
            query.site = Some(site.clone());
        }
        if let Some(q) = &self.q {
            query.keyword = Some(q.clone());
        }
        if let Some(sort) = &self.sort {
            match sort.parse::<Sort>() {
                Ok(sort) => query.sort = sort,
                Err(e) => debug!("{}", e),
            }
        }
        query.normalized()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Restored,
    Ready,
    Launched,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("cannot {step} during the {phase:?} phase")]
    OutOfOrder { step: &'static str, phase: Phase },
}

#[derive(Debug, Clone)]
pub struct Bootstrap {
    phase: Phase,
    settings: Settings,
    query: FeedQuery,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl Bootstrap {
    pub fn new() -> Self {
        Self {
            phase: Phase::Start,
            settings: Settings::default(),
            query: FeedQuery::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn query(&self) -> &FeedQuery {
        &self.query
    }

    fn require_phase(&self, phase: Phase, step: &'static str) -> Result<(), BootstrapError> {
        if self.phase != phase {
            return Err(BootstrapError::OutOfOrder {
                step,
                phase: self.phase,
            });
        }
        Ok(())
    }

    /// Step 1: restore persisted settings.
    pub fn restore<S: KeyValueStore + ?Sized>(&mut self, store: &S) -> Result<&Settings, BootstrapError> {
        self.require_phase(Phase::Start, "restore settings")?;
        self.settings = Settings::load(store);
        self.query = self.settings.feed_query();
        self.phase = Phase::Restored;
        Ok(&self.settings)
    }

    /// Step 2: layer URL parameters over the restored settings. They shape the
    /// initial query but are never written back to the store.
    pub fn apply_url(&mut self, query_string: &str) -> Result<&FeedQuery, BootstrapError> {
        self.require_phase(Phase::Restored, "apply URL parameters")?;
        self.query = UrlParams::parse(query_string).apply(self.query.clone());
        self.phase = Phase::Ready;
        Ok(&self.query)
    }

    /// Step 3: the query for the first fetch. `Some` exactly once, `None` after.
    pub fn launch(&mut self) -> Result<Option<FeedQuery>, BootstrapError> {
        match self.phase {
            Phase::Ready => {
                self.phase = Phase::Launched;
                Ok(Some(self.query.clone()))
            }
            Phase::Launched => Ok(None),
            phase => Err(BootstrapError::OutOfOrder {
                step: "launch the first fetch",
                phase,
            }),
        }
    }
}
