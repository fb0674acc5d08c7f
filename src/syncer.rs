use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::{Database, NewPost, UpsertOutcome};
use crate::models::Site;

/// One entry of a crawler export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledPost {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub struct Syncer {
    client: Client,
    db: Arc<Database>,
    refreshing: Arc<RwLock<bool>>,
}

impl Syncer {
    pub fn new(db: Arc<Database>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("CommunityFeed/1.0 (Aggregator)")
            .build()?;

        Ok(Self {
            client,
            db,
            refreshing: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    pub async fn refresh_all_sites(&self) -> anyhow::Result<()> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(());
            }
            *refreshing = true;
        }

        let result = self.do_refresh_all().await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result
    }

    async fn do_refresh_all(&self) -> anyhow::Result<()> {
        let sites = self.db.get_all_sites().await?;
        let sites: Vec<Site> = sites.into_iter().filter(|s| s.source_url.is_some()).collect();
        info!("Refreshing {} sites", sites.len());

        for site in sites {
            match self.refresh_site(&site).await {
                Ok(report) => {
                    info!(
                        "Site '{}': {} new, {} updated, {} skipped",
                        site.slug, report.inserted, report.updated, report.skipped
                    );
                    let _ = self.db.update_site_synced(site.id, None).await;
                }
                Err(e) => {
                    error!("Failed to refresh site '{}': {}", site.slug, e);
                    let _ = self
                        .db
                        .update_site_synced(site.id, Some(&e.to_string()))
                        .await;
                }
            }
        }

        info!("Site refresh complete");
        Ok(())
    }

    async fn refresh_site(&self, site: &Site) -> anyhow::Result<IngestReport> {
        let Some(source_url) = site.source_url.as_deref() else {
            return Ok(IngestReport::default());
        };
        info!("Fetching crawler export: {} ({})", site.slug, source_url);

        let posts: Vec<CrawledPost> = self
            .client
            .get(source_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        ingest(&self.db, site, &posts).await
    }
}

/// Upserts crawled posts into `site`. Entries missing a title or url are skipped.
pub async fn ingest(db: &Database, site: &Site, posts: &[CrawledPost]) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();

    for post in posts {
        let title = post.title.trim();
        let url = post.url.trim();
        if title.is_empty() || url.is_empty() || post.id.is_empty() {
            warn!("Skipping incomplete post '{}' from {}", post.id, site.slug);
            report.skipped += 1;
            continue;
        }

        let new_post = NewPost {
            source_id: post.id.clone(),
            title: title.to_string(),
            url: url.to_string(),
            author: post.author.clone(),
            views: post.views.max(0),
            likes: post.likes.max(0),
            comments: post.comments.max(0),
            posted_at: post.posted_at,
        };

        match db.upsert_post(site.id, &new_post).await? {
            UpsertOutcome::Inserted(_) => report.inserted += 1,
            UpsertOutcome::Updated(_) => report.updated += 1,
        }
    }

    Ok(report)
}

pub async fn start_background_refresh(syncer: Arc<Syncer>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    info!("Starting initial site sync");
    if let Err(e) = syncer.refresh_all_sites().await {
        error!("Initial site sync failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled site sync");
        if let Err(e) = syncer.refresh_all_sites().await {
            error!("Scheduled site sync failed: {}", e);
        }
    }
}
