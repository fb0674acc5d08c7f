use chrono::{DateTime, Duration, Utc};
use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool};

use crate::config::SiteConfig;
use crate::models::{DailyCount, DashboardStats, Post, PostPage, Site, SiteCount, Sort};

const POST_COLUMNS: &str = r#"
    p.no, p.site_id, s.slug AS site_slug, s.name AS site_name, p.source_id,
    p.title, p.url, p.author, p.views, p.likes, p.comments,
    p.posted_at, p.crawled_at, p.hidden
"#;

/// Row filter shared by the count, watermark and page queries.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub site_id: Option<i64>,
    pub keyword: Option<String>,
    pub include_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn no(self) -> i64 {
        match self {
            UpsertOutcome::Inserted(no) | UpsertOutcome::Updated(no) => no,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostSlice {
    pub posts: Vec<Post>,
    pub total: i64,
    pub max_no: Option<i64>,
}

pub struct Database {
    pool: SqlitePool,
}

fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    builder.push(" WHERE 1 = 1");
    if !filter.include_hidden {
        builder.push(" AND p.hidden = 0");
    }
    if let Some(site_id) = filter.site_id {
        builder.push(" AND p.site_id = ").push_bind(site_id);
    }
    if let Some(keyword) = &filter.keyword {
        builder
            .push(" AND p.title LIKE ")
            .push_bind(like_pattern(keyword))
            .push(" ESCAPE '\\'");
    }
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                homepage_url TEXT,
                source_url TEXT,
                last_synced TEXT,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // AUTOINCREMENT keeps `no` from being reused after a delete
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                no INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER NOT NULL REFERENCES sites(id),
                source_id TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                author TEXT,
                views INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                comments INTEGER NOT NULL DEFAULT 0,
                posted_at TEXT,
                crawled_at TEXT NOT NULL,
                hidden INTEGER NOT NULL DEFAULT 0,
                UNIQUE(site_id, source_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_posts_site_posted
            ON posts(site_id, posted_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_crawled ON posts(crawled_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn sync_sites(&self, configs: &[SiteConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO sites (slug, name, homepage_url, source_url)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(slug) DO UPDATE SET
                    name = excluded.name,
                    homepage_url = excluded.homepage_url,
                    source_url = excluded.source_url
                "#,
            )
            .bind(&config.slug)
            .bind(&config.name)
            .bind(&config.homepage_url)
            .bind(&config.source_url)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get_all_sites(&self) -> anyhow::Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>("SELECT * FROM sites ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sites)
    }

    pub async fn get_site_by_slug(&self, slug: &str) -> anyhow::Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(site)
    }

    pub async fn update_site_synced(&self, site_id: i64, error: Option<&str>) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE sites SET last_synced = ?, last_error = ? WHERE id = ?")
            .bind(&now)
            .bind(error)
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts a new post or refreshes the counters of a known one.
    /// An update never touches `no` or `crawled_at`.
    ///
    /// Each statement is atomic on its own, so concurrent upserts of the same
    /// `(site_id, source_id)` settle on a single row: one inserts, the rest update.
    pub async fn upsert_post(&self, site_id: i64, post: &NewPost) -> anyhow::Result<UpsertOutcome> {
        let posted_at = post.posted_at.map(|p| p.to_rfc3339());

        // A row deleted between the two statements sends us round again.
        for _ in 0..3 {
            let result = sqlx::query(
                r#"
                INSERT INTO posts
                    (site_id, source_id, title, url, author, views, likes, comments, posted_at, crawled_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(site_id, source_id) DO NOTHING
                "#,
            )
            .bind(site_id)
            .bind(&post.source_id)
            .bind(&post.title)
            .bind(&post.url)
            .bind(&post.author)
            .bind(post.views)
            .bind(post.likes)
            .bind(post.comments)
            .bind(&posted_at)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(UpsertOutcome::Inserted(result.last_insert_rowid()));
            }

            let updated: Option<(i64,)> = sqlx::query_as(
                r#"
                UPDATE posts
                SET title = ?, url = ?, author = ?, views = ?, likes = ?, comments = ?,
                    posted_at = COALESCE(?, posted_at)
                WHERE site_id = ? AND source_id = ?
                RETURNING no
                "#,
            )
            .bind(&post.title)
            .bind(&post.url)
            .bind(&post.author)
            .bind(post.views)
            .bind(post.likes)
            .bind(post.comments)
            .bind(&posted_at)
            .bind(site_id)
            .bind(&post.source_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((no,)) = updated {
                return Ok(UpsertOutcome::Updated(no));
            }
        }

        anyhow::bail!(
            "post {} on site {} kept disappearing during upsert",
            post.source_id,
            site_id
        )
    }

    /// Returns one page of posts matching `filter`, computed against the
    /// watermark `max_no`. Without a watermark the current highest `no` among
    /// matching rows is used and returned, so later pages can pin to it.
    pub async fn query_posts(
        &self,
        filter: &PostFilter,
        sort: Sort,
        page: i64,
        page_size: i64,
        max_no: Option<i64>,
    ) -> anyhow::Result<PostSlice> {
        let max_no = match max_no {
            Some(no) => Some(no),
            None => {
                let mut builder = QueryBuilder::<Sqlite>::new("SELECT MAX(p.no) FROM posts p");
                push_filters(&mut builder, filter);
                let (max,): (Option<i64>,) =
                    builder.build_query_as().fetch_one(&self.pool).await?;
                max
            }
        };

        let Some(max_no) = max_no else {
            return Ok(PostSlice {
                posts: Vec::new(),
                total: 0,
                max_no: None,
            });
        };

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts p");
        push_filters(&mut count, filter);
        count.push(" AND p.no <= ").push_bind(max_no);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM posts p JOIN sites s ON s.id = p.site_id",
            POST_COLUMNS
        ));
        push_filters(&mut select, filter);
        select.push(" AND p.no <= ").push_bind(max_no);
        select.push(" ORDER BY ").push(sort.order_clause());
        let Some(offset) = PostPage::offset(page, page_size) else {
            anyhow::bail!("page {} of size {} is out of range", page, page_size);
        };
        select
            .push(" LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind(offset);

        let posts = select.build_query_as::<Post>().fetch_all(&self.pool).await?;

        Ok(PostSlice {
            posts,
            total,
            max_no: Some(max_no),
        })
    }

    pub async fn get_post(&self, no: i64) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!(
            "SELECT {} FROM posts p JOIN sites s ON s.id = p.site_id WHERE p.no = ?",
            POST_COLUMNS
        ))
        .bind(no)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    /// Bumps the view counter of a visible post.
    pub async fn record_view(&self, no: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE posts SET views = views + 1 WHERE no = ? AND hidden = 0")
            .bind(no)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_hidden(&self, no: i64, hidden: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE posts SET hidden = ? WHERE no = ?")
            .bind(hidden)
            .bind(no)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_post(&self, no: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE no = ?")
            .bind(no)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn top_posts(&self, limit: i64) -> anyhow::Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {} FROM posts p JOIN sites s ON s.id = p.site_id
            WHERE p.hidden = 0
            ORDER BY p.views DESC, p.no DESC
            LIMIT ?
            "#,
            POST_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Dashboard data covering the last `days` days, today included.
    pub async fn stats(&self, days: i64, top_limit: i64) -> anyhow::Result<DashboardStats> {
        let (total_posts, hidden_posts): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(hidden), 0) FROM posts")
                .fetch_one(&self.pool)
                .await?;

        let sites = sqlx::query_as::<_, SiteCount>(
            r#"
            SELECT s.slug, s.name, COUNT(p.no) AS posts
            FROM sites s LEFT JOIN posts p ON p.site_id = s.id
            GROUP BY s.id
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let Some(start) = Duration::try_days(days.max(1) - 1)
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            anyhow::bail!("{} days is out of range", days);
        };
        let since = start
            .date_naive()
            .format("%Y-%m-%d")
            .to_string();
        let daily = sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT substr(crawled_at, 1, 10) AS day, COUNT(*) AS posts
            FROM posts
            WHERE substr(crawled_at, 1, 10) >= ?
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let top_posts = self.top_posts(top_limit).await?;

        Ok(DashboardStats {
            total_posts,
            hidden_posts,
            sites,
            daily,
            top_posts,
        })
    }
}
