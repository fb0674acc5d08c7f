//! Types shared by the store, the HTTP contract and the reader client.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub homepage_url: Option<String>,
    pub source_url: Option<String>,
    pub last_synced: Option<String>,
    pub last_error: Option<String>,
}

/// A crawled post. `no` is assigned by the store on first insert, grows strictly
/// and is never reused, so it doubles as an insertion watermark.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub no: i64,
    pub site_id: i64,
    pub site_slug: String,
    pub site_name: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub posted_at: Option<String>,
    pub crawled_at: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    #[default]
    Latest,
    Views,
    Likes,
    Comments,
}

impl FromStr for Sort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(Sort::Latest),
            "views" => Ok(Sort::Views),
            "likes" => Ok(Sort::Likes),
            "comments" => Ok(Sort::Comments),
            other => Err(format!("unknown sort '{}'", other)),
        }
    }
}

impl Sort {
    /// ORDER BY clause. Every order ends on `no DESC` so pages are stable.
    pub fn order_clause(self) -> &'static str {
        match self {
            Sort::Latest => "p.posted_at DESC NULLS LAST, p.no DESC",
            Sort::Views => "p.views DESC, p.no DESC",
            Sort::Likes => "p.likes DESC, p.no DESC",
            Sort::Comments => "p.comments DESC, p.no DESC",
        }
    }
}

/// What the reader is looking at: everything that changes the result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedQuery {
    pub site: Option<String>,
    pub keyword: Option<String>,
    #[serde(default)]
    pub sort: Sort,
}

impl FeedQuery {
    /// Blank filters are treated as absent.
    pub fn normalized(mut self) -> Self {
        self.site = self.site.filter(|s| !s.trim().is_empty());
        self.keyword = self
            .keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: FeedQuery,
    pub page: i64,
    pub page_size: i64,
    pub max_no: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    /// Highest `no` the page set was computed against
    pub max_no: Option<i64>,
    pub has_more: bool,
}

impl PostPage {
    /// Rows skipped before `page`. `None` when the offset does not fit in an i64.
    pub fn offset(page: i64, page_size: i64) -> Option<i64> {
        page.checked_sub(1)?.checked_mul(page_size)
    }

    pub fn has_more(page: i64, page_size: i64, total: i64) -> bool {
        page.checked_mul(page_size).map_or(false, |seen| seen < total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SiteCount {
    pub slug: String,
    pub name: String,
    pub posts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`, UTC
    pub day: String,
    pub posts: i64,
}

/// Admin dashboard data. Charting it is the consumer's business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_posts: i64,
    pub hidden_posts: i64,
    pub sites: Vec<SiteCount>,
    pub daily: Vec<DailyCount>,
    pub top_posts: Vec<Post>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_serde_names() {
        assert_eq!(serde_json::to_string(&Sort::Latest).unwrap(), "\"latest\"");
        let sort: Sort = serde_json::from_str("\"comments\"").unwrap();
        assert_eq!(sort, Sort::Comments);
        assert!(serde_json::from_str::<Sort>("\"random\"").is_err());
    }

    #[test]
    fn test_sort_from_str() {
        assert_eq!("Views".parse::<Sort>(), Ok(Sort::Views));
        assert_eq!(" latest ".parse::<Sort>(), Ok(Sort::Latest));
        assert!("hot".parse::<Sort>().is_err());
    }

    #[test]
    fn test_every_order_breaks_ties_on_no() {
        for sort in [Sort::Latest, Sort::Views, Sort::Likes, Sort::Comments] {
            assert!(sort.order_clause().ends_with("p.no DESC"));
        }
    }

    #[test]
    fn test_normalized_drops_blank_filters() {
        let query = FeedQuery {
            site: Some(" ".to_string()),
            keyword: Some("  rust  ".to_string()),
            sort: Sort::Views,
        }
        .normalized();

        assert_eq!(query.site, None);
        assert_eq!(query.keyword.as_deref(), Some("rust"));
        assert_eq!(query.sort, Sort::Views);

        let empty = FeedQuery {
            keyword: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(empty.keyword, None);
    }

    #[test]
    fn test_has_more() {
        assert!(PostPage::has_more(1, 10, 11));
        assert!(!PostPage::has_more(1, 10, 10));
        assert!(!PostPage::has_more(2, 10, 15));
        assert!(!PostPage::has_more(1, 10, 0));
        assert!(!PostPage::has_more(i64::MAX, 10, 15));
    }

    #[test]
    fn test_offset() {
        assert_eq!(PostPage::offset(1, 10), Some(0));
        assert_eq!(PostPage::offset(3, 10), Some(20));
        assert_eq!(PostPage::offset(i64::MAX, 10), None);
        assert_eq!(PostPage::offset(i64::MIN, 10), None);
    }
}
