//! HTTP client for the feed API.
//!
//! [`FeedApi`] is the narrow contract the reader needs; [`ApiClient`] implements
//! it over reqwest and also carries the admin calls used by the dashboard.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{DashboardStats, PageRequest, PostPage, Site};
use crate::routes::{IngestRequest, LoginRequest, LoginResponse, PostsQuery, RefreshStatus};
use crate::syncer::{CrawledPost, IngestReport};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_posts(&self, request: &PageRequest) -> Result<PostPage, ClientError>;

    async fn record_view(&self, no: i64) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("CommunityFeed-Reader/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn sites(&self) -> Result<Vec<Site>, ClientError> {
        let response = self.client.get(self.url("/api/sites")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn login(&self, password: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(self.url("/api/admin/login"))
            .json(&LoginRequest {
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = Self::check(response).await?.json().await?;
        Ok(body.token)
    }

    pub async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/api/admin/logout"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn stats(&self, token: &str, days: i64) -> Result<DashboardStats, ClientError> {
        let response = self
            .client
            .get(self.url("/api/admin/stats"))
            .bearer_auth(token)
            .query(&[("days", days)])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn moderate(&self, token: &str, no: i64, action: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/admin/posts/{}/{}", no, action)))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn hide_post(&self, token: &str, no: i64) -> Result<(), ClientError> {
        self.moderate(token, no, "hide").await
    }

    pub async fn unhide_post(&self, token: &str, no: i64) -> Result<(), ClientError> {
        self.moderate(token, no, "unhide").await
    }

    pub async fn delete_post(&self, token: &str, no: i64) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url(&format!("/api/admin/posts/{}", no)))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn ingest(
        &self,
        token: &str,
        site: &str,
        posts: Vec<CrawledPost>,
    ) -> Result<IngestReport, ClientError> {
        let response = self
            .client
            .post(self.url("/api/admin/ingest"))
            .bearer_auth(token)
            .json(&IngestRequest {
                site: site.to_string(),
                posts,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn refresh_status(&self) -> Result<bool, ClientError> {
        let response = self.client.get(self.url("/refresh/status")).send().await?;
        let status: RefreshStatus = Self::check(response).await?.json().await?;
        Ok(status.refreshing)
    }
}

#[async_trait]
impl FeedApi for ApiClient {
    async fn fetch_posts(&self, request: &PageRequest) -> Result<PostPage, ClientError> {
        let query = PostsQuery {
            site: request.query.site.clone(),
            q: request.query.keyword.clone(),
            sort: Some(request.query.sort),
            page: Some(request.page),
            size: Some(request.page_size),
            max_no: request.max_no,
        };

        let response = self
            .client
            .get(self.url("/api/posts"))
            .query(&query)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn record_view(&self, no: i64) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/posts/{}/view", no)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedQuery, Sort};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn empty_page(page: i64) -> serde_json::Value {
        json!({
            "posts": [],
            "page": page,
            "page_size": 10,
            "total": 0,
            "max_no": null,
            "has_more": false
        })
    }

    #[tokio::test]
    async fn test_fetch_posts_sends_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/posts"))
            .and(query_param("site", "humor"))
            .and(query_param("q", "cat"))
            .and(query_param("sort", "likes"))
            .and(query_param("page", "2"))
            .and(query_param("size", "10"))
            .and(query_param("max_no", "77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(empty_page(2)))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/", server.uri())).unwrap();
        let request = PageRequest {
            query: FeedQuery {
                site: Some("humor".to_string()),
                keyword: Some("cat".to_string()),
                sort: Sort::Likes,
            },
            page: 2,
            page_size: 10,
            max_no: Some(77),
        };

        let page = client.fetch_posts(&request).await.unwrap();
        assert_eq!(page.page, 2);
        assert!(page.posts.is_empty());
    }

    #[tokio::test]
    async fn test_error_body_becomes_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/posts"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "Site 'x' not found" })),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let request = PageRequest {
            query: FeedQuery::default(),
            page: 1,
            page_size: 10,
            max_no: None,
        };

        match client.fetch_posts(&request).await {
            Err(ClientError::Status { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "Site 'x' not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error_kept_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/posts/3/view"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.record_view(3).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_login_and_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/admin/posts/9/hide"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let token = client.login("pw").await.unwrap();
        assert_eq!(token, "abc");
        client.hide_post(&token, 9).await.unwrap();
    }
}
