use async_trait::async_trait;
use feedwake_common::{AgentStatus, BackendType, Comment, Feed, Page, Post};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::{FeedApi, ListQuery};
use crate::errors::FeedError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("feedwake/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct Identity {
    name: String,
}

/// reqwest-backed [`FeedApi`].
#[derive(Debug, Clone)]
pub struct FeedClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl FeedClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, FeedError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(FeedError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| FeedError::Transport {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FeedError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|source| FeedError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = self.url(path);
        let resp = self.send(&url, self.http.get(&url).query(query)).await?;
        resp.json::<T>().await.map_err(|source| FeedError::Decode { url, source })
    }

    async fn put_json(&self, path: &str, body: serde_json::Value) -> Result<(), FeedError> {
        let url = self.url(path);
        self.send(&url, self.http.put(&url).json(&body)).await?;
        Ok(())
    }
}

fn query_pairs(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(cursor) = &query.cursor {
        pairs.push(("cursor", cursor.clone()));
    }
    if let Some(since) = query.since {
        pairs.push(("since", since.to_rfc3339()));
    }
    if let Some(author_type) = query.author_type {
        pairs.push(("author_type", author_type.as_str().to_string()));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit", limit.to_string()));
    }
    pairs
}

/// Percent-encode a path segment. Ids are normally URL-safe already.
fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl FeedApi for FeedClient {
    async fn list_feeds(&self) -> Result<Vec<Feed>, FeedError> {
        self.get_json("/api/feeds", &[]).await
    }

    async fn list_posts(&self, feed_id: &str, query: &ListQuery) -> Result<Page<Post>, FeedError> {
        let path = format!("/api/feeds/{}/posts", segment(feed_id));
        self.get_json(&path, &query_pairs(query)).await
    }

    async fn list_comments(
        &self,
        post_id: &str,
        query: &ListQuery,
    ) -> Result<Page<Comment>, FeedError> {
        let path = format!("/api/posts/{}/comments", segment(post_id));
        self.get_json(&path, &query_pairs(query)).await
    }

    async fn set_status(
        &self,
        identity: &str,
        status: AgentStatus,
        post_id: Option<&str>,
    ) -> Result<(), FeedError> {
        let path = format!("/api/agents/{}/status", segment(identity));
        self.put_json(&path, json!({ "status": status, "post_id": post_id }))
            .await
    }

    async fn report_session(
        &self,
        identity: &str,
        session_name: &str,
        backend: BackendType,
        session_id: &str,
    ) -> Result<(), FeedError> {
        let path = format!(
            "/api/agents/{}/sessions/{}",
            segment(identity),
            segment(session_name)
        );
        self.put_json(&path, json!({ "backend": backend, "session_id": session_id }))
            .await
    }

    async fn whoami(&self, backend: BackendType) -> Result<String, FeedError> {
        let identity: Identity = self
            .get_json("/api/me", &[("backend", backend.as_str().to_string())])
            .await?;
        Ok(identity.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use feedwake_common::AuthorType;

    #[test]
    fn test_new_rejects_non_http_url() {
        let err = FeedClient::new("ftp://feed", None).unwrap_err();
        assert!(matches!(err, FeedError::InvalidUrl(_)));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = FeedClient::new("http://localhost:3000/", Some("t".into())).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.token(), Some("t"));
    }

    #[test]
    fn test_query_pairs_include_filters() {
        let since = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let query = ListQuery {
            cursor: Some("abc".into()),
            since: Some(since),
            author_type: Some(AuthorType::Human),
            limit: Some(10),
        };
        let pairs = query_pairs(&query);
        assert_eq!(pairs[0], ("cursor", "abc".to_string()));
        assert_eq!(pairs[1].0, "since");
        assert!(pairs[1].1.starts_with("2026-01-02T03:04:05"));
        assert_eq!(pairs[2], ("author_type", "human".to_string()));
        assert_eq!(pairs[3], ("limit", "10".to_string()));
        assert!(query_pairs(&ListQuery::default()).is_empty());
    }

    #[test]
    fn test_segment_escapes_reserved_characters() {
        assert_eq!(segment("post-1_a.b~"), "post-1_a.b~");
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
        assert_eq!(segment("claude?x=1#frag"), "claude%3Fx%3D1%23frag");
        assert_eq!(segment("café"), "caf%C3%A9");
    }
}
