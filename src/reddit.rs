use crate::error::{Result, ScraperError};
use crate::http::RetryPolicy;
use crate::record::{Listing, Submission};
use log::debug;
use reqwest::Client;
use std::time::Duration;
use url::Url;

pub const PAGINATION_LIMIT: usize = 25;

const REDDIT_BASE_URL: &str = "https://www.reddit.com";

/// Where a `/new` listing page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Start,
    /// Posts older than the named one.
    After(String),
    /// Posts newer than the named one.
    Before(String),
}

pub struct RedditClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl RedditClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: REDDIT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch one page of a subreddit's newest submissions, newest first.
    ///
    /// `count` is the number of listing items already seen, which reddit uses
    /// to keep page boundaries stable.
    pub async fn fetch_new(
        &self,
        subreddit: &str,
        cursor: &Cursor,
        count: usize,
    ) -> Result<Vec<Submission>> {
        let url = listing_url(&self.base_url, subreddit)?;
        let mut query = vec![
            ("limit", PAGINATION_LIMIT.to_string()),
            ("count", count.to_string()),
        ];
        match cursor {
            Cursor::Start => {}
            Cursor::After(name) => query.push(("after", name.clone())),
            Cursor::Before(name) => query.push(("before", name.clone())),
        }

        let label = format!("r/{} {:?}", subreddit, cursor);
        let response = self
            .retry
            .send(&label, || self.client.get(url.clone()).query(&query))
            .await?;
        let listing: Listing = response.json().await?;

        debug!(
            "Fetched {} submissions for {} (next after: {:?})",
            listing.data.children.len(),
            label,
            listing.data.after
        );
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data)
            .collect())
    }
}

/// `{base}/r/{subreddit}/new.json`, with the subreddit encoded as a single
/// path segment.
fn listing_url(base_url: &str, subreddit: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| ScraperError::Config {
            message: format!("reddit base URL {} cannot hold a path", base_url),
        })?
        .pop_if_empty()
        .extend(["r", subreddit, "new.json"]);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> RedditClient {
        RedditClient::new("test-agent")
            .unwrap()
            .with_base_url(&server.base_url())
            .with_retry(RetryPolicy::default().with_delay(1).with_max_retries(2))
    }

    fn listing(names: &[&str]) -> serde_json::Value {
        let children: Vec<_> = names
            .iter()
            .map(|name| {
                json!({"kind": "t3", "data": {
                    "name": name,
                    "url": format!("https://i.imgur.com/{}.jpg", name),
                    "created_utc": 1461110400.0
                }})
            })
            .collect();
        json!({"kind": "Listing", "data": {"children": children, "after": names.last()}})
    }

    #[test]
    fn test_listing_url_encodes_subreddit() {
        assert_eq!(
            listing_url("https://www.reddit.com", "earthporn").unwrap().as_str(),
            "https://www.reddit.com/r/earthporn/new.json"
        );
        assert_eq!(
            listing_url("http://127.0.0.1:8080", "pics/../x").unwrap().as_str(),
            "http://127.0.0.1:8080/r/pics%2F..%2Fx/new.json"
        );
        assert_eq!(
            listing_url("http://localhost/proxy", "pics").unwrap().as_str(),
            "http://localhost/proxy/r/pics/new.json"
        );
        assert!(listing_url("mailto:someone", "pics").is_err());
    }

    #[tokio::test]
    async fn test_fetch_first_page() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/r/pics/new.json")
                    .query_param("limit", "25")
                    .query_param("count", "0")
                    .header("user-agent", "test-agent");
                then.status(200).json_body(listing(&["t3_b", "t3_a"]));
            })
            .await;

        let submissions = client(&server)
            .fetch_new("pics", &Cursor::Start, 0)
            .await
            .unwrap();

        mock.assert_async().await;
        let names: Vec<_> = submissions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["t3_b", "t3_a"]);
    }

    #[tokio::test]
    async fn test_fetch_with_cursors() {
        let server = MockServer::start_async().await;
        let after = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/r/pics/new.json")
                    .query_param("after", "t3_a")
                    .query_param("count", "25");
                then.status(200).json_body(listing(&["t3_0"]));
            })
            .await;
        let before = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/r/pics/new.json")
                    .query_param("before", "t3_a")
                    .query_param("count", "0");
                then.status(200).json_body(listing(&[]));
            })
            .await;

        let reddit = client(&server);
        let older = reddit
            .fetch_new("pics", &Cursor::After("t3_a".to_string()), 25)
            .await
            .unwrap();
        let newer = reddit
            .fetch_new("pics", &Cursor::Before("t3_a".to_string()), 0)
            .await
            .unwrap();

        after.assert_async().await;
        before.assert_async().await;
        assert_eq!(older.len(), 1);
        assert!(newer.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_listing_fails_after_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/r/pics/new.json");
                then.status(429);
            })
            .await;

        let result = client(&server).fetch_new("pics", &Cursor::Start, 0).await;
        assert!(result.is_err());
        mock.assert_hits_async(3).await;
    }
}
