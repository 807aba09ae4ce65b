use crate::error::{Result, ScraperError};
use log::{error, info, warn};
use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

/// Exponential backoff with jitter, shared by every outbound request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.base_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let jitter = if base > 0 {
            rand::rng().random_range(0..base)
        } else {
            0
        };
        Duration::from_millis(
            2_u64
                .saturating_pow(attempt)
                .saturating_mul(base)
                .saturating_add(jitter),
        )
    }

    /// Send the request built by `build`, retrying rate limits, server errors
    /// and transport failures. Any other non-success status is returned as
    /// [`ScraperError::Status`] without retrying.
    pub async fn send<F>(&self, label: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                info!(
                    "Retrying {} (attempt {}) after {}ms delay",
                    label,
                    attempt + 1,
                    delay.as_millis()
                );
                sleep(delay).await;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if is_retryable(status) && attempt < self.max_retries {
                        warn!("HTTP error {} for {}, retrying...", status, label);
                        attempt += 1;
                        continue;
                    }
                    error!("HTTP error {} for {}", status, label);
                    return Err(ScraperError::Status {
                        url: response.url().to_string(),
                        status,
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!("Request failed for {}, retrying...: {}", label, e);
                        attempt += 1;
                        continue;
                    }
                    error!(
                        "Request failed for {}, max retries reached: {}",
                        label, e
                    );
                    return Err(e.into());
                }
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::cell::Cell;

    #[test]
    fn test_retry_policy_configuration() {
        let policy = RetryPolicy::default().with_delay(2000).with_max_retries(5);
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let policy = RetryPolicy::default().with_delay(100);
        for _ in 0..20 {
            let first = policy.backoff(1);
            assert!(first >= Duration::from_millis(200) && first < Duration::from_millis(300));
            let third = policy.backoff(3);
            assert!(third >= Duration::from_millis(800) && third < Duration::from_millis(900));
        }
        assert_eq!(RetryPolicy::default().with_delay(0).backoff(4), Duration::ZERO);
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::default().with_delay(u64::MAX / 2);
        assert_eq!(policy.backoff(64), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/busy");
                then.status(429);
            })
            .await;

        let client = reqwest::Client::new();
        let url = server.url("/busy");
        let policy = RetryPolicy::default().with_delay(1).with_max_retries(2);
        let result = policy.send("busy", || client.get(&url)).await;

        match result {
            Err(ScraperError::Status { status, .. }) => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS)
            }
            other => panic!("expected status error, got {:?}", other.map(|r| r.status())),
        }
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/gone");
                then.status(404);
            })
            .await;

        let client = reqwest::Client::new();
        let url = server.url("/gone");
        let policy = RetryPolicy::default().with_delay(1).with_max_retries(3);
        assert!(policy.send("gone", || client.get(&url)).await.is_err());
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let server = MockServer::start_async().await;
        let unavailable = server
            .mock_async(|when, then| {
                when.method(GET).path("/unavailable");
                then.status(503);
            })
            .await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok");
                then.status(200).body("fine");
            })
            .await;

        let client = reqwest::Client::new();
        let urls = [server.url("/unavailable"), server.url("/ok")];
        let calls = Cell::new(0);
        let policy = RetryPolicy::default().with_delay(1).with_max_retries(2);
        let response = policy
            .send("flaky", || {
                let n = calls.get();
                calls.set(n + 1);
                client.get(&urls[n.min(1)])
            })
            .await
            .unwrap();

        assert_eq!(response.text().await.unwrap(), "fine");
        assert_eq!(calls.get(), 2);
        unavailable.assert_hits_async(1).await;
        ok.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_transport_error_is_retried_until_success() {
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/", listener.local_addr().unwrap())
        };
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET).path("/ok");
                then.status(200);
            })
            .await;

        let client = reqwest::Client::new();
        let urls = [closed, server.url("/ok")];
        let calls = Cell::new(0);
        let policy = RetryPolicy::default().with_delay(1).with_max_retries(1);
        let response = policy
            .send("refused", || {
                let n = calls.get();
                calls.set(n + 1);
                client.get(&urls[n.min(1)])
            })
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(calls.get(), 2);
        ok.assert_hits_async(1).await;
    }
}
