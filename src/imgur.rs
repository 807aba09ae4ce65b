use crate::error::{Result, ScraperError};
use crate::http::RetryPolicy;
use crate::record::{ImgurImage, ImgurResponse};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use url::Url;

const IMGUR_API_URL: &str = "https://api.imgur.com";

/// Imgur image id for a submission URL, or `None` when the URL is not hosted
/// on imgur.
pub fn image_id_from_url(url: &str) -> Option<String> {
    let uri = Url::parse(url).ok()?;
    if !uri.host_str()?.contains("imgur.com") {
        return None;
    }
    let base = uri.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let id = match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base,
    };
    (!id.is_empty()).then(|| id.to_string())
}

pub struct ImgurClient {
    client: Client,
    client_id: String,
    base_url: String,
    retry: RetryPolicy,
}

impl ImgurClient {
    pub fn new(client_id: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            client_id: client_id.to_string(),
            base_url: IMGUR_API_URL.to_string(),
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

    pub async fn get_image(&self, image_id: &str) -> Result<ImgurImage> {
        let url = format!("{}/3/image/{}", self.base_url, image_id);
        let auth = format!("Client-ID {}", self.client_id);

        let imgur_error = |message: String| ScraperError::Imgur {
            id: image_id.to_string(),
            message,
        };

        let response = self
            .retry
            .send(&format!("imgur image {}", image_id), || {
                self.client.get(&url).header(AUTHORIZATION, &auth)
            })
            .await
            .map_err(|e| imgur_error(e.to_string()))?;

        let body: ImgurResponse = response
            .json()
            .await
            .map_err(|e| imgur_error(e.to_string()))?;
        if !body.success {
            let reason = body
                .data
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("request unsuccessful");
            return Err(imgur_error(format!("{} (status {})", reason, body.status)));
        }
        serde_json::from_value(body.data).map_err(|e| imgur_error(e.to_string()))
    }
}
