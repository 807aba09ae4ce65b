use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A saved reddit post and the image it links to.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub name: String,
    pub image_file_hash: String,
    pub subreddit_name: String,
    pub submitted: DateTime<Utc>,
    pub enacted: bool,
}

/// A downloaded image, keyed by the SHA-1 of its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub file_hash: String,
    pub file_ext: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

impl Image {
    pub fn file_name(&self) -> String {
        format!("{}{}", self.file_hash, self.file_ext)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    pub children: Vec<Thing>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    pub data: Submission,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    /// Fullname, e.g. `t3_4fp33k`.
    pub name: String,
    #[serde(default)]
    pub url: String,
    pub created_utc: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub permalink: String,
}

impl Submission {
    pub fn created(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created_utc as i64, 0).unwrap_or_default()
    }
}

/// Imgur's response envelope. `data` is an image on success and an
/// `{error, request, method}` object otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct ImgurResponse {
    pub data: serde_json::Value,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImgurImage {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub link: String,
}

impl ImgurImage {
    /// Extension of the link's last path segment, dot included.
    pub fn file_ext(&self) -> String {
        let path = url::Url::parse(&self.link)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.link.clone());
        let base = path.rsplit('/').next().unwrap_or_default();
        match base.rfind('.') {
            Some(idx) if idx > 0 => base[idx..].to_string(),
            _ => String::new(),
        }
    }
}
