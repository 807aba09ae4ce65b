use crate::db::Database;
use crate::error::Result;
use crate::http::RetryPolicy;
use crate::record::{Image, ImgurImage};
use log::{debug, info};
use reqwest::Client;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// A fully downloaded image that has not been stored yet. Dropping it removes
/// the temporary file.
#[derive(Debug)]
pub struct Download {
    pub file_hash: String,
    pub bytes: u64,
    file: NamedTempFile,
}

/// Downloads images into a directory of content-addressed files.
pub struct ImageStore {
    client: Client,
    images_dir: PathBuf,
    retry: RetryPolicy,
}

impl ImageStore {
    pub fn new(images_dir: &Path) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            images_dir: images_dir.to_path_buf(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Stream `link` into a temporary file next to the final images, hashing
    /// it on the way.
    pub async fn download(&self, link: &str) -> Result<Download> {
        let mut response = self
            .retry
            .send(link, || self.client.get(link))
            .await?;

        fs::create_dir_all(&self.images_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.images_dir)?;
        let mut hasher = Sha1::new();
        let mut bytes = 0u64;

        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk)?;
            bytes += chunk.len() as u64;
        }
        file.flush()?;

        let file_hash = hex::encode(hasher.finalize());
        debug!("Downloaded {} ({} bytes, sha1 {})", link, bytes, file_hash);
        Ok(Download {
            file_hash,
            bytes,
            file,
        })
    }

    /// Return the saved image with the download's hash, or save the download
    /// as a new one. The second value is `true` when a new image was created.
    /// The row is inserted before the file is moved into place, so running
    /// this inside [`Database::in_transaction`] leaves no row for a file that
    /// failed to persist.
    pub fn get_or_create_image(
        &self,
        db: &Database,
        download: Download,
        imgur_image: &ImgurImage,
    ) -> Result<(Image, bool)> {
        if let Some(existing) = db.get_image(&download.file_hash)? {
            debug!("Image {} already saved", existing.file_name());
            return Ok((existing, false));
        }

        let image = Image {
            file_hash: download.file_hash,
            file_ext: imgur_image.file_ext(),
            content_type: imgur_image.content_type.clone(),
            width: imgur_image.width,
            height: imgur_image.height,
            size: imgur_image.size,
        };

        fs::create_dir_all(&self.images_dir)?;
        let path = self.images_dir.join(image.file_name());
        let bytes = download.bytes;
        db.insert_image(&image)?;
        download
            .file
            .persist(&path)
            .map_err(|e| e.error)?;
        info!("Saved image {} ({} bytes)", path.display(), bytes);
        Ok((image, true))
    }
}
