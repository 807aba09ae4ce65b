use crate::db::Database;
use crate::error::{Result, ScraperError};
use crate::imgur::{ImgurClient, image_id_from_url};
use crate::record::{ImgurImage, Post, Submission};
use crate::reddit::{Cursor, RedditClient};
use crate::store::{Download, ImageStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::time::Duration;

/// Per-run counters, one increment per submission looked at.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub seen: usize,
    pub saved: usize,
    pub already_saved: usize,
    pub not_imgur: usize,
    pub failed: usize,
    pub new_images: usize,
}

pub struct RedditImageScraper {
    db: Database,
    reddit: RedditClient,
    imgur: ImgurClient,
    store: ImageStore,
    pub(crate) max_concurrent: usize,
}

impl RedditImageScraper {
    pub fn new(db: Database, reddit: RedditClient, imgur: ImgurClient, store: ImageStore) -> Self {
        Self {
            db,
            reddit,
            imgur,
            store,
            max_concurrent: 4,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Save imgur posts from the newest submission back to `until`.
    pub async fn backfill(&self, subreddit: &str, until: DateTime<Utc>) -> Result<ScrapeSummary> {
        let subreddit = subreddit.to_lowercase();
        info!("Backfilling {} to {}", subreddit, until);

        let progress = spinner(&format!("Backfilling r/{}", subreddit));
        let mut summary = ScrapeSummary::default();
        let mut cursor = Cursor::Start;
        let mut count = 0;

        loop {
            let page = self.reddit.fetch_new(&subreddit, &cursor, count).await?;
            let Some(last) = page.last() else {
                info!("No more submissions in r/{}", subreddit);
                break;
            };
            let next = Cursor::After(last.name.clone());
            count += page.len();

            let cutoff = page.iter().position(|s| s.created() < until);
            let eligible = match cutoff {
                Some(idx) => page[..idx].to_vec(),
                None => page,
            };
            self.process_page(&subreddit, eligible, &mut summary).await?;
            progress.set_message(format!(
                "r/{}: {} seen, {} saved",
                subreddit, summary.seen, summary.saved
            ));

            if cutoff.is_some() {
                info!("Backfill complete...");
                break;
            }
            cursor = next;
        }

        progress.finish_and_clear();
        Ok(summary)
    }

    /// Save imgur posts submitted after the newest saved post, oldest first.
    pub async fn scrape(&self, subreddit: &str) -> Result<ScrapeSummary> {
        let subreddit = subreddit.to_lowercase();
        let latest = self
            .db
            .latest_post(&subreddit)?
            .ok_or_else(|| ScraperError::NoBackfill {
                subreddit: subreddit.clone(),
            })?;
        info!(
            "Scraping r/{} for posts newer than {} ({})",
            subreddit, latest.name, latest.submitted
        );

        let progress = spinner(&format!("Scraping r/{}", subreddit));
        let mut summary = ScrapeSummary::default();
        let mut cursor = Cursor::Before(latest.name);
        let mut count = 0;

        loop {
            let page = self.reddit.fetch_new(&subreddit, &cursor, count).await?;
            let Some(newest) = page.first() else {
                break;
            };
            let next = Cursor::Before(newest.name.clone());
            count += page.len();

            let oldest_first: Vec<_> = page.into_iter().rev().collect();
            self.process_page(&subreddit, oldest_first, &mut summary).await?;
            progress.set_message(format!(
                "r/{}: {} seen, {} saved",
                subreddit, summary.seen, summary.saved
            ));
            cursor = next;
        }

        progress.finish_and_clear();
        info!("Subreddit {} up to date...", subreddit);
        Ok(summary)
    }

    /// Filter a page down to unsaved imgur submissions, fetch their images
    /// concurrently, then save them one by one in page order.
    async fn process_page(
        &self,
        subreddit: &str,
        submissions: Vec<Submission>,
        summary: &mut ScrapeSummary,
    ) -> Result<()> {
        let mut candidates = Vec::new();
        for submission in submissions {
            summary.seen += 1;
            if self.db.get_post(&submission.name)?.is_some() {
                info!("Post {} already saved...", submission.name);
                summary.already_saved += 1;
                continue;
            }
            match image_id_from_url(&submission.url) {
                Some(image_id) => {
                    debug!(
                        "Queued {} \"{}\" {} (imgur {})",
                        submission.name, submission.title, submission.permalink, image_id
                    );
                    candidates.push((submission, image_id))
                }
                None => {
                    info!("Submission {} not from imgur, skipping...", submission.name);
                    summary.not_imgur += 1;
                }
            }
        }

        let fetched: Vec<_> = stream::iter(candidates)
            .map(|(submission, image_id)| async move {
                let result = self.fetch_image(&submission, &image_id).await;
                (submission, result)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        for (submission, result) in fetched {
            match result {
                Ok((imgur_image, download)) => {
                    self.save(subreddit, &submission, &imgur_image, download, summary)?
                }
                Err(e) => {
                    warn!("Skipping {}: {}", submission.name, e);
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn fetch_image(
        &self,
        submission: &Submission,
        image_id: &str,
    ) -> Result<(ImgurImage, Download)> {
        let imgur_image = self.imgur.get_image(image_id).await?;
        debug!(
            "Imgur {} is {} {}x{}",
            imgur_image.id, imgur_image.content_type, imgur_image.width, imgur_image.height
        );
        info!(
            "Downloading image for post: {} - Submitted {}",
            submission.name,
            submission.created()
        );
        let download = self.store.download(&imgur_image.link).await?;
        Ok((imgur_image, download))
    }

    fn save(
        &self,
        subreddit: &str,
        submission: &Submission,
        imgur_image: &ImgurImage,
        download: Download,
        summary: &mut ScrapeSummary,
    ) -> Result<()> {
        // Image and post rows of one submission commit together.
        let (created, saved) = self.db.in_transaction(|db| {
            let (image, created) = self.store.get_or_create_image(db, download, imgur_image)?;
            let post = Post {
                name: submission.name.clone(),
                image_file_hash: image.file_hash,
                subreddit_name: subreddit.to_string(),
                submitted: submission.created(),
                enacted: false,
            };
            Ok((created, db.insert_post(&post)?))
        })?;

        if created {
            summary.new_images += 1;
        }
        if saved {
            info!("Saving post {}", submission.name);
            summary.saved += 1;
        } else {
            info!("Post {} already saved...", submission.name);
            summary.already_saved += 1;
        }
        Ok(())
    }
}

fn spinner(message: &str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message.to_string());
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}
