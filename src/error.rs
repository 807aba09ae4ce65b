use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("could not get image {id} from imgur: {message}")]
    Imgur { id: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("configuration error: {message}")]
    Config { message: String },

    /// Scraping needs a newest saved post to page forward from.
    #[error("no scraped posts for r/{subreddit}, you must backfill first")]
    NoBackfill { subreddit: String },
}

pub type Result<T> = std::result::Result<T, ScraperError>;
