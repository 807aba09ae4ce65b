use crate::error::{Result, ScraperError};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reddit_scraper")]
#[command(about = "Scrape images from a subreddit")]
#[command(version = "0.1.0")]
pub(crate) struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database file
    #[arg(
        long,
        global = true,
        env = "REDDIT_SCRAPER_DB_PATH",
        default_value = "reddit_scraper.db"
    )]
    pub db: PathBuf,

    /// Directory scraped images are saved to
    #[arg(
        long,
        global = true,
        env = "REDDIT_SCRAPER_IMAGES_DIR",
        default_value = "scraped_images"
    )]
    pub images_dir: PathBuf,

    /// Imgur API client id, required by backfill and scrape
    #[arg(long, global = true, env = "IMGUR_CLIENT_ID", hide_env_values = true)]
    pub imgur_client_id: Option<String>,

    /// User-Agent sent to reddit
    #[arg(
        long,
        global = true,
        env = "REDDIT_SCRAPER_USER_AGENT",
        default_value = "Reddit Scraper Script"
    )]
    pub user_agent: String,

    /// Maximum number of concurrent image lookups and downloads
    #[arg(short, long, global = true, default_value = "4")]
    pub concurrent: usize,

    /// Base delay between retries in milliseconds
    #[arg(short, long, global = true, default_value = "500")]
    pub delay: u64,

    /// Maximum number of retry attempts
    #[arg(short, long, global = true, default_value = "3")]
    pub retries: u32,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// Drop and recreate the database tables
    Initialize,
    /// Save imgur posts from the newest back to <date>
    Backfill {
        #[arg(value_name = "subreddit")]
        subreddit: String,
        /// YYYY-MM-DD (midnight UTC) or an RFC 3339 timestamp
        #[arg(value_name = "date", value_parser = parse_date)]
        date: BackfillDate,
    },
    /// Save imgur posts newer than the latest saved one
    Scrape {
        #[arg(value_name = "subreddit")]
        subreddit: String,
    },
}

/// The `<date>` positional, keeping the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BackfillDate {
    pub raw: String,
    pub at: DateTime<Utc>,
}

pub(crate) fn parse_date(s: &str) -> std::result::Result<BackfillDate, String> {
    let at = if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        day.and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .ok_or_else(|| format!("invalid date `{s}`"))?
    } else {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| format!("expected YYYY-MM-DD or an RFC 3339 timestamp, got `{s}`"))?
    };
    Ok(BackfillDate {
        raw: s.to_string(),
        at,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArgValue {
    Flag(bool),
    Text(Option<String>),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Flag(set) => write!(f, "{set}"),
            ArgValue::Text(Some(value)) => write!(f, "{value:?}"),
            ArgValue::Text(None) => f.write_str("null"),
        }
    }
}

/// Usage-level view of an invocation: every command and positional, keyed the
/// way the usage text names them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Arguments(BTreeMap<&'static str, ArgValue>);

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

impl Args {
    pub fn arguments(&self) -> Arguments {
        let (subreddit, date) = match &self.command {
            Command::Initialize => (None, None),
            Command::Backfill { subreddit, date } => (Some(subreddit.clone()), Some(date.raw.clone())),
            Command::Scrape { subreddit } => (Some(subreddit.clone()), None),
        };

        let mut map = BTreeMap::new();
        map.insert(
            "initialize",
            ArgValue::Flag(matches!(self.command, Command::Initialize)),
        );
        map.insert(
            "backfill",
            ArgValue::Flag(matches!(self.command, Command::Backfill { .. })),
        );
        map.insert(
            "scrape",
            ArgValue::Flag(matches!(self.command, Command::Scrape { .. })),
        );
        map.insert("<subreddit>", ArgValue::Text(subreddit));
        map.insert("<date>", ArgValue::Text(date));
        Arguments(map)
    }

    pub fn imgur_client_id(&self) -> Result<&str> {
        match self.imgur_client_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(ScraperError::Config {
                message: "IMGUR_CLIENT_ID (or --imgur-client-id) must be set to scrape".to_string(),
            }),
        }
    }
}
