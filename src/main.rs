mod db;
mod error;
mod http;
mod imgur;
mod parse;
mod record;
mod reddit;
mod scraper;
mod store;
mod util;

use crate::db::Database;
use crate::error::Result;
use crate::http::RetryPolicy;
use crate::imgur::ImgurClient;
use crate::parse::{Args, Command};
use crate::reddit::RedditClient;
use crate::scraper::{RedditImageScraper, ScrapeSummary};
use crate::store::ImageStore;
use crate::util::print_hms;
use clap::Parser;
use log::{error, info};
use std::time::Instant;

pub fn print_summary(subreddit: &str, summary: &ScrapeSummary, total_posts: u64) {
    println!("\nSummary for r/{}:", subreddit);
    println!("Submissions seen: {}", summary.seen);
    println!("Posts saved: {}", summary.saved);
    println!("New images: {}", summary.new_images);
    println!("Already saved: {}", summary.already_saved);
    println!("Not from imgur: {}", summary.not_imgur);
    println!("Failed: {}", summary.failed);
    println!("Total saved posts: {}", total_posts);
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn build_scraper(args: &Args, db: Database) -> Result<RedditImageScraper> {
    let retry = RetryPolicy::default()
        .with_delay(args.delay)
        .with_max_retries(args.retries);

    let reddit = RedditClient::new(&args.user_agent)?.with_retry(retry);
    let imgur = ImgurClient::new(args.imgur_client_id()?)?.with_retry(retry);
    let store = ImageStore::new(&args.images_dir)?.with_retry(retry);
    info!("Saving images to {}", store.images_dir().display());

    Ok(RedditImageScraper::new(db, reddit, imgur, store).with_max_concurrent(args.concurrent))
}

async fn run(args: &Args) -> Result<()> {
    let db = Database::open(&args.db)?;

    let (subreddit, scraper, summary) = match &args.command {
        Command::Initialize => {
            db.initialize()?;
            println!("Initialized database {}", args.db.display());
            return Ok(());
        }
        Command::Backfill { subreddit, date } => {
            db.ensure_initialized()?;
            let scraper = build_scraper(args, db)?;
            let summary = scraper.backfill(subreddit, date.at).await?;
            (subreddit, scraper, summary)
        }
        Command::Scrape { subreddit } => {
            db.ensure_initialized()?;
            let scraper = build_scraper(args, db)?;
            let summary = scraper.scrape(subreddit).await?;
            (subreddit, scraper, summary)
        }
    };

    let subreddit = subreddit.to_lowercase();
    let total_posts = scraper.database().post_count(&subreddit)?;
    info!(
        "r/{}: saved {} of {} submissions ({} failed)",
        subreddit, summary.saved, summary.seen, summary.failed
    );
    print_summary(&subreddit, &summary, total_posts);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    println!("{}", args.arguments());

    let start = Instant::now();
    if let Err(e) = run(&args).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
    print_hms(&start);
}
