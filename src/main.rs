//! product-archiver command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use product_archiver::{
    ArchiveConfig, Browser, BrowserConfig, Escalation, HttpFetcher, InputSource, ProductArchiver,
    Result, RunOptions, ScrapeRunner, TerminalPrompt, Unattended,
};

const LOG_FILE: &str = "scrape_log.txt";

#[derive(Parser, Debug)]
#[command(name = "product-archiver")]
#[command(about = "Archive product pages: fields, markup, PDF and images", long_about = None)]
struct Cli {
    /// File containing product IDs, or the IDs themselves as text
    #[arg(short, long)]
    input: String,

    /// Directory to save products into (default: products_YYYYMMDD_HHMMSS)
    #[arg(short, long)]
    save_location: Option<PathBuf>,

    /// Process IDs in random order
    #[arg(long)]
    shuffle: bool,

    /// Run Chrome without a window (captcha walls cannot be solved by hand)
    #[arg(long)]
    headless: bool,

    /// Path to the Chrome/Chromium binary
    #[arg(long)]
    chrome_path: Option<String>,

    /// Skip print.pdf
    #[arg(long)]
    no_pdf: bool,

    /// Log failed IDs and keep going instead of stopping the run
    #[arg(long)]
    continue_on_error: bool,
}

fn default_save_location() -> PathBuf {
    PathBuf::from(format!(
        "products_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn init_tracing(save_dir: &Path) {
    let file_appender = tracing_appender::rolling::never(save_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Flushes the file writer on exit
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let save_dir = cli.save_location.unwrap_or_else(default_save_location);
    std::fs::create_dir_all(&save_dir)?;
    let log_existed = save_dir.join(LOG_FILE).exists();

    init_tracing(&save_dir);

    if log_existed {
        tracing::warn!(
            "{} already exists in {}; a fresh directory is recommended",
            LOG_FILE,
            save_dir.display()
        );
    }
    tracing::info!("Saving products to {}", save_dir.display());

    let ids = InputSource::from_arg(&cli.input).extract()?;
    if ids.is_empty() {
        tracing::warn!("No product IDs found in input");
        return Ok(());
    }

    let browser = Browser::launch(BrowserConfig {
        headless: cli.headless,
        chrome_path: cli.chrome_path,
        ..BrowserConfig::default()
    })
    .await?;

    let fetch = match browser.user_agent().await {
        Ok(user_agent) => HttpFetcher::with_user_agent(&user_agent)?,
        Err(e) => {
            tracing::warn!("Could not read browser user agent: {}", e);
            HttpFetcher::new()?
        }
    };

    let escalation: Arc<dyn Escalation> = if cli.headless {
        Arc::new(Unattended)
    } else {
        Arc::new(TerminalPrompt)
    };

    let config = ArchiveConfig {
        save_pdf: !cli.no_pdf,
        ..ArchiveConfig::default()
    };
    tracing::debug!(
        "Worst-case readiness wait per product: {:?}",
        config.worst_case_readiness()
    );

    let archiver = ProductArchiver::new(config, Arc::new(fetch), escalation);
    let options = RunOptions {
        shuffle: cli.shuffle,
        continue_on_error: cli.continue_on_error,
    };

    let summary = ScrapeRunner::new(browser, archiver, &save_dir, options)
        .run(ids)
        .await?;

    if !summary.failed.is_empty() {
        tracing::warn!("{} product(s) failed: {:?}", summary.failed.len(), summary.failed);
    }
    Ok(())
}
