use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wikiscroll::cli::{Cli, Commands};
use wikiscroll::config::{Config, INITIAL_BATCH, NEXT_BATCH};
use wikiscroll::domain::Article;
use wikiscroll::errors::ErrorKind;
use wikiscroll::services::FeedLoader;
use wikiscroll::sources::{spawn_probe, ArticleClient, ConnectivityMonitor, ReqwestTransport};

const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const RECOVERY_WAIT: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wikiscroll=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("loading configuration")?;

    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let client = Arc::new(ArticleClient::new(
        ReqwestTransport::new(),
        monitor.clone(),
        config.fetch.clone(),
    ));

    match cli.command {
        Commands::Fetch { count, json } => cmd_fetch(&client, count, json).await,
        Commands::Scroll { pages, json } => {
            let probe = match config.api_host() {
                Some((host, port)) => {
                    // Seed the flag so a scroll started offline fails as Offline
                    monitor.check(&host, port).await;
                    Some(spawn_probe(monitor.clone(), host, port, PROBE_INTERVAL))
                }
                None => None,
            };
            let loader = FeedLoader::new(client, monitor.as_ref(), config.loader.clone());

            let result = cmd_scroll(&loader, pages, json).await;
            if let Some(probe) = probe {
                probe.abort();
            }
            result
        }
    }
}

async fn cmd_fetch(
    client: &ArticleClient<ReqwestTransport>,
    count: usize,
    json: bool,
) -> anyhow::Result<()> {
    match client.fetch_many(count).await {
        Ok(articles) => {
            let mut out = io::stdout().lock();
            for article in &articles {
                print_article(&mut out, article, json)?;
            }
            Ok(())
        }
        Err(e) => {
            let kind = ErrorKind::from(&e);
            Err(anyhow!("{}: {} ({})", kind.title(), kind.hint(), e))
        }
    }
}

async fn cmd_scroll(
    loader: &FeedLoader<ReqwestTransport>,
    pages: usize,
    json: bool,
) -> anyhow::Result<()> {
    let mut shown = 0;

    for _ in 0..=pages {
        let count = if loader.is_empty() {
            INITIAL_BATCH
        } else {
            NEXT_BATCH
        };
        loader.load_more(count).await;
        shown = print_new(loader, shown, json)?;

        let Some(kind) = loader.error() else {
            continue;
        };
        eprintln!("{}: {} [{}]", kind.title(), kind.hint(), kind.retry_label());

        if kind == ErrorKind::Offline {
            // The loader reloads on its own once the probe sees the network again
            wait_for_recovery(loader).await;
            shown = print_new(loader, shown, json)?;
        }
    }

    println!("{} articles loaded.", loader.len());
    Ok(())
}

async fn wait_for_recovery(loader: &FeedLoader<ReqwestTransport>) {
    let deadline = tokio::time::Instant::now() + RECOVERY_WAIT;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if !loader.is_loading() && loader.error() != Some(ErrorKind::Offline) {
            return;
        }
    }
    tracing::warn!("still offline, moving on");
}

fn print_new(
    loader: &FeedLoader<ReqwestTransport>,
    shown: usize,
    json: bool,
) -> io::Result<usize> {
    let articles = loader.articles();
    let mut out = io::stdout().lock();
    for article in articles.iter().skip(shown) {
        print_article(&mut out, article, json)?;
    }
    Ok(articles.len())
}

fn print_article(out: &mut impl Write, article: &Article, json: bool) -> io::Result<()> {
    if json {
        let line = serde_json::to_string(article).map_err(io::Error::other)?;
        return writeln!(out, "{}", line);
    }

    writeln!(out, "{}", article.title)?;
    if !article.description.is_empty() {
        writeln!(out, "  {}", article.description)?;
    }
    writeln!(out, "  {}", article.extract.trim())?;
    writeln!(out, "  {}", article.url)?;
    writeln!(out)
}
