//! `chatvault cache` - ingest channels into the Parquet dataset

use std::sync::Arc;

use anyhow::{Context, Result};
use chatvault_core::cache::UserCache;
use chatvault_core::client::{HttpChatClient, RateLimitedClient};
use chatvault_core::enrich::{EnrichmentCoordinator, HttpIssueClient};
use chatvault_core::fetcher::MessageFetcher;
use chatvault_core::store::ParquetWriter;
use chatvault_core::window::{is_valid_date, today, TimeWindow};
use chatvault_core::{
    CacheCoordinator, CacheOptions, CacheRunResult, ChatCredentials, Config, Error,
    IssueCredentials, Channel,
};
use indicatif::{ProgressBar, ProgressStyle};

use super::CacheArgs;

pub async fn run(args: CacheArgs) -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = chatvault_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("chatvault cache starting");

    let channels = resolve_channels(&args, &config)?;
    let ticket_date = match &args.date {
        Some(date) if !is_valid_date(date) => {
            return Err(Error::Config(format!("invalid --date: {date} (expected YYYY-MM-DD)")).into())
        }
        Some(date) => date.clone(),
        None => today(),
    };

    let credentials = ChatCredentials::from_env()?;
    let client = Arc::new(RateLimitedClient::new(HttpChatClient::new(&credentials)?));
    let fetcher = MessageFetcher::new(client, Arc::new(UserCache::new()));
    let writer = ParquetWriter::new(&args.cache_path);

    println!("📦 Caching {} channel(s)", channels.len());
    println!("   Time window: {} days, {} hours", args.days, args.hours);
    println!("   Cache path: {}", args.cache_path.display());
    println!(
        "   Ticket enrichment: {}",
        if args.enrich_tickets { "enabled" } else { "disabled" }
    );
    println!();

    let options = CacheOptions {
        window: TimeWindow::last(args.days, args.hours),
        ticket_date,
    };

    let result = if args.enrich_tickets {
        let issue_credentials = IssueCredentials::from_env(config.jira.server.as_deref())?;
        let enricher = EnrichmentCoordinator::new(Arc::new(HttpIssueClient::new(&issue_credentials)?));
        let coordinator = CacheCoordinator::with_enrichment(fetcher, writer, enricher);
        run_with_progress(&coordinator, &channels, &options).await?
    } else {
        let coordinator = CacheCoordinator::new(fetcher, writer);
        run_with_progress(&coordinator, &channels, &options).await?
    };

    print_cache_result(&result);

    tracing::info!(summary = %result.summary_line(), "chatvault cache complete");

    // Partial success still exits 0; a run where nothing was ingested and
    // errors occurred is a failure.
    if result.channels_processed == 0 && !result.errors.is_empty() {
        let (entity, error) = &result.errors[0];
        anyhow::bail!("cache run failed ({entity}: {error})");
    }
    Ok(())
}

fn resolve_channels(args: &CacheArgs, config: &Config) -> Result<Vec<Channel>> {
    if !args.channels.is_empty() {
        let channels: Vec<Channel> = args.channels.iter().map(Channel::from_id).collect();
        println!("Using {} channel(s) from CLI arguments", channels.len());
        return Ok(channels);
    }

    let channels = config.default_channels();
    if channels.is_empty() {
        return Err(Error::Config(
            "no channels: pass --channel or configure `channels` in .chatvault.toml".to_string(),
        )
        .into());
    }
    println!("Using {} channel(s) from config", channels.len());
    Ok(channels)
}

async fn run_with_progress<C, I>(
    coordinator: &CacheCoordinator<C, I>,
    channels: &[Channel],
    options: &CacheOptions,
) -> Result<CacheRunResult>
where
    C: chatvault_core::client::ChatApi,
    I: chatvault_core::enrich::IssueApi,
{
    let pb = ProgressBar::new(channels.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let result = coordinator
        .run_with_progress(channels, options, |current, _total, name| {
            pb.set_position(current as u64);
            pb.set_message(name.to_string());
        })
        .await
        .context("cache run failed")?;

    pb.finish_and_clear();
    Ok(result)
}

fn print_cache_result(result: &CacheRunResult) {
    println!("\nCache complete:");
    println!("  Channels processed: {}", result.channels_processed);
    println!("  Channels failed:    {}", result.channels_failed);
    println!("  Messages cached:    {}", result.messages_cached);
    println!("  Partitions written: {}", result.partitions_written);
    println!("  Users cached:       {}", result.users_cached);
    if result.tickets_cached > 0 || result.tickets_failed > 0 {
        println!("  Tickets cached:     {}", result.tickets_cached);
        println!("  Tickets failed:     {}", result.tickets_failed);
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings ({}):", result.warnings.len());
        for warning in &result.warnings {
            println!("  {warning}");
        }
    }

    if !result.errors.is_empty() {
        println!("\nErrors ({}):", result.errors.len());
        for (entity, error) in &result.errors {
            println!("  {entity}: {error}");
        }
    }

    println!("\n{}", result.summary_line());
}
