//! `chatvault view` - reconstruct and format cached conversations

use anyhow::{Context, Result};
use chatvault_core::store::PartitionReader;
use chatvault_core::threads::reconstruct;
use chatvault_core::view::{MessageViewFormatter, ViewContext};
use chatvault_core::window::{is_valid_date, today};
use chatvault_core::Error;

use super::ViewArgs;

pub fn run(args: ViewArgs) -> Result<()> {
    let reader = PartitionReader::new(&args.cache_path);

    let (rows, display_channel, date_range) = match (&args.start_date, &args.end_date) {
        (Some(start), Some(end)) => {
            validate_date(start)?;
            validate_date(end)?;
            let rows = reader.read_channel_range(&args.channel, start, end)?;
            (rows, args.channel.clone(), format!("{start} to {end}"))
        }
        _ => {
            let date = match &args.date {
                Some(date) => {
                    validate_date(date)?;
                    date.clone()
                }
                None => today(),
            };
            let rows = reader.read_channel(&args.channel, &date)?;
            // Show the alias the partition was actually written under
            let display = reader
                .resolve_channel(&args.channel, &date)
                .unwrap_or_else(|| args.channel.clone());
            (rows, display, date)
        }
    };

    if rows.is_empty() {
        println!(
            "No messages found in {} for {}",
            display_channel, date_range
        );
        println!("Try a different date range, or check `chatvault stats` for available data.");
        return Ok(());
    }

    eprintln!("Found {} messages", rows.len());

    let threaded = reconstruct(rows);

    let cached_users = reader
        .read_users()
        .context("failed to read user cache")?;
    let context = ViewContext {
        channel_name: display_channel,
        date_range: Some(date_range),
        channels: vec![],
    };
    let view = MessageViewFormatter::new().format(&threaded, &context, Some(&cached_users));

    match &args.output {
        Some(path) => {
            std::fs::write(path, &view)
                .with_context(|| format!("failed to write view to {}", path.display()))?;
            println!("✓ View saved to {}", path.display());
        }
        None => println!("{view}"),
    }

    Ok(())
}

fn validate_date(date: &str) -> Result<()> {
    if !is_valid_date(date) {
        return Err(Error::Config(format!("invalid date: {date} (expected YYYY-MM-DD)")).into());
    }
    Ok(())
}
