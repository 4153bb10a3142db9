//! `chatvault query` - SQL over the Parquet dataset
//!
//! Delegates execution to DataFusion as the embedded analytical engine.
//! The dataset registers as three tables: `messages` (hive-partitioned by
//! `dt` and `channel`), `issue_tickets` (partitioned by `dt`), and `users`.

use std::io::Write;

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use chatvault_core::Error;
use datafusion::arrow::datatypes::DataType;
use datafusion::prelude::{ParquetReadOptions, SessionContext};

use super::{QueryArgs, QueryFormat};

pub async fn run(args: QueryArgs) -> Result<()> {
    if !args.cache_path.join("messages").is_dir() {
        return Err(Error::Config(format!(
            "cache directory not found: {} (run `chatvault cache` first)",
            args.cache_path.join("messages").display()
        ))
        .into());
    }

    let ctx = register_dataset(&args).await?;

    if args.interactive {
        run_repl(&ctx, &args).await
    } else if let Some(sql) = &args.query {
        run_query(&ctx, sql, &args).await
    } else {
        Err(Error::Config("specify --query or --interactive".to_string()).into())
    }
}

/// Register every dataset entity that exists on disk.
async fn register_dataset(args: &QueryArgs) -> Result<SessionContext> {
    let ctx = SessionContext::new();

    // Trailing slash: DataFusion treats the path as a listing directory
    let messages_dir = format!("{}/", args.cache_path.join("messages").display());
    ctx.register_parquet(
        "messages",
        &messages_dir,
        ParquetReadOptions::default().table_partition_cols(vec![
            ("dt".to_string(), DataType::Utf8),
            ("channel".to_string(), DataType::Utf8),
        ]),
    )
    .await
    .context("failed to register messages table")?;

    let tickets_dir = args.cache_path.join("issue_tickets");
    if tickets_dir.is_dir() {
        ctx.register_parquet(
            "issue_tickets",
            &format!("{}/", tickets_dir.display()),
            ParquetReadOptions::default()
                .table_partition_cols(vec![("dt".to_string(), DataType::Utf8)]),
        )
        .await
        .context("failed to register issue_tickets table")?;
    }

    let users_file = args.cache_path.join("users.parquet");
    if users_file.is_file() {
        ctx.register_parquet(
            "users",
            &users_file.display().to_string(),
            ParquetReadOptions::default(),
        )
        .await
        .context("failed to register users table")?;
    }

    Ok(ctx)
}

async fn run_query(ctx: &SessionContext, sql: &str, args: &QueryArgs) -> Result<()> {
    let sql = apply_limit(sql, args.limit);

    let df = ctx.sql(&sql).await.context("query planning failed")?;
    let batches = df.collect().await.context("query execution failed")?;

    let total_rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    if total_rows == 0 {
        println!("No results found");
        return Ok(());
    }

    match args.format {
        QueryFormat::Table => {
            let table = datafusion::arrow::util::pretty::pretty_format_batches(&batches)?;
            println!("{table}");
            println!("\n{total_rows} row(s)");
        }
        QueryFormat::Json => {
            let mut writer = arrow::json::ArrayWriter::new(Vec::new());
            writer.write_batches(&batches.iter().collect::<Vec<_>>())?;
            writer.finish()?;
            println!("{}", String::from_utf8(writer.into_inner())?);
        }
        QueryFormat::Csv => {
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(Vec::new());
            for batch in &batches {
                writer.write(batch)?;
            }
            print!("{}", String::from_utf8(writer.into_inner())?);
        }
    }

    Ok(())
}

/// Append a LIMIT clause when the query has none.
fn apply_limit(sql: &str, limit: usize) -> String {
    if limit > 0 && !sql.to_lowercase().contains("limit") {
        format!("{sql} LIMIT {limit}")
    } else {
        sql.to_string()
    }
}

async fn run_repl(ctx: &SessionContext, args: &QueryArgs) -> Result<()> {
    println!("Interactive query mode. Type SQL, or 'exit' to leave.");
    println!("Tables: messages (dt, channel partitions), issue_tickets, users");
    println!();
    println!("Sample queries:");
    println!("  SELECT COUNT(*) FROM messages");
    println!("  SELECT user_real_name, COUNT(*) AS msg_count FROM messages GROUP BY user_real_name");
    println!("  SELECT * FROM messages WHERE dt = '2025-10-18' AND is_thread_parent");
    println!();

    let stdin = std::io::stdin();
    loop {
        print!("sql> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "\\q") {
            break;
        }

        if let Err(e) = run_query(ctx, line, args).await {
            eprintln!("Query error: {e:#}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_limit_appends_when_absent() {
        assert_eq!(
            apply_limit("SELECT * FROM messages", 100),
            "SELECT * FROM messages LIMIT 100"
        );
    }

    #[test]
    fn test_apply_limit_respects_existing_clause() {
        assert_eq!(
            apply_limit("SELECT * FROM messages LIMIT 5", 100),
            "SELECT * FROM messages LIMIT 5"
        );
        assert_eq!(
            apply_limit("select * from messages limit 5", 100),
            "select * from messages limit 5"
        );
    }

    #[test]
    fn test_apply_limit_zero_disables() {
        assert_eq!(
            apply_limit("SELECT * FROM messages", 0),
            "SELECT * FROM messages"
        );
    }
}
