//! `chatvault stats` - enumerate partitions and summarize the dataset

use anyhow::Result;
use chatvault_core::store::PartitionReader;
use serde_json::json;

use super::{StatsArgs, StatsFormat};

pub fn run(args: StatsArgs) -> Result<()> {
    let reader = PartitionReader::new(&args.cache_path);
    let info = reader.partition_info()?;

    if args.format == StatsFormat::Json {
        let payload = json!({
            "total_partitions": info.partitions.len(),
            "total_rows": info.total_rows,
            "total_size_bytes": info.total_bytes,
            "partitions": info
                .partitions
                .iter()
                .map(|p| {
                    json!({
                        "path": p.path.display().to_string(),
                        "row_count": p.rows,
                        "size_bytes": p.bytes,
                    })
                })
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if info.partitions.is_empty() {
        println!("No cache found at: {}", args.cache_path.display());
        println!("Run `chatvault cache` to create one.");
        return Ok(());
    }

    println!("Cache statistics:");
    println!("  Partitions: {}", info.partitions.len());
    println!("  Total rows: {}", info.total_rows);
    println!(
        "  Total size: {:.2} MB",
        info.total_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("  Cache path: {}", args.cache_path.display());
    println!();
    println!("{:>10}  {:>10}  Path", "Rows", "KB");
    for partition in &info.partitions {
        println!(
            "{:>10}  {:>10.1}  {}",
            partition.rows,
            partition.bytes as f64 / 1024.0,
            partition.path.display()
        );
    }

    Ok(())
}
