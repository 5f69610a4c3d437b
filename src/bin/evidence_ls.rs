//! evidence_ls - list recent evidence images
//!
//! Prints the newest evidence files in the images directory, newest first.
//! `latest.jpg` is never listed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use cat_sentinel::EvidenceStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "List recent cat sentinel evidence")]
struct Args {
    /// Evidence directory.
    #[arg(long, env = "SENTINEL_IMAGES_DIR", default_value = "/media/cat_detector")]
    images_dir: PathBuf,

    /// Maximum number of images to list.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Print records as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let store = EvidenceStore::open(&args.images_dir)?;
    let records = store
        .list_recent(args.limit)
        .with_context(|| format!("failed to list {}", args.images_dir.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("no evidence in {}", args.images_dir.display());
        return Ok(());
    }
    for record in &records {
        let name = record
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "{}  {:<14} {:<4} {}",
            record.saved_at.format("%Y-%m-%d %H:%M:%S"),
            record.detection_type.as_str(),
            if record.is_best { "best" } else { "" },
            name
        );
    }
    Ok(())
}
