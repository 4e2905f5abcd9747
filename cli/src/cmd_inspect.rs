//! `chainoracle status` / `chainoracle cursor` — read a node's SQLite state.

use anyhow::{anyhow, Context, Result};

use chainoracle_core::{CursorStore, RequestKey, RequestStore};
use chainoracle_storage::SqliteStorage;

async fn open(db: &str) -> Result<SqliteStorage> {
    SqliteStorage::open(db)
        .await
        .with_context(|| format!("open database '{}'", db))
}

pub async fn status(db: &str, chain: &str, request: &str, epoch: Option<u64>, as_json: bool) -> Result<()> {
    let store = open(db).await?;
    let found = match epoch {
        Some(epoch) => store.load_request(&RequestKey::new(chain, request, epoch)).await?,
        None => store.load_latest_request(chain, request).await?,
    };
    let record = found.ok_or_else(|| anyhow!("request '{}' not found on chain '{}'", request, chain))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Request:   {}", record.key);
        println!("Type:      {}", record.request_type);
        println!("Status:    {}", record.status);
        println!("Round:     {}", record.round_id);
        println!("Height:    {}", record.height);
        println!("Attempts:  {}", record.attempts);
        println!("Modified:  {}", record.last_modified_at);
        if let Some(hash) = record.report_hash {
            println!("Report:    0x{}", hex::encode(hash));
        }
        if let Some(tx) = &record.tx_id {
            println!("Tx:        {}", tx);
        }
        if let Some(at) = record.archived_at {
            println!("Archived:  {}", at);
        }
    }
    Ok(())
}

pub async fn cursor(db: &str, chain: Option<&str>) -> Result<()> {
    let store = open(db).await?;
    let cursors = match chain {
        Some(chain) => store.load_cursor(chain).await?.into_iter().collect(),
        None => store.cursors().await?,
    };

    if cursors.is_empty() {
        println!("No cursors recorded");
    }
    for c in cursors {
        println!("  {:20} consumed={} updated_at={}", c.chain_id, c.consumed_block_height, c.updated_at);
    }
    Ok(())
}
