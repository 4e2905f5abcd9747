//! `chainoracle keygen` — deal a threshold key set.
//!
//! Writes `public.json` plus one `share-<index>.json` per participant, or
//! prints everything as one JSON document when no output directory is given.

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::OsRng;

use chainoracle_signer::deal;

pub fn run(threshold: u32, participants: u32, out: Option<&Path>) -> Result<()> {
    let dealt = deal(threshold, participants, &mut OsRng)?;

    let Some(dir) = out else {
        println!("{}", serde_json::to_string_pretty(&dealt)?);
        return Ok(());
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output directory '{}'", dir.display()))?;

    let public_path = dir.join("public.json");
    std::fs::write(&public_path, serde_json::to_string_pretty(&dealt.public)?)
        .with_context(|| format!("write '{}'", public_path.display()))?;

    for share in &dealt.shares {
        let path = dir.join(format!("share-{}.json", share.index()));
        std::fs::write(&path, serde_json::to_string_pretty(share)?)
            .with_context(|| format!("write '{}'", path.display()))?;
    }

    println!("Dealt {}-of-{} key set into '{}'", threshold, participants, dir.display());
    println!("  Group key: 0x{}", hex::encode(dealt.public.group_key_bytes()));
    println!("  Files:     public.json, share-1.json .. share-{}.json", participants);
    println!("Distribute each share to exactly one node; keep shares secret.");
    Ok(())
}
