//! `lorekeeper status` / `lorekeeper show` — Inspect the engine.

use lorekeeper_core::store::EntryKey;

use super::engine;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = engine::load_config()?;
    let controller = engine::open(&config).await?;
    let stats = controller.statistics();

    println!("Lorekeeper Status");
    println!("=================");
    println!("  Mode:            {}", stats.mode);
    println!("  Sync:            {}", if stats.enabled { "enabled" } else { "disabled" });
    println!("  Records:         {} ({} with text)", stats.record_count, stats.text_count);
    println!("  Segment:         {}", stats.segment_count);
    println!("  Small summary:   {}", stats.small_summary_count);
    println!("  Large summary:   {}", stats.large_summary_count);
    println!("  Summarizer:      {}", config.summarizer.provider);
    println!("  World book:      {} ({})", config.world_book_path().display(), config.store.backend);
    match stats.last_update_time {
        Some(t) => println!("  Last update:     {}", t.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last update:     never"),
    }

    if stats.pending_keys.is_empty() {
        println!("\n  World book is in sync");
    } else {
        let keys: Vec<&str> = stats.pending_keys.iter().map(EntryKey::as_str).collect();
        println!("\n  Pending: {}", keys.join(", "));
        println!("  Run `lorekeeper regenerate` to rewrite them.");
    }

    Ok(())
}

pub async fn show(entries: bool) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;

    if !entries {
        let context = controller.render_context();
        if context.is_empty() {
            println!("(no history yet)");
        } else {
            println!("{context}");
        }
        return Ok(());
    }

    let snapshot = controller.snapshot();
    for key in EntryKey::ALL {
        match lorekeeper_compaction::render::desired_entry(&snapshot.state, key) {
            Some(entry) => {
                println!("── {} ──", key.as_str());
                println!("{}\n", entry.content);
            }
            None => println!("── {} ── (absent)\n", key.as_str()),
        }
    }
    Ok(())
}
