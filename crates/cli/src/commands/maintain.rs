//! Maintenance: `regenerate`, `clear`, `refresh`.

use lorekeeper_core::store::EntryKey;

use super::engine;

pub async fn regenerate() -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    controller.regenerate_segments().await?;
    let stats = controller.statistics();
    println!("Regenerated tiers over {} records", stats.text_count);
    Ok(())
}

pub async fn clear(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    let enabled = controller.statistics().enabled;
    controller.clear_all(force).await?;

    println!("History and tiers cleared");
    if enabled || force {
        println!("  World book tier entries deleted");
    } else {
        println!("  World book left untouched (sync disabled; use --force to delete entries)");
    }
    Ok(())
}

pub async fn refresh() -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    let report = controller.refresh().await?;

    println!("Refreshed from world book");
    println!("  Settings adopted: {}", if report.settings_adopted { "yes" } else { "no" });
    println!("  Tiers adopted:    {}", if report.tiers_adopted { "yes" } else { "no" });
    if !report.diverged.is_empty() {
        let keys: Vec<&str> = report.diverged.iter().map(EntryKey::as_str).collect();
        println!("  Diverged:         {}", keys.join(", "));
        println!("  Run `lorekeeper regenerate` to rewrite them.");
    }
    Ok(())
}
