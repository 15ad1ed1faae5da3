//! Tier and gate settings: `segments`, `small-summaries`, `mode`, `enable`, `disable`.

use lorekeeper_core::context::ContextMode;

use super::engine;

pub async fn segments(count: i64) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    controller.set_segment_count(count).await?;
    println!("Segment keeps the latest {count} records verbatim");
    Ok(())
}

pub async fn small_summaries(count: i64) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    controller.set_small_summary_count(count).await?;
    println!("Small summary covers {count} records");
    Ok(())
}

pub async fn mode(mode: ContextMode) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    controller.switch_mode(mode).await?;
    println!("Context mode: {mode}");
    Ok(())
}

pub async fn enabled(enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    controller.set_enabled(enabled).await?;
    if enabled {
        println!("World book sync enabled. Tiers are written on the next append or regenerate.");
    } else {
        println!("World book sync disabled. Existing entries are left in place.");
    }
    Ok(())
}
