//! `lorekeeper append` — Record a turn.

use lorekeeper_core::record::{RawTurn, Role};

use super::engine;

pub async fn run(role: Role, text: String) -> Result<(), Box<dyn std::error::Error>> {
    let controller = engine::open_default().await?;
    let record = controller.append(RawTurn::new(role, text)).await?;

    let stats = controller.statistics();
    println!(
        "Recorded #{} ({} records: {} verbatim, {} in small summary, {} in large summary)",
        record.sequence,
        stats.record_count,
        stats.segment_count,
        stats.small_summary_count,
        stats.large_summary_count
    );
    if !stats.enabled {
        println!("  World book sync is disabled; run `lorekeeper enable` to mirror tiers.");
    }
    Ok(())
}
