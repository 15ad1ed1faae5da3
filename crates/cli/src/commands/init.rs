//! `lorekeeper init` — First-time setup.

use lorekeeper_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Lorekeeper — First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
        println!("\nNext steps:");
        println!("  1. Pick a summarizer in [summarizer] (extractive needs no key)");
        println!("  2. Run: lorekeeper enable");
        println!("  3. Feed turns with: lorekeeper append \"...\"\n");
    }

    Ok(())
}
