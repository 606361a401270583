//! `switchboard onboard`: first-time setup.

use switchboard_config::{AppConfig, SAMPLE_TOML};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("📞 Switchboard: First-Time Setup");
    println!("================================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, SAMPLE_TOML)?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Replace the sample agents, scripts and channels with your own");
    println!("   2. Check it: switchboard doctor");
    println!("   3. Try a route: switchboard route website --lang en_US");
    println!("   4. Serve widgets: switchboard gateway\n");

    Ok(())
}
