//! `grant init`

use crate::Context;
use anyhow::Result;
use grant_config::{Config, CONFIG_DIR};
use std::fs;

const GITIGNORE_ENTRY: &str = ".grantsync/offline/";

/// Create `.grantsync/config.toml` and the storage directory
pub fn cmd_init(ctx: &Context) -> Result<()> {
    let config_dir = ctx.root.join(CONFIG_DIR);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
        eprintln!("✓ Created {}/", CONFIG_DIR);
    } else {
        eprintln!("✓ {}/ already exists", CONFIG_DIR);
    }

    let config_path = Config::path_for(&ctx.root);
    if !config_path.exists() {
        let header = "# GrantSync configuration\n\n";
        fs::write(&config_path, format!("{}{}", header, Config::default().to_toml()?))?;
        eprintln!("✓ Created {}/config.toml", CONFIG_DIR);
    } else {
        eprintln!("✓ {}/config.toml already exists", CONFIG_DIR);
    }

    // Validates an existing file as well
    let config = Config::load(&ctx.root)?;
    let storage = config.storage_path();
    if !storage.exists() {
        fs::create_dir_all(&storage)?;
        eprintln!("✓ Created {}", storage.display());
    }

    let gitignore_path = ctx.root.join(".gitignore");
    let entries = format!("\n# GrantSync\n{}\n", GITIGNORE_ENTRY);
    if gitignore_path.exists() {
        let content = fs::read_to_string(&gitignore_path)?;
        if !content.contains(GITIGNORE_ENTRY) {
            fs::write(&gitignore_path, format!("{}{}", content, entries))?;
            eprintln!("✓ Updated .gitignore");
        }
    } else {
        fs::write(&gitignore_path, entries.trim_start())?;
        eprintln!("✓ Created .gitignore");
    }

    eprintln!("\n✅ Workspace initialized successfully!");
    Ok(())
}
