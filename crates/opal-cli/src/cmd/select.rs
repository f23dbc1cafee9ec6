//! Select command - resolve and display without fetching or running.

use std::path::Path;

use anyhow::{Context, Result};

use opal_schema::{InterfaceUri, Stability};

/// Resolve `uri` and print the chosen implementation per interface.
pub async fn select(
    uri: &str,
    refresh: bool,
    cached: bool,
    stability: Option<Stability>,
    save: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let policy = super::build_policy(cached, stability);
    let mut driver = super::build_driver(policy, quiet)?;

    let root = InterfaceUri::new(uri);
    let set = driver.resolve(&root, refresh).await?;

    for (iface, sel) in &set.selections {
        let status = if driver.store.contains(&sel.id) {
            "cached"
        } else {
            "to download"
        };
        println!("{iface}");
        println!("  version: {}", sel.version);
        println!("  id:      {} ({status})", sel.id);
    }

    if let Some(path) = save {
        std::fs::write(path, set.to_json()?)
            .with_context(|| format!("Could not save selections to '{}'", path.display()))?;
        println!("Saved selections to {}", path.display());
    }

    Ok(())
}
