//! Store command - inspect the implementation store.

use anyhow::{Context, Result};

use opal_core::paths;
use opal_core::store::ImplStore;

/// List cached implementations by id.
pub fn list() -> Result<()> {
    let store = ImplStore::with_root(paths::store_path())
        .context("Could not open the implementation store")?;

    let entries = store.list()?;
    if entries.is_empty() {
        println!("Store is empty");
        return Ok(());
    }
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}
