//! Trust command - inspect the trust database.

use anyhow::Result;

use opal_core::paths;
use opal_core::trust::TrustDb;

/// List trusted keys and the domains they may sign for.
pub fn list() -> Result<()> {
    let trust = TrustDb::load(paths::trust_path())?;

    let mut empty = true;
    for (fingerprint, domains) in trust.entries() {
        empty = false;
        println!("{fingerprint}");
        for domain in domains {
            println!("  {domain}");
        }
    }
    if empty {
        println!("No trusted keys");
    }
    Ok(())
}
