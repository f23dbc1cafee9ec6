//! Download command - fetch everything a program needs, without running.

use anyhow::Result;

use opal_schema::{InterfaceUri, Stability};

/// Resolve `uri` and fetch every uncached implementation into the store.
pub async fn download(
    uri: &str,
    refresh: bool,
    stability: Option<Stability>,
    quiet: bool,
) -> Result<()> {
    let policy = super::build_policy(false, stability);
    let mut driver = super::build_driver(policy, quiet)?;

    let root = InterfaceUri::new(uri);
    let set = driver.resolve(&root, refresh).await?;

    let missing = driver.uncached(&set).len();
    driver.download_selections(&set).await?;

    if missing == 0 {
        println!("Everything for {uri} is already cached");
    } else {
        println!("Fetched {missing} implementation(s) for {uri}");
    }
    Ok(())
}
