//! Subcommand implementations.

pub mod completions;
pub mod download;
pub mod run;
pub mod select;
pub mod store;
pub mod trust;

use std::sync::Arc;

use anyhow::{Context, Result};

use opal_core::coordinator::Coordinator;
use opal_core::download::HttpTransfer;
use opal_core::driver::Driver;
use opal_core::feeds::FeedCache;
use opal_core::paths;
use opal_core::policy::Policy;
use opal_core::store::ImplStore;
use opal_core::trust::TrustDb;
use opal_schema::Stability;

use crate::ui::{ConsoleReporter, StdinPrompt};

/// Assemble a driver over `~/.opal` with the interactive front-end.
pub fn build_driver(policy: Policy, quiet: bool) -> Result<Driver> {
    let store = ImplStore::with_root(paths::store_path())
        .context("Could not open the implementation store")?;
    let feeds =
        FeedCache::with_root(paths::feeds_path()).context("Could not open the feed cache")?;
    let trust = TrustDb::load(paths::trust_path())?;

    let transfer = HttpTransfer::new(reqwest::Client::new());
    let reporter = Arc::new(ConsoleReporter::new(quiet));
    let coordinator = Coordinator::new(Arc::new(transfer), reporter);

    Ok(Driver::new(
        store,
        feeds,
        trust,
        coordinator,
        policy,
        Box::new(StdinPrompt),
    ))
}

/// Policy from the shared CLI flags.
pub fn build_policy(cached: bool, stability: Option<Stability>) -> Policy {
    let mut policy = Policy::default();
    if cached {
        policy = policy.prefer_cached();
    }
    if let Some(floor) = stability {
        policy = policy.with_floor(floor);
    }
    policy
}
