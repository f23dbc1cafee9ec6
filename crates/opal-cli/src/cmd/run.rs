//! Run command - resolve, fetch, bind, and execute a program.

use std::path::PathBuf;

use anyhow::{Context, Result};

use opal_core::launch::{self, LaunchOptions};
use opal_schema::{InterfaceUri, SelectionSet, Stability};

/// Everything `opal run` was invoked with.
#[derive(Debug)]
pub struct RunOptions {
    pub uri: Option<String>,
    pub args: Vec<String>,
    pub refresh: bool,
    pub cached: bool,
    pub stability: Option<Stability>,
    pub main: Option<String>,
    pub wrapper: Option<String>,
    pub selections: Option<PathBuf>,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Resolve and launch. On success the process image is replaced and this
/// never returns; it returns normally only for a successful dry run.
pub async fn run(opts: RunOptions) -> Result<()> {
    let policy = super::build_policy(opts.cached, opts.stability);
    let mut driver = super::build_driver(policy, opts.quiet)?;

    let set = match &opts.selections {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read selections from '{}'", path.display()))?;
            let set = SelectionSet::from_json(&data)
                .with_context(|| format!("'{}' is not a selection document", path.display()))?;
            set.validate()?;
            set
        }
        None => {
            let uri = opts.uri.as_deref().context("An interface URI is required")?;
            driver.resolve(&InterfaceUri::new(uri), opts.refresh).await?
        }
    };
    tracing::debug!(root = %set.interface, count = set.selections.len(), "resolved");

    driver.download_selections(&set).await?;

    let launch_opts = LaunchOptions {
        main: opts.main,
        wrapper: opts.wrapper,
    };
    let invocation = launch::compose(&set, &driver.store, &launch_opts, &opts.args)?;

    if opts.dry_run {
        println!("Would execute: {}", invocation.command_line());
        return Ok(());
    }

    match launch::execute(&invocation) {
        Ok(never) => match never {},
        Err(e) => Err(e.into()),
    }
}
