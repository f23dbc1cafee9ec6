//! The binding resolver.
//!
//! Turns a selection set's declarative bindings into environment
//! variables. The computation is a pure overlay over a snapshot of the
//! environment: the launcher hands the result to the child process.
//! Applying the same set twice yields the same values — a path-list
//! element that is already present is not inserted again.

use std::collections::BTreeMap;

use thiserror::Error;

use opal_schema::{Binding, EnvMode, EnvironmentBinding, SelectionSet, SelectionsError};

use crate::store::{ImplStore, StoreError};

/// Failures while computing bindings.
#[derive(Error, Debug)]
pub enum BindingError {
    /// The selection set violates its closure invariants.
    #[error(transparent)]
    Selections(#[from] SelectionsError),

    /// A bound implementation has no usable store path.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Compute every binding in `set` into `env`.
///
/// For each selection, its own bindings are applied with its own path;
/// for each dependency edge, the edge's bindings are applied with the
/// dependency's path. Edges onto native (`package:`) selections are
/// skipped — the host already provides those implementations, so there
/// is no path to expose.
pub fn resolve_env(
    set: &SelectionSet,
    store: &ImplStore,
    env: &mut BTreeMap<String, String>,
) -> Result<(), BindingError> {
    set.validate()?;

    for sel in set.selections.values() {
        if !sel.id.is_native() && !sel.bindings.is_empty() {
            let path = store.lookup(&sel.id)?;
            for binding in &sel.bindings {
                apply(binding, &path.to_string_lossy(), env);
            }
        }

        for dep in &sel.dependencies {
            let dep_sel = &set.selections[&dep.interface];
            if dep_sel.id.is_native() {
                tracing::debug!(id = %dep_sel.id, "native dependency needs no bindings");
                continue;
            }
            if dep.bindings.is_empty() {
                continue;
            }
            let path = store.lookup(&dep_sel.id)?;
            for binding in &dep.bindings {
                apply(binding, &path.to_string_lossy(), env);
            }
        }
    }

    Ok(())
}

fn apply(binding: &Binding, impl_path: &str, env: &mut BTreeMap<String, String>) {
    match binding {
        Binding::Environment(b) => apply_environment(b, impl_path, env),
    }
}

fn apply_environment(b: &EnvironmentBinding, impl_path: &str, env: &mut BTreeMap<String, String>) {
    let value = if b.insert.is_empty() {
        impl_path.to_string()
    } else {
        format!("{impl_path}/{}", b.insert)
    };
    let sep = b.separator.as_deref().unwrap_or(":");

    let combined = match (b.mode, env.get(&b.name)) {
        (EnvMode::Replace, _) | (_, None) => value,
        (EnvMode::Prepend, Some(old)) => {
            if old.split(sep).any(|part| part == value) {
                old.clone()
            } else {
                format!("{value}{sep}{old}")
            }
        }
        (EnvMode::Append, Some(old)) => {
            if old.split(sep).any(|part| part == value) {
                old.clone()
            } else {
                format!("{old}{sep}{value}")
            }
        }
    };

    tracing::debug!(name = %b.name, value = %combined, "environment binding");
    env.insert(b.name.clone(), combined);
}
