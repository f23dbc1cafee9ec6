//! The selection engine.
//!
//! Walks the interface graph from a root, choosing exactly one
//! implementation per reachable interface under a [`Policy`]. The walk
//! is a breadth-first worklist in declaration order and every ranking
//! tie-break is total, so the result is deterministic for a fixed feed
//! cache and policy.

use std::cmp::Ordering;
use std::collections::VecDeque;

use thiserror::Error;

use opal_schema::{Feed, Implementation, InterfaceUri, Selection, SelectionSet};

use crate::feeds::FeedCache;
use crate::policy::Policy;
use crate::store::ImplStore;

/// Why a resolution attempt could not produce a selection set.
#[derive(Error, Debug)]
pub enum SolveError {
    /// No feed for this interface is in the cache. Callers fetch the
    /// feed and retry; the solver itself never downloads.
    #[error("No feed known for interface '{0}'")]
    UnknownInterface(InterfaceUri),

    /// The interface's feed offers no implementation the policy accepts.
    #[error("Cannot select an implementation of '{interface}': {reason}")]
    Unsatisfiable {
        /// The interface that could not be satisfied.
        interface: InterfaceUri,
        /// Which filter eliminated the candidates.
        reason: String,
    },
}

/// Resolves interfaces against the feed cache and local store.
#[derive(Debug)]
pub struct Solver<'a> {
    feeds: &'a FeedCache,
    store: &'a ImplStore,
    policy: &'a Policy,
}

impl<'a> Solver<'a> {
    /// Build a solver borrowing the caller's context.
    pub fn new(feeds: &'a FeedCache, store: &'a ImplStore, policy: &'a Policy) -> Self {
        Self {
            feeds,
            store,
            policy,
        }
    }

    /// Compute the selection set for `root`.
    ///
    /// Each interface is bound the first time the walk reaches it, so
    /// the set contains exactly one implementation per reachable
    /// interface and every dependency edge resolves in-set.
    pub fn solve(&self, root: &InterfaceUri) -> Result<SelectionSet, SolveError> {
        let mut set = SelectionSet::new(root.clone());
        let mut queue: VecDeque<InterfaceUri> = VecDeque::new();
        queue.push_back(root.clone());

        while let Some(uri) = queue.pop_front() {
            if set.selections.contains_key(&uri) {
                continue;
            }

            let feed = self
                .feeds
                .feed(&uri)
                .ok_or_else(|| SolveError::UnknownInterface(uri.clone()))?;

            let chosen = self.choose(&uri, feed)?;
            tracing::debug!(
                interface = %uri,
                id = %chosen.id,
                version = %chosen.version,
                "selected implementation"
            );

            for req in &chosen.requires {
                queue.push_back(req.interface.clone());
            }

            set.selections.insert(
                uri,
                Selection {
                    id: chosen.id.clone(),
                    version: chosen.version.clone(),
                    main: chosen.main.clone(),
                    bindings: chosen.bindings.clone(),
                    dependencies: chosen.requires.clone(),
                    archive: chosen.archive.clone(),
                },
            );
        }

        Ok(set)
    }

    /// Selections whose implementations are not yet in the store, in
    /// interface order. These must be fetched before launch.
    pub fn uncached<'s>(&self, set: &'s SelectionSet) -> Vec<(&'s InterfaceUri, &'s Selection)> {
        set.selections
            .iter()
            .filter(|(_, sel)| !self.store.contains(&sel.id))
            .collect()
    }

    fn choose<'f>(
        &self,
        uri: &InterfaceUri,
        feed: &'f Feed,
    ) -> Result<&'f Implementation, SolveError> {
        if feed.implementations.is_empty() {
            return Err(SolveError::Unsatisfiable {
                interface: uri.clone(),
                reason: "the feed lists no implementations".into(),
            });
        }

        let runnable: Vec<&Implementation> = feed
            .implementations
            .iter()
            .filter(|imp| {
                imp.arch
                    .as_ref()
                    .is_none_or(|arch| arch.accepts(&self.policy.host))
            })
            .collect();
        if runnable.is_empty() {
            return Err(SolveError::Unsatisfiable {
                interface: uri.clone(),
                reason: format!("no implementation runs on {}", self.policy.host),
            });
        }

        let acceptable: Vec<&Implementation> = runnable
            .into_iter()
            .filter(|imp| imp.stability >= self.policy.stability_floor)
            .collect();
        if acceptable.is_empty() {
            return Err(SolveError::Unsatisfiable {
                interface: uri.clone(),
                reason: format!(
                    "every runnable implementation is below the '{}' stability floor",
                    self.policy.stability_floor
                ),
            });
        }

        Ok(acceptable
            .into_iter()
            .max_by(|a, b| self.rank(a, b))
            .expect("acceptable is non-empty"))
    }

    /// Total preference order between two acceptable candidates.
    fn rank(&self, a: &Implementation, b: &Implementation) -> Ordering {
        let cached = |imp: &Implementation| self.store.contains(&imp.id);

        let by_stability = a.stability.cmp(&b.stability);
        let by_cached = cached(a).cmp(&cached(b));
        let by_version = a.version.cmp(&b.version);
        // Reversed: earlier ids rank higher, keeping max_by deterministic.
        let by_id = a.id.cmp(&b.id).reverse();

        if self.policy.prefer_cached {
            by_stability
                .then(by_cached)
                .then(by_version)
                .then(by_id)
        } else {
            by_stability
                .then(by_version)
                .then(by_cached)
                .then(by_id)
        }
    }
}
