//! Selection policy: what the solver may pick and what it prefers.

use opal_schema::{HostArch, Stability};

/// Constraints and preferences for one resolution attempt.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Minimum acceptable stability; candidates below it are ignored.
    pub stability_floor: Stability,

    /// The machine implementations must be able to run on.
    pub host: HostArch,

    /// Rank cached implementations above newer uncached ones, for
    /// offline use or to avoid fetches.
    pub prefer_cached: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            stability_floor: Stability::Testing,
            host: HostArch::current(),
            prefer_cached: false,
        }
    }
}

impl Policy {
    /// A policy accepting developer snapshots as well.
    pub fn with_floor(mut self, floor: Stability) -> Self {
        self.stability_floor = floor;
        self
    }

    /// Prefer cached implementations over newer uncached ones.
    pub fn prefer_cached(mut self) -> Self {
        self.prefer_cached = true;
        self
    }
}
