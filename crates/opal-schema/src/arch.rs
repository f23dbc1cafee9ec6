//! Architecture constraints.
//!
//! Feeds tag implementations with an `os-machine` pair such as
//! `linux-x86_64` or `*-aarch64`; either half may be `*` to accept
//! anything. The solver filters candidates against the host's pair.
//!
//! # Example
//!
//! ```
//! use opal_schema::{Arch, HostArch};
//!
//! let host = HostArch::current();
//! let any: Arch = "*-*".parse().unwrap();
//! assert!(any.accepts(&host));
//! ```

use serde::{Deserialize, Serialize};

/// An architecture constraint from a feed: `os-machine`, with `*`
/// wildcards stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Arch {
    /// Required operating system, or `None` for any.
    pub os: Option<String>,
    /// Required machine type, or `None` for any.
    pub machine: Option<String>,
}

/// The concrete pair describing the machine we are running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostArch {
    /// Operating system name (`std::env::consts::OS`).
    pub os: String,
    /// Machine type (`std::env::consts::ARCH`).
    pub machine: String,
}

impl HostArch {
    /// The pair for the current process.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            machine: std::env::consts::ARCH.to_string(),
        }
    }

    /// Construct an explicit pair (used by tests and policy overrides).
    pub fn new(os: &str, machine: &str) -> Self {
        Self {
            os: os.to_string(),
            machine: machine.to_string(),
        }
    }
}

impl std::fmt::Display for HostArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.machine)
    }
}

impl Arch {
    /// The constraint accepting any host.
    pub fn any() -> Self {
        Self {
            os: None,
            machine: None,
        }
    }

    /// Whether an implementation with this constraint can run on `host`.
    pub fn accepts(&self, host: &HostArch) -> bool {
        let os_ok = self.os.as_deref().is_none_or(|os| os == host.os);
        let machine_ok = self
            .machine
            .as_deref()
            .is_none_or(|machine| machine == host.machine);
        os_ok && machine_ok
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.os.as_deref().unwrap_or("*"),
            self.machine.as_deref().unwrap_or("*")
        )
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, machine) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid architecture '{s}': expected os-machine"))?;
        let wildcard = |part: &str| {
            if part == "*" {
                None
            } else {
                Some(part.to_lowercase())
            }
        };
        Ok(Self {
            os: wildcard(os),
            machine: wildcard(machine),
        })
    }
}

impl TryFrom<String> for Arch {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Arch> for String {
    fn from(a: Arch) -> Self {
        a.to_string()
    }
}
