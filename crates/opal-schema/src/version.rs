//! Feed version strings and their total order.
//!
//! Feed versions are dotted numeric strings (`1`, `0.9.2`, `2.0.10`) with
//! optional release modifiers (`1.0-pre`, `1.0-rc2`, `1.0-post`). They are
//! not semver: any number of segments is allowed and segments compare
//! numerically, so `2.0.10 > 2.0.9` and `1.10 > 1.9`.

use serde::{Deserialize, Serialize};

/// A feed version string with dotted-numeric ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version(String);

/// Release modifier rank: `-pre` and `-rc` sort before the plain release,
/// `-post` after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Modifier {
    Pre,
    Rc,
    Release,
    Post,
}

#[derive(Debug, PartialEq, Eq)]
struct Parsed {
    segments: Vec<u64>,
    modifier: Modifier,
    /// Number attached to the modifier (`rc2` -> 2).
    modifier_num: u64,
}

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(&self) -> Parsed {
        let (digits, modifier_part) = match self.0.split_once('-') {
            Some((d, m)) => (d, Some(m)),
            None => (self.0.as_str(), None),
        };

        let segments = digits
            .split('.')
            .map(|s| s.parse::<u64>().unwrap_or(0))
            .collect();

        let (modifier, modifier_num) = match modifier_part {
            None => (Modifier::Release, 0),
            Some(m) => {
                let (name, num) = split_modifier(m);
                let rank = match name {
                    "pre" => Modifier::Pre,
                    "rc" => Modifier::Rc,
                    "post" => Modifier::Post,
                    _ => Modifier::Release,
                };
                (rank, num)
            }
        };

        Parsed {
            segments,
            modifier,
            modifier_num,
        }
    }
}

fn split_modifier(m: &str) -> (&str, u64) {
    let split = m.find(|c: char| c.is_ascii_digit()).unwrap_or(m.len());
    let (name, digits) = m.split_at(split);
    (name, digits.parse().unwrap_or(0))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let a = self.parse();
        let b = other.parse();

        // Compare segment-wise, treating missing trailing segments as 0,
        // so "1.0" == "1.0.0" and "1.0" < "1.0.1".
        let len = a.segments.len().max(b.segments.len());
        for i in 0..len {
            let sa = a.segments.get(i).copied().unwrap_or(0);
            let sb = b.segments.get(i).copied().unwrap_or(0);
            match sa.cmp(&sb) {
                std::cmp::Ordering::Equal => {}
                other => return other,
            }
        }

        (a.modifier, a.modifier_num).cmp(&(b.modifier, b.modifier_num))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::new(s)
    }

    #[test]
    fn test_numeric_segments() {
        assert!(v("2.0.10") > v("2.0.9"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("10") > v("9"));
        assert!(v("0.2") < v("0.10"));
    }

    #[test]
    fn test_missing_segments_are_zero() {
        assert_eq!(v("1.0").cmp(&v("1.0.0")), std::cmp::Ordering::Equal);
        assert!(v("1.0.1") > v("1.0"));
        assert!(v("1") < v("1.0.1"));
    }

    #[test]
    fn test_modifiers() {
        assert!(v("1.0-pre") < v("1.0"));
        assert!(v("1.0-rc1") < v("1.0"));
        assert!(v("1.0-pre") < v("1.0-rc1"));
        assert!(v("1.0-rc1") < v("1.0-rc2"));
        assert!(v("1.0-post") > v("1.0"));
        assert!(v("1.0-post") < v("1.1"));
    }

    #[test]
    fn test_sorting() {
        let mut versions = vec![v("1.0"), v("0.9"), v("1.0-pre"), v("1.0-post"), v("1.2")];
        versions.sort();
        let strings: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(strings, vec!["0.9", "1.0-pre", "1.0", "1.0-post", "1.2"]);
    }
}
