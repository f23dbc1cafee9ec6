use dirs::home_dir;
use std::path::PathBuf;

/// Returns the primary opal directory, or None if the user's home cannot
/// be resolved.
pub fn try_opal_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("OPAL_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".opal"))
}

/// Returns the canonical opal home directory (`~/.opal`).
///
/// # Panics
///
/// Panics if neither `OPAL_HOME` is set nor the user's home directory can
/// be resolved.
pub fn opal_home() -> PathBuf {
    try_opal_home().expect("Could not determine home directory. Set OPAL_HOME to override.")
}

/// Implementation store path: ~/.opal/store
pub fn store_path() -> PathBuf {
    opal_home().join("store")
}

/// Verified feed cache path: ~/.opal/feeds
pub fn feeds_path() -> PathBuf {
    opal_home().join("feeds")
}

/// Trust database path: ~/.opal/trust.json
pub fn trust_path() -> PathBuf {
    opal_home().join("trust.json")
}

/// Temp path: ~/.opal/tmp (guaranteed same volume as the store)
pub fn tmp_path() -> PathBuf {
    opal_home().join("tmp")
}
