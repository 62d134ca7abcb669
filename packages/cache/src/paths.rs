//! Canonical file paths for the cache data directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CAMPUS_PORTAL_DATA_DIR";

/// File name of the cache database inside the data directory.
pub const CACHE_DB_FILE: &str = "portal_cache.duckdb";

/// Returns the data directory: `$CAMPUS_PORTAL_DATA_DIR`, or `data/`
/// relative to the working directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Returns the path of the cache database inside `dir`.
#[must_use]
pub fn cache_db_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_DB_FILE)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
