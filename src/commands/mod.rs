// Command handlers module
pub mod config;
pub mod history;
pub mod reset;
pub mod run;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::store::{PreferenceStore, SqliteStore};

// Re-exports for cleaner imports
pub use version::execute as version;

/// Open the preference store named by `--db`, or the default one.
pub fn open_store(matches: &clap::ArgMatches) -> Result<Arc<dyn PreferenceStore>> {
    let path = match matches.get_one::<String>("db") {
        Some(path) => PathBuf::from(path),
        None => SqliteStore::default_path()?,
    };

    log::debug!("Opening store at {}", path.display());
    let store = SqliteStore::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}
