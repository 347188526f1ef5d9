//! On-disk character card store.
//!
//! Cards live as `<id>.json` files under a single directory. Ids are
//! restricted to path-safe tokens before any filesystem access, so a
//! request can never name a file outside the store.

use std::path::{Path, PathBuf};

use loregate_card::Card;
use loregate_core::{Error, StoreError};
use tracing::debug;

/// Loads and parses cards from a directory.
#[derive(Debug, Clone)]
pub struct CardStore {
    dir: PathBuf,
}

impl CardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and parse `<id>.json`.
    pub fn load(&self, id: &str) -> Result<Card, Error> {
        if !is_safe_id(id) {
            return Err(StoreError::InvalidId(id.to_string()).into());
        }

        let path = self.dir.join(format!("{id}.json"));
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Io(e),
        })?;
        debug!(id, path = %path.display(), "character file read");
        Card::parse(&bytes)
    }
}

/// Ids may contain only alphanumerics, `-`, `_` and `.`, and may not begin
/// with a dot (which also rules out `..`).
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
