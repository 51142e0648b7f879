use crate::{MemoryBackend, StoreError, StoreFile};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

fn load_store_data(path: &Path) -> Result<StoreFile, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    // Try JSON first, fall back to MessagePack
    serde_json::from_reader(reader).or_else(|_| {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        rmp_serde::decode::from_read(reader).map_err(StoreError::from)
    })
}

/// Load a store written by [`crate::save_store`] or [`crate::save_store_packed`].
/// A missing file yields an empty store.
pub fn load_store(path: &Path) -> Result<MemoryBackend, StoreError> {
    if !path.exists() {
        log::info!("no store at {}, starting empty", path.display());
        return Ok(MemoryBackend::new());
    }

    let data = load_store_data(path)?;
    log::debug!(
        "loaded {} assets from {}",
        data.assets.len(),
        path.display()
    );
    Ok(MemoryBackend::from_file(data))
}
