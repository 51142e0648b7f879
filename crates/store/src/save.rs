use crate::{MemoryBackend, StoreError};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write the whole store as pretty-printed JSON.
pub fn save_store(path: &Path, store: &MemoryBackend) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &store.to_file())?;

    log::debug!("saved store to {}", path.display());
    Ok(())
}

/// Write the whole store as MessagePack. Struct fields are encoded by name so
/// optional fields survive the round trip.
pub fn save_store_packed(path: &Path, store: &MemoryBackend) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write_named(&mut writer, &store.to_file())?;

    log::debug!("saved packed store to {}", path.display());
    Ok(())
}
