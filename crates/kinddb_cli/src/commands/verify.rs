//! Verify command implementation.

use kinddb_core::journal;
use kinddb_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Checks every journal record's framing, checksum and payload.
///
/// A torn tail is reported but is not an error unless `strict` is set,
/// since the datastore repairs it on open.
pub fn run(path: &Path, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {}", path.display()).into());
    }
    let backend = FileBackend::open(path)?;
    let bytes = backend.read_all()?;
    let scan = journal::scan(&bytes)?;

    println!("Verified {} records ({} bytes)", scan.records.len(), scan.valid_len);
    if scan.torn_tail {
        let dropped = bytes.len() as u64 - scan.valid_len;
        if strict {
            return Err(format!("torn record at offset {} ({dropped} bytes)", scan.valid_len).into());
        }
        println!("Warning: {dropped} trailing bytes form a torn record");
    }
    println!("OK");
    Ok(())
}
