//! Inspect command implementation.

use kinddb_core::journal::{self, JournalRecord};
use kinddb_core::Key;
use kinddb_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal size in bytes.
    pub size: u64,
    /// Bytes covered by intact records.
    pub valid_len: u64,
    /// Whether a partial record follows the intact ones.
    pub torn_tail: bool,
    /// Number of put records.
    pub put_count: usize,
    /// Number of delete records.
    pub delete_count: usize,
    /// Number of allocation records.
    pub allocate_count: usize,
    /// Live entities per kind after replay.
    pub kinds: BTreeMap<String, usize>,
    /// Individual records (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<RecordInfo>>,
}

/// Journal record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Record type.
    pub record_type: String,
    /// Affected key (if applicable, URL-safe).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Allocation scope and next id (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_id: Option<i64>,
}

/// Reads and summarizes a journal file.
pub fn summarize(path: &Path, limit: Option<usize>, with_records: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No journal found at {}", path.display()).into());
    }
    let backend = FileBackend::open(path)?;
    let bytes = backend.read_all()?;
    let scan = journal::scan(&bytes)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        size: bytes.len() as u64,
        valid_len: scan.valid_len,
        torn_tail: scan.torn_tail,
        ..InspectResult::default()
    };
    let mut live: BTreeSet<Key> = BTreeSet::new();
    let mut records = Vec::new();
    for (offset, record) in &scan.records {
        let (key, next_id) = match record {
            JournalRecord::Put { key, .. } => {
                result.put_count += 1;
                live.insert(key.clone());
                (Some(key.urlsafe()), None)
            }
            JournalRecord::Delete { key } => {
                result.delete_count += 1;
                live.remove(key);
                (Some(key.urlsafe()), None)
            }
            JournalRecord::Allocate { next, .. } => {
                result.allocate_count += 1;
                (None, Some(*next))
            }
        };
        if with_records && limit.map_or(true, |l| records.len() < l) {
            records.push(RecordInfo {
                offset: *offset,
                record_type: format!("{:?}", record.record_type()),
                key,
                next_id,
            });
        }
    }
    for key in &live {
        *result.kinds.entry(key.kind().to_string()).or_default() += 1;
    }
    if with_records {
        result.records = Some(records);
    }
    Ok(result)
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    show_records: bool,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = summarize(path, limit, show_records)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Journal: {}", result.path);
    println!("Size: {} bytes ({} valid)", result.size, result.valid_len);
    if result.torn_tail {
        println!("Torn tail: yes (will be truncated on next open)");
    }
    println!(
        "Records: {} put, {} delete, {} allocate",
        result.put_count, result.delete_count, result.allocate_count
    );
    println!("Live entities:");
    for (kind, count) in &result.kinds {
        println!("  {kind}: {count}");
    }
    if let Some(records) = &result.records {
        println!();
        for r in records {
            match (&r.key, r.next_id) {
                (Some(key), _) => println!("{:>10}  {:<8} {key}", r.offset, r.record_type),
                (None, Some(next)) => println!("{:>10}  {:<8} next={next}", r.offset, r.record_type),
                (None, None) => println!("{:>10}  {}", r.offset, r.record_type),
            }
        }
    }
    Ok(())
}
