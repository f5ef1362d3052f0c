//! Append-only journal of datastore mutations.
//!
//! Each record is framed as:
//!
//! ```text
//! | len: u32 LE | type: u8 | payload: canonical CBOR | crc32: u32 LE |
//! ```
//!
//! `len` covers the type byte and the payload; the CRC covers the same
//! bytes. Replaying the journal from the start rebuilds the datastore.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use kinddb_codec::{from_cbor, to_canonical_cbor, Decode, Encode, Value};
use kinddb_storage::StorageBackend;

const LEN_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// Type byte of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JournalRecordType {
    /// Entity stored.
    Put = 1,
    /// Entity deleted.
    Delete = 2,
    /// Id counter advanced.
    Allocate = 3,
}

impl JournalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Delete),
            3 => Some(Self::Allocate),
            _ => None,
        }
    }
}

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// An entity was stored under `key`.
    Put {
        /// Complete key.
        key: Key,
        /// Stored entity record (`class`, `props`, `unindexed`).
        entity: Value,
    },
    /// `key` was deleted.
    Delete {
        /// Deleted key.
        key: Key,
    },
    /// The id counter for `(parent, kind)` moved to `next`.
    Allocate {
        /// Kind the ids belong to.
        kind: String,
        /// Parent scope, if any.
        parent: Option<Key>,
        /// Next id to hand out.
        next: i64,
    },
}

impl JournalRecord {
    /// Returns the record type.
    pub fn record_type(&self) -> JournalRecordType {
        match self {
            Self::Put { .. } => JournalRecordType::Put,
            Self::Delete { .. } => JournalRecordType::Delete,
            Self::Allocate { .. } => JournalRecordType::Allocate,
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::Put { key, entity } => {
                Value::text_map([("key", key.to_value()), ("entity", entity.clone())])
            }
            Self::Delete { key } => Value::text_map([("key", key.to_value())]),
            Self::Allocate { kind, parent, next } => Value::text_map([
                ("kind", Value::Text(kind.clone())),
                ("parent", parent.as_ref().map_or(Value::Null, Encode::to_value)),
                ("next", Value::Integer(*next)),
            ]),
        }
    }

    fn from_payload(record_type: JournalRecordType, payload: &Value) -> CoreResult<Self> {
        Ok(match record_type {
            JournalRecordType::Put => Self::Put {
                key: Key::from_value(payload.field("key")?)?,
                entity: payload.field("entity")?.clone(),
            },
            JournalRecordType::Delete => Self::Delete {
                key: Key::from_value(payload.field("key")?)?,
            },
            JournalRecordType::Allocate => {
                let parent = match payload.field("parent")? {
                    Value::Null => None,
                    value => Some(Key::from_value(value)?),
                };
                let next = payload
                    .field("next")?
                    .as_integer()
                    .ok_or_else(|| kinddb_codec::CodecError::unexpected_shape("next", "integer"))?;
                Self::Allocate {
                    kind: payload.text_field("kind")?.to_string(),
                    parent,
                    next,
                }
            }
        })
    }

    /// Frames the record for appending.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = to_canonical_cbor(&self.payload());
        let mut body = Vec::with_capacity(1 + payload.len());
        body.push(self.record_type() as u8);
        body.extend_from_slice(&payload);

        #[allow(clippy::cast_possible_truncation)]
        let len = body.len() as u32;
        let mut out = Vec::with_capacity(LEN_SIZE + body.len() + CRC_SIZE);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        out.extend_from_slice(&compute_crc32(&body).to_le_bytes());
        out
    }
}

/// Whether a complete record with a matching checksum starts at `pos`.
fn is_intact_frame(bytes: &[u8], pos: usize) -> bool {
    let Some(len_bytes) = bytes.get(pos..pos + LEN_SIZE) else {
        return false;
    };
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let body_start = pos + LEN_SIZE;
    let Some(crc_end) = body_start.checked_add(len).and_then(|n| n.checked_add(CRC_SIZE)) else {
        return false;
    };
    let (Some(body), Some(crc)) = (
        bytes.get(body_start..body_start + len),
        bytes.get(crc_end - CRC_SIZE..crc_end),
    ) else {
        return false;
    };
    len > 0
        && JournalRecordType::from_byte(body[0]).is_some()
        && compute_crc32(body) == u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]])
}

/// Result of scanning a journal.
#[derive(Debug, Default)]
pub struct JournalScan {
    /// Records with their byte offsets, in order.
    pub records: Vec<(u64, JournalRecord)>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Whether a partial record follows the valid prefix.
    pub torn_tail: bool,
}

/// Parses every record in `bytes`.
///
/// A record that runs past the end of the data, or the last record when its
/// checksum fails, is a torn write: scanning stops and `torn_tail` is set. A
/// bad record followed by more data, or by an intact record frame, is
/// corruption.
pub fn scan(bytes: &[u8]) -> CoreResult<JournalScan> {
    let mut scan = JournalScan::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        let Some(len_bytes) = bytes.get(pos..pos + LEN_SIZE) else {
            scan.torn_tail = true;
            break;
        };
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if len == 0 {
            return Err(CoreError::journal_corruption(offset, "empty record"));
        }
        let end = pos + LEN_SIZE + len + CRC_SIZE;
        if end > bytes.len() {
            if let Some(next) = (pos + 1..bytes.len()).find(|&at| is_intact_frame(bytes, at)) {
                return Err(CoreError::journal_corruption(
                    offset,
                    format!("record length runs past intact record at {next}"),
                ));
            }
            scan.torn_tail = true;
            break;
        }

        let body = &bytes[pos + LEN_SIZE..pos + LEN_SIZE + len];
        let crc_bytes = &bytes[end - CRC_SIZE..end];
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if compute_crc32(body) != stored {
            if end == bytes.len() {
                scan.torn_tail = true;
                break;
            }
            return Err(CoreError::journal_corruption(offset, "checksum mismatch"));
        }

        let record_type = JournalRecordType::from_byte(body[0]).ok_or_else(|| {
            CoreError::journal_corruption(offset, format!("unknown record type {}", body[0]))
        })?;
        let payload = from_cbor(&body[1..])
            .map_err(|e| CoreError::journal_corruption(offset, e.to_string()))?;
        let record = JournalRecord::from_payload(record_type, &payload)
            .map_err(|e| CoreError::journal_corruption(offset, e.to_string()))?;

        scan.records.push((offset, record));
        pos = end;
        scan.valid_len = end as u64;
    }

    Ok(scan)
}

/// Journal writer over a storage backend.
pub struct Journal {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend,
            sync_on_write,
        }
    }

    /// Reads every record, truncating a torn tail when `repair` is set.
    pub fn replay(&mut self, repair: bool) -> CoreResult<JournalScan> {
        let bytes = self.backend.read_all()?;
        let scan = scan(&bytes)?;
        if scan.torn_tail {
            if !repair {
                return Err(CoreError::journal_corruption(
                    scan.valid_len,
                    "torn record at journal tail",
                ));
            }
            tracing::warn!(
                valid_len = scan.valid_len,
                dropped = bytes.len() as u64 - scan.valid_len,
                "truncating torn journal tail"
            );
            self.backend.truncate(scan.valid_len)?;
        }
        Ok(scan)
    }

    /// Appends one record, returning its offset.
    pub fn append(&mut self, record: &JournalRecord) -> CoreResult<u64> {
        self.append_all(std::slice::from_ref(record))
    }

    /// Appends records in one write, returning the offset of the first.
    pub fn append_all(&mut self, records: &[JournalRecord]) -> CoreResult<u64> {
        let bytes: Vec<u8> = records.iter().flat_map(JournalRecord::to_bytes).collect();
        let offset = self.backend.append(&bytes)?;
        self.backend.flush()?;
        if self.sync_on_write {
            self.backend.sync()?;
        }
        Ok(offset)
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

/// Computes the CRC32 (IEEE) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinddb_storage::InMemoryBackend;

    fn put(id: i64) -> JournalRecord {
        JournalRecord::Put {
            key: Key::new("Account", id).unwrap(),
            entity: Value::text_map([("class", Value::from("Account"))]),
        }
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn records_scan_back_in_order() {
        let records = vec![
            put(1),
            JournalRecord::Delete {
                key: Key::new("Account", 1).unwrap(),
            },
            JournalRecord::Allocate {
                kind: "Message".into(),
                parent: Some(Key::new("Account", "a").unwrap()),
                next: 101,
            },
        ];
        let bytes: Vec<u8> = records.iter().flat_map(JournalRecord::to_bytes).collect();
        let scan = scan(&bytes).unwrap();
        assert!(!scan.torn_tail);
        assert_eq!(scan.valid_len, bytes.len() as u64);
        let decoded: Vec<_> = scan.records.into_iter().map(|(_, r)| r).collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn torn_tail_is_detected() {
        let mut bytes = put(1).to_bytes();
        let first = bytes.len();
        let second = put(2).to_bytes();
        bytes.extend_from_slice(&second[..second.len() - 3]);

        let scan = scan(&bytes).unwrap();
        assert!(scan.torn_tail);
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.valid_len, first as u64);
    }

    #[test]
    fn corruption_in_the_middle_fails() {
        let mut bytes = put(1).to_bytes();
        bytes.extend(put(2).to_bytes());
        bytes[6] ^= 0xFF;
        assert!(matches!(
            scan(&bytes),
            Err(CoreError::JournalCorruption { offset: 0, .. })
        ));
    }

    #[test]
    fn overlong_length_before_intact_records_fails() {
        let mut bytes = put(1).to_bytes();
        let second = bytes.len();
        bytes.extend(put(2).to_bytes());
        bytes.extend(put(3).to_bytes());
        bytes[second..second + LEN_SIZE].copy_from_slice(&0x00FF_FFFF_u32.to_le_bytes());

        assert!(matches!(
            scan(&bytes),
            Err(CoreError::JournalCorruption { offset, .. }) if offset == second as u64
        ));
        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(bytes.clone())), false);
        assert!(journal.replay(true).is_err());
        assert_eq!(journal.size().unwrap(), bytes.len() as u64);
    }

    #[test]
    fn replay_repairs_backend() {
        let mut bytes = put(1).to_bytes();
        let first = bytes.len() as u64;
        bytes.extend_from_slice(&[9, 0, 0]);
        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(bytes)), false);

        let scan = journal.replay(true).unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(journal.size().unwrap(), first);

        journal.append(&put(2)).unwrap();
        assert_eq!(journal.replay(true).unwrap().records.len(), 2);
    }

    #[test]
    fn replay_without_repair_rejects_torn_tail() {
        let mut bytes = put(1).to_bytes();
        bytes.push(1);
        let mut journal = Journal::new(Box::new(InMemoryBackend::with_data(bytes)), false);
        assert!(journal.replay(false).is_err());
    }
}
