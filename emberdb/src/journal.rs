//! The write-ahead journal.
//!
//! Every batch applied to the database is appended to `data.wal` as one
//! framed record before it becomes visible in the memtable. Reopening a
//! database replays the journal from the start.
//!
//! A frame has the following byte format (all integers little endian):
//!
//! +----------------------------------------------------------------+
//! | crc32 of the payload (4 bytes)                                 |
//! +----------------------------------------------------------------+
//! | payload length (4 bytes)                                       |
//! +----------------------------------------------------------------+
//! | payload (variable length)                                      |
//! +----------------------------------------------------------------+
//!
//! The payload holds the sequence number of the first operation (8 bytes),
//! the operation count (4 bytes) and then each operation: a tag byte
//! (`1` put, `0` delete), the key length (4 bytes), the key and, for puts,
//! the value length (4 bytes) and the value.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::batch::WriteOp;
use crate::error::EmberError;

pub(crate) const JOURNAL_FILE: &str = "data.wal";
const JOURNAL_TMP_FILE: &str = "data.wal.tmp";

const FRAME_HEADER_LEN: usize = 8;
const TAG_DELETE: u8 = 0;
const TAG_PUT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JournalRecord {
    pub(crate) seq: u64,
    pub(crate) ops: Vec<WriteOp>,
}

/// Encodes one framed record.
pub(crate) fn encode_record(seq: u64, ops: &[WriteOp]) -> Bytes {
    let payload_len = 8
        + 4
        + ops
            .iter()
            .map(|op| match op {
                WriteOp::Put(key, value) => 1 + 4 + key.len() + 4 + value.len(),
                WriteOp::Delete(key) => 1 + 4 + key.len(),
            })
            .sum::<usize>();

    let mut payload = BytesMut::with_capacity(payload_len);
    payload.put_u64_le(seq);
    payload.put_u32_le(ops.len() as u32);
    for op in ops {
        match op {
            WriteOp::Put(key, value) => {
                payload.put_u8(TAG_PUT);
                payload.put_u32_le(key.len() as u32);
                payload.put_slice(key);
                payload.put_u32_le(value.len() as u32);
                payload.put_slice(value);
            }
            WriteOp::Delete(key) => {
                payload.put_u8(TAG_DELETE);
                payload.put_u32_le(key.len() as u32);
                payload.put_slice(key);
            }
        }
    }

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u32_le(crc32fast::hash(&payload));
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(&payload);
    frame.freeze()
}

/// The outcome of reading a journal.
#[derive(Debug)]
pub(crate) struct Replay {
    pub(crate) records: Vec<JournalRecord>,
    /// Length of the undamaged prefix.
    pub(crate) valid_len: u64,
    /// Why reading stopped before the end, if it did.
    pub(crate) damage: Option<EmberError>,
}

/// Decodes every intact record, stopping at the first damaged frame.
pub(crate) fn replay(data: Bytes) -> Replay {
    let total = data.len();
    let mut buf = data;
    let mut records = Vec::new();
    let mut offset = 0u64;

    while buf.has_remaining() {
        match decode_frame(&mut buf, offset) {
            Ok(record) => {
                records.push(record);
                offset = (total - buf.remaining()) as u64;
            }
            Err(err) => {
                return Replay {
                    records,
                    valid_len: offset,
                    damage: Some(err),
                };
            }
        }
    }

    Replay {
        records,
        valid_len: offset,
        damage: None,
    }
}

fn decode_frame(buf: &mut Bytes, offset: u64) -> Result<JournalRecord, EmberError> {
    if buf.remaining() < FRAME_HEADER_LEN {
        return Err(EmberError::TruncatedRecord { offset });
    }
    let crc = buf.get_u32_le();
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(EmberError::TruncatedRecord { offset });
    }
    let mut payload = buf.split_to(len);
    if crc32fast::hash(&payload) != crc {
        return Err(EmberError::ChecksumMismatch { offset });
    }

    let truncated = || EmberError::TruncatedRecord { offset };
    if payload.remaining() < 12 {
        return Err(truncated());
    }
    let seq = payload.get_u64_le();
    let count = payload.get_u32_le() as usize;
    let mut ops = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        if payload.remaining() < 5 {
            return Err(truncated());
        }
        let tag = payload.get_u8();
        let key = take_slice(&mut payload).ok_or_else(truncated)?;
        match tag {
            TAG_PUT => {
                let value = take_slice(&mut payload).ok_or_else(truncated)?;
                ops.push(WriteOp::Put(key, value));
            }
            TAG_DELETE => ops.push(WriteOp::Delete(key)),
            tag => return Err(EmberError::UnknownEntryTag { tag, offset }),
        }
    }
    Ok(JournalRecord { seq, ops })
}

fn take_slice(buf: &mut Bytes) -> Option<Bytes> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return None;
    }
    Some(buf.split_to(len))
}

/// Append handle on the journal file.
#[derive(Debug)]
pub(crate) struct JournalWriter {
    file: File,
    len: u64,
}

impl JournalWriter {
    pub(crate) fn open(dir: &Path) -> Result<Self, EmberError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(JOURNAL_FILE))?;
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub(crate) fn append(&mut self, frame: &[u8], sync: bool) -> Result<(), EmberError> {
        self.file.write_all(frame)?;
        if sync {
            self.file.sync_data()?;
        }
        self.len += frame.len() as u64;
        Ok(())
    }

    pub(crate) fn len(&self) -> u64 {
        self.len
    }
}

pub(crate) fn journal_path(dir: &Path) -> PathBuf {
    dir.join(JOURNAL_FILE)
}

/// Drops everything past `valid_len`.
pub(crate) fn truncate(dir: &Path, valid_len: u64) -> Result<(), EmberError> {
    let file = OpenOptions::new().write(true).open(journal_path(dir))?;
    file.set_len(valid_len)?;
    file.sync_all()?;
    Ok(())
}

/// Replaces the journal with `frames`, written to a temporary file and
/// renamed into place.
pub(crate) fn rewrite<I>(dir: &Path, frames: I) -> Result<JournalWriter, EmberError>
where
    I: IntoIterator<Item = Bytes>,
{
    let tmp = dir.join(JOURNAL_TMP_FILE);
    {
        let mut file = File::create(&tmp)?;
        for frame in frames {
            file.write_all(&frame)?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&tmp, journal_path(dir))?;
    JournalWriter::open(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(k: &'static [u8], v: &'static [u8]) -> WriteOp {
        WriteOp::Put(Bytes::from_static(k), Bytes::from_static(v))
    }

    #[test]
    fn test_replay_reads_back_records() {
        let first = vec![put(b"a", b"1"), WriteOp::Delete(Bytes::from_static(b"b"))];
        let second = vec![put(b"c", b"")];
        let mut data = BytesMut::new();
        data.put(encode_record(1, &first));
        data.put(encode_record(3, &second));
        let len = data.len() as u64;

        let replay = replay(data.freeze());
        assert!(replay.damage.is_none());
        assert_eq!(replay.valid_len, len);
        assert_eq!(
            replay.records,
            vec![
                JournalRecord { seq: 1, ops: first },
                JournalRecord { seq: 3, ops: second },
            ]
        );
    }

    #[test]
    fn test_replay_stops_at_torn_tail() {
        let good = encode_record(1, &[put(b"a", b"1")]);
        let torn = encode_record(2, &[put(b"b", b"2")]);
        let mut data = BytesMut::new();
        data.put(good.clone());
        data.put(&torn[..torn.len() - 3]);

        let replay = replay(data.freeze());
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.valid_len, good.len() as u64);
        assert!(matches!(
            replay.damage,
            Some(EmberError::TruncatedRecord { offset }) if offset == good.len() as u64
        ));
    }

    #[test]
    fn test_replay_detects_bit_flip() {
        let mut frame = BytesMut::from(&encode_record(1, &[put(b"key", b"value")])[..]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;

        let replay = replay(frame.freeze());
        assert!(replay.records.is_empty());
        assert_eq!(replay.valid_len, 0);
        assert!(matches!(
            replay.damage,
            Some(EmberError::ChecksumMismatch { offset: 0 })
        ));
    }

    #[test]
    fn test_writer_appends_and_rewrite_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = JournalWriter::open(dir.path()).unwrap();
        let frame = encode_record(1, &[put(b"a", b"1")]);
        writer.append(&frame, true).unwrap();
        writer.append(&frame, false).unwrap();
        assert_eq!(writer.len(), 2 * frame.len() as u64);

        let replacement = encode_record(9, &[put(b"z", b"26")]);
        let writer = rewrite(dir.path(), vec![replacement.clone()]).unwrap();
        assert_eq!(writer.len(), replacement.len() as u64);

        let data = std::fs::read(journal_path(dir.path())).unwrap();
        let replay = replay(Bytes::from(data));
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.records[0].seq, 9);
    }
}
