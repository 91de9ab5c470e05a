use super::*;
use std::io::Cursor;
use tempfile::tempdir;

fn sample_records() -> Vec<LogRecord> {
    vec![
        LogRecord::Put {
            seq: 1,
            key: b"key00000000000000000001".to_vec(),
            value: b"phone_value1".to_vec(),
        },
        LogRecord::Put {
            seq: 2,
            key: b"key00000000000000000002".to_vec(),
            value: b"phone_value2".to_vec(),
        },
        LogRecord::Del {
            seq: 3,
            key: b"key00000000000000000001".to_vec(),
        },
    ]
}

/// Writes `records` through a real LogWriter and returns the raw file bytes.
fn encode(records: &[LogRecord]) -> Vec<u8> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("enc.log");
    let mut w = LogWriter::create(&path, false).unwrap();
    for r in records {
        w.append(r).unwrap();
    }
    w.sync_to_disk().unwrap();
    drop(w);
    std::fs::read(&path).unwrap()
}

/// Frames an arbitrary body with a valid CRC, bypassing LogWriter.
fn frame(body: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&hasher.finalize().to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

// -------------------- Roundtrip --------------------

#[test]
fn append_and_replay_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    let records = sample_records();
    {
        let mut w = LogWriter::create(&path, false).unwrap();
        for r in &records {
            w.append(r).unwrap();
        }
        w.sync_to_disk().unwrap();
    }

    let mut replayed = Vec::new();
    let mut r = LogReader::open(&path).unwrap();
    r.replay(|rec| replayed.push(rec)).unwrap();

    assert_eq!(replayed, records);
}

#[test]
fn next_record_pulls_one_at_a_time() {
    let bytes = encode(&sample_records());
    let mut r = LogReader::from_reader(Cursor::new(bytes));

    assert!(matches!(r.next_record().unwrap(), Some(LogRecord::Put { seq: 1, .. })));
    assert!(matches!(r.next_record().unwrap(), Some(LogRecord::Put { seq: 2, .. })));
    assert!(matches!(r.next_record().unwrap(), Some(LogRecord::Del { seq: 3, .. })));
    assert!(r.next_record().unwrap().is_none());
    // Stays exhausted
    assert!(r.next_record().unwrap().is_none());
}

#[test]
fn replay_empty_log_is_ok() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    drop(LogWriter::create(&path, false).unwrap());

    let mut count = 0;
    let mut r = LogReader::open(&path).unwrap();
    r.replay(|_| count += 1).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn append_is_durable_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = LogWriter::create(&path, true).unwrap();
        w.append(&LogRecord::Put {
            seq: 7,
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        })
        .unwrap();
    }
    // Reopen in append mode and add another record
    {
        let mut w = LogWriter::create(&path, true).unwrap();
        w.append(&LogRecord::Del {
            seq: 8,
            key: b"k".to_vec(),
        })
        .unwrap();
    }

    let mut replayed = Vec::new();
    LogReader::open(&path)
        .unwrap()
        .replay(|rec| replayed.push(rec))
        .unwrap();
    assert_eq!(replayed.len(), 2);
    assert!(matches!(replayed[1], LogRecord::Del { seq: 8, .. }));
}

#[test]
fn empty_value_roundtrips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    let rec = LogRecord::Put {
        seq: 1,
        key: b"k".to_vec(),
        value: Vec::new(),
    };
    let mut w = LogWriter::create(&path, false).unwrap();
    w.append(&rec).unwrap();
    drop(w);

    let mut replayed = Vec::new();
    LogReader::open(&path)
        .unwrap()
        .replay(|r| replayed.push(r))
        .unwrap();
    assert_eq!(replayed, vec![rec]);
}

// -------------------- Torn tails --------------------

#[test]
fn torn_body_is_end_of_log() {
    let bytes = encode(&sample_records());

    // Chop into the last record's body; the first two must still replay.
    let cut = bytes.len() - 10;
    let mut replayed = Vec::new();
    LogReader::from_reader(Cursor::new(&bytes[..cut]))
        .replay(|rec| replayed.push(rec))
        .unwrap();
    assert_eq!(replayed.len(), 2);
}

#[test]
fn torn_header_is_end_of_log() {
    let bytes = encode(&sample_records());

    // The last frame is the Del: 8-byte header + 36-byte body. Leave only
    // half of its header standing.
    let cut = bytes.len() - 40;
    let mut replayed = Vec::new();
    LogReader::from_reader(Cursor::new(&bytes[..cut]))
        .replay(|rec| replayed.push(rec))
        .unwrap();
    assert_eq!(replayed.len(), 2);
}

// -------------------- Corruption --------------------

#[test]
fn flipped_body_byte_fails_crc() {
    let mut bytes = encode(&sample_records());

    // Flip a byte inside the first record body (after the 8-byte header)
    bytes[12] ^= 0xff;

    let result = LogReader::from_reader(Cursor::new(bytes)).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}

#[test]
fn absurd_body_len_is_corrupt() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    let result = LogReader::from_reader(Cursor::new(bytes)).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}

#[test]
fn undersized_body_len_is_corrupt() {
    // A 5-byte body cannot hold op + seq + key_len, whatever its CRC says.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&5u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 5]);

    let result = LogReader::from_reader(Cursor::new(bytes)).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}

#[test]
fn unknown_op_code_is_corrupt() {
    // Well-framed body with op = 9
    let mut body = Vec::new();
    body.push(9);
    body.extend_from_slice(&1u64.to_le_bytes()); // seq
    body.extend_from_slice(&1u32.to_le_bytes()); // key_len
    body.push(b'k');

    let result = LogReader::from_reader(Cursor::new(frame(&body))).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}

#[test]
fn trailing_garbage_in_body_is_corrupt() {
    // A valid Del record with two stray bytes appended inside the frame;
    // the CRC covers them, so only the strict decode catches it.
    let mut body = Vec::new();
    body.push(1); // op = del
    body.extend_from_slice(&1u64.to_le_bytes());
    body.extend_from_slice(&1u32.to_le_bytes());
    body.push(b'k');
    body.extend_from_slice(b"xx");

    let result = LogReader::from_reader(Cursor::new(frame(&body))).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}

#[test]
fn key_len_past_body_end_is_corrupt() {
    // key_len claims more bytes than the body holds
    let mut body = Vec::new();
    body.push(0); // op = put
    body.extend_from_slice(&1u64.to_le_bytes());
    body.extend_from_slice(&1000u32.to_le_bytes()); // key_len >> remaining
    body.push(b'k');

    let result = LogReader::from_reader(Cursor::new(frame(&body))).replay(|_| {});
    assert!(matches!(result, Err(WalError::Corrupt)));
}
