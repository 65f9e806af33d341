// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Store file format
//!
//! ```text
//! +--------+----------+----------------------------+
//! | magic  | crc32 LE | bincode(buckets)           |
//! | 4 B    | 4 B      | remaining bytes            |
//! +--------+----------+----------------------------+
//! ```
//!
//! The snapshot is written to a temporary file next to the store and renamed
//! over it, so a crash mid-write leaves the previous snapshot intact.

use super::BucketMap;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use hubhistory_core::{HistoryError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

const MAGIC: &[u8; 4] = b"HHKV";
const HEADER_LEN: usize = 8;

pub(crate) fn save(path: &Path, buckets: &BTreeMap<String, BucketMap>) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let body = bincode::serialize(buckets)?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    bytes.extend_from_slice(&body);

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<BTreeMap<String, BucketMap>> {
    let bytes = fs::read(path)?;
    let corrupt = |reason: String| HistoryError::CorruptStore {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("file too short ({} bytes)", bytes.len())));
    }
    if &bytes[..4] != MAGIC {
        return Err(corrupt("bad magic".to_string()));
    }
    let expected = LittleEndian::read_u32(&bytes[4..HEADER_LEN]);
    let body = &bytes[HEADER_LEN..];
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(corrupt(format!(
            "checksum mismatch (expected {:08x}, got {:08x})",
            expected, actual
        )));
    }
    bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, BucketMap> {
        let mut kv = BucketMap::new();
        kv.insert("00000000000000000001/temperature/e".to_string(), b"12.5".to_vec());
        let mut buckets = BTreeMap::new();
        buckets.insert("agent1/thing1".to_string(), kv);
        buckets.insert("empty".to_string(), BucketMap::new());
        buckets
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.kvbtree");
        save(&path, &sample()).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(load(&path).unwrap(), sample());
    }

    #[test]
    fn test_flipped_byte_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvbtree");
        save(&path, &sample()).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(load(&path), Err(HistoryError::CorruptStore { .. })));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.kvbtree");
        fs::write(&path, b"HHK").unwrap();
        assert!(matches!(load(&path), Err(HistoryError::CorruptStore { .. })));
    }
}
