// title/content.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of the encrypted content area of a title.

use std::io::Write;

use thiserror::Error;

use crate::title::crypto;
use crate::title::tmd::ContentRecord;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("no content exists with index {0}")]
    UnknownContentIndex(u16),
    #[error("no content exists with Content ID {0:#010X}")]
    UnknownContentId(u32),
    #[error("a content already exists with index {0}")]
    IndexInUse(u16),
    #[error("a content already exists with Content ID {0:#010X}")]
    ContentIdInUse(u32),
    #[error("expected {required} contents based on the content records but found {found}")]
    CountMismatch { required: usize, found: usize },
    #[error("content area holds {found} bytes but the content records describe {required}")]
    RegionTooSmall { required: usize, found: usize },
    #[error("content {index} hashed to {actual} but its record expects {expected}")]
    HashMismatch { index: u16, expected: String, actual: String },
    #[error("content data is not in a valid format")]
    IO(#[from] std::io::Error),
}

// Each stored content pairs a record with that content's ciphertext, which is kept at the
// 16-byte length AES needs rather than the 64-byte alignment used on disk.
#[derive(Debug, Clone)]
struct ContentSlot {
    record: ContentRecord,
    data: Vec<u8>,
}

fn align_16(value: usize) -> usize {
    (value + 15) & !15
}

fn align_64(value: usize) -> usize {
    (value + 63) & !63
}

/// The content area of a title: an ordered list of encrypted contents, each paired with the
/// content record that describes it. Contents are addressed by the index stored in their
/// record, not by their position in the list.
#[derive(Debug, Clone)]
pub struct ContentRegion {
    slots: Vec<ContentSlot>,
}

impl ContentRegion {
    /// Creates a new ContentRegion instance from the continuous content area of a WAD and the
    /// content records from the matching TMD, which act as the schema for splitting the area up.
    pub fn from_bytes(data: &[u8], content_records: &[ContentRecord]) -> Result<ContentRegion, ContentError> {
        let mut slots = Vec::with_capacity(content_records.len());
        let mut offset: usize = 0;
        for record in content_records {
            let stored_len = align_16(record.size as usize);
            let content = data.get(offset..offset + stored_len)
                .ok_or(ContentError::RegionTooSmall { required: offset + stored_len, found: data.len() })?;
            slots.push(ContentSlot {
                record: *record,
                data: content.to_vec(),
            });
            offset += align_64(record.size as usize);
        }
        Ok(ContentRegion { slots })
    }

    /// Creates a new ContentRegion instance from a list of individually encrypted contents (as
    /// downloaded from the NUS) and the content records from the matching TMD.
    pub fn from_parts(contents: Vec<Vec<u8>>, content_records: &[ContentRecord]) -> Result<ContentRegion, ContentError> {
        if contents.len() != content_records.len() {
            return Err(ContentError::CountMismatch {
                required: content_records.len(),
                found: contents.len(),
            });
        }
        let slots = content_records.iter().zip(contents)
            .map(|(record, mut data)| {
                data.resize(align_16(record.size as usize), 0);
                ContentSlot { record: *record, data }
            })
            .collect();
        Ok(ContentRegion { slots })
    }

    /// Dumps the entire ContentRegion back into binary data that can be stored in a WAD, with
    /// each content padded out to a 64-byte boundary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        for slot in self.slots.iter() {
            buf.write_all(&slot.data)?;
            buf.resize(align_64(buf.len()), 0);
        }
        Ok(buf)
    }

    /// Gets a copy of the content records describing the stored contents.
    pub fn content_records(&self) -> Vec<ContentRecord> {
        self.slots.iter().map(|slot| slot.record).collect()
    }

    /// Gets the number of contents stored in the region.
    pub fn num_contents(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, index: u16) -> Result<usize, ContentError> {
        self.slots.iter()
            .position(|slot| slot.record.index == index)
            .ok_or(ContentError::UnknownContentIndex(index))
    }

    /// Gets the index of the content with the specified Content ID.
    pub fn index_for_cid(&self, cid: u32) -> Result<u16, ContentError> {
        self.slots.iter()
            .find(|slot| slot.record.content_id == cid)
            .map(|slot| slot.record.index)
            .ok_or(ContentError::UnknownContentId(cid))
    }

    /// Gets the encrypted content with the specified index, trimmed to the size listed in its
    /// record.
    pub fn enc_content(&self, index: u16) -> Result<Vec<u8>, ContentError> {
        let slot = &self.slots[self.slot(index)?];
        let mut content = slot.data.clone();
        content.truncate(slot.record.size as usize);
        Ok(content)
    }

    /// Gets the encrypted content with the specified Content ID.
    pub fn enc_content_by_cid(&self, cid: u32) -> Result<Vec<u8>, ContentError> {
        self.enc_content(self.index_for_cid(cid)?)
    }

    /// Gets the decrypted content with the specified index. The decrypted data is hashed and
    /// checked against the content's record before it is returned.
    pub fn dec_content(&self, index: u16, title_key: [u8; 16]) -> Result<Vec<u8>, ContentError> {
        let slot = &self.slots[self.slot(index)?];
        let mut content = crypto::decrypt_content(&slot.data, title_key, slot.record.index);
        content.truncate(slot.record.size as usize);
        let actual = crypto::sha1(&content);
        if actual != slot.record.hash {
            return Err(ContentError::HashMismatch {
                index,
                expected: hex::encode(slot.record.hash),
                actual: hex::encode(actual),
            });
        }
        Ok(content)
    }

    /// Gets the decrypted content with the specified Content ID.
    pub fn dec_content_by_cid(&self, cid: u32, title_key: [u8; 16]) -> Result<Vec<u8>, ContentError> {
        self.dec_content(self.index_for_cid(cid)?, title_key)
    }

    /// Replaces the content with the specified index with new decrypted data, encrypting it with
    /// the provided Title Key. The content's record is updated with the new size and hash.
    pub fn set_content(&mut self, index: u16, content: &[u8], title_key: [u8; 16]) -> Result<(), ContentError> {
        let position = self.slot(index)?;
        let slot = &mut self.slots[position];
        slot.record.size = content.len() as u64;
        slot.record.hash = crypto::sha1(content);
        slot.data = crypto::encrypt_content(content, title_key, slot.record.index);
        Ok(())
    }

    /// Adds a new content to the end of the region. The record supplies the Content ID, index,
    /// and kind; its size and hash are recomputed from the provided decrypted data, which is
    /// encrypted with the provided Title Key. The record's index and Content ID must not already
    /// be in use.
    pub fn add_content(&mut self, record: ContentRecord, content: &[u8], title_key: [u8; 16]) -> Result<(), ContentError> {
        if self.slots.iter().any(|slot| slot.record.index == record.index) {
            return Err(ContentError::IndexInUse(record.index));
        }
        if self.slots.iter().any(|slot| slot.record.content_id == record.content_id) {
            return Err(ContentError::ContentIdInUse(record.content_id));
        }
        let mut record = record;
        record.size = content.len() as u64;
        record.hash = crypto::sha1(content);
        let data = crypto::encrypt_content(content, title_key, record.index);
        self.slots.push(ContentSlot { record, data });
        Ok(())
    }

    /// Removes the content with the specified index from the region and returns its record. This
    /// may leave a gap in the recorded indices, which correctly written WAD parsers tolerate.
    pub fn remove_content(&mut self, index: u16) -> Result<ContentRecord, ContentError> {
        let position = self.slot(index)?;
        Ok(self.slots.remove(position).record)
    }
}

/// A single Content ID/hash pairing from a /shared1/content.map file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedContentEntry {
    pub name_id: u32,
    pub hash: [u8; 20],
}

/// A parsed /shared1/content.map file, which names the shared contents installed to a NAND.
#[derive(Debug, Default)]
pub struct SharedContentMap {
    pub entries: Vec<SharedContentEntry>,
}

#[derive(Debug, Error)]
pub enum SharedContentMapError {
    #[error("content.map is an invalid length and cannot be parsed")]
    InvalidLength,
    #[error("found invalid shared content name `{0}`")]
    InvalidName(String),
    #[error("content.map data is not in a valid format")]
    IO(#[from] std::io::Error),
}

impl SharedContentMap {
    /// Creates a new, empty SharedContentMap instance.
    pub fn new() -> Self {
        SharedContentMap { entries: Vec::new() }
    }

    /// Creates a new SharedContentMap instance from the binary data of a content.map file. Each
    /// entry is 28 bytes: an 8-character hex file name followed by a SHA-1 hash.
    pub fn from_bytes(data: &[u8]) -> Result<SharedContentMap, SharedContentMapError> {
        if data.len() % 28 != 0 {
            return Err(SharedContentMapError::InvalidLength);
        }
        let mut entries = Vec::with_capacity(data.len() / 28);
        for chunk in data.chunks_exact(28) {
            // The file names are stored as literal hex characters rather than numbers.
            let name = String::from_utf8_lossy(&chunk[0..8]);
            let name_id = u32::from_str_radix(&name, 16)
                .map_err(|_| SharedContentMapError::InvalidName(name.to_string()))?;
            entries.push(SharedContentEntry {
                name_id,
                hash: chunk[8..28].try_into().unwrap(),
            });
        }
        Ok(SharedContentMap { entries })
    }

    /// Dumps the data in a SharedContentMap back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        for entry in self.entries.iter() {
            buf.write_all(format!("{:08x}", entry.name_id).as_bytes())?;
            buf.write_all(&entry.hash)?;
        }
        Ok(buf)
    }

    /// Registers a shared content hash in the map and assigns it the next file name, returning
    /// that name. Returns None if the hash is already present.
    pub fn add(&mut self, hash: [u8; 20]) -> Option<String> {
        if self.entries.iter().any(|entry| entry.hash == hash) {
            return None;
        }
        let name_id = self.entries.iter()
            .map(|entry| entry.name_id + 1)
            .max()
            .unwrap_or(0);
        self.entries.push(SharedContentEntry { name_id, hash });
        Some(format!("{:08x}", name_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::title::tmd::ContentKind;

    const TITLE_KEY: [u8; 16] = [0x5A; 16];

    fn build_region(contents: &[&[u8]]) -> ContentRegion {
        let mut records = Vec::new();
        let mut blob: Vec<u8> = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            records.push(ContentRecord {
                content_id: 0x20 + i as u32,
                index: i as u16,
                kind: ContentKind::Normal,
                size: content.len() as u64,
                hash: crypto::sha1(content),
            });
            blob.extend(crypto::encrypt_content(content, TITLE_KEY, i as u16));
            blob.resize(align_64(blob.len()), 0);
        }
        ContentRegion::from_bytes(&blob, &records).unwrap()
    }

    #[test]
    fn test_content_round_trip() {
        let region = build_region(&[b"first content", &[0xAB; 80]]);
        assert_eq!(region.dec_content(0, TITLE_KEY).unwrap(), b"first content".to_vec());
        assert_eq!(region.dec_content(1, TITLE_KEY).unwrap(), vec![0xAB; 80]);
        assert_eq!(region.dec_content_by_cid(0x21, TITLE_KEY).unwrap(), vec![0xAB; 80]);
    }

    #[test]
    fn test_set_content_updates_record() {
        let mut region = build_region(&[b"first content"]);
        region.set_content(0, b"\x42", TITLE_KEY).unwrap();
        let record = region.content_records()[0];
        assert_eq!(record.size, 1);
        assert_eq!(record.hash, crypto::sha1(b"\x42"));
        assert_eq!(region.dec_content(0, TITLE_KEY).unwrap(), b"\x42".to_vec());
    }

    #[test]
    fn test_hash_mismatch() {
        let mut region = build_region(&[&[0xCD; 40]]);
        // Flip a single ciphertext byte.
        region.slots[0].data[5] ^= 0x01;
        match region.dec_content(0, TITLE_KEY) {
            Err(ContentError::HashMismatch { index: 0, .. }) => {},
            other => panic!("expected hash mismatch, got {:?}", other),
        }
        // The encrypted form must still be readable for callers that opt out of verification.
        assert!(region.enc_content(0).is_ok());
    }

    #[test]
    fn test_add_and_remove_content() {
        let mut region = build_region(&[b"first content"]);
        let record = ContentRecord {
            content_id: 0x99,
            index: 7,
            kind: ContentKind::Shared,
            size: 0,
            hash: [0u8; 20],
        };
        region.add_content(record, b"second content", TITLE_KEY).unwrap();
        assert_eq!(region.num_contents(), 2);
        assert_eq!(region.dec_content(7, TITLE_KEY).unwrap(), b"second content".to_vec());
        assert!(matches!(
            region.add_content(record, b"again", TITLE_KEY),
            Err(ContentError::IndexInUse(7))
        ));
        let removed = region.remove_content(7).unwrap();
        assert_eq!(removed.content_id, 0x99);
        assert!(matches!(region.dec_content(7, TITLE_KEY), Err(ContentError::UnknownContentIndex(7))));
    }

    #[test]
    fn test_region_serialization_is_aligned() {
        let region = build_region(&[b"first content", &[0xAB; 80], b"\x42"]);
        let blob = region.to_bytes().unwrap();
        assert_eq!(blob.len() % 64, 0);
        let reparsed = ContentRegion::from_bytes(&blob, &region.content_records()).unwrap();
        assert_eq!(reparsed.dec_content(2, TITLE_KEY).unwrap(), b"\x42".to_vec());
    }

    #[test]
    fn test_region_too_small() {
        let records = [ContentRecord {
            content_id: 0,
            index: 0,
            kind: ContentKind::Normal,
            size: 1024,
            hash: [0u8; 20],
        }];
        assert!(matches!(
            ContentRegion::from_bytes(&[0u8; 64], &records),
            Err(ContentError::RegionTooSmall { .. })
        ));
    }

    #[test]
    fn test_shared_content_map() {
        let mut map = SharedContentMap::new();
        assert_eq!(map.add([0x10; 20]).unwrap(), "00000000");
        assert_eq!(map.add([0x20; 20]).unwrap(), "00000001");
        assert_eq!(map.add([0x10; 20]), None);
        let data = map.to_bytes().unwrap();
        assert_eq!(data.len(), 56);
        let reparsed = SharedContentMap::from_bytes(&data).unwrap();
        assert_eq!(reparsed.entries, map.entries);
        assert!(SharedContentMap::from_bytes(&data[..27]).is_err());
    }
}
