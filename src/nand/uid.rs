// nand/uid.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of the /sys/uid.sys file, which maps Title IDs to UIDs.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UidSysError {
    #[error("uid.sys is an invalid length and cannot be parsed")]
    InvalidLength,
    #[error("uid.sys data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// A single Title ID/UID pairing from a uid.sys file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidSysEntry {
    pub title_id: u64,
    pub uid: u32,
}

/// A parsed /sys/uid.sys file. ES assigns each title it touches a UID here, starting from
/// 0x1000, and titles missing from the file do not show up on the Wii Menu.
#[derive(Debug)]
pub struct UidSys {
    entries: Vec<UidSysEntry>,
}

impl Default for UidSys {
    fn default() -> Self {
        Self::new()
    }
}

impl UidSys {
    /// Creates a new UidSys instance, seeded with the Wii Menu's entry at UID 0x1000.
    pub fn new() -> Self {
        UidSys {
            entries: vec![UidSysEntry { title_id: 0x0000000100000002, uid: 0x1000 }],
        }
    }

    /// Creates a new UidSys instance from the binary data of a uid.sys file. Each entry is 12
    /// bytes long, so anything else is rejected.
    pub fn from_bytes(data: &[u8]) -> Result<UidSys, UidSysError> {
        if data.len() % 12 != 0 {
            return Err(UidSysError::InvalidLength);
        }
        let mut buf = Cursor::new(data);
        let mut entries = Vec::with_capacity(data.len() / 12);
        for _ in 0..data.len() / 12 {
            let title_id = buf.read_u64::<BigEndian>()?;
            let uid = buf.read_u32::<BigEndian>()?;
            entries.push(UidSysEntry { title_id, uid });
        }
        Ok(UidSys { entries })
    }

    /// Dumps the data in a UidSys instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, UidSysError> {
        let mut buf: Vec<u8> = Vec::new();
        for entry in self.entries.iter() {
            buf.write_u64::<BigEndian>(entry.title_id)?;
            buf.write_u32::<BigEndian>(entry.uid)?;
        }
        Ok(buf)
    }

    /// Gets the entries stored in the uid.sys file.
    pub fn entries(&self) -> &[UidSysEntry] {
        &self.entries
    }

    /// Registers a Title ID and assigns it the next free UID, returning that UID. Returns None
    /// if the Title ID is already present.
    pub fn add(&mut self, title_id: u64) -> Option<u32> {
        if self.entries.iter().any(|entry| entry.title_id == title_id) {
            return None;
        }
        let uid = self.entries.iter()
            .map(|entry| entry.uid)
            .max()
            .unwrap_or(0xFFF) + 1;
        self.entries.push(UidSysEntry { title_id, uid });
        Some(uid)
    }
}
