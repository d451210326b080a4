// title/tmd.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of TMD (Title Metadata) files.

use std::fmt;
use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::title::crypto;
use crate::title::signing::{SignatureBlock, SignatureError, SignatureType};

#[derive(Debug, Error)]
pub enum TmdError {
    #[error("no 16-bit counter value produces a fakesigned TMD")]
    FakesignFailed,
    #[error("content record carries unknown content kind `{0:#06X}`")]
    UnknownContentKind(u16),
    #[error("content records contain duplicate index {0}")]
    DuplicateContentIndex(u16),
    #[error("a content record already exists with content ID {0:#010X}")]
    DuplicateContentId(u32),
    #[error("no content record exists with index {0}")]
    UnknownContentIndex(u16),
    #[error("no content record exists with content ID {0:#010X}")]
    UnknownContentId(u32),
    #[error("boot index {boot_index} does not name one of the {num_contents} contents")]
    BadBootIndex { boot_index: u16, num_contents: u16 },
    #[error("signature issuer string must not exceed 64 bytes (was {0})")]
    IssuerTooLong(usize),
    #[error("`{0:016x}` is not a valid IOS Title ID")]
    InvalidIosTitleId(u64),
    #[error("signature processing error")]
    Signature(#[from] SignatureError),
    #[error("TMD data is not in a valid format")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Normal,
    Dlc,
    Shared,
}

impl ContentKind {
    /// Matches a content type value from a content record to a content kind.
    pub fn from_u16(value: u16) -> Result<ContentKind, TmdError> {
        match value {
            0x0001 => Ok(ContentKind::Normal),
            0x4001 => Ok(ContentKind::Dlc),
            0x8001 => Ok(ContentKind::Shared),
            other => Err(TmdError::UnknownContentKind(other)),
        }
    }

    /// Gets the content type value stored in a content record for this kind.
    pub fn as_u16(&self) -> u16 {
        match self {
            ContentKind::Normal => 0x0001,
            ContentKind::Dlc => 0x4001,
            ContentKind::Shared => 0x8001,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContentKind::Normal => write!(f, "Normal"),
            ContentKind::Dlc => write!(f, "DLC"),
            ContentKind::Shared => write!(f, "Shared"),
        }
    }
}

/// The metadata describing a single content belonging to a title: its Content ID, its index
/// within the title, its kind, and the size and SHA-1 hash of its decrypted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRecord {
    pub content_id: u32,
    pub index: u16,
    pub kind: ContentKind,
    pub size: u64,
    pub hash: [u8; 20],
}

impl ContentRecord {
    fn parse(buf: &mut Cursor<&[u8]>) -> Result<ContentRecord, TmdError> {
        let content_id = buf.read_u32::<BigEndian>()?;
        let index = buf.read_u16::<BigEndian>()?;
        let kind = ContentKind::from_u16(buf.read_u16::<BigEndian>()?)?;
        let size = buf.read_u64::<BigEndian>()?;
        let mut hash = [0u8; 20];
        buf.read_exact(&mut hash)?;
        Ok(ContentRecord {
            content_id,
            index,
            kind,
            size,
            hash,
        })
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), std::io::Error> {
        buf.write_u32::<BigEndian>(self.content_id)?;
        buf.write_u16::<BigEndian>(self.index)?;
        buf.write_u16::<BigEndian>(self.kind.as_u16())?;
        buf.write_u64::<BigEndian>(self.size)?;
        buf.write_all(&self.hash)?;
        Ok(())
    }
}

/// A parsed TMD (Title Metadata) file, the signed structure that describes the identity,
/// version, and contents of a title.
#[derive(Debug, Clone)]
pub struct Tmd {
    signature: SignatureBlock,
    issuer: [u8; 64],
    version: u8,
    ca_crl_version: u8,
    signer_crl_version: u8,
    is_vwii: u8,
    ios_tid: u64,
    title_id: u64,
    title_type: u32,
    group_id: u16,
    zero: [u8; 2],
    region: u16,
    ratings: [u8; 16],
    reserved1: [u8; 12],
    ipc_mask: [u8; 12],
    reserved2: [u8; 18],
    access_rights: u32,
    title_version: u16,
    boot_index: u16,
    minor_version: u16, // Normally unused, which makes it the fakesign scratch slot.
    content_records: Vec<ContentRecord>,
}

impl Tmd {
    /// Creates a new Tmd instance from the binary data of a TMD file.
    pub fn from_bytes(data: &[u8]) -> Result<Tmd, TmdError> {
        let mut buf = Cursor::new(data);
        let signature = SignatureBlock::parse(&mut buf)?;
        let mut issuer = [0u8; 64];
        buf.read_exact(&mut issuer)?;
        let version = buf.read_u8()?;
        let ca_crl_version = buf.read_u8()?;
        let signer_crl_version = buf.read_u8()?;
        let is_vwii = buf.read_u8()?;
        let ios_tid = buf.read_u64::<BigEndian>()?;
        let title_id = buf.read_u64::<BigEndian>()?;
        let title_type = buf.read_u32::<BigEndian>()?;
        let group_id = buf.read_u16::<BigEndian>()?;
        let mut zero = [0u8; 2];
        buf.read_exact(&mut zero)?;
        let region = buf.read_u16::<BigEndian>()?;
        let mut ratings = [0u8; 16];
        buf.read_exact(&mut ratings)?;
        let mut reserved1 = [0u8; 12];
        buf.read_exact(&mut reserved1)?;
        let mut ipc_mask = [0u8; 12];
        buf.read_exact(&mut ipc_mask)?;
        let mut reserved2 = [0u8; 18];
        buf.read_exact(&mut reserved2)?;
        let access_rights = buf.read_u32::<BigEndian>()?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let num_contents = buf.read_u16::<BigEndian>()?;
        let boot_index = buf.read_u16::<BigEndian>()?;
        let minor_version = buf.read_u16::<BigEndian>()?;
        let mut content_records = Vec::with_capacity(num_contents as usize);
        for _ in 0..num_contents {
            content_records.push(ContentRecord::parse(&mut buf)?);
        }
        Ok(Tmd {
            signature,
            issuer,
            version,
            ca_crl_version,
            signer_crl_version,
            is_vwii,
            ios_tid,
            title_id,
            title_type,
            group_id,
            zero,
            region,
            ratings,
            reserved1,
            ipc_mask,
            reserved2,
            access_rights,
            title_version,
            boot_index,
            minor_version,
            content_records,
        })
    }

    /// Dumps the data in a Tmd instance back into binary data that can be written to a file.
    /// The content count is recomputed from the record list, record indices must be unique, and
    /// the boot index must name one of the recorded contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TmdError> {
        for (i, record) in self.content_records.iter().enumerate() {
            if self.content_records[..i].iter().any(|other| other.index == record.index) {
                return Err(TmdError::DuplicateContentIndex(record.index));
            }
        }
        if self.boot_index as usize >= self.content_records.len().max(1) {
            return Err(TmdError::BadBootIndex {
                boot_index: self.boot_index,
                num_contents: self.content_records.len() as u16,
            });
        }
        let mut buf: Vec<u8> = Vec::new();
        self.signature.write_to(&mut buf)?;
        buf.write_all(&self.issuer)?;
        buf.write_u8(self.version)?;
        buf.write_u8(self.ca_crl_version)?;
        buf.write_u8(self.signer_crl_version)?;
        buf.write_u8(self.is_vwii)?;
        buf.write_u64::<BigEndian>(self.ios_tid)?;
        buf.write_u64::<BigEndian>(self.title_id)?;
        buf.write_u32::<BigEndian>(self.title_type)?;
        buf.write_u16::<BigEndian>(self.group_id)?;
        buf.write_all(&self.zero)?;
        buf.write_u16::<BigEndian>(self.region)?;
        buf.write_all(&self.ratings)?;
        buf.write_all(&self.reserved1)?;
        buf.write_all(&self.ipc_mask)?;
        buf.write_all(&self.reserved2)?;
        buf.write_u32::<BigEndian>(self.access_rights)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_u16::<BigEndian>(self.content_records.len() as u16)?;
        buf.write_u16::<BigEndian>(self.boot_index)?;
        buf.write_u16::<BigEndian>(self.minor_version)?;
        for record in self.content_records.iter() {
            record.write_to(&mut buf)?;
        }
        Ok(buf)
    }

    /// Gets the signature block at the head of the TMD.
    pub fn signature_block(&self) -> &SignatureBlock {
        &self.signature
    }

    /// Gets the type of the signature on the TMD.
    pub fn signature_type(&self) -> SignatureType {
        self.signature.sig_type()
    }

    /// Gets the signature of the TMD.
    pub fn signature(&self) -> &[u8] {
        self.signature.signature()
    }

    /// Gets the offset of the signed body within the serialized TMD.
    pub fn body_offset(&self) -> usize {
        self.signature.body_offset()
    }

    /// Gets the name of the certificate used to sign the TMD as a string.
    pub fn issuer(&self) -> String {
        String::from_utf8_lossy(&self.issuer).trim_end_matches('\0').to_owned()
    }

    /// Sets a new name for the certificate used to sign the TMD.
    pub fn set_issuer(&mut self, issuer: &str) -> Result<(), TmdError> {
        if issuer.len() > 64 {
            return Err(TmdError::IssuerTooLong(issuer.len()));
        }
        let mut bytes = issuer.as_bytes().to_vec();
        bytes.resize(64, 0);
        self.issuer = bytes.try_into().unwrap();
        Ok(())
    }

    /// Gets the version of the TMD file format.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Gets the version of the CA CRL listed in the TMD.
    pub fn ca_crl_version(&self) -> u8 {
        self.ca_crl_version
    }

    /// Gets the version of the signer CRL listed in the TMD.
    pub fn signer_crl_version(&self) -> u8 {
        self.signer_crl_version
    }

    /// Gets whether the TMD describes a vWii title.
    pub fn is_vwii(&self) -> bool {
        self.is_vwii == 1
    }

    /// Sets whether the TMD describes a vWii title.
    pub fn set_is_vwii(&mut self, is_vwii: bool) {
        self.is_vwii = is_vwii as u8;
    }

    /// Gets the Title ID of the IOS the title runs under.
    pub fn ios_tid(&self) -> u64 {
        self.ios_tid
    }

    /// Sets the Title ID of the IOS the title runs under. The ID must name an IOS, which means a
    /// high half of 00000001 and a version in the range 3-255.
    pub fn set_ios_tid(&mut self, ios_tid: u64) -> Result<(), TmdError> {
        if ios_tid >> 32 != 1 || !(3..=255).contains(&(ios_tid & 0xFFFFFFFF)) {
            return Err(TmdError::InvalidIosTitleId(ios_tid));
        }
        self.ios_tid = ios_tid;
        Ok(())
    }

    /// Gets the Title ID of the title the TMD describes.
    pub fn title_id(&self) -> u64 {
        self.title_id
    }

    /// Sets a new Title ID for the title the TMD describes.
    pub fn set_title_id(&mut self, title_id: u64) {
        self.title_id = title_id;
    }

    /// Gets the type of the title the TMD describes.
    pub fn title_type(&self) -> u32 {
        self.title_type
    }

    /// Sets the type of the title the TMD describes.
    pub fn set_title_type(&mut self, title_type: u32) {
        self.title_type = title_type;
    }

    /// Gets the group ID listed in the TMD.
    pub fn group_id(&self) -> u16 {
        self.group_id
    }

    /// Sets the group ID listed in the TMD.
    pub fn set_group_id(&mut self, group_id: u16) {
        self.group_id = group_id;
    }

    /// Gets the region code listed in the TMD.
    pub fn region(&self) -> u16 {
        self.region
    }

    /// Sets the region code listed in the TMD.
    pub fn set_region(&mut self, region: u16) {
        self.region = region;
    }

    /// Gets the 3-letter code of the region the TMD was created for.
    pub fn region_name(&self) -> &str {
        match self.region {
            0 => "JPN",
            1 => "USA",
            2 => "EUR",
            3 => "None",
            4 => "KOR",
            _ => "Unknown",
        }
    }

    /// Gets the age ratings listed in the TMD.
    pub fn ratings(&self) -> [u8; 16] {
        self.ratings
    }

    /// Sets the age ratings listed in the TMD.
    pub fn set_ratings(&mut self, ratings: [u8; 16]) {
        self.ratings = ratings;
    }

    /// Gets the IPC mask listed in the TMD.
    pub fn ipc_mask(&self) -> [u8; 12] {
        self.ipc_mask
    }

    /// Sets the IPC mask listed in the TMD.
    pub fn set_ipc_mask(&mut self, ipc_mask: [u8; 12]) {
        self.ipc_mask = ipc_mask;
    }

    /// Gets the access rights flags listed in the TMD. Bit 0 grants AHB access and bit 1 grants
    /// DVD Video access.
    pub fn access_rights(&self) -> u32 {
        self.access_rights
    }

    /// Sets the access rights flags listed in the TMD.
    pub fn set_access_rights(&mut self, access_rights: u32) {
        self.access_rights = access_rights;
    }

    /// Gets the version of the title listed in the TMD.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Sets the version of the title listed in the TMD.
    pub fn set_title_version(&mut self, title_version: u16) {
        self.title_version = title_version;
    }

    /// Gets the number of contents listed in the TMD.
    pub fn num_contents(&self) -> u16 {
        self.content_records.len() as u16
    }

    /// Gets the index of the title's boot content.
    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    /// Sets the index of the title's boot content. The index must name one of the recorded
    /// contents.
    pub fn set_boot_index(&mut self, boot_index: u16) -> Result<(), TmdError> {
        if !self.content_records.iter().any(|record| record.index == boot_index) {
            return Err(TmdError::BadBootIndex {
                boot_index,
                num_contents: self.content_records.len() as u16,
            });
        }
        self.boot_index = boot_index;
        Ok(())
    }

    /// Gets the minor version listed in the TMD. This field is typically unused.
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    /// Gets the content records from the TMD.
    pub fn content_records(&self) -> &[ContentRecord] {
        &self.content_records
    }

    /// Replaces the content records in the TMD.
    pub fn set_content_records(&mut self, content_records: &[ContentRecord]) {
        self.content_records = content_records.to_vec();
    }

    /// Gets the content record with the specified index.
    pub fn content_record(&self, index: u16) -> Result<&ContentRecord, TmdError> {
        self.content_records.iter()
            .find(|record| record.index == index)
            .ok_or(TmdError::UnknownContentIndex(index))
    }

    /// Gets the content record with the specified Content ID.
    pub fn content_record_by_cid(&self, cid: u32) -> Result<&ContentRecord, TmdError> {
        self.content_records.iter()
            .find(|record| record.content_id == cid)
            .ok_or(TmdError::UnknownContentId(cid))
    }

    /// Adds a new content record to the TMD, keeping the record list sorted by index. The new
    /// record's index and Content ID must not already be in use.
    pub fn add_content_record(&mut self, record: ContentRecord) -> Result<(), TmdError> {
        if self.content_records.iter().any(|other| other.index == record.index) {
            return Err(TmdError::DuplicateContentIndex(record.index));
        }
        if self.content_records.iter().any(|other| other.content_id == record.content_id) {
            return Err(TmdError::DuplicateContentId(record.content_id));
        }
        let position = self.content_records.iter()
            .position(|other| other.index > record.index)
            .unwrap_or(self.content_records.len());
        self.content_records.insert(position, record);
        Ok(())
    }

    /// Removes the content record with the specified index from the TMD and returns it.
    pub fn remove_content_record(&mut self, index: u16) -> Result<ContentRecord, TmdError> {
        let position = self.content_records.iter()
            .position(|record| record.index == index)
            .ok_or(TmdError::UnknownContentIndex(index))?;
        Ok(self.content_records.remove(position))
    }

    /// Gets whether the TMD is fakesigned using the strncmp (trucha) bug or not.
    pub fn is_fakesigned(&self) -> bool {
        if !self.signature.is_zeroed() {
            return false;
        }
        let body = match self.to_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        crypto::sha1(&body[self.body_offset()..])[0] == 0
    }

    /// Fakesigns the TMD for use with the strncmp (trucha) bug. The signature is zeroed and the
    /// unused minor version field is incremented until the body hash gains a leading zero byte.
    pub fn fakesign(&mut self) -> Result<(), TmdError> {
        self.signature.zero();
        let body_offset = self.body_offset();
        for counter in 0..=u16::MAX {
            self.minor_version = counter;
            let body = self.to_bytes()?;
            if crypto::sha1(&body[body_offset..])[0] == 0 {
                return Ok(());
            }
        }
        Err(TmdError::FakesignFailed)
    }
}
