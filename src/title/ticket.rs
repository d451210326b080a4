// title/ticket.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of Ticket files, including Title Key handling.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::title::crypto;
use crate::title::keys::KeyError;
use crate::title::signing::{SignatureBlock, SignatureError, SignatureType};

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket is version `{0}` but only v0 is supported")]
    UnsupportedVersion(u8),
    #[error("no 16-bit counter value produces a fakesigned Ticket")]
    FakesignFailed,
    #[error("signature issuer string must not exceed 64 bytes (was {0})")]
    IssuerTooLong(usize),
    #[error("common key error")]
    Key(#[from] KeyError),
    #[error("signature processing error")]
    Signature(#[from] SignatureError),
    #[error("Ticket data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// A single usage limit entry from a Ticket: the kind of limit being enforced and its maximum
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimit {
    pub enabled: u32,
    pub seconds: u32,
}

/// A parsed Ticket file, the signed license that carries the wrapped Title Key for a title.
#[derive(Debug, Clone)]
pub struct Ticket {
    signature: SignatureBlock,
    issuer: [u8; 64],
    ecdh_data: [u8; 60],
    format_version: u8,
    reserved1: [u8; 2],
    title_key_enc: [u8; 16],
    unknown1: u8,
    ticket_id: u64,
    console_id: u32,
    title_id: u64,
    unknown2: [u8; 2],
    title_version: u16,
    permitted_titles_mask: u32,
    permit_mask: u32,
    export_allowed: u8,
    common_key_index: u8,
    reserved2: [u8; 48], // The last two bytes double as the fakesign scratch slot.
    content_access: [u8; 64],
    padding: [u8; 2],
    limits: [TimeLimit; 8],
}

impl Ticket {
    /// Creates a new Ticket instance from the binary data of a Ticket file.
    pub fn from_bytes(data: &[u8]) -> Result<Ticket, TicketError> {
        let mut buf = Cursor::new(data);
        let signature = SignatureBlock::parse(&mut buf)?;
        let mut issuer = [0u8; 64];
        buf.read_exact(&mut issuer)?;
        let mut ecdh_data = [0u8; 60];
        buf.read_exact(&mut ecdh_data)?;
        let format_version = buf.read_u8()?;
        // v1 Tickets carry extra sections this layout does not describe.
        if format_version != 0 {
            return Err(TicketError::UnsupportedVersion(format_version));
        }
        let mut reserved1 = [0u8; 2];
        buf.read_exact(&mut reserved1)?;
        let mut title_key_enc = [0u8; 16];
        buf.read_exact(&mut title_key_enc)?;
        let unknown1 = buf.read_u8()?;
        let ticket_id = buf.read_u64::<BigEndian>()?;
        let console_id = buf.read_u32::<BigEndian>()?;
        let title_id = buf.read_u64::<BigEndian>()?;
        let mut unknown2 = [0u8; 2];
        buf.read_exact(&mut unknown2)?;
        let title_version = buf.read_u16::<BigEndian>()?;
        let permitted_titles_mask = buf.read_u32::<BigEndian>()?;
        let permit_mask = buf.read_u32::<BigEndian>()?;
        let export_allowed = buf.read_u8()?;
        let common_key_index = buf.read_u8()?;
        let mut reserved2 = [0u8; 48];
        buf.read_exact(&mut reserved2)?;
        let mut content_access = [0u8; 64];
        buf.read_exact(&mut content_access)?;
        let mut padding = [0u8; 2];
        buf.read_exact(&mut padding)?;
        let mut limits = [TimeLimit { enabled: 0, seconds: 0 }; 8];
        for limit in limits.iter_mut() {
            limit.enabled = buf.read_u32::<BigEndian>()?;
            limit.seconds = buf.read_u32::<BigEndian>()?;
        }
        Ok(Ticket {
            signature,
            issuer,
            ecdh_data,
            format_version,
            reserved1,
            title_key_enc,
            unknown1,
            ticket_id,
            console_id,
            title_id,
            unknown2,
            title_version,
            permitted_titles_mask,
            permit_mask,
            export_allowed,
            common_key_index,
            reserved2,
            content_access,
            padding,
            limits,
        })
    }

    /// Dumps the data in a Ticket instance back into binary data that can be written to a file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf: Vec<u8> = Vec::new();
        self.signature.write_to(&mut buf)?;
        buf.write_all(&self.issuer)?;
        buf.write_all(&self.ecdh_data)?;
        buf.write_u8(self.format_version)?;
        buf.write_all(&self.reserved1)?;
        buf.write_all(&self.title_key_enc)?;
        buf.write_u8(self.unknown1)?;
        buf.write_u64::<BigEndian>(self.ticket_id)?;
        buf.write_u32::<BigEndian>(self.console_id)?;
        buf.write_u64::<BigEndian>(self.title_id)?;
        buf.write_all(&self.unknown2)?;
        buf.write_u16::<BigEndian>(self.title_version)?;
        buf.write_u32::<BigEndian>(self.permitted_titles_mask)?;
        buf.write_u32::<BigEndian>(self.permit_mask)?;
        buf.write_u8(self.export_allowed)?;
        buf.write_u8(self.common_key_index)?;
        buf.write_all(&self.reserved2)?;
        buf.write_all(&self.content_access)?;
        buf.write_all(&self.padding)?;
        for limit in self.limits.iter() {
            buf.write_u32::<BigEndian>(limit.enabled)?;
            buf.write_u32::<BigEndian>(limit.seconds)?;
        }
        Ok(buf)
    }

    /// Gets the signature block at the head of the Ticket.
    pub fn signature_block(&self) -> &SignatureBlock {
        &self.signature
    }

    /// Gets the type of the signature on the Ticket.
    pub fn signature_type(&self) -> SignatureType {
        self.signature.sig_type()
    }

    /// Gets the signature of the Ticket.
    pub fn signature(&self) -> &[u8] {
        self.signature.signature()
    }

    /// Gets the offset of the signed body within the serialized Ticket.
    pub fn body_offset(&self) -> usize {
        self.signature.body_offset()
    }

    /// Gets the name of the certificate used to sign the Ticket as a string.
    pub fn issuer(&self) -> String {
        String::from_utf8_lossy(&self.issuer).trim_end_matches('\0').to_owned()
    }

    /// Sets a new name for the certificate used to sign the Ticket.
    pub fn set_issuer(&mut self, issuer: &str) -> Result<(), TicketError> {
        if issuer.len() > 64 {
            return Err(TicketError::IssuerTooLong(issuer.len()));
        }
        let mut bytes = issuer.as_bytes().to_vec();
        bytes.resize(64, 0);
        self.issuer = bytes.try_into().unwrap();
        Ok(())
    }

    /// Gets the ECDH data listed in the Ticket.
    pub fn ecdh_data(&self) -> [u8; 60] {
        self.ecdh_data
    }

    /// Gets the version of the Ticket file format.
    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    /// Gets the raw wrapped Title Key from the Ticket.
    pub fn title_key_enc(&self) -> [u8; 16] {
        self.title_key_enc
    }

    /// Gets the Ticket ID listed in the Ticket.
    pub fn ticket_id(&self) -> u64 {
        self.ticket_id
    }

    /// Gets the console ID listed in the Ticket. Nonzero for personalized tickets.
    pub fn console_id(&self) -> u32 {
        self.console_id
    }

    /// Gets the Title ID of the Ticket.
    pub fn title_id(&self) -> u64 {
        self.title_id
    }

    /// Sets a new Title ID for the Ticket. Because the Title ID is the IV used to wrap the Title
    /// Key, the key is re-wrapped under the new ID so that its cleartext value is unchanged.
    pub fn set_title_id(&mut self, title_id: u64) -> Result<(), TicketError> {
        let title_key = self.title_key()?;
        self.title_id = title_id;
        self.title_key_enc = crypto::wrap_title_key(title_key, self.common_key_index, title_id, self.is_dev())?;
        Ok(())
    }

    /// Gets the version of the title listed in the Ticket.
    pub fn title_version(&self) -> u16 {
        self.title_version
    }

    /// Sets the version of the title listed in the Ticket.
    pub fn set_title_version(&mut self, title_version: u16) {
        self.title_version = title_version;
    }

    /// Gets the permitted titles mask listed in the Ticket.
    pub fn permitted_titles_mask(&self) -> u32 {
        self.permitted_titles_mask
    }

    /// Gets the permit mask listed in the Ticket.
    pub fn permit_mask(&self) -> u32 {
        self.permit_mask
    }

    /// Gets whether the Ticket allows the title to be exported to an SD card.
    pub fn export_allowed(&self) -> bool {
        self.export_allowed == 1
    }

    /// Gets the index of the common key the Title Key is wrapped with.
    pub fn common_key_index(&self) -> u8 {
        self.common_key_index
    }

    /// Selects a new common key for the Ticket. The Title Key is re-wrapped under the new key so
    /// that its cleartext value is unchanged.
    pub fn set_common_key_index(&mut self, index: u8) -> Result<(), TicketError> {
        let title_key = self.title_key()?;
        self.title_key_enc = crypto::wrap_title_key(title_key, index, self.title_id, self.is_dev())?;
        self.common_key_index = index;
        Ok(())
    }

    /// Gets the content access permissions listed in the Ticket.
    pub fn content_access(&self) -> [u8; 64] {
        self.content_access
    }

    /// Gets the title usage limits listed in the Ticket.
    pub fn limits(&self) -> [TimeLimit; 8] {
        self.limits
    }

    /// Gets whether the Ticket was signed for development (true) or retail (false).
    pub fn is_dev(&self) -> bool {
        self.issuer().starts_with("Root-CA00000002")
    }

    /// Gets the decrypted Title Key stored in the Ticket.
    pub fn title_key(&self) -> Result<[u8; 16], TicketError> {
        Ok(crypto::unwrap_title_key(self.title_key_enc, self.common_key_index, self.title_id, self.is_dev())?)
    }

    /// Stores a new Title Key in the Ticket, wrapping it with the currently selected common key
    /// and the current Title ID.
    pub fn set_title_key(&mut self, title_key: [u8; 16]) -> Result<(), TicketError> {
        self.title_key_enc = crypto::wrap_title_key(title_key, self.common_key_index, self.title_id, self.is_dev())?;
        Ok(())
    }

    /// Gets whether the Ticket is fakesigned using the strncmp (trucha) bug or not.
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

    /// Fakesigns the Ticket for use with the strncmp (trucha) bug. The signature is zeroed and
    /// the last two reserved bytes are incremented until the body hash gains a leading zero byte.
    pub fn fakesign(&mut self) -> Result<(), TicketError> {
        self.signature.zero();
        let body_offset = self.body_offset();
        for counter in 0..=u16::MAX {
            self.reserved2[46..48].copy_from_slice(&counter.to_be_bytes());
            let body = self.to_bytes()?;
            if crypto::sha1(&body[body_offset..])[0] == 0 {
                return Ok(());
            }
        }
        Err(TicketError::FakesignFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_ticket_bytes(title_id: u64, title_key: [u8; 16]) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend(0x00010001u32.to_be_bytes()); // RSA-2048 signature
        buf.extend([0u8; 256]);
        buf.extend([0u8; 60]);
        let mut issuer = b"Root-CA00000001-XS00000003".to_vec();
        issuer.resize(64, 0);
        buf.extend(issuer);
        buf.extend([0u8; 60]); // ecdh_data
        buf.push(0); // format_version
        buf.extend([0u8; 2]);
        buf.extend(crypto::wrap_title_key(title_key, 0, title_id, false).unwrap());
        buf.push(0);
        buf.extend(0x0000000012345678u64.to_be_bytes()); // ticket_id
        buf.extend(0u32.to_be_bytes()); // console_id
        buf.extend(title_id.to_be_bytes());
        buf.extend([0u8; 2]);
        buf.extend(5u16.to_be_bytes()); // title_version
        buf.extend(0u32.to_be_bytes()); // permitted_titles_mask
        buf.extend(0u32.to_be_bytes()); // permit_mask
        buf.push(1); // export_allowed
        buf.push(0); // common_key_index
        buf.extend([0u8; 48]);
        buf.extend([0u8; 64]); // content_access
        buf.extend([0u8; 2]);
        buf.extend([0u8; 64]); // 8 time limit entries
        buf
    }

    #[test]
    fn test_parse_fields() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        assert_eq!(data.len(), 0x2A4);
        let ticket = Ticket::from_bytes(&data).unwrap();
        assert_eq!(ticket.title_id(), 0x0001000848414241);
        assert_eq!(ticket.ticket_id(), 0x0000000012345678);
        assert_eq!(ticket.title_version(), 5);
        assert_eq!(ticket.common_key_index(), 0);
        assert!(ticket.export_allowed());
        assert!(!ticket.is_dev());
        assert_eq!(ticket.issuer(), "Root-CA00000001-XS00000003");
    }

    #[test]
    fn test_round_trip() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        let ticket = Ticket::from_bytes(&data).unwrap();
        assert_eq!(ticket.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_title_key_cycle() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        let mut ticket = Ticket::from_bytes(&data).unwrap();
        assert_eq!(ticket.title_key().unwrap(), [0x42; 16]);
        ticket.set_title_key([0x77; 16]).unwrap();
        assert_eq!(ticket.title_key().unwrap(), [0x77; 16]);
    }

    #[test]
    fn test_title_id_rewrap() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        let mut ticket = Ticket::from_bytes(&data).unwrap();
        let original_enc = ticket.title_key_enc();
        ticket.set_title_id(0x0001000848414242).unwrap();
        // The wrapped key must change with the IV while the cleartext key stays the same.
        assert_ne!(ticket.title_key_enc(), original_enc);
        assert_eq!(ticket.title_key().unwrap(), [0x42; 16]);
        ticket.set_title_id(0x0001000848414241).unwrap();
        assert_eq!(ticket.title_key_enc(), original_enc);
    }

    #[test]
    fn test_common_key_rewrap() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        let mut ticket = Ticket::from_bytes(&data).unwrap();
        ticket.set_common_key_index(1).unwrap();
        assert_eq!(ticket.common_key_index(), 1);
        assert_eq!(ticket.title_key().unwrap(), [0x42; 16]);
        assert!(ticket.set_common_key_index(9).is_err());
    }

    #[test]
    fn test_invalid_common_key_index() {
        let mut data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        // Corrupt the stored common key index. The offset is the signed body plus the 0xB1
        // bytes that precede the index field.
        data[320 + 0xB1] = 9;
        let ticket = Ticket::from_bytes(&data).unwrap();
        assert!(matches!(ticket.title_key(), Err(TicketError::Key(KeyError::InvalidCommonKeyIndex(9)))));
    }

    #[test]
    fn test_fakesign() {
        let data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        let mut ticket = Ticket::from_bytes(&data).unwrap();
        assert!(!ticket.is_fakesigned());
        ticket.fakesign().unwrap();
        assert!(ticket.is_fakesigned());
        assert!(ticket.signature().iter().all(|&b| b == 0));
        let body = ticket.to_bytes().unwrap();
        assert_eq!(crypto::sha1(&body[ticket.body_offset()..])[0], 0);
        // Fakesigning must not disturb the wrapped Title Key.
        assert_eq!(ticket.title_key().unwrap(), [0x42; 16]);
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = build_ticket_bytes(0x0001000848414241, [0x42; 16]);
        data[320 + 124] = 1; // format_version lives after the issuer and ECDH data
        assert!(matches!(Ticket::from_bytes(&data), Err(TicketError::UnsupportedVersion(1))));
    }
}
