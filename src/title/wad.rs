// title/wad.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements parsing and editing of WAD files.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::title::cert::CertChain;
use crate::title::content::ContentRegion;
use crate::title::ticket::Ticket;
use crate::title::tmd::{Tmd, TmdError};

#[derive(Debug, Error)]
pub enum WadError {
    #[error("`{0}` is not a known WAD type")]
    BadMagic(String),
    #[error("WAD header describes more data than the file contains")]
    Truncated,
    #[error("TMD processing error")]
    Tmd(#[from] TmdError),
    #[error("WAD data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// The two kinds of WAD: installable titles and the boot2 image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WadKind {
    Installable,
    Boot2,
}

impl WadKind {
    fn magic(&self) -> &'static [u8; 2] {
        match self {
            WadKind::Installable => b"Is",
            WadKind::Boot2 => b"ib",
        }
    }
}

fn align_64(value: usize) -> usize {
    (value + 63) & !63
}

/// A parsed WAD file, holding the raw bytes of each of its regions. The regions are stored in
/// the WAD in a fixed order, each padded out to a 64-byte boundary: certificate chain, CRL,
/// Ticket, TMD, content, and footer metadata.
#[derive(Debug, Clone)]
pub struct Wad {
    kind: WadKind,
    version: u16,
    cert_chain: Vec<u8>,
    crl: Vec<u8>,
    ticket: Vec<u8>,
    tmd: Vec<u8>,
    content: Vec<u8>,
    meta: Vec<u8>,
}

impl Wad {
    /// Creates a new Wad instance from the binary data of a WAD file.
    pub fn from_bytes(data: &[u8]) -> Result<Wad, WadError> {
        let mut buf = Cursor::new(data);
        let _header_size = buf.read_u32::<BigEndian>()?;
        let mut magic = [0u8; 2];
        buf.read_exact(&mut magic)?;
        let kind = match &magic {
            b"Is" => WadKind::Installable,
            b"ib" => WadKind::Boot2,
            other => return Err(WadError::BadMagic(String::from_utf8_lossy(other).to_string())),
        };
        let version = buf.read_u16::<BigEndian>()?;
        let cert_chain_size = buf.read_u32::<BigEndian>()? as usize;
        let crl_size = buf.read_u32::<BigEndian>()? as usize;
        let ticket_size = buf.read_u32::<BigEndian>()? as usize;
        let tmd_size = buf.read_u32::<BigEndian>()? as usize;
        // Round the content size to the nearest 16, since some tools write it unaligned.
        let content_size = (buf.read_u32::<BigEndian>()? as usize + 15) & !15;
        let meta_size = buf.read_u32::<BigEndian>()? as usize;
        // Each region starts at the next 64-byte boundary past the previous one.
        let cert_chain_offset = align_64(0x20);
        let crl_offset = align_64(cert_chain_offset + cert_chain_size);
        let ticket_offset = align_64(crl_offset + crl_size);
        let tmd_offset = align_64(ticket_offset + ticket_size);
        let content_offset = align_64(tmd_offset + tmd_size);
        let meta_offset = align_64(content_offset + content_size);
        let region = |offset: usize, size: usize| {
            data.get(offset..offset + size)
                .map(|bytes| bytes.to_vec())
                .ok_or(WadError::Truncated)
        };
        Ok(Wad {
            kind,
            version,
            cert_chain: region(cert_chain_offset, cert_chain_size)?,
            crl: region(crl_offset, crl_size)?,
            ticket: region(ticket_offset, ticket_size)?,
            tmd: region(tmd_offset, tmd_size)?,
            content: region(content_offset, content_size)?,
            meta: region(meta_offset, meta_size)?,
        })
    }

    /// Creates a new Wad instance from instances of the components stored in a WAD file. The
    /// WAD's kind is chosen by the Title ID in the TMD, since boot2 is the only title stored in
    /// an `ib` WAD.
    pub fn from_parts(cert_chain: &CertChain, crl: &[u8], ticket: &Ticket, tmd: &Tmd,
                      content: &ContentRegion, meta: &[u8]) -> Result<Wad, WadError> {
        let kind = match tmd.title_id() {
            0x0000000100000001 => WadKind::Boot2,
            _ => WadKind::Installable,
        };
        Ok(Wad {
            kind,
            version: 0, // This is always officially a zero.
            cert_chain: cert_chain.to_bytes()?,
            crl: crl.to_vec(),
            ticket: ticket.to_bytes()?,
            tmd: tmd.to_bytes()?,
            content: content.to_bytes()?,
            meta: meta.to_vec(),
        })
    }

    /// Dumps the data in a Wad instance back into binary data that can be written to a file. The
    /// header records each region's exact size, and the regions are padded out to 64 bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WadError> {
        let mut buf: Vec<u8> = Vec::new();
        buf.write_u32::<BigEndian>(0x20)?;
        buf.write_all(self.kind.magic())?;
        buf.write_u16::<BigEndian>(self.version)?;
        buf.write_u32::<BigEndian>(self.cert_chain.len() as u32)?;
        buf.write_u32::<BigEndian>(self.crl.len() as u32)?;
        buf.write_u32::<BigEndian>(self.ticket.len() as u32)?;
        buf.write_u32::<BigEndian>(self.tmd.len() as u32)?;
        buf.write_u32::<BigEndian>(self.content.len() as u32)?;
        buf.write_u32::<BigEndian>(self.meta.len() as u32)?;
        for region in [&self.cert_chain, &self.crl, &self.ticket, &self.tmd, &self.content, &self.meta] {
            buf.resize(align_64(buf.len()), 0);
            buf.write_all(region)?;
        }
        buf.resize(align_64(buf.len()), 0);
        Ok(buf)
    }

    /// Gets the kind of the WAD.
    pub fn kind(&self) -> WadKind {
        self.kind
    }

    /// Gets the version of the WAD.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Gets the raw certificate chain region of the WAD.
    pub fn cert_chain(&self) -> &[u8] {
        &self.cert_chain
    }

    /// Replaces the certificate chain region of the WAD.
    pub fn set_cert_chain(&mut self, cert_chain: &[u8]) {
        self.cert_chain = cert_chain.to_vec();
    }

    /// Gets the raw CRL region of the WAD. No retail WAD is known to carry one.
    pub fn crl(&self) -> &[u8] {
        &self.crl
    }

    /// Replaces the CRL region of the WAD.
    pub fn set_crl(&mut self, crl: &[u8]) {
        self.crl = crl.to_vec();
    }

    /// Gets the raw Ticket region of the WAD.
    pub fn ticket(&self) -> &[u8] {
        &self.ticket
    }

    /// Replaces the Ticket region of the WAD.
    pub fn set_ticket(&mut self, ticket: &[u8]) {
        self.ticket = ticket.to_vec();
    }

    /// Gets the raw TMD region of the WAD.
    pub fn tmd(&self) -> &[u8] {
        &self.tmd
    }

    /// Replaces the TMD region of the WAD.
    pub fn set_tmd(&mut self, tmd: &[u8]) {
        self.tmd = tmd.to_vec();
    }

    /// Gets the raw content region of the WAD.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Replaces the content region of the WAD.
    pub fn set_content(&mut self, content: &[u8]) {
        self.content = content.to_vec();
    }

    /// Gets the raw footer metadata region of the WAD.
    pub fn meta(&self) -> &[u8] {
        &self.meta
    }

    /// Replaces the footer metadata region of the WAD.
    pub fn set_meta(&mut self, meta: &[u8]) {
        self.meta = meta.to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_wad_bytes(cert_chain: &[u8], ticket: &[u8], tmd: &[u8], content: &[u8]) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        buf.extend(0x20u32.to_be_bytes());
        buf.extend(b"Is");
        buf.extend(0u16.to_be_bytes());
        buf.extend((cert_chain.len() as u32).to_be_bytes());
        buf.extend(0u32.to_be_bytes()); // crl
        buf.extend((ticket.len() as u32).to_be_bytes());
        buf.extend((tmd.len() as u32).to_be_bytes());
        buf.extend((content.len() as u32).to_be_bytes());
        buf.extend(0u32.to_be_bytes()); // meta
        let empty: &[u8] = &[];
        for region in [cert_chain, empty, ticket, tmd, content, empty] {
            buf.resize(align_64(buf.len()), 0);
            buf.extend(region);
        }
        buf.resize(align_64(buf.len()), 0);
        buf
    }

    #[test]
    fn test_parse_and_round_trip() {
        let cert_chain = vec![0x11; 1024];
        let ticket = vec![0x22; 0x2A4];
        let tmd = vec![0x33; 520];
        let content = vec![0x44; 128];
        let data = build_wad_bytes(&cert_chain, &ticket, &tmd, &content);
        let wad = Wad::from_bytes(&data).unwrap();
        assert_eq!(wad.kind(), WadKind::Installable);
        assert_eq!(wad.cert_chain(), cert_chain.as_slice());
        assert_eq!(wad.ticket(), ticket.as_slice());
        assert_eq!(wad.tmd(), tmd.as_slice());
        assert_eq!(wad.content(), content.as_slice());
        assert!(wad.crl().is_empty());
        assert!(wad.meta().is_empty());
        assert_eq!(wad.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_regions_are_aligned() {
        let data = build_wad_bytes(&[0x11; 1000], &[0x22; 0x2A4], &[0x33; 500], &[0x44; 70]);
        let wad = Wad::from_bytes(&data).unwrap();
        let out = wad.to_bytes().unwrap();
        // Walk the header sizes and confirm each region lands on a 64-byte boundary.
        let mut offset = align_64(0x20);
        for size in [1000usize, 0, 0x2A4, 500, 80, 0] {
            assert_eq!(offset % 64, 0);
            offset = align_64(offset + size);
        }
        assert_eq!(out.len() % 64, 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build_wad_bytes(&[0x11; 64], &[0x22; 0x2A4], &[0x33; 500], &[0x44; 70]);
        data[4] = b'X';
        assert!(matches!(Wad::from_bytes(&data), Err(WadError::BadMagic(_))));
    }

    #[test]
    fn test_truncated() {
        let data = build_wad_bytes(&[0x11; 64], &[0x22; 0x2A4], &[0x33; 500], &[0x44; 70]);
        assert!(matches!(Wad::from_bytes(&data[..data.len() - 100]), Err(WadError::Truncated)));
    }
}
