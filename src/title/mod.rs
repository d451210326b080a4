// title/mod.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Root for all title-related modules and implementation of the high-level Title object.

pub mod cert;
pub mod content;
pub mod crypto;
pub mod ios;
pub mod keys;
pub mod nus;
pub mod signing;
pub mod ticket;
pub mod tmd;
pub mod versions;
pub mod wad;

use thiserror::Error;

/// The Wii's storage unit, used when reporting installed title sizes.
pub const BLOCK_SIZE: usize = 0x20000; // 128 KiB

#[derive(Debug, Error)]
pub enum TitleError {
    #[error("certificate processing error")]
    Cert(#[from] cert::CertError),
    #[error("TMD processing error")]
    Tmd(#[from] tmd::TmdError),
    #[error("Ticket processing error")]
    Ticket(#[from] ticket::TicketError),
    #[error("content processing error")]
    Content(#[from] content::ContentError),
    #[error("WAD processing error")]
    Wad(#[from] wad::WadError),
    #[error("common key error")]
    Key(#[from] keys::KeyError),
    #[error("title data is not in a valid format")]
    IO(#[from] std::io::Error),
}

/// A complete digital Wii title: the certificate chain, Ticket, TMD, and content area that ship
/// together in a WAD, plus the optional CRL and footer regions carried through verbatim.
///
/// The Title owns keeping its components consistent with each other: content edits update the
/// TMD's records, and identity edits re-wrap the Ticket's Title Key. The TMD's record list is
/// the source of truth; the ContentRegion's copy is written back to it after every mutation.
#[derive(Debug)]
pub struct Title {
    pub cert_chain: cert::CertChain,
    crl: Vec<u8>,
    pub ticket: ticket::Ticket,
    pub tmd: tmd::Tmd,
    pub content: content::ContentRegion,
    meta: Vec<u8>,
}

impl Title {
    /// Creates a new Title instance from an existing Wad instance, handing each of the WAD's
    /// regions to the matching parser. The TMD's content records act as the schema for the
    /// content area.
    pub fn from_wad(wad: &wad::Wad) -> Result<Title, TitleError> {
        let cert_chain = cert::CertChain::from_bytes(wad.cert_chain())?;
        let ticket = ticket::Ticket::from_bytes(wad.ticket())?;
        let tmd = tmd::Tmd::from_bytes(wad.tmd())?;
        let content = content::ContentRegion::from_bytes(wad.content(), tmd.content_records())?;
        Ok(Title {
            cert_chain,
            crl: wad.crl().to_vec(),
            ticket,
            tmd,
            content,
            meta: wad.meta().to_vec(),
        })
    }

    /// Creates a new Title instance from all of its individual components. The CRL and footer
    /// metadata are optional.
    pub fn from_parts(cert_chain: cert::CertChain, crl: Option<&[u8]>, ticket: ticket::Ticket,
                      tmd: tmd::Tmd, content: content::ContentRegion, meta: Option<&[u8]>) -> Title {
        Title {
            cert_chain,
            crl: crl.map(|crl| crl.to_vec()).unwrap_or_default(),
            ticket,
            tmd,
            content,
            meta: meta.map(|meta| meta.to_vec()).unwrap_or_default(),
        }
    }

    /// Creates a new Title instance from the binary data of a WAD file.
    pub fn from_bytes(data: &[u8]) -> Result<Title, TitleError> {
        let wad = wad::Wad::from_bytes(data)?;
        Title::from_wad(&wad)
    }

    /// Converts the Title back into a Wad instance that can be used to export it to a file.
    pub fn to_wad(&self) -> Result<wad::Wad, TitleError> {
        Ok(wad::Wad::from_parts(
            &self.cert_chain,
            &self.crl,
            &self.ticket,
            &self.tmd,
            &self.content,
            &self.meta,
        )?)
    }

    /// Dumps the Title into the binary data of a WAD file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TitleError> {
        Ok(self.to_wad()?.to_bytes()?)
    }

    /// Gets the decrypted content with the specified index, using the Title Key from the
    /// Ticket.
    pub fn get_content_by_index(&self, index: u16) -> Result<Vec<u8>, TitleError> {
        Ok(self.content.dec_content(index, self.ticket.title_key()?)?)
    }

    /// Gets the decrypted content with the specified Content ID, using the Title Key from the
    /// Ticket.
    pub fn get_content_by_cid(&self, cid: u32) -> Result<Vec<u8>, TitleError> {
        Ok(self.content.dec_content_by_cid(cid, self.ticket.title_key()?)?)
    }

    /// Replaces the content with the specified index with new decrypted data. The matching TMD
    /// content record picks up the new size and hash.
    pub fn set_content(&mut self, index: u16, data: &[u8]) -> Result<(), TitleError> {
        self.content.set_content(index, data, self.ticket.title_key()?)?;
        self.tmd.set_content_records(&self.content.content_records());
        Ok(())
    }

    /// Adds new decrypted content with the provided Content ID and kind. An index one past the
    /// highest recorded index is assigned, and a matching record is added to the TMD.
    pub fn add_content(&mut self, data: &[u8], cid: u32, kind: tmd::ContentKind) -> Result<(), TitleError> {
        let index = self.content.content_records().iter()
            .map(|record| record.index + 1)
            .max()
            .unwrap_or(0);
        let record = tmd::ContentRecord {
            content_id: cid,
            index,
            kind,
            size: data.len() as u64,
            hash: crypto::sha1(data),
        };
        self.content.add_content(record, data, self.ticket.title_key()?)?;
        self.tmd.set_content_records(&self.content.content_records());
        Ok(())
    }

    /// Removes the content with the specified index from both the content area and the TMD's
    /// records.
    pub fn remove_content(&mut self, index: u16) -> Result<(), TitleError> {
        self.content.remove_content(index)?;
        self.tmd.set_content_records(&self.content.content_records());
        Ok(())
    }

    /// Sets a new Title ID on both the TMD and the Ticket. The Ticket re-wraps its Title Key
    /// under the new ID, and both structures are fakesigned, since their existing signatures
    /// cannot cover the edit.
    pub fn set_title_id(&mut self, title_id: u64) -> Result<(), TitleError> {
        self.tmd.set_title_id(title_id);
        self.ticket.set_title_id(title_id)?;
        self.fakesign()
    }

    /// Sets a new title version on the TMD and fakesigns it.
    pub fn set_title_version(&mut self, title_version: u16) -> Result<(), TitleError> {
        self.tmd.set_title_version(title_version);
        self.tmd.fakesign()?;
        Ok(())
    }

    /// Fakesigns the TMD and Ticket of the Title.
    pub fn fakesign(&mut self) -> Result<(), TitleError> {
        self.tmd.fakesign()?;
        self.ticket.fakesign()?;
        Ok(())
    }

    /// Gets whether the TMD and Ticket of the Title are both fakesigned.
    pub fn is_fakesigned(&self) -> bool {
        self.tmd.is_fakesigned() && self.ticket.is_fakesigned()
    }

    /// Verifies the entire certificate chain, and then the TMD and Ticket signatures. Returns
    /// true only if every link holds.
    pub fn is_signed(&self) -> Result<bool, TitleError> {
        if !cert::verify_ca_cert(self.cert_chain.ca_cert())? {
            return Ok(false);
        }
        if !cert::verify_child_cert(self.cert_chain.ca_cert(), self.cert_chain.tmd_cert())? ||
            !cert::verify_child_cert(self.cert_chain.ca_cert(), self.cert_chain.ticket_cert())? {
            return Ok(false);
        }
        if !cert::verify_tmd_sig(self.cert_chain.tmd_cert(), &self.tmd)? ||
            !cert::verify_ticket_sig(self.cert_chain.ticket_cert(), &self.ticket)? {
            return Ok(false);
        }
        Ok(true)
    }

    /// Gets the installed size of the title in bytes, summed over its content records. Shared
    /// contents are only counted when `absolute` is set, since they may already be installed.
    pub fn title_size(&self, absolute: bool) -> u64 {
        self.tmd.content_records().iter()
            .filter(|record| absolute || record.kind != tmd::ContentKind::Shared)
            .map(|record| record.size)
            .sum()
    }

    /// Gets the installed size of the title in the Wii's 128 KiB blocks, rounded up.
    pub fn title_size_blocks(&self, absolute: bool) -> usize {
        bytes_to_blocks(self.title_size(absolute) as usize)
    }

    /// Gets the raw CRL region carried by the Title.
    pub fn crl(&self) -> &[u8] {
        &self.crl
    }

    /// Replaces the raw CRL region carried by the Title.
    pub fn set_crl(&mut self, crl: &[u8]) {
        self.crl = crl.to_vec();
    }

    /// Gets the raw footer metadata carried by the Title.
    pub fn meta(&self) -> &[u8] {
        &self.meta
    }

    /// Replaces the raw footer metadata carried by the Title.
    pub fn set_meta(&mut self, meta: &[u8]) {
        self.meta = meta.to_vec();
    }
}

/// Converts a size in bytes to the Wii's storage unit, blocks, rounding up.
pub fn bytes_to_blocks(size_bytes: usize) -> usize {
    size_bytes.div_ceil(BLOCK_SIZE)
}
