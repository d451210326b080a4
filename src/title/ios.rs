// title/ios.rs from wiikit (c) 2025 NinjaCheetah & Contributors
// https://github.com/NinjaCheetah/wiikit
//
// Implements applying the well-known access-control patches to IOSes loaded into a Title.

use thiserror::Error;

use crate::title::{Title, TitleError};

#[derive(Debug, Error)]
pub enum IosPatchError {
    #[error("this title does not contain an IOS")]
    NotIos,
    #[error("the `{0}` module could not be located in any content, this may not be an intact IOS")]
    ModuleNotFound(&'static str),
    #[error("title processing error")]
    Title(#[from] TitleError),
}

// Each patch is a byte signature to locate and the bytes that replace it. The replacements
// keep the original length, so content sizes never change.
const FAKESIGNING_PATCHES: [(&[u8], &[u8]); 2] = [
    (&[0x20, 0x07, 0x23, 0xA2], &[0x20, 0x00, 0x23, 0xA2]),
    (&[0x20, 0x07, 0x4B, 0x0B], &[0x20, 0x00, 0x4B, 0x0B]),
];
const ES_IDENTIFY_PATCHES: [(&[u8], &[u8]); 1] =
    [(&[0x28, 0x03, 0xD1, 0x23], &[0x28, 0x03, 0x00, 0x00])];
const NAND_ACCESS_PATCHES: [(&[u8], &[u8]); 1] =
    [(&[0x42, 0x8B, 0xD0, 0x01, 0x25, 0x66], &[0x42, 0x8B, 0xE0, 0x01, 0x25, 0x66])];
const VERSION_DOWNGRADING_PATCHES: [(&[u8], &[u8]); 1] =
    [(&[0xD2, 0x01, 0x4E, 0x56], &[0xE0, 0x01, 0x4E, 0x56])];
const DRIVE_INQUIRY_PATCHES: [(&[u8], &[u8]); 1] =
    [(&[0x49, 0x4C, 0x23, 0x90, 0x68, 0x0A], &[0x20, 0x00, 0xE5, 0x38, 0x68, 0x0A])];

fn apply_patches(content: &mut [u8], patches: &[(&[u8], &[u8])]) -> u32 {
    let mut patch_count = 0;
    for (find, replace) in patches {
        let offset = content.windows(find.len()).position(|window| window == *find);
        if let Some(offset) = offset {
            content[offset..offset + replace.len()].copy_from_slice(replace);
            patch_count += 1;
        }
    }
    patch_count
}

/// Applies the well-known access-control patches to an IOS loaded into a Title. Loading locates
/// the content holding the ES module, each `patch_` method rewrites a byte signature inside a
/// decrypted content and stores it back through the Title (updating the content record's hash),
/// and `finish` fakesigns the result.
#[derive(Debug)]
pub struct IosPatcher {
    title: Title,
    es_index: u16,
    dip_index: Option<u16>,
}

impl IosPatcher {
    /// Loads a Title containing an IOS for patching. The Title ID must name an IOS (a high half
    /// of 00000001 and a low half past 00000002), and one of its contents must hold the ES
    /// module.
    pub fn load(title: Title) -> Result<IosPatcher, IosPatchError> {
        let tid = title.tmd.title_id();
        if tid >> 32 != 1 || (tid & 0xFFFFFFFF) == 1 || (tid & 0xFFFFFFFF) == 2 {
            return Err(IosPatchError::NotIos);
        }
        let es_index = find_module(&title, b"ES:").ok_or(IosPatchError::ModuleNotFound("ES"))?;
        Ok(IosPatcher {
            title,
            es_index,
            dip_index: None,
        })
    }

    fn patch_es_module(&mut self, patches: &[(&[u8], &[u8])]) -> Result<u32, IosPatchError> {
        let mut content = self.title.get_content_by_index(self.es_index)?;
        let patch_count = apply_patches(&mut content, patches);
        self.title.set_content(self.es_index, &content)?;
        Ok(patch_count)
    }

    /// Patches the trucha/fakesigning bug back into the ES module, so that the IOS accepts
    /// fakesigned TMDs and Tickets. Returns the number of patches applied.
    pub fn patch_fakesigning(&mut self) -> Result<u32, IosPatchError> {
        self.patch_es_module(&FAKESIGNING_PATCHES)
    }

    /// Patches ES_Identify access back into the ES module, allowing titles to change their
    /// identity. Returns the number of patches applied.
    pub fn patch_es_identify(&mut self) -> Result<u32, IosPatchError> {
        self.patch_es_module(&ES_IDENTIFY_PATCHES)
    }

    /// Patches direct /dev/flash access back into the ES module, allowing raw reads of the
    /// NAND filesystem. Returns the number of patches applied.
    pub fn patch_nand_access(&mut self) -> Result<u32, IosPatchError> {
        self.patch_es_module(&NAND_ACCESS_PATCHES)
    }

    /// Patches the ES module to allow installed titles to be downgraded. Returns the number of
    /// patches applied.
    pub fn patch_version_downgrading(&mut self) -> Result<u32, IosPatchError> {
        self.patch_es_module(&VERSION_DOWNGRADING_PATCHES)
    }

    /// Patches out the drive inquiry the DIP module performs on startup, letting the IOS load
    /// with no disc drive attached. This patch is experimental. Returns the number of patches
    /// applied.
    pub fn patch_drive_inquiry(&mut self) -> Result<u32, IosPatchError> {
        let dip_index = match self.dip_index {
            Some(index) => index,
            None => {
                let index = find_module(&self.title, b"DIP:").ok_or(IosPatchError::ModuleNotFound("DIP"))?;
                self.dip_index = Some(index);
                index
            },
        };
        let mut content = self.title.get_content_by_index(dip_index)?;
        let patch_count = apply_patches(&mut content, &DRIVE_INQUIRY_PATCHES);
        self.title.set_content(dip_index, &content)?;
        Ok(patch_count)
    }

    /// Applies the fakesigning, ES_Identify, NAND access, and version downgrading patches in one
    /// call. Returns the total number of patches applied.
    pub fn patch_all(&mut self) -> Result<u32, IosPatchError> {
        let mut patch_count = 0;
        patch_count += self.patch_fakesigning()?;
        patch_count += self.patch_es_identify()?;
        patch_count += self.patch_nand_access()?;
        patch_count += self.patch_version_downgrading()?;
        Ok(patch_count)
    }

    /// Fakesigns the patched Title and returns it.
    pub fn finish(mut self) -> Result<Title, IosPatchError> {
        self.title.fakesign()?;
        Ok(self.title)
    }
}

// Finds the content holding the module whose name tag appears in its decrypted data, and
// returns that content's index.
fn find_module(title: &Title, keyword: &[u8]) -> Option<u16> {
    for record in title.tmd.content_records() {
        let content = match title.get_content_by_index(record.index) {
            Ok(content) => content,
            Err(_) => continue,
        };
        if content.windows(keyword.len()).any(|window| window == keyword) {
            return Some(record.index);
        }
    }
    None
}
